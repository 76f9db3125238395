use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use crate::error::ClientResult;
use crate::session::claims::{self, Role};

const SESSION_FILE: &str = "session.json";

/// Credentials held for one logged-in user.
///
/// Mirrors what the browser app kept in local storage: the bearer token,
/// the cached role and the user id, all plain strings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Session {
    pub token: String,
    pub role: Role,
    pub user_id: Option<String>,
}

/// The single owner of credential reads and writes.
///
/// Every component that needs the token goes through this store; nothing
/// else touches the session file.
pub struct SessionStore {
    path: PathBuf,
    current: RwLock<Option<Session>>,
}

impl SessionStore {
    /// Open the store, inspecting any persisted token on the way in.
    ///
    /// A malformed or already-expired token is treated like an absent
    /// one: the credentials are removed and no session is reported.
    pub fn open(data_dir: &Path) -> ClientResult<Self> {
        let path = data_dir.join(SESSION_FILE);
        let store = Self {
            path,
            current: RwLock::new(None),
        };

        if !store.path.exists() {
            return Ok(store);
        }

        let persisted: Session = match fs::read_to_string(&store.path)
            .ok()
            .and_then(|json| serde_json::from_str(&json).ok())
        {
            Some(session) => session,
            None => {
                tracing::warn!("Discarding unreadable session file");
                store.clear()?;
                return Ok(store);
            }
        };

        match claims::decode_claims(&persisted.token) {
            Ok(claims) if !claims.is_expired(chrono::Utc::now()) => {
                // The role is re-derived whenever the token is read back;
                // the persisted copy only covers tokens without the claim.
                let session = Session {
                    role: claims.role().unwrap_or(persisted.role),
                    user_id: claims.user_id.or(persisted.user_id),
                    token: persisted.token,
                };
                *store.current.write().unwrap() = Some(session);
            }
            Ok(_) => {
                tracing::info!("Stored token has expired, logging out");
                store.clear()?;
            }
            Err(_) => {
                tracing::warn!("Stored token is malformed, logging out");
                store.clear()?;
            }
        }

        Ok(store)
    }

    pub fn get(&self) -> Option<Session> {
        self.current.read().unwrap().clone()
    }

    pub fn token(&self) -> Option<String> {
        self.current.read().unwrap().as_ref().map(|s| s.token.clone())
    }

    /// Role of the current session; `Unknown` when no valid token is held.
    pub fn role(&self) -> Role {
        self.current
            .read()
            .unwrap()
            .as_ref()
            .map(|s| s.role)
            .unwrap_or(Role::Unknown)
    }

    pub fn active(&self) -> bool {
        self.current.read().unwrap().is_some()
    }

    pub fn set(&self, session: Session) -> ClientResult<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, serde_json::to_string_pretty(&session)?)?;
        *self.current.write().unwrap() = Some(session);
        Ok(())
    }

    pub fn clear(&self) -> ClientResult<()> {
        if self.path.exists() {
            fs::remove_file(&self.path)?;
        }
        *self.current.write().unwrap() = None;
        Ok(())
    }
}
