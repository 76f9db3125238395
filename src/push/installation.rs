use crate::error::ClientResult;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Identifies this installation to the push relay. Generated once and
/// reused for every subsequent subscription.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Installation {
    pub id: String,
    pub created_at: String,
}

impl Installation {
    pub fn load_or_create(data_dir: &Path) -> ClientResult<Self> {
        let path = data_dir.join("installation.json");

        if path.exists() {
            let json = fs::read_to_string(&path)?;
            match serde_json::from_str(&json) {
                Ok(installation) => return Ok(installation),
                Err(e) => {
                    tracing::warn!(error = %e, "installation file unreadable; regenerating");
                }
            }
        }

        let installation = Self {
            id: uuid::Uuid::now_v7().to_string(),
            created_at: chrono::Utc::now().to_rfc3339(),
        };
        fs::create_dir_all(data_dir)?;
        fs::write(&path, serde_json::to_string_pretty(&installation)?)?;
        tracing::info!("Created new installation id: {}", installation.id);
        Ok(installation)
    }
}
