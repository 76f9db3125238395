use tokio_tungstenite::tungstenite;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("Not found")]
    NotFound,

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Server error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Network error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Channel error: {0}")]
    Channel(#[from] tungstenite::Error),

    #[error("Cache index error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ClientError {
    /// Authentication failures lead to credential removal and a re-login
    /// prompt; everything else is reported or logged where it happened.
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, ClientError::Unauthorized)
    }

    /// Short text shown in the flows that surface failures to the user
    /// (login, file upload/download). Transport details stay in the logs.
    pub fn user_message(&self) -> String {
        match self {
            ClientError::NotFound => "Not found".to_string(),
            ClientError::Unauthorized => "Session expired, please log in again".to_string(),
            ClientError::BadRequest(msg) => msg.clone(),
            ClientError::Api { status, .. } => format!("Server rejected the request ({status})"),
            ClientError::Http(e) => {
                tracing::error!("Network error: {}", e);
                "Could not reach the server".to_string()
            }
            other => {
                tracing::error!("Client error: {}", other);
                "Something went wrong".to_string()
            }
        }
    }
}

pub type ClientResult<T> = Result<T, ClientError>;
