pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Invalid lesson document: {message}")]
    InvalidDocument { message: String },

    #[error("Lesson document JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid configuration: {message}")]
    Config { message: String },
}
