use thiserror::Error;

#[derive(Error, Debug)]
pub enum BotError {
    #[error("Database error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Missing required environment variables: {}", .0.join(", "))]
    Config(Vec<String>),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Store task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

pub type Result<T> = std::result::Result<T, BotError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_lists_every_variable() {
        let err = BotError::Config(vec!["DISCORD_TOKEN".into(), "OPENAI_API_KEY".into()]);
        assert_eq!(
            err.to_string(),
            "Missing required environment variables: DISCORD_TOKEN, OPENAI_API_KEY"
        );
    }
}
