use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("channel error: {0}")]
    Channel(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("failed to create user: {0}")]
    UserCreation(String),

    #[error("failed to create messages: {0}")]
    MessageCreation(String),

    #[error("failed to query user: {0}")]
    UserQuery(String),

    #[error("failed to update user: {0}")]
    UserUpdate(String),

    #[error("embedding error: {0}")]
    Embedding(String),

    #[error("llm error: {0}")]
    Llm(String),

    #[error("gateway error: {0}")]
    Gateway(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// True for the data-access failures raised by the user/message store.
    pub fn is_data_access(&self) -> bool {
        matches!(
            self,
            Self::Database(_)
                | Self::UserCreation(_)
                | Self::MessageCreation(_)
                | Self::UserQuery(_)
                | Self::UserUpdate(_)
        )
    }
}
