use docfs_tree::ErrorKind;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SdkError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("config parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("account error: {0}")]
    Account(String),

    #[error("store error: {0}")]
    Store(#[from] docfs_store::StoreError),

    #[error("chunk store error: {0}")]
    Chunk(#[from] docfs_chunk::ChunkError),

    #[error(transparent)]
    Tree(#[from] docfs_tree::TreeError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SdkError {
    /// Namespace error classification, when the failure came from the tree.
    pub fn tree_kind(&self) -> Option<ErrorKind> {
        match self {
            SdkError::Tree(e) => Some(e.kind()),
            _ => None,
        }
    }
}

pub type SdkResult<T> = Result<T, SdkError>;
