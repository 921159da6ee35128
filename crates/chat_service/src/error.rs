use conversation_store::StoreError;
use reply_client::ReplyError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("model call failed: {0}")]
    Upstream(#[from] ReplyError),
}

impl ServiceError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ServiceError::Store(error) if error.is_not_found())
    }
}

pub type Result<T> = std::result::Result<T, ServiceError>;
