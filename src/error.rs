/// Error taxonomy for the stash core
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StashError {
    #[error("an item with hash {0} already exists")]
    DuplicateHash(String),
    #[error("item not found: {0}")]
    ItemNotFound(String),
    #[error("storage unavailable: {0}")]
    Storage(String),
    #[error("invalid message: {0}")]
    InvalidMessage(String),
    #[error("invalid settings: {0}")]
    InvalidSettings(String),
    #[error("tab host failure: {0}")]
    TabHost(String),
}

impl StashError {
    /// Stable code sent back to the UI alongside the message
    pub fn code(&self) -> &'static str {
        match self {
            Self::DuplicateHash(_) => "DUPLICATE_HASH",
            Self::ItemNotFound(_) => "ITEM_NOT_FOUND",
            Self::Storage(_) => "STORAGE",
            Self::InvalidMessage(_) => "INVALID_MESSAGE",
            Self::InvalidSettings(_) => "INVALID_SETTINGS",
            Self::TabHost(_) => "TAB_HOST",
        }
    }
}
