use std::path::{Component, Path, PathBuf};

use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use teams_aad_core::ProvisionError;
use thiserror::Error;

/// Relative location of a state document inside the store.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StatePath(String);

impl StatePath {
    /// Reject absolute and parent-traversing paths.
    pub fn new(path: impl Into<String>) -> Result<Self, StorageError> {
        let path_string = path.into();
        let path = Path::new(&path_string);

        if path_string.is_empty()
            || path.is_absolute()
            || path.components().any(|c| matches!(c, Component::ParentDir))
        {
            return Err(StorageError::InvalidPath(path_string));
        }

        Ok(Self(path_string))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn to_path_buf(&self) -> PathBuf {
        Path::new(&self.0).to_path_buf()
    }
}

/// Typed JSON persistence for environment state.
pub trait StateManager: Send + Sync {
    fn put_json<T: Serialize>(&self, path: &StatePath, value: &T) -> Result<(), StorageError>;
    fn get_json<T: DeserializeOwned>(&self, path: &StatePath) -> Result<Option<T>, StorageError>;
}

/// Object-safe view of a [`StateManager`], used wherever the store is injected.
pub trait StateStore: Send + Sync {
    fn put_json_value(&self, path: &StatePath, value: &Value) -> Result<(), StorageError>;
    fn get_json_value(&self, path: &StatePath) -> Result<Option<Value>, StorageError>;
}

impl<T: StateManager> StateStore for T {
    fn put_json_value(&self, path: &StatePath, value: &Value) -> Result<(), StorageError> {
        self.put_json(path, value)
    }

    fn get_json_value(&self, path: &StatePath) -> Result<Option<Value>, StorageError> {
        self.get_json(path)
    }
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("state path is invalid: {0}")]
    InvalidPath(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("state store lock poisoned")]
    Poisoned,
}

impl From<StorageError> for ProvisionError {
    fn from(err: StorageError) -> Self {
        ProvisionError::State(err.to_string())
    }
}
