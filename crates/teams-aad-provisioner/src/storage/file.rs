use std::{collections::HashMap, fs, path::PathBuf, sync::RwLock};

use serde::{Serialize, de::DeserializeOwned};

use super::state_manager::{StateManager, StatePath, StorageError};

/// Environment state kept as pretty-printed JSON files under a base directory.
pub struct FileStateStore {
    base_dir: PathBuf,
    cache: RwLock<HashMap<String, Vec<u8>>>,
}

impl FileStateStore {
    pub fn new(base_dir: PathBuf) -> Result<Self, StorageError> {
        fs::create_dir_all(&base_dir)?;
        Ok(Self {
            base_dir,
            cache: RwLock::new(HashMap::new()),
        })
    }

    fn path_for(&self, path: &StatePath) -> PathBuf {
        self.base_dir.join(path.to_path_buf())
    }
}

impl StateManager for FileStateStore {
    fn put_json<T: Serialize>(&self, path: &StatePath, value: &T) -> Result<(), StorageError> {
        let payload = serde_json::to_vec_pretty(value)?;
        let fs_path = self.path_for(path);
        if let Some(parent) = fs_path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(fs_path, &payload)?;

        self.cache
            .write()
            .map_err(|_| StorageError::Poisoned)?
            .insert(path.as_str().to_string(), payload);
        Ok(())
    }

    fn get_json<T: DeserializeOwned>(&self, path: &StatePath) -> Result<Option<T>, StorageError> {
        let cached = self
            .cache
            .read()
            .map_err(|_| StorageError::Poisoned)?
            .get(path.as_str())
            .cloned();
        if let Some(bytes) = cached {
            return Ok(Some(serde_json::from_slice(&bytes)?));
        }

        match fs::read(self.path_for(path)) {
            Ok(bytes) => {
                let value = serde_json::from_slice(&bytes)?;
                self.cache
                    .write()
                    .map_err(|_| StorageError::Poisoned)?
                    .insert(path.as_str().to_string(), bytes);
                Ok(Some(value))
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(StorageError::from(err)),
        }
    }
}
