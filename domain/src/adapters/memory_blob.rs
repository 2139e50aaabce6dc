use std::collections::HashMap;
use std::sync::Mutex;

use crate::{BlobStore, CoreError};

/// In-memory blob store. Contents are lost when the process exits.
pub struct InMemoryBlobStore {
    inner: Mutex<HashMap<String, String>>,
}

impl InMemoryBlobStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryBlobStore {
    fn default() -> Self {
        Self::new()
    }
}

impl BlobStore for InMemoryBlobStore {
    fn get(&self, key: &str) -> Result<Option<String>, CoreError> {
        let map = self
            .inner
            .lock()
            .map_err(|_| CoreError::Repository("mutex poisoned".into()))?;
        Ok(map.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), CoreError> {
        let mut map = self
            .inner
            .lock()
            .map_err(|_| CoreError::Repository("mutex poisoned".into()))?;
        map.insert(key.to_string(), value.to_string());
        Ok(())
    }
}
