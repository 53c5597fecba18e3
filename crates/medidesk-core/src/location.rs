//! Access to the path of the view the user is currently on.

use std::sync::{Arc, RwLock};

pub trait LocationProvider: Send + Sync {
    fn current_path(&self) -> String;
}

/// Settable current location. Clones share the same value.
#[derive(Debug, Clone, Default)]
pub struct SharedLocation {
    path: Arc<RwLock<String>>,
}

impl SharedLocation {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: Arc::new(RwLock::new(path.into())),
        }
    }

    pub fn set(&self, path: impl Into<String>) {
        let mut guard = self.path.write().unwrap_or_else(|e| e.into_inner());
        *guard = path.into();
    }
}

impl LocationProvider for SharedLocation {
    fn current_path(&self) -> String {
        self.path.read().unwrap_or_else(|e| e.into_inner()).clone()
    }
}
