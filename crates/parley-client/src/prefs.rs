//! Key/value session storage: who is signed in and their cached profile.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use serde_json::{Map, Value};
use tracing::debug;

use parley_types::keys;

use crate::error::ClientError;

pub trait PreferenceStore: Send + Sync {
    fn get_string(&self, key: &str) -> Option<String>;

    fn put_string(&self, key: &str, value: &str) -> Result<(), ClientError>;

    /// Unset booleans read as `false`.
    fn get_bool(&self, key: &str) -> bool;

    fn put_bool(&self, key: &str, value: bool) -> Result<(), ClientError>;

    fn clear(&self) -> Result<(), ClientError>;
}

/// Process-lifetime preferences.
#[derive(Debug, Default)]
pub struct MemoryPreferences {
    values: Mutex<HashMap<String, Value>>,
}

impl MemoryPreferences {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<String, Value>>, ClientError> {
        self.values.lock().map_err(|_| poisoned())
    }
}

impl PreferenceStore for MemoryPreferences {
    fn get_string(&self, key: &str) -> Option<String> {
        let values = self.lock().ok()?;
        values.get(key).and_then(Value::as_str).map(str::to_string)
    }

    fn put_string(&self, key: &str, value: &str) -> Result<(), ClientError> {
        self.lock()?.insert(key.to_string(), Value::from(value));
        Ok(())
    }

    fn get_bool(&self, key: &str) -> bool {
        self.lock()
            .ok()
            .and_then(|values| values.get(key).and_then(Value::as_bool))
            .unwrap_or(false)
    }

    fn put_bool(&self, key: &str, value: bool) -> Result<(), ClientError> {
        self.lock()?.insert(key.to_string(), Value::from(value));
        Ok(())
    }

    fn clear(&self) -> Result<(), ClientError> {
        self.lock()?.clear();
        Ok(())
    }
}

fn poisoned() -> ClientError {
    std::io::Error::other("preference lock poisoned").into()
}

/// Preferences persisted as one JSON object in `<dir>/chatAppPreference.json`.
/// Every write rewrites the file through a temp file and rename.
#[derive(Debug)]
pub struct FilePreferences {
    path: PathBuf,
    values: Mutex<Map<String, Value>>,
}

impl FilePreferences {
    pub fn open(dir: &Path) -> Result<Self, ClientError> {
        fs::create_dir_all(dir)?;
        let path = dir.join(format!("{}.json", keys::PREFERENCE_NAME));

        let values = match fs::read_to_string(&path) {
            Ok(text) => serde_json::from_str(&text)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Map::new(),
            Err(e) => return Err(e.into()),
        };

        debug!("Preferences loaded from {}", path.display());
        Ok(Self {
            path,
            values: Mutex::new(values),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Memory only changes once the new contents are on disk.
    fn update<F>(&self, f: F) -> Result<(), ClientError>
    where
        F: FnOnce(&mut Map<String, Value>),
    {
        let mut values = self.values.lock().map_err(|_| poisoned())?;
        let mut next = values.clone();
        f(&mut next);

        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(&next)?)?;
        fs::rename(&tmp, &self.path)?;

        *values = next;
        Ok(())
    }
}

impl PreferenceStore for FilePreferences {
    fn get_string(&self, key: &str) -> Option<String> {
        let values = self.values.lock().ok()?;
        values.get(key).and_then(Value::as_str).map(str::to_string)
    }

    fn put_string(&self, key: &str, value: &str) -> Result<(), ClientError> {
        self.update(|values| {
            values.insert(key.to_string(), Value::from(value));
        })
    }

    fn get_bool(&self, key: &str) -> bool {
        self.values
            .lock()
            .ok()
            .and_then(|values| values.get(key).and_then(Value::as_bool))
            .unwrap_or(false)
    }

    fn put_bool(&self, key: &str, value: bool) -> Result<(), ClientError> {
        self.update(|values| {
            values.insert(key.to_string(), Value::from(value));
        })
    }

    fn clear(&self) -> Result<(), ClientError> {
        self.update(Map::clear)
    }
}
