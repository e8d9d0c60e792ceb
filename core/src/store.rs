use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::error::{Error, StorageAction};
use crate::targets;

#[derive(Debug, Default)]
pub struct LocalStore {
    path: Option<PathBuf>,
    values: BTreeMap<String, String>,
}

impl LocalStore {
    pub fn in_memory() -> Self {
        Self::default()
    }

    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let values = match load_values(&path) {
            Ok(values) => values,
            Err(error) => {
                tracing::warn!(
                    target: targets::STORAGE,
                    "Settings load failed, starting empty: {}",
                    error.technical_detail()
                );
                BTreeMap::new()
            }
        };

        Self {
            path: Some(path),
            values,
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn set(&mut self, key: &str, value: impl Into<String>) -> Result<(), Error> {
        self.values.insert(key.to_string(), value.into());
        self.flush()
    }

    pub fn remove(&mut self, key: &str) -> Result<(), Error> {
        if self.values.remove(key).is_none() {
            return Ok(());
        }
        self.flush()
    }

    fn flush(&self) -> Result<(), Error> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let path_text = path.display().to_string();
        let contents = serde_json::to_string_pretty(&self.values).map_err(|source| Error::Json {
            action: StorageAction::Save,
            path: Some(path_text.clone()),
            source,
        })?;
        fs::write(path, contents).map_err(|source| Error::StorageIo {
            action: StorageAction::Save,
            path: Some(path_text),
            source,
        })
    }
}

fn load_values(path: &Path) -> Result<BTreeMap<String, String>, Error> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(error) if error.kind() == io::ErrorKind::NotFound => {
            return Ok(BTreeMap::new());
        }
        Err(source) => {
            return Err(Error::StorageIo {
                action: StorageAction::Load,
                path: Some(path.display().to_string()),
                source,
            });
        }
    };

    serde_json::from_str(&contents).map_err(|source| Error::Json {
        action: StorageAction::Load,
        path: Some(path.display().to_string()),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_memory_store_keeps_values() {
        let mut store = LocalStore::in_memory();
        assert_eq!(store.get("missing"), None);

        store.set("alpha", "first").expect("set alpha");
        store.set("beta", "second").expect("set beta");
        store.set("alpha", "updated").expect("overwrite alpha");

        assert_eq!(store.get("alpha"), Some("updated"));
        assert_eq!(store.get("beta"), Some("second"));

        store.remove("beta").expect("remove beta");
        assert_eq!(store.get("beta"), None);
    }

    #[test]
    fn stored_values_stay_opaque_strings() {
        let mut store = LocalStore::in_memory();
        store
            .set("payload", r#"{"nested":"json"}"#)
            .expect("set payload");
        assert_eq!(store.get("payload"), Some(r#"{"nested":"json"}"#));
    }
}
