use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::OffsetDateTime;
use tokio::sync::RwLock;

#[derive(Debug, Error)]
pub(crate) enum StoreError {
    #[error("an account with EMIS number {0} already exists")]
    Duplicate(String),
    #[error("school store io failed at {path}: {source}")]
    Io { path: PathBuf, source: std::io::Error },
    #[error("school store file is not valid JSON: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct SchoolRecord {
    pub(crate) id: String,
    pub(crate) school_name: String,
    pub(crate) emis_number: String,
    pub(crate) hashed_password: String,
    #[serde(with = "time::serde::rfc3339")]
    pub(crate) created_at: OffsetDateTime,
}

pub(crate) struct CreateSchool<'a> {
    pub(crate) id: &'a str,
    pub(crate) school_name: &'a str,
    pub(crate) emis_number: &'a str,
    pub(crate) hashed_password: String,
    pub(crate) created_at: OffsetDateTime,
}

/// Registered schools keyed by EMIS number. With a path configured every
/// write rewrites the JSON file before the call returns.
#[derive(Debug)]
pub(crate) struct SchoolStore {
    path: Option<PathBuf>,
    schools: RwLock<HashMap<String, SchoolRecord>>,
}

impl SchoolStore {
    pub(crate) fn in_memory() -> Self {
        Self { path: None, schools: RwLock::new(HashMap::new()) }
    }

    pub(crate) async fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let schools = match tokio::fs::read(&path).await {
            Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => HashMap::new(),
            Ok(bytes) => {
                let records: Vec<SchoolRecord> = serde_json::from_slice(&bytes)?;
                records.into_iter().map(|record| (record.emis_number.clone(), record)).collect()
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(source) => return Err(StoreError::Io { path, source }),
        };

        tracing::info!(path = %path.display(), schools = schools.len(), "School store loaded");
        Ok(Self { path: Some(path), schools: RwLock::new(schools) })
    }

    pub(crate) async fn create(
        &self,
        params: CreateSchool<'_>,
    ) -> Result<SchoolRecord, StoreError> {
        let emis_number = params.emis_number.trim().to_string();
        let mut schools = self.schools.write().await;

        if schools.contains_key(&emis_number) {
            return Err(StoreError::Duplicate(emis_number));
        }

        let record = SchoolRecord {
            id: params.id.to_string(),
            school_name: params.school_name.trim().to_string(),
            emis_number: emis_number.clone(),
            hashed_password: params.hashed_password,
            created_at: params.created_at,
        };
        schools.insert(emis_number.clone(), record.clone());

        if let Some(path) = &self.path {
            if let Err(err) = persist(path, &schools).await {
                schools.remove(&emis_number);
                return Err(err);
            }
        }

        Ok(record)
    }

    pub(crate) async fn find_by_emis(&self, emis_number: &str) -> Option<SchoolRecord> {
        self.schools.read().await.get(emis_number.trim()).cloned()
    }

    pub(crate) async fn find_by_id(&self, id: &str) -> Option<SchoolRecord> {
        self.schools.read().await.values().find(|record| record.id == id).cloned()
    }

    pub(crate) async fn count(&self) -> usize {
        self.schools.read().await.len()
    }

    pub(crate) fn is_persistent(&self) -> bool {
        self.path.is_some()
    }
}

async fn persist(path: &Path, schools: &HashMap<String, SchoolRecord>) -> Result<(), StoreError> {
    let mut records: Vec<&SchoolRecord> = schools.values().collect();
    records.sort_by(|left, right| left.created_at.cmp(&right.created_at));
    let bytes = serde_json::to_vec_pretty(&records)?;

    let io_err = |source| StoreError::Io { path: path.to_path_buf(), source };
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
    }

    // Write then rename so a crash never leaves a truncated file.
    let staging = path.with_extension("json.tmp");
    tokio::fs::write(&staging, bytes).await.map_err(io_err)?;
    tokio::fs::rename(&staging, path).await.map_err(io_err)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params<'a>(id: &'a str, emis: &'a str) -> CreateSchool<'a> {
        CreateSchool {
            id,
            school_name: "  Mamelodi High ",
            emis_number: emis,
            hashed_password: "hash".to_string(),
            created_at: OffsetDateTime::now_utc(),
        }
    }

    #[tokio::test]
    async fn rejects_duplicate_emis_number() {
        let store = SchoolStore::in_memory();

        let created = store.create(params("s1", "123456789")).await.expect("create");
        assert_eq!(created.school_name, "Mamelodi High");

        let err = store.create(params("s2", " 123456789 ")).await.expect_err("duplicate");
        assert!(matches!(err, StoreError::Duplicate(emis) if emis == "123456789"));
        assert_eq!(store.count().await, 1);
    }

    #[tokio::test]
    async fn finds_by_emis_and_id() {
        let store = SchoolStore::in_memory();
        store.create(params("s1", "123456789")).await.expect("create");

        assert_eq!(store.find_by_emis("123456789").await.unwrap().id, "s1");
        assert_eq!(store.find_by_id("s1").await.unwrap().emis_number, "123456789");
        assert!(store.find_by_emis("987654321").await.is_none());
    }

    #[tokio::test]
    async fn persists_and_reloads_from_file() {
        let dir = std::env::temp_dir().join(format!("marker-store-{}", uuid::Uuid::new_v4()));
        let path = dir.join("schools.json");

        let store = SchoolStore::open(&path).await.expect("open empty");
        assert!(store.is_persistent());
        store.create(params("s1", "111111111")).await.expect("create");
        store.create(params("s2", "222222222")).await.expect("create");

        let reopened = SchoolStore::open(&path).await.expect("reopen");
        assert_eq!(reopened.count().await, 2);
        assert_eq!(reopened.find_by_emis("222222222").await.unwrap().id, "s2");

        let _ = std::fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn corrupt_file_is_a_serialization_error() {
        let dir = std::env::temp_dir().join(format!("marker-store-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("schools.json");
        std::fs::write(&path, "{not json").unwrap();

        let err = SchoolStore::open(&path).await.expect_err("corrupt");
        assert!(matches!(err, StoreError::Serialization(_)));

        let _ = std::fs::remove_dir_all(dir);
    }
}
