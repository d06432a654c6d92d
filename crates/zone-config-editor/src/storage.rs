//! Persistence of configuration documents and change logs.
//!
//! Documents go through the `DocumentStore` trait; `FileStore` is the only
//! backend and reads/writes a single JSON file synchronously. Change logs from
//! bulk renumbering are plain text files named after the time they were written.

use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use thiserror::Error;
use zone_config_lib::{ChangeLog, RoutingConfig, ZoneError};

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {0}")]
    Json(String),

    #[error(transparent)]
    Document(#[from] ZoneError),
}

pub type StorageResult<T> = Result<T, StorageError>;

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> StorageError + '_ {
    move |source| StorageError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Somewhere a routing configuration can be loaded from and saved to
pub trait DocumentStore {
    fn load(&self) -> StorageResult<RoutingConfig>;

    fn save(&self, document: &RoutingConfig) -> StorageResult<()>;
}

/// A document stored as one JSON file
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl DocumentStore for FileStore {
    fn load(&self) -> StorageResult<RoutingConfig> {
        let text = std::fs::read_to_string(&self.path).map_err(io_error(&self.path))?;
        let document = RoutingConfig::from_json_str(&text)?;
        tracing::info!(
            "Loaded {} with {} routes",
            self.path.display(),
            document.routes.len()
        );
        Ok(document)
    }

    fn save(&self, document: &RoutingConfig) -> StorageResult<()> {
        let text = document.to_json_pretty()?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(io_error(parent))?;
        }
        std::fs::write(&self.path, text).map_err(io_error(&self.path))?;
        tracing::info!("Saved {}", self.path.display());
        Ok(())
    }
}

/// Read any JSON value from a file
pub fn load_json<T: DeserializeOwned>(path: &Path) -> StorageResult<T> {
    let text = std::fs::read_to_string(path).map_err(io_error(path))?;
    serde_json::from_str(&text).map_err(|e| StorageError::Json(format!("{}: {e}", path.display())))
}

/// Write a change log under `dir`, returning the file's path
pub fn write_change_log<Tz>(
    dir: &Path,
    log: &ChangeLog,
    time: &chrono::DateTime<Tz>,
) -> StorageResult<PathBuf>
where
    Tz: chrono::TimeZone,
    Tz::Offset: std::fmt::Display,
{
    std::fs::create_dir_all(dir).map_err(io_error(dir))?;
    let path = dir.join(ChangeLog::file_name(time));
    std::fs::write(&path, format!("{log}\n")).map_err(io_error(&path))?;
    tracing::info!("Change log written to {}", path.display());
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;
    use zone_config_lib::LogTag;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "zone-config-editor-{name}-{}",
            std::process::id()
        ));
        let _ = std::fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn test_round_trip_keeps_unknown_fields() {
        let dir = scratch_dir("round-trip");
        let store = FileStore::new(dir.join("nested").join("config.json"));
        let document: RoutingConfig = serde_json::from_value(json!({
            "id": 7,
            "admissibleRoutePatterns": "MONT|1500|1599",
            "vendorField": {"keep": ["me"]},
            "routingParameterUiVehicleDTOs": [{"name": "MONT1500", "colour": "é"}]
        }))
        .unwrap();

        store.save(&document).unwrap();
        let text = std::fs::read_to_string(store.path()).unwrap();
        assert!(text.contains("    \"vendorField\""));
        assert!(text.contains("\"colour\": \"é\""));

        let loaded = store.load().unwrap();
        assert_eq!(loaded, document);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_missing_file_names_path() {
        let store = FileStore::new(scratch_dir("missing").join("absent.json"));
        let err = store.load().unwrap_err();
        assert!(matches!(err, StorageError::Io { .. }));
        assert!(err.to_string().contains("absent.json"));
    }

    #[test]
    fn test_malformed_document() {
        let dir = scratch_dir("malformed");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(
            FileStore::new(&path).load(),
            Err(StorageError::Document(ZoneError::Format(_)))
        ));
        assert!(matches!(load_json::<serde_json::Value>(&path), Err(StorageError::Json(_))));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_change_log_file() {
        let dir = scratch_dir("change-log");
        let mut log = ChangeLog::default();
        log.push(LogTag::Info, "Range 2000-2999");
        log.push(LogTag::Rename, "MONT1500 -> MONT2000");
        let time = chrono::Utc.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap();

        let path = write_change_log(&dir, &log, &time).unwrap();
        assert_eq!(
            path.file_name().and_then(|n| n.to_str()),
            Some("CHANGE_LOG_20240309-140507.txt")
        );
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("[INFO] Range 2000-2999\n[RENAME] MONT1500 -> MONT2000"));
        let _ = std::fs::remove_dir_all(&dir);
    }
}
