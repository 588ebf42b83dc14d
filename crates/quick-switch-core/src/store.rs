use anyhow::{Context, Result};
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use tracing::{debug, error};

use crate::document::{self, ConfigDocument, DocumentV3};
use crate::error::LoadError;

#[derive(Debug)]
pub enum Loaded {
    /// No file at the config path yet.
    Absent,
    Document(ConfigDocument),
}

/// The single JSON config file backing a profile.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
    generations: Arc<SaveGenerations>,
}

/// Orders background saves: `issued` numbers them, `written` holds the
/// newest one on disk and serializes the writers.
#[derive(Debug, Default)]
struct SaveGenerations {
    issued: AtomicU64,
    written: Mutex<u64>,
}

impl ConfigStore {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            generations: Arc::default(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<Loaded, LoadError> {
        if !self.path.exists() {
            return Ok(Loaded::Absent);
        }

        let mut file = File::open(&self.path).map_err(|source| {
            if source.kind() == io::ErrorKind::PermissionDenied {
                LoadError::AccessDenied {
                    path: self.path.clone(),
                    source,
                }
            } else {
                LoadError::Read {
                    path: self.path.clone(),
                    source,
                }
            }
        })?;

        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes)
            .map_err(|source| LoadError::Read {
                path: self.path.clone(),
                source,
            })?;

        // Invalid UTF-8 is left for the JSON parser to accept or reject.
        let raw = String::from_utf8_lossy(&bytes);
        ConfigDocument::parse(&raw)
            .map(Loaded::Document)
            .map_err(|err| LoadError::Malformed {
                path: self.path.clone(),
                reason: err.to_string(),
            })
    }

    /// Writes `doc` on a background thread. Failures are logged and never
    /// retried. A save that starts after a newer one has landed is skipped,
    /// so the file always ends at the latest document.
    pub fn save(&self, doc: DocumentV3) -> JoinHandle<()> {
        let path = self.path.clone();
        let generations = Arc::clone(&self.generations);
        let generation = generations.issued.fetch_add(1, Ordering::SeqCst) + 1;
        thread::spawn(move || {
            let mut written = generations
                .written
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            if *written > generation {
                debug!("config save {generation} superseded by {}", *written);
                return;
            }
            match write_document(&path, &doc) {
                Ok(()) => {
                    *written = generation;
                    debug!("saved config to {}", path.display());
                }
                Err(err) => error!("failed to save config: {err:#}"),
            }
        })
    }
}

pub fn write_document(path: &Path, doc: &DocumentV3) -> Result<()> {
    let mut data = document::render(doc).context("failed to serialize config")?;
    data.push('\n');
    atomic_write_file(path, data.as_bytes())
}

fn atomic_write_file(target: &Path, data: &[u8]) -> Result<()> {
    static SEQUENCE: AtomicU64 = AtomicU64::new(0);

    let parent = target
        .parent()
        .with_context(|| format!("cannot determine parent directory for {}", target.display()))?;
    fs::create_dir_all(parent)
        .with_context(|| format!("failed to create directory: {}", parent.display()))?;
    let file_name = target
        .file_name()
        .with_context(|| format!("config path has no file name: {}", target.display()))?;
    let tmp_path = parent.join(format!(
        "{}.{}-{}.tmp",
        file_name.to_string_lossy(),
        std::process::id(),
        SEQUENCE.fetch_add(1, Ordering::Relaxed)
    ));
    fs::write(&tmp_path, data)
        .with_context(|| format!("failed to write temporary file: {}", tmp_path.display()))?;
    fs::rename(&tmp_path, target).with_context(|| {
        let _ = fs::remove_file(&tmp_path);
        format!(
            "failed to rename {} to {}",
            tmp_path.display(),
            target.display()
        )
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::WorkspaceCollection;
    use std::os::unix::fs::PermissionsExt;
    use std::time::{SystemTime, UNIX_EPOCH};

    #[test]
    fn load_reports_absent_file() {
        let base = unique_temp_dir("store-absent");
        let store = ConfigStore::new(base.join(".quick-switch"));
        assert!(matches!(store.load(), Ok(Loaded::Absent)));
    }

    #[test]
    fn load_reports_malformed_json() {
        let base = unique_temp_dir("store-malformed");
        fs::create_dir_all(&base).unwrap();
        let path = base.join(".quick-switch");
        fs::write(&path, "{ \"schema\": ").unwrap();

        let err = ConfigStore::new(path).load().unwrap_err();
        assert!(matches!(err, LoadError::Malformed { .. }));
        assert!(!err.is_persistent());

        let _ = fs::remove_dir_all(&base);
    }

    #[test]
    fn load_reports_read_error_for_directory() {
        let base = unique_temp_dir("store-directory");
        let path = base.join(".quick-switch");
        fs::create_dir_all(&path).unwrap();

        let err = ConfigStore::new(path).load().unwrap_err();
        assert!(err.is_persistent(), "unexpected error: {err}");

        let _ = fs::remove_dir_all(&base);
    }

    #[test]
    fn load_decodes_invalid_utf8_lossily() {
        let base = unique_temp_dir("store-invalid-utf8");
        fs::create_dir_all(&base).unwrap();
        let path = base.join(".quick-switch");
        fs::write(&path, b"{\"schema\":1,\"projects\":[\"/\xff\xfe\"]}").unwrap();

        match ConfigStore::new(path.clone()).load() {
            Ok(Loaded::Document(ConfigDocument::V1(doc))) => {
                assert_eq!(doc.projects, vec!["/\u{fffd}\u{fffd}".to_string()]);
            }
            other => panic!("unexpected load result: {other:?}"),
        }

        fs::write(&path, b"{\"schema\":\xff}").unwrap();
        let err = ConfigStore::new(path).load().unwrap_err();
        assert!(matches!(err, LoadError::Malformed { .. }));

        let _ = fs::remove_dir_all(&base);
    }

    #[test]
    fn load_reports_access_denied_for_unreadable_file() {
        let base = unique_temp_dir("store-access-denied");
        fs::create_dir_all(&base).unwrap();
        let path = base.join(".quick-switch");
        fs::write(&path, r#"{"schema":3}"#).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o000)).unwrap();

        // Root ignores file modes.
        if File::open(&path).is_err() {
            let err = ConfigStore::new(path.clone()).load().unwrap_err();
            assert!(matches!(err, LoadError::AccessDenied { .. }), "unexpected error: {err}");
            assert!(err.is_persistent());
        }

        fs::set_permissions(&path, fs::Permissions::from_mode(0o644)).unwrap();
        let _ = fs::remove_dir_all(&base);
    }

    #[test]
    fn save_writes_latest_schema_and_cleans_temp_files() {
        let base = unique_temp_dir("store-save");
        let path = base.join(".quick-switch");
        let store = ConfigStore::new(path.clone());

        let mut workspaces = WorkspaceCollection::new();
        workspaces.insert("default".to_string(), vec!["/a".to_string()]);
        store
            .save(DocumentV3 {
                use_workspace: Some("default".to_string()),
                workspaces: Some(workspaces),
                status_text: Some("<project>".to_string()),
            })
            .join()
            .unwrap();

        let raw = fs::read_to_string(&path).unwrap();
        assert!(raw.contains("\"schema\": 3"));
        assert!(raw.contains("\"statusText\": \"<project>\""));
        let leftovers = fs::read_dir(&base)
            .unwrap()
            .filter_map(Result::ok)
            .filter(|entry| entry.file_name().to_string_lossy().ends_with(".tmp"))
            .count();
        assert_eq!(leftovers, 0);

        let loaded = store.load().unwrap();
        assert!(matches!(loaded, Loaded::Document(ConfigDocument::V3(_))));

        let _ = fs::remove_dir_all(&base);
    }

    #[test]
    fn overlapping_saves_end_at_latest_document() {
        let base = unique_temp_dir("store-overlap");
        let path = base.join(".quick-switch");
        let store = ConfigStore::new(path.clone());

        let handles: Vec<_> = (0..8)
            .map(|n| {
                store.save(DocumentV3 {
                    use_workspace: Some(format!("ws-{n}")),
                    workspaces: Some(WorkspaceCollection::new()),
                    status_text: Some(String::new()),
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        match store.load().unwrap() {
            Loaded::Document(ConfigDocument::V3(doc)) => {
                assert_eq!(doc.use_workspace.as_deref(), Some("ws-7"));
            }
            other => panic!("unexpected load result: {other:?}"),
        }

        let _ = fs::remove_dir_all(&base);
    }

    fn unique_temp_dir(label: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        std::env::temp_dir().join(format!("quick-switch-{label}-{nanos}"))
    }
}
