//! JSON files on the local filesystem.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use traffic_incidents_incident_models::Incident;

use crate::settings::LocalFileSettings;
use crate::{StorageBackend, StorageError, decode_collection, encode_collection};

/// Persists the master collection as a pretty-printed JSON array, and
/// mirrors it to a second "latest" file on every save.
#[derive(Debug, Clone)]
pub struct LocalFileBackend {
    master_path: PathBuf,
    latest_path: PathBuf,
}

impl LocalFileBackend {
    /// Creates a backend writing to the configured paths. Nothing is
    /// touched on disk until the first load or save.
    #[must_use]
    pub fn new(settings: &LocalFileSettings) -> Self {
        Self {
            master_path: settings.master_path.clone(),
            latest_path: settings.latest_path.clone(),
        }
    }
}

#[async_trait]
impl StorageBackend for LocalFileBackend {
    fn name(&self) -> &'static str {
        "local file"
    }

    async fn try_load(&self) -> Result<Vec<Incident>, StorageError> {
        let text = match tokio::fs::read_to_string(&self.master_path).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::info!(
                    "No master file at {}, starting empty",
                    self.master_path.display()
                );
                return Ok(Vec::new());
            }
            Err(e) => return Err(e.into()),
        };

        decode_collection(&text)
    }

    async fn save(&self, incidents: &[Incident]) -> Result<(), StorageError> {
        let json = encode_collection(incidents)?;

        write_file(&self.master_path, json.as_bytes()).await?;
        write_file(&self.latest_path, json.as_bytes()).await?;

        log::info!(
            "Saved {} incidents to {}",
            incidents.len(),
            self.master_path.display()
        );
        Ok(())
    }
}

/// Writes `bytes` to a sibling temp file and renames it over `path`, so
/// readers never observe a partially written file.
async fn write_file(path: &Path, bytes: &[u8]) -> Result<(), StorageError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    tokio::fs::write(&tmp, bytes).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}
