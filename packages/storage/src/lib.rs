#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Persistence backends for the incident master collection.
//!
//! Every backend implements [`StorageBackend`]: load the whole collection
//! at startup, save the whole collection after every merge. The backend
//! is chosen once by [`connect`] from a [`StorageSettings`] value and is
//! never switched mid-run, even if it starts failing.
//!
//! | Backend | Selected when | Save strategy |
//! |---|---|---|
//! | [`GistBackend`] | gist id and token are configured | `PATCH` one gist file |
//! | [`MongoBackend`] | a connection string is configured | delete all, bulk insert |
//! | [`LocalFileBackend`] | otherwise | rewrite master and latest files |

pub mod gist;
pub mod local;
pub mod mongo;
pub mod settings;

use async_trait::async_trait;
use traffic_incidents_incident_models::Incident;

pub use gist::GistBackend;
pub use local::LocalFileBackend;
pub use mongo::MongoBackend;
pub use settings::{BackendKind, GistSettings, LocalFileSettings, MongoSettings, StorageSettings};

/// Errors that can occur while loading or saving the master collection.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// I/O error reading or writing local files.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The persisted collection is not a JSON array.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP request to the remote document store failed.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The remote document store returned something unusable.
    #[error("Remote store error: {message}")]
    Remote {
        /// Description of what went wrong.
        message: String,
    },

    /// Document database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] mongodb::error::Error),

    /// An incident could not be encoded as a database document.
    #[error("BSON encoding error: {0}")]
    Bson(#[from] mongodb::bson::ser::Error),
}

/// A place the master collection is durably kept.
///
/// Implementations provide [`try_load`](Self::try_load) and
/// [`save`](Self::save); callers normally use [`load`](Self::load),
/// which never fails.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Short backend name for logs.
    fn name(&self) -> &'static str;

    /// Reads the persisted collection.
    ///
    /// A store that simply has nothing yet returns an empty collection
    /// rather than an error.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the store is unreachable or its
    /// content cannot be parsed.
    async fn try_load(&self) -> Result<Vec<Incident>, StorageError>;

    /// Reads the persisted collection, falling back to an empty one on
    /// any failure.
    async fn load(&self) -> Vec<Incident> {
        match self.try_load().await {
            Ok(incidents) => {
                log::info!(
                    "Loaded {} existing incidents from {}",
                    incidents.len(),
                    self.name()
                );
                incidents
            }
            Err(e) => {
                log::warn!(
                    "Failed to load incidents from {}, starting empty: {e}",
                    self.name()
                );
                Vec::new()
            }
        }
    }

    /// Overwrites the persisted collection with `incidents`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] on any transport, serialization, or
    /// filesystem failure. Remote state is left as it was where the
    /// backend allows.
    async fn save(&self, incidents: &[Incident]) -> Result<(), StorageError>;
}

/// Constructs the backend selected by `settings`.
///
/// # Errors
///
/// Returns [`StorageError`] if the selected backend cannot be
/// constructed (e.g. an invalid `MongoDB` connection string).
pub async fn connect(settings: &StorageSettings) -> Result<Box<dyn StorageBackend>, StorageError> {
    let backend: Box<dyn StorageBackend> = match settings.kind() {
        BackendKind::Gist => {
            let gist = settings.gist.clone().ok_or_else(|| StorageError::Remote {
                message: "gist settings missing".to_string(),
            })?;
            Box::new(GistBackend::new(gist)?)
        }
        BackendKind::Mongo => {
            let mongo = settings.mongo.as_ref().ok_or_else(|| StorageError::Remote {
                message: "MongoDB settings missing".to_string(),
            })?;
            Box::new(MongoBackend::connect(mongo).await?)
        }
        BackendKind::LocalFile => Box::new(LocalFileBackend::new(&settings.local)),
    };

    log::info!("Using {} storage backend", backend.name());
    Ok(backend)
}

/// Decodes a persisted JSON array of incidents.
///
/// Entries that do not decode as an [`Incident`] are skipped with a
/// warning; only a document that is not a JSON array at all is an error.
///
/// # Errors
///
/// Returns [`StorageError::Json`] if `text` is not a JSON array.
pub fn decode_collection(text: &str) -> Result<Vec<Incident>, StorageError> {
    let entries: Vec<serde_json::Value> = serde_json::from_str(text)?;
    let total = entries.len();

    let incidents: Vec<Incident> = entries
        .into_iter()
        .filter_map(|entry| serde_json::from_value(entry).ok())
        .collect();

    if incidents.len() < total {
        log::warn!(
            "Skipped {} of {total} persisted incidents that could not be decoded",
            total - incidents.len()
        );
    }

    Ok(incidents)
}

/// Encodes the collection as a pretty-printed JSON array.
///
/// # Errors
///
/// Returns [`StorageError::Json`] if serialization fails.
pub fn encode_collection(incidents: &[Incident]) -> Result<String, StorageError> {
    Ok(serde_json::to_string_pretty(incidents)?)
}
