//! Backend selection settings.
//!
//! All credentials and paths the backends need are collected into one
//! [`StorageSettings`] value up front. Which backend is used is decided
//! once from what is present: remote document store, then document
//! database, then local file.

use std::path::PathBuf;

use strum_macros::Display;

/// Default path of the authoritative master file.
pub const DEFAULT_MASTER_PATH: &str = "data/incidents_master.json";

/// Default path of the copy served to the visualization layer.
pub const DEFAULT_LATEST_PATH: &str = "data/incidents_latest.json";

/// Default GitHub REST API base URL.
pub const DEFAULT_GIST_API_URL: &str = "https://api.github.com";

/// Filename written when the gist has no files yet.
pub const DEFAULT_GIST_FILENAME: &str = "incidents_master.json";

/// Database used when the connection string names none.
pub const DEFAULT_MONGO_DATABASE: &str = "traffic_incidents";

/// Collection holding one document per incident.
pub const MONGO_COLLECTION: &str = "incidents";

/// The persistence mechanism in use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "snake_case")]
pub enum BackendKind {
    /// JSON files on the local filesystem.
    LocalFile,
    /// A GitHub gist holding the collection as one JSON file.
    Gist,
    /// A `MongoDB` collection with one document per incident.
    Mongo,
}

/// Local-file backend settings. Always present; it is the fallback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalFileSettings {
    /// Authoritative master file.
    pub master_path: PathBuf,
    /// Copy rewritten on every save for the visualization layer.
    pub latest_path: PathBuf,
}

impl Default for LocalFileSettings {
    fn default() -> Self {
        Self {
            master_path: PathBuf::from(DEFAULT_MASTER_PATH),
            latest_path: PathBuf::from(DEFAULT_LATEST_PATH),
        }
    }
}

/// Remote document store (GitHub gist) settings.
#[derive(Clone, PartialEq, Eq)]
pub struct GistSettings {
    /// Gist identifier.
    pub gist_id: String,
    /// Bearer token with gist scope.
    pub token: String,
    /// Preferred filename inside the gist.
    pub filename: String,
    /// REST API base URL.
    pub api_url: String,
}

impl GistSettings {
    /// Creates settings for `gist_id` with default filename and API URL.
    #[must_use]
    pub fn new(gist_id: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            gist_id: gist_id.into(),
            token: token.into(),
            filename: DEFAULT_GIST_FILENAME.to_string(),
            api_url: DEFAULT_GIST_API_URL.to_string(),
        }
    }
}

impl std::fmt::Debug for GistSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GistSettings")
            .field("gist_id", &self.gist_id)
            .field("token", &"***")
            .field("filename", &self.filename)
            .field("api_url", &self.api_url)
            .finish()
    }
}

/// Document database (`MongoDB`) settings.
#[derive(Clone, PartialEq, Eq)]
pub struct MongoSettings {
    /// Connection string.
    pub uri: String,
    /// Database name, used when `uri` does not name one.
    pub database: String,
    /// Collection name.
    pub collection: String,
}

impl MongoSettings {
    /// Creates settings for `uri` with default database and collection.
    #[must_use]
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            database: DEFAULT_MONGO_DATABASE.to_string(),
            collection: MONGO_COLLECTION.to_string(),
        }
    }
}

impl std::fmt::Debug for MongoSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MongoSettings")
            .field("uri", &"***")
            .field("database", &self.database)
            .field("collection", &self.collection)
            .finish()
    }
}

/// Everything needed to construct any backend.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StorageSettings {
    /// Local-file settings.
    pub local: LocalFileSettings,
    /// Remote document store, when configured.
    pub gist: Option<GistSettings>,
    /// Document database, when configured.
    pub mongo: Option<MongoSettings>,
}

impl StorageSettings {
    /// Returns the backend these settings select.
    #[must_use]
    pub const fn kind(&self) -> BackendKind {
        if self.gist.is_some() {
            BackendKind::Gist
        } else if self.mongo.is_some() {
            BackendKind::Mongo
        } else {
            BackendKind::LocalFile
        }
    }
}
