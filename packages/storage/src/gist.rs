//! GitHub gist as a remote document store.
//!
//! The whole master collection lives in one file of one gist. Loading
//! reads that file; saving re-reads the gist to discover the file name,
//! then overwrites its content with a `PATCH`.

use async_trait::async_trait;
use serde_json::Value;
use traffic_incidents_incident_models::Incident;

use crate::settings::GistSettings;
use crate::{StorageBackend, StorageError, decode_collection, encode_collection};

/// Media type requested from the GitHub REST API.
const ACCEPT: &str = "application/vnd.github+json";

/// GitHub REST API version header value.
const API_VERSION: &str = "2022-11-28";

/// Stores the master collection in a single gist file.
#[derive(Clone)]
pub struct GistBackend {
    client: reqwest::Client,
    settings: GistSettings,
}

impl GistBackend {
    /// Creates a backend for the configured gist.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Http`] if the HTTP client cannot be built.
    pub fn new(settings: GistSettings) -> Result<Self, StorageError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("traffic-incidents/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client, settings })
    }

    fn gist_url(&self) -> String {
        format!(
            "{}/gists/{}",
            self.settings.api_url.trim_end_matches('/'),
            self.settings.gist_id
        )
    }

    async fn fetch_document(&self) -> Result<Value, StorageError> {
        let document = self
            .client
            .get(self.gist_url())
            .bearer_auth(&self.settings.token)
            .header(reqwest::header::ACCEPT, ACCEPT)
            .header("X-GitHub-Api-Version", API_VERSION)
            .send()
            .await?
            .error_for_status()?
            .json::<Value>()
            .await?;
        Ok(document)
    }

    async fn file_content(&self, file: &Value) -> Result<String, StorageError> {
        let truncated = file
            .get("truncated")
            .and_then(Value::as_bool)
            .unwrap_or(false);

        if truncated && let Some(raw_url) = file.get("raw_url").and_then(Value::as_str) {
            log::debug!("Gist file is truncated, fetching {raw_url}");
            let text = self
                .client
                .get(raw_url)
                .bearer_auth(&self.settings.token)
                .send()
                .await?
                .error_for_status()?
                .text()
                .await?;
            return Ok(text);
        }

        file.get("content")
            .and_then(Value::as_str)
            .map(String::from)
            .ok_or_else(|| StorageError::Remote {
                message: "gist file has no content".to_string(),
            })
    }
}

impl std::fmt::Debug for GistBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GistBackend")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl StorageBackend for GistBackend {
    fn name(&self) -> &'static str {
        "gist"
    }

    async fn try_load(&self) -> Result<Vec<Incident>, StorageError> {
        let document = self.fetch_document().await?;

        let Some((filename, file)) = select_file(&document, &self.settings.filename) else {
            log::info!("Gist {} has no files, starting empty", self.settings.gist_id);
            return Ok(Vec::new());
        };

        log::debug!("Reading incidents from gist file {filename}");
        let content = self.file_content(file).await?;
        decode_collection(&content)
    }

    async fn save(&self, incidents: &[Incident]) -> Result<(), StorageError> {
        let document = self.fetch_document().await?;
        let filename = select_file(&document, &self.settings.filename)
            .map_or_else(|| self.settings.filename.clone(), |(name, _)| name.to_string());

        let content = encode_collection(incidents)?;

        self.client
            .patch(self.gist_url())
            .bearer_auth(&self.settings.token)
            .header(reqwest::header::ACCEPT, ACCEPT)
            .header("X-GitHub-Api-Version", API_VERSION)
            .json(&update_body(&filename, content))
            .send()
            .await?
            .error_for_status()?;

        log::info!(
            "Saved {} incidents to gist {} ({filename})",
            incidents.len(),
            self.settings.gist_id
        );
        Ok(())
    }
}

/// Picks the file holding the collection: `preferred` if the gist has
/// it, otherwise the first file listed.
#[must_use]
pub fn select_file<'a>(document: &'a Value, preferred: &str) -> Option<(&'a str, &'a Value)> {
    let files = document.get("files")?.as_object()?;
    files
        .get_key_value(preferred)
        .or_else(|| files.iter().next())
        .map(|(name, file)| (name.as_str(), file))
}

/// Builds the `PATCH /gists/{id}` body that replaces one file's content.
#[must_use]
pub fn update_body(filename: &str, content: String) -> Value {
    let mut files = serde_json::Map::new();
    files.insert(
        filename.to_string(),
        serde_json::json!({ "content": content }),
    );
    serde_json::json!({ "files": files })
}
