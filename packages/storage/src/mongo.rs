//! `MongoDB` as a document database backend.
//!
//! One document per incident in a single collection. Saving replaces
//! the whole collection: every document is deleted, then the full master
//! collection is bulk-inserted. A crash between the two steps leaves the
//! collection empty until the next successful save.

use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::bson::{self, Document, doc};
use mongodb::{Client, Collection};
use traffic_incidents_incident_models::Incident;

use crate::settings::MongoSettings;
use crate::{StorageBackend, StorageError};

/// Database-assigned identity field, never exposed to callers.
const ID_FIELD: &str = "_id";

/// Stores the master collection as one document per incident.
#[derive(Debug, Clone)]
pub struct MongoBackend {
    collection: Collection<Document>,
}

impl MongoBackend {
    /// Parses the connection string and prepares the collection handle.
    ///
    /// The database named in the connection string wins over
    /// [`MongoSettings::database`]. No round trip to the server happens
    /// here; connection problems surface on the first load or save.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Database`] if the connection string is
    /// invalid.
    pub async fn connect(settings: &MongoSettings) -> Result<Self, StorageError> {
        let client = Client::with_uri_str(&settings.uri).await?;
        let database = client
            .default_database()
            .unwrap_or_else(|| client.database(&settings.database));

        log::debug!(
            "Using MongoDB collection {}.{}",
            database.name(),
            settings.collection
        );

        Ok(Self {
            collection: database.collection(&settings.collection),
        })
    }
}

#[async_trait]
impl StorageBackend for MongoBackend {
    fn name(&self) -> &'static str {
        "mongodb"
    }

    async fn try_load(&self) -> Result<Vec<Incident>, StorageError> {
        let documents: Vec<Document> = self.collection.find(doc! {}).await?.try_collect().await?;

        let total = documents.len();
        let incidents: Vec<Incident> = documents
            .into_iter()
            .filter_map(|document| match from_document(document) {
                Ok(incident) => Some(incident),
                Err(e) => {
                    log::debug!("Skipping undecodable document: {e}");
                    None
                }
            })
            .collect();

        if incidents.len() < total {
            log::warn!(
                "Skipped {} of {total} documents that could not be decoded",
                total - incidents.len()
            );
        }

        Ok(incidents)
    }

    async fn save(&self, incidents: &[Incident]) -> Result<(), StorageError> {
        // Serialize first so an encoding failure never empties the collection.
        let documents = incidents
            .iter()
            .map(bson::to_document)
            .collect::<Result<Vec<_>, _>>()?;

        self.collection.delete_many(doc! {}).await?;

        if !documents.is_empty() {
            self.collection.insert_many(documents).await?;
        }

        log::info!(
            "Saved {} incidents to MongoDB collection {}",
            incidents.len(),
            self.collection.name()
        );
        Ok(())
    }
}

/// Decodes a stored document, dropping the database identity field.
fn from_document(mut document: Document) -> Result<Incident, bson::de::Error> {
    document.remove(ID_FIELD);
    bson::from_document(document)
}
