// src/mongo.rs
use crate::document::MappingDocument;
use crate::gateway::{CloneRequests, PersistenceGateway, ResolvedClones};
use crate::mapping::ExistingFieldDescriptor;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use bson::{doc, Bson, Document};
use futures::stream::StreamExt;
use mongodb::options::ClientOptions;
use mongodb::{Client, Collection};

pub async fn connect(uri: &str, db: &str, collection: &str) -> Result<Collection<Document>> {
    let client_options = ClientOptions::parse(uri).await?;
    let client = Client::with_options(client_options)?;
    let db = client.database(db);
    Ok(db.collection::<Document>(collection))
}

/// Mapping documents stored one per assessment (`_id` = assessment id).
///
/// Clone requests are answered from a second collection holding field
/// metadata documents keyed `Object.Field`.
pub struct MongoGateway {
    documents: Collection<Document>,
    field_metadata: Collection<Document>,
}

impl MongoGateway {
    pub fn new(documents: Collection<Document>, field_metadata: Collection<Document>) -> Self {
        Self {
            documents,
            field_metadata,
        }
    }

    pub async fn connect(uri: &str, db: &str, collection: &str) -> Result<Self> {
        let documents = connect(uri, db, collection).await?;
        let field_metadata = connect(uri, db, &format!("{}_fields", collection)).await?;
        Ok(Self::new(documents, field_metadata))
    }
}

#[async_trait]
impl PersistenceGateway for MongoGateway {
    async fn load(&self, assessment_id: &str) -> Result<Option<MappingDocument>> {
        let Some(stored) = self.documents.find_one(doc! { "_id": assessment_id }).await? else {
            return Ok(None);
        };
        if stored.get_bool("isEmpty").unwrap_or(false) {
            return Ok(None);
        }
        let mapping = stored
            .get_str("mapping")
            .map_err(|_| anyhow!("stored mapping for '{}' has no 'mapping' field", assessment_id))?;
        Ok(Some(MappingDocument::from_json(mapping)?))
    }

    async fn save(
        &self,
        assessment_id: &str,
        document: &MappingDocument,
        is_empty: bool,
    ) -> Result<()> {
        let serialized = document.to_json()?;
        let updated_at = bson::DateTime::from_chrono(chrono::Utc::now());
        self.documents
            .replace_one(
                doc! { "_id": assessment_id },
                doc! {
                    "_id": assessment_id,
                    "mapping": serialized,
                    "isEmpty": is_empty,
                    "updatedAt": updated_at,
                },
            )
            .upsert(true)
            .await?;
        Ok(())
    }

    async fn resolve_clones(&self, requests: &CloneRequests) -> Result<ResolvedClones> {
        let mut resolved = ResolvedClones::new();
        if requests.is_empty() {
            return Ok(resolved);
        }
        let keys: Vec<Bson> = requests.iter().map(|(k, _)| Bson::from(k.as_str())).collect();
        let mut cursor = self
            .field_metadata
            .find(doc! { "_id": { "$in": keys } })
            .await?;

        while let Some(found) = cursor.next().await {
            let found = found?;
            let key = found.get_str("_id")?.to_string();
            let Some(destination_object) = requests
                .recommended
                .get(&key)
                .or_else(|| requests.additional.get(&key))
            else {
                continue;
            };
            let mut meta: ExistingFieldDescriptor = bson::from_document(found)?;
            let field = key.split_once('.').map(|(_, f)| f).unwrap_or(&key);
            meta.full_name = format!("{}.{}", destination_object, field);
            resolved.insert(key, meta);
        }
        Ok(resolved)
    }
}
