// src/catalog.rs
//! Lazily fetched, session-scoped cache of schema definitions.

use crate::barrier::CountingBarrier;
use crate::error::{MappingError, Result};
use crate::schema::{
    parse_schema_names, FieldDef, RecordTypeDef, SchemaCategory, SchemaObjectDef, SchemaSide,
};
use async_trait::async_trait;
use futures::future::join_all;
use moka::future::Cache;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::OnceCell;

const COMPONENT: &str = "SchemaCatalog";

/// Default record type for one destination object within one wizard answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DefaultRecordType {
    pub api_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_info: Option<String>,
}

/// Defaults keyed by section name immediately followed by the destination
/// object API name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DefaultRecordTypes(HashMap<String, DefaultRecordType>);

impl DefaultRecordTypes {
    pub fn new(entries: HashMap<String, DefaultRecordType>) -> Self {
        Self(entries)
    }

    pub fn key(section: &str, destination_object: &str) -> String {
        format!("{}{}", section, destination_object)
    }

    pub fn get(&self, section: &str, destination_object: &str) -> Option<&DefaultRecordType> {
        self.0.get(&Self::key(section, destination_object))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// The remote schema service. Implementations are request/response calls;
/// the catalog never retries them.
#[async_trait]
pub trait SchemaService: Send + Sync {
    /// Source org object names, category markers prefixed with `=`.
    async fn fetch_org_schema_names(&self) -> anyhow::Result<Vec<String>>;

    async fn fetch_object_def(
        &self,
        side: SchemaSide,
        api_name: &str,
    ) -> anyhow::Result<SchemaObjectDef>;

    /// One page of the destination schema starting at `offset`.
    async fn fetch_destination_schema_page(
        &self,
        offset: usize,
    ) -> anyhow::Result<Vec<SchemaObjectDef>>;

    async fn fetch_default_record_types(
        &self,
        sections: &[String],
    ) -> anyhow::Result<HashMap<String, DefaultRecordType>>;
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    side: SchemaSide,
    api_name: String,
}

impl CacheKey {
    fn new(side: SchemaSide, api_name: &str) -> Self {
        Self {
            side,
            api_name: api_name.to_string(),
        }
    }
}

pub struct SchemaCatalog {
    service: Arc<dyn SchemaService>,
    defs: Cache<CacheKey, Arc<SchemaObjectDef>>,
    defaults: Cache<Vec<String>, Arc<DefaultRecordTypes>>,
    org_names: OnceCell<Vec<SchemaCategory>>,
}

impl SchemaCatalog {
    pub fn new(service: Arc<dyn SchemaService>) -> Self {
        Self::with_capacity(service, 10_000)
    }

    pub fn with_capacity(service: Arc<dyn SchemaService>, max_capacity: u64) -> Self {
        Self {
            service,
            defs: Cache::new(max_capacity),
            defaults: Cache::new(64),
            org_names: OnceCell::new(),
        }
    }

    /// Cached definition, fetched on first use.
    pub async fn get(&self, side: SchemaSide, api_name: &str) -> Result<Arc<SchemaObjectDef>> {
        let key = CacheKey::new(side, api_name);
        if let Some(def) = self.defs.get(&key).await {
            return Ok(def);
        }
        tracing::debug!(component = COMPONENT, operation = "get", %side, object = api_name, "fetching definition");
        let def = self
            .service
            .fetch_object_def(side, api_name)
            .await
            .map_err(|e| {
                tracing::error!(component = COMPONENT, operation = "get", %side, object = api_name, error = %e, "schema fetch failed");
                MappingError::collaborator(COMPONENT, "get", e)
            })?;
        let def = Arc::new(def);
        self.defs.insert(key, def.clone()).await;
        Ok(def)
    }

    /// Cached definition without fetching.
    pub async fn peek(&self, side: SchemaSide, api_name: &str) -> Option<Arc<SchemaObjectDef>> {
        self.defs.get(&CacheKey::new(side, api_name)).await
    }

    /// Fetches every destination page concurrently and merges them.
    ///
    /// Definitions are deduplicated by API name (first seen wins) and then
    /// stable-sorted by label. Every merged def lands in the cache.
    pub async fn get_batch(&self, offsets: &[usize]) -> Result<Vec<Arc<SchemaObjectDef>>> {
        let pages = join_all(
            offsets
                .iter()
                .map(|&offset| self.service.fetch_destination_schema_page(offset)),
        )
        .await;

        let mut barrier = CountingBarrier::new(offsets.len());
        let mut first_error = None;
        let mut seen = HashSet::new();
        let mut merged = Vec::new();
        for (offset, page) in offsets.iter().zip(pages) {
            match page {
                Ok(defs) => {
                    merged.extend(defs.into_iter().filter(|d| seen.insert(d.api_name.clone())));
                    barrier.arrive(true);
                }
                Err(e) => {
                    tracing::error!(component = COMPONENT, operation = "get_batch", offset, error = %e, "schema page fetch failed");
                    first_error.get_or_insert(e);
                    barrier.arrive(false);
                }
            }
        }
        if let Some(summary) = barrier.summary() {
            tracing::debug!(component = COMPONENT, operation = "get_batch", pages = summary.total, failed = summary.failed, "schema paging finished");
        }
        if let Some(e) = first_error {
            return Err(MappingError::collaborator(COMPONENT, "get_batch", e));
        }

        merged.sort_by(|a, b| a.label.cmp(&b.label));
        let mut out = Vec::with_capacity(merged.len());
        for def in merged {
            let def = Arc::new(def);
            self.defs
                .insert(CacheKey::new(SchemaSide::Destination, &def.api_name), def.clone())
                .await;
            out.push(def);
        }
        Ok(out)
    }

    /// The source org's object names grouped by category, fetched once.
    pub async fn org_schema_names(&self) -> Result<&[SchemaCategory]> {
        let categories = self
            .org_names
            .get_or_try_init(|| async {
                let names = self.service.fetch_org_schema_names().await.map_err(|e| {
                    tracing::error!(component = COMPONENT, operation = "org_schema_names", error = %e, "schema name fetch failed");
                    MappingError::collaborator(COMPONENT, "org_schema_names", e)
                })?;
                Ok::<_, MappingError>(parse_schema_names(&names))
            })
            .await?;
        Ok(categories.as_slice())
    }

    /// Default record types for a set of sections, fetched once per set.
    pub async fn default_record_types(&self, sections: &[String]) -> Result<Arc<DefaultRecordTypes>> {
        let mut key = sections.to_vec();
        key.sort();
        key.dedup();
        if let Some(found) = self.defaults.get(&key).await {
            return Ok(found);
        }
        let entries = self
            .service
            .fetch_default_record_types(&key)
            .await
            .map_err(|e| {
                tracing::error!(component = COMPONENT, operation = "default_record_types", error = %e, "default record type lookup failed");
                MappingError::collaborator(COMPONENT, "default_record_types", e)
            })?;
        let defaults = Arc::new(DefaultRecordTypes::new(entries));
        self.defaults.insert(key, defaults.clone()).await;
        Ok(defaults)
    }

    /// Returns the definition once it is known to contain `item`.
    ///
    /// A miss on a cached definition triggers one refetch; a second miss is
    /// reported as [`MappingError::MissingFromCatalog`].
    pub async fn resolve<F>(
        &self,
        side: SchemaSide,
        object: &str,
        item: &str,
        contains: F,
    ) -> Result<Arc<SchemaObjectDef>>
    where
        F: Fn(&SchemaObjectDef) -> bool,
    {
        let def = self.get(side, object).await?;
        if contains(&def) {
            return Ok(def);
        }
        tracing::debug!(component = COMPONENT, operation = "resolve", %side, object, item, "cache miss on item, refetching");
        self.defs.invalidate(&CacheKey::new(side, object)).await;
        let def = self.get(side, object).await?;
        if contains(&def) {
            return Ok(def);
        }
        tracing::error!(component = COMPONENT, operation = "resolve", %side, object, item, "item missing after refetch");
        Err(MappingError::MissingFromCatalog {
            object: object.to_string(),
            item: item.to_string(),
        })
    }

    pub async fn resolve_field(
        &self,
        side: SchemaSide,
        object: &str,
        field: &str,
    ) -> Result<Arc<SchemaObjectDef>> {
        self.resolve(side, object, field, |def| def.has_field(field))
            .await
    }

    /// Adds a `[NEW] <label>` field option to a cached destination def.
    pub async fn splice_field(&self, object: &str, field: FieldDef) -> Result<()> {
        let mut def = (*self.get(SchemaSide::Destination, object).await?).clone();
        def.upsert_field(field);
        self.defs
            .insert(CacheKey::new(SchemaSide::Destination, object), Arc::new(def))
            .await;
        Ok(())
    }

    pub async fn splice_record_type(&self, object: &str, record_type: RecordTypeDef) -> Result<()> {
        let mut def = (*self.get(SchemaSide::Destination, object).await?).clone();
        def.upsert_record_type(record_type);
        self.defs
            .insert(CacheKey::new(SchemaSide::Destination, object), Arc::new(def))
            .await;
        Ok(())
    }

    pub fn entry_count(&self) -> u64 {
        self.defs.entry_count()
    }
}
