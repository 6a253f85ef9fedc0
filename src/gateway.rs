// src/gateway.rs
//! Persistence boundary for mapping documents.

use crate::document::MappingDocument;
use crate::mapping::ExistingFieldDescriptor;
use crate::schema::{split_label, SchemaObjectDef};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

/// Pending clone rows, `SourceObject.SourceField` -> destination object.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CloneRequests {
    pub recommended: BTreeMap<String, String>,
    pub additional: BTreeMap<String, String>,
}

impl CloneRequests {
    pub fn is_empty(&self) -> bool {
        self.recommended.is_empty() && self.additional.is_empty()
    }

    pub fn len(&self) -> usize {
        self.recommended.len() + self.additional.len()
    }

    /// Both maps chained, recommended first.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.recommended.iter().chain(self.additional.iter())
    }
}

/// Clone resolutions keyed like the request.
pub type ResolvedClones = HashMap<String, ExistingFieldDescriptor>;

#[async_trait]
pub trait PersistenceGateway: Send + Sync {
    async fn load(&self, assessment_id: &str) -> Result<Option<MappingDocument>>;

    /// Stores the persistable view of `document`.
    async fn save(&self, assessment_id: &str, document: &MappingDocument, is_empty: bool)
        -> Result<()>;

    async fn resolve_clones(&self, requests: &CloneRequests) -> Result<ResolvedClones>;
}

/// Builds the descriptor a clone of `field_api_name` on `destination_object`
/// would carry, from the source object's definition.
pub fn describe_clone(
    source: &SchemaObjectDef,
    field_api_name: &str,
    destination_object: &str,
) -> Option<ExistingFieldDescriptor> {
    let field = source.field(field_api_name)?;
    Some(ExistingFieldDescriptor {
        full_name: format!("{}.{}", destination_object, field.api_name),
        label: split_label(&field.label).name.to_string(),
        data_type: field.data_type.clone().unwrap_or_default(),
        reference_to: field.connected_object.clone(),
        ..Default::default()
    })
}

/// Mapping documents as JSON files, one per assessment.
pub struct FileGateway {
    dir: PathBuf,
    source_defs: HashMap<String, SchemaObjectDef>,
}

impl FileGateway {
    pub fn new<P: AsRef<Path>>(dir: P, source_defs: Vec<SchemaObjectDef>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            source_defs: source_defs
                .into_iter()
                .map(|def| (def.api_name.clone(), def))
                .collect(),
        }
    }

    fn path_for(&self, assessment_id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", assessment_id))
    }
}

#[async_trait]
impl PersistenceGateway for FileGateway {
    async fn load(&self, assessment_id: &str) -> Result<Option<MappingDocument>> {
        let path = self.path_for(assessment_id);
        if !tokio::fs::try_exists(&path).await? {
            return Ok(None);
        }
        let data = tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("reading {}", path.display()))?;
        let document = MappingDocument::from_json(&data)?;
        Ok(Some(document))
    }

    async fn save(
        &self,
        assessment_id: &str,
        document: &MappingDocument,
        is_empty: bool,
    ) -> Result<()> {
        let path = self.path_for(assessment_id);
        if is_empty {
            if tokio::fs::try_exists(&path).await? {
                tokio::fs::remove_file(&path).await?;
            }
            return Ok(());
        }
        tokio::fs::create_dir_all(&self.dir).await?;
        let data = document.to_json_pretty()?;
        tokio::fs::write(&path, data)
            .await
            .with_context(|| format!("writing {}", path.display()))?;
        Ok(())
    }

    async fn resolve_clones(&self, requests: &CloneRequests) -> Result<ResolvedClones> {
        let mut resolved = ResolvedClones::new();
        for (key, destination_object) in requests.iter() {
            let (object, field) = key
                .split_once('.')
                .ok_or_else(|| anyhow!("malformed clone key '{}'", key))?;
            let def = self
                .source_defs
                .get(object)
                .ok_or_else(|| anyhow!("no source definition for '{}'", object))?;
            if let Some(meta) = describe_clone(def, field, destination_object) {
                resolved.insert(key.clone(), meta);
            }
        }
        Ok(resolved)
    }
}
