// src/report.rs
//! Plain-text completeness report rendered through minijinja.

use crate::catalog::SchemaCatalog;
use crate::document::{Completeness, MappingDocument, MappingLevel, ObjectKey, SectionKey};
use crate::mapping::{Destination, ObjectMapping};
use crate::schema::SchemaSide;
use anyhow::{anyhow, Result};
use minijinja::{context, Environment};
use serde::Serialize;
use std::fs;
use std::path::Path;

pub const REPORT_TEMPLATE: &str = "report";

const DEFAULT_TEMPLATE: &str = r#"Mapping report for {{ assessment }}
{% for section in sections %}
== {{ section.name }} ({{ section.objects.label }})
{% for row in section.rows -%}
- {{ row.source or "?" }} -> {{ row.destination or "?" }}
{%- if row.fields %}: {{ row.fields.label }}, {{ row.record_types.label }}, {{ row.child_relationships.label }}{% endif %}
{%- if row.pending_new %} [{{ row.pending_new }} new]{% endif %}
{%- if row.pending_clone %} [{{ row.pending_clone }} clone]{% endif %}
{% endfor -%}
{% endfor %}"#;

#[derive(Debug, Clone, Serialize)]
pub struct ObjectReport {
    pub source: String,
    pub destination: String,
    pub fields: Option<Completeness>,
    pub record_types: Option<Completeness>,
    pub child_relationships: Option<Completeness>,
    pub pending_new: usize,
    pub pending_clone: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct SectionReport {
    pub name: String,
    pub objects: Completeness,
    pub rows: Vec<ObjectReport>,
}

/// Collects completeness for every section. Objects whose source definition
/// cannot be fetched are listed without level counts.
pub async fn build_report(
    document: &MappingDocument,
    catalog: &SchemaCatalog,
) -> Result<Vec<SectionReport>> {
    let mut keys: Vec<(String, SectionKey)> = document
        .section_names()
        .map(|name| (name.to_string(), SectionKey::recommended(name)))
        .collect();
    keys.push(("Additional".to_string(), SectionKey::Additional));

    let mut sections = Vec::with_capacity(keys.len());
    for (name, key) in keys {
        let objects = document.section_completeness(&key)?;
        let mut rows = Vec::new();
        for object_key in document.object_keys(&key)? {
            rows.push(object_report(document, catalog, &object_key).await?);
        }
        sections.push(SectionReport {
            name,
            objects,
            rows,
        });
    }
    Ok(sections)
}

async fn object_report(
    document: &MappingDocument,
    catalog: &SchemaCatalog,
    key: &ObjectKey,
) -> Result<ObjectReport> {
    let object = document.object(key)?;
    let (fields, record_types, child_relationships) =
        source_def_levels(document, catalog, key, object)
            .await
            .unwrap_or((None, None, None));
    Ok(ObjectReport {
        source: object.source.clone(),
        destination: object.destination.clone(),
        fields,
        record_types,
        child_relationships,
        pending_new: object
            .field_mapping
            .iter()
            .filter(|row| row.new_meta.is_some() || row.destination == Destination::PendingNew)
            .count(),
        pending_clone: object
            .field_mapping
            .iter()
            .filter(|row| row.destination == Destination::PendingClone)
            .count(),
    })
}

type Levels = (Option<Completeness>, Option<Completeness>, Option<Completeness>);

async fn source_def_levels(
    document: &MappingDocument,
    catalog: &SchemaCatalog,
    key: &ObjectKey,
    object: &ObjectMapping,
) -> Option<Levels> {
    if !object.show_details {
        return None;
    }
    let def = match catalog.get(SchemaSide::Source, &object.source).await {
        Ok(def) => def,
        Err(e) => {
            tracing::warn!(component = "Report", operation = "build_report", object = %object.source, error = %e, "no source definition");
            return None;
        }
    };
    let level = |level| document.completeness(key, level, &def).ok();
    Some((
        level(MappingLevel::Field),
        level(MappingLevel::RecordType),
        level(MappingLevel::ChildRelationship),
    ))
}

/// Built-in report template plus any `*.j2` files in `dir`; a file named
/// `report.j2` replaces the built-in one.
pub fn load_templates<P: AsRef<Path>>(dir: Option<P>) -> Result<Environment<'static>> {
    let mut env = Environment::new();
    env.add_template(REPORT_TEMPLATE, DEFAULT_TEMPLATE)?;
    let Some(dir) = dir else {
        return Ok(env);
    };

    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().and_then(|s| s.to_str()) != Some("j2") {
            continue;
        }
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .ok_or_else(|| anyhow!("template path {} has no name", path.display()))?;
        let content = fs::read_to_string(&path)?;
        env.add_template_owned(name, content)?;
    }
    Ok(env)
}

pub fn render_report(
    env: &Environment<'_>,
    assessment: &str,
    sections: &[SectionReport],
) -> Result<String> {
    let template = env
        .get_template(REPORT_TEMPLATE)
        .map_err(|_| anyhow!("Missing template '{}'.", REPORT_TEMPLATE))?;
    Ok(template.render(context! { assessment => assessment, sections => sections })?)
}
