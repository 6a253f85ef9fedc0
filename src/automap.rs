// src/automap.rs
//! Heuristic proposal of field, record type and child relationship rows.
//!
//! Matching works on labels shaped like `"Name (Type)"`: two items match when
//! their names (text before `" ("`) are equal or their API names are equal.
//! Fields additionally need the source type token to equal the destination
//! data type with its first letter capitalized.
//!
//! Existing rows are never overwritten: every destination already present on
//! the object is skipped, so running the mapper twice adds nothing new.

use crate::barrier::{BatchSummary, CountingBarrier};
use crate::catalog::{DefaultRecordType, DefaultRecordTypes, SchemaCatalog};
use crate::document::{MappingDocument, ObjectKey, SectionKey};
use crate::error::Result;
use crate::mapping::{Destination, FieldMapping, ObjectMapping, RecordTypeMapping};
use crate::metadata::child_mapping;
use crate::schema::{capitalize_first, split_label, FieldDef, SchemaObjectDef, SchemaSide};
use futures::future::join_all;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

pub(crate) const COMPONENT: &str = "AutoMapper";

/// Rows added to one object mapping.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ObjectProposals {
    pub fields: usize,
    pub record_types: usize,
    pub child_relationships: usize,
}

impl ObjectProposals {
    pub fn total(&self) -> usize {
        self.fields + self.record_types + self.child_relationships
    }
}

/// Result of auto-mapping a whole section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AutoMapSummary {
    pub batch: BatchSummary,
    pub proposals: ObjectProposals,
    /// Objects whose definitions could not be fetched, with the reason
    pub failures: Vec<(ObjectKey, String)>,
}

fn names_match(source_label: &str, source_api: &str, dest_label: &str, dest_api: &str) -> bool {
    split_label(source_label).name == split_label(dest_label).name || source_api == dest_api
}

/// The source type is the last `(Type)` token of the source label; a label
/// without one falls back to the source `dataType` with its first letter
/// capitalized. It must equal the capitalized destination `dataType`, and a
/// side with no type never matches.
fn types_match(source: &FieldDef, destination: &FieldDef) -> bool {
    let source_type = split_label(&source.label)
        .type_token
        .map(str::to_string)
        .or_else(|| source.data_type.as_deref().map(capitalize_first));
    let dest_type = destination.data_type.as_deref().map(capitalize_first);
    matches!((source_type, dest_type), (Some(s), Some(d)) if s == d)
}

/// Appends proposals for one object mapping.
///
/// `default_record_type` is the default already assigned for this
/// destination within the current answer; when present no explicit `Master`
/// row is proposed.
pub fn map_object(
    object: &mut ObjectMapping,
    source: &SchemaObjectDef,
    destination: &SchemaObjectDef,
    default_record_type: Option<&DefaultRecordType>,
) -> ObjectProposals {
    ObjectProposals {
        fields: map_fields(object, source, destination),
        record_types: map_record_types(object, source, destination, default_record_type),
        child_relationships: map_child_relationships(object, source, destination),
    }
}

fn map_fields(
    object: &mut ObjectMapping,
    source: &SchemaObjectDef,
    destination: &SchemaObjectDef,
) -> usize {
    let mut seen: HashSet<String> = object
        .mapped_field_destinations()
        .map(str::to_string)
        .collect();
    let mut added = 0;
    for src in &source.fields {
        let candidate = destination.fields.iter().find(|dst| {
            !seen.contains(&dst.api_name)
                && names_match(&src.label, &src.api_name, &dst.label, &dst.api_name)
                && types_match(src, dst)
        });
        if let Some(dst) = candidate {
            seen.insert(dst.api_name.clone());
            object.field_mapping.push(FieldMapping {
                source: src.api_name.clone(),
                destination: Destination::Mapped(dst.api_name.clone()),
                user_generated: true,
                ..Default::default()
            });
            added += 1;
        }
    }
    added
}

fn map_record_types(
    object: &mut ObjectMapping,
    source: &SchemaObjectDef,
    destination: &SchemaObjectDef,
    default_record_type: Option<&DefaultRecordType>,
) -> usize {
    let mut seen: HashSet<String> = object
        .record_type_mapping
        .iter()
        .filter(|row| !row.destination.is_empty())
        .map(|row| row.destination.clone())
        .collect();
    let mut added = 0;
    for src in &source.record_types {
        if src.api_name == RecordTypeMapping::MASTER {
            if let Some(default) = default_record_type {
                tracing::debug!(
                    component = COMPONENT,
                    operation = "map_record_types",
                    object = %destination.api_name,
                    default = %default.api_name,
                    "default record type assigned, skipping Master"
                );
                continue;
            }
            if seen.insert(destination.api_name.clone()) {
                object.record_type_mapping.push(RecordTypeMapping {
                    user_generated: true,
                    ..RecordTypeMapping::new(RecordTypeMapping::MASTER, destination.api_name.clone())
                });
                added += 1;
            }
            continue;
        }
        let candidate = destination.record_types.iter().find(|dst| {
            !seen.contains(&dst.api_name)
                && names_match(&src.label, &src.api_name, &dst.label, &dst.api_name)
        });
        if let Some(dst) = candidate {
            seen.insert(dst.api_name.clone());
            object.record_type_mapping.push(RecordTypeMapping {
                user_generated: true,
                ..RecordTypeMapping::new(src.api_name.clone(), dst.api_name.clone())
            });
            added += 1;
        }
    }
    added
}

fn map_child_relationships(
    object: &mut ObjectMapping,
    source: &SchemaObjectDef,
    destination: &SchemaObjectDef,
) -> usize {
    let mut seen: HashSet<String> = object
        .child_relationships
        .iter()
        .map(|c| c.value.clone())
        .collect();
    let mut added = 0;
    for src in &source.child_relationships {
        if seen.contains(&src.api_name) {
            continue;
        }
        let matched = destination
            .child_relationships
            .iter()
            .any(|dst| names_match(&src.label, &src.api_name, &dst.label, &dst.api_name));
        if matched {
            seen.insert(src.api_name.clone());
            object
                .child_relationships
                .push(child_mapping(src, &destination.api_name));
            added += 1;
        }
    }
    added
}

type DefLookup = HashMap<(SchemaSide, String), std::result::Result<Arc<SchemaObjectDef>, String>>;

/// Runs [`map_object`] over every detailed object mapping of a section.
pub struct AutoMapper<'a> {
    catalog: &'a SchemaCatalog,
}

impl<'a> AutoMapper<'a> {
    pub fn new(catalog: &'a SchemaCatalog) -> Self {
        Self { catalog }
    }

    /// Fetches the distinct definitions the section needs concurrently, then
    /// maps each object in order. A failed fetch only affects the objects that
    /// needed that definition; the summary is produced once every object has
    /// been accounted for.
    pub async fn map_section(
        &self,
        document: &mut MappingDocument,
        section: &SectionKey,
        defaults: Option<&DefaultRecordTypes>,
    ) -> Result<AutoMapSummary> {
        let targets: Vec<(ObjectKey, String, String)> = document
            .object_keys(section)?
            .into_iter()
            .filter_map(|key| {
                let object = document.object(&key).ok()?;
                object
                    .show_details
                    .then(|| (key, object.source.clone(), object.destination.clone()))
            })
            .collect();

        let defs = self.fetch_defs(&targets).await;

        let section_name = match section {
            SectionKey::Recommended(name) => Some(name.as_str()),
            SectionKey::Additional => None,
        };
        let mut barrier = CountingBarrier::new(targets.len());
        let mut proposals = ObjectProposals::default();
        let mut failures = Vec::new();
        let mut summary = barrier.summary();

        for (key, source_name, destination_name) in targets {
            let source = lookup(&defs, SchemaSide::Source, &source_name);
            let destination = lookup(&defs, SchemaSide::Destination, &destination_name);
            let outcome = match (source, destination) {
                (Ok(source), Ok(destination)) => {
                    let default = section_name
                        .zip(defaults)
                        .and_then(|(name, d)| d.get(name, &destination_name));
                    document
                        .object_mut(&key)
                        .map(|object| map_object(object, &source, &destination, default))
                        .map_err(|e| e.to_string())
                }
                (Err(e), _) | (_, Err(e)) => Err(e),
            };
            let ok = match outcome {
                Ok(added) => {
                    proposals.fields += added.fields;
                    proposals.record_types += added.record_types;
                    proposals.child_relationships += added.child_relationships;
                    true
                }
                Err(reason) => {
                    tracing::warn!(
                        component = COMPONENT,
                        operation = "map_section",
                        section = %key.section,
                        index = key.index,
                        reason = %reason,
                        "auto-map skipped object"
                    );
                    failures.push((key, reason));
                    false
                }
            };
            if let Some(done) = barrier.arrive(ok) {
                summary = Some(done);
            }
        }

        let batch = summary.unwrap_or(BatchSummary {
            total: 0,
            succeeded: 0,
            failed: 0,
        });
        tracing::info!(
            component = COMPONENT,
            operation = "map_section",
            section = %section,
            objects = batch.total,
            failed = batch.failed,
            proposed = proposals.total(),
            "auto-map finished"
        );
        Ok(AutoMapSummary {
            batch,
            proposals,
            failures,
        })
    }

    async fn fetch_defs(&self, targets: &[(ObjectKey, String, String)]) -> DefLookup {
        let mut wanted: Vec<(SchemaSide, String)> = Vec::new();
        let mut seen = HashSet::new();
        for (_, source, destination) in targets {
            for pair in [
                (SchemaSide::Source, source.clone()),
                (SchemaSide::Destination, destination.clone()),
            ] {
                if seen.insert(pair.clone()) {
                    wanted.push(pair);
                }
            }
        }
        let fetched = join_all(
            wanted
                .iter()
                .map(|(side, name)| self.catalog.get(*side, name)),
        )
        .await;
        wanted
            .into_iter()
            .zip(fetched)
            .map(|(key, result)| (key, result.map_err(|e| e.to_string())))
            .collect()
    }
}

fn lookup(
    defs: &DefLookup,
    side: SchemaSide,
    name: &str,
) -> std::result::Result<Arc<SchemaObjectDef>, String> {
    defs.get(&(side, name.to_string()))
        .cloned()
        .unwrap_or_else(|| Err(format!("{} definition for '{}' was not requested", side, name)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ChildRelationshipDef, RecordTypeDef};
    use pretty_assertions::assert_eq;

    fn field(api: &str, label: &str, data_type: &str) -> FieldDef {
        FieldDef {
            api_name: api.into(),
            label: label.into(),
            data_type: Some(data_type.into()),
            connected_object: None,
        }
    }

    fn record_type(api: &str) -> RecordTypeDef {
        RecordTypeDef {
            api_name: api.into(),
            label: api.into(),
            is_default: false,
        }
    }

    fn revenue_defs(dest_type: &str) -> (SchemaObjectDef, SchemaObjectDef) {
        let mut source = SchemaObjectDef::new("Account", "Account");
        source
            .fields
            .push(field("Revenue__c", "Revenue (Currency)", "currency"));
        let mut destination = SchemaObjectDef::new("Account", "Account");
        destination
            .fields
            .push(field("Revenue__c", "Revenue (Currency)", dest_type));
        (source, destination)
    }

    #[test]
    fn maps_matching_currency_field() {
        let (source, destination) = revenue_defs("currency");
        let mut object = ObjectMapping::new("Account", "Account");
        let added = map_object(&mut object, &source, &destination, None);
        assert_eq!(added.fields, 1);
        assert_eq!(object.field_mapping[0].source, "Revenue__c");
        assert_eq!(
            object.field_mapping[0].destination,
            Destination::mapped("Revenue__c")
        );
        assert!(object.field_mapping[0].user_generated);
    }

    #[test]
    fn type_mismatch_proposes_nothing() {
        let (source, destination) = revenue_defs("text");
        let mut object = ObjectMapping::new("Account", "Account");
        let added = map_object(&mut object, &source, &destination, None);
        assert_eq!(added.fields, 0);
        assert!(object.field_mapping.is_empty());
    }

    #[test]
    fn untyped_label_falls_back_to_source_data_type() {
        let mut source = SchemaObjectDef::new("Account", "Account");
        source.fields.push(field("Site", "Site", "url"));
        source.fields.push(field("Notes", "Notes", "text"));
        let mut destination = SchemaObjectDef::new("Account", "Account");
        destination.fields.push(field("Site", "Site (Url)", "url"));
        destination.fields.push(field("Notes", "Notes", "textarea"));
        let mut object = ObjectMapping::new("Account", "Account");
        let added = map_object(&mut object, &source, &destination, None);
        assert_eq!(added.fields, 1);
        assert_eq!(object.field_mapping[0].source, "Site");
    }

    #[test]
    fn matches_on_label_name_with_different_api_names() {
        let mut source = SchemaObjectDef::new("Account", "Account");
        source.fields.push(field("Rev", "Revenue (Currency)", "currency"));
        let mut destination = SchemaObjectDef::new("Account", "Account");
        destination
            .fields
            .push(field("AnnualRevenue", "Revenue (Currency)", "currency"));
        let mut object = ObjectMapping::new("Account", "Account");
        map_object(&mut object, &source, &destination, None);
        assert_eq!(
            object.field_mapping[0].destination,
            Destination::mapped("AnnualRevenue")
        );
    }

    #[test]
    fn second_run_adds_nothing() {
        let (source, destination) = revenue_defs("currency");
        let mut object = ObjectMapping::new("Account", "Account");
        map_object(&mut object, &source, &destination, None);
        let before = object.clone();
        let added = map_object(&mut object, &source, &destination, None);
        assert_eq!(added.total(), 0);
        assert_eq!(object, before);
    }

    #[test]
    fn user_rows_are_preserved() {
        let (source, destination) = revenue_defs("currency");
        let mut object = ObjectMapping::new("Account", "Account");
        object
            .field_mapping
            .push(FieldMapping::new("Other__c", "Revenue__c"));
        let added = map_object(&mut object, &source, &destination, None);
        assert_eq!(added.fields, 0);
        assert_eq!(object.field_mapping.len(), 1);
        assert_eq!(object.field_mapping[0].source, "Other__c");
    }

    #[test]
    fn master_maps_to_destination_object() {
        let mut source = SchemaObjectDef::new("Account", "Account");
        source.record_types.push(record_type("Master"));
        source.record_types.push(record_type("Partner"));
        let mut destination = SchemaObjectDef::new("Customer__c", "Customer");
        destination.record_types.push(record_type("Partner"));

        let mut object = ObjectMapping::new("Account", "Customer__c");
        let added = map_object(&mut object, &source, &destination, None);
        assert_eq!(added.record_types, 2);
        assert_eq!(object.record_type_mapping[0].source, "Master");
        assert_eq!(object.record_type_mapping[0].destination, "Customer__c");
        assert_eq!(object.record_type_mapping[1].destination, "Partner");
    }

    #[test]
    fn default_record_type_suppresses_master() {
        let mut source = SchemaObjectDef::new("Account", "Account");
        source.record_types.push(record_type("Master"));
        let destination = SchemaObjectDef::new("Account", "Account");
        let default = DefaultRecordType {
            api_name: "Business".into(),
            additional_info: None,
        };
        let mut object = ObjectMapping::new("Account", "Account");
        let added = map_object(&mut object, &source, &destination, Some(&default));
        assert_eq!(added.record_types, 0);
    }

    #[test]
    fn child_relationships_matched_by_name() {
        let mut source = SchemaObjectDef::new("Account", "Account");
        source.child_relationships.push(ChildRelationshipDef {
            api_name: "Invoice__c".into(),
            label: "Invoices".into(),
            relationship_name: Some("Invoices__r".into()),
            field: Some("Account__c".into()),
        });
        let mut destination = SchemaObjectDef::new("Account", "Account");
        destination.child_relationships.push(ChildRelationshipDef {
            api_name: "Bill__c".into(),
            label: "Invoices".into(),
            relationship_name: None,
            field: None,
        });
        let mut object = ObjectMapping::new("Account", "Account");
        let added = map_object(&mut object, &source, &destination, None);
        assert_eq!(added.child_relationships, 1);
        assert_eq!(object.child_relationships[0].value, "Invoice__c");
        assert_eq!(map_object(&mut object, &source, &destination, None).total(), 0);
    }
}
