// src/schema.rs
//! Schema definitions fetched from the source and destination orgs.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Which org a definition belongs to. The same API name (e.g. `Account`)
/// usually exists on both sides with different shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchemaSide {
    Source,
    Destination,
}

impl fmt::Display for SchemaSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchemaSide::Source => write!(f, "source"),
            SchemaSide::Destination => write!(f, "destination"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldDef {
    pub api_name: String,
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connected_object: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordTypeDef {
    pub api_name: String,
    pub label: String,
    #[serde(default)]
    pub is_default: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChildRelationshipDef {
    /// Child object API name
    pub api_name: String,
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relationship_name: Option<String>,
    /// Lookup field on the child pointing back at the parent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

/// Everything the mapper needs to know about one object.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaObjectDef {
    pub api_name: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub fields: Vec<FieldDef>,
    #[serde(default)]
    pub record_types: Vec<RecordTypeDef>,
    #[serde(default)]
    pub child_relationships: Vec<ChildRelationshipDef>,
}

impl SchemaObjectDef {
    pub fn new(api_name: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            api_name: api_name.into(),
            label: label.into(),
            ..Default::default()
        }
    }

    pub fn field(&self, api_name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.api_name == api_name)
    }

    pub fn record_type(&self, api_name: &str) -> Option<&RecordTypeDef> {
        self.record_types.iter().find(|r| r.api_name == api_name)
    }

    pub fn child_relationship(&self, api_name: &str) -> Option<&ChildRelationshipDef> {
        self.child_relationships
            .iter()
            .find(|c| c.api_name == api_name)
    }

    pub fn has_field(&self, api_name: &str) -> bool {
        self.field(api_name).is_some()
    }

    pub fn has_record_type(&self, api_name: &str) -> bool {
        self.record_type(api_name).is_some()
    }

    /// Replaces a field with the same API name, or appends.
    pub fn upsert_field(&mut self, field: FieldDef) {
        match self.fields.iter_mut().find(|f| f.api_name == field.api_name) {
            Some(existing) => *existing = field,
            None => self.fields.push(field),
        }
    }

    pub fn upsert_record_type(&mut self, record_type: RecordTypeDef) {
        match self
            .record_types
            .iter_mut()
            .find(|r| r.api_name == record_type.api_name)
        {
            Some(existing) => *existing = record_type,
            None => self.record_types.push(record_type),
        }
    }
}

/// A label split into its name and the optional `(Type)` suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LabelParts<'a> {
    pub name: &'a str,
    pub type_token: Option<&'a str>,
}

/// Splits `"Revenue (Currency)"` into `Revenue` and `Currency`.
///
/// The name is everything before the first `" ("`; the type token is the text
/// inside the last parenthetical.
pub fn split_label(label: &str) -> LabelParts<'_> {
    match (label.find(" ("), label.rfind(" (")) {
        (Some(first), Some(last)) => {
            let rest = &label[last + 2..];
            let type_token = rest.strip_suffix(')').unwrap_or(rest);
            LabelParts {
                name: &label[..first],
                type_token: Some(type_token).filter(|t| !t.is_empty()),
            }
        }
        _ => LabelParts {
            name: label,
            type_token: None,
        },
    }
}

/// `currency` -> `Currency`; leaves the rest of the word untouched.
pub fn capitalize_first(value: &str) -> String {
    let mut chars = value.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// A group of org object names under one category marker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaCategory {
    pub name: String,
    pub objects: Vec<String>,
}

/// Parses the flat org schema name list. Entries prefixed with `=` open a new
/// category; names before the first marker land in an unnamed category.
pub fn parse_schema_names(names: &[String]) -> Vec<SchemaCategory> {
    let mut categories: Vec<SchemaCategory> = Vec::new();
    for entry in names {
        if let Some(marker) = entry.strip_prefix('=') {
            categories.push(SchemaCategory {
                name: marker.trim().to_string(),
                objects: Vec::new(),
            });
            continue;
        }
        if categories.is_empty() {
            categories.push(SchemaCategory {
                name: String::new(),
                objects: Vec::new(),
            });
        }
        if let Some(current) = categories.last_mut() {
            current.objects.push(entry.clone());
        }
    }
    categories
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_label_with_type() {
        let parts = split_label("Revenue (Currency)");
        assert_eq!(parts.name, "Revenue");
        assert_eq!(parts.type_token, Some("Currency"));
    }

    #[test]
    fn split_label_without_type() {
        let parts = split_label("Account Name");
        assert_eq!(parts.name, "Account Name");
        assert_eq!(parts.type_token, None);
    }

    #[test]
    fn split_label_uses_last_parenthetical_for_type() {
        let parts = split_label("Amount (Net) (Currency)");
        assert_eq!(parts.name, "Amount");
        assert_eq!(parts.type_token, Some("Currency"));
    }

    #[test]
    fn capitalize() {
        assert_eq!(capitalize_first("currency"), "Currency");
        assert_eq!(capitalize_first("dateTime"), "DateTime");
        assert_eq!(capitalize_first(""), "");
    }

    #[test]
    fn schema_names_grouped_by_marker() {
        let names: Vec<String> = ["=Standard", "Account", "Contact", "=Custom", "Invoice__c"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let categories = parse_schema_names(&names);
        assert_eq!(categories.len(), 2);
        assert_eq!(categories[0].name, "Standard");
        assert_eq!(categories[0].objects, vec!["Account", "Contact"]);
        assert_eq!(categories[1].objects, vec!["Invoice__c"]);
    }

    #[test]
    fn schema_names_without_marker() {
        let names = vec!["Account".to_string()];
        let categories = parse_schema_names(&names);
        assert_eq!(categories[0].name, "");
        assert_eq!(categories[0].objects, vec!["Account"]);
    }

    #[test]
    fn upsert_field_replaces() {
        let mut def = SchemaObjectDef::new("Account", "Account");
        def.upsert_field(FieldDef {
            api_name: "Name".into(),
            label: "Name".into(),
            ..Default::default()
        });
        def.upsert_field(FieldDef {
            api_name: "Name".into(),
            label: "Account Name".into(),
            ..Default::default()
        });
        assert_eq!(def.fields.len(), 1);
        assert_eq!(def.fields[0].label, "Account Name");
    }
}
