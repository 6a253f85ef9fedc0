// src/mapping.rs
//! Rows of the mapping document and their wire representation.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Where a source field is headed.
///
/// On the wire this is a plain string: `""`, `"new"`, `"clone"` or an API name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Destination {
    #[default]
    Unset,
    /// Creation dialog requested, no descriptor yet
    PendingNew,
    /// Duplicate the source field's definition at save time
    PendingClone,
    Mapped(String),
}

impl Destination {
    pub const NEW: &'static str = "new";
    pub const CLONE: &'static str = "clone";

    pub fn mapped(api_name: impl Into<String>) -> Self {
        let api_name = api_name.into();
        Destination::from(api_name)
    }

    /// The API name when mapped to a concrete destination.
    pub fn api_name(&self) -> Option<&str> {
        match self {
            Destination::Mapped(name) => Some(name),
            _ => None,
        }
    }

    pub fn is_set(&self) -> bool {
        !matches!(self, Destination::Unset)
    }

    pub fn is_sentinel(&self) -> bool {
        matches!(self, Destination::PendingNew | Destination::PendingClone)
    }
}

impl From<String> for Destination {
    fn from(value: String) -> Self {
        match value.as_str() {
            "" => Destination::Unset,
            Destination::NEW => Destination::PendingNew,
            Destination::CLONE => Destination::PendingClone,
            _ => Destination::Mapped(value),
        }
    }
}

impl From<&str> for Destination {
    fn from(value: &str) -> Self {
        Destination::from(value.to_string())
    }
}

impl From<Destination> for String {
    fn from(value: Destination) -> Self {
        match value {
            Destination::Unset => String::new(),
            Destination::PendingNew => Destination::NEW.to_string(),
            Destination::PendingClone => Destination::CLONE.to_string(),
            Destination::Mapped(name) => name,
        }
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Destination::Unset => Ok(()),
            Destination::PendingNew => f.write_str(Destination::NEW),
            Destination::PendingClone => f.write_str(Destination::CLONE),
            Destination::Mapped(name) => f.write_str(name),
        }
    }
}

/// A destination field the user asked to create.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewFieldDescriptor {
    pub label: String,
    pub api_name: String,
    pub data_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length: Option<u32>,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub unique: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connected_object: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub child_relationship_name: Option<String>,
}

/// A destination record type the user asked to create.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewRecordTypeDescriptor {
    pub label: String,
    pub api_name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub active: bool,
}

/// Metadata of a field that already exists, as returned by clone resolution.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExistingFieldDescriptor {
    /// `Object.Field`
    #[serde(default)]
    pub full_name: String,
    #[serde(default)]
    pub label: String,
    #[serde(rename = "type", default)]
    pub data_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub precision: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale: Option<u32>,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub unique: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relationship_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ExistingFieldDescriptor {
    /// Field part of `full_name` without a trailing `__c`.
    ///
    /// `Account.Email__c` -> `Email`
    pub fn derived_api_name(&self) -> String {
        let field = self.field_name();
        field.strip_suffix("__c").unwrap_or(field).to_string()
    }

    /// Field part of `full_name`.
    pub fn field_name(&self) -> &str {
        self.full_name
            .rsplit_once('.')
            .map(|(_, field)| field)
            .unwrap_or(&self.full_name)
    }

    /// The same field as it would exist on `object`.
    pub fn on_object(&self, object: &str) -> Self {
        Self {
            full_name: format!("{}.{}", object, self.field_name()),
            ..self.clone()
        }
    }

    /// The creation request a clone resolves into.
    pub fn to_new_field(&self) -> NewFieldDescriptor {
        NewFieldDescriptor {
            label: self.label.clone(),
            api_name: self.derived_api_name(),
            data_type: self.data_type.clone(),
            length: self.length,
            required: self.required,
            unique: self.unique,
            default_value: self.default_value.clone(),
            connected_object: self.reference_to.clone(),
            child_relationship_name: self.relationship_name.clone(),
        }
    }
}

fn is_false(value: &bool) -> bool {
    !*value
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldMapping {
    pub source: String,
    #[serde(default)]
    pub destination: Destination,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_meta: Option<NewFieldDescriptor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_meta: Option<ExistingFieldDescriptor>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub user_generated: bool,
}

impl FieldMapping {
    pub fn new(source: impl Into<String>, destination: impl Into<Destination>) -> Self {
        Self {
            source: source.into(),
            destination: destination.into(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordTypeMapping {
    /// Record type API name, or `Master`
    pub source: String,
    #[serde(default)]
    pub destination: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_meta: Option<NewRecordTypeDescriptor>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub user_generated: bool,
}

impl RecordTypeMapping {
    pub const MASTER: &'static str = "Master";

    pub fn new(source: impl Into<String>, destination: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            destination: destination.into(),
            ..Default::default()
        }
    }
}

/// A selected child relationship and the lookup field that carries it over.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChildMapping {
    pub label: String,
    pub value: String,
    pub new_meta: NewFieldDescriptor,
}

/// One source object paired with one destination object.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMapping {
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub destination: String,
    #[serde(default)]
    pub show_details: bool,
    #[serde(default)]
    pub field_mapping: Vec<FieldMapping>,
    #[serde(default)]
    pub record_type_mapping: Vec<RecordTypeMapping>,
    #[serde(default)]
    pub child_relationships: Vec<ChildMapping>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub user_generated: bool,
}

impl ObjectMapping {
    pub fn new(source: impl Into<String>, destination: impl Into<String>) -> Self {
        let mut mapping = Self {
            source: source.into(),
            destination: destination.into(),
            ..Default::default()
        };
        mapping.refresh_show_details();
        mapping
    }

    /// A template row: destination known, source still to be picked.
    pub fn stub(destination: impl Into<String>) -> Self {
        Self::new("", destination)
    }

    pub fn is_complete(&self) -> bool {
        !self.source.is_empty() && !self.destination.is_empty()
    }

    pub fn refresh_show_details(&mut self) {
        self.show_details = self.is_complete();
    }

    /// Destinations already used by a field row, sentinels excluded.
    pub fn mapped_field_destinations(&self) -> impl Iterator<Item = &str> {
        self.field_mapping
            .iter()
            .filter_map(|row| row.destination.api_name())
    }

    pub fn has_field_destination(&self, api_name: &str) -> bool {
        self.mapped_field_destinations().any(|d| d == api_name)
    }

    pub fn has_record_type_destination(&self, api_name: &str) -> bool {
        self.record_type_mapping
            .iter()
            .any(|row| row.destination == api_name)
    }
}

/// All object mappings produced for one wizard answer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MappingSectionGroup {
    pub section_name: String,
    #[serde(default)]
    pub mapping_data: Vec<ObjectMapping>,
}

impl MappingSectionGroup {
    pub fn new(section_name: impl Into<String>, mapping_data: Vec<ObjectMapping>) -> Self {
        Self {
            section_name: section_name.into(),
            mapping_data,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn destination_wire_strings() {
        assert_eq!(Destination::from(""), Destination::Unset);
        assert_eq!(Destination::from("new"), Destination::PendingNew);
        assert_eq!(Destination::from("clone"), Destination::PendingClone);
        assert_eq!(
            Destination::from("Email__c"),
            Destination::Mapped("Email__c".into())
        );
        assert_eq!(String::from(Destination::PendingClone), "clone");
    }

    #[test]
    fn field_mapping_serializes_sentinel_as_string() {
        let row = FieldMapping::new("Email__c", Destination::PendingClone);
        let value = serde_json::to_value(&row).unwrap();
        assert_eq!(value, json!({ "source": "Email__c", "destination": "clone" }));
    }

    #[test]
    fn object_mapping_reads_minimal_json() {
        let row: ObjectMapping = serde_json::from_value(json!({
            "source": "Account",
            "destination": "Account",
            "showDetails": true,
            "fieldMapping": [{ "source": "Name", "destination": "Name" }]
        }))
        .unwrap();
        assert_eq!(row.field_mapping[0].destination.api_name(), Some("Name"));
        assert!(row.record_type_mapping.is_empty());
        assert!(!row.user_generated);
    }

    #[test]
    fn derived_api_name_strips_custom_suffix() {
        let meta = ExistingFieldDescriptor {
            full_name: "Account.Email__c".into(),
            ..Default::default()
        };
        assert_eq!(meta.derived_api_name(), "Email");

        let standard = ExistingFieldDescriptor {
            full_name: "Account.Phone".into(),
            ..Default::default()
        };
        assert_eq!(standard.derived_api_name(), "Phone");
    }

    #[test]
    fn stub_has_no_details() {
        let stub = ObjectMapping::stub("Account");
        assert!(!stub.show_details);
        assert_eq!(stub.source, "");
    }
}
