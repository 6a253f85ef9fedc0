// src/metadata.rs
//! Validation and packaging of "create new destination metadata" requests.

use crate::error::ValidationErrors;
use crate::mapping::{ChildMapping, NewFieldDescriptor, NewRecordTypeDescriptor};
use crate::schema::{split_label, ChildRelationshipDef, FieldDef, RecordTypeDef, SchemaObjectDef};
use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Prefix of catalog options standing for metadata that does not exist yet.
pub const NEW_OPTION_PREFIX: &str = "[NEW]";

static API_NAME: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9_]*$").unwrap());
static NUMBER: Lazy<Regex> = Lazy::new(|| Regex::new(r"^-?[0-9]+(\.[0-9]+)?$").unwrap());
static CURRENCY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\$?[0-9]+(\.[0-9]{1,2})?$").unwrap());
static PERCENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[0-9]+(\.[0-9]+)?%?$").unwrap());
static EMAIL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^[A-Za-z0-9.!#$%&'*+/=?^_`{|}~-]+@[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?(?:\.[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?)+$",
    )
    .unwrap()
});
static TIME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[0-9][0-2]?:[0-5][0-9]:[0-5][0-9]?(\.[0-9]{0,3})?$").unwrap()
});
static DATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([0-9]{4})-([0-9]{1,2})-([0-9]{1,2})$").unwrap());
static DATE_TIME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^([0-9]{4}-[0-9]{1,2}-[0-9]{1,2})(T[0-9][0-2]?:[0-5][0-9]:[0-5][0-9]?(\.[0-9]{0,3})?Z?)?$",
    )
    .unwrap()
});
static PHONE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\+?[0-9(][0-9\s().\-/]{5,}[0-9]$").unwrap());

/// Data types whose `length` must be a positive integer when given.
const SIZED_TYPES: [&str; 4] = ["text", "textarea", "longtextarea", "number"];

/// A field creation request as typed by the user.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewFieldRequest {
    pub label: String,
    pub api_name: String,
    pub data_type: String,
    #[serde(default)]
    pub length: Option<String>,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub unique: bool,
    #[serde(default)]
    pub default_value: Option<String>,
    #[serde(default)]
    pub connected_object: Option<String>,
    #[serde(default)]
    pub child_relationship_name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewRecordTypeRequest {
    pub label: String,
    pub api_name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

/// Checks a default value against the grammar of its data type. Types
/// without a grammar accept anything.
pub fn validate_default_value(data_type: &str, value: &str) -> Result<(), String> {
    let ok = match data_type.to_ascii_lowercase().as_str() {
        "number" => NUMBER.is_match(value),
        "currency" => CURRENCY.is_match(value),
        "percent" => PERCENT.is_match(value),
        "email" => EMAIL.is_match(value),
        "time" => TIME.is_match(value),
        "date" => is_calendar_date(value),
        "datetime" => DATE_TIME
            .captures(value)
            .and_then(|caps| caps.get(1))
            .is_some_and(|date| is_calendar_date(date.as_str())),
        "phone" => PHONE.is_match(value),
        _ => true,
    };
    if ok {
        Ok(())
    } else {
        Err(format!("'{}' is not a valid {} value", value, data_type))
    }
}

fn is_calendar_date(value: &str) -> bool {
    let Some(caps) = DATE.captures(value) else {
        return false;
    };
    let part = |i: usize| caps.get(i).and_then(|m| m.as_str().parse::<u32>().ok());
    match (
        caps.get(1).and_then(|m| m.as_str().parse::<i32>().ok()),
        part(2),
        part(3),
    ) {
        (Some(y), Some(m), Some(d)) => NaiveDate::from_ymd_opt(y, m, d).is_some(),
        _ => false,
    }
}

pub fn new_option_label(label: &str) -> String {
    format!("{} {}", NEW_OPTION_PREFIX, label)
}

/// Validates creation requests against one destination object.
pub struct NewMetadataBuilder<'a> {
    destination: &'a SchemaObjectDef,
}

impl<'a> NewMetadataBuilder<'a> {
    pub fn new(destination: &'a SchemaObjectDef) -> Self {
        Self { destination }
    }

    pub fn build_field(&self, request: &NewFieldRequest) -> Result<NewFieldDescriptor, ValidationErrors> {
        let mut errors = ValidationErrors::default();
        check_names(&mut errors, &request.label, &request.api_name);
        if self.destination.has_field(&request.api_name) {
            errors.push(
                "apiName",
                format!(
                    "a field named '{}' already exists on {}",
                    request.api_name, self.destination.api_name
                ),
            );
        }
        if request.data_type.trim().is_empty() {
            errors.push("dataType", "data type is required");
        }

        let sized = SIZED_TYPES.contains(&request.data_type.to_ascii_lowercase().as_str());
        let length = match request.length.as_deref().map(str::trim) {
            Some(raw) if sized && !raw.is_empty() => match raw.parse::<u32>() {
                Ok(n) if n > 0 => Some(n),
                _ => {
                    errors.push("length", "length must be a positive whole number");
                    None
                }
            },
            _ => None,
        };

        let default_value = request
            .default_value
            .as_deref()
            .map(str::trim)
            .filter(|v| !v.is_empty());
        if let Some(value) = default_value {
            if let Err(message) = validate_default_value(&request.data_type, value) {
                errors.push("defaultValue", message);
            }
        }

        errors.into_result()?;
        Ok(NewFieldDescriptor {
            label: request.label.trim().to_string(),
            api_name: request.api_name.clone(),
            data_type: request.data_type.clone(),
            length,
            required: request.required,
            unique: request.unique,
            default_value: default_value.map(str::to_string),
            connected_object: request.connected_object.clone(),
            child_relationship_name: request.child_relationship_name.clone(),
        })
    }

    pub fn build_record_type(
        &self,
        request: &NewRecordTypeRequest,
    ) -> Result<NewRecordTypeDescriptor, ValidationErrors> {
        let mut errors = ValidationErrors::default();
        check_names(&mut errors, &request.label, &request.api_name);
        if self.destination.has_record_type(&request.api_name) {
            errors.push(
                "apiName",
                format!(
                    "a record type named '{}' already exists on {}",
                    request.api_name, self.destination.api_name
                ),
            );
        }
        errors.into_result()?;
        Ok(NewRecordTypeDescriptor {
            label: request.label.trim().to_string(),
            api_name: request.api_name.clone(),
            description: request.description.clone(),
            active: request.active,
        })
    }
}

fn check_names(errors: &mut ValidationErrors, label: &str, api_name: &str) {
    if label.trim().is_empty() {
        errors.push("label", "label is required");
    }
    if api_name.is_empty() {
        errors.push("apiName", "api name is required");
    } else if !API_NAME.is_match(api_name) {
        errors.push(
            "apiName",
            "api name must start with a letter and contain only letters, digits and underscores",
        );
    }
}

/// Catalog option standing in for a field that is pending creation.
pub fn pending_field_option(descriptor: &NewFieldDescriptor) -> FieldDef {
    FieldDef {
        api_name: descriptor.api_name.clone(),
        label: new_option_label(&descriptor.label),
        data_type: Some(descriptor.data_type.clone()),
        connected_object: descriptor.connected_object.clone(),
    }
}

pub fn pending_record_type_option(descriptor: &NewRecordTypeDescriptor) -> RecordTypeDef {
    RecordTypeDef {
        api_name: descriptor.api_name.clone(),
        label: new_option_label(&descriptor.label),
        is_default: false,
    }
}

/// The child mapping for a selected source child relationship: a lookup on
/// the child pointing at `parent_destination`.
pub fn child_mapping(child: &ChildRelationshipDef, parent_destination: &str) -> ChildMapping {
    let label = split_label(&child.label).name.to_string();
    let api_name = child
        .field
        .clone()
        .unwrap_or_else(|| format!("{}__c", parent_destination.trim_end_matches("__c")));
    ChildMapping {
        label: label.clone(),
        value: child.api_name.clone(),
        new_meta: NewFieldDescriptor {
            label: parent_destination.to_string(),
            api_name,
            data_type: "Lookup".to_string(),
            connected_object: Some(parent_destination.to_string()),
            child_relationship_name: child
                .relationship_name
                .clone()
                .or_else(|| Some(label.replace(' ', "_"))),
            ..Default::default()
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account() -> SchemaObjectDef {
        let mut def = SchemaObjectDef::new("Account", "Account");
        def.fields.push(FieldDef {
            api_name: "Name".into(),
            label: "Account Name (Text)".into(),
            data_type: Some("text".into()),
            connected_object: None,
        });
        def.record_types.push(RecordTypeDef {
            api_name: "Business".into(),
            label: "Business".into(),
            is_default: true,
        });
        def
    }

    fn request(data_type: &str, default_value: Option<&str>) -> NewFieldRequest {
        NewFieldRequest {
            label: "Tier".into(),
            api_name: "Tier__c".into(),
            data_type: data_type.into(),
            default_value: default_value.map(str::to_string),
            ..Default::default()
        }
    }

    #[test]
    fn email_default_value() {
        assert!(validate_default_value("Email", "not-an-email").is_err());
        assert!(validate_default_value("Email", "a@b.com").is_ok());
    }

    #[test]
    fn currency_and_percent() {
        assert!(validate_default_value("Currency", "$10.50").is_ok());
        assert!(validate_default_value("Currency", "10.505").is_err());
        assert!(validate_default_value("Percent", "12.5%").is_ok());
        assert!(validate_default_value("Percent", "%12").is_err());
    }

    #[test]
    fn dates_and_times() {
        assert!(validate_default_value("Date", "2024-2-29").is_ok());
        assert!(validate_default_value("Date", "2023-2-29").is_err());
        assert!(validate_default_value("Date", "29/02/2024").is_err());
        assert!(validate_default_value("Time", "10:30:00.250").is_ok());
        assert!(validate_default_value("Time", "10:75:00").is_err());
        assert!(validate_default_value("DateTime", "2024-01-05T10:30:00Z").is_ok());
        assert!(validate_default_value("DateTime", "2024-01-05").is_ok());
        assert!(validate_default_value("DateTime", "2024-13-05T10:30:00").is_err());
    }

    #[test]
    fn number_and_phone() {
        assert!(validate_default_value("Number", "-12.5").is_ok());
        assert!(validate_default_value("Number", "twelve").is_err());
        assert!(validate_default_value("Phone", "+1 (555) 123-4567").is_ok());
        assert!(validate_default_value("Phone", "(555) 123-4567").is_ok());
        assert!(validate_default_value("Phone", "call me").is_err());
    }

    #[test]
    fn untyped_defaults_are_accepted() {
        assert!(validate_default_value("Picklist", "anything").is_ok());
    }

    #[test]
    fn builds_field_descriptor() {
        let def = account();
        let builder = NewMetadataBuilder::new(&def);
        let mut req = request("Text", Some("Gold"));
        req.length = Some("80".into());
        let descriptor = builder.build_field(&req).unwrap();
        assert_eq!(descriptor.api_name, "Tier__c");
        assert_eq!(descriptor.length, Some(80));
        assert_eq!(descriptor.default_value.as_deref(), Some("Gold"));
    }

    #[test]
    fn rejects_collision_and_bad_values_together() {
        let def = account();
        let builder = NewMetadataBuilder::new(&def);
        let mut req = request("Email", Some("not-an-email"));
        req.api_name = "Name".into();
        let errors = builder.build_field(&req).unwrap_err();
        assert!(errors.has_issue_for("apiName"));
        assert!(errors.has_issue_for("defaultValue"));
    }

    #[test]
    fn rejects_non_positive_length() {
        let def = account();
        let builder = NewMetadataBuilder::new(&def);
        let mut req = request("Number", None);
        req.length = Some("0".into());
        assert!(builder.build_field(&req).unwrap_err().has_issue_for("length"));
        req.length = Some("1.5".into());
        assert!(builder.build_field(&req).unwrap_err().has_issue_for("length"));
    }

    #[test]
    fn length_ignored_for_unsized_types() {
        let def = account();
        let builder = NewMetadataBuilder::new(&def);
        let mut req = request("Checkbox", None);
        req.length = Some("abc".into());
        assert_eq!(builder.build_field(&req).unwrap().length, None);
    }

    #[test]
    fn record_type_collision() {
        let def = account();
        let builder = NewMetadataBuilder::new(&def);
        let req = NewRecordTypeRequest {
            label: "Business".into(),
            api_name: "Business".into(),
            description: String::new(),
            active: true,
        };
        assert!(builder.build_record_type(&req).is_err());
    }

    #[test]
    fn pending_option_label() {
        let descriptor = NewFieldDescriptor {
            label: "Tier".into(),
            api_name: "Tier__c".into(),
            data_type: "Text".into(),
            ..Default::default()
        };
        assert_eq!(pending_field_option(&descriptor).label, "[NEW] Tier");
    }

    #[test]
    fn child_mapping_points_at_parent() {
        let child = ChildRelationshipDef {
            api_name: "Invoice__c".into(),
            label: "Invoices (Invoice__c)".into(),
            relationship_name: Some("Invoices".into()),
            field: None,
        };
        let mapping = child_mapping(&child, "Account");
        assert_eq!(mapping.value, "Invoice__c");
        assert_eq!(mapping.label, "Invoices");
        assert_eq!(mapping.new_meta.api_name, "Account__c");
        assert_eq!(mapping.new_meta.connected_object.as_deref(), Some("Account"));
        assert_eq!(mapping.new_meta.child_relationship_name.as_deref(), Some("Invoices"));
    }
}
