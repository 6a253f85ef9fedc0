// src/error.rs
//! Error types for the mapping core.
//!
//! Three families:
//! - validation issues (field scoped, recovered by the caller)
//! - collaborator failures (schema fetch, save, clone resolution)
//! - structural errors on the document itself (bad indices, broken invariants)

/// A single field-scoped validation problem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldIssue {
    pub field: String,
    pub message: String,
}

impl FieldIssue {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Every issue found while validating one request.
#[derive(Debug, Clone, Default, PartialEq, Eq, thiserror::Error)]
#[error("{}", join_issues(.issues))]
pub struct ValidationErrors {
    pub issues: Vec<FieldIssue>,
}

impl ValidationErrors {
    pub fn push(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.issues.push(FieldIssue::new(field, message));
    }

    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn has_issue_for(&self, field: &str) -> bool {
        self.issues.iter().any(|i| i.field == field)
    }

    /// `Ok(())` when nothing was recorded.
    pub fn into_result(self) -> Result<(), ValidationErrors> {
        if self.issues.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

fn join_issues(issues: &[FieldIssue]) -> String {
    issues
        .iter()
        .map(|i| format!("{}: {}", i.field, i.message))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Errors raised by the mapping core.
#[derive(Debug, thiserror::Error)]
pub enum MappingError {
    /// User input rejected; blocks advancing the wizard
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationErrors),

    /// A schema, persistence or clone-resolution call failed
    #[error("{component}::{operation} failed: {source}")]
    Collaborator {
        component: &'static str,
        operation: &'static str,
        #[source]
        source: anyhow::Error,
    },

    /// Referenced item is absent from the catalog even after a refetch
    #[error("{item} not found on {object}")]
    MissingFromCatalog { object: String, item: String },

    #[error("unknown section: '{0}'")]
    UnknownSection(String),

    #[error("object mapping {index} out of range ({len} rows)")]
    ObjectOutOfRange { index: usize, len: usize },

    #[error("row {index} out of range ({len} rows)")]
    RowOutOfRange { index: usize, len: usize },

    #[error("destination '{0}' is already mapped on this object")]
    DuplicateDestination(String),

    #[error("duplicate section name: '{0}'")]
    DuplicateSection(String),

    #[error("destination '{destination}' does not match new metadata api name '{api_name}'")]
    NewMetaMismatch {
        destination: String,
        api_name: String,
    },

    #[error("invalid mapping document: {0}")]
    Decode(#[from] serde_json::Error),
}

impl MappingError {
    pub fn collaborator(
        component: &'static str,
        operation: &'static str,
        source: anyhow::Error,
    ) -> Self {
        Self::Collaborator {
            component,
            operation,
            source,
        }
    }

    /// True for failures that came from outside the core.
    pub fn is_collaborator(&self) -> bool {
        matches!(
            self,
            Self::Collaborator { .. } | Self::MissingFromCatalog { .. }
        )
    }
}

pub type Result<T, E = MappingError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_errors_display() {
        let mut errs = ValidationErrors::default();
        errs.push("apiName", "already exists");
        errs.push("defaultValue", "not a valid email");
        assert_eq!(
            errs.to_string(),
            "apiName: already exists; defaultValue: not a valid email"
        );
        assert!(errs.has_issue_for("apiName"));
    }

    #[test]
    fn empty_validation_is_ok() {
        assert!(ValidationErrors::default().into_result().is_ok());
    }

    #[test]
    fn collaborator_display_carries_tags() {
        let err = MappingError::collaborator("SchemaCatalog", "get", anyhow::anyhow!("timeout"));
        assert_eq!(err.to_string(), "SchemaCatalog::get failed: timeout");
        assert!(err.is_collaborator());
    }
}
