// src/config.rs
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;

/// Answer-driven wizard setup, read from YAML.
///
/// ```yaml
/// assessmentId: acme-2024
/// answers: [Sales, Service]
/// excluded: [Service]
/// templates:
///   Sales: [Account, Opportunity]
///   Service: [Case]
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionConfig {
    pub assessment_id: String,
    #[serde(default)]
    pub answers: Vec<String>,
    #[serde(default)]
    pub excluded: Vec<String>,
    /// Destination objects each answer's section starts with
    #[serde(default)]
    pub templates: BTreeMap<String, Vec<String>>,
}

impl SessionConfig {
    pub fn from_yaml(text: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(text)?)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading session config {}", path.display()))?;
        Self::from_yaml(&text).with_context(|| format!("parsing session config {}", path.display()))
    }

    /// Answers in order, minus the excluded ones.
    pub fn active_answers(&self) -> Vec<String> {
        active_answers(&self.answers, &self.excluded)
    }

    /// Every answer name this configuration knows about. Sections named
    /// otherwise were added by something else and are never pruned.
    pub fn known_answers(&self) -> HashSet<String> {
        self.templates
            .keys()
            .chain(self.answers.iter())
            .chain(self.excluded.iter())
            .cloned()
            .collect()
    }
}

pub(crate) fn active_answers(answers: &[String], excluded: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    answers
        .iter()
        .filter(|a| !excluded.contains(a) && seen.insert(a.as_str()))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const SAMPLE: &str = r#"
assessmentId: acme
answers: [Sales, Service, Sales, Marketing]
excluded: [Service]
templates:
  Sales: [Account, Opportunity]
  Legacy: [Lead]
"#;

    #[test]
    fn parses_yaml_and_filters_answers() {
        let config = SessionConfig::from_yaml(SAMPLE).unwrap();
        assert_eq!(config.assessment_id, "acme");
        assert_eq!(config.active_answers(), vec!["Sales", "Marketing"]);
        assert_eq!(config.templates["Sales"], vec!["Account", "Opportunity"]);
    }

    #[test]
    fn known_answers_include_templates_and_exclusions() {
        let config = SessionConfig::from_yaml(SAMPLE).unwrap();
        let known = config.known_answers();
        for name in ["Sales", "Service", "Marketing", "Legacy"] {
            assert!(known.contains(name), "{name} should be known");
        }
        assert!(!known.contains("Custom"));
    }

    #[test]
    fn missing_assessment_id_is_an_error() {
        assert!(SessionConfig::from_yaml("answers: [Sales]").is_err());
    }
}
