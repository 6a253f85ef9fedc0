// src/describe.rs
//! Schema definitions read from describe exports on disk, and a
//! [`SchemaService`] answering from them.

use crate::catalog::{DefaultRecordType, SchemaService};
use crate::schema::{ChildRelationshipDef, FieldDef, RecordTypeDef, SchemaObjectDef, SchemaSide};
use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use csv::ReaderBuilder;
use serde::Deserialize;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

pub const STANDARD_CATEGORY: &str = "=Standard";
pub const CUSTOM_CATEGORY: &str = "=Custom";

/// One line of a CSV describe export.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DescribeRow {
    object: String,
    #[serde(default)]
    object_label: Option<String>,
    kind: String,
    api_name: String,
    #[serde(default)]
    label: Option<String>,
    #[serde(default)]
    data_type: Option<String>,
    #[serde(default)]
    connected_object: Option<String>,
    #[serde(default)]
    relationship_name: Option<String>,
    #[serde(default)]
    field: Option<String>,
    #[serde(default)]
    is_default: Option<bool>,
}

/// Reads `path` by extension: `.yaml`/`.yml`, `.json` or `.csv`.
pub fn load_schema<P: AsRef<Path>>(path: P) -> Result<Vec<SchemaObjectDef>> {
    let path = path.as_ref();
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let reader = BufReader::new(file);
    let defs = match extension.as_str() {
        "yaml" | "yml" => serde_yaml::from_reader(reader)?,
        "json" => serde_json::from_reader(reader)?,
        "csv" => read_describe_csv(reader)?,
        other => bail!("unsupported schema file extension '{}' ({})", other, path.display()),
    };
    Ok(defs)
}

/// Groups CSV rows into object definitions, keeping first-seen order.
pub fn read_describe_csv<R: Read>(reader: R) -> Result<Vec<SchemaObjectDef>> {
    let mut rdr = ReaderBuilder::new()
        .delimiter(b',')
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut order: Vec<String> = Vec::new();
    let mut defs: HashMap<String, SchemaObjectDef> = HashMap::new();
    for (line, result) in rdr.deserialize::<DescribeRow>().enumerate() {
        let row = result.with_context(|| format!("describe row {}", line + 1))?;
        let def = defs.entry(row.object.clone()).or_insert_with(|| {
            order.push(row.object.clone());
            SchemaObjectDef::new(row.object.clone(), row.object.clone())
        });
        if let Some(label) = row.object_label.filter(|l| !l.is_empty()) {
            def.label = label;
        }
        let label = row.label.unwrap_or_else(|| row.api_name.clone());
        match row.kind.as_str() {
            "field" => def.fields.push(FieldDef {
                api_name: row.api_name,
                label,
                data_type: row.data_type,
                connected_object: row.connected_object,
            }),
            "recordType" => def.record_types.push(RecordTypeDef {
                api_name: row.api_name,
                label,
                is_default: row.is_default.unwrap_or(false),
            }),
            "childRelationship" => def.child_relationships.push(ChildRelationshipDef {
                api_name: row.api_name,
                label,
                relationship_name: row.relationship_name,
                field: row.field,
            }),
            "object" => {}
            other => bail!("describe row {}: unknown kind '{}'", line + 1, other),
        }
    }
    Ok(order
        .into_iter()
        .filter_map(|name| defs.remove(&name))
        .collect())
}

/// Answers schema requests from definitions loaded up front.
pub struct StaticSchemaService {
    source: HashMap<String, SchemaObjectDef>,
    /// Sorted by API name so pages are stable
    destination: Vec<SchemaObjectDef>,
    page_size: usize,
}

impl StaticSchemaService {
    pub fn new(source: Vec<SchemaObjectDef>, mut destination: Vec<SchemaObjectDef>) -> Self {
        destination.sort_by(|a, b| a.api_name.cmp(&b.api_name));
        Self {
            source: source
                .into_iter()
                .map(|def| (def.api_name.clone(), def))
                .collect(),
            destination,
            page_size: 200,
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Offsets covering the whole destination schema, one per page.
    pub fn page_offsets(&self) -> Vec<usize> {
        (0..self.destination.len()).step_by(self.page_size).collect()
    }

    pub fn source_defs(&self) -> Vec<SchemaObjectDef> {
        let mut defs: Vec<_> = self.source.values().cloned().collect();
        defs.sort_by(|a, b| a.api_name.cmp(&b.api_name));
        defs
    }
}

#[async_trait]
impl SchemaService for StaticSchemaService {
    async fn fetch_org_schema_names(&self) -> Result<Vec<String>> {
        let mut standard: Vec<&str> = Vec::new();
        let mut custom: Vec<&str> = Vec::new();
        for name in self.source.keys() {
            if name.ends_with("__c") {
                custom.push(name);
            } else {
                standard.push(name);
            }
        }
        standard.sort_unstable();
        custom.sort_unstable();
        let mut names = vec![STANDARD_CATEGORY.to_string()];
        names.extend(standard.into_iter().map(str::to_string));
        names.push(CUSTOM_CATEGORY.to_string());
        names.extend(custom.into_iter().map(str::to_string));
        Ok(names)
    }

    async fn fetch_object_def(&self, side: SchemaSide, api_name: &str) -> Result<SchemaObjectDef> {
        let found = match side {
            SchemaSide::Source => self.source.get(api_name),
            SchemaSide::Destination => self.destination.iter().find(|d| d.api_name == api_name),
        };
        found
            .cloned()
            .ok_or_else(|| anyhow!("{} schema has no object '{}'", side, api_name))
    }

    async fn fetch_destination_schema_page(&self, offset: usize) -> Result<Vec<SchemaObjectDef>> {
        Ok(self
            .destination
            .iter()
            .skip(offset)
            .take(self.page_size)
            .cloned()
            .collect())
    }

    async fn fetch_default_record_types(
        &self,
        sections: &[String],
    ) -> Result<HashMap<String, DefaultRecordType>> {
        let mut defaults = HashMap::new();
        for def in &self.destination {
            let Some(default) = def.record_types.iter().find(|rt| rt.is_default) else {
                continue;
            };
            for section in sections {
                defaults.insert(
                    format!("{}{}", section, def.api_name),
                    DefaultRecordType {
                        api_name: default.api_name.clone(),
                        additional_info: None,
                    },
                );
            }
        }
        Ok(defaults)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    const DESCRIBE: &str = "\
object,objectLabel,kind,apiName,label,dataType,connectedObject,relationshipName,field,isDefault
Account,Account,field,Name,Account Name (Text),text,,,,
Account,Account,field,Revenue__c,Revenue (Currency),currency,,,,
Account,Account,recordType,Business,Business,,,,,true
Account,Account,childRelationship,Contact,Contacts,,,Contacts,AccountId,
Invoice__c,Invoice,object,Invoice__c,,,,,,
";

    #[test]
    fn csv_rows_grouped_per_object() {
        let defs = read_describe_csv(DESCRIBE.as_bytes()).unwrap();
        assert_eq!(defs.len(), 2);
        let account = &defs[0];
        assert_eq!(account.fields.len(), 2);
        assert_eq!(account.fields[1].data_type.as_deref(), Some("currency"));
        assert!(account.record_types[0].is_default);
        assert_eq!(account.child_relationships[0].field.as_deref(), Some("AccountId"));
        assert_eq!(defs[1].label, "Invoice");
        assert!(defs[1].fields.is_empty());
    }

    #[test]
    fn unknown_kind_rejected() {
        let data = "object,kind,apiName\nAccount,trigger,Foo\n";
        assert!(read_describe_csv(data.as_bytes()).is_err());
    }

    #[test]
    fn loads_yaml_by_extension() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(
            file,
            "- apiName: Account\n  label: Account\n  fields:\n    - apiName: Name\n      label: Name (Text)\n      dataType: text"
        )
        .unwrap();
        let defs = load_schema(file.path()).unwrap();
        assert_eq!(defs[0].field("Name").unwrap().label, "Name (Text)");
    }

    #[tokio::test]
    async fn org_names_grouped_by_custom_suffix() {
        let service = StaticSchemaService::new(
            vec![
                SchemaObjectDef::new("Invoice__c", "Invoice"),
                SchemaObjectDef::new("Account", "Account"),
            ],
            vec![],
        );
        let names = service.fetch_org_schema_names().await.unwrap();
        assert_eq!(names, vec!["=Standard", "Account", "=Custom", "Invoice__c"]);
    }

    #[tokio::test]
    async fn pages_follow_api_name_order() {
        let service = StaticSchemaService::new(
            vec![],
            ["C", "A", "B"]
                .into_iter()
                .map(|n| SchemaObjectDef::new(n, n))
                .collect(),
        )
        .with_page_size(2);
        assert_eq!(service.page_offsets(), vec![0, 2]);
        let second = service.fetch_destination_schema_page(2).await.unwrap();
        assert_eq!(second[0].api_name, "C");
    }

    #[tokio::test]
    async fn defaults_keyed_by_section_and_object() {
        let defs = read_describe_csv(DESCRIBE.as_bytes()).unwrap();
        let service = StaticSchemaService::new(vec![], defs);
        let defaults = service
            .fetch_default_record_types(&["Sales".to_string()])
            .await
            .unwrap();
        assert_eq!(defaults["SalesAccount"].api_name, "Business");
        assert!(!defaults.contains_key("SalesInvoice__c"));
    }
}
