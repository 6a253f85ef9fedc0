// src/document.rs
//! The mapping document aggregate.
//!
//! Rows are addressed through [`SectionKey`], [`ObjectKey`] and [`RowTarget`]
//! so callers never splice the nested vectors directly. Every accessor checks
//! its index and reports [`MappingError::ObjectOutOfRange`] or
//! [`MappingError::RowOutOfRange`] instead of panicking.

use crate::error::{MappingError, Result};
use crate::gateway::{CloneRequests, ResolvedClones};
use crate::mapping::{
    ChildMapping, Destination, FieldMapping, MappingSectionGroup, NewFieldDescriptor,
    NewRecordTypeDescriptor, ObjectMapping, RecordTypeMapping,
};
use crate::schema::SchemaObjectDef;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SectionKey {
    /// Group produced by a wizard answer
    Recommended(String),
    /// Objects the user added outside any answer
    Additional,
}

impl SectionKey {
    pub fn recommended(name: impl Into<String>) -> Self {
        SectionKey::Recommended(name.into())
    }
}

impl fmt::Display for SectionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SectionKey::Recommended(name) => write!(f, "{}", name),
            SectionKey::Additional => write!(f, "<additional>"),
        }
    }
}

/// One object mapping inside a section.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectKey {
    pub section: SectionKey,
    pub index: usize,
}

impl ObjectKey {
    pub fn new(section: SectionKey, index: usize) -> Self {
        Self { section, index }
    }
}

/// What `add_row` / `remove_row` operate on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowTarget {
    Object(SectionKey),
    RecordType(ObjectKey),
    Field(ObjectKey),
    ChildRelationship(ObjectKey),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MappingLevel {
    Object,
    RecordType,
    Field,
    ChildRelationship,
}

impl MappingLevel {
    pub fn noun(&self) -> &'static str {
        match self {
            MappingLevel::Object => "Objects",
            MappingLevel::RecordType => "Record Types",
            MappingLevel::Field => "Fields",
            MappingLevel::ChildRelationship => "Child Relationships",
        }
    }
}

/// Progress indicator for one level of one mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Completeness {
    pub mapped: usize,
    pub total: usize,
    pub label: String,
}

impl Completeness {
    fn new(mapped: usize, total: usize, level: MappingLevel) -> Self {
        Self {
            mapped,
            total,
            label: format!("{} of {} {}", mapped, total, level.noun()),
        }
    }

    pub fn is_done(&self) -> bool {
        self.mapped >= self.total
    }
}

/// Outcome of splicing resolved clone descriptors into the document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CloneOutcome {
    pub resolved: usize,
    /// `Object.Field` keys the resolver had no answer for
    pub unresolved: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MappingDocument {
    #[serde(default)]
    pub recommended: Vec<MappingSectionGroup>,
    #[serde(default)]
    pub additional: Vec<ObjectMapping>,
}

impl MappingDocument {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn section_names(&self) -> impl Iterator<Item = &str> {
        self.recommended.iter().map(|g| g.section_name.as_str())
    }

    pub fn has_section(&self, name: &str) -> bool {
        self.recommended.iter().any(|g| g.section_name == name)
    }

    pub fn section(&self, key: &SectionKey) -> Result<&[ObjectMapping]> {
        match key {
            SectionKey::Additional => Ok(self.additional.as_slice()),
            SectionKey::Recommended(name) => self
                .recommended
                .iter()
                .find(|g| &g.section_name == name)
                .map(|g| g.mapping_data.as_slice())
                .ok_or_else(|| MappingError::UnknownSection(name.clone())),
        }
    }

    fn section_mut(&mut self, key: &SectionKey) -> Result<&mut Vec<ObjectMapping>> {
        match key {
            SectionKey::Additional => Ok(&mut self.additional),
            SectionKey::Recommended(name) => self
                .recommended
                .iter_mut()
                .find(|g| &g.section_name == name)
                .map(|g| &mut g.mapping_data)
                .ok_or_else(|| MappingError::UnknownSection(name.clone())),
        }
    }

    pub fn object(&self, key: &ObjectKey) -> Result<&ObjectMapping> {
        let rows = self.section(&key.section)?;
        rows.get(key.index).ok_or(MappingError::ObjectOutOfRange {
            index: key.index,
            len: rows.len(),
        })
    }

    pub fn object_mut(&mut self, key: &ObjectKey) -> Result<&mut ObjectMapping> {
        let rows = self.section_mut(&key.section)?;
        let len = rows.len();
        rows.get_mut(key.index).ok_or(MappingError::ObjectOutOfRange {
            index: key.index,
            len,
        })
    }

    /// Keys of every object mapping in a section, in order.
    pub fn object_keys(&self, section: &SectionKey) -> Result<Vec<ObjectKey>> {
        let len = self.section(section)?.len();
        Ok((0..len)
            .map(|index| ObjectKey::new(section.clone(), index))
            .collect())
    }

    /// Replaces the rows of `section_name`, or appends a new group.
    pub fn upsert_section(&mut self, section_name: &str, object_mappings: Vec<ObjectMapping>) {
        match self
            .recommended
            .iter_mut()
            .find(|g| g.section_name == section_name)
        {
            Some(group) => group.mapping_data = object_mappings,
            None => self
                .recommended
                .push(MappingSectionGroup::new(section_name, object_mappings)),
        }
    }

    /// Drops groups whose name is a known answer that is no longer selected.
    /// Names outside `all_known` are left alone. Returns the removed names.
    pub fn prune_stale_sections(
        &mut self,
        valid: &HashSet<String>,
        all_known: &HashSet<String>,
    ) -> Vec<String> {
        let mut removed = Vec::new();
        self.recommended.retain(|group| {
            let stale =
                all_known.contains(&group.section_name) && !valid.contains(&group.section_name);
            if stale {
                removed.push(group.section_name.clone());
            }
            !stale
        });
        removed
    }

    /// Appends an empty row and returns its index.
    pub fn add_row(&mut self, target: &RowTarget) -> Result<usize> {
        match target {
            RowTarget::Object(section) => {
                let rows = self.section_mut(section)?;
                rows.push(ObjectMapping {
                    user_generated: true,
                    ..Default::default()
                });
                Ok(rows.len() - 1)
            }
            RowTarget::RecordType(key) => {
                let object = self.object_mut(key)?;
                object.record_type_mapping.push(RecordTypeMapping::default());
                Ok(object.record_type_mapping.len() - 1)
            }
            RowTarget::Field(key) => {
                let object = self.object_mut(key)?;
                object.field_mapping.push(FieldMapping::default());
                Ok(object.field_mapping.len() - 1)
            }
            RowTarget::ChildRelationship(key) => {
                let object = self.object_mut(key)?;
                object.child_relationships.push(ChildMapping::default());
                Ok(object.child_relationships.len() - 1)
            }
        }
    }

    pub fn remove_row(&mut self, target: &RowTarget, index: usize) -> Result<()> {
        match target {
            RowTarget::Object(section) => remove_at(self.section_mut(section)?, index),
            RowTarget::RecordType(key) => {
                remove_at(&mut self.object_mut(key)?.record_type_mapping, index)
            }
            RowTarget::Field(key) => remove_at(&mut self.object_mut(key)?.field_mapping, index),
            RowTarget::ChildRelationship(key) => {
                remove_at(&mut self.object_mut(key)?.child_relationships, index)
            }
        }
    }

    /// Changing the source object invalidates every nested row.
    pub fn set_object_source(&mut self, key: &ObjectKey, source: &str) -> Result<()> {
        let object = self.object_mut(key)?;
        if object.source != source {
            object.source = source.to_string();
            clear_nested(object);
        }
        object.refresh_show_details();
        Ok(())
    }

    pub fn set_object_destination(&mut self, key: &ObjectKey, destination: &str) -> Result<()> {
        let object = self.object_mut(key)?;
        if object.destination != destination {
            object.destination = destination.to_string();
            clear_nested(object);
        }
        object.refresh_show_details();
        Ok(())
    }

    pub fn set_field_source(&mut self, key: &ObjectKey, index: usize, source: &str) -> Result<()> {
        let row = field_row_mut(self.object_mut(key)?, index)?;
        row.source = source.to_string();
        Ok(())
    }

    /// Points a field row somewhere else, rejecting a destination another row
    /// already uses. A `new_meta` that no longer matches is dropped.
    pub fn set_field_destination(
        &mut self,
        key: &ObjectKey,
        index: usize,
        destination: Destination,
    ) -> Result<()> {
        let object = self.object_mut(key)?;
        if let Some(api_name) = destination.api_name() {
            ensure_field_destination_free(object, index, api_name)?;
        }
        let row = field_row_mut(object, index)?;
        let keeps_meta = match (&row.new_meta, destination.api_name()) {
            (Some(meta), Some(api_name)) => meta.api_name == api_name,
            _ => false,
        };
        if !keeps_meta {
            row.new_meta = None;
            row.current_meta = None;
        }
        row.destination = destination;
        Ok(())
    }

    /// Marks a field row as a pending creation of `descriptor`.
    pub fn attach_new_field(
        &mut self,
        key: &ObjectKey,
        index: usize,
        descriptor: NewFieldDescriptor,
    ) -> Result<()> {
        let object = self.object_mut(key)?;
        ensure_field_destination_free(object, index, &descriptor.api_name)?;
        let row = field_row_mut(object, index)?;
        row.destination = Destination::Mapped(descriptor.api_name.clone());
        row.current_meta = None;
        row.new_meta = Some(descriptor);
        Ok(())
    }

    pub fn set_record_type_source(
        &mut self,
        key: &ObjectKey,
        index: usize,
        source: &str,
    ) -> Result<()> {
        let row = record_type_row_mut(self.object_mut(key)?, index)?;
        row.source = source.to_string();
        Ok(())
    }

    pub fn set_record_type_destination(
        &mut self,
        key: &ObjectKey,
        index: usize,
        destination: &str,
    ) -> Result<()> {
        let row = record_type_row_mut(self.object_mut(key)?, index)?;
        if row
            .new_meta
            .as_ref()
            .is_some_and(|meta| meta.api_name != destination)
        {
            row.new_meta = None;
        }
        row.destination = destination.to_string();
        Ok(())
    }

    pub fn attach_new_record_type(
        &mut self,
        key: &ObjectKey,
        index: usize,
        descriptor: NewRecordTypeDescriptor,
    ) -> Result<()> {
        let row = record_type_row_mut(self.object_mut(key)?, index)?;
        row.destination = descriptor.api_name.clone();
        row.new_meta = Some(descriptor);
        Ok(())
    }

    /// Adds or replaces the child mapping with the same `value`.
    pub fn upsert_child_mapping(&mut self, key: &ObjectKey, child: ChildMapping) -> Result<()> {
        let object = self.object_mut(key)?;
        match object
            .child_relationships
            .iter_mut()
            .find(|c| c.value == child.value)
        {
            Some(existing) => *existing = child,
            None => object.child_relationships.push(child),
        }
        Ok(())
    }

    /// Distinct non-empty sources that also have a destination, against the
    /// size of the matching collection in `def`.
    pub fn completeness(
        &self,
        target: &ObjectKey,
        level: MappingLevel,
        def: &SchemaObjectDef,
    ) -> Result<Completeness> {
        let object = self.object(target)?;
        let (mapped, total) = match level {
            MappingLevel::Object => return self.section_completeness(&target.section),
            MappingLevel::Field => (
                count_distinct(
                    object
                        .field_mapping
                        .iter()
                        .filter(|row| row.destination.is_set())
                        .map(|row| row.source.as_str()),
                ),
                def.fields.len(),
            ),
            MappingLevel::RecordType => (
                count_distinct(
                    object
                        .record_type_mapping
                        .iter()
                        .filter(|row| !row.destination.is_empty())
                        .map(|row| row.source.as_str()),
                ),
                def.record_types.len(),
            ),
            MappingLevel::ChildRelationship => (
                count_distinct(object.child_relationships.iter().map(|c| c.value.as_str())),
                def.child_relationships.len(),
            ),
        };
        Ok(Completeness::new(mapped, total, level))
    }

    /// Object mappings with both ends set against all rows of the section.
    pub fn section_completeness(&self, section: &SectionKey) -> Result<Completeness> {
        let rows = self.section(section)?;
        let mapped = count_distinct(
            rows.iter()
                .filter(|row| !row.destination.is_empty())
                .map(|row| row.source.as_str()),
        );
        Ok(Completeness::new(mapped, rows.len(), MappingLevel::Object))
    }

    /// Copy of the document as it is persisted: rows without details dropped.
    pub fn persistable(&self) -> MappingDocument {
        MappingDocument {
            recommended: self
                .recommended
                .iter()
                .map(|group| MappingSectionGroup {
                    section_name: group.section_name.clone(),
                    mapping_data: group
                        .mapping_data
                        .iter()
                        .filter(|row| row.show_details)
                        .cloned()
                        .collect(),
                })
                .collect(),
            additional: self
                .additional
                .iter()
                .filter(|row| row.show_details)
                .cloned()
                .collect(),
        }
    }

    /// True when nothing would be written by a save.
    pub fn is_empty(&self) -> bool {
        self.recommended
            .iter()
            .flat_map(|g| g.mapping_data.iter())
            .chain(self.additional.iter())
            .all(|row| !row.show_details)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.persistable())?)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.persistable())?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let document: MappingDocument = serde_json::from_str(json)?;
        document.check_invariants()?;
        Ok(document)
    }

    pub fn check_invariants(&self) -> Result<()> {
        let mut names = HashSet::new();
        for group in &self.recommended {
            if !names.insert(group.section_name.as_str()) {
                return Err(MappingError::DuplicateSection(group.section_name.clone()));
            }
        }
        let objects = self
            .recommended
            .iter()
            .flat_map(|g| g.mapping_data.iter())
            .chain(self.additional.iter());
        for object in objects {
            check_object(object)?;
        }
        Ok(())
    }

    /// Every `clone` field row, keyed `SourceObject.SourceField`. When the
    /// same source field is cloned into several destination objects the
    /// first one is requested; [`apply_clones`](Self::apply_clones) rebases
    /// the answer onto each row's own destination.
    pub fn clone_requests(&self) -> CloneRequests {
        let mut requests = CloneRequests::default();
        for object in self.recommended.iter().flat_map(|g| g.mapping_data.iter()) {
            collect_clones(object, &mut requests.recommended);
        }
        for object in &self.additional {
            collect_clones(object, &mut requests.additional);
        }
        requests
    }

    /// Replaces each `clone` sentinel with its resolved descriptor.
    pub fn apply_clones(&mut self, resolved: &ResolvedClones) -> Result<CloneOutcome> {
        let mut outcome = CloneOutcome::default();
        let objects = self
            .recommended
            .iter_mut()
            .flat_map(|g| g.mapping_data.iter_mut())
            .chain(self.additional.iter_mut());
        for object in objects {
            for index in 0..object.field_mapping.len() {
                if object.field_mapping[index].destination != Destination::PendingClone {
                    continue;
                }
                let key = clone_key(&object.source, &object.field_mapping[index].source);
                let Some(meta) = resolved.get(&key) else {
                    outcome.unresolved.push(key);
                    continue;
                };
                // one answer per key; rebased onto this row's destination object
                let meta = meta.on_object(&object.destination);
                let descriptor = meta.to_new_field();
                ensure_field_destination_free(object, index, &descriptor.api_name)?;
                let row = &mut object.field_mapping[index];
                row.destination = Destination::Mapped(descriptor.api_name.clone());
                row.new_meta = Some(descriptor);
                row.current_meta = Some(meta);
                outcome.resolved += 1;
            }
        }
        Ok(outcome)
    }
}

pub(crate) fn clone_key(source_object: &str, source_field: &str) -> String {
    format!("{}.{}", source_object, source_field)
}

fn collect_clones(
    object: &ObjectMapping,
    into: &mut std::collections::BTreeMap<String, String>,
) {
    for row in &object.field_mapping {
        if row.destination == Destination::PendingClone {
            into.entry(clone_key(&object.source, &row.source))
                .or_insert_with(|| object.destination.clone());
        }
    }
}

fn remove_at<T>(rows: &mut Vec<T>, index: usize) -> Result<()> {
    if index >= rows.len() {
        return Err(MappingError::RowOutOfRange {
            index,
            len: rows.len(),
        });
    }
    rows.remove(index);
    Ok(())
}

fn clear_nested(object: &mut ObjectMapping) {
    object.field_mapping.clear();
    object.record_type_mapping.clear();
    object.child_relationships.clear();
}

fn field_row_mut(object: &mut ObjectMapping, index: usize) -> Result<&mut FieldMapping> {
    let len = object.field_mapping.len();
    object
        .field_mapping
        .get_mut(index)
        .ok_or(MappingError::RowOutOfRange { index, len })
}

fn record_type_row_mut(
    object: &mut ObjectMapping,
    index: usize,
) -> Result<&mut RecordTypeMapping> {
    let len = object.record_type_mapping.len();
    object
        .record_type_mapping
        .get_mut(index)
        .ok_or(MappingError::RowOutOfRange { index, len })
}

fn ensure_field_destination_free(
    object: &ObjectMapping,
    index: usize,
    api_name: &str,
) -> Result<()> {
    let taken = object
        .field_mapping
        .iter()
        .enumerate()
        .any(|(i, row)| i != index && row.destination.api_name() == Some(api_name));
    if taken {
        return Err(MappingError::DuplicateDestination(api_name.to_string()));
    }
    Ok(())
}

fn check_object(object: &ObjectMapping) -> Result<()> {
    let mut seen = HashSet::new();
    for row in &object.field_mapping {
        if let Some(api_name) = row.destination.api_name() {
            if !seen.insert(api_name) {
                return Err(MappingError::DuplicateDestination(api_name.to_string()));
            }
        }
        if let Some(meta) = &row.new_meta {
            if row.destination.api_name() != Some(meta.api_name.as_str()) {
                return Err(MappingError::NewMetaMismatch {
                    destination: row.destination.to_string(),
                    api_name: meta.api_name.clone(),
                });
            }
        }
    }
    for row in &object.record_type_mapping {
        if let Some(meta) = &row.new_meta {
            if row.destination != meta.api_name {
                return Err(MappingError::NewMetaMismatch {
                    destination: row.destination.clone(),
                    api_name: meta.api_name.clone(),
                });
            }
        }
    }
    Ok(())
}

fn count_distinct<'a>(values: impl Iterator<Item = &'a str>) -> usize {
    values
        .filter(|v| !v.is_empty())
        .collect::<HashSet<_>>()
        .len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::ExistingFieldDescriptor;
    use crate::schema::RecordTypeDef;
    use pretty_assertions::assert_eq;

    fn names(values: &[&str]) -> HashSet<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    fn doc_with_sections(sections: &[&str]) -> MappingDocument {
        let mut doc = MappingDocument::new();
        for name in sections {
            doc.upsert_section(name, vec![ObjectMapping::new("Account", "Account")]);
        }
        doc
    }

    fn account_key() -> ObjectKey {
        ObjectKey::new(SectionKey::recommended("Sales"), 0)
    }

    #[test]
    fn upsert_replaces_existing_section() {
        let mut doc = doc_with_sections(&["Sales"]);
        doc.upsert_section(
            "Sales",
            vec![
                ObjectMapping::new("Lead", "Lead"),
                ObjectMapping::new("Contact", "Contact"),
            ],
        );
        assert_eq!(doc.recommended.len(), 1);
        assert_eq!(doc.recommended[0].mapping_data.len(), 2);
    }

    #[test]
    fn prune_keeps_unknown_sections() {
        let mut doc = doc_with_sections(&["A", "B", "C"]);
        let removed = doc.prune_stale_sections(&names(&["A"]), &names(&["A", "B"]));
        assert_eq!(removed, vec!["B".to_string()]);
        let left: Vec<&str> = doc.section_names().collect();
        assert_eq!(left, vec!["A", "C"]);
    }

    #[test]
    fn add_and_remove_rows() {
        let mut doc = doc_with_sections(&["Sales"]);
        let key = account_key();
        let idx = doc.add_row(&RowTarget::Field(key.clone())).unwrap();
        assert_eq!(idx, 0);
        doc.add_row(&RowTarget::RecordType(key.clone())).unwrap();
        let obj_idx = doc
            .add_row(&RowTarget::Object(SectionKey::recommended("Sales")))
            .unwrap();
        assert_eq!(obj_idx, 1);
        assert!(doc.object(&ObjectKey::new(SectionKey::recommended("Sales"), 1)).unwrap().user_generated);

        doc.remove_row(&RowTarget::Field(key.clone()), 0).unwrap();
        assert!(doc.object(&key).unwrap().field_mapping.is_empty());

        let err = doc.remove_row(&RowTarget::Field(key), 3).unwrap_err();
        assert!(matches!(err, MappingError::RowOutOfRange { index: 3, len: 0 }));
    }

    #[test]
    fn unknown_section_is_an_error() {
        let mut doc = MappingDocument::new();
        let err = doc
            .add_row(&RowTarget::Object(SectionKey::recommended("Nope")))
            .unwrap_err();
        assert!(matches!(err, MappingError::UnknownSection(_)));
    }

    #[test]
    fn field_destinations_stay_unique() {
        let mut doc = doc_with_sections(&["Sales"]);
        let key = account_key();
        doc.add_row(&RowTarget::Field(key.clone())).unwrap();
        doc.add_row(&RowTarget::Field(key.clone())).unwrap();
        doc.set_field_destination(&key, 0, Destination::mapped("Name"))
            .unwrap();
        let err = doc
            .set_field_destination(&key, 1, Destination::mapped("Name"))
            .unwrap_err();
        assert!(matches!(err, MappingError::DuplicateDestination(ref d) if d == "Name"));

        // sentinels may repeat
        doc.set_field_destination(&key, 1, Destination::PendingClone)
            .unwrap();
        doc.add_row(&RowTarget::Field(key.clone())).unwrap();
        doc.set_field_destination(&key, 2, Destination::PendingClone)
            .unwrap();
    }

    #[test]
    fn changing_source_object_clears_rows() {
        let mut doc = doc_with_sections(&["Sales"]);
        let key = account_key();
        doc.add_row(&RowTarget::Field(key.clone())).unwrap();
        doc.set_object_source(&key, "Organization").unwrap();
        let object = doc.object(&key).unwrap();
        assert!(object.field_mapping.is_empty());
        assert!(object.show_details);

        doc.set_object_source(&key, "").unwrap();
        assert!(!doc.object(&key).unwrap().show_details);
    }

    #[test]
    fn record_type_completeness_counts_distinct_sources() {
        let mut doc = doc_with_sections(&["Sales"]);
        let key = account_key();
        {
            let object = doc.object_mut(&key).unwrap();
            object.record_type_mapping = vec![
                RecordTypeMapping::new("Retail", "Retail"),
                RecordTypeMapping::new("Retail", "Consumer"),
                RecordTypeMapping::new("Partner", "Partner"),
                RecordTypeMapping::new("Wholesale", ""),
            ];
        }
        let mut def = SchemaObjectDef::new("Account", "Account");
        for name in ["Retail", "Partner", "Wholesale"] {
            def.record_types.push(RecordTypeDef {
                api_name: name.into(),
                label: name.into(),
                is_default: false,
            });
        }
        let progress = doc
            .completeness(&key, MappingLevel::RecordType, &def)
            .unwrap();
        assert_eq!(progress.mapped, 2);
        assert_eq!(progress.total, 3);
        assert_eq!(progress.label, "2 of 3 Record Types");
    }

    #[test]
    fn section_completeness_counts_objects() {
        let mut doc = MappingDocument::new();
        doc.upsert_section(
            "Sales",
            vec![
                ObjectMapping::new("Account", "Account"),
                ObjectMapping::stub("Opportunity"),
            ],
        );
        let progress = doc
            .section_completeness(&SectionKey::recommended("Sales"))
            .unwrap();
        assert_eq!(progress.label, "1 of 2 Objects");
    }

    #[test]
    fn serialization_drops_rows_without_details() {
        let mut doc = MappingDocument::new();
        doc.upsert_section(
            "Sales",
            vec![
                ObjectMapping::new("Account", "Account"),
                ObjectMapping::stub("Opportunity"),
            ],
        );
        doc.additional.push(ObjectMapping::stub("Case"));
        let restored = MappingDocument::from_json(&doc.to_json().unwrap()).unwrap();
        assert_eq!(restored.recommended[0].mapping_data.len(), 1);
        assert!(restored.additional.is_empty());
        assert!(!restored.is_empty());
    }

    #[test]
    fn from_json_rejects_duplicate_destinations() {
        let json = r#"{
            "recommended": [{
                "sectionName": "Sales",
                "mappingData": [{
                    "source": "Account", "destination": "Account", "showDetails": true,
                    "fieldMapping": [
                        {"source": "A", "destination": "Name"},
                        {"source": "B", "destination": "Name"}
                    ]
                }]
            }],
            "additional": []
        }"#;
        assert!(matches!(
            MappingDocument::from_json(json),
            Err(MappingError::DuplicateDestination(_))
        ));
    }

    #[test]
    fn from_json_rejects_new_meta_mismatch() {
        let json = r#"{
            "recommended": [],
            "additional": [{
                "source": "Account", "destination": "Account", "showDetails": true,
                "fieldMapping": [{
                    "source": "Tier__c", "destination": "Level__c",
                    "newMeta": {"label": "Tier", "apiName": "Tier__c", "dataType": "Text"}
                }]
            }]
        }"#;
        assert!(matches!(
            MappingDocument::from_json(json),
            Err(MappingError::NewMetaMismatch { .. })
        ));
    }

    #[test]
    fn clone_requests_and_resolution() {
        let mut doc = MappingDocument::new();
        let mut contact = ObjectMapping::new("Contact", "Account");
        contact
            .field_mapping
            .push(FieldMapping::new("Email__c", Destination::PendingClone));
        contact
            .field_mapping
            .push(FieldMapping::new("Fax__c", Destination::PendingClone));
        doc.upsert_section("Sales", vec![contact]);

        let requests = doc.clone_requests();
        assert_eq!(
            requests.recommended.get("Contact.Email__c").map(String::as_str),
            Some("Account")
        );
        assert!(requests.additional.is_empty());

        let mut resolved = ResolvedClones::new();
        resolved.insert(
            "Contact.Email__c".to_string(),
            ExistingFieldDescriptor {
                full_name: "Account.Email__c".into(),
                label: "Email".into(),
                data_type: "Email".into(),
                ..Default::default()
            },
        );
        let outcome = doc.apply_clones(&resolved).unwrap();
        assert_eq!(outcome.resolved, 1);
        assert_eq!(outcome.unresolved, vec!["Contact.Fax__c".to_string()]);

        let row = &doc.object(&account_key()).unwrap().field_mapping[0];
        assert_eq!(row.destination, Destination::mapped("Email"));
        assert_eq!(row.new_meta.as_ref().unwrap().api_name, "Email");
        assert!(doc.check_invariants().is_ok());
    }

    #[test]
    fn shared_clone_key_rebases_onto_each_destination() {
        let mut doc = MappingDocument::new();
        let mut into_account = ObjectMapping::new("Contact", "Account");
        into_account
            .field_mapping
            .push(FieldMapping::new("Email__c", Destination::PendingClone));
        let mut into_lead = ObjectMapping::new("Contact", "Lead");
        into_lead
            .field_mapping
            .push(FieldMapping::new("Email__c", Destination::PendingClone));
        doc.upsert_section("Sales", vec![into_account]);
        doc.upsert_section("Marketing", vec![into_lead]);

        let requests = doc.clone_requests();
        assert_eq!(requests.recommended.len(), 1);
        assert_eq!(
            requests.recommended.get("Contact.Email__c").map(String::as_str),
            Some("Account")
        );

        let mut resolved = ResolvedClones::new();
        resolved.insert(
            "Contact.Email__c".to_string(),
            ExistingFieldDescriptor {
                full_name: "Account.Email__c".into(),
                label: "Email".into(),
                data_type: "Email".into(),
                ..Default::default()
            },
        );
        let outcome = doc.apply_clones(&resolved).unwrap();
        assert_eq!(outcome.resolved, 2);

        let full_name = |section: &str| {
            let key = ObjectKey::new(SectionKey::recommended(section), 0);
            let row = &doc.object(&key).unwrap().field_mapping[0];
            assert_eq!(row.destination, Destination::mapped("Email"));
            row.current_meta.as_ref().unwrap().full_name.clone()
        };
        assert_eq!(full_name("Sales"), "Account.Email__c");
        assert_eq!(full_name("Marketing"), "Lead.Email__c");
    }

    #[test]
    fn every_optional_row_field_survives_json() {
        let mut account = ObjectMapping::new("Account", "Account");
        account.user_generated = true;
        account.field_mapping.push(FieldMapping {
            source: "Fax__c".into(),
            destination: Destination::mapped("Fax2__c"),
            new_meta: Some(NewFieldDescriptor {
                label: "Fax 2".into(),
                api_name: "Fax2__c".into(),
                data_type: "Lookup".into(),
                length: Some(40),
                required: true,
                unique: true,
                default_value: Some("none".into()),
                connected_object: Some("Contact".into()),
                child_relationship_name: Some("Faxes".into()),
            }),
            current_meta: Some(ExistingFieldDescriptor {
                full_name: "Account.Fax__c".into(),
                label: "Fax".into(),
                data_type: "Phone".into(),
                length: Some(40),
                precision: Some(18),
                scale: Some(2),
                required: true,
                unique: true,
                default_value: Some("0".into()),
                reference_to: Some("Contact".into()),
                relationship_name: Some("Faxes__r".into()),
                description: Some("legacy fax".into()),
            }),
            user_generated: true,
        });
        account.field_mapping.push(FieldMapping::new("Name", "Name"));
        account.record_type_mapping.push(RecordTypeMapping {
            source: "Partner".into(),
            destination: "Reseller".into(),
            new_meta: Some(NewRecordTypeDescriptor {
                label: "Reseller".into(),
                api_name: "Reseller".into(),
                description: "channel accounts".into(),
                active: true,
            }),
            user_generated: true,
        });
        account.child_relationships.push(ChildMapping {
            label: "Invoices".into(),
            value: "Invoice__c".into(),
            new_meta: NewFieldDescriptor {
                label: "Account".into(),
                api_name: "Account__c".into(),
                data_type: "Lookup".into(),
                connected_object: Some("Account".into()),
                child_relationship_name: Some("Invoices".into()),
                ..Default::default()
            },
        });

        let mut doc = MappingDocument::new();
        doc.upsert_section("Sales", vec![account]);
        doc.additional.push(ObjectMapping::new("Lead", "Lead"));

        let restored = MappingDocument::from_json(&doc.to_json().unwrap()).unwrap();
        assert_eq!(restored, doc);
    }

    #[test]
    fn clone_resolution_respects_uniqueness() {
        let mut doc = MappingDocument::new();
        let mut contact = ObjectMapping::new("Contact", "Account");
        contact
            .field_mapping
            .push(FieldMapping::new("Mail", Destination::mapped("Email")));
        contact
            .field_mapping
            .push(FieldMapping::new("Email__c", Destination::PendingClone));
        doc.additional.push(contact);

        let mut resolved = ResolvedClones::new();
        resolved.insert(
            "Contact.Email__c".to_string(),
            ExistingFieldDescriptor {
                full_name: "Account.Email__c".into(),
                ..Default::default()
            },
        );
        assert!(matches!(
            doc.apply_clones(&resolved),
            Err(MappingError::DuplicateDestination(_))
        ));
    }
}
