// src/session.rs
//! The answer-driven wizard over one mapping document.
//!
//! The wizard walks one step per active answer, then a final step for the
//! objects mapped outside any answer. Every edit that talks to a collaborator
//! runs against a copy of the document; the copy replaces the session's
//! document only once every call succeeded, so a failure leaves the session
//! exactly where it was and records a [`Notice`].

use crate::automap::{AutoMapSummary, AutoMapper, COMPONENT as AUTOMAPPER};
use crate::catalog::SchemaCatalog;
use crate::config::{active_answers, SessionConfig};
use crate::document::{
    CloneOutcome, Completeness, MappingDocument, MappingLevel, ObjectKey, SectionKey,
};
use crate::error::{MappingError, Result};
use crate::gateway::PersistenceGateway;
use crate::mapping::{Destination, NewFieldDescriptor, NewRecordTypeDescriptor, ObjectMapping};
use crate::metadata::{
    child_mapping, pending_field_option, pending_record_type_option, NewFieldRequest,
    NewMetadataBuilder, NewRecordTypeRequest,
};
use crate::schema::SchemaSide;
use futures::future::join_all;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

const COMPONENT: &str = "MappingSession";
const GATEWAY: &str = "PersistenceGateway";

fn section_for(answers: &[String], step: usize) -> SectionKey {
    match answers.get(step) {
        Some(name) => SectionKey::recommended(name.clone()),
        None => SectionKey::Additional,
    }
}

fn prune_sections(
    document: &mut MappingDocument,
    answers: &[String],
    known: &HashSet<String>,
) -> Vec<String> {
    let valid: HashSet<String> = answers.iter().cloned().collect();
    document.prune_stale_sections(&valid, known)
}

/// A user-facing message about a failed collaborator call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub component: &'static str,
    pub operation: &'static str,
    pub message: String,
}

/// Where a navigation command left the wizard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    AtSection(usize),
    /// Past the last step; the final save has been written
    SectionsExhausted(CloneOutcome),
    /// Before the first step; control returns to the questionnaire
    BackToQuestion,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionState {
    pub step: usize,
    pub steps: usize,
    pub section: SectionKey,
}

pub struct MappingSession {
    assessment_id: String,
    catalog: Arc<SchemaCatalog>,
    gateway: Arc<dyn PersistenceGateway>,
    document: MappingDocument,
    answers: Vec<String>,
    known_answers: HashSet<String>,
    templates: BTreeMap<String, Vec<String>>,
    step: usize,
    notices: Vec<Notice>,
}

impl MappingSession {
    /// Loads the stored document (or starts an empty one), prunes sections
    /// for answers that are no longer selected and enters the first step.
    pub async fn start(
        config: &SessionConfig,
        catalog: Arc<SchemaCatalog>,
        gateway: Arc<dyn PersistenceGateway>,
    ) -> Result<Self> {
        let stored = gateway.load(&config.assessment_id).await.map_err(|e| {
            tracing::error!(component = GATEWAY, operation = "load", assessment = %config.assessment_id, error = %e, "loading mapping document failed");
            MappingError::collaborator(GATEWAY, "load", e)
        })?;
        let loaded = stored.is_some();
        let mut session = Self {
            assessment_id: config.assessment_id.clone(),
            catalog,
            gateway,
            document: stored.unwrap_or_default(),
            answers: config.active_answers(),
            known_answers: config.known_answers(),
            templates: config.templates.clone(),
            step: 0,
            notices: Vec::new(),
        };
        let removed = session.prune();
        tracing::info!(
            component = COMPONENT,
            operation = "start",
            assessment = %session.assessment_id,
            loaded,
            pruned = removed.len(),
            steps = session.steps(),
            "session started"
        );

        let mut work = session.document.clone();
        session.enter(&mut work, &session.section_at(0)).await?;
        session.document = work;
        Ok(session)
    }

    pub fn assessment_id(&self) -> &str {
        &self.assessment_id
    }

    pub fn document(&self) -> &MappingDocument {
        &self.document
    }

    /// Active answers, one wizard step each.
    pub fn sections(&self) -> &[String] {
        &self.answers
    }

    /// Number of steps including the trailing additional-objects step.
    pub fn steps(&self) -> usize {
        self.answers.len() + 1
    }

    pub fn state(&self) -> SessionState {
        SessionState {
            step: self.step,
            steps: self.steps(),
            section: self.section_at(self.step),
        }
    }

    pub fn current_section(&self) -> SectionKey {
        self.section_at(self.step)
    }

    fn section_at(&self, step: usize) -> SectionKey {
        section_for(&self.answers, step)
    }

    pub fn notices(&self) -> &[Notice] {
        &self.notices
    }

    pub fn take_notices(&mut self) -> Vec<Notice> {
        std::mem::take(&mut self.notices)
    }

    /// Logs a failure and, for collaborator failures, records a notice.
    fn fail(&mut self, operation: &'static str, error: MappingError) -> MappingError {
        if error.is_collaborator() {
            let component = match &error {
                MappingError::Collaborator { component, .. } => *component,
                _ => "SchemaCatalog",
            };
            tracing::error!(
                component,
                operation,
                step = self.step,
                error = %error,
                "operation failed, session unchanged"
            );
            self.notices.push(Notice {
                component,
                operation,
                message: error.to_string(),
            });
        } else {
            tracing::warn!(component = COMPONENT, operation, error = %error, "edit rejected");
        }
        error
    }

    /// Saves, then moves to the next step. Leaving the last step writes the
    /// final save with clone resolution instead.
    pub async fn next(&mut self) -> Result<Transition> {
        match self.try_next().await {
            Ok(transition) => Ok(transition),
            Err(e) => Err(self.fail("next", e)),
        }
    }

    async fn try_next(&mut self) -> Result<Transition> {
        self.save(&self.document).await?;
        let target = self.step + 1;
        if target >= self.steps() {
            let outcome = self.finalize().await?;
            return Ok(Transition::SectionsExhausted(outcome));
        }
        let mut work = self.document.clone();
        self.enter(&mut work, &self.section_at(target)).await?;
        self.document = work;
        self.step = target;
        tracing::debug!(component = COMPONENT, operation = "next", step = target, section = %self.current_section(), "entered section");
        Ok(Transition::AtSection(target))
    }

    pub async fn previous(&mut self) -> Result<Transition> {
        match self.try_previous().await {
            Ok(transition) => Ok(transition),
            Err(e) => Err(self.fail("previous", e)),
        }
    }

    async fn try_previous(&mut self) -> Result<Transition> {
        self.save(&self.document).await?;
        if self.step == 0 {
            return Ok(Transition::BackToQuestion);
        }
        let target = self.step - 1;
        let mut work = self.document.clone();
        self.enter(&mut work, &self.section_at(target)).await?;
        self.document = work;
        self.step = target;
        Ok(Transition::AtSection(target))
    }

    /// Creates `section` from its template unless the document already has
    /// it. Template objects are checked against the destination schema first.
    async fn enter(&self, work: &mut MappingDocument, section: &SectionKey) -> Result<()> {
        let SectionKey::Recommended(name) = section else {
            return Ok(());
        };
        if work.has_section(name) {
            return Ok(());
        }
        let objects = self.templates.get(name).cloned().unwrap_or_default();
        let fetched = join_all(
            objects
                .iter()
                .map(|object| self.catalog.get(SchemaSide::Destination, object)),
        )
        .await;
        let stubs = fetched
            .into_iter()
            .map(|def| def.map(|def| ObjectMapping::stub(def.api_name.clone())))
            .collect::<Result<Vec<_>>>()?;
        tracing::debug!(component = COMPONENT, operation = "enter", section = %name, objects = stubs.len(), "section initialized from template");
        work.upsert_section(name, stubs);
        Ok(())
    }

    /// Replaces the active answers, drops sections of known answers that are
    /// no longer active and initializes whatever section now sits at the
    /// current step. Returns the removed section names.
    pub async fn update_answers(
        &mut self,
        answers: &[String],
        excluded: &[String],
    ) -> Result<Vec<String>> {
        match self.try_update_answers(answers, excluded).await {
            Ok(removed) => Ok(removed),
            Err(e) => Err(self.fail("update_answers", e)),
        }
    }

    async fn try_update_answers(
        &mut self,
        answers: &[String],
        excluded: &[String],
    ) -> Result<Vec<String>> {
        let mut known = self.known_answers.clone();
        known.extend(answers.iter().chain(excluded.iter()).cloned());
        let active = active_answers(answers, excluded);
        let step = self.step.min(active.len());

        let mut work = self.document.clone();
        let removed = prune_sections(&mut work, &active, &known);
        self.enter(&mut work, &section_for(&active, step)).await?;

        self.known_answers = known;
        self.answers = active;
        self.document = work;
        self.step = step;
        tracing::info!(
            component = COMPONENT,
            operation = "update_answers",
            removed = ?removed,
            step,
            steps = self.steps(),
            "answers updated"
        );
        Ok(removed)
    }

    fn prune(&mut self) -> Vec<String> {
        prune_sections(&mut self.document, &self.answers, &self.known_answers)
    }

    /// Proposes rows for every detailed object of the current step.
    pub async fn auto_map(&mut self) -> Result<AutoMapSummary> {
        match self.try_auto_map().await {
            Ok(summary) => Ok(summary),
            Err(e) => Err(self.fail("auto_map", e)),
        }
    }

    async fn try_auto_map(&mut self) -> Result<AutoMapSummary> {
        let section = self.current_section();
        let defaults = match section {
            SectionKey::Recommended(_) => Some(self.catalog.default_record_types(&self.answers).await?),
            SectionKey::Additional => None,
        };
        let mut work = self.document.clone();
        let summary = AutoMapper::new(&self.catalog)
            .map_section(&mut work, &section, defaults.as_deref())
            .await?;
        self.document = work;
        if summary.batch.failed > 0 {
            self.notice_failed_objects(&section, &summary);
        }
        Ok(summary)
    }

    /// One notice for every object whose definition could not be fetched;
    /// the proposals for the remaining objects are already committed.
    fn notice_failed_objects(&mut self, section: &SectionKey, summary: &AutoMapSummary) {
        let reasons = summary
            .failures
            .iter()
            .map(|(key, reason)| format!("#{}: {}", key.index, reason))
            .collect::<Vec<_>>()
            .join("; ");
        let message = format!(
            "{} of {} objects in {} could not be auto-mapped: {}",
            summary.batch.failed, summary.batch.total, section, reasons
        );
        tracing::error!(component = AUTOMAPPER, operation = "auto_map", failed = summary.batch.failed, "{}", message);
        self.notices.push(Notice {
            component: AUTOMAPPER,
            operation: "auto_map",
            message,
        });
    }

    /// Runs a purely local edit against a copy of the document.
    pub fn edit<T>(&mut self, f: impl FnOnce(&mut MappingDocument) -> Result<T>) -> Result<T> {
        let mut work = self.document.clone();
        match f(&mut work) {
            Ok(value) => {
                self.document = work;
                Ok(value)
            }
            Err(e) => Err(self.fail("edit", e)),
        }
    }

    /// Validates a new destination field, offers it in the catalog and points
    /// field row `row` of `key` at it.
    pub async fn create_field(
        &mut self,
        key: &ObjectKey,
        row: usize,
        request: &NewFieldRequest,
    ) -> Result<NewFieldDescriptor> {
        match self.try_create_field(key, row, request).await {
            Ok(descriptor) => Ok(descriptor),
            Err(e) => Err(self.fail("create_field", e)),
        }
    }

    async fn try_create_field(
        &mut self,
        key: &ObjectKey,
        row: usize,
        request: &NewFieldRequest,
    ) -> Result<NewFieldDescriptor> {
        let destination = self.document.object(key)?.destination.clone();
        let def = self.catalog.get(SchemaSide::Destination, &destination).await?;
        let descriptor = NewMetadataBuilder::new(&def).build_field(request)?;

        let mut work = self.document.clone();
        work.attach_new_field(key, row, descriptor.clone())?;
        self.catalog
            .splice_field(&destination, pending_field_option(&descriptor))
            .await?;
        self.document = work;
        tracing::info!(component = COMPONENT, operation = "create_field", object = %destination, field = %descriptor.api_name, "new field pending");
        Ok(descriptor)
    }

    pub async fn create_record_type(
        &mut self,
        key: &ObjectKey,
        row: usize,
        request: &NewRecordTypeRequest,
    ) -> Result<NewRecordTypeDescriptor> {
        match self.try_create_record_type(key, row, request).await {
            Ok(descriptor) => Ok(descriptor),
            Err(e) => Err(self.fail("create_record_type", e)),
        }
    }

    async fn try_create_record_type(
        &mut self,
        key: &ObjectKey,
        row: usize,
        request: &NewRecordTypeRequest,
    ) -> Result<NewRecordTypeDescriptor> {
        let destination = self.document.object(key)?.destination.clone();
        let def = self.catalog.get(SchemaSide::Destination, &destination).await?;
        let descriptor = NewMetadataBuilder::new(&def).build_record_type(request)?;

        let mut work = self.document.clone();
        work.attach_new_record_type(key, row, descriptor.clone())?;
        self.catalog
            .splice_record_type(&destination, pending_record_type_option(&descriptor))
            .await?;
        self.document = work;
        Ok(descriptor)
    }

    /// Carries the source child relationship `child` of the object at `key`
    /// over as a lookup to the destination object.
    pub async fn add_child_relationship(&mut self, key: &ObjectKey, child: &str) -> Result<()> {
        match self.try_add_child_relationship(key, child).await {
            Ok(()) => Ok(()),
            Err(e) => Err(self.fail("add_child_relationship", e)),
        }
    }

    async fn try_add_child_relationship(&mut self, key: &ObjectKey, child: &str) -> Result<()> {
        let object = self.document.object(key)?;
        let (source, destination) = (object.source.clone(), object.destination.clone());
        let def = self
            .catalog
            .resolve(SchemaSide::Source, &source, child, |def| {
                def.child_relationship(child).is_some()
            })
            .await?;
        let Some(relationship) = def.child_relationship(child) else {
            return Err(MappingError::MissingFromCatalog {
                object: source,
                item: child.to_string(),
            });
        };
        let mapping = child_mapping(relationship, &destination);
        let mut work = self.document.clone();
        work.upsert_child_mapping(key, mapping)?;
        self.document = work;
        Ok(())
    }

    /// Points a field row at `destination`. A concrete destination must exist
    /// on the destination object, unless it is the row's own pending field.
    pub async fn set_field_destination(
        &mut self,
        key: &ObjectKey,
        row: usize,
        destination: Destination,
    ) -> Result<()> {
        match self.try_set_field_destination(key, row, destination).await {
            Ok(()) => Ok(()),
            Err(e) => Err(self.fail("set_field_destination", e)),
        }
    }

    async fn try_set_field_destination(
        &mut self,
        key: &ObjectKey,
        row: usize,
        destination: Destination,
    ) -> Result<()> {
        let object = self.document.object(key)?;
        let pending = object
            .field_mapping
            .get(row)
            .and_then(|r| r.new_meta.as_ref())
            .is_some_and(|meta| Some(meta.api_name.as_str()) == destination.api_name());
        if let (Some(api_name), false) = (destination.api_name(), pending) {
            let object_name = object.destination.clone();
            self.catalog
                .resolve_field(SchemaSide::Destination, &object_name, api_name)
                .await?;
        }
        let mut work = self.document.clone();
        work.set_field_destination(key, row, destination)?;
        self.document = work;
        Ok(())
    }

    /// Progress of one level of the object at `key`, measured against the
    /// source object's definition.
    pub async fn completeness(&self, key: &ObjectKey, level: MappingLevel) -> Result<Completeness> {
        if level == MappingLevel::Object {
            return self.document.section_completeness(&key.section);
        }
        let source = self.document.object(key)?.source.clone();
        let def = self.catalog.get(SchemaSide::Source, &source).await?;
        self.document.completeness(key, level, &def)
    }

    /// Writes the document as it stands.
    pub async fn save_partial(&mut self) -> Result<()> {
        match self.save(&self.document).await {
            Ok(()) => Ok(()),
            Err(e) => Err(self.fail("save_partial", e)),
        }
    }

    /// Resolves pending clones and writes the result. Sentinels without an
    /// answer stay in place and are reported.
    pub async fn save_final(&mut self) -> Result<CloneOutcome> {
        match self.finalize().await {
            Ok(outcome) => Ok(outcome),
            Err(e) => Err(self.fail("save_final", e)),
        }
    }

    async fn finalize(&mut self) -> Result<CloneOutcome> {
        let mut work = self.document.clone();
        let requests = work.clone_requests();
        let outcome = if requests.is_empty() {
            CloneOutcome::default()
        } else {
            let resolved = self.gateway.resolve_clones(&requests).await.map_err(|e| {
                MappingError::collaborator(GATEWAY, "resolve_clones", e)
            })?;
            work.apply_clones(&resolved)?
        };
        self.save(&work).await?;
        if !outcome.unresolved.is_empty() {
            tracing::warn!(component = COMPONENT, operation = "save_final", unresolved = ?outcome.unresolved, "clone requests left unresolved");
        }
        tracing::info!(component = COMPONENT, operation = "save_final", assessment = %self.assessment_id, clones = outcome.resolved, "final save written");
        self.document = work;
        Ok(outcome)
    }

    async fn save(&self, document: &MappingDocument) -> Result<()> {
        self.gateway
            .save(&self.assessment_id, document, document.is_empty())
            .await
            .map_err(|e| MappingError::collaborator(GATEWAY, "save", e))
    }
}
