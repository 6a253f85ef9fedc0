// src/lib.rs
//! Builds, refines and persists the mapping document that links a source
//! org's objects, record types, fields and child relationships to their
//! destination counterparts.

pub mod automap;
pub mod barrier;
pub mod catalog;
pub mod config;
pub mod describe;
pub mod document;
pub mod error;
pub mod gateway;
pub mod mapping;
pub mod metadata;
pub mod mongo;
pub mod report;
pub mod schema;
pub mod session;

pub use automap::{AutoMapSummary, AutoMapper};
pub use catalog::{SchemaCatalog, SchemaService};
pub use config::SessionConfig;
pub use document::{MappingDocument, MappingLevel, ObjectKey, RowTarget, SectionKey};
pub use error::{MappingError, Result};
pub use gateway::{FileGateway, PersistenceGateway};
pub use mapping::{Destination, FieldMapping, ObjectMapping, RecordTypeMapping};
pub use mongo::MongoGateway;
pub use session::{MappingSession, Notice, Transition};
