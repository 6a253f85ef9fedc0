// src/bin/orgmap/run.rs
use crate::cli::Cli;
use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use orgmap::describe::{load_schema, StaticSchemaService};
use orgmap::gateway::{CloneRequests, ResolvedClones};
use orgmap::report::{build_report, load_templates, render_report};
use orgmap::schema::{SchemaObjectDef, SchemaSide};
use orgmap::{
    FileGateway, MappingDocument, MappingSession, MongoGateway, PersistenceGateway, SchemaCatalog,
    SchemaService, SectionKey, SessionConfig, Transition,
};
use std::collections::HashSet;
use std::sync::Arc;

/// Reads through to the real store but never writes.
struct DryRunGateway(Arc<dyn PersistenceGateway>);

#[async_trait]
impl PersistenceGateway for DryRunGateway {
    async fn load(&self, assessment_id: &str) -> Result<Option<MappingDocument>> {
        self.0.load(assessment_id).await
    }

    async fn save(&self, assessment_id: &str, document: &MappingDocument, is_empty: bool) -> Result<()> {
        tracing::info!(
            operation = "save",
            assessment = assessment_id,
            sections = document.recommended.len(),
            is_empty,
            "dry run, document not written"
        );
        Ok(())
    }

    async fn resolve_clones(&self, requests: &CloneRequests) -> Result<ResolvedClones> {
        self.0.resolve_clones(requests).await
    }
}

pub async fn run(args: Cli) -> Result<()> {
    let config = SessionConfig::load(&args.config)?;
    let source = load_schema(&args.source_schema)?;
    let destination = load_schema(&args.destination_schema)?;

    let mut service = StaticSchemaService::new(source.clone(), destination);
    if let Some(size) = args.page_size {
        service = service.with_page_size(size);
    }
    let offsets = service.page_offsets();
    let service: Arc<dyn SchemaService> = Arc::new(service);
    let catalog = Arc::new(SchemaCatalog::new(service));
    let loaded = catalog.get_batch(&offsets).await?;
    tracing::info!(operation = "run", destination_objects = loaded.len(), pages = offsets.len(), "destination schema loaded");

    let gateway = open_gateway(&args, source).await?;
    let operation = args.operation.as_deref().unwrap_or("automap");
    match operation {
        "automap" => automap(&config, catalog, gateway, args.dry_run).await,
        "finalize" => finalize(&config, catalog, gateway).await,
        "report" => report(&config, &catalog, gateway, args.template_dir.as_deref()).await,
        "validate" => validate(&config, &catalog, gateway).await,
        _ => Err(anyhow!("Unsupported operation: {}", operation)),
    }
}

async fn open_gateway(args: &Cli, source: Vec<SchemaObjectDef>) -> Result<Arc<dyn PersistenceGateway>> {
    let inner: Arc<dyn PersistenceGateway> = match (&args.store_dir, &args.mongo_uri) {
        (Some(dir), _) => Arc::new(FileGateway::new(dir, source)),
        (None, Some(uri)) => {
            let db = args.db.as_deref().ok_or_else(|| anyhow!("--db is required with --mongo-uri"))?;
            let collection = args
                .collection
                .as_deref()
                .ok_or_else(|| anyhow!("--collection is required with --mongo-uri"))?;
            Arc::new(MongoGateway::connect(uri, db, collection).await?)
        }
        (None, None) => bail!("either --store-dir or --mongo-uri is required"),
    };
    if args.dry_run {
        Ok(Arc::new(DryRunGateway(inner)))
    } else {
        Ok(inner)
    }
}

/// Pairs template rows that have no source with the source object of the
/// same API name, when the source org has one.
async fn pair_by_name(session: &mut MappingSession, catalog: &SchemaCatalog) -> Result<usize> {
    let known: HashSet<String> = catalog
        .org_schema_names()
        .await?
        .iter()
        .flat_map(|category| category.objects.iter().cloned())
        .collect();
    let section = session.current_section();
    let paired = session.edit(|doc| {
        let mut paired = 0;
        for key in doc.object_keys(&section)? {
            let object = doc.object(&key)?;
            if object.source.is_empty() && known.contains(&object.destination) {
                let name = object.destination.clone();
                doc.set_object_source(&key, &name)?;
                paired += 1;
            }
        }
        Ok(paired)
    })?;
    Ok(paired)
}

async fn automap(
    config: &SessionConfig,
    catalog: Arc<SchemaCatalog>,
    gateway: Arc<dyn PersistenceGateway>,
    dry_run: bool,
) -> Result<()> {
    let mut session = MappingSession::start(config, catalog.clone(), gateway).await?;
    loop {
        let section = session.current_section();
        let paired = pair_by_name(&mut session, &catalog).await?;
        let summary = session.auto_map().await?;
        println!(
            "{}: {} objects ({} paired by name), {} rows proposed, {} failed",
            section,
            summary.batch.total,
            paired,
            summary.proposals.total(),
            summary.batch.failed
        );
        for (key, reason) in &summary.failures {
            eprintln!("  object {}: {}", key.index, reason);
        }

        match session.next().await? {
            Transition::AtSection(_) => continue,
            Transition::SectionsExhausted(outcome) => {
                println!("✅ Mapping saved ({} clone requests resolved).", outcome.resolved);
                for key in &outcome.unresolved {
                    eprintln!("❗️ Clone request {} could not be resolved", key);
                }
                break;
            }
            Transition::BackToQuestion => break,
        }
    }
    if dry_run {
        println!("{}", session.document().to_json_pretty()?);
    }
    Ok(())
}

async fn finalize(
    config: &SessionConfig,
    catalog: Arc<SchemaCatalog>,
    gateway: Arc<dyn PersistenceGateway>,
) -> Result<()> {
    let mut session = MappingSession::start(config, catalog, gateway).await?;
    let outcome = session.save_final().await?;
    println!("✅ Final save written ({} clone requests resolved).", outcome.resolved);
    for key in &outcome.unresolved {
        eprintln!("❗️ Clone request {} could not be resolved", key);
    }
    Ok(())
}

async fn report(
    config: &SessionConfig,
    catalog: &SchemaCatalog,
    gateway: Arc<dyn PersistenceGateway>,
    template_dir: Option<&str>,
) -> Result<()> {
    let document = gateway.load(&config.assessment_id).await?.unwrap_or_default();
    let sections = build_report(&document, catalog).await?;
    let env = load_templates(template_dir)?;
    println!("{}", render_report(&env, &config.assessment_id, &sections)?);
    Ok(())
}

/// Checks every concrete field destination of the stored document against
/// the destination schema.
async fn validate(
    config: &SessionConfig,
    catalog: &SchemaCatalog,
    gateway: Arc<dyn PersistenceGateway>,
) -> Result<()> {
    let Some(document) = gateway.load(&config.assessment_id).await? else {
        bail!("no mapping document stored for '{}'", config.assessment_id);
    };

    let mut sections: Vec<SectionKey> = document
        .section_names()
        .map(SectionKey::recommended)
        .collect();
    sections.push(SectionKey::Additional);

    let mut problems = 0;
    for section in &sections {
        for key in document.object_keys(section)? {
            let object = document.object(&key)?;
            for row in &object.field_mapping {
                let Some(api_name) = row.destination.api_name() else {
                    continue;
                };
                if row.new_meta.is_some() {
                    continue;
                }
                if let Err(e) = catalog
                    .resolve_field(SchemaSide::Destination, &object.destination, api_name)
                    .await
                {
                    eprintln!("{} / {}.{}: {}", section, object.source, row.source, e);
                    problems += 1;
                }
            }
        }
    }
    if problems > 0 {
        bail!("{} field destinations do not exist", problems);
    }
    println!("✅ Mapping document is consistent with the destination schema.");
    Ok(())
}
