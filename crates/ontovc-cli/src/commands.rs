use std::sync::Arc;

use anyhow::Context;
use colored::Colorize;
use serde_json::json;

use ontovc_events::RecordingSink;
use ontovc_merge::{ConflictPolicy, ResolutionStrategy};
use ontovc_service::{BranchService, ServiceConfig};
use ontovc_store::{BackingStore, InMemoryBackingStore};
use ontovc_types::{validate_branch_name, MergeStrategy, ObjectTypeDef, PropertyDef, SchemaResource};

use crate::cli::*;

pub async fn run_command(cli: Cli) -> anyhow::Result<()> {
    let config = load_config(&cli)?;
    match cli.command {
        Command::ValidateName(args) => cmd_validate_name(&config, args, cli.format),
        Command::Config(args) => cmd_config(&config, args),
        Command::Demo(args) => cmd_demo(config, args, cli.format).await,
    }
}

fn load_config(cli: &Cli) -> anyhow::Result<ServiceConfig> {
    match &cli.config {
        Some(path) => ServiceConfig::load(path).with_context(|| format!("loading {}", path.display())),
        None => Ok(ServiceConfig::default()),
    }
}

fn cmd_validate_name(config: &ServiceConfig, args: ValidateNameArgs, format: OutputFormat) -> anyhow::Result<()> {
    let rules = config.protection_rules()?;
    let mut invalid = 0;
    let mut report = Vec::new();

    for name in &args.names {
        let verdict = validate_branch_name(name);
        let protected = rules.is_protected(name);
        if verdict.is_err() {
            invalid += 1;
        }
        match format {
            OutputFormat::Json => report.push(json!({
                "name": name,
                "valid": verdict.is_ok(),
                "protected": protected,
                "error": verdict.as_ref().err().map(|e| e.to_string()),
            })),
            OutputFormat::Text => match &verdict {
                Ok(()) if protected => println!("{} {} {}", "✓".green(), name.yellow(), "(protected)".dimmed()),
                Ok(()) => println!("{} {}", "✓".green(), name.yellow()),
                Err(e) => println!("{} {:?}: {}", "✗".red(), name, e),
            },
        }
    }

    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    }
    if invalid > 0 {
        anyhow::bail!("{invalid} invalid branch name(s)");
    }
    Ok(())
}

fn cmd_config(config: &ServiceConfig, args: ConfigArgs) -> anyhow::Result<()> {
    match args.action {
        ConfigAction::Show => print!("{}", config.to_toml_string()?),
        ConfigAction::Check => {
            config.validate()?;
            println!("{} Configuration is valid.", "✓".green().bold());
        }
    }
    Ok(())
}

fn product(properties: &[(&str, &str)]) -> SchemaResource {
    let mut def = ObjectTypeDef::new("Product").with_description("Sellable item");
    for (name, data_type) in properties {
        def = def.with_property(PropertyDef::new(*name, *data_type));
    }
    SchemaResource::ObjectType(def)
}

async fn cmd_demo(mut config: ServiceConfig, args: DemoArgs, format: OutputFormat) -> anyhow::Result<()> {
    let strategy: MergeStrategy = args.strategy.parse().map_err(anyhow::Error::msg)?;
    if let Some(resolve) = &args.resolve {
        let strategy: ResolutionStrategy = resolve.parse().map_err(anyhow::Error::msg)?;
        config.conflict_policy = ConflictPolicy::uniform(strategy);
    }
    config.locks.dir = None;

    let db = config.database.clone();
    let store = Arc::new(InMemoryBackingStore::new());
    let sink = Arc::new(RecordingSink::new());
    let service = BranchService::from_config(config, store.clone(), sink.clone()).await?;
    service.initialize().await?;

    let text = format == OutputFormat::Text;
    let edit = |resource: SchemaResource, branch: &'static str| {
        let store = store.clone();
        let db = db.clone();
        async move {
            let doc = resource.to_document()?;
            store.insert_document(&doc, &db, branch, "edit schema", "demo").await?;
            anyhow::Ok(())
        }
    };

    edit(product(&[("sku", "string")]), "main").await?;
    service
        .create_branch("feature/price", None, Some("Add pricing".into()), "alice")
        .await?;
    if text {
        println!("{} Created branch {}", "✓".green().bold(), "feature/price".yellow());
    }

    edit(product(&[("sku", "string"), ("price", "decimal")]), "feature/price").await?;
    if args.conflict {
        edit(product(&[("sku", "string"), ("price", "string")]), "main").await?;
    }

    let diff = service.get_branch_diff("feature/price", "main").await?;
    if text {
        println!("Diff {} → {}:", "feature/price".yellow(), "main".yellow());
        for key in &diff.added {
            println!("  {} {}", "+".green(), key);
        }
        for key in &diff.modified {
            println!("  {} {}", "~".cyan(), key);
        }
        for key in &diff.deleted {
            println!("  {} {}", "-".red(), key);
        }
        println!("  conflicts: {}", diff.conflicts.len());
    }

    let proposal = service
        .create_proposal("Add price", None, "feature/price", "main", "alice")
        .await?;
    service.submit_proposal(&proposal.id, "alice").await?;
    service.approve_proposal(&proposal.id, "bob").await?;
    let result = service.merge_proposal(&proposal.id, strategy, "bob").await?;
    service.shutdown().await;

    match format {
        OutputFormat::Json => {
            let out = json!({
                "diff": diff,
                "result": result,
                "events": sink.event_types(),
            });
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
        OutputFormat::Text => {
            if result.success {
                let hash = result.merge_commit_hash.map(|h| h.short_hex()).unwrap_or_default();
                println!(
                    "{} Merged proposal {} ({}) at {}",
                    "✓".green().bold(),
                    proposal.id.short_id().cyan(),
                    result.strategy_used,
                    hash.yellow()
                );
                if result.resolved_conflicts > 0 {
                    println!("  auto-resolved conflicts: {}", result.resolved_conflicts);
                }
            } else {
                println!("{} Merge blocked by {} conflict(s):", "✗".red().bold(), result.conflicts.len());
                for conflict in &result.conflicts {
                    println!(
                        "  {} {} at {}",
                        conflict.conflict_type.to_string().red(),
                        conflict.resource,
                        conflict.path
                    );
                }
            }
            println!("Events: {}", sink.event_types().join(", ").dimmed());
        }
    }
    Ok(())
}
