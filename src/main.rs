use anyhow::Context;
use std::path::{Path, PathBuf};

use ragtier::cli::{Cli, Commands, ConfigAction};
use ragtier::config::Config;
use ragtier::embedding::Partition;
use ragtier::engine::Engine;
use ragtier::error::RagtierError;
use ragtier::retrieval::RetrievedPassage;

fn main() -> anyhow::Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse_args();

    // Initialize logging
    init_logging(cli.verbose);

    let result = run(cli);
    if let Err(err) = &result {
        if let Some(RagtierError::ConfigValidation { errors }) = err.downcast_ref::<RagtierError>() {
            eprintln!("✗ Configuration is invalid:");
            for e in errors {
                eprintln!("  - {}: {}", e.path, e.message);
            }
        }
    }
    result
}

fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Ingest { path, faq } => cmd_ingest(cli.config.as_deref(), path, faq),
        Commands::Ask { query, json } => cmd_ask(cli.config.as_deref(), &query, json),
        Commands::Search { query, json } => cmd_search(cli.config.as_deref(), &query, json),
        Commands::Remove { name } => cmd_remove(cli.config.as_deref(), &name),
        Commands::Reset { yes } => cmd_reset(cli.config.as_deref(), yes),
        Commands::Stats { json } => cmd_stats(cli.config.as_deref(), json),
        Commands::Config { action } => cmd_config(cli.config, action),
    }
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = if verbose {
        EnvFilter::new("ragtier=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("ragtier=info"))
    };

    fmt().with_env_filter(filter).with_target(false).init();
}

fn open_engine(config_path: Option<&Path>) -> anyhow::Result<Engine> {
    let config = Config::load_or_default(config_path)?;
    let engine = Engine::new(config).context("Failed to start engine")?;
    Ok(engine)
}

fn cmd_ingest(config_path: Option<&Path>, path: Option<PathBuf>, faq: bool) -> anyhow::Result<()> {
    let engine = open_engine(config_path)?;

    let report = match path {
        Some(dir) => {
            let partition = if faq {
                Partition::Faq
            } else {
                Partition::General
            };
            engine.ingest_dir(&dir, partition)?
        }
        None => engine.ingest_configured()?,
    };

    println!("✓ Ingestion complete");
    println!("  Ingested:  {}", report.ingested);
    println!("  Unchanged: {}", report.skipped_unchanged);
    println!("  Failed:    {}", report.failed);
    println!("  Pruned:    {}", report.pruned);
    Ok(())
}

fn cmd_ask(config_path: Option<&Path>, query: &str, json: bool) -> anyhow::Result<()> {
    let engine = open_engine(config_path)?;
    let decision = engine.classify(query)?;

    if json {
        let value = serde_json::json!({
            "tier": decision.tier,
            "context_type": decision.context_type_label,
            "temperature": decision.temperature,
            "best_faq_similarity": decision.best_faq_similarity,
            "faq_matches": decision.faq_matches.iter().map(RetrievedPassage::from).collect::<Vec<_>>(),
            "doc_matches": decision.doc_matches.iter().map(RetrievedPassage::from).collect::<Vec<_>>(),
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    println!("Context:     {}", decision.context_type_label);
    println!("Temperature: {:.1}", decision.temperature);
    match decision.best_faq_similarity {
        Some(s) => println!("Best FAQ:    {:.3}", s),
        None => println!("Best FAQ:    -"),
    }

    if decision.is_empty() {
        println!("\nNo passages found. Run 'ragtier ingest' first.");
        return Ok(());
    }

    println!();
    for (i, m) in decision.faq_matches.iter().enumerate() {
        print_passage(i + 1, "faq", &RetrievedPassage::from(m));
    }
    let offset = decision.faq_matches.len();
    for (i, m) in decision.doc_matches.iter().enumerate() {
        print_passage(offset + i + 1, "doc", &RetrievedPassage::from(m));
    }
    Ok(())
}

fn cmd_search(config_path: Option<&Path>, query: &str, json: bool) -> anyhow::Result<()> {
    let engine = open_engine(config_path)?;
    let results = engine.search_documents(query)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&results)?);
        return Ok(());
    }

    if results.is_empty() {
        println!("No documents above the similarity threshold.");
        return Ok(());
    }

    for (i, passage) in results.iter().enumerate() {
        print_passage(i + 1, "doc", passage);
    }
    Ok(())
}

fn print_passage(rank: usize, kind: &str, passage: &RetrievedPassage) {
    println!(
        "{}. [{}] {} ({:.3})",
        rank, kind, passage.source_name, passage.similarity
    );
    println!("   {}", passage.preview(160).replace('\n', " "));
}

fn cmd_remove(config_path: Option<&Path>, name: &str) -> anyhow::Result<()> {
    let engine = open_engine(config_path)?;
    if engine.remove(name)? {
        println!("✓ Removed {}", name);
    } else {
        println!("No document named {}", name);
    }
    Ok(())
}

fn cmd_reset(config_path: Option<&Path>, yes: bool) -> anyhow::Result<()> {
    if !yes {
        println!("This deletes every indexed document. Re-run with --yes to confirm.");
        return Ok(());
    }

    let engine = open_engine(config_path)?;
    let removed = engine.reset()?;
    println!("✓ Removed {} documents", removed);
    Ok(())
}

fn cmd_stats(config_path: Option<&Path>, json: bool) -> anyhow::Result<()> {
    let engine = open_engine(config_path)?;
    let stats = engine.stats();

    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    println!("Documents: {}", stats.document_count);
    println!("  FAQ:     {}", stats.faq_count);
    println!("  General: {}", stats.general_count);
    println!("Model:     {} ({}D)", stats.embedding_model, stats.embedding_dimension);
    Ok(())
}

fn cmd_config(config_path: Option<PathBuf>, action: ConfigAction) -> anyhow::Result<()> {
    match action {
        ConfigAction::Show { section } => {
            let config = Config::load_or_default(config_path.as_deref())?;
            let value = toml::Value::try_from(&config)?;

            match section {
                Some(section) => {
                    let table = value
                        .get(&section)
                        .with_context(|| format!("Unknown config section: {}", section))?;
                    println!("[{}]", section);
                    println!("{}", toml::to_string_pretty(table)?);
                }
                None => println!("{}", toml::to_string_pretty(&value)?),
            }
        }
        ConfigAction::Validate { file } => {
            let path = match file.or(config_path) {
                Some(path) => path,
                None => Config::default_path()?,
            };
            let config = Config::load(&path)?;
            println!("✓ Configuration is valid");
            println!("  Schema version: {}", config.meta.schema_version);
        }
        ConfigAction::Init { force } => {
            let path = match config_path {
                Some(path) => path,
                None => Config::default_path()?,
            };

            if path.exists() && !force {
                println!("Configuration file already exists at: {}", path.display());
                println!("Use --force to overwrite");
                return Ok(());
            }

            Config::default().save(&path)?;
            println!("✓ Configuration initialized at: {}", path.display());
        }
        ConfigAction::Path => {
            let path = match config_path {
                Some(path) => path,
                None => Config::default_path()?,
            };
            println!("{}", path.display());
        }
    }

    Ok(())
}
