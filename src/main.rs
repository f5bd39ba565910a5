//! Offerflow main entry point
//!
//! Command-line interface for the job-offer aggregation engine: searching,
//! managing company watches and custom sources, probing URLs, and running
//! the periodic jobs a scheduler would normally trigger.

use anyhow::Context;
use clap::{Parser, Subcommand};
use offerflow::config::load_config;
use offerflow::custom::CustomSourceService;
use offerflow::engine::{SearchEngine, SearchParams};
use offerflow::probe::AccessibilityProbe;
use offerflow::source::{build_http_client, SourceRegistry};
use offerflow::storage::SqliteStorage;
use offerflow::watch::{WatchOptions, WatchService};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing_subscriber::EnvFilter;

/// Offerflow: job-offer aggregation with caching and mutualized watches
#[derive(Parser, Debug)]
#[command(name = "offerflow")]
#[command(version = "1.0.0")]
#[command(about = "Aggregate job offers from many sources", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(short, long, value_name = "CONFIG", default_value = "offerflow.toml")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Search offers across the configured sources
    Search {
        /// Search keywords
        keywords: String,

        #[arg(short, long)]
        location: Option<String>,

        /// Contract type filter (fulltime, contract, internship, ...)
        #[arg(short, long)]
        job_type: Option<String>,

        /// Work mode filter (remote, hybrid, onsite)
        #[arg(short, long)]
        work_mode: Option<String>,

        /// Company name substring filter
        #[arg(long)]
        company: Option<String>,

        /// Acting user id
        #[arg(short, long, default_value = "local")]
        user: String,
    },

    /// Manage company watches
    Watch {
        #[command(subcommand)]
        command: WatchCommands,
    },

    /// Manage custom sources
    Custom {
        #[command(subcommand)]
        command: CustomCommands,
    },

    /// Probe a URL for scrapability (nothing is persisted)
    Probe {
        url: String,
    },

    /// Drain the background scrape queue (scheduler entry point)
    Batch,

    /// Delete expired cache entries (scheduler entry point)
    Sweep,

    /// List the configured source catalog
    Sources,
}

#[derive(Subcommand, Debug)]
enum WatchCommands {
    /// Start watching a company
    Add {
        company: String,

        #[arg(short, long, default_value = "local")]
        user: String,

        /// Minimum compatibility score for alerts
        #[arg(short, long, default_value = "70")]
        threshold: i64,
    },

    /// Stop watching
    Remove {
        watch_id: i64,

        #[arg(short, long, default_value = "local")]
        user: String,
    },

    /// List your watches
    List {
        #[arg(short, long, default_value = "local")]
        user: String,
    },

    /// Scrape all due watched companies (scheduler entry point)
    Scrape,
}

#[derive(Subcommand, Debug)]
enum CustomCommands {
    /// Probe and register a custom source URL
    Add {
        name: String,
        url: String,

        #[arg(short, long, default_value = "local")]
        user: String,
    },

    /// List your custom sources
    List {
        #[arg(short, long, default_value = "local")]
        user: String,

        #[arg(short, long)]
        active_only: bool,
    },

    /// Delete a custom source
    Remove {
        source_id: i64,

        #[arg(short, long, default_value = "local")]
        user: String,
    },
}

/// The services every subcommand hangs off
struct Services {
    config: Arc<offerflow::Config>,
    engine: SearchEngine,
    watch: WatchService,
    custom: CustomSourceService,
    probe: AccessibilityProbe,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let config = load_config(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;

    let services = build_services(config)?;

    match cli.command {
        Commands::Search {
            keywords,
            location,
            job_type,
            work_mode,
            company,
            user,
        } => {
            let params = SearchParams {
                keywords,
                location,
                job_type,
                work_mode,
                company,
                profile_text: None,
            };
            handle_search(&services, &params, &user).await?;
        }
        Commands::Watch { command } => handle_watch(&services, command).await?,
        Commands::Custom { command } => handle_custom(&services, command).await?,
        Commands::Probe { url } => handle_probe(&services, &url).await,
        Commands::Batch => {
            let outcome = services.engine.run_background_batch().await?;
            println!(
                "Batch: {} jobs, {} offers found, {} saved, {} errors",
                outcome.jobs_processed,
                outcome.offers_found,
                outcome.offers_saved,
                outcome.errors.len()
            );
            for error in &outcome.errors {
                println!("  ! {}", error);
            }
        }
        Commands::Sweep => {
            let removed = services.engine.cache().sweep()?;
            println!("Removed {} expired cache entries", removed);
        }
        Commands::Sources => handle_sources(&services),
    }

    Ok(())
}

/// Sets up the tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("offerflow=info,warn"),
            1 => EnvFilter::new("offerflow=debug,info"),
            2 => EnvFilter::new("offerflow=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

fn build_services(config: offerflow::Config) -> anyhow::Result<Services> {
    let config = Arc::new(config);

    let client = build_http_client(&config.client, config.engine.source_timeout_secs)?;
    let registry = Arc::new(SourceRegistry::from_config(&config, client.clone())?);
    let storage = Arc::new(Mutex::new(SqliteStorage::new(Path::new(
        &config.storage.database_path,
    ))?));

    let engine = SearchEngine::new(config.clone(), registry.clone(), storage.clone());
    let watch = WatchService::new(config.clone(), registry.clone(), storage.clone());
    let custom = CustomSourceService::new(storage, AccessibilityProbe::new(client.clone()));
    let probe = AccessibilityProbe::new(client);

    Ok(Services {
        config,
        engine,
        watch,
        custom,
        probe,
    })
}

async fn handle_search(
    services: &Services,
    params: &SearchParams,
    user: &str,
) -> anyhow::Result<()> {
    let outcome = services.engine.search(params, user).await?;

    if let Some(message) = &outcome.message {
        println!("{}", message);
        return Ok(());
    }

    let origin = if outcome.cached { "cache" } else { "live scrape" };
    println!(
        "{} offers from {} ({} scraped, {} after dedup, {} newly saved) in {}s",
        outcome.offers.len(),
        origin,
        outcome.scraped_count,
        outcome.deduplicated_count,
        outcome.saved_count,
        outcome.duration_seconds
    );

    for report in &outcome.source_reports {
        println!("  [{}] {:?}", report.source_id, report.outcome);
    }

    for offer in &outcome.offers {
        println!(
            "- {} @ {} ({})",
            offer.job_title,
            offer.company_name.as_deref().unwrap_or("unknown"),
            offer.source_url
        );
    }

    Ok(())
}

async fn handle_watch(services: &Services, command: WatchCommands) -> anyhow::Result<()> {
    match command {
        WatchCommands::Add {
            company,
            user,
            threshold,
        } => {
            let outcome = services.watch.add_watch(
                &user,
                &company,
                WatchOptions {
                    alert_threshold: threshold,
                    profile_id: None,
                },
            )?;
            if outcome.already_watching {
                println!(
                    "Already watching {} (watch {}, {} watchers)",
                    company, outcome.watch_id, outcome.watcher_count
                );
            } else {
                println!(
                    "Watching {} (watch {}, slug '{}', {} watchers)",
                    company, outcome.watch_id, outcome.slug, outcome.watcher_count
                );
            }
        }
        WatchCommands::Remove { watch_id, user } => {
            let outcome = services.watch.remove_watch(&user, watch_id)?;
            println!("{}", outcome.message);
        }
        WatchCommands::List { user } => {
            let watches = services.watch.list_watches(&user)?;
            if watches.is_empty() {
                println!("No watches");
            }
            for (watch, entity) in watches {
                println!(
                    "[{}] {} - {} watchers, {} offers found, last scraped {}",
                    watch.id,
                    entity.canonical_name,
                    entity.watcher_count,
                    entity.total_offers_found,
                    entity.last_scraped_at.as_deref().unwrap_or("never")
                );
            }
        }
        WatchCommands::Scrape => {
            let outcome = services.watch.scrape_due().await?;
            println!(
                "Scraped {} entities: {} offers found, {} saved, {} errors",
                outcome.entities_scraped,
                outcome.offers_found,
                outcome.offers_saved,
                outcome.errors.len()
            );
            for error in &outcome.errors {
                println!("  ! {}: {}", error.entity, error.reason);
            }
        }
    }
    Ok(())
}

async fn handle_custom(services: &Services, command: CustomCommands) -> anyhow::Result<()> {
    match command {
        CustomCommands::Add { name, url, user } => {
            let created = services.custom.add(&user, &name, &url).await?;
            println!(
                "Added '{}' ({}) - active: {}",
                created.record.name, created.record.source_type, created.record.is_active
            );
            println!("  {}", created.analysis.recommendation);
        }
        CustomCommands::List { user, active_only } => {
            let sources = services.custom.list(&user, active_only)?;
            if sources.is_empty() {
                println!("No custom sources");
            }
            for source in sources {
                println!(
                    "[{}] {} - {} ({}, active: {})",
                    source.id, source.name, source.url, source.source_type, source.is_active
                );
            }
        }
        CustomCommands::Remove { source_id, user } => {
            if services.custom.delete(&user, source_id)? {
                println!("Custom source {} removed", source_id);
            } else {
                println!("Custom source {} not found", source_id);
            }
        }
    }
    Ok(())
}

async fn handle_probe(services: &Services, url: &str) {
    let analysis = services.probe.probe(url).await;

    println!("URL: {}", url);
    println!("  accessible:   {}", analysis.is_accessible);
    println!("  content type: {}", analysis.content_type.as_str());
    println!(
        "  job keywords: {}",
        if analysis.job_keywords_found.is_empty() {
            "none".to_string()
        } else {
            analysis.job_keywords_found.join(", ")
        }
    );
    if let Some(count) = analysis.estimated_job_count {
        println!("  est. listings: {}", count);
    }
    println!(
        "  anti-bot:     {}",
        if analysis.anti_bot_markers.is_empty() {
            "none".to_string()
        } else {
            analysis.anti_bot_markers.join(", ")
        }
    );
    println!("  scrapable:    {}", analysis.is_scrapable);
    println!("  {}", analysis.recommendation);
}

fn handle_sources(services: &Services) {
    println!("Configured sources ({}):", services.config.sources.len());

    let mut specs: Vec<_> = services.config.sources.iter().collect();
    specs.sort_by(|a, b| a.priority.cmp(&b.priority).then(a.id.cmp(&b.id)));

    for spec in specs {
        println!(
            "  {} - {} ({:?}, priority {}, default {})",
            spec.id,
            spec.display_name,
            spec.kind,
            spec.priority,
            if spec.enabled_by_default { "on" } else { "off" }
        );
    }
}
