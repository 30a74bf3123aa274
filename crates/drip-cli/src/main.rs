use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use drip_adapters::all_adapters;
use drip_storage::{
    FirestoreStore, HttpClientConfig, HttpFetcher, MirrorStore, Notifier, NtfyNotifier,
};
use drip_sync::{
    maintenance, rebuild_mirror, simulate, ItemRef, Monitor, MonitorConfig, RunOptions,
    TriedLedger,
};

#[derive(Debug, Parser)]
#[command(name = "drip")]
#[command(about = "Coffee drop monitor: scrape roasters, reconcile stores, push alerts")]
struct Cli {
    /// Override the main remote collection name.
    #[arg(long, global = true)]
    collection: Option<String>,

    /// Override the tried-ledger collection name.
    #[arg(long, global = true)]
    tried_collection: Option<String>,

    /// Override the local mirror database path.
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// One full monitoring pass over every configured roaster (the default).
    Run,
    /// Compose and deliver a fabricated drop notification; touches nothing.
    Simulate {
        #[arg(long, default_value_t = 3)]
        count: usize,
        /// Roaster names for the fake items, comma separated.
        #[arg(long, visible_alias = "sources", value_delimiter = ',')]
        roasters: Vec<String>,
    },
    /// Rebuild the local mirror from the remote store.
    Sync,
    /// Record a coffee as tried, by id or URL.
    MarkTried {
        #[command(flatten)]
        item: ItemSelector,
        #[arg(long)]
        notes: Option<String>,
        /// 1-5
        #[arg(long)]
        rating: Option<i64>,
    },
    /// Remove a coffee from the tried ledger, history included.
    UnmarkTried {
        #[command(flatten)]
        item: ItemSelector,
    },
    /// Show the tried ledger, most recent first.
    ListTried {
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Delete EVERY document in the main remote collection.
    Clear {
        #[arg(long)]
        force: bool,
    },
    /// Delete the local mirror database files.
    ClearDb {
        #[arg(long)]
        force: bool,
    },
    /// Delete EVERY document in the tried ledger.
    ClearTried {
        #[arg(long)]
        force: bool,
    },
}

#[derive(Debug, Args)]
struct ItemSelector {
    /// Product id (16 hex characters).
    #[arg(long, conflicts_with = "url", required_unless_present = "url")]
    id: Option<String>,
    /// Product URL.
    #[arg(long)]
    url: Option<String>,
}

impl ItemSelector {
    fn item_ref(&self) -> ItemRef {
        match (&self.id, &self.url) {
            (Some(id), _) => ItemRef::Id(id.clone()),
            (_, Some(url)) => ItemRef::Url(url.clone()),
            _ => unreachable!("clap requires exactly one selector"),
        }
    }
}

fn load_config(cli: &Cli) -> Result<MonitorConfig> {
    let mut config = MonitorConfig::from_env()?;
    if let Some(collection) = &cli.collection {
        config.collection = collection.clone();
    }
    if let Some(tried) = &cli.tried_collection {
        config.tried_collection = tried.clone();
    }
    if let Some(db) = &cli.db {
        config.db_path = db.clone();
    }
    Ok(config)
}

fn remote_for(config: &MonitorConfig) -> Result<FirestoreStore> {
    Ok(FirestoreStore::new(
        &config.project_id,
        config.emulator_host.as_deref(),
        config.bearer_token.clone(),
    )?)
}

fn confirm(prompt: &str, force: bool) -> Result<bool> {
    if force {
        return Ok(true);
    }
    print!("{prompt} Type 'yes' to continue: ");
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().read_line(&mut line)?;
    Ok(line.trim().eq_ignore_ascii_case("yes"))
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command.as_ref().unwrap_or(&Commands::Run) {
        Commands::Run => {
            let config = load_config(&cli)?;
            let fetcher = HttpFetcher::new(HttpClientConfig::default())?;
            let remote = remote_for(&config)?;
            let mirror = MirrorStore::open(&config.db_path).await?;
            let notifier = NtfyNotifier::new(config.ntfy.clone());
            let monitor = Monitor {
                fetcher: &fetcher,
                remote: &remote,
                mirror: &mirror,
                notifier: &notifier,
                options: RunOptions {
                    collection: config.collection.clone(),
                    politeness_delay: config.politeness_delay,
                },
            };
            let summary = monitor.run_once(&all_adapters()).await?;
            println!("run complete: {summary}");
        }
        Commands::Simulate { count, roasters } => {
            let roasters = if roasters.is_empty() {
                all_adapters().iter().map(|a| a.name().to_string()).collect()
            } else {
                roasters.clone()
            };
            match simulate(*count, &roasters) {
                Some(message) => {
                    println!("{}", message.title);
                    for line in &message.body_lines {
                        println!("{line}");
                    }
                    let notifier = NtfyNotifier::new(MonitorConfig::ntfy_from_env());
                    notifier.deliver(&message).await;
                }
                None => println!("nothing to simulate with --count 0"),
            }
        }
        Commands::Sync => {
            let config = load_config(&cli)?;
            let remote = remote_for(&config)?;
            let mirror = MirrorStore::open(&config.db_path).await?;
            let report = rebuild_mirror(
                &remote,
                &mirror,
                &config.collection,
                &config.tried_collection,
            )
            .await?;
            println!(
                "sync complete: {} inserted, {} updated, {} marked stale, {} tried flags set",
                report.inserted, report.updated, report.stale_local, report.tried_flagged
            );
        }
        Commands::MarkTried { item, notes, rating } => {
            let config = load_config(&cli)?;
            let remote = remote_for(&config)?;
            let mirror = MirrorStore::open(&config.db_path).await?;
            let ledger = TriedLedger {
                remote: &remote,
                mirror: Some(&mirror),
                collection: config.collection.clone(),
                tried_collection: config.tried_collection.clone(),
            };
            let id = ledger.mark(&item.item_ref(), notes.clone(), *rating).await?;
            println!("marked tried: {id}");
        }
        Commands::UnmarkTried { item } => {
            let config = load_config(&cli)?;
            let remote = remote_for(&config)?;
            let mirror = MirrorStore::open(&config.db_path).await?;
            let ledger = TriedLedger {
                remote: &remote,
                mirror: Some(&mirror),
                collection: config.collection.clone(),
                tried_collection: config.tried_collection.clone(),
            };
            let id = ledger.unmark(&item.item_ref()).await?;
            println!("unmarked: {id}");
        }
        Commands::ListTried { limit } => {
            let config = load_config(&cli)?;
            let remote = remote_for(&config)?;
            let ledger = TriedLedger {
                remote: &remote,
                mirror: None,
                collection: config.collection.clone(),
                tried_collection: config.tried_collection.clone(),
            };
            let records = ledger.list(*limit).await?;
            if records.is_empty() {
                println!("no tried coffees recorded");
            }
            for record in records {
                let rating = record
                    .last_rating
                    .map(|r| format!(" [{r}/5]"))
                    .unwrap_or_default();
                println!(
                    "{}  {}  {} — {}{} ({} times)",
                    record.last_tried_on,
                    record.doc_id,
                    record.roaster,
                    record.title,
                    rating,
                    record.history.len().max(1)
                );
                println!("    {}", record.url);
                if let Some(notes) = &record.last_notes {
                    println!("    {notes}");
                }
            }
        }
        Commands::Clear { force } => {
            let config = load_config(&cli)?;
            if config.collection == config.tried_collection {
                eprintln!(
                    "refusing: main and tried collections are both '{}'",
                    config.collection
                );
                return Ok(());
            }
            if !confirm(
                &format!("This deletes EVERY document in '{}'.", config.collection),
                *force,
            )? {
                println!("aborted");
                return Ok(());
            }
            let remote = remote_for(&config)?;
            let deleted =
                maintenance::clear_remote_collection(&remote, &config.collection).await?;
            let removed = maintenance::clear_mirror(&config.db_path);
            println!(
                "deleted {deleted} documents from {}, removed {removed} database files",
                config.collection
            );
        }
        Commands::ClearDb { force } => {
            let config = load_config(&cli)?;
            if !confirm(
                &format!("This deletes the local database at {}.", config.db_path.display()),
                *force,
            )? {
                println!("aborted");
                return Ok(());
            }
            let removed = maintenance::clear_mirror(&config.db_path);
            println!("removed {removed} database files");
        }
        Commands::ClearTried { force } => {
            let config = load_config(&cli)?;
            if !confirm(
                &format!("This deletes EVERY document in '{}'.", config.tried_collection),
                *force,
            )? {
                println!("aborted");
                return Ok(());
            }
            let remote = remote_for(&config)?;
            let deleted =
                maintenance::clear_remote_collection(&remote, &config.tried_collection).await?;
            println!(
                "deleted {deleted} documents from {}",
                config.tried_collection
            );
        }
    }

    Ok(())
}
