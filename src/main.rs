// ABOUTME: Command-line entry point for cloning and browsing MongoDB databases
// ABOUTME: Wires config, tracing and the library components together

mod cli;

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use dialoguer::Confirm;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use tracing::error;
use tracing_subscriber::EnvFilter;

use mongo_cloner::browser::{DocumentQuery, Payload};
use mongo_cloner::config::Config;
use mongo_cloner::store::{Connector, MongoConnector};
use mongo_cloner::{CloneEngine, CloneRequest, DocumentBrowser, JobStatus, JobTracker};

use crate::cli::{CloneArgs, Cli, CollectionTarget, Commands};

#[tokio::main]
async fn main() {
    init_tracing();

    if let Err(err) = run().await {
        error!(error = %err, "command failed");
        for cause in err.chain().skip(1) {
            error!(cause = %cause, "caused by");
        }
        std::process::exit(1);
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(value).context("Failed to render output")?
    );
    Ok(())
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;
    let connector: Arc<dyn Connector> = Arc::new(MongoConnector);
    let browser = DocumentBrowser::new(Arc::clone(&connector));

    match cli.command {
        Commands::Databases { conn } => {
            let conn = config.resolve(&conn)?;
            print_json(&browser.test_connection(&conn).await?)
        }
        Commands::Clone(args) => clone_database(&config, connector, args).await,
        Commands::Collections { conn, database } => {
            let conn = config.resolve(&conn)?;
            print_json(&browser.list_collections(&conn, &database).await?)
        }
        Commands::Documents(args) => {
            let CollectionTarget {
                conn,
                database,
                collection,
            } = args.collection;
            let conn = config.resolve(&conn)?;
            let query = DocumentQuery {
                page: args.page,
                limit: args.limit,
                filter: args.filter.map(Payload::Text),
                sort: args.sort.map(Payload::Text),
            };
            print_json(
                &browser
                    .list_documents(&conn, &database, &collection, query)
                    .await?,
            )
        }
        Commands::Get(target) => {
            let c = target.collection;
            let conn = config.resolve(&c.conn)?;
            print_json(
                &browser
                    .get_document(&conn, &c.database, &c.collection, &target.id)
                    .await?,
            )
        }
        Commands::Insert {
            collection: c,
            document,
        } => {
            let conn = config.resolve(&c.conn)?;
            print_json(
                &browser
                    .insert_document(&conn, &c.database, &c.collection, Payload::Text(document))
                    .await?,
            )
        }
        Commands::Update { target, update } => {
            let c = target.collection;
            let conn = config.resolve(&c.conn)?;
            browser
                .update_document(
                    &conn,
                    &c.database,
                    &c.collection,
                    &target.id,
                    Payload::Text(update),
                )
                .await?;
            print_json(&serde_json::json!({ "updated": target.id }))
        }
        Commands::Delete(target) => {
            let c = target.collection;
            let conn = config.resolve(&c.conn)?;
            browser
                .delete_document(&conn, &c.database, &c.collection, &target.id)
                .await?;
            print_json(&serde_json::json!({ "deleted": target.id }))
        }
    }
}

async fn clone_database(
    config: &Config,
    connector: Arc<dyn Connector>,
    args: CloneArgs,
) -> Result<()> {
    let request = CloneRequest::new(
        config.resolve(&args.source)?,
        config.resolve(&args.target)?,
        args.database,
    );

    if !args.yes {
        let prompt = format!(
            "Collections of '{}' on {} will be dropped and replaced. Continue?",
            request.database,
            request.target.redacted()
        );
        let confirmed = Confirm::new()
            .with_prompt(prompt)
            .default(false)
            .interact()
            .context("Failed to read confirmation")?;
        if !confirmed {
            bail!("Clone cancelled");
        }
    }

    let tracker = JobTracker::new();
    let engine = CloneEngine::new(connector).with_batch_size(config.cloning.batch_size);
    let started = engine.launch(&tracker, request)?;

    let bar = ProgressBar::new(100);
    bar.set_style(
        ProgressStyle::with_template("{spinner} [{bar:40}] {pos:>3}% {msg}")
            .context("Invalid progress template")?,
    );
    let job = tracker
        .wait_for_completion(&started.job_id, config.poll_interval(), |job| {
            bar.set_position(u64::from(job.progress));
            bar.set_message(format!("{}: {}", job.status, job.details));
            bar.tick();
        })
        .await?;
    bar.finish_and_clear();

    print_json(&job)?;
    if job.status == JobStatus::Failed {
        bail!("Clone job {} failed: {}", job.id, job.details);
    }
    Ok(())
}
