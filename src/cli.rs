// ABOUTME: Command-line argument definitions
// ABOUTME: Connections are given as a profile name from the config file or a connection string

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "mongo-cloner", version, about = "Clone MongoDB databases and browse their documents")]
pub struct Cli {
    /// TOML config file with connection profiles (defaults to $MONGO_CLONER_CONFIG)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// List the databases visible to a connection
    Databases {
        #[arg(long)]
        conn: String,
    },
    /// Mirror a database from source to target, replacing same-named target collections
    Clone(CloneArgs),
    /// List collections with document counts and sampled fields
    Collections {
        #[arg(long)]
        conn: String,
        #[arg(long)]
        database: String,
    },
    /// Page through documents of a collection
    Documents(DocumentsArgs),
    /// Fetch one document by id
    Get(DocumentTarget),
    /// Insert a JSON document
    Insert {
        #[command(flatten)]
        collection: CollectionTarget,
        /// Extended JSON document
        document: String,
    },
    /// Update one document by id
    Update {
        #[command(flatten)]
        target: DocumentTarget,
        /// Extended JSON fields or update operators
        update: String,
    },
    /// Delete one document by id
    Delete(DocumentTarget),
}

#[derive(Debug, Args)]
pub struct CloneArgs {
    #[arg(long)]
    pub source: String,
    #[arg(long)]
    pub target: String,
    #[arg(long)]
    pub database: String,
    /// Skip the confirmation prompt
    #[arg(short, long)]
    pub yes: bool,
}

#[derive(Debug, Args)]
pub struct CollectionTarget {
    #[arg(long)]
    pub conn: String,
    #[arg(long)]
    pub database: String,
    #[arg(long)]
    pub collection: String,
}

#[derive(Debug, Args)]
pub struct DocumentTarget {
    #[command(flatten)]
    pub collection: CollectionTarget,
    /// 24-character hex ObjectId
    pub id: String,
}

#[derive(Debug, Args)]
pub struct DocumentsArgs {
    #[command(flatten)]
    pub collection: CollectionTarget,
    #[arg(long)]
    pub page: Option<u64>,
    #[arg(long)]
    pub limit: Option<u64>,
    /// Extended JSON filter
    #[arg(long)]
    pub filter: Option<String>,
    /// Extended JSON sort specification
    #[arg(long)]
    pub sort: Option<String>,
}
