use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "stash",
    about = "Stash: entity, query, and singleton storage from the command line",
    version,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Config file (defaults to ./stash.toml when present)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Snapshot file, overriding the config
    #[arg(long, global = true)]
    pub data: Option<PathBuf>,

    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Command {
    /// Store a JSON object as an entity
    Put(PutArgs),
    /// Show one entity
    Get(KeyArgs),
    /// Remove one entity
    Delete(KeyArgs),
    /// Run a query and print every match
    Query(QueryArgs),
    /// Page through a query's matches
    Iterate(IterateArgs),
    /// Read, write, or delete named blobs
    Singleton(SingletonArgs),
}

#[derive(Args)]
pub struct KeyArgs {
    pub kind: String,
    pub name: String,
    /// Parent key as KIND:NAME
    #[arg(long)]
    pub parent: Option<String>,
}

#[derive(Args)]
pub struct PutArgs {
    pub kind: String,
    /// Key name; omit to let the backend assign an id
    #[arg(long)]
    pub name: Option<String>,
    /// Entity body as a JSON object
    pub json: String,
    /// Parent key as KIND:NAME
    #[arg(long)]
    pub parent: Option<String>,
}

#[derive(Args, Clone, Default)]
pub struct QueryArgs {
    pub kind: String,
    /// Filter as "FIELD [OP] VALUE", e.g. "I >= 6"
    #[arg(short, long)]
    pub filter: Vec<String>,
    /// Order field; prefix with '-' for descending
    #[arg(short, long, allow_hyphen_values = true)]
    pub order: Option<String>,
    #[arg(short = 'n', long)]
    pub limit: Option<usize>,
    #[arg(short, long)]
    pub project: Vec<String>,
    #[arg(long)]
    pub keys_only: bool,
    #[arg(long)]
    pub distinct: bool,
    /// Restrict to descendants of KIND:NAME
    #[arg(long)]
    pub ancestor: Option<String>,
}

#[derive(Args)]
pub struct IterateArgs {
    #[command(flatten)]
    pub query: QueryArgs,
    /// Values fetched per page (defaults to limits.page_size)
    #[arg(long)]
    pub page_size: Option<usize>,
}

#[derive(Args)]
pub struct SingletonArgs {
    #[command(subcommand)]
    pub action: SingletonAction,
    /// Entries expire this many seconds after writing
    #[arg(long, global = true)]
    pub ttl: Option<u64>,
    /// Spread payloads across shard entities
    #[arg(long, global = true)]
    pub sharded: bool,
}

#[derive(Subcommand)]
pub enum SingletonAction {
    /// Print a blob
    Read {
        name: String,
        /// Print as hex instead of text
        #[arg(long)]
        hex: bool,
    },
    /// Store a blob from an argument or a file
    Write {
        name: String,
        value: Option<String>,
        #[arg(long, conflicts_with = "value")]
        file: Option<PathBuf>,
    },
    /// Remove a blob
    Delete { name: String },
}
