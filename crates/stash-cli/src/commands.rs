use std::fs;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context as _};
use colored::Colorize;
use serde_json::Value;
use stash_provider::{BackendProvider, BatchIterator, FileBackend, Fetched, Provider};
use stash_singleton::{DatastoreSingletonStore, SingletonStore, TtlStore};
use stash_types::{Context, Key, Query, StoreError};
use tracing::debug;

use crate::cli::*;
use crate::config::CliConfig;

type FileProvider = BackendProvider<FileBackend>;

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    let mut config = CliConfig::resolve(cli.config.as_deref())?;
    if let Some(data) = cli.data {
        config.data_path = data;
    }
    let session = Session::open(config)?;
    let ctx = Context::background();
    match cli.command {
        Command::Put(args) => cmd_put(&session, &ctx, args),
        Command::Get(args) => cmd_get(&session, &ctx, args),
        Command::Delete(args) => cmd_delete(&session, &ctx, args),
        Command::Query(args) => cmd_query(&session, &ctx, args, cli.verbose),
        Command::Iterate(args) => cmd_iterate(&session, &ctx, args, cli.verbose),
        Command::Singleton(args) => cmd_singleton(&session, &ctx, args),
    }
}

/// An opened snapshot plus the settings commands run with.
pub struct Session {
    config: CliConfig,
    provider: Arc<FileProvider>,
}

impl Session {
    pub fn open(config: CliConfig) -> anyhow::Result<Self> {
        let backend = FileBackend::open(&config.data_path)
            .with_context(|| format!("opening {}", config.data_path.display()))?;
        debug!(path = %config.data_path.display(), entities = backend.len(), "session opened");
        Ok(Self {
            config,
            provider: Arc::new(BackendProvider::new(backend)),
        })
    }

    pub fn config(&self) -> &CliConfig {
        &self.config
    }

    /// Store `body` (a JSON object) under a named or backend-assigned key.
    pub fn put(
        &self,
        ctx: &Context,
        kind: &str,
        name: Option<&str>,
        parent: Option<&Key>,
        body: &str,
    ) -> anyhow::Result<Key> {
        let value: Value = serde_json::from_str(body).context("entity body is not JSON")?;
        if !value.is_object() {
            bail!("entity body must be a JSON object");
        }
        let key = match name {
            Some(name) => self.provider.new_name_key(kind, name, parent),
            None => self.provider.new_incomplete_key(kind, parent),
        };
        Ok(self.provider.put(ctx, &key, &value)?)
    }

    pub fn get(&self, ctx: &Context, key: &Key) -> anyhow::Result<Fetched<Value>> {
        Ok(self.provider.get(ctx, key)?)
    }

    pub fn delete(&self, ctx: &Context, key: &Key) -> anyhow::Result<()> {
        Ok(self.provider.delete(ctx, key)?)
    }

    /// Run `query`; keys-only queries yield empty objects.
    pub fn query(&self, ctx: &Context, query: &Query) -> anyhow::Result<Fetched<Vec<(Key, Value)>>> {
        if query.is_keys_only() {
            let keys = self.provider.get_all_keys(ctx, query)?;
            let rows = keys
                .into_iter()
                .map(|k| (k, Value::Object(Default::default())))
                .collect();
            return Ok(Fetched::new(rows));
        }
        Ok(self.provider.get_all(ctx, query)?)
    }

    /// Page through `query`, calling `visit` for each entity in order.
    pub fn iterate(
        &self,
        ctx: &Context,
        query: &Query,
        page_size: Option<usize>,
        mut visit: impl FnMut(&Key, &Value),
    ) -> anyhow::Result<usize> {
        let page_size = page_size.unwrap_or(self.config.limits.page_size);
        if page_size == 0 {
            bail!("page size must be positive");
        }
        let mut it = BatchIterator::<_, Value>::new(ctx, &*self.provider, query).with_page_size(page_size);
        let mut seen = 0;
        while it.advance(ctx) {
            if let Some((key, value)) = it.current() {
                visit(key, value);
                seen += 1;
            }
        }
        if let Some(err) = it.err() {
            return Err(anyhow!(err.clone()));
        }
        Ok(seen)
    }

    /// Build the singleton store for one command. Flags add to the config:
    /// `ttl` overrides `default_ttl_secs`; `sharded` can only switch sharding on.
    pub fn singleton_store(&self, ttl: Option<u64>, sharded: bool) -> Box<dyn SingletonStore> {
        let store = DatastoreSingletonStore::with_limits(Arc::clone(&self.provider), self.config.limits)
            .err_if_not_found(self.config.err_if_not_found);
        let store = if sharded || self.config.sharded {
            store.with_sharding()
        } else {
            store
        };
        match ttl.or(self.config.default_ttl_secs) {
            Some(secs) => Box::new(TtlStore::new(store, Duration::from_secs(secs))),
            None => Box::new(store),
        }
    }

    /// Read through `store` under the configured not-found policy. TTL
    /// stores report every miss as `NotFound`; unless `err_if_not_found` is
    /// set that becomes `None` here, as it does for plain stores.
    pub fn read_singleton(
        &self,
        ctx: &Context,
        store: &dyn SingletonStore,
        name: &str,
    ) -> anyhow::Result<Option<Vec<u8>>> {
        match store.read_singleton(ctx, name) {
            Err(e) if e.is_not_found() && !self.config.err_if_not_found => Ok(None),
            other => Ok(other?),
        }
    }
}

/// Parse `KIND:NAME` into a root key.
pub fn parse_key_ref(raw: &str) -> anyhow::Result<Key> {
    match raw.split_once(':') {
        Some((kind, name)) if !kind.is_empty() && !name.is_empty() => Ok(Key::named(kind, name, None)),
        _ => bail!("expected KIND:NAME, got {raw:?}"),
    }
}

/// JSON if it parses, otherwise a plain string.
pub fn parse_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

/// Split `"FIELD [OP] VALUE"` at its last space.
pub fn parse_filter(raw: &str) -> anyhow::Result<(String, Value)> {
    let raw = raw.trim();
    match raw.rsplit_once(char::is_whitespace) {
        Some((expr, value)) if !expr.trim().is_empty() => Ok((expr.trim().to_string(), parse_value(value))),
        _ => bail!("filter {raw:?} needs a field and a value"),
    }
}

pub fn build_query(args: &QueryArgs) -> anyhow::Result<Query> {
    let mut query = Query::new(&args.kind);
    if let Some(ancestor) = &args.ancestor {
        query = query.ancestor(&parse_key_ref(ancestor)?);
    }
    for raw in &args.filter {
        let (expr, value) = parse_filter(raw)?;
        query = query.filter(expr, value);
    }
    if !args.project.is_empty() {
        query = query.project(args.project.iter().cloned());
    }
    if let Some(order) = &args.order {
        query = query.order(order.clone());
    }
    if let Some(limit) = args.limit {
        query = query.limit(limit);
    }
    if args.keys_only {
        query = query.keys_only();
    }
    if args.distinct {
        query = query.distinct();
    }
    Ok(query)
}

fn entity_key(kind: &str, name: &str, parent: Option<&String>) -> anyhow::Result<Key> {
    let parent = parent.map(|p| parse_key_ref(p)).transpose()?;
    Ok(Key::named(kind, name, parent.as_ref()))
}

fn print_warning(warning: Option<&StoreError>) {
    if let Some(w) = warning {
        eprintln!("{} {}", "warning:".yellow().bold(), w);
    }
}

fn cmd_put(session: &Session, ctx: &Context, args: PutArgs) -> anyhow::Result<()> {
    let parent = args.parent.as_deref().map(parse_key_ref).transpose()?;
    let key = session.put(ctx, &args.kind, args.name.as_deref(), parent.as_ref(), &args.json)?;
    println!("{} Stored {}", "✓".green().bold(), key.to_string().yellow());
    Ok(())
}

fn cmd_get(session: &Session, ctx: &Context, args: KeyArgs) -> anyhow::Result<()> {
    let key = entity_key(&args.kind, &args.name, args.parent.as_ref())?;
    let fetched = session.get(ctx, &key)?;
    print_warning(fetched.warning());
    println!("{}", key.to_string().yellow().bold());
    println!("{}", serde_json::to_string_pretty(fetched.value())?);
    Ok(())
}

fn cmd_delete(session: &Session, ctx: &Context, args: KeyArgs) -> anyhow::Result<()> {
    let key = entity_key(&args.kind, &args.name, args.parent.as_ref())?;
    session.delete(ctx, &key)?;
    println!("Deleted {}", key.to_string().yellow());
    Ok(())
}

fn cmd_query(session: &Session, ctx: &Context, args: QueryArgs, verbose: bool) -> anyhow::Result<()> {
    let query = build_query(&args)?;
    if verbose {
        println!("{}", query.to_string().dimmed());
    }
    let fetched = session.query(ctx, &query)?;
    print_warning(fetched.warning());
    let rows = fetched.into_value();
    for (key, value) in &rows {
        if query.is_keys_only() {
            println!("{}", key.to_string().yellow());
        } else {
            println!("{}  {}", key.to_string().yellow(), value);
        }
    }
    println!("{}", format!("{} result(s)", rows.len()).dimmed());
    Ok(())
}

fn cmd_iterate(session: &Session, ctx: &Context, args: IterateArgs, verbose: bool) -> anyhow::Result<()> {
    let query = build_query(&args.query)?;
    if verbose {
        println!("{}", query.to_string().dimmed());
    }
    let seen = session.iterate(ctx, &query, args.page_size, |key, value| {
        println!("{}  {}", key.to_string().yellow(), value);
    })?;
    println!("{}", format!("{seen} result(s)").dimmed());
    Ok(())
}

fn cmd_singleton(session: &Session, ctx: &Context, args: SingletonArgs) -> anyhow::Result<()> {
    let store = session.singleton_store(args.ttl, args.sharded);
    match args.action {
        SingletonAction::Read { name, hex } => match session.read_singleton(ctx, &*store, &name)? {
            Some(bytes) if hex => println!("{}", hex::encode(&bytes)),
            Some(bytes) => println!("{}", String::from_utf8_lossy(&bytes)),
            None => println!("{} {}", "No singleton named".dimmed(), name.yellow()),
        },
        SingletonAction::Write { name, value, file } => {
            let data = match (value, file) {
                (Some(value), _) => value.into_bytes(),
                (None, Some(path)) => {
                    fs::read(&path).with_context(|| format!("reading {}", path.display()))?
                }
                (None, None) => bail!("give a value or --file"),
            };
            store.write_singleton(ctx, &name, &data)?;
            println!("{} Wrote {} ({} bytes)", "✓".green().bold(), name.yellow(), data.len());
        }
        SingletonAction::Delete { name } => {
            store.delete_singleton(ctx, &name)?;
            println!("Deleted singleton {}", name.yellow());
        }
    }
    Ok(())
}
