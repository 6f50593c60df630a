use std::{path::PathBuf, time::Duration};

use anyhow::{Context, bail, ensure};
use cache::{GcChance, Pool, PoolConfig, TaggableItem};
use clap::{Parser, Subcommand};
use filecache::FileCache;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
struct Args {
    /// The directory holding the cache entries. Created if missing.
    /// Example: `/tmp/cache`
    #[arg(long, env = "CACHE_DIR")]
    dir: PathBuf,

    /// Isolates the tag index from other pools sharing the same directory.
    #[arg(long, env = "CACHE_NAMESPACE", default_value = "")]
    namespace: String,

    /// Expiry in seconds for items saved without an explicit ttl.
    /// Items never expire by default.
    #[arg(long, env = "CACHE_DEFAULT_TTL")]
    default_ttl: Option<u64>,

    /// Percentage of tag invalidations that also sweep the deleted keys
    /// out of every other tag.
    #[arg(long, env = "CACHE_GC_CHANCE", default_value_t = 1, value_parser = clap::value_parser!(u8).range(0..=100))]
    gc_chance: u8,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Store a value, optionally tagged.
    Set {
        key: String,
        value: String,

        /// Tag to attach. Repeat for several tags.
        #[arg(long = "tag")]
        tags: Vec<String>,

        /// Expiry in seconds, overriding the default ttl.
        #[arg(long, conflicts_with = "no_expiry")]
        ttl: Option<u64>,

        /// Store without expiry, regardless of the default ttl.
        #[arg(long)]
        no_expiry: bool,
    },

    /// Print a stored value.
    Get { key: String },

    /// Print the tags a key is indexed under.
    Tags { key: String },

    /// Delete one or more keys.
    Delete {
        #[arg(required = true)]
        keys: Vec<String>,
    },

    /// Delete every value carrying any of the given tags.
    Invalidate {
        #[arg(required = true)]
        tags: Vec<String>,
    },

    /// Delete everything, tag index included.
    Clear,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let adapter = FileCache::open(&args.dir)
        .with_context(|| format!("cannot open cache dir `{}`", args.dir.display()))?;
    let config = PoolConfig {
        namespace: args.namespace,
        default_ttl: args.default_ttl.map(Duration::from_secs),
        gc_chance: GcChance::try_from(args.gc_chance).context("gc-chance")?,
    };
    tracing::debug!(?config);

    let mut pool = Pool::new(adapter, config);

    match args.cmd {
        Command::Set {
            key,
            value,
            tags,
            ttl,
            no_expiry,
        } => {
            let mut item = TaggableItem::new(key.as_str())
                .with_payload(value)
                .with_tags(tags);
            match (ttl, no_expiry) {
                (_, true) => item.never_expires(),
                (secs, false) => item.expires_after(secs.map(Duration::from_secs)),
            };

            ensure!(pool.save(item), "failed to save `{}`", key);
        }
        Command::Get { key } => {
            let item = pool.get_item(&key);
            if !item.is_hit() {
                bail!("`{}` not found", key);
            }
            println!("{}", String::from_utf8_lossy(item.payload()));
        }
        Command::Tags { key } => {
            for tag in pool.get_taggable_item(&key).previous_tags() {
                println!("{}", tag);
            }
        }
        Command::Delete { keys } => {
            ensure!(pool.delete_items(keys.as_slice()), "failed to delete {:?}", keys);
        }
        Command::Invalidate { tags } => {
            ensure!(pool.invalidate_tags(&tags), "failed to invalidate {:?}", tags);
        }
        Command::Clear => {
            ensure!(pool.clear(), "failed to clear `{}`", pool.adapter().dir().display());
        }
    }

    Ok(())
}
