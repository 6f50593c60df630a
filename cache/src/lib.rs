mod action;
mod adapter;
mod config;
mod error;
mod item;
mod pool;
mod tag;
mod tag_map;

pub use action::Tags;
pub use adapter::{Adapter, Entry};
pub use config::{GcChance, PoolConfig};
pub use error::{AdapterError, BatchFailure, ConfigError};
pub use item::{CacheItem, Item, TaggableItem, Ttl};
pub use pool::{Pool, PoolBuilder};
pub use tag::{CfgDebug, Tag};
pub use tag_map::TagMap;
