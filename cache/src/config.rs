use std::time::Duration;

use rand::{Rng, RngCore};

use crate::ConfigError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    /// Isolates this pool's tag index from other pools sharing the adapter.
    pub namespace: String,

    /// Applied to items saved with [`Ttl::Default`](crate::Ttl::Default).
    /// `None` stores them without expiry.
    pub default_ttl: Option<Duration>,

    pub gc_chance: GcChance,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            namespace: String::new(),
            default_ttl: None,
            gc_chance: GcChance::default(),
        }
    }
}

/// Percentage (0..=100) of tag invalidations that also sweep the deleted keys
/// out of every other tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct GcChance(u8);

impl GcChance {
    pub const NEVER: Self = Self(0);
    pub const ALWAYS: Self = Self(100);

    pub fn percent(self) -> u8 {
        self.0
    }

    pub(crate) fn roll(self, rng: &mut dyn RngCore) -> bool {
        match self.0 {
            0 => false,
            100 => true,
            percent => rng.random_ratio(u32::from(percent), 100),
        }
    }
}

impl Default for GcChance {
    fn default() -> Self {
        Self(1)
    }
}

impl TryFrom<u8> for GcChance {
    type Error = ConfigError;

    fn try_from(percent: u8) -> Result<Self, Self::Error> {
        match percent {
            0..=100 => Ok(Self(percent)),
            _ => Err(ConfigError::GcChanceOutOfRange(percent)),
        }
    }
}
