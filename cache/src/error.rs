#[derive(thiserror::Error, Debug)]
pub enum AdapterError {
    #[error("io :: {0}")]
    Io(#[from] std::io::Error),

    #[error("codec :: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("corrupt entry :: {0}")]
    Corrupt(String),
}

/// Keys of a batch operation that did not go through.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("{} key(s) failed :: {:?}", .failed.len(), .failed)]
pub struct BatchFailure {
    pub failed: Vec<String>,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("gc chance must be within 0..=100, got {0}")]
    GcChanceOutOfRange(u8),
}
