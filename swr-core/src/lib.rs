//! SWR Core - Shared Types
//!
//! Errors, timing metadata, clocks, random sources and configuration used by
//! every other crate in the workspace. This crate contains no caching logic.

pub mod clock;
pub mod config;
pub mod error;
pub mod metadata;
pub mod random;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{DecoratorConfig, PoolConfig, SwrConfig};
pub use error::{
    CacheError, ComputeError, ConfigError, StorageError, SwrError, SwrResult,
};
pub use metadata::{CacheMetadata, Timestamp, add_duration, sub_duration, timestamp_secs};
pub use random::{FixedRandom, RandomSource, SeededRandom, ThreadRandom};
