//! # thorns
//!
//! Utilities for spike-train analysis workflows.
//!
//! ## Modules
//!
//! - `map` - Parallel map that detects nested calls and runs them serially
//! - `config` - Layered configuration (defaults, TOML files, `THORNS_*` variables)
//! - `greenwood` - Greenwood cochlear place/frequency conversion
//! - `error` - Error types and codes
//! - `app` - Logging and startup helpers for the `thorns` binary
pub mod app;
pub mod config;
pub mod error;
pub mod greenwood;
pub mod map;

pub use config::MapConfig;
pub use error::{ErrorCode, ThornsError};
pub use map::{
    is_inside_map, map, map_async, try_map, try_map_async, Backend, MapOutput, MapPlan, Mapper,
};
