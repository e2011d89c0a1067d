//! Build driver configuration
//!
//! Three layers, later ones winning:
//! 1. Built-in defaults (the MSAL target list)
//! 2. Repo config (`msal-build.toml`, optional)
//! 3. CLI flags

mod defaults;
mod effective;
mod merge;

pub use defaults::{builtin_config, builtin_targets, DEFAULT_CONFIG_PATH};
pub use effective::{BuildConfig, ConfigError, ConfigOrigin, ConfigSource, EffectiveConfig};
pub use merge::{deep_merge, merge_layers};
