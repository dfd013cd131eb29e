//! # agentlink-settings
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`AgentLinkSettings::default()`]
//! 2. **User file**: `~/.agentlink/settings.json` (deep-merged over defaults)
//! 3. **Environment variables**: `AGENTLINK_*` overrides (highest priority)
//!
//! Command-line flags of the server binary are applied on top of the result.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{deep_merge, load_settings, load_settings_from_path, settings_path};
pub use types::*;
