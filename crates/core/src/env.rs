//! Environment variable constants used throughout the application.
//!
//! Centralized definition of all `HOOKGATE_*` environment variables to ensure
//! consistency and avoid hardcoded strings.

/// Rule file path override (CLI arg default env)
pub const HOOKGATE_CONFIG: &str = "HOOKGATE_CONFIG";

/// Config directory override (e.g. `~/.config/hookgate`)
pub const HOOKGATE_CONFIG_DIR: &str = "HOOKGATE_CONFIG_DIR";

/// Legacy exit-code mode toggle (CLI arg default env)
pub const HOOKGATE_EXIT_CODE_MODE: &str = "HOOKGATE_EXIT_CODE_MODE";
