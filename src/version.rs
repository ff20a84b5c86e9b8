// Build-time version from Cargo.toml

/// Package version (from Cargo.toml).
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Package name (from Cargo.toml).
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// `name version`, as printed by `esm-filter version` and logged at startup.
pub fn version_line() -> String {
    format!("{NAME} {VERSION}")
}
