//! Framework-specific middleware adapters.
//!
//! Each adapter is feature-gated and only compiled when the corresponding
//! feature flag is enabled in `Cargo.toml`.

#[cfg(feature = "axum-middleware")]
pub mod axum;
