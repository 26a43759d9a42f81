use std::path::PathBuf;
use thiserror::Error;

/// Stable code attached to resolution failures, mirrored in bundler
/// diagnostics.
pub const MODULE_NOT_FOUND: &str = "MODULE_NOT_FOUND";

/// Errors surfaced by the resolver.
///
/// Filesystem and manifest failures are recovered internally; the only
/// failure a caller ever sees is a missing module.
#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("Cannot find module '{specifier}' from '{from}'")]
    ModuleNotFound { specifier: String, from: PathBuf },
}

impl ResolveError {
    /// Machine-readable code for this error.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::ModuleNotFound { .. } => MODULE_NOT_FOUND,
        }
    }
}
