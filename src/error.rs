//! Application-wide error types.
//!
//! Modules define their own error enums via `thiserror`; this aggregate
//! exists for code paths that cross subsystems (station assembly, CLI
//! plumbing). The CLI itself uses `anyhow` for final reporting.

use crate::catalog::CatalogError;
use crate::config::ConfigError;
use crate::content::ContentStoreError;
use crate::gatekeeper::GateError;
use crate::pipeline::PipelineFatal;
use crate::player::PlaybackError;
use crate::rotation::RotationError;

/// Application-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level application error.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Rotation(#[from] RotationError),

    #[error(transparent)]
    ContentStore(#[from] ContentStoreError),

    #[error(transparent)]
    Gate(#[from] GateError),

    #[error(transparent)]
    Pipeline(#[from] PipelineFatal),

    #[error(transparent)]
    Playback(#[from] PlaybackError),
}
