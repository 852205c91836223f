//! Command-line interface for airwave.
//!
//! Two operational entry points share one binary: `station` (the always-on
//! runtime) and `pipeline` (the content build batch), plus `scan` and
//! `status` for library management and inspection.

mod commands;

pub use commands::{Cli, Commands, run};
