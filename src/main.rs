//! Airwave - an always-on AI radio station.
//!
//! One binary, two jobs: the `station` subcommand runs the live scheduler
//! and player; the `pipeline` subcommand batch-produces the DJ speech
//! (scripts, audits, synthesized audio) the station plays between songs.

pub mod catalog;
pub mod cli;
pub mod config;
pub mod content;
pub mod error;
pub mod gatekeeper;
pub mod metadata;
pub mod model;
pub mod persist;
pub mod pipeline;
pub mod player;
pub mod rotation;
pub mod schedule;
pub mod station;
#[cfg(test)]
pub mod test_utils;

use clap::Parser;

fn main() -> std::process::ExitCode {
    // Bad arguments exit 1 per the CLI contract (clap's default is 2).
    let cli = match cli::Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            let code = if e.use_stderr() { 1 } else { 0 };
            return std::process::ExitCode::from(code);
        }
    };

    std::process::ExitCode::from(cli::run(cli))
}
