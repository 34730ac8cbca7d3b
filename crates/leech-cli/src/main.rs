// SPDX-License-Identifier: Apache-2.0
//! The `leech` command line.
//!
//! Thin argument-parsing shell around `leech-core`: every subcommand loads
//! the instance from the working directory and invokes the matching core
//! operation. Exits 0 on success and non-zero on error; diagnostics go to
//! stderr through the tracing subscriber.

#![deny(rust_2018_idioms)]
#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    clippy::cargo,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::dbg_macro
)]
// The CLI is expected to print to stdout/stderr.
#![allow(clippy::print_stdout, clippy::print_stderr)]

use std::io::Write;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use leech_core::{chain, csv, BlockId, Instance};
use tracing_subscriber::filter::LevelFilter;

#[derive(Parser, Debug)]
#[command(name = "leech", version, about = "Track and replicate tabular data changes")]
struct Cli {
    /// Working directory holding leech.json, snapshots and the chain.
    #[arg(long, global = true, default_value = ".leech")]
    workdir: PathBuf,

    /// Enable info messages.
    #[arg(long, global = true)]
    inform: bool,

    /// Enable verbose messages.
    #[arg(long, global = true)]
    verbose: bool,

    /// Enable debug messages.
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Compute and commit changes in the configured tables.
    Commit,
    /// Generate a patch containing everything since an ancestor block.
    Diff {
        /// Block id (or unique prefix) the consumer already holds.
        block: String,
        /// Write the patch here instead of stdout.
        #[arg(long)]
        file: Option<PathBuf>,
    },
    /// Generate a patch equivalent to a fresh dump of the current state.
    Rebase {
        /// Write the patch here instead of stdout.
        #[arg(long)]
        file: Option<PathBuf>,
    },
    /// Apply a received patch to the configured tables.
    Patch {
        /// Patch file to apply.
        #[arg(long)]
        file: PathBuf,
        /// Primary column carrying host identity.
        #[arg(long)]
        field: String,
        /// This host's own identity value.
        #[arg(long)]
        value: String,
    },
    /// Report the operations one record saw over a time window.
    History {
        /// Table to search.
        #[arg(long)]
        table: String,
        /// Primary fields of the record, as one CSV record.
        #[arg(long)]
        primary: String,
        /// Window start, seconds since the epoch.
        #[arg(long)]
        from: Option<f64>,
        /// Window end, seconds since the epoch; defaults to now.
        #[arg(long)]
        to: Option<f64>,
        /// Write the report here.
        #[arg(long)]
        file: PathBuf,
    },
    /// Prune blocks beyond the preferred chain length.
    Purge,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = if cli.debug {
        LevelFilter::TRACE
    } else if cli.verbose {
        LevelFilter::DEBUG
    } else if cli.inform {
        LevelFilter::INFO
    } else {
        LevelFilter::WARN
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let instance = Instance::load(&cli.workdir)
        .with_context(|| format!("failed to load instance from {}", cli.workdir.display()))?;
    tracing::debug!(
        workdir = %cli.workdir.display(),
        tables = instance.tables().len(),
        "instance loaded"
    );

    match cli.command {
        Command::Commit => {
            leech_core::commit(&instance).context("commit failed")?;
        }
        Command::Diff { block, file } => {
            let final_id = resolve_block_argument(&instance, &block)?;
            let patch = leech_core::diff(&instance, &final_id).context("diff failed")?;
            emit(file.as_deref(), &patch)?;
        }
        Command::Rebase { file } => {
            let patch = leech_core::rebase(&instance).context("rebase failed")?;
            emit(file.as_deref(), &patch)?;
        }
        Command::Patch { file, field, value } => {
            let bytes = std::fs::read(&file)
                .with_context(|| format!("failed to read patch file {}", file.display()))?;
            leech_core::apply(&instance, &field, &value, &bytes)
                .with_context(|| format!("failed to apply patch from {}", file.display()))?;
        }
        Command::History {
            table,
            primary,
            from,
            to,
            file,
        } => {
            let primary_fields = csv::parse_record(primary.as_bytes())
                .context("failed to parse --primary as a CSV record")?;
            let report = leech_core::history(
                &instance,
                &table,
                &primary_fields,
                from.unwrap_or(0.0),
                to.unwrap_or_else(wall_clock_seconds),
            )
            .context("history failed")?;
            std::fs::write(&file, report)
                .with_context(|| format!("failed to write {}", file.display()))?;
        }
        Command::Purge => {
            leech_core::purge(&instance).context("purge failed")?;
        }
    }
    Ok(())
}

fn resolve_block_argument(instance: &Instance, argument: &str) -> anyhow::Result<BlockId> {
    match chain::resolve_id_argument(instance.work_dir(), argument)? {
        Some(id) => Ok(id),
        None => bail!("no unique block matches '{argument}'"),
    }
}

fn emit(file: Option<&std::path::Path>, bytes: &[u8]) -> anyhow::Result<()> {
    match file {
        Some(path) => std::fs::write(path, bytes)
            .with_context(|| format!("failed to write {}", path.display())),
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(bytes)?;
            stdout.flush()?;
            Ok(())
        }
    }
}

fn wall_clock_seconds() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs() as f64)
        .unwrap_or(0.0)
}
