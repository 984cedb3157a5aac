use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

use crate::markers::MarkerKind;

#[derive(Parser)]
#[command(name = "nuvu")]
#[command(author = "Nuvu Contributors")]
#[command(version)]
#[command(about = "Reconcile pending Python package installs and uninstalls", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Host application root (defaults to NUVU_HOST_ROOT, then the current directory)
    #[arg(long, global = true, value_name = "DIR")]
    pub root: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run one reconciliation pass
    Run(RunArgs),

    /// Show pending markers, retry records and critical packages
    Status(StatusArgs),

    /// Queue an operation for the next pass
    #[command(subcommand)]
    Queue(QueueCommand),

    /// Remove a pending marker
    Cancel {
        /// Marker kind
        #[arg(value_enum)]
        kind: MarkerKind,

        /// Marker id
        id: String,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

// ============================================================================
// Run
// ============================================================================

#[derive(Args)]
pub struct RunArgs {
    /// Python interpreter to manage (defaults to NUVU_PYTHON, then the embedded one)
    #[arg(long, value_name = "PATH")]
    pub python: Option<PathBuf>,

    /// Requirements file to verify (overrides config)
    #[arg(long, value_name = "FILE")]
    pub requirements: Option<PathBuf>,

    /// Do not enforce critical packages
    #[arg(long)]
    pub skip_critical: bool,

    /// Do not verify the requirements file
    #[arg(long)]
    pub skip_requirements: bool,

    /// Never use uv; run everything through pip
    #[arg(long)]
    pub no_fast: bool,
}

// ============================================================================
// Status
// ============================================================================

#[derive(Args)]
pub struct StatusArgs {
    /// Python interpreter to inspect
    #[arg(long, value_name = "PATH")]
    pub python: Option<PathBuf>,

    /// Print machine-readable JSON
    #[arg(long)]
    pub json: bool,
}

// ============================================================================
// Queue
// ============================================================================

#[derive(Subcommand)]
pub enum QueueCommand {
    /// Queue an install specifier, e.g. `torch==2.5.1 --index-url URL`
    Install {
        /// Marker id (replaces an existing marker with the same id)
        id: String,

        /// Specifier tokens, flags included
        #[arg(required = true, num_args = 1.., allow_hyphen_values = true, trailing_var_arg = true)]
        spec: Vec<String>,
    },

    /// Queue package names for removal
    Uninstall {
        /// Marker id (replaces an existing marker with the same id)
        id: String,

        /// Package names
        #[arg(required = true, num_args = 1..)]
        names: Vec<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_queue_install_keeps_flags() {
        let cli = Cli::parse_from([
            "nuvu",
            "queue",
            "install",
            "torch",
            "torch==2.5.1",
            "--index-url",
            "https://download.pytorch.org/whl/cu124",
        ]);
        match cli.command {
            Command::Queue(QueueCommand::Install { id, spec }) => {
                assert_eq!(id, "torch");
                assert_eq!(spec.len(), 3);
                assert_eq!(spec[1], "--index-url");
            }
            _ => panic!("expected queue install"),
        }
    }

    #[test]
    fn test_global_root_after_subcommand() {
        let cli = Cli::parse_from(["nuvu", "run", "--root", "/opt/host", "--no-fast", "-vv"]);
        assert_eq!(cli.root, Some(PathBuf::from("/opt/host")));
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Command::Run(args) => assert!(args.no_fast),
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn test_cancel_parses_kind() {
        let cli = Cli::parse_from(["nuvu", "cancel", "uninstall", "triton"]);
        match cli.command {
            Command::Cancel { kind, id } => {
                assert_eq!(kind, MarkerKind::Uninstall);
                assert_eq!(id, "triton");
            }
            _ => panic!("expected cancel"),
        }
    }
}
