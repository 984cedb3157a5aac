mod cli;
mod commands;
mod config;
mod critical;
mod engine;
mod lock;
mod markers;
mod paths;
mod state;
mod ui;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use cli::{Cli, Command};
use std::io;
use std::path::PathBuf;

/// Global context for the application
pub struct Context {
    pub verbose: u8,
    pub quiet: bool,
    pub root: Option<PathBuf>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Info by default: `run` reports its progress through the log
    let log_level = match cli.verbose {
        0 => log::LevelFilter::Info,
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    env_logger::Builder::new()
        .filter_level(if cli.quiet {
            log::LevelFilter::Error
        } else {
            log_level
        })
        .parse_default_env()
        .format_timestamp(None)
        .init();

    let ctx = Context {
        verbose: cli.verbose,
        quiet: cli.quiet,
        root: cli.root,
    };
    log::trace!("verbosity {}", ctx.verbose);

    match cli.command {
        Command::Run(args) => commands::run::run(&ctx, args),
        Command::Status(args) => commands::status::run(&ctx, args),
        Command::Queue(cmd) => commands::queue::run(&ctx, cmd),
        Command::Cancel { kind, id } => commands::queue::cancel(&ctx, kind, &id),
        Command::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "nuvu", &mut io::stdout());
            Ok(())
        }
    }
}
