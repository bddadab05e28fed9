//! CLI argument definitions.

use std::path::PathBuf;

use clap::{Args as ClapArgs, Parser, Subcommand};

/// procall - run programs and report their status and output
#[derive(Parser, Debug)]
#[command(name = "procall")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Trace every session state transition and output chunk
    #[arg(long, global = true)]
    pub debug: bool,

    /// Config file (defaults to $PROCALL_CONFIG or the user config dir)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a single program
    Run(RunArgs),

    /// Chain programs, feeding each one's stdout into the next one's stdin
    Pipe {
        /// Stages such as "ls -la" "grep txt"; split on whitespace, no shell syntax
        #[arg(required = true, num_args = 1..)]
        stages: Vec<String>,

        /// Print a JSON report instead of the final stdout
        #[arg(long)]
        json: bool,
    },

    /// Print the path a command name resolves to
    Which {
        /// Command name
        name: String,
    },
}

/// Options for `procall run`.
#[derive(ClapArgs, Debug)]
pub struct RunArgs {
    /// Program name or path
    pub program: String,

    /// Subcommand placed right after the program
    #[arg(long = "sub")]
    pub subcommand: Option<String>,

    /// Named flag without a value (repeatable): `--flag verbose` becomes --verbose
    #[arg(long = "flag", value_name = "KEY")]
    pub flags: Vec<String>,

    /// Named option (repeatable): `--opt max_count=3` becomes --max-count 3
    #[arg(long = "opt", value_name = "KEY=VALUE")]
    pub options: Vec<String>,

    /// File to feed to stdin, or - for our own stdin
    #[arg(long = "input", value_name = "FILE")]
    pub input: Option<String>,

    /// Redirect stdout to this file
    #[arg(long)]
    pub out: Option<PathBuf>,

    /// Redirect stderr to this file
    #[arg(long)]
    pub err: Option<PathBuf>,

    /// Signal the program after this many seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<f64>,

    /// Signal sent when the timeout elapses
    #[arg(long, default_value = "TERM")]
    pub timeout_signal: String,

    /// Print a JSON report instead of the program's output
    #[arg(long)]
    pub json: bool,

    /// Positional arguments passed to the program
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub args: Vec<String>,
}
