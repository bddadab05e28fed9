//! CLI command execution.

use std::process::ExitCode;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::Serialize;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use procall::{Args, CallOptions, Command, Config, Output, ResultHandle, Shell, Sink, Status};

use super::args::{Cli, Commands, RunArgs};

/// Execute the parsed CLI and return the process exit code.
pub async fn execute(cli: Cli) -> Result<ExitCode> {
    let config = match cli.config {
        Some(ref path) => Config::from_path(path)?,
        None => Config::load()?,
    };
    let debug = cli.debug || config.debug;
    let shell = Shell::from_config(config).with_debug(debug);

    match cli.command {
        Commands::Run(args) => run(&shell, args).await,
        Commands::Pipe { stages, json } => pipe(&shell, &stages, json).await,
        Commands::Which { name } => Ok(which(&shell, &name)),
    }
}

/// JSON report printed with `--json`.
#[derive(Debug, Serialize)]
struct Report {
    command: String,
    exit_code: Option<i32>,
    signal: Option<String>,
    stdout: Option<String>,
    stderr: Option<String>,
}

impl Report {
    fn new(command: &Command, output: &Output) -> Self {
        Self {
            command: command.to_string(),
            exit_code: output.status.code(),
            signal: output.status.signal_number().map(|_| output.status.to_string()),
            stdout: output.stdout_string(),
            stderr: output.stderr_string(),
        }
    }
}

async fn run(shell: &Shell, run: RunArgs) -> Result<ExitCode> {
    let mut command = shell.command(&run.program)?;
    if let Some(ref sub) = run.subcommand {
        command = command.subcommand(sub);
    }

    let mut args = Args::new().args(run.args);
    for flag in run.flags {
        args = args.flag(flag);
    }
    for option in &run.options {
        let Some((key, value)) = option.split_once('=') else {
            bail!("--opt expects KEY=VALUE, got '{option}'");
        };
        args = args.named(key, value);
    }

    let mut options = CallOptions::new();
    if let Some(ref input) = run.input {
        options = options.stdin(read_input(input).await?);
    }
    if let Some(path) = run.out {
        options = options.stdout(Sink::path(path));
    }
    if let Some(path) = run.err {
        options = options.stderr(Sink::path(path));
    }
    if let Some(secs) = run.timeout {
        let after = Duration::try_from_secs_f64(secs).context("--timeout must be a non-negative number")?;
        options = options.timeout(after).timeout_signal(&run.timeout_signal)?;
    }

    let handle = command.call(args, options);
    let output = wait_forwarding_interrupt(handle)
        .await
        .with_context(|| format!("{command} failed"))?;

    emit(&command, &output, run.json).await
}

async fn pipe(shell: &Shell, stages: &[String], json: bool) -> Result<ExitCode> {
    let mut last: Option<(Command, ResultHandle)> = None;

    for stage in stages {
        let mut words = stage.split_whitespace();
        let Some(program) = words.next() else {
            bail!("empty pipe stage");
        };
        let command = shell.command(program)?;
        let args = Args::new().args(words);

        let handle = match last.take() {
            Some((_, upstream)) => command.pipe(upstream, args, CallOptions::default()),
            None => command.call(args, CallOptions::default()),
        };
        last = Some((command, handle));
    }

    let Some((command, handle)) = last else {
        bail!("no pipe stages given");
    };

    let output = wait_forwarding_interrupt(handle)
        .await
        .with_context(|| format!("{command} failed"))?;

    emit(&command, &output, json).await
}

fn which(shell: &Shell, name: &str) -> ExitCode {
    match shell.which(name) {
        Some(path) => {
            println!("{}", path.display());
            ExitCode::SUCCESS
        }
        None => {
            eprintln!("{name} not found");
            ExitCode::FAILURE
        }
    }
}

/// Wait for the handle, passing Ctrl-C on to the child as SIGINT.
async fn wait_forwarding_interrupt(mut handle: ResultHandle) -> procall::Result<Output> {
    loop {
        tokio::select! {
            result = &mut handle => return result,
            interrupted = tokio::signal::ctrl_c() => {
                if interrupted.is_err() {
                    return handle.await;
                }
                if let Err(e) = handle.signal("INT") {
                    tracing::debug!(error = %e, "could not forward interrupt");
                }
            }
        }
    }
}

async fn read_input(source: &str) -> Result<Vec<u8>> {
    if source == "-" {
        let mut buf = Vec::new();
        tokio::io::stdin()
            .read_to_end(&mut buf)
            .await
            .context("Failed to read stdin")?;
        return Ok(buf);
    }
    tokio::fs::read(source)
        .await
        .with_context(|| format!("Failed to read {source}"))
}

async fn emit(command: &Command, output: &Output, json: bool) -> Result<ExitCode> {
    if json {
        let report = serde_json::to_string_pretty(&Report::new(command, output))?;
        println!("{report}");
    } else {
        if let Some(ref stdout) = output.stdout {
            tokio::io::stdout().write_all(stdout).await?;
        }
        if let Some(ref stderr) = output.stderr {
            tokio::io::stderr().write_all(stderr).await?;
        }
        tokio::io::stdout().flush().await?;
    }

    Ok(exit_code(output.status))
}

/// Shell convention: the child's code, or 128 + signal number.
fn exit_code(status: Status) -> ExitCode {
    let code = match status {
        Status::Exited(code) => code,
        Status::Signaled(n) => 128 + n,
    };
    ExitCode::from(u8::try_from(code).unwrap_or(1))
}
