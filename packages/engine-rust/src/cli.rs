//! Command-line adapter: one subcommand per registered operation.
//!
//! Each operation subcommand reads its JSON input from, in priority order,
//! `--input <PATH>`, an inline positional argument, or `--stdin`, falling
//! back to `{}`. The result is written as indented JSON. The extra `spec`
//! subcommand prints the exported schema of the whole registry.

use std::fs;
use std::io::{Read, Write};
use std::path::PathBuf;

use anyhow::{bail, Context as _};
use chrono::{DateTime, Utc};
use clap::{Arg, ArgAction, ArgMatches, Command};
use opkit_core::{ExecutionContext, Value};
use tracing::warn;

use crate::dispatch::{render_help, Descriptor, DispatchOptions, Registry};
use crate::logging::LogFormat;

/// Name of the schema-printing subcommand.
pub const SPEC_COMMAND: &str = "spec";

// ---------------------------------------------------------------------------
// Global options
// ---------------------------------------------------------------------------

/// Options shared by every subcommand, settable by flag or environment.
#[derive(Debug, Clone, Default, clap::Args)]
pub struct CliOptions {
    /// Pin the execution time (RFC 3339) for reproducible output.
    #[arg(long, global = true, env = "OPKIT_FIXED_TIME", value_parser = parse_time)]
    pub fixed_time: Option<DateTime<Utc>>,

    /// Validate operation inputs against their schema.
    #[arg(long, global = true, env = "OPKIT_VALIDATE_INPUT")]
    pub validate_input: bool,

    /// Validate operation outputs against their schema.
    #[arg(long, global = true, env = "OPKIT_VALIDATE_OUTPUT")]
    pub validate_output: bool,

    /// Log output format.
    #[arg(long, global = true, env = "OPKIT_LOG_FORMAT", value_enum, default_value_t = LogFormat::Pretty)]
    pub log_format: LogFormat,
}

impl CliOptions {
    /// Overlays these options on `options`. Flags only ever switch features on.
    #[must_use]
    pub fn apply(&self, mut options: DispatchOptions) -> DispatchOptions {
        if let Some(t) = self.fixed_time {
            options = options.with_fixed_time(t);
        }
        options.validate_input |= self.validate_input;
        options.validate_output |= self.validate_output;
        options
    }
}

fn parse_time(raw: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(raw).map(|t| t.with_timezone(&Utc))
}

// ---------------------------------------------------------------------------
// Command tree
// ---------------------------------------------------------------------------

/// Builds the command tree for `registry`.
#[must_use]
pub fn command(registry: &Registry, name: impl Into<String>) -> Command {
    let mut root = Command::new(name.into())
        .about(registry.description().to_string())
        .subcommand_required(true)
        .arg_required_else_help(true);

    for desc in registry.list() {
        if desc.operation() == SPEC_COMMAND {
            warn!(
                operation = SPEC_COMMAND,
                "operation shadowed by the built-in spec command"
            );
            continue;
        }
        root = root.subcommand(operation_command(desc.as_ref()));
    }

    root.subcommand(Command::new(SPEC_COMMAND).about("Print the API schema as JSON"))
}

fn operation_command(desc: &dyn Descriptor) -> Command {
    let mut cmd = Command::new(desc.operation().to_string())
        .about(desc.description().to_string())
        .arg(
            Arg::new("input")
                .long("input")
                .value_name("PATH")
                .value_parser(clap::value_parser!(PathBuf))
                .help("Read input JSON from a file"),
        )
        .arg(
            Arg::new("stdin")
                .long("stdin")
                .action(ArgAction::SetTrue)
                .help("Read input JSON from standard input"),
        )
        .arg(
            Arg::new("data")
                .value_name("INPUT_DATA")
                .help("Inline input JSON"),
        );

    match render_help(desc) {
        Ok(help) => cmd = cmd.long_about(help),
        Err(e) => warn!(operation = desc.operation(), error = %e, "schema help unavailable"),
    }
    cmd
}

// ---------------------------------------------------------------------------
// Execution
// ---------------------------------------------------------------------------

/// Runs the subcommand selected in `matches`, writing its JSON result to `out`.
///
/// # Errors
///
/// Returns an error if no subcommand was given, the input cannot be read or
/// parsed, the call fails, or writing the result fails.
pub fn run(
    registry: &Registry,
    ctx: ExecutionContext,
    matches: &ArgMatches,
    stdin: &mut dyn Read,
    out: &mut dyn Write,
) -> anyhow::Result<()> {
    let Some((name, sub)) = matches.subcommand() else {
        bail!("no operation given");
    };

    if name == SPEC_COMMAND {
        serde_json::to_writer_pretty(&mut *out, &registry.export())?;
        writeln!(out)?;
        return Ok(());
    }

    let input = read_input(sub, stdin)?;
    let output = registry.invoke(ctx, name, input)?;
    serde_json::to_writer_pretty(&mut *out, &output)?;
    writeln!(out)?;
    Ok(())
}

fn read_input(matches: &ArgMatches, stdin: &mut dyn Read) -> anyhow::Result<Value> {
    let raw = if let Some(path) = matches.get_one::<PathBuf>("input") {
        fs::read_to_string(path)
            .with_context(|| format!("failed to read input file {}", path.display()))?
    } else if let Some(data) = matches.get_one::<String>("data") {
        data.clone()
    } else if matches.get_flag("stdin") {
        let mut buf = String::new();
        stdin
            .read_to_string(&mut buf)
            .context("failed to read input from stdin")?;
        buf
    } else {
        "{}".to_string()
    };
    serde_json::from_str(&raw).context("input is not valid JSON")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
