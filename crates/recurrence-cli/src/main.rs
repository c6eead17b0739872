//! `recur` CLI: inspect, build, and expand recurrence pattern blobs.
//!
//! ## Usage
//!
//! ```sh
//! # Decode a pattern blob to JSON
//! recur decode -i pattern.bin
//!
//! # Blobs can also be given as hex text
//! echo 04300430... | recur decode --hex
//!
//! # Encode a JSON pattern back to a blob (hex on stdout, or binary with -o)
//! recur encode -i pattern.json
//!
//! # Expand occurrences in a window, with a timezone rule blob
//! recur expand -i pattern.bin --tz tz.bin --from 2024-01-01 --to 2024-02-01
//!
//! # Decode a timezone rule and resolve its offset at an instant
//! recur tz -i tz.bin --at 2024-07-01T12:00:00Z
//!
//! # Export as an RFC 5545 RRULE
//! recur rrule -i pattern.bin
//! ```
//!
//! Logs go to stderr and are filtered by `RUST_LOG`.

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use clap::{Args, Parser, Subcommand};
use recurrence_engine::{
    decode, encode, to_rrule, EngineConfig, ExpansionRequest, OccurrenceExpander,
    OccurrenceInstance, RecurrencePattern, TimezoneRule,
};
use serde::Serialize;
use std::io::{self, Read, Write};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "recur",
    version,
    about = "Inspect and expand binary recurrence pattern blobs"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct BlobInput {
    /// Input file (reads from stdin if omitted)
    #[arg(short, long)]
    input: Option<String>,
    /// Treat the input as hex text instead of raw bytes
    #[arg(long)]
    hex: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Decode a pattern blob to JSON (partial decodes are reported, not fatal)
    Decode {
        #[command(flatten)]
        blob: BlobInput,
        /// Output file (writes to stdout if omitted)
        #[arg(short, long)]
        output: Option<String>,
    },
    /// Encode a JSON pattern into a blob
    Encode {
        /// JSON pattern file (reads from stdin if omitted)
        #[arg(short, long)]
        input: Option<String>,
        /// Write raw bytes to this file instead of hex to stdout
        #[arg(short, long)]
        output: Option<String>,
    },
    /// Expand a pattern blob into occurrences
    Expand {
        #[command(flatten)]
        blob: BlobInput,
        /// Timezone rule blob file (UTC if omitted)
        #[arg(long)]
        tz: Option<String>,
        /// Timezone rule blob as hex text
        #[arg(long, conflicts_with = "tz")]
        tz_hex: Option<String>,
        /// Window start: a date (2024-01-01) or RFC 3339 instant, UTC
        #[arg(long)]
        from: String,
        /// Window end, exclusive (unbounded if omitted)
        #[arg(long)]
        to: Option<String>,
        /// Maximum number of occurrences (0 = no limit)
        #[arg(long, default_value_t = 0)]
        limit: usize,
        /// Only occurrences that fire a reminder
        #[arg(long)]
        reminders_only: bool,
        /// Whether the item itself has its reminder switched on
        #[arg(long)]
        reminder_set: bool,
        /// Local completion time of the previous occurrence (sliding patterns)
        #[arg(long)]
        completed: Option<String>,
        /// Engine configuration JSON file
        #[arg(long)]
        config: Option<String>,
        /// Override the grid step cap
        #[arg(long)]
        max_steps: Option<u32>,
    },
    /// Decode a timezone rule blob
    Tz {
        #[command(flatten)]
        blob: BlobInput,
        /// Also resolve the offset in effect at this local instant
        #[arg(long)]
        at: Option<String>,
    },
    /// Export a pattern blob as an RFC 5545 RRULE
    Rrule {
        #[command(flatten)]
        blob: BlobInput,
    },
}

/// One expanded occurrence with readable timestamps.
#[derive(Serialize)]
struct Row<'a> {
    start: String,
    end: String,
    #[serde(flatten)]
    instance: &'a OccurrenceInstance,
}

#[derive(Serialize)]
struct TzReport {
    rule: TimezoneRule,
    has_dst: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    offset_minutes: Option<i32>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("recurrence_engine=info")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Decode { blob, output } => {
            let bytes = read_blob(&blob)?;
            let decoded = decode(&bytes);
            if !decoded.is_valid() {
                tracing::warn!("pattern blob decoded only partially");
            }
            write_output(output.as_deref(), &to_pretty_json(&decoded)?)?;
        }
        Commands::Encode { input, output } => {
            let json = String::from_utf8(read_input(input.as_deref())?)
                .context("Pattern JSON is not valid UTF-8")?;
            let pattern: RecurrencePattern =
                serde_json::from_str(&json).context("Failed to parse pattern JSON")?;
            let bytes = encode(&pattern).context("Failed to encode pattern")?;
            match output {
                Some(path) => std::fs::write(&path, &bytes)
                    .with_context(|| format!("Failed to write file: {}", path))?,
                None => println!("{}", hex::encode(&bytes)),
            }
        }
        Commands::Expand {
            blob,
            tz,
            tz_hex,
            from,
            to,
            limit,
            reminders_only,
            reminder_set,
            completed,
            config,
            max_steps,
        } => {
            let pattern = decode(&read_blob(&blob)?)
                .into_result()
                .context("Pattern blob did not decode completely")?;
            let tz = match (tz, tz_hex) {
                (Some(path), _) => decode_tz(&std::fs::read(&path).with_context(|| {
                    format!("Failed to read file: {}", path)
                })?)?,
                (None, Some(text)) => decode_tz(&parse_hex(text.as_bytes())?)?,
                (None, None) => TimezoneRule::utc(),
            };

            let mut engine_config = match config {
                Some(path) => {
                    let text = std::fs::read_to_string(&path)
                        .with_context(|| format!("Failed to read file: {}", path))?;
                    EngineConfig::from_json_str(&text).context("Failed to parse config")?
                }
                None => EngineConfig::default(),
            };
            if let Some(steps) = max_steps {
                engine_config.max_grid_steps = steps;
            }

            let window_start = parse_instant(&from)?;
            let mut request = match to {
                Some(to) => ExpansionRequest::new(window_start, parse_instant(&to)?),
                None => ExpansionRequest::all_from(window_start),
            }
            .with_limit(limit);
            if reminders_only {
                request = request.reminders_only();
            }
            request.defaults.reminder_enabled = reminder_set;
            if let Some(completed) = completed {
                request = request.completed_at(parse_instant(&completed)?);
            }

            let instances = OccurrenceExpander::new(&pattern, &tz)
                .with_config(&engine_config)
                .generate(&request)
                .context("Failed to expand pattern")?;
            let rows: Vec<Row<'_>> = instances
                .iter()
                .map(|instance| Row {
                    start: rfc3339(instance.start_utc),
                    end: rfc3339(instance.end_utc),
                    instance,
                })
                .collect();
            write_output(None, &to_pretty_json(&rows)?)?;
        }
        Commands::Tz { blob, at } => {
            let rule = decode_tz(&read_blob(&blob)?)?;
            let offset_minutes = match at {
                Some(at) => Some(rule.resolve_offset_minutes(parse_instant(&at)?)),
                None => None,
            };
            let report = TzReport {
                rule,
                has_dst: rule.has_dst(),
                offset_minutes,
            };
            write_output(None, &to_pretty_json(&report)?)?;
        }
        Commands::Rrule { blob } => {
            let pattern = decode(&read_blob(&blob)?)
                .into_result()
                .context("Pattern blob did not decode completely")?;
            println!("{}", to_rrule(&pattern).context("Failed to export RRULE")?);
        }
    }

    Ok(())
}

fn decode_tz(bytes: &[u8]) -> Result<TimezoneRule> {
    TimezoneRule::decode(bytes).context("Failed to decode timezone blob")
}

fn read_blob(blob: &BlobInput) -> Result<Vec<u8>> {
    let raw = read_input(blob.input.as_deref())?;
    if blob.hex {
        parse_hex(&raw)
    } else {
        Ok(raw)
    }
}

/// Hex text with any whitespace removed.
fn parse_hex(raw: &[u8]) -> Result<Vec<u8>> {
    let compact: Vec<u8> = raw
        .iter()
        .copied()
        .filter(|b| !b.is_ascii_whitespace())
        .collect();
    hex::decode(compact).context("Input is not valid hex")
}

/// A date (midnight), a naive date-time, or an RFC 3339 instant. Naive
/// values are read as UTC.
fn parse_instant(text: &str) -> Result<i64> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Ok(dt.timestamp());
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S") {
        return Ok(dt.and_utc().timestamp());
    }
    let date = NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .with_context(|| format!("Invalid date or time: '{}'", text))?;
    Ok(date.and_time(chrono::NaiveTime::MIN).and_utc().timestamp())
}

fn rfc3339(secs: i64) -> String {
    DateTime::<Utc>::from_timestamp(secs, 0)
        .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Secs, true))
        .unwrap_or_else(|| secs.to_string())
}

fn to_pretty_json<T: Serialize>(value: &T) -> Result<String> {
    serde_json::to_string_pretty(value).context("Failed to serialize output")
}

fn read_input(path: Option<&str>) -> Result<Vec<u8>> {
    match path {
        Some(path) => std::fs::read(path).with_context(|| format!("Failed to read file: {}", path)),
        None => {
            let mut buf = Vec::new();
            io::stdin()
                .read_to_end(&mut buf)
                .context("Failed to read from stdin")?;
            Ok(buf)
        }
    }
}

fn write_output(path: Option<&str>, content: &str) -> Result<()> {
    match path {
        Some(path) => {
            std::fs::write(path, content)
                .with_context(|| format!("Failed to write file: {}", path))?;
        }
        None => {
            let mut stdout = io::stdout().lock();
            writeln!(stdout, "{}", content).context("Failed to write to stdout")?;
        }
    }
    Ok(())
}
