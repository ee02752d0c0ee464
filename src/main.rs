//! archiveql CLI
//!
//! Command-line interface for archive queries:
//! - Parse a query and show its grouping
//! - Find the time ranges where a query holds
//! - Fetch a variable, optionally only where a condition holds
//! - Generate a config file

use anyhow::Context;
use archiveql::config::{generate_default_config, Config, LoggingConfig, SourceConfig, SourceKind};
use archiveql::query::parse;
use archiveql::ranges::{Interval, Ranges, Value};
use archiveql::source::{CachedSource, CsvSource, SampleSource, SqliteSource};
use archiveql::time::{format_time, parse_time};
use archiveql::{Archive, Query};
use chrono_tz::Tz;
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "archiveql")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Query language over time-series archive variables")]
#[command(long_about = "archiveql evaluates logical and arithmetic expressions over archived \
variables.\nFind the time ranges where a condition holds, or fetch a variable only while it does.")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file (default: search the standard locations)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Archive kind, overriding the config file
    #[arg(long, value_enum, global = true)]
    pub kind: Option<SourceKind>,

    /// Archive path, overriding the config file
    #[arg(short, long, global = true)]
    pub source: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "table", global = true)]
    pub format: OutputFormat,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    Table,
    Json,
    Csv,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Parse a query and print it fully parenthesized
    Parse {
        /// Query text, e.g. "A > 10 && B < 5"
        query: String,
    },

    /// Find the time ranges where a query holds
    Ranges {
        /// Query text
        query: String,
        /// Window start: "yyyy-mm-dd HH:MM[:SS][+0.X]" or archive ticks
        #[arg(long)]
        from: String,
        /// Window end, same formats as --from
        #[arg(long)]
        to: String,
        /// Print every interval with its value instead of merged true ranges
        #[arg(long)]
        raw: bool,
    },

    /// Fetch the samples of one variable
    Fetch {
        /// Variable name
        variable: String,
        /// Window start
        #[arg(long)]
        from: String,
        /// Window end
        #[arg(long)]
        to: String,
        /// Keep only samples where this condition holds
        #[arg(long = "where")]
        condition: Option<String>,
    },

    /// Generate default config file
    Config {
        /// Output path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Print the effective configuration instead of the template
        #[arg(long)]
        effective: bool,
    },
}

#[derive(Serialize)]
struct RangeRow {
    start: i64,
    end: i64,
    start_time: String,
    end_time: String,
    value: Value,
}

impl RangeRow {
    fn new(interval: Interval, tz: Tz) -> anyhow::Result<Self> {
        Ok(Self {
            start: interval.start,
            end: interval.end,
            start_time: format_time(interval.start, true, tz)?,
            end_time: format_time(interval.end, true, tz)?,
            value: interval.value,
        })
    }
}

#[derive(Serialize)]
struct SampleRow {
    timestamp: i64,
    time: String,
    value: f64,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let (mut config, report) = match &cli.config {
        Some(path) => Config::load_with_env(path)?,
        None => Config::load_default(),
    };
    if let Some(kind) = cli.kind {
        config.source.kind = kind;
    }
    if let Some(path) = &cli.source {
        config.source.path = path.clone();
    }

    init_logging(&config.logging);
    report.log();

    match cli.command {
        Commands::Parse { query } => {
            let expr = parse(&query)?;
            match cli.format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&expr)?),
                OutputFormat::Table | OutputFormat::Csv => println!("{}", expr),
            }
        }

        Commands::Ranges {
            query,
            from,
            to,
            raw,
        } => {
            let tz = config.time.zone()?;
            let (t0, t1) = (parse_time(&from, tz)?, parse_time(&to, tz)?);
            let query = Query::new(&query)?;
            let archive = Archive::new(open_source(&config.source, tz)?)
                .with_prefetch(config.source.cache);

            let stream: Ranges = if raw {
                archive.search_ranges(&query, t0, t1)
            } else {
                Box::new(archive.find_ranges(&query, t0, t1))
            };

            // Ranges found before an error are still printed
            let mut rows = Vec::new();
            let mut failure = None;
            for item in stream {
                match item {
                    Ok(interval) => rows.push(RangeRow::new(interval, tz)?),
                    Err(e) => {
                        failure = Some(e);
                        break;
                    }
                }
            }

            write_rows(
                cli.format,
                &rows,
                &format!("{:<26} {:<26} {}", "Start", "End", "Value"),
                |r| format!("{:<26} {:<26} {}", r.start_time, r.end_time, r.value),
            )?;
            if let Some(e) = failure {
                return Err(e).context(format!("query '{}' failed", query.text()));
            }
        }

        Commands::Fetch {
            variable,
            from,
            to,
            condition,
        } => {
            let tz = config.time.zone()?;
            let (t0, t1) = (parse_time(&from, tz)?, parse_time(&to, tz)?);
            let archive = Archive::new(open_source(&config.source, tz)?)
                .with_prefetch(config.source.cache);

            let samples = archive.fetch(&variable, t0, t1, condition.as_deref())?;
            let rows = samples
                .into_iter()
                .map(|s| {
                    Ok(SampleRow {
                        timestamp: s.timestamp,
                        time: format_time(s.timestamp, true, tz)?,
                        value: s.value,
                    })
                })
                .collect::<anyhow::Result<Vec<_>>>()?;

            write_rows(
                cli.format,
                &rows,
                &format!("{:<26} {}", "Time", variable),
                |r| format!("{:<26} {}", r.time, r.value),
            )?;
        }

        Commands::Config { output, effective } => {
            let content = if effective {
                toml::to_string_pretty(&config)?
            } else {
                generate_default_config()
            };

            if let Some(path) = output {
                std::fs::write(&path, content)
                    .with_context(|| format!("writing config to {:?}", path))?;
                println!("Config written to {:?}", path);
            } else {
                print!("{}", content);
            }
        }
    }

    Ok(())
}

fn init_logging(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("archiveql={}", logging.level)));
    let registry = tracing_subscriber::registry().with(filter);

    if logging.format == "json" {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

fn open_source(config: &SourceConfig, tz: Tz) -> anyhow::Result<Box<dyn SampleSource>> {
    let source: Box<dyn SampleSource> = match config.kind {
        SourceKind::Csv => Box::new(CsvSource::open(&config.path)?),
        SourceKind::Sqlite => Box::new(open_sqlite(config, tz)?),
    };

    if config.cache {
        Ok(Box::new(CachedSource::new(source)))
    } else {
        Ok(source)
    }
}

fn open_sqlite(config: &SourceConfig, tz: Tz) -> anyhow::Result<SqliteSource> {
    let source = SqliteSource::open(&config.path)?;
    match (&config.history_path, &config.history_cutover) {
        (Some(path), Some(cutover)) => {
            let cutover = parse_time(cutover, tz)
                .with_context(|| format!("invalid history_cutover '{}'", cutover))?;
            Ok(source.with_history(SqliteSource::open(path)?, cutover))
        }
        (None, None) => Ok(source),
        _ => anyhow::bail!("history_path and history_cutover must be set together"),
    }
}

fn write_rows<T: Serialize>(
    format: OutputFormat,
    rows: &[T],
    header: &str,
    line: impl Fn(&T) -> String,
) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(rows)?),
        OutputFormat::Csv => {
            let mut writer = csv::Writer::from_writer(std::io::stdout());
            for row in rows {
                writer.serialize(row)?;
            }
            writer.flush()?;
        }
        OutputFormat::Table => {
            if rows.is_empty() {
                println!("No results.");
                return Ok(());
            }
            println!("{}", header);
            println!("{}", "-".repeat(header.len().max(60)));
            for row in rows {
                println!("{}", line(row));
            }
        }
    }
    Ok(())
}
