//! `rank-cli`: a small command-line front end over `sorter-core`.
//!
//! Subcommands mirror the engine's pure API directly: `ingest` appends and
//! reduces one submission, `rank` and `compare` are read-only queries,
//! `hashtags` lists what's known with per-hashtag counts. Output is
//! plaintext by default; pass `--output-format json` for machine
//! consumption.

use std::io::Read;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum, ValueHint};
use log::error;
use sorter_core::{Core, IngestError};

/// Ranks items submitted through a small email-shaped DSL.
#[derive(Parser, Debug)]
#[command(name = "rank-cli", version, about)]
struct Cli {
    /// Directory holding the append-only submission log. Defaults to
    /// `./data`, or the `SORTER_DATA_DIR` environment variable if set.
    #[arg(long, value_hint = ValueHint::DirPath)]
    data_dir: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = OutputFormat::Plaintext)]
    output_format: OutputFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Reads a submission body from stdin (or `--file`) and ingests it.
    Ingest {
        #[arg(long)]
        from: String,
        /// Epoch milliseconds. Defaults to the log's current time source
        /// being the caller's responsibility — this command requires it
        /// explicitly so ingestion stays deterministic and replayable.
        #[arg(long)]
        timestamp: i64,
        /// The message's subject line. Only affects the log filename's
        /// readable slug, never the DSL semantics.
        #[arg(long, default_value = "(no subject)")]
        subject: String,
        #[arg(long, value_hint = ValueHint::FilePath)]
        file: Option<PathBuf>,
    },
    /// Lists every hashtag currently in use.
    Hashtags,
    /// Ranks items under a hashtag by one attribute.
    Rank { hashtag: String, attribute: String },
    /// Aggregates preference weight between two items under one attribute.
    Compare {
        item_a: String,
        item_b: String,
        attribute: String,
    },
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum, Default)]
enum OutputFormat {
    #[default]
    Plaintext,
    Json,
}

fn data_dir(cli: &Cli) -> PathBuf {
    cli.data_dir.clone().unwrap_or_else(|| {
        std::env::var("SORTER_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./data"))
    })
}

fn read_body(file: &Option<PathBuf>) -> anyhow::Result<String> {
    match file {
        Some(path) => Ok(std::fs::read_to_string(path)?),
        None => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf)?;
            Ok(buf)
        }
    }
}

fn main() -> ExitCode {
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "warn");
    }
    env_logger::init();

    let cli = Cli::parse();
    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err:#}");
            eprintln!("error: {err}");
            let is_io_error = err
                .chain()
                .any(|cause| cause.downcast_ref::<std::io::Error>().is_some());
            if is_io_error {
                ExitCode::from(2)
            } else {
                ExitCode::FAILURE
            }
        }
    }
}

fn run(cli: &Cli) -> anyhow::Result<()> {
    let core = Core::open(data_dir(cli))?;

    match &cli.command {
        Command::Ingest {
            from,
            timestamp,
            subject,
            file,
        } => {
            let body = read_body(file)?;
            match core.ingest(from, *timestamp, subject, &body) {
                Ok(receipt) => print_ingest(cli.output_format, &receipt),
                Err(IngestError::NoDslContent) => {
                    anyhow::bail!("submission contained no recognizable dsl statements")
                }
                Err(other) => return Err(other.into()),
            }
        }
        Command::Hashtags => print_hashtags(cli.output_format, &core.list_hashtags()),
        Command::Rank { hashtag, attribute } => {
            print_ranking(cli.output_format, &core.rank(hashtag, attribute))
        }
        Command::Compare {
            item_a,
            item_b,
            attribute,
        } => print_comparison(cli.output_format, &core.compare(item_a, item_b, attribute)),
    }

    Ok(())
}

fn print_ingest(format: OutputFormat, receipt: &sorter_core::IngestReceipt) {
    match format {
        OutputFormat::Json => {
            let value = serde_json::json!({
                "filename": receipt.filename,
                "statements_applied": receipt.statements_applied,
            });
            println!("{value}");
        }
        OutputFormat::Plaintext => {
            println!(
                "recorded {} ({} statement(s))",
                receipt.filename, receipt.statements_applied
            );
        }
    }
}

fn print_hashtags(format: OutputFormat, hashtags: &[sorter_core::HashtagSummary]) {
    match format {
        OutputFormat::Json => {
            let value: Vec<_> = hashtags
                .iter()
                .map(|h| {
                    serde_json::json!({
                        "name": h.name,
                        "item_count": h.item_count,
                        "vote_count": h.vote_count,
                        "last_updated_ts": h.last_updated_ts,
                    })
                })
                .collect();
            println!("{}", serde_json::json!(value));
        }
        OutputFormat::Plaintext => {
            for h in hashtags {
                println!(
                    "#{:<20} items={:<5} votes={:<5} last_updated={}",
                    h.name, h.item_count, h.vote_count, h.last_updated_ts
                );
            }
        }
    }
}

fn print_ranking(format: OutputFormat, ranked: &[sorter_core::RankedItem]) {
    match format {
        OutputFormat::Json => {
            let value: Vec<_> = ranked
                .iter()
                .map(|item| {
                    serde_json::json!({
                        "title": item.title,
                        "score": item.score,
                        "rank": item.rank,
                        "component_id": item.component_id,
                    })
                })
                .collect();
            println!("{}", serde_json::json!(value));
        }
        OutputFormat::Plaintext => {
            let mut current_component = None;
            for item in ranked {
                if current_component != Some(item.component_id) {
                    current_component = Some(item.component_id);
                    println!("-- component {} --", item.component_id);
                }
                println!("{:>3}. {:<30} {:.6}", item.rank, item.title, item.score);
            }
        }
    }
}

fn print_comparison(format: OutputFormat, comparison: &sorter_core::Comparison) {
    match format {
        OutputFormat::Json => {
            let value = serde_json::json!({
                "item_left": comparison.item_left,
                "item_right": comparison.item_right,
                "left_sum": comparison.left_sum,
                "right_sum": comparison.right_sum,
                "votes": comparison.votes.len(),
            });
            println!("{value}");
        }
        OutputFormat::Plaintext => {
            println!(
                "{} {:.2} : {:.2} {} ({} vote(s))",
                comparison.item_left,
                comparison.left_sum,
                comparison.right_sum,
                comparison.item_right,
                comparison.votes.len()
            );
        }
    }
}
