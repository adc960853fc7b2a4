//! deltacache CLI
//!
//! Offline tool for the range algebra the proxy runs on:
//! - Compute what a request would fetch against cached coverage
//! - Compress, crop, remove and splice extent lists
//! - Stamp recency and count timestamps
//! - Parse timestamps and generate a config file
//!
//! Extents are written `start-end` in Unix seconds, lists comma-separated:
//! `deltacache-cli deltas --have 100-200,400-500 --need 100-600 --step 1m`

use anyhow::{bail, Context, Result};
use chrono::Duration;
use clap::{Parser, Subcommand};
use deltacache::timeseries::{
    parse_duration, parse_epoch, Epoch, Extent, ExtentList, ExtentListLru,
};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "deltacache-cli")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Time-range coverage algebra for the deltacache proxy")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output format (text, json)
    #[arg(short, long, default_value = "text", global = true)]
    pub format: String,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Ranges missing from cached coverage for a request
    Deltas {
        /// Cached coverage
        #[arg(long, default_value = "")]
        have: String,
        /// Requested range
        #[arg(long)]
        need: String,
        /// Sample interval (e.g. 60, 60s, 1m)
        #[arg(short, long)]
        step: String,
    },

    /// Merge contiguous and overlapping extents
    Compress {
        list: String,
        #[arg(short, long)]
        step: String,
    },

    /// Restrict a list to a range
    Crop {
        list: String,
        #[arg(long)]
        range: String,
    },

    /// Subtract ranges from a list
    Remove {
        list: String,
        /// Ranges to subtract
        #[arg(long)]
        remove: String,
        #[arg(short, long)]
        step: String,
    },

    /// Cut a list into bounded fetch chunks
    Splice {
        list: String,
        #[arg(short, long)]
        step: String,
        /// Widest chunk (duration)
        #[arg(long, default_value = "0")]
        max_range: String,
        /// Align chunk boundaries to this cadence (duration)
        #[arg(long, default_value = "0")]
        splice_step: String,
        /// Most timestamps per chunk; overrides the time limits
        #[arg(long, default_value = "0")]
        max_points: i64,
    },

    /// Number of step-aligned timestamps a list covers
    Count {
        list: String,
        #[arg(short, long)]
        step: String,
    },

    /// Stamp the part of an LRU list (`start-end:lastUsed,...`) a read used
    Touch {
        list: String,
        /// Range that was read
        #[arg(long)]
        range: String,
        #[arg(short, long)]
        step: String,
        /// Stamp to apply, Unix seconds (default: now)
        #[arg(long)]
        now: Option<i64>,
    },

    /// Parse a timestamp in any accepted form
    ParseEpoch { input: String },

    /// Generate default config file
    Config {
        /// Output path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let json = match cli.format.as_str() {
        "text" => false,
        "json" => true,
        other => bail!("unknown output format '{}' (use text or json)", other),
    };

    match cli.command {
        Commands::Deltas { have, need, step } => {
            let have = parse_list(&have)?;
            let need = parse_extent(&need)?;
            let deltas = have.calculate_deltas(&need, parse_step(&step)?);
            print_list(&deltas, json)?;
        }

        Commands::Compress { list, step } => {
            let list = parse_list(&list)?;
            print_list(&list.compress(parse_step(&step)?), json)?;
        }

        Commands::Crop { list, range } => {
            let list = parse_list(&list)?;
            print_list(&list.crop(&parse_extent(&range)?), json)?;
        }

        Commands::Remove { list, remove, step } => {
            let list = parse_list(&list)?;
            let remove = parse_list(&remove)?;
            print_list(&list.remove(&remove, parse_step(&step)?), json)?;
        }

        Commands::Splice {
            list,
            step,
            max_range,
            splice_step,
            max_points,
        } => {
            let list = parse_list(&list)?;
            let max_range = parse_duration(&max_range).context("invalid --max-range")?;
            let splice_step = parse_duration(&splice_step).context("invalid --splice-step")?;
            if max_points == 0 && max_range.is_zero() {
                bail!("splice needs --max-range or --max-points");
            }
            let chunks = list.splice(parse_step(&step)?, max_range, splice_step, max_points);
            print_list(&chunks, json)?;
        }

        Commands::Count { list, step } => {
            let count = parse_list(&list)?.timestamp_count(parse_step(&step)?);
            if json {
                println!("{}", serde_json::json!({ "timestamps": count }));
            } else {
                println!("{}", count);
            }
        }

        Commands::Touch {
            list,
            range,
            step,
            now,
        } => {
            let list: ExtentListLru = list.parse().context("invalid LRU extent list")?;
            let range = parse_extent(&range)?;
            let step = parse_step(&step)?;
            let touched = match now {
                Some(secs) => list.update_last_used_at(&range, step, Epoch::from_secs(secs)),
                None => list.update_last_used(&range, step),
            };
            if json {
                println!("{}", serde_json::to_string_pretty(&touched)?);
            } else {
                println!("{}", touched);
            }
        }

        Commands::ParseEpoch { input } => {
            let (epoch, format) = parse_epoch(input.trim())
                .with_context(|| format!("could not parse '{}'", input))?;
            if json {
                let value = serde_json::json!({
                    "nanos": epoch.nanos(),
                    "unix_secs": epoch.unix_secs(),
                    "rfc3339": epoch.to_string(),
                    "format": format!("{:?}", format),
                });
                println!("{}", serde_json::to_string_pretty(&value)?);
            } else {
                println!("{} ({:?}, {} s)", epoch, format, epoch.unix_secs());
            }
        }

        Commands::Config { output } => {
            let config = deltacache::config::generate_default_config();

            match output {
                Some(path) => {
                    if let Some(parent) = path.parent() {
                        std::fs::create_dir_all(parent)?;
                    }
                    std::fs::write(&path, &config)?;
                    println!("Config written to {:?}", path);
                }
                None => {
                    print!("{}", config);
                }
            }
        }
    }

    Ok(())
}

fn parse_list(s: &str) -> Result<ExtentList> {
    s.parse()
        .with_context(|| format!("invalid extent list '{}'", s))
}

fn parse_extent(s: &str) -> Result<Extent> {
    let extent: Extent = s.parse().with_context(|| format!("invalid extent '{}'", s))?;
    if extent.end < extent.start {
        bail!("extent '{}' ends before it starts", s);
    }
    Ok(extent)
}

fn parse_step(s: &str) -> Result<Duration> {
    let step = parse_duration(s).with_context(|| format!("invalid step '{}'", s))?;
    if step <= Duration::zero() {
        bail!("step must be positive");
    }
    Ok(step)
}

fn print_list(list: &ExtentList, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(list)?);
    } else if list.is_empty() {
        println!("(empty)");
    } else {
        println!("{}", list);
    }
    Ok(())
}
