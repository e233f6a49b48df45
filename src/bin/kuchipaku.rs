//! kuchipaku — Japanese text to VMD / MVD lip-sync motion.
//!
//! Usage:
//!   kuchipaku --text "こんにちは" --output hello.vmd
//!   kuchipaku --input script.txt --output script.mvd --config lipsync.json
//!   kuchipaku --text "東京タワー" --dictionary words.json --print-reading

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use kuchipaku::{DictionaryOracle, LipSyncConfig, LipSyncPipeline, MotionFormat};
use tracing_subscriber::{filter::LevelFilter, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "kuchipaku", version, about = "Japanese text to lip-sync motion files")]
struct Args {
    /// Text to convert.
    #[arg(long, conflicts_with = "input")]
    text: Option<String>,

    /// UTF-8 text file to convert.
    #[arg(long)]
    input: Option<PathBuf>,

    /// Output motion file (.vmd or .mvd).
    #[arg(long, short)]
    output: Option<PathBuf>,

    /// JSON configuration file.
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// JSON word → katakana reading table used for kanji.
    #[arg(long)]
    dictionary: Option<PathBuf>,

    /// Output format; defaults to the output file's extension.
    #[arg(long, value_parser = ["vmd", "mvd"])]
    format: Option<String>,

    /// Print the katakana reading and the lip-sync units.
    #[arg(long)]
    print_reading: bool,

    /// Debug logging.
    #[arg(long, short, conflicts_with = "quiet")]
    verbose: bool,

    /// Errors only.
    #[arg(long, short)]
    quiet: bool,
}

// ─── Logging ─────────────────────────────────────────────────────────────────

fn log_level(args: &Args) -> LevelFilter {
    if args.verbose {
        LevelFilter::DEBUG
    } else if args.quiet {
        LevelFilter::ERROR
    } else {
        LevelFilter::INFO
    }
}

/// `RUST_LOG` wins when set; otherwise `--verbose` / `--quiet` pick the level.
/// The default `tracing-log` bridge forwards the library's `log` records.
fn init_logging(args: &Args) {
    let filter = EnvFilter::builder()
        .with_default_directive(log_level(args).into())
        .from_env_lossy();
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

// ─── Main ────────────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args);

    let text = match (&args.text, &args.input) {
        (Some(text), _) => text.clone(),
        (None, Some(path)) => std::fs::read_to_string(path)
            .with_context(|| format!("Cannot read input: {}", path.display()))?,
        (None, None) => bail!("Nothing to convert; pass --text or --input"),
    };

    let config = match &args.config {
        Some(path) => LipSyncConfig::load(path)?,
        None => LipSyncConfig::default(),
    };

    let mut pipeline = LipSyncPipeline::new(config).context("Invalid configuration")?;
    if let Some(path) = &args.dictionary {
        let dictionary = DictionaryOracle::from_json_file(path)?;
        log::info!("loaded {} dictionary entries", dictionary.len());
        pipeline.set_oracle(Box::new(dictionary));
    }

    if args.print_reading {
        let reading = pipeline.reading(&text);
        println!("{reading}");
        let units: Vec<String> = pipeline.units(&text).iter().map(ToString::to_string).collect();
        println!("{}", units.join(" "));
    }

    let Some(output) = &args.output else {
        if !args.print_reading {
            bail!("No --output given");
        }
        return Ok(());
    };

    let format = args.format.as_deref().map(str::parse::<MotionFormat>).transpose()?;
    let count = pipeline.write_to_file(&text, output, format)?;
    println!("Wrote {count} keyframes to {}", output.display());
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(argv: &[&str]) -> Args {
        Args::try_parse_from(std::iter::once("kuchipaku").chain(argv.iter().copied())).unwrap()
    }

    #[test]
    fn test_log_level_from_flags() {
        assert_eq!(log_level(&parse(&["--text", "あ"])), LevelFilter::INFO);
        assert_eq!(log_level(&parse(&["--text", "あ", "--verbose"])), LevelFilter::DEBUG);
        assert_eq!(log_level(&parse(&["--text", "あ", "-q"])), LevelFilter::ERROR);
        assert!(Args::try_parse_from(["kuchipaku", "--verbose", "--quiet"]).is_err());
    }

    #[test]
    fn test_format_flag_is_checked() {
        assert_eq!(parse(&["--text", "あ", "--format", "mvd"]).format.as_deref(), Some("mvd"));
        assert!(Args::try_parse_from(["kuchipaku", "--format", "bvh"]).is_err());
    }
}
