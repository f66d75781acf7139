use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use kpiscope::{Config, Document, Metadata, RatioCalculator, RatioInputs, RatioMetric};
use serde::Deserialize;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use tracing::{info, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Similar-report search and financial ratio calculation
#[derive(Parser, Debug)]
#[command(name = "kpiscope")]
#[command(about = "Search archived financial reports and compute KPI ratios", long_about = None)]
struct Args {
    /// Directory holding the persisted index
    #[arg(long, default_value = kpiscope::DEFAULT_INDEX_DIR, global = true)]
    index_dir: PathBuf,

    /// Embedding dimension
    #[arg(long, default_value_t = kpiscope::DEFAULT_DIMENSION, global = true)]
    dimension: usize,

    /// Embedding model id
    #[arg(long, default_value = kpiscope::DEFAULT_MODEL, global = true)]
    model: String,

    /// Log level (overridden by RUST_LOG when set)
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Embed and archive reports from a JSON Lines file
    Index {
        /// One `{"text": ..., "metadata": {...}}` object per line
        file: PathBuf,
    },
    /// Find archived reports similar to a text
    Search {
        query: String,

        #[arg(long)]
        top_k: Option<usize>,

        #[arg(long)]
        min_similarity: Option<f32>,
    },
    /// Compute a financial ratio from `field=value` pairs
    Ratio {
        metric: String,

        /// Inputs such as `current_assets=300`
        values: Vec<String>,
    },
    /// Show index statistics
    Stats,
    /// Remove every archived report
    Clear,
}

#[derive(Deserialize)]
struct IndexLine {
    text: String,
    #[serde(default)]
    metadata: serde_json::Value,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level)?;

    let config = Config {
        index_dir: args.index_dir.clone(),
        dimension: args.dimension,
        model_id: args.model.clone(),
        ..Config::default()
    };

    match args.command {
        Command::Index { file } => index(&config, &file),
        Command::Search {
            query,
            top_k,
            min_similarity,
        } => search(&config, &query, top_k, min_similarity),
        Command::Ratio { metric, values } => ratio(&metric, &values),
        Command::Stats => stats(&config),
        Command::Clear => {
            config.open_engine()?.clear()?;
            info!("Index at {:?} cleared", config.index_dir);
            Ok(())
        }
    }
}

fn init_logging(level: &str) -> anyhow::Result<()> {
    if std::env::var_os("RUST_LOG").is_some() {
        let subscriber = FmtSubscriber::builder()
            .with_env_filter(EnvFilter::from_default_env())
            .with_writer(std::io::stderr)
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
        return Ok(());
    }

    let log_level = match level {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

fn index(config: &Config, file: &Path) -> anyhow::Result<()> {
    let reader = BufReader::new(File::open(file).with_context(|| format!("cannot open {:?}", file))?);

    let mut documents = Vec::new();
    for (n, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let parsed: IndexLine =
            serde_json::from_str(&line).with_context(|| format!("{:?} line {}", file, n + 1))?;
        let metadata = Metadata::from_json(parsed.metadata)
            .with_context(|| format!("{:?} line {}: bad metadata", file, n + 1))?;
        documents.push(Document::new(parsed.text, metadata));
    }

    let engine = config.open_engine()?;
    let added = engine.add_documents(&documents)?;
    info!("Indexed {} documents, {} total", added, engine.len());
    Ok(())
}

fn search(config: &Config, query: &str, top_k: Option<usize>, min_similarity: Option<f32>) -> anyhow::Result<()> {
    let engine = config.open_engine()?;
    let options = kpiscope::SearchOptions {
        top_k: top_k.unwrap_or(config.top_k),
        min_similarity: min_similarity.unwrap_or(config.min_similarity),
    };

    let hits: Vec<serde_json::Value> = engine
        .search_with(query, options)
        .into_iter()
        .map(|hit| {
            serde_json::json!({
                "score": hit.score,
                "ordinal": hit.ordinal,
                "metadata": hit.metadata.to_json(),
            })
        })
        .collect();
    println!("{}", serde_json::to_string_pretty(&hits)?);
    Ok(())
}

fn ratio(metric: &str, pairs: &[String]) -> anyhow::Result<()> {
    let metric: RatioMetric = metric.parse()?;

    let mut values = RatioInputs::new();
    for pair in pairs {
        let Some((key, value)) = pair.split_once('=') else {
            bail!("expected field=value, got '{}'", pair);
        };
        let value: f64 = value
            .trim()
            .parse()
            .with_context(|| format!("'{}' is not a number", value))?;
        values.insert(key.trim().to_string(), value);
    }

    let result = RatioCalculator::new().calculate_metric(metric, &values)?;
    println!("{} = {:.4} {}", metric, result, metric.unit());
    Ok(())
}

fn stats(config: &Config) -> anyhow::Result<()> {
    let engine = config.open_engine()?;
    let stats = engine.store().stats();
    println!(
        "{}",
        serde_json::to_string_pretty(&serde_json::json!({
            "documents": stats.count,
            "dimension": stats.dimension,
            "path": stats.path,
            "bytes_on_disk": stats.bytes_on_disk,
        }))?
    );
    Ok(())
}
