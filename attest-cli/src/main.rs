//! Attest CLI — grounded question answering over a local document corpus.
//!
//! Builds the chunk index, answers questions with citation verification,
//! and runs the offline evaluation/calibration loop.

use anyhow::Context;
use clap::Parser;
use std::path::{Path, PathBuf};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use attest_core::config::{Settings, load_settings};
use attest_core::corpus::{self, CorpusIndex};
use attest_core::embed::create_embedder;
use attest_core::eval;
use attest_core::generate::OpenAiCompatGenerator;
use attest_core::pipeline::QaPipeline;
use attest_core::retrieval::{RetrievalMode, Retriever};

/// Attest: answer questions from your documents, with receipts
#[derive(Parser, Debug)]
#[command(name = "attest", version, about, long_about = None)]
struct Cli {
    /// Workspace directory (holds attest.toml, data/, indexes/)
    #[arg(short, long, default_value = ".")]
    workspace: PathBuf,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Chunk the corpus and build the retrieval index
    Index,
    /// Answer a question with retrieval and grounding verification
    Ask {
        question: String,
        /// Retrieval mode: lexical, vector, or fused
        #[arg(short, long, default_value = "fused")]
        mode: RetrievalMode,
        /// Number of candidates to retrieve
        #[arg(short, long)]
        k: Option<usize>,
        /// Support threshold override
        #[arg(short, long)]
        tau: Option<f64>,
    },
    /// Answer without retrieval or verification (comparison baseline)
    Baseline { question: String },
    /// Calibrate tau and score the devset and safety set
    Eval {
        /// Candidate thresholds, ascending
        #[arg(long, value_delimiter = ',', default_values_t = vec![0.2, 0.4, 0.6])]
        thresholds: Vec<f64>,
    },
    /// Score the safety-prompt set at the configured (or given) threshold
    Safety {
        /// Support threshold override
        #[arg(short, long)]
        tau: Option<f64>,
    },
    /// Show retrieved candidates for a question without generating
    Retrieve {
        question: String,
        #[arg(short, long, default_value = "fused")]
        mode: RetrievalMode,
        #[arg(short, long)]
        k: Option<usize>,
    },
}

/// Resolve configured paths against the workspace directory. Absolute paths
/// in the configuration are left as-is.
fn resolve_paths(mut settings: Settings, workspace: &Path) -> Settings {
    let paths = &mut settings.paths;
    for p in [
        &mut paths.corpus_dir,
        &mut paths.index_dir,
        &mut paths.devset,
        &mut paths.safety_set,
        &mut paths.experiments_log,
    ] {
        *p = workspace.join(&*p);
    }
    settings
}

fn build_pipeline(settings: Settings) -> anyhow::Result<QaPipeline> {
    let index_dir = settings.paths.index_dir.clone();
    let index = CorpusIndex::load(&index_dir)
        .with_context(|| format!("loading index from {}", index_dir.display()))?;
    let embedder = create_embedder(&settings.embedding)?;
    let retriever = Retriever::new(index, embedder, &settings.retrieval);
    let generator = Box::new(OpenAiCompatGenerator::new(&settings.generation)?);
    Ok(QaPipeline::new(settings, retriever, generator)?)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_filter(EnvFilter::new(filter));
    tracing_subscriber::registry().with(stderr_layer).init();

    let settings = resolve_paths(load_settings(Some(&cli.workspace))?, &cli.workspace);

    match cli.command {
        Commands::Index => {
            let embedder = create_embedder(&settings.embedding)?;
            let meta = corpus::build_index(
                &settings.paths.corpus_dir,
                &settings.paths.index_dir,
                embedder.as_ref(),
            )
            .with_context(|| format!("indexing {}", settings.paths.corpus_dir.display()))?;
            println!("{}", serde_json::to_string_pretty(&meta)?);
        }
        Commands::Ask {
            question,
            mode,
            k,
            tau,
        } => {
            let pipeline = build_pipeline(settings)?;
            let payload = pipeline.answer_grounded(&question, mode, k, tau).await?;
            println!("{}", serde_json::to_string_pretty(&payload)?);
        }
        Commands::Baseline { question } => {
            let pipeline = build_pipeline(settings)?;
            let payload = pipeline.answer_baseline(&question).await?;
            println!("{}", serde_json::to_string_pretty(&payload)?);
        }
        Commands::Eval { thresholds } => {
            let pipeline = build_pipeline(settings)?;
            let scores = eval::evaluate(&pipeline, &thresholds).await?;
            println!(
                "tau={} f1={:.3} valid_citation_rate={:.3} safety={}/{}",
                scores.tau,
                scores.mean_f1(),
                scores.valid_citation_rate,
                scores.safety_pass,
                scores.safety_total,
            );
        }
        Commands::Safety { tau } => {
            let pipeline = build_pipeline(settings)?;
            let (pass, total) = eval::safety_check(&pipeline, tau).await?;
            println!("safety {pass}/{total}");
        }
        Commands::Retrieve { question, mode, k } => {
            let pipeline = build_pipeline(settings)?;
            let k = k.unwrap_or(pipeline.settings().retrieval.k);
            for (rank, candidate) in pipeline.retrieve(&question, k, mode).iter().enumerate() {
                println!(
                    "{:>2}. {} lexical={:?} vector={:?} ({:?})",
                    rank + 1,
                    candidate.chunk.id,
                    candidate.lexical,
                    candidate.vector,
                    candidate.origin,
                );
            }
        }
    }
    Ok(())
}
