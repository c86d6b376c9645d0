//! CLI for minilm-oxidized: embed, nearest, tokenize, inspect.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use minilm_oxidized::model::{load_tensor_file, WeightSet};
use minilm_oxidized::tokenizer::Tokenizer;
use minilm_oxidized::{nearest, BatchMode, Session, Vocabulary, MAX_TOKENS};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::info;

#[derive(Parser)]
#[command(name = "minilm-oxidized")]
#[command(about = "MiniLM sentence embeddings in Rust")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Embed one text and print the vector as JSON
    Embed {
        #[arg(long)]
        weights: PathBuf,
        #[arg(long)]
        vocab: PathBuf,
        #[arg(long)]
        text: String,
    },

    /// Find the candidate closest to a query
    Nearest {
        #[arg(long)]
        weights: PathBuf,
        #[arg(long)]
        vocab: PathBuf,
        #[arg(long)]
        query: String,
        /// Comma-separated candidate texts
        #[arg(long, value_delimiter = ',')]
        candidates: Vec<String>,
    },

    /// Show the WordPiece tokens for a text
    Tokenize {
        #[arg(long)]
        vocab: PathBuf,
        #[arg(long)]
        text: String,
        #[arg(long, default_value_t = MAX_TOKENS)]
        max_tokens: usize,
    },

    /// List the tensors in a weight container, directory or single tensor file
    Inspect {
        #[arg(long)]
        weights: PathBuf,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive("info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Embed {
            weights,
            vocab,
            text,
        } => run_embed(&weights, &vocab, &text),
        Commands::Nearest {
            weights,
            vocab,
            query,
            candidates,
        } => run_nearest(&weights, &vocab, &query, &candidates),
        Commands::Tokenize {
            vocab,
            text,
            max_tokens,
        } => run_tokenize(&vocab, &text, max_tokens),
        Commands::Inspect { weights } => run_inspect(&weights),
    }
}

fn run_embed(weights: &Path, vocab: &Path, text: &str) -> Result<()> {
    let session = Session::open(weights, vocab)
        .with_context(|| format!("opening session from {:?}", weights))?;
    let start = Instant::now();
    let embedding = session.embed(text)?;
    info!("Embedded {} chars in {:?}", text.len(), start.elapsed());
    println!("{}", serde_json::to_string(&embedding)?);
    session.close();
    Ok(())
}

fn run_nearest(weights: &Path, vocab: &Path, query: &str, candidates: &[String]) -> Result<()> {
    if candidates.is_empty() {
        bail!("--candidates must name at least one text");
    }
    let session = Session::open(weights, vocab)
        .with_context(|| format!("opening session from {:?}", weights))?;
    let query_embedding = session.embed(query)?;
    let embeddings = session.embed_batch(candidates, BatchMode::Concurrent)?;

    for (text, e) in candidates.iter().zip(&embeddings) {
        println!(
            "{:>8.4}  {:>8.4}  {}",
            query_embedding.dot(e),
            query_embedding.l2_distance_squared(e),
            text
        );
    }
    if let Some(best) = nearest(&query_embedding, &embeddings) {
        println!("nearest: {}", candidates[best]);
    }
    session.close();
    Ok(())
}

fn run_tokenize(vocab: &Path, text: &str, max_tokens: usize) -> Result<()> {
    let vocab = Vocabulary::load(vocab)?;
    let tokenizer = Tokenizer::new(vocab, max_tokens);
    let tokens = tokenizer.tokenize(text)?;
    let pieces: Vec<&str> = tokens
        .ids()
        .iter()
        .map(|&id| tokenizer.vocab().token(id).unwrap_or("?"))
        .collect();
    println!("{} tokens", tokens.len());
    println!("ids:    {:?}", tokens.ids());
    println!("pieces: {:?}", pieces);
    println!("text:   {}", tokenizer.decode(tokens.ids()));
    Ok(())
}

fn run_inspect(path: &Path) -> Result<()> {
    let set = if path.is_dir() {
        WeightSet::load_dir(path)?
    } else if path.extension().is_some_and(|ext| ext == "bin") {
        let tensor = load_tensor_file(path)?;
        println!("dims:    {:?}", tensor.dims());
        println!("strides: {:?}", tensor.strides());
        println!("numel:   {}", tensor.numel());
        return Ok(());
    } else {
        WeightSet::load_container(path)?
    };

    let mut total = 0usize;
    for name in set.names() {
        if let Some(tensor) = set.get(name) {
            total += tensor.numel();
            println!("{:<60} {:?}", name, tensor.dims());
        }
    }
    println!("{} tensors, {} parameters", set.len(), total);
    match set.check_required() {
        Ok(()) => println!("all required weights present"),
        Err(e) => println!("incomplete: {}", e),
    }
    Ok(())
}
