use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use search_core::{Gateway, Index, Searcher, StandardTokenizer, StorePaths, Tokenizer, TokenizerConfig};
use tracing_subscriber::{fmt, EnvFilter};
use walkdir::WalkDir;

use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "indexer")]
#[command(about = "Build, inspect and query the weighted inverted index", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Clone)]
struct TokenizerArgs {
    /// Apply English stemming to terms
    #[arg(long, default_value_t = false)]
    stem: bool,
    /// Keep stop words instead of dropping them
    #[arg(long, default_value_t = false)]
    keep_stopwords: bool,
}

impl TokenizerArgs {
    fn tokenizer(&self) -> StandardTokenizer {
        StandardTokenizer::new(TokenizerConfig { stem: self.stem, remove_stopwords: !self.keep_stopwords, ..Default::default() })
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Build the index from a corpus file (or a directory of them) and save it to the store
    Build {
        /// Corpus file or directory; one `title\x03content\x03url` record per line
        #[arg(long)]
        input: String,
        /// Store directory
        #[arg(long, default_value = "./store")]
        store: String,
        #[command(flatten)]
        tokenizer: TokenizerArgs,
    },
    /// Load the index from the store and run a query (interactive when --query is omitted)
    Search {
        #[arg(long, default_value = "./store")]
        store: String,
        #[arg(long)]
        query: Option<String>,
        /// Must match the settings the index was built with
        #[command(flatten)]
        tokenizer: TokenizerArgs,
    },
    /// Print document and term counts of a stored index
    Stats {
        #[arg(long, default_value = "./store")]
        store: String,
    },
}

fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Build { input, store, tokenizer } => build_index(&input, &store, &tokenizer.tokenizer()),
        Commands::Search { store, query, tokenizer } => search(&store, query, tokenizer.tokenizer()),
        Commands::Stats { store } => stats(&store),
    }
}

fn corpus_files(input: &Path) -> Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = Vec::new();
    if input.is_dir() {
        for entry in WalkDir::new(input).sort_by_file_name().into_iter().filter_map(|e| e.ok()) {
            let p = entry.path();
            if p.is_file() && p.extension().and_then(|s| s.to_str()) == Some("txt") {
                files.push(p.to_path_buf());
            }
        }
    } else if input.is_file() {
        files.push(input.to_path_buf());
    } else {
        bail!("input {} does not exist", input.display());
    }
    Ok(files)
}

fn build_index(input: &str, store: &str, tokenizer: &dyn Tokenizer) -> Result<()> {
    let files = corpus_files(Path::new(input))?;
    tracing::info!(files = files.len(), input, "reading corpus");
    let (index, stats) = Index::build_from_paths(&files, tokenizer)?;
    if stats.skipped > 0 {
        tracing::warn!(skipped = stats.skipped, "some corpus records were malformed");
    }

    let gateway = Gateway::open_sled(&StorePaths::new(store))?;
    index.save_to_store(&gateway).context("saving index")?;
    tracing::info!(store, num_docs = index.num_docs(), num_terms = index.num_terms(), "index build complete");
    Ok(())
}

fn load(store: &str) -> Result<Index> {
    let gateway = Gateway::open_sled(&StorePaths::new(store))?;
    Ok(Index::load_from_store(&gateway).context("loading index")?)
}

fn search(store: &str, query: Option<String>, tokenizer: StandardTokenizer) -> Result<()> {
    let index = Arc::new(load(store)?);
    let searcher = Searcher::with_index(Arc::new(tokenizer), index);
    let stdout = io::stdout();

    if let Some(q) = query {
        let results = searcher.query(&q)?;
        writeln!(stdout.lock(), "{}", serde_json::to_string(&results)?)?;
        return Ok(());
    }

    let stdin = io::stdin();
    loop {
        {
            let mut out = stdout.lock();
            write!(out, "query> ")?;
            out.flush()?;
        }
        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let q = line.trim();
        if q.is_empty() {
            continue;
        }
        tracing::info!(query = q, "searching");
        let results = searcher.query(q)?;
        writeln!(stdout.lock(), "{}", serde_json::to_string(&results)?)?;
    }
    Ok(())
}

fn stats(store: &str) -> Result<()> {
    let index = load(store)?;
    let postings: usize = index.terms().map(|(_, list)| list.len()).sum();
    tracing::info!(store, num_docs = index.num_docs(), num_terms = index.num_terms(), postings, "index stats");
    println!("documents: {}\nterms: {}\npostings: {}", index.num_docs(), index.num_terms(), postings);
    Ok(())
}
