use anyhow::{bail, Result};
use axum::Router;
use clap::Parser;
use search_core::{StandardTokenizer, TokenizerConfig};
use server::{build_app, start_searcher, IndexSource};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::runtime::Builder;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
struct Args {
    /// Build the index from this corpus file at startup
    #[arg(long, conflicts_with = "store")]
    corpus: Option<PathBuf>,
    /// Load the index from this store directory at startup
    #[arg(long)]
    store: Option<PathBuf>,
    /// Directory with the static front page
    #[arg(long)]
    www: Option<PathBuf>,
    /// Give up on startup if the index is not ready within this many seconds
    #[arg(long, default_value_t = 120)]
    load_timeout_secs: u64,
    /// Apply English stemming; must match how the store was built
    #[arg(long, default_value_t = false)]
    stem: bool,
    /// Keep stop words; must match how the store was built
    #[arg(long, default_value_t = false)]
    keep_stopwords: bool,
    /// Host to bind
    #[arg(long, default_value = "0.0.0.0")]
    host: String,
    /// Port to bind
    #[arg(long, default_value_t = 8081)]
    port: u16,
}

fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let args = Args::parse();

    let source = match (args.corpus, args.store) {
        (Some(corpus), None) => IndexSource::Corpus(corpus),
        (None, Some(store)) => IndexSource::Store(store),
        _ => bail!("exactly one of --corpus or --store is required"),
    };
    let tokenizer = Arc::new(StandardTokenizer::new(TokenizerConfig { stem: args.stem, remove_stopwords: !args.keep_stopwords, ..Default::default() }));
    let rt = Builder::new_multi_thread().enable_all().build()?;
    let (rt, searcher) = start_searcher(rt, source, tokenizer, Duration::from_secs(args.load_timeout_secs))?;
    let app: Router = build_app(searcher, args.www);
    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
    rt.block_on(serve(addr, app))
}

async fn serve(addr: SocketAddr, app: Router) -> Result<()> {
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "server listening");
    axum::serve(listener, app).await?;
    Ok(())
}
