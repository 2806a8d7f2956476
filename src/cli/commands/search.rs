use anyhow::{Context, Result};
use clap::Args;
use std::time::Instant;

use crate::cli::output::get_formatter;
use crate::context::AppContext;
use crate::models::{Config, OutputFormat, SearchQuery};
use crate::services::RagRetriever;

#[derive(Debug, Args)]
pub struct SearchArgs {
    #[arg(required = true, help = "Search query text")]
    pub query: String,

    #[arg(long, short = 'n', help = "Maximum number of results to return")]
    pub limit: Option<u32>,

    #[arg(long, help = "Minimum similarity score threshold (0.0-1.0)")]
    pub min_score: Option<f32>,

    #[arg(long, short = 'c', help = "Collection to search (default: retrieval.collection)")]
    pub collection: Option<String>,
}

pub async fn handle_search(args: SearchArgs, format: OutputFormat, verbose: bool) -> Result<()> {
    let query = args.query.trim();
    if query.is_empty() {
        anyhow::bail!("search query cannot be empty");
    }

    let config = Config::load()?;
    let formatter = get_formatter(format);
    let start_time = Instant::now();

    let limit = args.limit.unwrap_or(config.search.default_limit);
    if limit == 0 {
        anyhow::bail!("limit must be at least 1");
    }

    let min_score = args.min_score.or(config.search.default_min_score).unwrap_or(0.0);
    if !(0.0..=1.0).contains(&min_score) {
        anyhow::bail!("min_score must be between 0.0 and 1.0");
    }

    let collection = args
        .collection
        .unwrap_or_else(|| config.retrieval.collection.clone());

    if verbose {
        eprintln!("Query: \"{query}\"");
        eprintln!("  Collection: {collection}");
        eprintln!("  Limit: {limit}");
        eprintln!("  Min score: {min_score:.3}");
    }

    let ctx = AppContext::from_config(config).await?;
    let retriever = RagRetriever::from_context(&ctx);

    let search_query = SearchQuery::new(query, collection)
        .with_limit(u64::from(limit))
        .with_min_score(min_score);
    let results = retriever
        .search(&search_query)
        .await
        .context("search failed")?;

    if verbose {
        eprintln!("Total: {}ms", start_time.elapsed().as_millis());
        eprintln!();
    }

    print!("{}", formatter.format_search_results(&results));

    Ok(())
}
