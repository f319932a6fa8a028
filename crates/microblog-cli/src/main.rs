//! Microblog admin CLI - index maintenance and ad-hoc search.
//!
//! Settings come from the environment (`DATABASE_URL`, `SEARCH_INDEX_PATH`,
//! `POSTS_PER_PAGE`) and can be overridden with flags. Log filtering follows
//! `RUST_LOG` when set.

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use microblog_core::config::SearchConfig;
use microblog_core::search::Searchable;
use microblog_core::{BlogConfig, Microblog, Post};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser, Debug)]
#[command(name = "microblog")]
#[command(about = "Admin tools for the microblog backend")]
struct Args {
    /// Primary SQLite database (overrides DATABASE_URL)
    #[arg(long)]
    database: Option<PathBuf>,

    /// FTS5 search index database (overrides SEARCH_INDEX_PATH)
    #[arg(long)]
    index: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Rebuild the post index from the database
    Reindex,

    /// Search posts
    Search {
        query: String,

        #[arg(long, default_value = "1")]
        page: u32,

        /// Results per page (defaults to POSTS_PER_PAGE)
        #[arg(long)]
        per_page: Option<u32>,
    },

    /// Show index statistics
    Stats,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Set up logging; RUST_LOG wins over --debug
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if args.debug { "debug" } else { "info" }));
    FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    let mut config = BlogConfig::from_env()?;
    if let Some(database) = args.database {
        config.database_path = database;
    }
    if let Some(index) = args.index {
        config.search_index_path = Some(index);
    }

    info!("Database: {}", config.database_path.display());
    let blog = Microblog::open(&config)?;

    match args.command {
        Command::Reindex => {
            let Some(fts) = blog.fts_index() else {
                bail!("no search index configured; set SEARCH_INDEX_PATH or pass --index");
            };
            let count = blog.reindex_posts()?;
            fts.optimize()?;
            println!("Reindexed {} posts", count);
        }
        Command::Search {
            query,
            page,
            per_page,
        } => {
            let per_page = per_page
                .unwrap_or(blog.posts_per_page())
                .min(SearchConfig::MAX_PER_PAGE);
            let results = blog.search_posts(&query, page, per_page)?;

            for post in &results.items {
                println!("{}\t{}", post.id.unwrap_or_default(), post.body);
            }
            println!(
                "page {}/{} ({} matches)",
                results.page,
                results.total_pages(),
                results.total
            );
        }
        Command::Stats => {
            let Some(fts) = blog.fts_index() else {
                bail!("no search index configured; set SEARCH_INDEX_PATH or pass --index");
            };
            let stats = fts.get_stats()?;
            println!("table:     {}", stats.table_name);
            println!("tokenizer: {}", stats.tokenizer);
            println!("documents: {}", stats.row_count);
            println!(
                "{}:      {} indexed / {} stored",
                Post::namespace(),
                blog.index().count(Post::namespace()),
                blog.database().count::<Post>()?
            );
        }
    }

    Ok(())
}
