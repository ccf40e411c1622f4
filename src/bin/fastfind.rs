//! Command-line driver for the `fastfind` engine: index a set of roots,
//! search them, or print index statistics. Thin glue only — all logic lives
//! in the library crate; this binary wires `clap` argument parsing onto
//! `SearchEngine` the way `nefaxer`'s own `arg_parser::Cli` wires onto its
//! indexer, and uses `anyhow` to collapse error handling at the outermost
//! layer since a CLI invocation either succeeds or reports and exits.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use fastfind::{EngineConfig, SearchEngine, SearchQuery};

/// Cross-platform filesystem search engine.
#[derive(Parser)]
#[command(name = "fastfind")]
#[command(about = "Index directories and search them by name, path, or attributes.")]
struct Cli {
    /// Path to a fastfind.toml config file. Missing file falls back to defaults.
    #[arg(long, default_value = "fastfind.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Walk the configured roots and build the in-memory index.
    Index {
        /// Directories to index. Overrides `indexing.roots` from the config file.
        #[arg(value_name = "DIR", num_args = 1..)]
        roots: Vec<PathBuf>,

        /// Persist the index to disk after indexing completes.
        #[arg(long)]
        save: bool,
    },
    /// Index the configured roots, then run one search against the result.
    Search {
        /// Text to match against file/directory names (or full paths with --full-path).
        query: String,

        /// Directories to index before searching. Overrides the config file.
        #[arg(long, value_name = "DIR", num_args = 1..)]
        roots: Vec<PathBuf>,

        /// Match the text against the full path instead of just the name.
        #[arg(long)]
        full_path: bool,

        /// Treat `query` as a regular expression.
        #[arg(long)]
        regex: bool,

        /// Match case-sensitively. Default: case-insensitive.
        #[arg(long)]
        case_sensitive: bool,

        /// Restrict to this file extension (without the leading dot).
        #[arg(long)]
        ext: Option<String>,

        /// Maximum number of results to print.
        #[arg(long, default_value = "100")]
        limit: usize,
    },
    /// Load a previously saved index and print aggregate statistics.
    Stats,
}

fn main() -> Result<()> {
    fastfind::logging::init();
    let cli = Cli::parse();
    let mut config = EngineConfig::load_overlay(&cli.config).context("loading fastfind.toml")?;

    match cli.command {
        Command::Index { roots, save } => {
            if !roots.is_empty() {
                config.indexing.roots = roots;
            }
            let db_path = config.persistence.path.clone();
            let engine = SearchEngine::new(config);
            let count = engine.start_indexing().context("indexing failed")?;
            println!("indexed {count} entries");
            if save {
                engine.save().context("saving index")?;
                println!("saved index to {}", db_path.display());
            }
        }
        Command::Search {
            query,
            roots,
            full_path,
            regex,
            case_sensitive,
            ext,
            limit,
        } => {
            if !roots.is_empty() {
                config.indexing.roots = roots;
            }
            let engine = SearchEngine::new(config);
            engine.start_indexing().context("indexing failed")?;

            let search = SearchQuery {
                text: Some(query),
                name_only: !full_path,
                use_regex: regex,
                case_sensitive,
                extension_filter: ext,
                max_results: Some(limit),
                ..Default::default()
            };
            let result = engine.search(search).context("search failed")?;
            for entry in &result.files {
                let path = engine.pool().get_path(entry.full_path_id);
                println!("{path}");
            }
            eprintln!(
                "{} matches ({} shown{}) in {:?}",
                result.total,
                result.returned,
                if result.has_more { ", more available" } else { "" },
                result.elapsed
            );
        }
        Command::Stats => {
            let engine = SearchEngine::new(config);
            engine.load().context("loading saved index")?;
            let stats = engine.statistics();
            println!("files:       {}", stats.total_files);
            println!("directories: {}", stats.total_dirs);
            println!("total bytes: {}", stats.total_bytes);
            let mut exts: Vec<(&String, &u64)> = stats.extensions.iter().collect();
            exts.sort_by(|a, b| b.1.cmp(a.1));
            for (ext, count) in exts.into_iter().take(10) {
                println!("  .{ext}: {count}");
            }
        }
    }

    Ok(())
}
