//! CLI commands implementation.
//!
//! This module contains the CLI parser and dispatches to command-specific modules.

mod batch;
mod extractors;
mod fingerprints;
mod helpers;
mod init;
mod post;
mod run;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use dailydrop::config::{load_settings_with_options, LoadOptions};

#[derive(Parser)]
#[command(name = "dailydrop")]
#[command(about = "Harvest daily links and promo codes and publish them to target sites")]
#[command(version)]
pub struct Cli {
    /// Data directory or database file (overrides config file).
    /// Can be a directory containing dailydrop.db or a .db file directly.
    #[arg(long, short = 'd', global = true)]
    data: Option<PathBuf>,

    /// Config file path (overrides auto-discovery)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Resolve relative paths from current working directory instead of config file location
    #[arg(long, global = true)]
    cwd: bool,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Check if verbose mode is enabled (for early logging setup).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the data directory and database, importing configured posts
    Init,

    /// Manage post configs
    Post {
        #[command(subcommand)]
        command: PostCommands,
    },

    /// List registered extractors in resolution order
    Extractors,

    /// Run the pipeline for one post
    Run {
        /// Content slug or legacy post id
        post_ref: String,
        /// Target key, or "all" for every mapped target
        #[arg(short, long, default_value = "this")]
        target: String,
        /// Run date (YYYY-MM-DD); defaults to today in the post's timezone
        #[arg(long)]
        date: Option<String>,
        /// Output the result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Run several posts as one batch with bounded concurrency
    Batch {
        /// Content slugs or legacy post ids (or use --all)
        post_refs: Vec<String>,
        /// Run every stored post
        #[arg(short, long)]
        all: bool,
        /// Target key, or "all" for every mapped target
        #[arg(short, long, default_value = "this")]
        target: String,
        /// Run date (YYYY-MM-DD); defaults to today in each post's timezone
        #[arg(long)]
        date: Option<String>,
        /// Number of posts processed concurrently (default from config, max 16)
        #[arg(short, long)]
        workers: Option<usize>,
        /// Block until done without live progress, then print the summary
        #[arg(long)]
        sync: bool,
        /// Log lines shown for each failed post (0 = all)
        #[arg(long, default_value = "10")]
        tail: usize,
        /// Output the final batch snapshot as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the fingerprints already published for a post
    Fingerprints {
        /// Content slug or legacy post id
        post_ref: String,
        /// Target key
        #[arg(short, long, default_value = "this")]
        target: String,
        /// Date (YYYY-MM-DD); defaults to today in the post's timezone
        #[arg(long)]
        date: Option<String>,
        /// Also include this many preceding days
        #[arg(short, long, default_value = "0")]
        lookback: u32,
    },
}

#[derive(Subcommand)]
enum PostCommands {
    /// List stored post configs
    List,
    /// Show one post config as JSON
    Show {
        /// Content slug or legacy post id
        post_ref: String,
    },
    /// Import post configs from the config file or a separate file
    Import {
        /// TOML, JSON, or YAML file with a `posts` list (or a bare list)
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
}

/// Run the CLI.
pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let options = LoadOptions {
        config_path: cli.config,
        use_cwd: cli.cwd,
        data: cli.data,
    };
    let (settings, config) = load_settings_with_options(options).await;

    match cli.command {
        Commands::Init => init::cmd_init(settings, config).await,
        Commands::Post { command } => match command {
            PostCommands::List => post::cmd_post_list(settings, config).await,
            PostCommands::Show { post_ref } => {
                post::cmd_post_show(settings, config, &post_ref).await
            }
            PostCommands::Import { file } => {
                post::cmd_post_import(settings, config, file.as_deref()).await
            }
        },
        Commands::Extractors => extractors::cmd_extractors(settings, config).await,
        Commands::Run {
            post_ref,
            target,
            date,
            json,
        } => run::cmd_run(settings, config, &post_ref, &target, date.as_deref(), json).await,
        Commands::Batch {
            post_refs,
            all,
            target,
            date,
            workers,
            sync,
            tail,
            json,
        } => {
            batch::cmd_batch(
                settings,
                config,
                batch::BatchArgs {
                    post_refs,
                    all,
                    target,
                    date,
                    workers,
                    sync,
                    tail,
                    json,
                },
            )
            .await
        }
        Commands::Fingerprints {
            post_ref,
            target,
            date,
            lookback,
        } => {
            fingerprints::cmd_fingerprints(
                settings,
                config,
                &post_ref,
                &target,
                date.as_deref(),
                lookback,
            )
            .await
        }
    }
}
