use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tutor_scout::config;
use tutor_scout::model::Tutorial;
use tutor_scout::scraper::TutorialScraper;
use tutor_scout::store::{self, TutorialStore};
use tutor_scout::youtube::YouTubeClient;

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Scrape one category, or sweep every configured category when no
    /// scope is given
    Scrape {
        #[arg(long)]
        language: Option<String>,
        #[arg(long)]
        subject: Option<String>,
    },
    /// List stored tutorials, optionally scoped to one category
    List {
        #[arg(long)]
        language: Option<String>,
        #[arg(long)]
        subject: Option<String>,
    },
    /// Search stored tutorials by title or description
    Search { query: String },
    /// Show per-category counts
    Summary,
    /// Mark a tutorial as watched
    Watched { video_id: String },
    /// Mark a tutorial as favorite
    Favorite {
        video_id: String,
        #[arg(long)]
        unset: bool,
    },
    /// Delete a tutorial
    Delete { video_id: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let mut cfg = config::load(Some(&args.config))?;
    apply_env_overrides(&mut cfg);

    let store = store::connect(&cfg.storage).await?;

    match args.command {
        Command::Scrape { language, subject } => {
            let client = YouTubeClient::new(&cfg.youtube.api_key)?;
            let scraper = TutorialScraper::new(Arc::new(client), &cfg.app)?;

            let found = if language.is_none() && subject.is_none() {
                let mut progress = |current: usize, total: usize, message: &str| {
                    info!("[{current}/{total}] {message}");
                };
                scraper
                    .scrape_all_categories(&cfg.app.languages, &cfg.app.subjects, Some(&mut progress))
                    .await
            } else {
                scraper
                    .search_tutorials(
                        language.as_deref(),
                        subject.as_deref(),
                        scraper.default_max_results(),
                    )
                    .await
            };

            let (mut added, mut duplicates) = (0usize, 0usize);
            for tutorial in &found {
                match store.add_tutorial(tutorial).await {
                    Ok(true) => added += 1,
                    Ok(false) => duplicates += 1,
                    Err(err) => {
                        warn!(?err, video_id = %tutorial.video_id, "failed to store tutorial")
                    }
                }
            }
            info!(found = found.len(), added, duplicates, "scrape complete");
        }
        Command::List { language, subject } => {
            let tutorials = match (language, subject) {
                (Some(language), _) => store.tutorials_by_language(&language).await,
                (None, Some(subject)) => store.tutorials_by_subject(&subject).await,
                (None, None) => store.all_tutorials().await,
            };
            print_tutorials(&tutorials);
        }
        Command::Search { query } => print_tutorials(&store.search_tutorials(&query).await),
        Command::Summary => {
            let summary = store.categories_summary().await;
            println!("total: {}", summary.total);
            println!("by language:");
            for (language, count) in &summary.by_language {
                println!("  {language}: {count}");
            }
            println!("by subject:");
            for (subject, count) in &summary.by_subject {
                println!("  {subject}: {count}");
            }
        }
        Command::Watched { video_id } => store.mark_watched(&video_id).await,
        Command::Favorite { video_id, unset } => store.mark_favorite(&video_id, !unset).await,
        Command::Delete { video_id } => store.delete_tutorial(&video_id).await,
    }

    Ok(())
}

/// Credentials may come from the environment instead of the config file.
fn apply_env_overrides(cfg: &mut config::Config) {
    if cfg.youtube.api_key.trim().is_empty() {
        if let Ok(key) = std::env::var("YOUTUBE_API_KEY") {
            cfg.youtube.api_key = key;
        }
    }
    if let Ok(url) = std::env::var("DATABASE_URL") {
        cfg.storage.sqlite.database_url = url;
    }
    if let Some(doc) = cfg.storage.docstore.as_mut() {
        if doc.key.trim().is_empty() {
            if let Ok(key) = std::env::var("DOCSTORE_KEY") {
                doc.key = key;
            }
        }
    }
}

fn print_tutorials(tutorials: &[Tutorial]) {
    for t in tutorials {
        println!(
            "{}  [{:>4} min, {:>9} views]  {}",
            t.video_id,
            t.duration_seconds / 60,
            t.view_count,
            t.title
        );
    }
    println!("{} tutorial(s)", tutorials.len());
}
