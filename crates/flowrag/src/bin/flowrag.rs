//! flowrag command line
//!
//! Run with: cargo run -p flowrag --features cli -- index ./docs

use clap::{Parser, Subcommand};
use console::style;
use flowrag::{IndexingPipeline, Providers, RagConfig, RagPipeline};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "flowrag")]
#[command(version, about = "Index documents and answer questions over them", long_about = None)]
struct Cli {
    /// Configuration file path (TOML)
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Index every file under a directory
    Index {
        /// Directory to walk recursively
        root: PathBuf,

        /// Keep the existing index and upsert into it
        #[arg(long)]
        append: bool,
    },

    /// Answer one or more questions
    Ask {
        /// Questions, answered concurrently
        #[arg(required = true)]
        questions: Vec<String>,

        /// Print the retrieved context documents
        #[arg(long)]
        show_context: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "flowrag=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let mut config = match &cli.config {
        Some(path) => RagConfig::from_file(path)?,
        None => RagConfig::default(),
    };

    match cli.command {
        Commands::Index { root, append } => {
            if append {
                config.vector_db.recreate_index = false;
            }
            let providers = Providers::from_config(&config)?;
            let report = IndexingPipeline::from_providers(config, &providers)?
                .run(&root)
                .await?;

            println!(
                "{} {} documents written from {} of {} files",
                style("✓").green().bold(),
                report.documents_written,
                report.files_processed(),
                report.files_total
            );
            for skipped in &report.files_skipped {
                println!("  {} {} ({})", style("skipped").yellow(), skipped.path, skipped.reason);
            }
        }
        Commands::Ask {
            questions,
            show_context,
        } => {
            if config.vector_db.location == flowrag::config::IN_MEMORY_LOCATION {
                tracing::warn!("Store location is :memory:, answers will have no indexed context");
            }
            let providers = Providers::from_config(&config)?;
            let rag = RagPipeline::from_providers(config, &providers)?;
            let answers = rag.ask_many(questions.as_slice()).await?;

            for (question, answer) in questions.iter().zip(answers) {
                println!("{} {}", style("Q:").cyan().bold(), question);
                if show_context {
                    for doc in &answer.documents {
                        let source = doc
                            .meta(flowrag::types::document::META_FILE_PATH)
                            .map(|v| v.to_string())
                            .unwrap_or_default();
                        println!(
                            "  {} {:.3} {}",
                            style("ctx").dim(),
                            doc.score.unwrap_or_default(),
                            source
                        );
                    }
                }
                println!("{} {}\n", style("A:").green().bold(), answer.reply.trim());
            }
        }
    }

    Ok(())
}
