use std::path::PathBuf;

use apex_knowledge::Result;
use apex_knowledge::commands::{
    ask, ingest_document, search_knowledge, show_config, show_status, wipe_namespace,
};
use apex_knowledge::vectordb::Namespace;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "apex-knowledge")]
#[command(about = "Namespace-organized semantic knowledge store for financial-advisor chat")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the active configuration
    Config,
    /// Ingest a document file into the knowledge store
    Ingest {
        /// Path to a text document
        file: PathBuf,
        /// Document title (defaults to the file name)
        #[arg(long)]
        title: Option<String>,
        /// Target namespace
        #[arg(long, default_value = "general")]
        namespace: Namespace,
        /// Source identifier (URL, file path, ...)
        #[arg(long)]
        source: Option<String>,
    },
    /// Search stored knowledge
    Search {
        /// Query text
        query: String,
        /// Restrict the search to one namespace (searches all if omitted)
        #[arg(long)]
        namespace: Option<Namespace>,
        /// Number of results to return
        #[arg(long, default_value_t = 5)]
        top_k: usize,
    },
    /// Answer a question using retrieved knowledge and the completion provider
    Ask {
        /// The question to answer
        question: String,
        /// Restrict retrieval to one namespace
        #[arg(long)]
        namespace: Option<Namespace>,
        /// Number of knowledge passages to inject
        #[arg(long, default_value_t = 5)]
        top_k: usize,
    },
    /// Show per-namespace chunk counts
    Status,
    /// Remove every chunk in a namespace
    Wipe {
        /// Namespace to wipe
        namespace: Namespace,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Config => {
            show_config()?;
        }
        Commands::Ingest {
            file,
            title,
            namespace,
            source,
        } => {
            ingest_document(&file, title, namespace, source).await?;
        }
        Commands::Search {
            query,
            namespace,
            top_k,
        } => {
            search_knowledge(&query, namespace, top_k).await?;
        }
        Commands::Ask {
            question,
            namespace,
            top_k,
        } => {
            ask(&question, namespace, top_k).await?;
        }
        Commands::Status => {
            show_status().await?;
        }
        Commands::Wipe { namespace } => {
            wipe_namespace(namespace).await?;
        }
    }

    Ok(())
}
