mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "arbiter-cli")]
#[command(about = "Arbiter CLI - Manage languages, seed problems and try submissions", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Add a language to config/languages.json
    AddLang {
        /// Logical language id (e.g., cpp, python)
        #[arg(short, long)]
        name: String,

        /// Name used by problem starter code (e.g., "C++", "Python")
        #[arg(short, long)]
        display_name: String,

        /// Execution backend runtime id (e.g., 54 for GCC 9 on Judge0 CE)
        #[arg(short, long)]
        runtime_id: u32,
    },

    /// Remove a language from config/languages.json
    RemoveLang {
        /// Language id to remove
        #[arg(short, long)]
        name: String,

        /// Skip confirmation prompt
        #[arg(short = 'y', long)]
        yes: bool,
    },

    /// List all configured languages
    ListLangs,

    /// Load a problem JSON document into the Redis problem store
    LoadProblem {
        /// Path to a problem file (one object or an array of objects)
        #[arg(short, long)]
        file: String,

        /// Redis URL (defaults to REDIS_URL or redis://127.0.0.1:6379)
        #[arg(long)]
        redis_url: Option<String>,
    },

    /// Run code against the visible test cases
    Run {
        #[command(flatten)]
        target: commands::Target,
    },

    /// Submit code against every test case
    Submit {
        #[command(flatten)]
        target: commands::Target,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::AddLang {
            name,
            display_name,
            runtime_id,
        } => {
            commands::add_language(&name, &display_name, runtime_id).await?;
        }
        Commands::RemoveLang { name, yes } => {
            commands::remove_language(&name, yes).await?;
        }
        Commands::ListLangs => {
            commands::list_languages().await?;
        }
        Commands::LoadProblem { file, redis_url } => {
            commands::load_problem(&file, redis_url.as_deref()).await?;
        }
        Commands::Run { target } => {
            commands::run_code(&target).await?;
        }
        Commands::Submit { target } => {
            commands::submit_code(&target).await?;
        }
    }

    Ok(())
}
