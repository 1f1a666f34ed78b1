use anyhow::Result;
use clap::{Parser, Subcommand};
use kaiwa_application::AppContext;
use kaiwa_infrastructure::KaiwaPaths;
use std::path::PathBuf;

mod commands;
mod logging;

#[derive(Parser)]
#[command(name = "kaiwa")]
#[command(about = "kaiwa - chat with Gemini from the terminal, with local history", long_about = None)]
struct Cli {
    /// Directory holding config.toml, secret.json and the history
    #[arg(long, global = true, value_name = "DIR")]
    config_dir: Option<PathBuf>,

    /// Also log to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List sessions, most recent first
    Sessions,
    /// Create an empty session
    New {
        title: String,
    },
    /// Print the messages of a session
    Show {
        session: String,
    },
    /// Send a message and print the reply
    Send {
        /// Continue this session instead of starting a new one
        #[arg(long)]
        session: Option<String>,
        /// Attach an image file
        #[arg(long, value_name = "PATH")]
        image: Option<PathBuf>,
        #[arg(required = true, num_args = 1..)]
        text: Vec<String>,
    },
    /// Delete a session and its messages
    Delete {
        session: String,
    },
    /// Delete every session
    Clear {
        /// Skip the confirmation guard
        #[arg(long)]
        yes: bool,
    },
    /// List the models available to the configured keys
    Models,
    /// List prompt templates, optionally filtered
    Prompts {
        query: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let paths = KaiwaPaths::new(cli.config_dir.as_deref());
    let _log_guard = logging::init(&paths.logs_dir()?, cli.verbose)?;
    tracing::debug!(version = env!("CARGO_PKG_VERSION"), "kaiwa starting");

    // Prompts need no credentials.
    if let Commands::Prompts { query } = &cli.command {
        let config = kaiwa_infrastructure::ConfigService::new(&paths)?.get_config()?;
        commands::catalog::prompts(&config, query.as_deref());
        return Ok(());
    }

    let app = AppContext::bootstrap(cli.config_dir.as_deref()).await?;
    match cli.command {
        Commands::Sessions => commands::sessions::list(&app).await?,
        Commands::New { title } => commands::sessions::create(&app, &title).await?,
        Commands::Show { session } => commands::sessions::show(&app, &session).await?,
        Commands::Send {
            session,
            image,
            text,
        } => commands::send::run(&app, session, image, text.join(" ")).await?,
        Commands::Delete { session } => commands::sessions::delete(&app, &session).await?,
        Commands::Clear { yes } => commands::sessions::clear(&app, yes).await?,
        Commands::Models => commands::catalog::models(&app).await?,
        Commands::Prompts { .. } => {}
    }

    Ok(())
}
