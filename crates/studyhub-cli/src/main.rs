//! StudyHub CLI - sign in and inspect the local StudyHub session.

mod commands;
mod output;

use clap::{Parser, Subcommand};
use studyhub_config::{init_logging, Config, Paths};
use tracing::debug;

/// StudyHub CLI - Manage your StudyHub session from the terminal.
#[derive(Parser)]
#[command(name = "studyhub")]
#[command(about = "StudyHub CLI for account and session management")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format (text or json)
    #[arg(short, long, default_value = "text", global = true)]
    format: output::OutputFormat,

    /// Log level (trace, debug, info, warn, error); defaults to the configured level
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Keep credentials in memory instead of the system keychain
    #[arg(long, global = true)]
    ephemeral: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Login with email and password
    Login,

    /// Create an account with email and password
    Signup {
        /// Display name stored with the account
        #[arg(long)]
        name: Option<String>,
    },

    /// Logout and clear session
    Logout,

    /// Check authentication status
    Status,

    /// Print a valid access token
    Token,

    /// Print auth state changes until interrupted
    Watch {
        /// Seconds between remote revocation checks
        #[arg(long, default_value = "60")]
        revocation_interval: u64,
    },
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let paths = Paths::new()?;
    paths.ensure_dirs()?;
    let config = Config::load(&paths)?;

    let level = cli.log_level.as_deref().unwrap_or(config.log_level.as_str());
    init_logging(level, Some(&paths.log_file()))?;
    debug!(base_dir = %paths.base_dir().display(), ephemeral = cli.ephemeral, "Starting CLI");

    let ctx = commands::start_runtime(&config, cli.ephemeral).await?;

    let result = match cli.command {
        Commands::Login => commands::login(&ctx, &cli.format).await,
        Commands::Signup { name } => commands::signup(&ctx, name, &cli.format).await,
        Commands::Logout => commands::logout(&ctx, &cli.format).await,
        Commands::Status => commands::status(&ctx, &cli.format).await,
        Commands::Token => commands::token(&ctx, &cli.format).await,
        Commands::Watch {
            revocation_interval,
        } => commands::watch(&ctx, revocation_interval, &cli.format).await,
    };

    ctx.runtime.shutdown().await;
    result
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}
