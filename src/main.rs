use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use freshet::app::AppContext;
use freshet::cli::{commands, AuthorAction, Cli, Commands, DomainAction};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let ctx = AppContext::new(cli.config, cli.db)?;

    match cli.command {
        Commands::Run { count, feed, page } => {
            commands::run(&ctx, count, Commands::mode_override(feed, page)).await?;
        }
        Commands::Status => {
            commands::status(&ctx)?;
        }
        Commands::History { limit } => {
            commands::history(&ctx, limit)?;
        }
        Commands::Schedule { now } => {
            commands::schedule(&ctx, now).await?;
        }
        Commands::Domain { action } => match action {
            DomainAction::Add { name, hostname } => commands::add_domain(&ctx, &name, &hostname)?,
            DomainAction::List => commands::list_domains(&ctx)?,
        },
        Commands::Author { action } => match action {
            AuthorAction::Add { username } => commands::add_author(&ctx, &username)?,
        },
    }

    Ok(())
}
