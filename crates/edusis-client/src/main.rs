//! edusis CLI entry point.

use std::process::ExitCode;

use clap::Parser;
use edusis_core::{TracingConfig, init_tracing};

use edusis_client::cli::{CacheAction, Cli, Command, ConfigAction};
use edusis_client::commands::events::Query;
use edusis_client::commands;
use edusis_client::config::ClientConfig;
use edusis_client::error::ClientResult;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let tracing = if cli.debug {
        TracingConfig::debug()
    } else {
        TracingConfig::default()
    };
    if let Err(e) = init_tracing(tracing) {
        eprintln!("warning: {}", e);
    }

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> ClientResult<()> {
    let config_path = cli.config.clone().unwrap_or_else(ClientConfig::default_path);
    let config = match cli.config {
        Some(ref path) => ClientConfig::load_from(path)?,
        None => ClientConfig::load()?,
    };

    match cli.command {
        None => commands::events::show(&config, Query::Upcoming { days: 7 }, cli.json, cli.refresh).await,
        Some(Command::Upcoming { days }) => {
            commands::events::show(&config, Query::Upcoming { days }, cli.json, cli.refresh).await
        }
        Some(Command::Month { year, month }) => {
            commands::events::show(&config, Query::month(year, month), cli.json, cli.refresh).await
        }
        Some(Command::Range { from, to }) => {
            commands::events::show(&config, Query::Range { from, to }, cli.json, cli.refresh).await
        }
        Some(Command::AcademicYear) => {
            commands::events::show(&config, Query::AcademicYear, cli.json, cli.refresh).await
        }
        Some(Command::Status) => commands::events::status(&config).await,
        Some(Command::Cache { action }) => match action {
            CacheAction::Clear => commands::cache::clear(&config).await,
        },
        #[cfg(feature = "google")]
        Some(Command::Google { action }) => match action {
            edusis_client::cli::GoogleAction::SignIn { days } => {
                commands::google::sign_in(&config, days, cli.json).await
            }
        },
        Some(Command::Config { action }) => match action {
            ConfigAction::Dump => commands::config::dump(&config, &config_path),
            ConfigAction::Validate => commands::config::validate(&config),
            ConfigAction::Path => commands::config::path(&config, &config_path),
        },
    }
}
