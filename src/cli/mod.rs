use crate::client::HttpRecordingService;
use crate::config::Config;
use crate::logging;
use crate::pipeline::Pipeline;
use crate::query::{prompt, ConversationQuery, QueryParams};
use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

pub mod args;

pub use args::{Cli, CliCommand, ConfigCliArgs, ConfigCommand, RunCliArgs};

pub async fn handle_run_command(
    args: RunCliArgs,
    verbose: bool,
    config_path: Option<&Path>,
) -> Result<()> {
    let config = Config::load(config_path)?;
    let log_guard = logging::init(verbose, &config.logging.log_dir)?;

    info!(log_file = %log_guard.path().display(), "Starting recording download");

    let mut settings = config.pipeline.to_settings();
    if let Some(dir) = args.output_dir.clone() {
        settings.output_dir = dir;
    }

    let interactive = args.interactive;
    let params = prompt::complete_params(query_params(args), interactive)?;
    let query = ConversationQuery::new(params);
    println!("Query:");
    println!("{}", serde_json::to_string_pretty(&query)?);

    let credentials = config.service.credentials()?;
    let service = HttpRecordingService::connect(&credentials)
        .await
        .context("Error authorizing client credentials")?;

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupt received, cancelling run");
                cancel.cancel();
            }
        }
    });

    let pipeline = Pipeline::new(Arc::new(service), settings).with_cancellation(cancel);
    let summary = pipeline.run(&query).await?;

    info!("{}", summary);
    Ok(())
}

pub fn handle_config_command(args: ConfigCliArgs, config_path: Option<&Path>) -> Result<()> {
    match args.command {
        ConfigCommand::Path => {
            let path = match config_path {
                Some(path) => path.to_path_buf(),
                None => Config::config_path()?,
            };
            println!("{}", path.display());
        }
        ConfigCommand::Show => {
            let mut config = Config::load(config_path)?;
            if !config.service.client_secret.is_empty() {
                config.service.client_secret = "********".to_string();
            }
            println!("{}", toml::to_string_pretty(&config)?);
        }
    }
    Ok(())
}

fn query_params(args: RunCliArgs) -> QueryParams {
    QueryParams {
        start: args.start.unwrap_or_default(),
        end: args.end.unwrap_or_default(),
        order: args.order,
        order_by: args.order_by,
        division_id: args.division,
        originating_direction: args.direction,
    }
}
