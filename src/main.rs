use anyhow::Result;
use clap::Parser;
use recfetch::cli::{handle_config_command, handle_run_command, Cli, CliCommand, RunCliArgs};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config_path = cli.config.as_deref();

    match cli.command {
        Some(CliCommand::Version) => {
            println!("recfetch {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        Some(CliCommand::Config(args)) => handle_config_command(args, config_path),
        Some(CliCommand::Run(args)) => handle_run_command(args, cli.verbose, config_path).await,
        None => handle_run_command(RunCliArgs::default(), cli.verbose, config_path).await,
    }
}
