use clap::{Args as ClapArgs, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "recfetch")]
#[command(about = "Bulk export and download of call recordings", long_about = None)]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Use this config file instead of the default location
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<CliCommand>,
}

#[derive(Subcommand, Debug)]
pub enum CliCommand {
    /// Search conversations and download their recordings
    Run(RunCliArgs),
    /// Inspect the configuration
    Config(ConfigCliArgs),
    /// Print version information
    Version,
}

#[derive(ClapArgs, Debug, Default)]
pub struct RunCliArgs {
    /// Start of the interval (yyyy-mm-ddThh:mm:ss-zz:zz)
    #[arg(long)]
    pub start: Option<String>,
    /// End of the interval (yyyy-mm-ddThh:mm:ss-zz:zz)
    #[arg(long)]
    pub end: Option<String>,
    /// Sort order (desc or asc)
    #[arg(long)]
    pub order: Option<String>,
    /// Sort field (conversationStart, segmentStart, segmentEnd)
    #[arg(long)]
    pub order_by: Option<String>,
    /// Only conversations in this division
    #[arg(long)]
    pub division: Option<String>,
    /// Only conversations with this originating direction (inbound, outbound)
    #[arg(long)]
    pub direction: Option<String>,
    /// Directory that receives the downloaded recordings
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,
    /// Prompt for every search option, not only the missing interval
    #[arg(short, long)]
    pub interactive: bool,
}

#[derive(ClapArgs, Debug)]
pub struct ConfigCliArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Print the effective configuration (secrets masked)
    Show,
    /// Print the path of the config file
    Path,
}
