use clap::Parser;
use std::path::PathBuf;

#[derive(Debug, Clone, Parser)]
#[command(name = "chainz")]
#[command(about = "Run a record pipeline described in a TOML job file")]
pub struct CliArgs {
    #[arg(short, long, help = "Path to the job file")]
    pub config: PathBuf,

    #[arg(short, long, help = "Enable verbose output")]
    pub verbose: bool,

    #[arg(long, help = "Validate the job and print its plan without running it")]
    pub dry_run: bool,

    #[arg(long, help = "Emit logs as JSON lines")]
    pub log_json: bool,
}
