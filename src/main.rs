use chainz::config::CliArgs;
use chainz::utils::{logger, validation::Validate};
use chainz::{ChainError, JobConfig, JobEngine};
use clap::Parser;
use std::process;

fn main() -> anyhow::Result<()> {
    let args = CliArgs::parse();

    if args.log_json {
        logger::init_json_logger(args.verbose);
    } else {
        logger::init_cli_logger(args.verbose);
    }

    tracing::info!("Starting chainz");
    tracing::debug!("CLI args: {:?}", args);

    let config = match JobConfig::from_file(&args.config).and_then(|config| {
        config.validate()?;
        Ok(config)
    }) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Configuration validation failed: {}", e);
            eprintln!("Invalid job file {}: {}", args.config.display(), e);
            process::exit(1);
        }
    };

    let engine = JobEngine::new(config).with_stage_counts(args.verbose);

    if args.dry_run {
        println!("Job '{}' plan:", engine.config().job.name);
        for (index, stage) in engine.plan().iter().enumerate() {
            println!("  {}. {}", index + 1, stage);
        }
        return Ok(());
    }

    match engine.run() {
        Ok(report) => {
            println!("Job completed: {} records written, {} skipped", report.written, report.skipped);
            println!("Output saved to: {}", report.output_path);
            Ok(())
        }
        Err(e) => {
            tracing::error!("Job failed: {}", e);
            eprintln!("Job failed: {}", e);
            let code = match e {
                ChainError::Config { .. } | ChainError::MissingConfig { .. } | ChainError::InvalidConfigValue { .. } => 1,
                _ => 2,
            };
            process::exit(code);
        }
    }
}
