use stackup::cli::commands::CliArgs;
use stackup::cli::output::OutputFormatter;
use stackup::exec::SystemRunner;
use stackup::fs::RealFileSystem;
use stackup::orchestrator::{Orchestrator, RunOptions};
use stackup::util::logging::{init_logging, parse_level, LoggingConfig};
use stackup::VERSION;

use clap::Parser;
use std::env;
use tracing::{debug, error, warn, Level};

#[tokio::main]
async fn main() {
    let args = CliArgs::parse();
    init_logging_from_args(&args);

    debug!("stackup v{} starting", VERSION);
    debug!("Arguments: {:?}", args);

    let fs = RealFileSystem::new();
    let runner = SystemRunner::new();
    let orchestrator = Orchestrator::new(&fs, &runner);
    let opts = RunOptions {
        input: args.input.clone(),
        stack_root: args.stack_root.clone(),
        env_file: args.env_file.clone(),
        skip_extractor: args.skip_extractor,
    };

    // Dropping the run future on interrupt unwinds the supervisor, which
    // kills every recorded service process.
    let exit_code = tokio::select! {
        result = orchestrator.run(&opts) => match result {
            Ok(report) => {
                let formatter = OutputFormatter::new(args.format.into());
                match formatter.format(&report) {
                    Ok(rendered) => println!("{}", rendered),
                    Err(e) => error!("failed to render run report: {:#}", e),
                }
                report.exit_code()
            }
            Err(e) => {
                error!("run failed: {:#}", e);
                1
            }
        },
        _ = tokio::signal::ctrl_c() => {
            warn!("interrupt received; terminating supervised services");
            130
        }
    };

    std::process::exit(exit_code);
}

fn init_logging_from_args(args: &CliArgs) {
    let level = if let Some(level_str) = &args.log_level {
        parse_level(level_str)
    } else if args.verbose {
        Level::DEBUG
    } else if args.quiet {
        Level::ERROR
    } else {
        let level_str = env::var("STACKUP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
        parse_level(&level_str)
    };

    let use_json = env::var("STACKUP_LOG_JSON")
        .ok()
        .and_then(|v| v.parse::<bool>().ok())
        .unwrap_or(false);

    init_logging(LoggingConfig {
        level,
        use_json,
        ..Default::default()
    });
}
