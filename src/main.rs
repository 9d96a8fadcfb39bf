//! allin1 CLI entry point

use allin1::config::cli::{AnalyzeArgs, Command, EvaluateArgs};
use allin1::config::{Cli, Settings};
use allin1::eval;
use allin1::pipeline;
use clap::Parser;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(&cli);

    match &cli.command {
        Command::Analyze(args) => run_analyze(args, cli.quiet),
        Command::Evaluate(args) => run_evaluate(args),
    }
}

fn init_logging(cli: &Cli) {
    let filter = cli.log_level().to_string().to_lowercase();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();
}

fn run_analyze(args: &AnalyzeArgs, quiet: bool) -> ExitCode {
    if let Err(e) = validate_inputs(args) {
        eprintln!("Error: {}", e);
        return ExitCode::FAILURE;
    }

    let settings = match Settings::from_cli(args, quiet) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match pipeline::run(&settings) {
        Ok(result) => {
            if !quiet {
                println!();
                println!(
                    "Summary: {} successful, {} failed, {} skipped (of {} total)",
                    result.successful, result.failed, result.skipped, result.total_files
                );
            }

            if result.failed > 0 {
                ExitCode::from(1)
            } else {
                ExitCode::SUCCESS
            }
        }
        Err(e) => {
            eprintln!("Fatal error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run_evaluate(args: &EvaluateArgs) -> ExitCode {
    let report = match eval::evaluate_paths(&args.prediction, &args.reference, &args.eval_config()) {
        Ok(report) => report,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match serde_json::to_string_pretty(&report) {
        Ok(json) => {
            println!("{}", json);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn validate_inputs(args: &AnalyzeArgs) -> Result<(), String> {
    for path in &args.paths {
        if !path.exists() {
            return Err(format!(
                "Input path does not exist: {}\n\n  Tip: Check the path is correct and accessible.\n  Examples:\n    allin1 analyze ~/Music/album -o ./struct\n    allin1 analyze ./track.mp3 --activ",
                path.display()
            ));
        }
    }

    // The output directory itself is created on demand
    if let Some(parent) = args.out_dir.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            return Err(format!(
                "Output parent directory does not exist: {}\n\n  Tip: The output directory will be created automatically,\n  but its parent directory must exist.\n  Example: mkdir -p {}",
                parent.display(),
                parent.display()
            ));
        }
    }

    Ok(())
}
