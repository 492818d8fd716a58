//! commitflow CLI — 触发任务执行、查询健康状态的命令行工具
//!
//! Usage:
//!   commitflow-cli run [--content <text>] [--file <path>] [--message <msg>]
//!   commitflow-cli health                          Report aggregate health
//!   commitflow-cli version                         Show version information

use std::sync::Arc;

use anyhow::Result;
use commitflow::credentials::EnvCredentialStore;
use commitflow::metrics::TracingMetricsSink;
use commitflow::scm::GitCli;
use commitflow::{AppConfig, JobRunner, TriggerRequest};

fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 {
        print_usage();
        std::process::exit(1);
    }

    match args[1].as_str() {
        "run" => cmd_run(&args[2..]),
        "health" => cmd_health(),
        "version" | "--version" | "-V" => {
            println!("commitflow-cli {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        "help" | "--help" | "-h" => {
            print_usage();
            Ok(())
        }
        other => {
            eprintln!("Unknown command: {other}");
            eprintln!();
            print_usage();
            std::process::exit(1);
        }
    }
}

fn print_usage() {
    println!(
        r#"commitflow-cli — scheduled commit automation job

USAGE:
    commitflow-cli <COMMAND> [OPTIONS]

COMMANDS:
    run [--content <text>] [--file <path>] [--message <msg>] [--caller <id>]
                                Execute one job invocation
    health                      Report aggregate health (read-only)
    version                     Show version information
    help                        Show this help message

ENVIRONMENT:
    COMMITFLOW_MODE             development (default) | production
    COMMITFLOW_SECRET_JSON      Credential payload (JSON)
    COMMITFLOW_WORKDIR          Scratch checkout directory
    COMMITFLOW_LOG_LEVEL        INFO | WARN | ERROR"#
    );
}

fn flag_value(args: &[String], flag: &str) -> Option<String> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .cloned()
}

fn build_runner() -> (AppConfig, JobRunner) {
    let config = AppConfig::from_env();
    commitflow::logging::init(config.log_level);

    let runner = JobRunner::new(
        config.clone(),
        Arc::new(EnvCredentialStore::new("COMMITFLOW_SECRET_JSON")),
        Arc::new(TracingMetricsSink),
        Arc::new(GitCli::new(&config.workdir, config.call_timeout)),
    );
    (config, runner)
}

fn cmd_run(args: &[String]) -> Result<()> {
    let request = TriggerRequest {
        file_path: flag_value(args, "--file").map(Into::into),
        new_content: flag_value(args, "--content"),
        commit_message: flag_value(args, "--message"),
        credential_key: flag_value(args, "--key"),
        caller_id: flag_value(args, "--caller"),
    };

    let runtime = tokio::runtime::Runtime::new()?;
    let (_, runner) = build_runner();
    let outcome = runtime.block_on(runner.run(request));

    println!("{}", serde_json::to_string_pretty(&outcome)?);
    if outcome.status_code() >= 400 {
        std::process::exit(1);
    }
    Ok(())
}

fn cmd_health() -> Result<()> {
    let runtime = tokio::runtime::Runtime::new()?;
    let (_, runner) = build_runner();
    let report = runtime.block_on(runner.health());

    println!("{}", serde_json::to_string_pretty(&report)?);
    if !report.healthy {
        std::process::exit(1);
    }
    Ok(())
}
