use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use parcel_runner::{CollisionPolicy, ExecutionResult, RunConfig, RunPlan, RunReport};
use serde_json::{json, Value};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "parcel",
    version,
    about = "Run containerized simulation scripts in parallel"
)]
struct Cli {
    /// Log at debug level (RUST_LOG takes precedence when set)
    #[arg(long, short, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum CollisionArg {
    #[value(name = "reject")]
    Reject,
    #[value(name = "disambiguate")]
    Disambiguate,
}

impl From<CollisionArg> for CollisionPolicy {
    fn from(value: CollisionArg) -> Self {
        match value {
            CollisionArg::Reject => CollisionPolicy::Reject,
            CollisionArg::Disambiguate => CollisionPolicy::Disambiguate,
        }
    }
}

#[derive(Args, Debug, Clone)]
struct RunArgs {
    /// YAML config file; flags below override its values
    #[arg(long)]
    config: Option<PathBuf>,
    /// docker or singularity (True/False also accepted)
    #[arg(long, env = "PARCEL_CONTAINER_TYPE")]
    container_type: Option<String>,
    /// Script paths separated by `---`
    #[arg(long, env = "PARCEL_RUN_FILES")]
    run_files: Option<String>,
    #[arg(long, env = "PARCEL_OUT_DIR")]
    out_dir: Option<PathBuf>,
    #[arg(long)]
    docker_wrapper: Option<PathBuf>,
    #[arg(long)]
    singularity_wrapper: Option<PathBuf>,
    #[arg(long)]
    workers: Option<usize>,
    #[arg(long)]
    work_root: Option<PathBuf>,
    #[arg(long, value_enum)]
    collision_policy: Option<CollisionArg>,
    /// Write an RFC 3339 start timestamp to <out_dir>/<script>.log
    #[arg(long)]
    timestamp_log: bool,
    #[arg(long)]
    timeout_secs: Option<u64>,
    #[arg(long)]
    max_retries: Option<u32>,
}

#[derive(Subcommand)]
enum Commands {
    Run {
        #[command(flatten)]
        args: RunArgs,
        /// Exit with status 1 when any job failed
        #[arg(long)]
        fail_on_error: bool,
        /// Also write the JSON report to this path
        #[arg(long)]
        report: Option<PathBuf>,
        #[arg(long)]
        json: bool,
    },
    Describe {
        #[command(flatten)]
        args: RunArgs,
        #[arg(long)]
        json: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let json_mode = command_json_mode(&cli.command);
    match run_command(cli.command) {
        Ok(outcome) => {
            if let Some(payload) = outcome.payload {
                emit_json(&payload);
            }
            if outcome.failed {
                std::process::exit(1);
            }
            Ok(())
        }
        Err(err) => {
            if json_mode {
                emit_json(&json_error(error_code(&err), format!("{:#}", err), json!({})));
                std::process::exit(1);
            }
            Err(err)
        }
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

struct CommandOutcome {
    payload: Option<Value>,
    failed: bool,
}

fn run_command(command: Commands) -> Result<CommandOutcome> {
    match command {
        Commands::Run {
            args,
            fail_on_error,
            report,
            json,
        } => {
            let config = resolve_config(&args)?;
            let plan = parcel_runner::plan_run(&config)?;
            if !json {
                println!(
                    "Running {} simulation jobs on {} workers...",
                    plan.manifest.len(),
                    plan.workers
                );
            }
            let run_report = parcel_runner::execute(&plan)?;
            let payload = report_to_json(&plan, &run_report);
            if let Some(path) = report {
                let bytes = serde_json::to_vec_pretty(&payload)?;
                parcel_runner::fs_util::atomic_write_bytes(&path, &bytes)
                    .with_context(|| format!("failed to write report {}", path.display()))?;
            }
            let failed = fail_on_error && !run_report.all_succeeded();
            if json {
                return Ok(CommandOutcome {
                    payload: Some(payload),
                    failed,
                });
            }
            print_report(&run_report);
            Ok(CommandOutcome {
                payload: None,
                failed,
            })
        }
        Commands::Describe { args, json } => {
            let config = resolve_config(&args)?;
            let plan = parcel_runner::plan_run(&config)?;
            if json {
                return Ok(CommandOutcome {
                    payload: Some(plan_to_json(&plan)),
                    failed: false,
                });
            }
            print_plan(&plan);
            Ok(CommandOutcome {
                payload: None,
                failed: false,
            })
        }
    }
}

fn resolve_config(args: &RunArgs) -> Result<RunConfig> {
    let mut config = match &args.config {
        Some(path) => RunConfig::load(path)?,
        None => RunConfig::default(),
    };
    if let Some(v) = &args.container_type {
        config.container_type = Some(v.clone());
    }
    if let Some(v) = &args.run_files {
        config.run_files = Some(v.clone());
    }
    if let Some(v) = &args.out_dir {
        config.out_dir = Some(v.clone());
    }
    if let Some(v) = &args.docker_wrapper {
        config.wrappers.docker = v.clone();
    }
    if let Some(v) = &args.singularity_wrapper {
        config.wrappers.singularity = v.clone();
    }
    if let Some(v) = args.workers {
        config.workers = Some(v);
    }
    if let Some(v) = &args.work_root {
        config.work_root = Some(v.clone());
    }
    if let Some(v) = args.collision_policy {
        config.collision_policy = v.into();
    }
    if args.timestamp_log {
        config.timestamp_log = true;
    }
    if let Some(v) = args.timeout_secs {
        config.timeout_secs = Some(v);
    }
    if let Some(v) = args.max_retries {
        config.max_retries = v;
    }
    Ok(config)
}

fn emit_json(value: &Value) {
    match serde_json::to_string(value) {
        Ok(s) => println!("{}", s),
        Err(_) => println!(
            "{{\"ok\":false,\"error\":{{\"code\":\"serialization_error\",\"message\":\"failed to serialize JSON payload\",\"details\":{{}}}}}}"
        ),
    }
}

fn json_error(code: &str, message: String, details: Value) -> Value {
    json!({
        "ok": false,
        "error": {
            "code": code,
            "message": message,
            "details": details
        }
    })
}

fn error_code(err: &anyhow::Error) -> &'static str {
    match err.downcast_ref::<parcel_runner::OrchestratorError>() {
        Some(parcel_runner::OrchestratorError::Configuration(_))
        | Some(parcel_runner::OrchestratorError::ConfigParse { .. }) => "configuration_error",
        Some(parcel_runner::OrchestratorError::InvalidManifest(_)) => "invalid_manifest",
        Some(parcel_runner::OrchestratorError::Io(_)) => "io_error",
        None => "command_failed",
    }
}

fn command_json_mode(command: &Commands) -> bool {
    match command {
        Commands::Run { json, .. } | Commands::Describe { json, .. } => *json,
    }
}

fn report_to_json(plan: &RunPlan, report: &RunReport) -> Value {
    json!({
        "ok": true,
        "container_type": plan.container_type.as_str(),
        "wrapper": plan.wrapper_path.display().to_string(),
        "workers": plan.workers,
        "report": report,
    })
}

fn plan_to_json(plan: &RunPlan) -> Value {
    let jobs: Vec<Value> = plan
        .manifest
        .iter()
        .map(|job| {
            json!({
                "index": job.index,
                "script": job.script_path.display().to_string(),
                "command": job.command(),
                "work_dir": job.work_dir.display().to_string(),
                "expected_output": job.expected_output_path().display().to_string(),
                "artifact": job.artifact_path().display().to_string(),
                "log": job.log_path().display().to_string(),
            })
        })
        .collect();
    json!({
        "ok": true,
        "container_type": plan.container_type.as_str(),
        "wrapper": plan.wrapper_path.display().to_string(),
        "workers": plan.workers,
        "timestamp_log": plan.options.timestamp_log,
        "timeout_secs": plan.options.timeout.map(|d| d.as_secs()),
        "max_retries": plan.options.max_retries,
        "jobs": jobs,
    })
}

fn print_plan(plan: &RunPlan) {
    println!("container: {}", plan.container_type.as_str());
    println!("wrapper: {}", plan.wrapper_path.display());
    println!("jobs: {}", plan.manifest.len());
    println!("workers: {}", plan.workers);
    if let Some(timeout) = plan.options.timeout {
        println!("timeout: {}s", timeout.as_secs());
    }
    if plan.options.max_retries > 0 {
        println!("max_retries: {}", plan.options.max_retries);
    }
    for job in plan.manifest.iter() {
        println!("[{}] {}", job.index, job.command().join(" "));
        println!("    -> {}", job.artifact_path().display());
    }
}

fn print_report(report: &RunReport) {
    for result in &report.results {
        println!("{}", result_line(result));
    }
    println!(
        "{} submitted, {} succeeded, {} failed",
        report.submitted, report.succeeded, report.failed
    );
}

fn result_line(result: &ExecutionResult) -> String {
    match (&result.failure, &result.artifact_path) {
        (None, Some(artifact)) => format!(
            "[{}] ok      {} -> {}",
            result.index,
            result.script_path.display(),
            artifact.display()
        ),
        (Some(failure), _) => format!(
            "[{}] FAILED  {}: {} (stderr: {})",
            result.index,
            result.script_path.display(),
            failure,
            result.stderr_path.display()
        ),
        (None, None) => format!("[{}] ok      {}", result.index, result.script_path.display()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(args).expect("parse")
    }

    #[test]
    fn run_flags_override_config_defaults() {
        let cli = parse(&[
            "parcel",
            "run",
            "--container-type",
            "docker",
            "--run-files",
            "/a/sim1.x---/a/sim2.x",
            "--out-dir",
            "/out",
            "--collision-policy",
            "disambiguate",
            "--timestamp-log",
            "--max-retries",
            "2",
            "--json",
        ]);
        let Commands::Run { args, json, .. } = cli.command else {
            panic!("expected run");
        };
        assert!(json);
        let config = resolve_config(&args).expect("config");
        assert_eq!(config.container_type.as_deref(), Some("docker"));
        assert_eq!(config.out_dir, Some(PathBuf::from("/out")));
        assert_eq!(config.collision_policy, CollisionPolicy::Disambiguate);
        assert!(config.timestamp_log);
        assert_eq!(config.max_retries, 2);
        let plan = parcel_runner::plan_run(&config).expect("plan");
        assert_eq!(plan.manifest.len(), 2);
        assert_eq!(plan.workers, 2);
    }

    #[test]
    fn describe_json_lists_jobs_in_order() {
        let cli = parse(&[
            "parcel",
            "describe",
            "--container-type",
            "singularity",
            "--singularity-wrapper",
            "/w/wrap_sing.sh",
            "--run-files",
            "/a/sim1.x---/a/sim2.x",
            "--out-dir",
            "/out",
        ]);
        let Commands::Describe { args, .. } = cli.command else {
            panic!("expected describe");
        };
        let plan = parcel_runner::plan_run(&resolve_config(&args).expect("config")).expect("plan");
        let v = plan_to_json(&plan);
        assert_eq!(v["container_type"], "singularity");
        assert_eq!(v["jobs"][0]["artifact"], "/out/sim1.gif");
        assert_eq!(v["jobs"][1]["command"][1], "/w/wrap_sing.sh");
        assert_eq!(v["jobs"][1]["command"][3], "/a/sim2.x");
    }

    #[test]
    fn orchestrator_errors_map_to_stable_codes() {
        let err: anyhow::Error =
            parcel_runner::OrchestratorError::Configuration("x".to_string()).into();
        assert_eq!(error_code(&err), "configuration_error");
        let err: anyhow::Error =
            parcel_runner::OrchestratorError::InvalidManifest("x".to_string()).into();
        assert_eq!(error_code(&err), "invalid_manifest");
        assert_eq!(error_code(&anyhow::anyhow!("other")), "command_failed");
    }

    #[test]
    fn json_error_envelope_shape() {
        let v = json_error("invalid_manifest", "run list is empty".to_string(), json!({}));
        assert_eq!(v["ok"], false);
        assert_eq!(v["error"]["code"], "invalid_manifest");
        assert_eq!(v["error"]["message"], "run list is empty");
    }
}
