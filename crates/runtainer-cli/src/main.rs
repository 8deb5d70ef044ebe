// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! runtainer - run a container image in an ephemeral Kubernetes pod
//!
//! The pod is created, wired to the local terminal and ports, and deleted
//! again when the workload finishes or the user interrupts it. The process
//! exits with the workload's own exit code whenever the cluster confirms one.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use tracing::{debug, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use runtainer_config::{
	load_config, parse_env_pairs, KubeConfigLayer, LoggingConfig, LoggingConfigLayer, RunConfig,
	RunConfigLayer, RuntainerConfigLayer,
};
use runtainer_k8s::KubeClient;
use runtainer_launcher::{
	render_dry_run, ExitStatus, IoStreams, Launcher, LauncherConfig, RunMode, WorkloadSpec,
};

mod version;

/// Exit code for failures that carry no workload exit code of their own.
const GENERIC_FAILURE_EXIT_CODE: i32 = 1;

/// Namespace used for dry runs when none is configured.
const DRY_RUN_NAMESPACE: &str = "default";

/// How long exit waits on blocking-pool work such as a parked stdin read.
const RUNTIME_SHUTDOWN_TIMEOUT: Duration = Duration::from_millis(100);

/// runtainer - run a container image in an ephemeral Kubernetes pod
#[derive(Parser, Debug)]
#[command(name = "runtainer", version, about, long_about = None, args_conflicts_with_subcommands = true)]
struct Args {
	/// Path to a config file (must exist)
	#[arg(long)]
	config: Option<PathBuf>,

	/// Namespace to launch the pod in
	#[arg(long)]
	namespace: Option<String>,

	/// Kubeconfig context to use
	#[arg(long)]
	context: Option<String>,

	/// Pass local stdin to the workload
	#[arg(short = 'i', long)]
	stdin: bool,

	/// Allocate a TTY for the workload
	#[arg(short = 't', long)]
	tty: bool,

	/// Attach to the pod's own process instead of following its logs
	#[arg(long)]
	interactive: bool,

	/// Run CMD and its arguments inside the running container; end the list
	/// with ';' when flags or IMAGE follow
	#[arg(
		long,
		value_name = "CMD",
		num_args = 1..,
		value_terminator = ";",
		allow_hyphen_values = true
	)]
	exec: Option<Vec<String>>,

	/// Forward a local port to the pod (repeatable: -p 8080:80)
	#[arg(short = 'p', long = "port", value_name = "LOCAL:REMOTE")]
	ports: Vec<String>,

	/// Environment variable (repeatable: -e KEY=VALUE)
	#[arg(short = 'e', long = "env", value_name = "KEY=VALUE")]
	env: Vec<String>,

	/// Mount a host directory (repeatable)
	#[arg(long = "volume", value_name = "HOST[:CONTAINER]")]
	volumes: Vec<String>,

	/// Expose a secret as environment variables (repeatable)
	#[arg(long = "secret-env", value_name = "SECRET")]
	secret_env: Vec<String>,

	/// Mount a secret under /rt-secrets (repeatable)
	#[arg(long = "secret-volume", value_name = "SECRET")]
	secret_volumes: Vec<String>,

	/// Image pull secret
	#[arg(long)]
	image_pull_secret: Option<String>,

	/// Working directory inside the container
	#[arg(short = 'd', long)]
	dir: Option<String>,

	/// Print the pod manifest instead of running it
	#[arg(long)]
	dry_run: bool,

	/// Increase log verbosity (-v debug, -vv trace)
	#[arg(short, long, action = ArgAction::Count)]
	verbose: u8,

	#[command(subcommand)]
	subcommand: Option<Command>,

	/// Container image to run
	image: Option<String>,

	/// Command and arguments to run in the container
	#[arg(trailing_var_arg = true, allow_hyphen_values = true)]
	command: Vec<String>,
}

#[derive(Subcommand, Debug)]
enum Command {
	/// Show version information
	Version,
}

fn main() {
	let runtime = match tokio::runtime::Builder::new_multi_thread()
		.enable_all()
		.build()
	{
		Ok(runtime) => runtime,
		Err(err) => {
			eprintln!("runtainer: failed to start async runtime: {err}");
			std::process::exit(GENERIC_FAILURE_EXIT_CODE);
		}
	};

	let code = match runtime.block_on(run()) {
		Ok(code) => code,
		Err(err) => {
			eprintln!("runtainer: {err:#}");
			GENERIC_FAILURE_EXIT_CODE
		}
	};
	shutdown_runtime(runtime);
	std::process::exit(code);
}

/// A stdin read parked on the blocking pool cannot be cancelled, so dropping
/// the runtime would wait for the next line of input.
fn shutdown_runtime(runtime: tokio::runtime::Runtime) {
	runtime.shutdown_timeout(RUNTIME_SHUTDOWN_TIMEOUT);
}

async fn run() -> Result<i32> {
	let args = Args::parse();

	if let Some(Command::Version) = args.subcommand {
		println!("{}", version::format_version_info());
		return Ok(0);
	}

	let cli = cli_layer(&args)?;
	let config = load_config(args.config.as_deref(), cli).context("failed to load configuration")?;
	init_tracing(&config.logging);

	let image = args
		.image
		.clone()
		.context("an IMAGE to run is required")?;
	let exec = args.exec.clone();
	let mode = select_mode(&args.command, exec.as_deref(), config.run.interactive);
	let spec = build_spec(image, args.command.clone(), exec, &config.run);

	if args.dry_run {
		let namespace = config
			.kube
			.namespace
			.clone()
			.unwrap_or_else(|| DRY_RUN_NAMESPACE.to_string());
		print!("{}", render_dry_run(&spec, mode, &namespace)?);
		return Ok(0);
	}

	let client = KubeClient::new(config.kube.context.as_deref())
		.await
		.context("failed to initialize Kubernetes client")?;
	let namespace = config
		.kube
		.namespace
		.clone()
		.unwrap_or_else(|| client.default_namespace().to_string());

	info!(image = %spec.image, namespace = %namespace, mode = ?mode, "starting runtainer");

	let launcher = Launcher::new(
		Arc::new(client),
		LauncherConfig {
			namespace,
			delete_grace_period_secs: config.kube.delete_grace_period_secs,
			..Default::default()
		},
	);
	setup_ctrlc_handler(&launcher)?;

	let io = IoStreams::stdio(spec.stdin);
	match launcher.launch(&spec, mode, io, &config.run.ports).await {
		Ok(status) => Ok(report_status(&status)),
		Err(err) => {
			eprintln!("runtainer: {err}");
			Ok(err.exit_code(GENERIC_FAILURE_EXIT_CODE))
		}
	}
}

fn init_tracing(logging: &LoggingConfig) {
	let filter =
		EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));

	tracing_subscriber::registry()
		.with(filter)
		.with(fmt::layer().with_writer(std::io::stderr))
		.init();
}

fn setup_ctrlc_handler(launcher: &Launcher) -> Result<()> {
	let interrupt = launcher.interrupt_signal();
	ctrlc::set_handler(move || {
		if interrupt.stop() {
			info!("received Ctrl+C, stopping launch");
		}
	})
	.context("failed to set Ctrl+C handler")?;

	Ok(())
}

fn report_status(status: &ExitStatus) -> i32 {
	match status {
		ExitStatus::Success => debug!("workload succeeded"),
		ExitStatus::Carried { code, reason } => {
			debug!(code, reason = ?reason, "workload failed");
		}
		ExitStatus::Ambiguous { reason } => {
			eprintln!("runtainer: workload failed without an exit code: {reason}");
		}
	}
	status.code(GENERIC_FAILURE_EXIT_CODE)
}

/// Translate flags into the highest-precedence config layer. Flags that were
/// not given stay unset so lower layers show through.
fn cli_layer(args: &Args) -> Result<RuntainerConfigLayer> {
	let env = if args.env.is_empty() {
		None
	} else {
		Some(parse_env_pairs(&args.env, "--env")?)
	};
	let list = |values: &[String]| (!values.is_empty()).then(|| values.to_vec());
	let level = match args.verbose {
		0 => None,
		1 => Some("debug".to_string()),
		_ => Some("trace".to_string()),
	};

	Ok(RuntainerConfigLayer {
		kube: Some(KubeConfigLayer {
			namespace: args.namespace.clone(),
			context: args.context.clone(),
			delete_grace_period_secs: None,
		}),
		run: Some(RunConfigLayer {
			stdin: args.stdin.then_some(true),
			tty: args.tty.then_some(true),
			interactive: args.interactive.then_some(true),
			dir: args.dir.clone(),
			image_pull_secret: args.image_pull_secret.clone(),
			secret_env: list(&args.secret_env),
			secret_volumes: list(&args.secret_volumes),
			ports: list(&args.ports),
			volumes: list(&args.volumes),
			env,
			supplemental_group: None,
		}),
		logging: Some(LoggingConfigLayer { level }),
	})
}

/// `--exec` wins; a declared command runs via exec behind a placeholder;
/// otherwise attach or follow logs.
fn select_mode(command: &[String], exec: Option<&[String]>, interactive: bool) -> RunMode {
	if exec.is_some() {
		RunMode::Exec
	} else if !command.is_empty() {
		RunMode::ExecDeclared
	} else if interactive {
		RunMode::Attach
	} else {
		RunMode::LogFollow
	}
}

fn build_spec(
	image: String,
	command: Vec<String>,
	exec: Option<Vec<String>>,
	run: &RunConfig,
) -> WorkloadSpec {
	WorkloadSpec {
		image,
		command,
		args: Vec::new(),
		working_dir: run.dir.clone(),
		env: run.env.clone(),
		env_from_secrets: run.secret_env.clone(),
		volumes: run.volumes.clone(),
		secret_volumes: run.secret_volumes.clone(),
		image_pull_secret: run.image_pull_secret.clone(),
		supplemental_group: run.supplemental_group,
		stdin: run.stdin,
		tty: run.tty,
		exec_command: exec,
	}
}
