// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Pod launch orchestration.
//!
//! A launch creates exactly one pod and deletes it exactly once, whichever way
//! the launch ends: success, error, interruption, panic, or the caller dropping
//! the launch future.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::{FutureExt, StreamExt};
use runtainer_k8s::K8sClient;
use tokio::io::AsyncWriteExt;

use crate::error::LaunchError;
use crate::events::{EventLogger, EventSink, TracingSink};
use crate::exit::{exit_code_from_status, ExitCodeExtractor, ExitStatus};
use crate::phase::{PhaseWatcher, DEFAULT_RESYNC_INTERVAL};
use crate::pod::{build_pod, exec_command, render_dry_run, CONTAINER_NAME};
use crate::session::{SessionTarget, StreamSession};
use crate::signal::StopSignal;
use crate::terminal::{CrosstermTerminal, Terminal};
use crate::tunnel::PortTunnelManager;
use crate::types::{IoStreams, Phase, PodHandle, PodName, PortMapping, RunMode, WorkloadSpec};

/// Phases that end the initial wait after pod creation.
const READY_PHASES: &[Phase] = &[Phase::Running, Phase::Succeeded, Phase::Failed, Phase::Unknown];

/// Settings for a [`Launcher`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LauncherConfig {
	pub namespace: String,
	/// Grace period passed with the pod delete
	pub delete_grace_period_secs: u32,
	/// Period of the phase watcher's safety-net re-read
	pub resync_interval: Duration,
}

impl Default for LauncherConfig {
	fn default() -> Self {
		Self {
			namespace: "default".to_string(),
			delete_grace_period_secs: 0,
			resync_interval: DEFAULT_RESYNC_INTERVAL,
		}
	}
}

/// Runs workloads in ephemeral pods.
pub struct Launcher {
	client: Arc<dyn K8sClient>,
	config: LauncherConfig,
	terminal: Arc<dyn Terminal>,
	sink: Arc<dyn EventSink>,
	interrupt: StopSignal,
}

impl Launcher {
	pub fn new(client: Arc<dyn K8sClient>, config: LauncherConfig) -> Self {
		Self {
			client,
			config,
			terminal: Arc::new(CrosstermTerminal),
			sink: Arc::new(TracingSink),
			interrupt: StopSignal::new(),
		}
	}

	pub fn with_terminal(mut self, terminal: Arc<dyn Terminal>) -> Self {
		self.terminal = terminal;
		self
	}

	/// Where cluster events about the pod are sent while it is scheduled.
	pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
		self.sink = sink;
		self
	}

	/// Signal that aborts an in-flight launch. The pod is still deleted.
	pub fn interrupt_signal(&self) -> StopSignal {
		self.interrupt.clone()
	}

	/// Render the manifest a launch would submit, without touching the cluster.
	pub fn render_dry_run(&self, spec: &WorkloadSpec, mode: RunMode) -> Result<String, LaunchError> {
		render_dry_run(spec, mode, &self.config.namespace)
	}

	/// Run `spec` in a fresh pod and report how the workload exited.
	///
	/// A workload failure is an [`ExitStatus`], not an error. Errors are
	/// reserved for the launch itself failing.
	pub async fn launch(
		&self,
		spec: &WorkloadSpec,
		mode: RunMode,
		io: IoStreams,
		ports: &[PortMapping],
	) -> Result<ExitStatus, LaunchError> {
		let exec = exec_command(spec, mode)?;
		let name = PodName::generate();
		let pod = build_pod(spec, mode, &name, &self.config.namespace);

		tracing::info!(pod_name = %name, namespace = %self.config.namespace, image = %spec.image, mode = ?mode, "Creating pod");
		self.client.create_pod(&self.config.namespace, pod).await?;

		let mut handle = PodHandle::new(name, self.config.namespace.clone());
		let cleanup = PodCleanup::arm(
			Arc::clone(&self.client),
			handle.clone(),
			self.config.delete_grace_period_secs,
		);

		let body = AssertUnwindSafe(self.drive(&mut handle, spec, mode, exec, io, ports)).catch_unwind();
		let outcome = tokio::select! {
			outcome = body => outcome,
			_ = self.interrupt.stopped() => {
				tracing::info!(pod_name = %cleanup.handle.name, "Launch interrupted");
				Ok(Err(LaunchError::Interrupted))
			}
		};

		cleanup.run().await;

		match outcome {
			Ok(result) => result,
			Err(panic) => std::panic::resume_unwind(panic),
		}
	}

	async fn drive(
		&self,
		handle: &mut PodHandle,
		spec: &WorkloadSpec,
		mode: RunMode,
		exec: Option<Vec<String>>,
		io: IoStreams,
		ports: &[PortMapping],
	) -> Result<ExitStatus, LaunchError> {
		let watcher = PhaseWatcher::new(Arc::clone(&self.client))
			.with_resync_interval(self.config.resync_interval);
		let extractor = ExitCodeExtractor::new(watcher.clone());

		let logger = EventLogger::start(Arc::clone(&self.client), handle, Arc::clone(&self.sink)).await;
		let ready = watcher.wait_for_phase(handle, READY_PHASES).await;
		logger.shutdown().await;
		ready?;
		tracing::debug!(pod_name = %handle.name, phase = %handle.phase(), "Pod ready");

		let finished = handle.phase() != Phase::Running;
		let outcome = match mode {
			RunMode::Attach if !finished => {
				let tunnels = PortTunnelManager::new(Arc::clone(&self.client))
					.forward_all(handle, ports)
					.await?;
				let session = StreamSession::new(Arc::clone(&self.client), Arc::clone(&self.terminal));
				let streamed = session.run(handle, SessionTarget::Attach, io, spec.tty).await;
				tunnels.stop_all().await;
				streamed?;
				extractor.resolve(handle).await
			}
			RunMode::Exec | RunMode::ExecDeclared if !finished => {
				let command = exec.ok_or(LaunchError::MissingExecCommand)?;
				let tunnels = PortTunnelManager::new(Arc::clone(&self.client))
					.forward_all(handle, ports)
					.await?;
				let session = StreamSession::new(Arc::clone(&self.client), Arc::clone(&self.terminal));
				let streamed = session
					.run(handle, SessionTarget::Exec(&command), io, spec.tty)
					.await;
				tunnels.stop_all().await;
				exit_code_from_status(streamed?.as_ref())
			}
			_ => {
				if mode.is_interactive() {
					tracing::debug!(pod_name = %handle.name, phase = %handle.phase(), "Pod already finished, dumping logs");
				}
				match self.follow_logs(handle, io).await {
					Ok(()) => {}
					// A pod that failed before its container started has no logs; its exit still resolves.
					Err(err) if handle.phase().is_terminal() => {
						tracing::warn!(pod_name = %handle.name, error = %err, "Could not read pod logs");
					}
					Err(err) => return Err(err),
				}
				extractor.resolve(handle).await
			}
		};

		ExitStatus::from_outcome(outcome)
	}

	async fn follow_logs(&self, handle: &PodHandle, io: IoStreams) -> Result<(), LaunchError> {
		let mut stdout = io.stdout;
		let mut logs = self
			.client
			.stream_logs(handle.name.as_str(), &handle.namespace, CONTAINER_NAME)
			.await
			.map_err(LaunchError::transport)?;

		while let Some(chunk) = logs.next().await {
			let chunk = chunk.map_err(LaunchError::transport)?;
			stdout
				.write_all(&chunk)
				.await
				.map_err(LaunchError::transport)?;
		}
		stdout.flush().await.map_err(LaunchError::transport)?;
		Ok(())
	}
}

/// Deletes the launched pod exactly once.
///
/// [`PodCleanup::run`] deletes on the normal path. If the launch future is
/// dropped first, `Drop` hands the delete to the runtime instead.
struct PodCleanup {
	client: Arc<dyn K8sClient>,
	handle: PodHandle,
	grace_period_secs: u32,
	armed: bool,
}

impl PodCleanup {
	fn arm(client: Arc<dyn K8sClient>, handle: PodHandle, grace_period_secs: u32) -> Self {
		Self {
			client,
			handle,
			grace_period_secs,
			armed: true,
		}
	}

	fn spawn_delete(&self) -> tokio::task::JoinHandle<()> {
		tokio::spawn(delete_pod(
			Arc::clone(&self.client),
			self.handle.clone(),
			self.grace_period_secs,
		))
	}

	async fn run(mut self) {
		self.armed = false;
		// Detached so the delete completes even if this future is dropped while waiting.
		if let Err(err) = self.spawn_delete().await {
			tracing::warn!(pod_name = %self.handle.name, error = %err, "Pod delete task failed");
		}
	}
}

impl Drop for PodCleanup {
	fn drop(&mut self) {
		if !self.armed {
			return;
		}
		self.armed = false;
		if tokio::runtime::Handle::try_current().is_ok() {
			tracing::debug!(pod_name = %self.handle.name, "Launch dropped, deleting pod in background");
			drop(self.spawn_delete());
		} else {
			tracing::warn!(pod_name = %self.handle.name, "No runtime left to delete pod");
		}
	}
}

async fn delete_pod(client: Arc<dyn K8sClient>, handle: PodHandle, grace_period_secs: u32) {
	match client
		.delete_pod(handle.name.as_str(), &handle.namespace, grace_period_secs)
		.await
	{
		Ok(()) => tracing::debug!(pod_name = %handle.name, "Deleted pod"),
		Err(err) if err.is_not_found() => {
			tracing::debug!(pod_name = %handle.name, "Pod already deleted");
		}
		Err(err) => {
			tracing::warn!(pod_name = %handle.name, error = %err, "Failed to delete pod");
		}
	}
}
