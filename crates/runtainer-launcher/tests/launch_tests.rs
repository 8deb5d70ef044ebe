// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Integration tests for full launches against the in-memory cluster.
//!
//! Tests cover:
//! - The pod is deleted exactly once on success, failure, interruption, panic
//!   and when the launch future is dropped
//! - Exit codes for log-follow, attach and exec launches
//! - Terminal restoration for TTY sessions
//! - Fail-fast port forwarding

use std::io;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;

use futures::stream::BoxStream;
use futures::{FutureExt, StreamExt};
use runtainer_k8s::mock::{failed_pod, pod_in_phase, MockK8sClient, TunnelBehavior};
use runtainer_k8s::{Status, StatusCause, StatusDetails};
use runtainer_launcher::{
	ExitStatus, IoStreams, LaunchError, Launcher, LauncherConfig, PortMapping, RunMode, Terminal,
	WorkloadSpec,
};
use tokio::io::{AsyncRead, AsyncWrite};

// ============================================================================
// Fixtures
// ============================================================================

#[derive(Default)]
struct FakeTerminal {
	raw: AtomicBool,
	restores: AtomicUsize,
	panic_on_raw: bool,
}

impl Terminal for FakeTerminal {
	fn enable_raw_mode(&self) -> io::Result<()> {
		if self.panic_on_raw {
			panic!("terminal exploded");
		}
		self.raw.store(true, Ordering::SeqCst);
		Ok(())
	}

	fn disable_raw_mode(&self) -> io::Result<()> {
		self.restores.fetch_add(1, Ordering::SeqCst);
		self.raw.store(false, Ordering::SeqCst);
		Ok(())
	}

	fn size(&self) -> io::Result<(u16, u16)> {
		Ok((80, 24))
	}

	fn resizes(&self) -> BoxStream<'static, (u16, u16)> {
		futures::stream::pending().boxed()
	}
}

#[derive(Clone, Default)]
struct Captured(Arc<Mutex<Vec<u8>>>);

impl Captured {
	fn text(&self) -> String {
		String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
	}
}

impl AsyncWrite for Captured {
	fn poll_write(self: Pin<&mut Self>, _cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
		self.0.lock().unwrap().extend_from_slice(buf);
		Poll::Ready(Ok(buf.len()))
	}

	fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
		Poll::Ready(Ok(()))
	}

	fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
		Poll::Ready(Ok(()))
	}
}

/// I/O with captured output and, optionally, a local input that never closes.
fn io(stdin: bool) -> (IoStreams, Captured, Option<tokio::io::DuplexStream>) {
	let stdout = Captured::default();
	let (input, keep) = if stdin {
		let (local, remote) = tokio::io::duplex(64);
		(Some(Box::pin(local) as Pin<Box<dyn AsyncRead + Send>>), Some(remote))
	} else {
		(None, None)
	};
	let streams = IoStreams {
		stdin: input,
		stdout: Box::pin(stdout.clone()),
		stderr: Box::pin(Captured::default()),
	};
	(streams, stdout, keep)
}

fn launcher(mock: &Arc<MockK8sClient>, terminal: Arc<FakeTerminal>) -> Launcher {
	let config = LauncherConfig {
		namespace: "default".to_string(),
		resync_interval: Duration::from_millis(20),
		..Default::default()
	};
	Launcher::new(mock.clone(), config).with_terminal(terminal)
}

fn workload() -> WorkloadSpec {
	WorkloadSpec {
		image: "alpine:3.20".to_string(),
		command: vec!["sh".to_string(), "-c".to_string()],
		args: vec!["echo hello".to_string()],
		..Default::default()
	}
}

fn non_zero_exit(code: i32) -> Status {
	Status {
		status: Some("Failure".to_string()),
		reason: Some("NonZeroExitCode".to_string()),
		details: Some(StatusDetails {
			causes: Some(vec![StatusCause {
				reason: Some("ExitCode".to_string()),
				message: Some(code.to_string()),
				..Default::default()
			}]),
			..Default::default()
		}),
		..Default::default()
	}
}

// ============================================================================
// Log-follow Launches
// ============================================================================

#[tokio::test]
async fn test_log_follow_success_never_opens_a_stream_session() {
	let mock = Arc::new(
		MockK8sClient::new()
			.with_phases(&["Pending", "Running", "Succeeded"])
			.with_logs(&["hello\n"]),
	);
	let (streams, stdout, _keep) = io(false);

	let status = launcher(&mock, Arc::new(FakeTerminal::default()))
		.launch(&workload(), RunMode::LogFollow, streams, &[])
		.await
		.unwrap();

	assert_eq!(status, ExitStatus::Success);
	assert_eq!(stdout.text(), "hello\n");
	assert_eq!(mock.log_calls(), 1);
	assert_eq!(mock.attach_calls(), 0);
	assert_eq!(mock.exec_calls(), 0);
	assert_eq!(mock.created_pods().len(), 1);
	assert_eq!(mock.delete_calls(), 1);
}

#[tokio::test]
async fn test_failed_pod_carries_container_exit_code() {
	let mock = Arc::new(MockK8sClient::new().with_phase_script(vec![
		pod_in_phase("Running"),
		failed_pod(Some(42), Some("Error")),
	]));
	let (streams, _stdout, _keep) = io(false);

	let status = launcher(&mock, Arc::new(FakeTerminal::default()))
		.launch(&workload(), RunMode::LogFollow, streams, &[])
		.await
		.unwrap();

	assert_eq!(
		status,
		ExitStatus::Carried {
			code: 42,
			reason: Some("Error".to_string())
		}
	);
	assert_eq!(status.code(1), 42);
	assert_eq!(mock.delete_calls(), 1);
}

#[tokio::test]
async fn test_failed_pod_without_terminated_record_is_ambiguous() {
	let mock = Arc::new(
		MockK8sClient::new().with_phase_script(vec![pod_in_phase("Running"), failed_pod(None, None)]),
	);
	let (streams, _stdout, _keep) = io(false);

	let status = launcher(&mock, Arc::new(FakeTerminal::default()))
		.launch(&workload(), RunMode::LogFollow, streams, &[])
		.await
		.unwrap();

	assert!(matches!(status, ExitStatus::Ambiguous { .. }));
	assert_eq!(status.code(1), 1);
	assert_eq!(mock.delete_calls(), 1);
}

#[tokio::test]
async fn test_failed_pod_without_logs_is_ambiguous() {
	let mock = Arc::new(
		MockK8sClient::new()
			.with_phases(&["Failed"])
			.with_log_error("container not started"),
	);
	let (streams, _stdout, _keep) = io(false);

	let status = launcher(&mock, Arc::new(FakeTerminal::default()))
		.launch(&workload(), RunMode::LogFollow, streams, &[])
		.await
		.unwrap();

	assert!(matches!(status, ExitStatus::Ambiguous { .. }));
	assert_eq!(mock.log_calls(), 1);
	assert_eq!(mock.delete_calls(), 1);
}

#[tokio::test]
async fn test_log_failure_on_running_pod_is_an_error() {
	let mock = Arc::new(
		MockK8sClient::new()
			.with_phases(&["Running"])
			.with_log_error("connection reset"),
	);
	let (streams, _stdout, _keep) = io(false);

	let err = launcher(&mock, Arc::new(FakeTerminal::default()))
		.launch(&workload(), RunMode::LogFollow, streams, &[])
		.await
		.unwrap_err();

	assert!(matches!(err, LaunchError::StreamTransport { .. }));
	assert_eq!(mock.delete_calls(), 1);
}

// ============================================================================
// Interactive Launches
// ============================================================================

#[tokio::test]
async fn test_tty_attach_restores_terminal_exactly_once() {
	let mock = Arc::new(
		MockK8sClient::new()
			.with_step(Duration::from_millis(100))
			.with_phases(&["Pending", "Running", "Succeeded"])
			.with_remote_output(b"/ # exit\r\n"),
	);
	let terminal = Arc::new(FakeTerminal::default());
	let (streams, stdout, _keep) = io(true);
	let spec = WorkloadSpec {
		stdin: true,
		tty: true,
		..workload()
	};

	let status = launcher(&mock, terminal.clone())
		.launch(&spec, RunMode::Attach, streams, &[])
		.await
		.unwrap();

	assert_eq!(status, ExitStatus::Success);
	assert_eq!(terminal.restores.load(Ordering::SeqCst), 1);
	assert!(!terminal.raw.load(Ordering::SeqCst));
	assert_eq!(stdout.text(), "/ # exit\r\n");
	assert_eq!(mock.attach_calls(), 1);
	assert_eq!(mock.delete_calls(), 1);
}

#[tokio::test]
async fn test_exec_declared_runs_command_behind_placeholder() {
	let mock = Arc::new(
		MockK8sClient::new()
			.with_phases(&["Running"])
			.with_exec_status(non_zero_exit(3)),
	);
	let (streams, _stdout, _keep) = io(false);
	let spec = WorkloadSpec {
		command: vec!["sh".to_string(), "-c".to_string(), "exit 3".to_string()],
		args: Vec::new(),
		..workload()
	};

	let status = launcher(&mock, Arc::new(FakeTerminal::default()))
		.launch(&spec, RunMode::ExecDeclared, streams, &[])
		.await
		.unwrap();

	assert_eq!(status.code(1), 3);
	let created = mock.created_pods();
	let container = &created[0].spec.as_ref().unwrap().containers[0];
	assert_eq!(container.command, Some(vec!["cat".to_string()]));
	assert_eq!(
		mock.exec_commands(),
		vec![vec!["sh".to_string(), "-c".to_string(), "exit 3".to_string()]]
	);
	assert_eq!(mock.delete_calls(), 1);
}

#[tokio::test]
async fn test_exec_runs_out_of_band_command() {
	let mock = Arc::new(
		MockK8sClient::new()
			.with_phases(&["Running"])
			.with_exec_status(Status {
				status: Some("Success".to_string()),
				..Default::default()
			}),
	);
	let (streams, _stdout, _keep) = io(false);
	let spec = WorkloadSpec {
		exec_command: Some(vec!["env".to_string()]),
		..workload()
	};

	let status = launcher(&mock, Arc::new(FakeTerminal::default()))
		.launch(&spec, RunMode::Exec, streams, &[])
		.await
		.unwrap();

	assert_eq!(status, ExitStatus::Success);
	assert_eq!(mock.exec_commands(), vec![vec!["env".to_string()]]);
	let created = mock.created_pods();
	let container = &created[0].spec.as_ref().unwrap().containers[0];
	assert_eq!(container.command, Some(vec!["sh".to_string(), "-c".to_string()]));
}

#[tokio::test]
async fn test_interactive_launch_on_finished_pod_dumps_logs() {
	let mock = Arc::new(
		MockK8sClient::new()
			.with_phases(&["Succeeded"])
			.with_logs(&["done\n"]),
	);
	let (streams, stdout, _keep) = io(false);

	let status = launcher(&mock, Arc::new(FakeTerminal::default()))
		.launch(&workload(), RunMode::Attach, streams, &[])
		.await
		.unwrap();

	assert_eq!(status, ExitStatus::Success);
	assert_eq!(stdout.text(), "done\n");
	assert_eq!(mock.attach_calls(), 0);
	assert_eq!(mock.forwarded_ports(), Vec::<u16>::new());
	assert_eq!(mock.delete_calls(), 1);
}

#[tokio::test]
async fn test_attach_to_pod_that_never_started_resolves() {
	let mock = Arc::new(
		MockK8sClient::new()
			.with_phases(&["Failed"])
			.with_log_error("container not started"),
	);
	let (streams, _stdout, _keep) = io(false);

	let status = launcher(&mock, Arc::new(FakeTerminal::default()))
		.launch(&workload(), RunMode::Attach, streams, &[])
		.await
		.unwrap();

	assert!(matches!(status, ExitStatus::Ambiguous { .. }));
	assert_eq!(mock.attach_calls(), 0);
	assert_eq!(mock.delete_calls(), 1);
}

// ============================================================================
// Failure Paths
// ============================================================================

#[tokio::test]
async fn test_rejected_create_needs_no_cleanup() {
	let mock = Arc::new(MockK8sClient::new().with_create_error("exceeded quota"));
	let (streams, _stdout, _keep) = io(false);

	let err = launcher(&mock, Arc::new(FakeTerminal::default()))
		.launch(&workload(), RunMode::LogFollow, streams, &[])
		.await
		.unwrap_err();

	assert!(matches!(err, LaunchError::ClusterApi(_)));
	assert_eq!(mock.delete_calls(), 0);
}

#[tokio::test]
async fn test_missing_exec_command_creates_nothing() {
	let mock = Arc::new(MockK8sClient::new());
	let (streams, _stdout, _keep) = io(false);

	let err = launcher(&mock, Arc::new(FakeTerminal::default()))
		.launch(&workload(), RunMode::Exec, streams, &[])
		.await
		.unwrap_err();

	assert!(matches!(err, LaunchError::MissingExecCommand));
	assert!(mock.created_pods().is_empty());
	assert_eq!(mock.delete_calls(), 0);
}

#[tokio::test]
async fn test_stream_failure_still_deletes_pod() {
	let mock = Arc::new(
		MockK8sClient::new()
			.with_phases(&["Running"])
			.with_attach_error("upgrade refused"),
	);
	let (streams, _stdout, _keep) = io(false);

	let err = launcher(&mock, Arc::new(FakeTerminal::default()))
		.launch(&workload(), RunMode::Attach, streams, &[])
		.await
		.unwrap_err();

	assert!(matches!(err, LaunchError::StreamTransport { .. }));
	assert_eq!(mock.delete_calls(), 1);
}

#[tokio::test]
async fn test_failing_tunnel_fails_launch_fast() {
	let mock = Arc::new(
		MockK8sClient::new()
			.with_phases(&["Running"])
			.with_tunnel(80, TunnelBehavior::Hang)
			.with_tunnel(5432, TunnelBehavior::Fail("connection refused".to_string())),
	);
	let (streams, _stdout, _keep) = io(false);
	let ports = [PortMapping::new(8080, 80), PortMapping::new(5432, 5432)];

	let err = tokio::time::timeout(
		Duration::from_secs(2),
		launcher(&mock, Arc::new(FakeTerminal::default())).launch(
			&workload(),
			RunMode::Attach,
			streams,
			&ports,
		),
	)
	.await
	.expect("launch must not wait for the hung tunnel")
	.unwrap_err();

	assert!(matches!(err, LaunchError::StreamTransport { .. }));
	assert_eq!(mock.attach_calls(), 0);
	assert_eq!(mock.delete_calls(), 1);
}

#[tokio::test]
async fn test_delete_failure_does_not_override_result() {
	let mock = Arc::new(
		MockK8sClient::new()
			.with_phases(&["Running", "Succeeded"])
			.with_delete_error("etcd unavailable"),
	);
	let (streams, _stdout, _keep) = io(false);

	let status = launcher(&mock, Arc::new(FakeTerminal::default()))
		.launch(&workload(), RunMode::LogFollow, streams, &[])
		.await
		.unwrap();

	assert_eq!(status, ExitStatus::Success);
	assert_eq!(mock.delete_calls(), 1);
}

#[tokio::test]
async fn test_interrupt_while_pending_deletes_pod_once() {
	let mock = Arc::new(MockK8sClient::new().with_phases(&["Pending"]));
	let launcher = launcher(&mock, Arc::new(FakeTerminal::default()));
	let interrupt = launcher.interrupt_signal();
	tokio::spawn(async move {
		tokio::time::sleep(Duration::from_millis(50)).await;
		interrupt.stop();
	});
	let (streams, _stdout, _keep) = io(false);

	let err = launcher
		.launch(&workload(), RunMode::LogFollow, streams, &[])
		.await
		.unwrap_err();

	assert!(matches!(err, LaunchError::Interrupted));
	assert_eq!(err.exit_code(1), 1);
	assert_eq!(mock.delete_calls(), 1);
}

#[tokio::test]
async fn test_panic_mid_launch_still_deletes_pod_once() {
	let mock = Arc::new(MockK8sClient::new().with_phases(&["Running"]));
	let terminal = Arc::new(FakeTerminal {
		panic_on_raw: true,
		..Default::default()
	});
	let (streams, _stdout, _keep) = io(true);
	let spec = WorkloadSpec {
		stdin: true,
		tty: true,
		..workload()
	};
	let launcher = launcher(&mock, terminal);

	let result = AssertUnwindSafe(launcher.launch(&spec, RunMode::Attach, streams, &[]))
		.catch_unwind()
		.await;

	assert!(result.is_err());
	assert_eq!(mock.delete_calls(), 1);
}

#[tokio::test]
async fn test_deadline_race_still_deletes_pod_once() {
	let mock = Arc::new(MockK8sClient::new().with_phases(&["Pending"]));
	let launcher = launcher(&mock, Arc::new(FakeTerminal::default()));
	let (streams, _stdout, _keep) = io(false);

	let result = tokio::time::timeout(
		Duration::from_millis(100),
		launcher.launch(&workload(), RunMode::LogFollow, streams, &[]),
	)
	.await;
	assert!(result.is_err());

	// The delete runs on a spawned task once the launch future is gone.
	tokio::time::sleep(Duration::from_millis(200)).await;
	assert_eq!(mock.created_pods().len(), 1);
	assert_eq!(mock.delete_calls(), 1);
}

#[tokio::test]
async fn test_short_deadline_deletes_pod_once() {
	let mock = Arc::new(MockK8sClient::new().with_phases(&["Running", "Succeeded"]));
	let launcher = launcher(&mock, Arc::new(FakeTerminal::default()));
	let (streams, _stdout, _keep) = io(false);

	let _ = tokio::time::timeout(
		Duration::from_millis(10),
		launcher.launch(&workload(), RunMode::LogFollow, streams, &[]),
	)
	.await;

	tokio::time::sleep(Duration::from_millis(200)).await;
	assert_eq!(mock.delete_calls(), 1);
}

// ============================================================================
// Dry Run
// ============================================================================

#[tokio::test]
async fn test_dry_run_touches_nothing() {
	let mock = Arc::new(MockK8sClient::new());
	let yaml = launcher(&mock, Arc::new(FakeTerminal::default()))
		.render_dry_run(&workload(), RunMode::LogFollow)
		.unwrap();

	assert!(yaml.contains("kind: Pod"));
	assert!(yaml.contains("image: alpine:3.20"));
	assert!(yaml.contains("runtainer_name: runtainer-"));
	assert!(mock.created_pods().is_empty());
	assert_eq!(mock.delete_calls(), 0);
}
