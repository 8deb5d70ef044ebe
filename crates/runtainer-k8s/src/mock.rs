// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! In-memory [`K8sClient`] for exercising pod launches without a cluster.
//!
//! The mock plays back a scripted sequence of pod snapshots after
//! `create_pod`, serves a fixed list of events and log chunks, and hands out
//! `tokio::io::duplex` pipes for attach, exec and port-forward calls.

use std::collections::HashMap;
use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::channel::mpsc;
use futures::StreamExt;
use tokio::io::{AsyncRead, AsyncWriteExt, ReadBuf};
use tokio::sync::watch;

use crate::client::K8sClient;
use crate::error::K8sError;
use crate::types::{
	AttachOptions, AttachedProcess, ContainerState, ContainerStateTerminated, ContainerStatus,
	Event, EventWatch, LogStream, ObjectMeta, ObjectReference, Pod, PodStatus, PodWatch,
	PortTunnel, Status, TerminalSize,
};

/// How a port-forward handshake to a given pod port behaves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TunnelBehavior {
	/// Handshake succeeds; the tunnel echoes bytes back.
	Ready,
	/// Handshake fails with the given message.
	Fail(String),
	/// Handshake never completes.
	Hang,
}

/// Build a bare pod snapshot in the given phase.
pub fn pod_in_phase(phase: &str) -> Pod {
	Pod {
		status: Some(PodStatus {
			phase: Some(phase.to_string()),
			..Default::default()
		}),
		..Default::default()
	}
}

/// Build a `Failed` pod whose first container terminated with `exit_code`.
///
/// `None` leaves the terminated record out entirely.
pub fn failed_pod(exit_code: Option<i32>, reason: Option<&str>) -> Pod {
	let mut pod = pod_in_phase("Failed");
	if let Some(exit_code) = exit_code {
		if let Some(status) = pod.status.as_mut() {
			status.container_statuses = Some(vec![ContainerStatus {
				name: "runtainer".to_string(),
				state: Some(ContainerState {
					terminated: Some(ContainerStateTerminated {
						exit_code,
						reason: reason.map(str::to_string),
						..Default::default()
					}),
					..Default::default()
				}),
				..Default::default()
			}]);
		}
	}
	pod
}

/// Build a core/v1 event about the named object.
pub fn event_for(kind: &str, namespace: &str, name: &str, reason: &str, message: &str) -> Event {
	Event {
		involved_object: ObjectReference {
			kind: Some(kind.to_string()),
			namespace: Some(namespace.to_string()),
			name: Some(name.to_string()),
			..Default::default()
		},
		type_: Some("Normal".to_string()),
		reason: Some(reason.to_string()),
		message: Some(message.to_string()),
		..Default::default()
	}
}

#[derive(Default)]
struct MockState {
	create_error: Option<K8sError>,
	delete_error: Option<K8sError>,
	attach_error: Option<K8sError>,
	watch_error: Option<K8sError>,
	log_error: Option<K8sError>,
	silent_watch: bool,
	broken_stream: bool,
	phase_script: Vec<Pod>,
	events: Vec<Event>,
	logs: Vec<Bytes>,
	remote_output: Vec<u8>,
	exec_status: Option<Status>,
	tunnels: HashMap<u16, TunnelBehavior>,
	created: Vec<Pod>,
	attach_options: Vec<AttachOptions>,
	exec_commands: Vec<Vec<String>>,
	forwarded_ports: Vec<u16>,
}

/// A scripted, in-memory K8s client.
pub struct MockK8sClient {
	state: Mutex<MockState>,
	current: Arc<watch::Sender<Option<Pod>>>,
	resizes: Arc<Mutex<Vec<(u16, u16)>>>,
	step: Duration,
	delete_calls: AtomicUsize,
	log_calls: AtomicUsize,
	attach_calls: AtomicUsize,
	exec_calls: AtomicUsize,
}

impl Default for MockK8sClient {
	fn default() -> Self {
		Self::new()
	}
}

impl MockK8sClient {
	pub fn new() -> Self {
		let (current, _) = watch::channel(None);
		Self {
			state: Mutex::new(MockState::default()),
			current: Arc::new(current),
			resizes: Arc::new(Mutex::new(Vec::new())),
			step: Duration::from_millis(10),
			delete_calls: AtomicUsize::new(0),
			log_calls: AtomicUsize::new(0),
			attach_calls: AtomicUsize::new(0),
			exec_calls: AtomicUsize::new(0),
		}
	}

	fn state(&self) -> MutexGuard<'_, MockState> {
		lock(&self.state)
	}

	/// Snapshots published one `step` apart after the pod is created.
	pub fn with_phase_script(self, script: Vec<Pod>) -> Self {
		self.state().phase_script = script;
		self
	}

	/// Shorthand for a script of bare phase snapshots.
	pub fn with_phases(self, phases: &[&str]) -> Self {
		self.with_phase_script(phases.iter().map(|p| pod_in_phase(p)).collect())
	}

	pub fn with_step(mut self, step: Duration) -> Self {
		self.step = step;
		self
	}

	pub fn with_create_error(self, message: &str) -> Self {
		self.state().create_error = Some(K8sError::ApiError {
			message: message.to_string(),
		});
		self
	}

	pub fn with_delete_error(self, message: &str) -> Self {
		self.state().delete_error = Some(K8sError::ApiError {
			message: message.to_string(),
		});
		self
	}

	pub fn with_attach_error(self, message: &str) -> Self {
		self.state().attach_error = Some(K8sError::AttachError {
			message: message.to_string(),
		});
		self
	}

	pub fn with_watch_error(self, message: &str) -> Self {
		self.state().watch_error = Some(K8sError::WatchError {
			message: message.to_string(),
		});
		self
	}

	/// Watches deliver nothing; state is only visible through `get_pod`.
	pub fn with_silent_watch(self) -> Self {
		self.state().silent_watch = true;
		self
	}

	/// Make the remote stdout fail with a broken pipe instead of closing.
	pub fn with_broken_stream(self) -> Self {
		self.state().broken_stream = true;
		self
	}

	pub fn with_events(self, events: Vec<Event>) -> Self {
		self.state().events = events;
		self
	}

	/// Fail every log stream request, as for a pod whose container never started.
	pub fn with_log_error(self, message: &str) -> Self {
		self.state().log_error = Some(K8sError::StreamError {
			message: message.to_string(),
		});
		self
	}

	pub fn with_logs(self, chunks: &[&str]) -> Self {
		self.state().logs = chunks
			.iter()
			.map(|c| Bytes::copy_from_slice(c.as_bytes()))
			.collect();
		self
	}

	/// Bytes the remote process writes to stdout before closing the stream.
	pub fn with_remote_output(self, output: &[u8]) -> Self {
		self.state().remote_output = output.to_vec();
		self
	}

	pub fn with_exec_status(self, status: Status) -> Self {
		self.state().exec_status = Some(status);
		self
	}

	pub fn with_tunnel(self, port: u16, behavior: TunnelBehavior) -> Self {
		self.state().tunnels.insert(port, behavior);
		self
	}

	/// Publish a pod snapshot to watchers and `get_pod` callers immediately.
	pub fn publish(&self, pod: Pod) {
		self.current.send_replace(Some(pod));
	}

	pub fn delete_calls(&self) -> usize {
		self.delete_calls.load(Ordering::SeqCst)
	}

	pub fn log_calls(&self) -> usize {
		self.log_calls.load(Ordering::SeqCst)
	}

	pub fn attach_calls(&self) -> usize {
		self.attach_calls.load(Ordering::SeqCst)
	}

	pub fn exec_calls(&self) -> usize {
		self.exec_calls.load(Ordering::SeqCst)
	}

	pub fn created_pods(&self) -> Vec<Pod> {
		self.state().created.clone()
	}

	pub fn attach_options(&self) -> Vec<AttachOptions> {
		self.state().attach_options.clone()
	}

	pub fn exec_commands(&self) -> Vec<Vec<String>> {
		self.state().exec_commands.clone()
	}

	pub fn forwarded_ports(&self) -> Vec<u16> {
		self.state().forwarded_ports.clone()
	}

	/// Terminal sizes received over resize channels, as `(width, height)`.
	pub fn resizes(&self) -> Vec<(u16, u16)> {
		lock(&self.resizes).clone()
	}

	fn process(&self, opts: &AttachOptions) -> AttachedProcess {
		let state = self.state();

		let stdout: Pin<Box<dyn AsyncRead + Send>> = if state.broken_stream {
			Box::pin(BrokenPipe)
		} else {
			let (mut remote, local) = tokio::io::duplex(1024);
			let output = state.remote_output.clone();
			tokio::spawn(async move {
				let _ = remote.write_all(&output).await;
				let _ = remote.shutdown().await;
			});
			Box::pin(local)
		};

		let stdin = opts.stdin.then(|| {
			let (local, mut remote) = tokio::io::duplex(1024);
			tokio::spawn(async move {
				let _ = tokio::io::copy(&mut remote, &mut tokio::io::sink()).await;
			});
			Box::pin(local) as Pin<Box<dyn tokio::io::AsyncWrite + Send>>
		});

		let stderr = (opts.stderr && !opts.tty).then(|| {
			let (_remote, local) = tokio::io::duplex(64);
			Box::pin(local) as Pin<Box<dyn AsyncRead + Send>>
		});

		let resize = opts.tty.then(|| {
			let (tx, mut rx) = mpsc::channel::<TerminalSize>(4);
			let resizes = Arc::clone(&self.resizes);
			tokio::spawn(async move {
				while let Some(size) = rx.next().await {
					lock(&resizes).push((size.width, size.height));
				}
			});
			tx
		});

		let status = state.exec_status.clone();
		AttachedProcess {
			stdin,
			stdout: Some(stdout),
			stderr,
			resize,
			status: Box::pin(futures::future::ready(status)),
		}
	}
}

struct BrokenPipe;

impl AsyncRead for BrokenPipe {
	fn poll_read(
		self: Pin<&mut Self>,
		_cx: &mut Context<'_>,
		_buf: &mut ReadBuf<'_>,
	) -> Poll<io::Result<()>> {
		Poll::Ready(Err(io::Error::from(io::ErrorKind::BrokenPipe)))
	}
}

#[async_trait]
impl K8sClient for MockK8sClient {
	async fn create_pod(&self, namespace: &str, mut pod: Pod) -> Result<Pod, K8sError> {
		let script = {
			let mut state = self.state();
			if let Some(err) = state.create_error.clone() {
				return Err(err);
			}
			pod.metadata.namespace = Some(namespace.to_string());
			state.created.push(pod.clone());
			state.phase_script.clone()
		};

		self.current.send_replace(Some(pod.clone()));

		let metadata = pod.metadata.clone();
		let current = Arc::clone(&self.current);
		let step = self.step;
		tokio::spawn(async move {
			for mut snapshot in script {
				tokio::time::sleep(step).await;
				snapshot.metadata = ObjectMeta {
					name: metadata.name.clone(),
					namespace: metadata.namespace.clone(),
					..Default::default()
				};
				current.send_replace(Some(snapshot));
			}
		});

		Ok(pod)
	}

	async fn delete_pod(
		&self,
		_name: &str,
		_namespace: &str,
		_grace_period_seconds: u32,
	) -> Result<(), K8sError> {
		self.delete_calls.fetch_add(1, Ordering::SeqCst);
		match self.state().delete_error.clone() {
			Some(err) => Err(err),
			None => Ok(()),
		}
	}

	async fn get_pod(&self, name: &str, _namespace: &str) -> Result<Pod, K8sError> {
		self
			.current
			.borrow()
			.clone()
			.filter(|pod| pod.metadata.name.as_deref() == Some(name) || pod.metadata.name.is_none())
			.ok_or_else(|| K8sError::PodNotFound { name: name.into() })
	}

	async fn watch_pod(&self, _name: &str, _namespace: &str) -> Result<PodWatch, K8sError> {
		{
			let state = self.state();
			if let Some(err) = state.watch_error.clone() {
				return Err(err);
			}
			if state.silent_watch {
				return Ok(Box::pin(futures::stream::pending()));
			}
		}

		let rx = self.current.subscribe();
		let stream = futures::stream::unfold((rx, true), |(mut rx, first)| async move {
			if !first && rx.changed().await.is_err() {
				return None;
			}
			let pod = rx.borrow_and_update().clone();
			Some((pod, (rx, false)))
		})
		.filter_map(|pod| async move { pod.map(Ok) });
		Ok(Box::pin(stream))
	}

	async fn watch_events(&self, _namespace: &str) -> Result<EventWatch, K8sError> {
		let events = self.state().events.clone();
		let stream = futures::stream::iter(events.into_iter().map(Ok))
			.chain(futures::stream::pending());
		Ok(Box::pin(stream))
	}

	async fn stream_logs(
		&self,
		_name: &str,
		_namespace: &str,
		_container: &str,
	) -> Result<LogStream, K8sError> {
		self.log_calls.fetch_add(1, Ordering::SeqCst);
		let logs = {
			let state = self.state();
			if let Some(err) = state.log_error.clone() {
				return Err(err);
			}
			state.logs.clone()
		};
		Ok(Box::pin(futures::stream::iter(logs.into_iter().map(Ok))))
	}

	async fn attach(
		&self,
		_name: &str,
		_namespace: &str,
		opts: &AttachOptions,
	) -> Result<AttachedProcess, K8sError> {
		self.attach_calls.fetch_add(1, Ordering::SeqCst);
		{
			let mut state = self.state();
			state.attach_options.push(opts.clone());
			if let Some(err) = state.attach_error.clone() {
				return Err(err);
			}
		}
		Ok(self.process(opts))
	}

	async fn exec(
		&self,
		_name: &str,
		_namespace: &str,
		command: &[String],
		opts: &AttachOptions,
	) -> Result<AttachedProcess, K8sError> {
		self.exec_calls.fetch_add(1, Ordering::SeqCst);
		{
			let mut state = self.state();
			state.attach_options.push(opts.clone());
			state.exec_commands.push(command.to_vec());
			if let Some(err) = state.attach_error.clone() {
				return Err(err);
			}
		}
		Ok(self.process(opts))
	}

	async fn port_forward(
		&self,
		_name: &str,
		_namespace: &str,
		port: u16,
	) -> Result<PortTunnel, K8sError> {
		let behavior = {
			let mut state = self.state();
			state.forwarded_ports.push(port);
			state
				.tunnels
				.get(&port)
				.cloned()
				.unwrap_or(TunnelBehavior::Ready)
		};

		match behavior {
			TunnelBehavior::Ready => {
				let (local, remote) = tokio::io::duplex(1024);
				tokio::spawn(async move {
					let (mut reader, mut writer) = tokio::io::split(remote);
					let _ = tokio::io::copy(&mut reader, &mut writer).await;
				});
				Ok(PortTunnel {
					port,
					io: Box::new(local),
				})
			}
			TunnelBehavior::Fail(message) => Err(K8sError::PortForwardError { port, message }),
			TunnelBehavior::Hang => futures::future::pending().await,
		}
	}
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
	mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
