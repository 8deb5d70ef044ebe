// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Local TCP ports forwarded into the pod.
//!
//! Every mapping gets its own task: it completes the port-forward handshake,
//! binds the local port, reports readiness and then serves connections. Each
//! accepted connection is carried by its own upgraded tunnel.

use std::net::Ipv4Addr;
use std::sync::Arc;

use runtainer_k8s::{K8sClient, PortTunnel};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};

use crate::error::LaunchError;
use crate::signal::StopSignal;
use crate::types::{Phase, PodHandle, PortMapping};

/// Opens port tunnels to a pod.
#[derive(Clone)]
pub struct PortTunnelManager {
	client: Arc<dyn K8sClient>,
}

impl PortTunnelManager {
	pub fn new(client: Arc<dyn K8sClient>) -> Self {
		Self { client }
	}

	/// Open one tunnel per mapping and wait until all are ready.
	///
	/// Fails fast: the first tunnel error is returned without waiting for the
	/// rest, and everything opened by this call is torn down. Nothing is
	/// opened when `mappings` is empty or the pod is no longer running.
	pub async fn forward_all(
		&self,
		handle: &PodHandle,
		mappings: &[PortMapping],
	) -> Result<TunnelSet, LaunchError> {
		if mappings.is_empty() {
			return Ok(TunnelSet::none());
		}
		if handle.phase() != Phase::Running {
			tracing::debug!(pod_name = %handle.name, phase = %handle.phase(), "Pod not running, skipping port forwarding");
			return Ok(TunnelSet::none());
		}

		let stop = StopSignal::new();
		let (ready_tx, mut ready_rx) = mpsc::channel(mappings.len());
		let tasks: Vec<_> = mappings
			.iter()
			.map(|&mapping| {
				tokio::spawn(run_tunnel(
					Arc::clone(&self.client),
					handle.name.to_string(),
					handle.namespace.clone(),
					mapping,
					stop.clone(),
					ready_tx.clone(),
				))
			})
			.collect();
		drop(ready_tx);

		let mut set = TunnelSet { stop, tasks };
		for _ in 0..mappings.len() {
			match ready_rx.recv().await {
				Some(Ok(())) => {}
				Some(Err(err)) => {
					set.abort();
					return Err(err);
				}
				None => {
					set.abort();
					return Err(LaunchError::transport("port tunnel exited before becoming ready"));
				}
			}
		}

		tracing::debug!(pod_name = %handle.name, count = mappings.len(), "All port tunnels ready");
		Ok(set)
	}
}

/// Established tunnels for one launch.
#[derive(Debug, Default)]
pub struct TunnelSet {
	stop: StopSignal,
	tasks: Vec<JoinHandle<()>>,
}

impl TunnelSet {
	/// A set with nothing to tear down.
	pub fn none() -> Self {
		Self::default()
	}

	pub fn len(&self) -> usize {
		self.tasks.len()
	}

	pub fn is_empty(&self) -> bool {
		self.tasks.is_empty()
	}

	/// Close every listener and live connection and wait for the tasks.
	pub async fn stop_all(mut self) {
		self.stop.stop();
		for task in std::mem::take(&mut self.tasks) {
			let _ = task.await;
		}
	}

	fn abort(&mut self) {
		self.stop.stop();
		for task in &self.tasks {
			task.abort();
		}
	}
}

impl Drop for TunnelSet {
	fn drop(&mut self) {
		self.stop.stop();
	}
}

async fn run_tunnel(
	client: Arc<dyn K8sClient>,
	name: String,
	namespace: String,
	mapping: PortMapping,
	stop: StopSignal,
	ready: mpsc::Sender<Result<(), LaunchError>>,
) {
	let first = match client.port_forward(&name, &namespace, mapping.remote).await {
		Ok(tunnel) => tunnel,
		Err(err) => {
			let _ = ready.send(Err(LaunchError::transport(err))).await;
			return;
		}
	};

	let listener = match TcpListener::bind((Ipv4Addr::LOCALHOST, mapping.local)).await {
		Ok(listener) => listener,
		Err(source) => {
			let _ = ready
				.send(Err(LaunchError::LocalBind {
					port: mapping.local,
					source,
				}))
				.await;
			return;
		}
	};

	tracing::info!(pod_name = %name, local = mapping.local, remote = mapping.remote, "Forwarding port");
	if ready.send(Ok(())).await.is_err() {
		return;
	}
	drop(ready);

	let mut spare = Some(first);
	// Dropped with the task, which aborts live connections.
	let mut connections = JoinSet::new();
	loop {
		let accepted = tokio::select! {
			biased;
			_ = stop.stopped() => break,
			accepted = listener.accept() => accepted,
		};

		let (socket, peer) = match accepted {
			Ok(accepted) => accepted,
			Err(err) => {
				tracing::warn!(local = mapping.local, error = %err, "Failed to accept connection");
				continue;
			}
		};
		tracing::debug!(local = mapping.local, peer = %peer, "Accepted connection");

		let tunnel = spare.take();
		let client = Arc::clone(&client);
		let (name, namespace) = (name.clone(), namespace.clone());
		connections.spawn(async move {
			let tunnel = match tunnel {
				Some(tunnel) => tunnel,
				None => match client.port_forward(&name, &namespace, mapping.remote).await {
					Ok(tunnel) => tunnel,
					Err(err) => {
						tracing::warn!(pod_name = %name, remote = mapping.remote, error = %err, "Failed to open port tunnel");
						return;
					}
				},
			};
			relay(socket, tunnel).await;
		});

		while connections.try_join_next().is_some() {}
	}

	tracing::debug!(local = mapping.local, "Port tunnel closed");
}

async fn relay(mut socket: TcpStream, mut tunnel: PortTunnel) {
	match tokio::io::copy_bidirectional(&mut socket, &mut tunnel.io).await {
		Ok((sent, received)) => {
			tracing::trace!(remote = tunnel.port, sent, received, "Connection closed");
		}
		Err(err) => {
			tracing::debug!(remote = tunnel.port, error = %err, "Connection ended with error");
		}
	}
}
