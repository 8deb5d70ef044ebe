// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Blocking wait for a pod to reach a lifecycle phase.
//!
//! The watcher is driven by a live watch on the single pod. A resync timer
//! re-reads the pod on a fixed period so a dropped watch event cannot stall a
//! waiter forever.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use runtainer_k8s::{K8sClient, K8sError, Pod, PodWatch};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;

use crate::error::LaunchError;
use crate::signal::StopSignal;
use crate::types::{Phase, PodHandle};

/// Period of the safety-net re-read of the pod.
pub const DEFAULT_RESYNC_INTERVAL: Duration = Duration::from_secs(1);

const FEED_CAPACITY: usize = 16;

/// Waits for a pod to reach one of a set of phases.
#[derive(Clone)]
pub struct PhaseWatcher {
	client: Arc<dyn K8sClient>,
	resync: Duration,
}

impl PhaseWatcher {
	pub fn new(client: Arc<dyn K8sClient>) -> Self {
		Self {
			client,
			resync: DEFAULT_RESYNC_INTERVAL,
		}
	}

	pub fn with_resync_interval(mut self, resync: Duration) -> Self {
		self.resync = resync;
		self
	}

	/// Block until the pod is observed in one of `targets`, or in any terminal
	/// phase, and return that snapshot.
	///
	/// Stale snapshots never move the observed phase backwards. There is no
	/// timeout: a pod stuck in `Pending` keeps the caller waiting.
	pub async fn wait_for_phase(
		&self,
		handle: &mut PodHandle,
		targets: &[Phase],
	) -> Result<Pod, LaunchError> {
		let stop = StopSignal::new();
		let (tx, mut rx) = mpsc::channel(FEED_CAPACITY);
		let feed = tokio::spawn(feed_pod(
			Arc::clone(&self.client),
			handle.name.to_string(),
			handle.namespace.clone(),
			self.resync,
			stop.clone(),
			tx,
		));

		let outcome = loop {
			let pod = match rx.recv().await {
				Some(Ok(pod)) => pod,
				Some(Err(err)) => break Err(err),
				None => {
					break Err(LaunchError::WatchClosed {
						pod: handle.name.to_string(),
					})
				}
			};

			let observed = Phase::of(&pod);
			let previous = handle.phase();
			let current = handle.observe(observed);
			if current != previous {
				tracing::debug!(pod_name = %handle.name, from = %previous, to = %current, "Pod phase changed");
			}

			if observed == current && unblocks(current, targets) {
				break Ok(pod);
			}
		};

		stop.stop();
		drop(rx);
		if let Err(err) = feed.await {
			if err.is_panic() {
				std::panic::resume_unwind(err.into_panic());
			}
		}

		outcome
	}
}

/// Whether a phase ends a wait for `targets`.
pub fn unblocks(phase: Phase, targets: &[Phase]) -> bool {
	targets.contains(&phase) || phase.is_terminal()
}

enum Feed {
	Stopped,
	Watch(Option<Result<Pod, K8sError>>),
	Resync,
}

async fn next_watched(watch: &mut Option<PodWatch>) -> Option<Result<Pod, K8sError>> {
	match watch {
		Some(watch) => watch.next().await,
		None => futures::future::pending().await,
	}
}

async fn feed_pod(
	client: Arc<dyn K8sClient>,
	name: String,
	namespace: String,
	resync: Duration,
	stop: StopSignal,
	tx: mpsc::Sender<Result<Pod, LaunchError>>,
) {
	let mut watch = match client.watch_pod(&name, &namespace).await {
		Ok(watch) => Some(watch),
		Err(err) => {
			let _ = tx.send(Err(err.into())).await;
			return;
		}
	};

	let mut ticker = tokio::time::interval(resync);
	ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

	loop {
		let next = tokio::select! {
			biased;
			_ = stop.stopped() => Feed::Stopped,
			item = next_watched(&mut watch) => Feed::Watch(item),
			_ = ticker.tick() => Feed::Resync,
		};

		let item = match next {
			Feed::Stopped => break,
			Feed::Watch(Some(item)) => item.map_err(LaunchError::from),
			Feed::Watch(None) => {
				tracing::debug!(pod_name = %name, "Pod watch ended, relying on resync");
				watch = None;
				continue;
			}
			Feed::Resync => match client.get_pod(&name, &namespace).await {
				Ok(pod) => Ok(pod),
				// Not visible yet to the read path.
				Err(err) if err.is_not_found() => continue,
				Err(err) => Err(err.into()),
			},
		};

		let failed = item.is_err();
		if tx.send(item).await.is_err() || failed {
			break;
		}
	}
}
