// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! One-shot stop signal shared between background tasks.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;

#[derive(Debug, Default)]
struct Inner {
	stopped: AtomicBool,
	notify: Notify,
}

/// A cancellation primitive that can be triggered at most once.
///
/// Clones share state. Any number of tasks may wait on [`StopSignal::stopped`];
/// once triggered the signal stays triggered.
#[derive(Debug, Clone, Default)]
pub struct StopSignal {
	inner: Arc<Inner>,
}

impl StopSignal {
	pub fn new() -> Self {
		Self::default()
	}

	/// Trigger the signal.
	///
	/// Returns `true` only for the call that performed the transition.
	pub fn stop(&self) -> bool {
		let transitioned = self
			.inner
			.stopped
			.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
			.is_ok();
		if transitioned {
			self.inner.notify.notify_waiters();
		}
		transitioned
	}

	pub fn is_stopped(&self) -> bool {
		self.inner.stopped.load(Ordering::Acquire)
	}

	/// Resolve once the signal has been triggered.
	pub async fn stopped(&self) {
		loop {
			let notified = self.inner.notify.notified();
			tokio::pin!(notified);
			// Register before checking the flag so a concurrent stop() is not missed.
			notified.as_mut().enable();
			if self.is_stopped() {
				return;
			}
			notified.await;
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::time::Duration;

	#[test]
	fn stop_transitions_once() {
		let signal = StopSignal::new();
		assert!(!signal.is_stopped());
		assert!(signal.stop());
		assert!(!signal.stop());
		assert!(signal.is_stopped());
	}

	#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
	async fn concurrent_stops_transition_exactly_once() {
		let signal = StopSignal::new();
		let mut tasks = Vec::new();
		for _ in 0..32 {
			let signal = signal.clone();
			tasks.push(tokio::spawn(async move { signal.stop() }));
		}

		let mut transitions = 0;
		for task in tasks {
			if task.await.unwrap() {
				transitions += 1;
			}
		}
		assert_eq!(transitions, 1);
		assert!(signal.is_stopped());
	}

	#[tokio::test]
	async fn all_waiters_are_released() {
		let signal = StopSignal::new();
		let waiters: Vec<_> = (0..8)
			.map(|_| {
				let signal = signal.clone();
				tokio::spawn(async move { signal.stopped().await })
			})
			.collect();

		tokio::time::sleep(Duration::from_millis(10)).await;
		signal.stop();

		for waiter in waiters {
			tokio::time::timeout(Duration::from_secs(1), waiter)
				.await
				.expect("waiter should be released")
				.unwrap();
		}
	}

	#[tokio::test]
	async fn waiting_after_stop_returns_immediately() {
		let signal = StopSignal::new();
		signal.stop();
		tokio::time::timeout(Duration::from_millis(100), signal.stopped())
			.await
			.expect("already stopped");
	}
}
