// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Background forwarding of cluster events about one pod.
//!
//! Purely diagnostic. Subscription failures are logged and a missed or late
//! event never changes the outcome of a launch.

use std::sync::{Arc, Mutex, PoisonError};

use futures::StreamExt;
use runtainer_k8s::{Event, EventWatch, K8sClient};
use tokio::task::JoinHandle;

use crate::signal::StopSignal;
use crate::types::PodHandle;

const POD_KIND: &str = "Pod";

/// A cluster event about the launched pod.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PodEvent {
	/// `Normal` or `Warning`
	pub category: String,
	pub reason: String,
	pub message: String,
}

impl From<&Event> for PodEvent {
	fn from(event: &Event) -> Self {
		Self {
			category: event.type_.clone().unwrap_or_default(),
			reason: event.reason.clone().unwrap_or_default(),
			message: event.message.clone().unwrap_or_default(),
		}
	}
}

/// Receiver for forwarded pod events.
pub trait EventSink: Send + Sync {
	fn emit(&self, event: &PodEvent);
}

impl<F> EventSink for F
where
	F: Fn(&PodEvent) + Send + Sync,
{
	fn emit(&self, event: &PodEvent) {
		self(event)
	}
}

/// Emits events through `tracing` at `info` on the `runtainer::events` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
	fn emit(&self, event: &PodEvent) {
		tracing::info!(
			target: "runtainer::events",
			category = %event.category,
			reason = %event.reason,
			"{}",
			event.message
		);
	}
}

/// Whether an event's subject is the given pod.
pub fn event_matches(event: &Event, handle: &PodHandle) -> bool {
	let subject = &event.involved_object;
	subject.kind.as_deref() == Some(POD_KIND)
		&& subject.namespace.as_deref() == Some(handle.namespace.as_str())
		&& subject.name.as_deref() == Some(handle.name.as_str())
}

/// Running event subscription for one pod.
pub struct EventLogger {
	stop: StopSignal,
	task: Option<JoinHandle<()>>,
}

impl EventLogger {
	/// Subscribe to the namespace's event stream and start forwarding events
	/// about `handle` to `sink`.
	///
	/// The subscription is established before this returns.
	pub async fn start(
		client: Arc<dyn K8sClient>,
		handle: &PodHandle,
		sink: Arc<dyn EventSink>,
	) -> Self {
		let stop = StopSignal::new();
		let task = match client.watch_events(&handle.namespace).await {
			Ok(events) => Some(tokio::spawn(forward_events(
				events,
				handle.clone(),
				Mutex::new(sink),
				stop.clone(),
			))),
			Err(err) => {
				tracing::warn!(pod_name = %handle.name, error = %err, "Failed to subscribe to cluster events");
				None
			}
		};
		Self { stop, task }
	}

	/// Stop forwarding. Safe to call any number of times, concurrently.
	pub fn stop(&self) {
		if self.stop.stop() {
			tracing::debug!("Event logger stopped");
		}
	}

	pub fn is_stopped(&self) -> bool {
		self.stop.is_stopped()
	}

	/// Stop and wait for the forwarding task to exit.
	pub async fn shutdown(mut self) {
		self.stop();
		if let Some(task) = self.task.take() {
			let _ = task.await;
		}
	}
}

impl Drop for EventLogger {
	fn drop(&mut self) {
		self.stop.stop();
	}
}

async fn forward_events(
	mut events: EventWatch,
	handle: PodHandle,
	sink: Mutex<Arc<dyn EventSink>>,
	stop: StopSignal,
) {
	loop {
		let next = tokio::select! {
			biased;
			_ = stop.stopped() => break,
			next = events.next() => next,
		};

		match next {
			Some(Ok(event)) if event_matches(&event, &handle) => {
				let event = PodEvent::from(&event);
				sink.lock()
					.unwrap_or_else(PoisonError::into_inner)
					.emit(&event);
			}
			Some(Ok(_)) => {}
			Some(Err(err)) => {
				tracing::debug!(pod_name = %handle.name, error = %err, "Event watch error");
			}
			None => break,
		}
	}
}
