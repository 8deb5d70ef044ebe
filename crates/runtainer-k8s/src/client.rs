// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

use async_trait::async_trait;

use crate::error::K8sError;
use crate::types::{
	AttachOptions, AttachedProcess, EventWatch, LogStream, Pod, PodWatch, PortTunnel,
};

/// Trait for K8s client operations.
///
/// This abstraction allows for easy mocking in tests while providing
/// a clean interface for the K8s operations needed to run one ephemeral pod.
#[async_trait]
pub trait K8sClient: Send + Sync {
	/// Create a new pod in the specified namespace.
	async fn create_pod(&self, namespace: &str, pod: Pod) -> Result<Pod, K8sError>;

	/// Delete a pod by name from the specified namespace.
	async fn delete_pod(
		&self,
		name: &str,
		namespace: &str,
		grace_period_seconds: u32,
	) -> Result<(), K8sError>;

	/// Get a specific pod by name from the specified namespace.
	async fn get_pod(&self, name: &str, namespace: &str) -> Result<Pod, K8sError>;

	/// Subscribe to changes of a single pod.
	async fn watch_pod(&self, name: &str, namespace: &str) -> Result<PodWatch, K8sError>;

	/// Subscribe to all events in a namespace.
	async fn watch_events(&self, namespace: &str) -> Result<EventWatch, K8sError>;

	/// Follow logs from a container in a pod.
	async fn stream_logs(
		&self,
		name: &str,
		namespace: &str,
		container: &str,
	) -> Result<LogStream, K8sError>;

	/// Attach to the container's own process.
	async fn attach(
		&self,
		name: &str,
		namespace: &str,
		opts: &AttachOptions,
	) -> Result<AttachedProcess, K8sError>;

	/// Run an additional command inside the running container.
	async fn exec(
		&self,
		name: &str,
		namespace: &str,
		command: &[String],
		opts: &AttachOptions,
	) -> Result<AttachedProcess, K8sError>;

	/// Open one upgraded connection to `port` inside the pod.
	async fn port_forward(
		&self,
		name: &str,
		namespace: &str,
		port: u16,
	) -> Result<PortTunnel, K8sError>;
}
