// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

use std::pin::Pin;

use bytes::Bytes;
use futures::channel::mpsc;
use futures::future::BoxFuture;
use futures::Stream;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::error::K8sError;

pub use k8s_openapi::api::core::v1::{
	Container, ContainerState, ContainerStateTerminated, ContainerStatus, EnvFromSource, EnvVar,
	Event, HostPathVolumeSource, LocalObjectReference, ObjectReference, Pod, PodSecurityContext,
	PodSpec, PodStatus, SecretEnvSource, SecretVolumeSource, Volume, VolumeMount,
};
pub use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, Status, StatusCause, StatusDetails};
pub use kube::api::TerminalSize;

/// A pinned stream of log bytes from a container.
pub type LogStream = Pin<Box<dyn Stream<Item = Result<Bytes, std::io::Error>> + Send>>;

/// Live snapshots of a single pod, as delivered by the watch API.
pub type PodWatch = Pin<Box<dyn Stream<Item = Result<Pod, K8sError>> + Send>>;

/// Live core/v1 events for one namespace.
pub type EventWatch = Pin<Box<dyn Stream<Item = Result<Event, K8sError>> + Send>>;

/// Which standard streams to wire up for an attach or exec call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttachOptions {
	pub container: String,
	pub stdin: bool,
	pub stdout: bool,
	pub stderr: bool,
	pub tty: bool,
}

/// Bidirectional stream for container I/O via exec/attach.
///
/// `status` resolves once the remote side has closed the stream. For exec
/// calls it carries the remote process outcome; attach calls usually yield
/// `None`.
pub struct AttachedProcess {
	pub stdin: Option<Pin<Box<dyn AsyncWrite + Send>>>,
	pub stdout: Option<Pin<Box<dyn AsyncRead + Send>>>,
	pub stderr: Option<Pin<Box<dyn AsyncRead + Send>>>,
	pub resize: Option<mpsc::Sender<TerminalSize>>,
	pub status: BoxFuture<'static, Option<Status>>,
}

/// Byte stream of one forwarded connection.
pub trait TunnelIo: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> TunnelIo for T {}

/// One upgraded connection to a port inside a pod.
pub struct PortTunnel {
	pub port: u16,
	pub io: Box<dyn TunnelIo>,
}

impl std::fmt::Debug for PortTunnel {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("PortTunnel").field("port", &self.port).finish()
	}
}
