// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Launch error types.

use runtainer_k8s::K8sError;

/// Errors that can occur while launching and running a workload pod.
#[derive(Debug, thiserror::Error)]
pub enum LaunchError {
	/// The cluster rejected a pod create/delete or a watch subscription
	#[error("cluster API error: {0}")]
	ClusterApi(#[from] K8sError),

	/// Attach, exec, log or tunnel transport failed
	#[error("stream transport error: {message}")]
	StreamTransport { message: String },

	/// A local tunnel endpoint could not be bound
	#[error("failed to listen on local port {port}: {source}")]
	LocalBind {
		port: u16,
		#[source]
		source: std::io::Error,
	},

	/// The pod failed but the cluster did not report a usable exit code
	#[error("workload failed without a usable exit code: {reason}")]
	AmbiguousExit { reason: String },

	/// The workload failed with a concrete exit code
	#[error("workload exited with code {code}")]
	ExitCode { code: i32, reason: Option<String> },

	/// The pod watch ended before a usable phase was observed
	#[error("watch for pod {pod} closed before a usable phase was observed")]
	WatchClosed { pod: String },

	/// The local terminal could not be switched to or from raw mode
	#[error("terminal error: {0}")]
	Terminal(#[source] std::io::Error),

	/// The pod spec could not be rendered for a dry run
	#[error("failed to render pod spec: {0}")]
	Render(#[from] serde_yaml::Error),

	/// An exec mode was selected without a command to run
	#[error("exec mode requires a command to run")]
	MissingExecCommand,

	/// The launch was interrupted before the workload finished
	#[error("launch interrupted")]
	Interrupted,
}

impl LaunchError {
	/// Wrap a transport-level failure from the K8s client or local I/O.
	pub fn transport(err: impl std::fmt::Display) -> Self {
		Self::StreamTransport {
			message: err.to_string(),
		}
	}

	/// Process exit code for this error: the carried workload code, or
	/// `generic` for every other failure.
	pub fn exit_code(&self, generic: i32) -> i32 {
		self.carried_exit_code().unwrap_or(generic)
	}

	/// The workload's own exit code, when the error carries one.
	pub fn carried_exit_code(&self) -> Option<i32> {
		match self {
			Self::ExitCode { code, .. } => Some(*code),
			_ => None,
		}
	}
}

/// Error parsing a `local:remote` port mapping.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PortMappingError {
	#[error("invalid port mapping '{0}': expected LOCAL:REMOTE")]
	Format(String),

	#[error("invalid port '{port}' in mapping '{mapping}'")]
	Port { mapping: String, port: String },
}
