// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Launch types.

use std::collections::BTreeMap;
use std::fmt;
use std::pin::Pin;
use std::str::FromStr;

use runtainer_k8s::Pod;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncWrite};

use crate::error::PortMappingError;

const POD_NAME_PREFIX: &str = "runtainer-";

/// Coarse lifecycle state of a pod.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Phase {
	Pending,
	Running,
	Succeeded,
	Failed,
	Unknown,
}

impl Phase {
	/// Map the phase string reported in a pod status.
	///
	/// A pod without a status has not been scheduled yet and counts as
	/// `Pending`; unrecognized values count as `Unknown`.
	pub fn of(pod: &Pod) -> Self {
		match pod.status.as_ref().and_then(|s| s.phase.as_deref()) {
			None | Some("Pending") => Phase::Pending,
			Some("Running") => Phase::Running,
			Some("Succeeded") => Phase::Succeeded,
			Some("Failed") => Phase::Failed,
			Some(_) => Phase::Unknown,
		}
	}

	/// No further transition happens from a terminal phase.
	pub fn is_terminal(self) -> bool {
		matches!(self, Phase::Succeeded | Phase::Failed | Phase::Unknown)
	}

	fn rank(self) -> u8 {
		match self {
			Phase::Pending => 0,
			Phase::Running => 1,
			Phase::Succeeded | Phase::Failed | Phase::Unknown => 2,
		}
	}

	/// Combine the current phase with a newly observed one.
	///
	/// Phases only move forward; a stale observation, or any observation once
	/// a terminal phase was reached, leaves the current phase unchanged.
	pub fn advance(self, observed: Phase) -> Phase {
		if self.is_terminal() || observed.rank() <= self.rank() {
			self
		} else {
			observed
		}
	}
}

impl fmt::Display for Phase {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let s = match self {
			Phase::Pending => "Pending",
			Phase::Running => "Running",
			Phase::Succeeded => "Succeeded",
			Phase::Failed => "Failed",
			Phase::Unknown => "Unknown",
		};
		f.write_str(s)
	}
}

/// Generated, unique pod name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PodName(String);

impl PodName {
	/// Generate a fresh `runtainer-<8 hex chars>` name.
	pub fn generate() -> Self {
		let suffix: [u8; 4] = rand::random();
		Self(format!("{POD_NAME_PREFIX}{}", hex::encode(suffix)))
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}
}

impl fmt::Display for PodName {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

/// The one pod created for a launch and its last observed phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PodHandle {
	pub name: PodName,
	pub namespace: String,
	phase: Phase,
}

impl PodHandle {
	pub fn new(name: PodName, namespace: impl Into<String>) -> Self {
		Self {
			name,
			namespace: namespace.into(),
			phase: Phase::Pending,
		}
	}

	pub fn phase(&self) -> Phase {
		self.phase
	}

	/// Record an observed phase, never moving backwards.
	pub fn observe(&mut self, observed: Phase) -> Phase {
		self.phase = self.phase.advance(observed);
		self.phase
	}
}

/// A forwarded local TCP port and its target port inside the pod.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PortMapping {
	pub local: u16,
	pub remote: u16,
}

impl PortMapping {
	pub fn new(local: u16, remote: u16) -> Self {
		Self { local, remote }
	}
}

impl FromStr for PortMapping {
	type Err = PortMappingError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let (local, remote) = s
			.split_once(':')
			.ok_or_else(|| PortMappingError::Format(s.to_string()))?;
		let parse = |port: &str| {
			port.trim().parse::<u16>().map_err(|_| PortMappingError::Port {
				mapping: s.to_string(),
				port: port.to_string(),
			})
		};
		Ok(Self {
			local: parse(local)?,
			remote: parse(remote)?,
		})
	}
}

impl fmt::Display for PortMapping {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}:{}", self.local, self.remote)
	}
}

/// How the launcher connects to the workload once the pod is up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
	/// Stream the pod's own entrypoint process
	Attach,
	/// Run `WorkloadSpec::exec_command` inside the running container
	Exec,
	/// Run the declared command via exec while the pod runs a placeholder
	ExecDeclared,
	/// Follow logs until the pod terminates
	LogFollow,
}

impl RunMode {
	pub fn is_interactive(self) -> bool {
		!matches!(self, RunMode::LogFollow)
	}
}

/// A host directory mounted into the workload container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeMapping {
	pub host_path: String,
	pub container_path: String,
}

/// Immutable description of the workload to run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkloadSpec {
	pub image: String,
	#[serde(default)]
	pub command: Vec<String>,
	#[serde(default)]
	pub args: Vec<String>,
	pub working_dir: Option<String>,
	#[serde(default)]
	pub env: BTreeMap<String, String>,
	/// Secrets exposed to the container as environment variables
	#[serde(default)]
	pub env_from_secrets: Vec<String>,
	#[serde(default)]
	pub volumes: Vec<VolumeMapping>,
	/// Secrets mounted read-only under `/rt-secrets/<name>`
	#[serde(default)]
	pub secret_volumes: Vec<String>,
	pub image_pull_secret: Option<String>,
	pub supplemental_group: Option<i64>,
	#[serde(default)]
	pub stdin: bool,
	#[serde(default)]
	pub tty: bool,
	/// Out-of-band command for [`RunMode::Exec`]
	pub exec_command: Option<Vec<String>>,
}

/// Local byte channels wired to the workload.
pub struct IoStreams {
	pub stdin: Option<Pin<Box<dyn AsyncRead + Send>>>,
	pub stdout: Pin<Box<dyn AsyncWrite + Send>>,
	pub stderr: Pin<Box<dyn AsyncWrite + Send>>,
}

impl IoStreams {
	/// The process's own standard streams.
	pub fn stdio(stdin: bool) -> Self {
		Self {
			stdin: stdin.then(|| Box::pin(tokio::io::stdin()) as Pin<Box<dyn AsyncRead + Send>>),
			stdout: Box::pin(tokio::io::stdout()),
			stderr: Box::pin(tokio::io::stderr()),
		}
	}
}

impl fmt::Debug for IoStreams {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("IoStreams")
			.field("stdin", &self.stdin.is_some())
			.finish_non_exhaustive()
	}
}
