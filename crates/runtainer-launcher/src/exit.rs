// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Workload exit status resolution.

use runtainer_k8s::{Pod, Status};

use crate::error::LaunchError;
use crate::phase::PhaseWatcher;
use crate::types::{Phase, PodHandle};

const STATUS_SUCCESS: &str = "Success";
const NON_ZERO_EXIT_CODE: &str = "NonZeroExitCode";
const EXIT_CODE_CAUSE: &str = "ExitCode";

/// Outcome of a finished workload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitStatus {
	Success,
	/// The workload failed with a concrete code
	Carried { code: i32, reason: Option<String> },
	/// The workload failed but the cluster did not confirm a code
	Ambiguous { reason: String },
}

impl ExitStatus {
	/// Sort a resolved exit code or exit error into a status.
	///
	/// Errors that are not about the workload's own exit are passed through.
	pub fn from_outcome(outcome: Result<i32, LaunchError>) -> Result<Self, LaunchError> {
		match outcome {
			Ok(0) => Ok(Self::Success),
			Ok(code) => Ok(Self::Carried { code, reason: None }),
			Err(LaunchError::ExitCode { code, reason }) => Ok(Self::Carried { code, reason }),
			Err(LaunchError::AmbiguousExit { reason }) => Ok(Self::Ambiguous { reason }),
			Err(err) => Err(err),
		}
	}

	/// Process exit code, with `generic` standing in for an unconfirmed one.
	pub fn code(&self, generic: i32) -> i32 {
		match self {
			Self::Success => 0,
			Self::Carried { code, .. } => *code,
			Self::Ambiguous { .. } => generic,
		}
	}
}

/// Resolves a pod's terminal phase into an exit code.
#[derive(Clone)]
pub struct ExitCodeExtractor {
	watcher: PhaseWatcher,
}

impl ExitCodeExtractor {
	pub fn new(watcher: PhaseWatcher) -> Self {
		Self { watcher }
	}

	/// Wait for the pod to finish and return its exit code.
	///
	/// `Ok(0)` when the pod succeeded. A failure with a confirmed code is
	/// returned as [`LaunchError::ExitCode`], anything less certain as
	/// [`LaunchError::AmbiguousExit`].
	pub async fn resolve(&self, handle: &mut PodHandle) -> Result<i32, LaunchError> {
		let pod = self
			.watcher
			.wait_for_phase(handle, &[Phase::Succeeded, Phase::Failed])
			.await?;
		exit_code_from_pod(&pod)
	}
}

/// Exit code of a pod snapshot in a terminal phase.
pub fn exit_code_from_pod(pod: &Pod) -> Result<i32, LaunchError> {
	match Phase::of(pod) {
		Phase::Succeeded => Ok(0),
		Phase::Failed => {
			let terminated = pod
				.status
				.as_ref()
				.and_then(|s| s.container_statuses.as_ref())
				.and_then(|statuses| statuses.first())
				.and_then(|c| c.state.as_ref())
				.and_then(|state| state.terminated.as_ref());

			match terminated {
				Some(t) if t.exit_code != 0 => Err(LaunchError::ExitCode {
					code: t.exit_code,
					reason: t.reason.clone(),
				}),
				Some(_) => Err(LaunchError::AmbiguousExit {
					reason: "pod failed but its container exited with code 0".to_string(),
				}),
				None => Err(LaunchError::AmbiguousExit {
					reason: "pod failed without a terminated container state".to_string(),
				}),
			}
		}
		phase => Err(LaunchError::AmbiguousExit {
			reason: format!("pod ended in phase {phase}"),
		}),
	}
}

/// Exit code of an exec'd process from the stream's final status.
pub fn exit_code_from_status(status: Option<&Status>) -> Result<i32, LaunchError> {
	let Some(status) = status else {
		return Err(LaunchError::AmbiguousExit {
			reason: "exec stream closed without a status".to_string(),
		});
	};

	if status.status.as_deref() == Some(STATUS_SUCCESS) {
		return Ok(0);
	}

	if status.reason.as_deref() == Some(NON_ZERO_EXIT_CODE) {
		let code = status
			.details
			.as_ref()
			.and_then(|d| d.causes.as_ref())
			.into_iter()
			.flatten()
			.find(|cause| cause.reason.as_deref() == Some(EXIT_CODE_CAUSE))
			.and_then(|cause| cause.message.as_deref())
			.and_then(|message| message.trim().parse::<i32>().ok());
		if let Some(code) = code.filter(|&c| c != 0) {
			return Err(LaunchError::ExitCode {
				code,
				reason: Some(NON_ZERO_EXIT_CODE.to_string()),
			});
		}
	}

	Err(LaunchError::AmbiguousExit {
		reason: status
			.message
			.clone()
			.unwrap_or_else(|| "exec failed without an exit code".to_string()),
	})
}
