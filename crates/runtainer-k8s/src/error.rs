// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use thiserror::Error;

/// Errors that can occur during K8s operations.
#[derive(Error, Debug, Clone)]
pub enum K8sError {
	#[error("K8s API error: {message}")]
	ApiError { message: String },

	#[error("K8s configuration error: {message}")]
	ConfigError { message: String },

	#[error("Pod not found: {name}")]
	PodNotFound { name: String },

	#[error("Watch error: {message}")]
	WatchError { message: String },

	#[error("Log stream error: {message}")]
	StreamError { message: String },

	#[error("Attach error: {message}")]
	AttachError { message: String },

	#[error("Port forward to port {port} failed: {message}")]
	PortForwardError { port: u16, message: String },
}

impl K8sError {
	/// Whether the error was caused by the referenced pod not existing.
	pub fn is_not_found(&self) -> bool {
		matches!(self, K8sError::PodNotFound { .. })
	}
}

impl From<kube::Error> for K8sError {
	fn from(err: kube::Error) -> Self {
		K8sError::ApiError {
			message: err.to_string(),
		}
	}
}

impl From<kube::runtime::watcher::Error> for K8sError {
	fn from(err: kube::runtime::watcher::Error) -> Self {
		K8sError::WatchError {
			message: err.to_string(),
		}
	}
}
