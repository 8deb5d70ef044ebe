// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Cluster connection configuration.

use serde::Deserialize;

/// Cluster configuration (runtime, fully resolved).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KubeConfig {
	/// Namespace for launched pods; the kubeconfig's default when unset
	pub namespace: Option<String>,
	/// Kubeconfig context; the current context when unset
	pub context: Option<String>,
	pub delete_grace_period_secs: u32,
}

/// Cluster configuration layer (partial, for merging).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct KubeConfigLayer {
	#[serde(default)]
	pub namespace: Option<String>,
	#[serde(default)]
	pub context: Option<String>,
	#[serde(default)]
	pub delete_grace_period_secs: Option<u32>,
}

impl KubeConfigLayer {
	pub fn merge(&mut self, other: KubeConfigLayer) {
		if other.namespace.is_some() {
			self.namespace = other.namespace;
		}
		if other.context.is_some() {
			self.context = other.context;
		}
		if other.delete_grace_period_secs.is_some() {
			self.delete_grace_period_secs = other.delete_grace_period_secs;
		}
	}

	pub fn finalize(self) -> KubeConfig {
		KubeConfig {
			namespace: self.namespace,
			context: self.context,
			delete_grace_period_secs: self.delete_grace_period_secs.unwrap_or(0),
		}
	}
}
