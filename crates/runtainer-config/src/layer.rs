// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Partial configuration as loaded from a single source.

use serde::Deserialize;

use crate::sections::{KubeConfigLayer, LoggingConfigLayer, RunConfigLayer};

/// One source's contribution; unset fields leave lower layers untouched.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RuntainerConfigLayer {
	#[serde(default)]
	pub kube: Option<KubeConfigLayer>,
	#[serde(default)]
	pub run: Option<RunConfigLayer>,
	#[serde(default)]
	pub logging: Option<LoggingConfigLayer>,
}

impl RuntainerConfigLayer {
	pub fn merge(&mut self, other: RuntainerConfigLayer) {
		merge_section(&mut self.kube, other.kube, KubeConfigLayer::merge);
		merge_section(&mut self.run, other.run, RunConfigLayer::merge);
		merge_section(&mut self.logging, other.logging, LoggingConfigLayer::merge);
	}
}

fn merge_section<T>(ours: &mut Option<T>, theirs: Option<T>, merge: impl FnOnce(&mut T, T)) {
	let Some(theirs) = theirs else {
		return;
	};
	match ours {
		Some(ours) => merge(ours, theirs),
		None => *ours = Some(theirs),
	}
}
