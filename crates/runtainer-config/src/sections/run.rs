// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Workload run configuration.

use std::collections::BTreeMap;

use runtainer_launcher::{PortMapping, VolumeMapping};
use serde::Deserialize;

use crate::ConfigError;

/// Run configuration (runtime, fully resolved).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunConfig {
	pub stdin: bool,
	pub tty: bool,
	/// Attach to the pod's own process rather than follow its logs
	pub interactive: bool,
	/// Working directory inside the container
	pub dir: Option<String>,
	pub image_pull_secret: Option<String>,
	/// Secrets exposed as environment variables
	pub secret_env: Vec<String>,
	/// Secrets mounted under /rt-secrets
	pub secret_volumes: Vec<String>,
	pub ports: Vec<PortMapping>,
	pub volumes: Vec<VolumeMapping>,
	pub env: BTreeMap<String, String>,
	pub supplemental_group: Option<i64>,
}

/// Run configuration layer (partial, for merging).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RunConfigLayer {
	#[serde(default)]
	pub stdin: Option<bool>,
	#[serde(default)]
	pub tty: Option<bool>,
	#[serde(default)]
	pub interactive: Option<bool>,
	#[serde(default)]
	pub dir: Option<String>,
	#[serde(default)]
	pub image_pull_secret: Option<String>,
	#[serde(default)]
	pub secret_env: Option<Vec<String>>,
	#[serde(default)]
	pub secret_volumes: Option<Vec<String>>,
	/// `LOCAL:REMOTE` pairs
	#[serde(default)]
	pub ports: Option<Vec<String>>,
	/// `HOST[:CONTAINER]` paths
	#[serde(default)]
	pub volumes: Option<Vec<String>>,
	#[serde(default)]
	pub env: Option<BTreeMap<String, String>>,
	#[serde(default)]
	pub supplemental_group: Option<i64>,
}

impl RunConfigLayer {
	/// Scalars and lists from `other` replace ours; env maps are merged key by key.
	pub fn merge(&mut self, other: RunConfigLayer) {
		if other.stdin.is_some() {
			self.stdin = other.stdin;
		}
		if other.tty.is_some() {
			self.tty = other.tty;
		}
		if other.interactive.is_some() {
			self.interactive = other.interactive;
		}
		if other.dir.is_some() {
			self.dir = other.dir;
		}
		if other.image_pull_secret.is_some() {
			self.image_pull_secret = other.image_pull_secret;
		}
		if other.secret_env.is_some() {
			self.secret_env = other.secret_env;
		}
		if other.secret_volumes.is_some() {
			self.secret_volumes = other.secret_volumes;
		}
		if other.ports.is_some() {
			self.ports = other.ports;
		}
		if other.volumes.is_some() {
			self.volumes = other.volumes;
		}
		if let Some(env) = other.env {
			self.env.get_or_insert_with(BTreeMap::new).extend(env);
		}
		if other.supplemental_group.is_some() {
			self.supplemental_group = other.supplemental_group;
		}
	}

	pub fn finalize(self) -> Result<RunConfig, ConfigError> {
		let ports = self
			.ports
			.unwrap_or_default()
			.iter()
			.map(|p| {
				p.parse::<PortMapping>()
					.map_err(|e| ConfigError::invalid_value("run.ports", e.to_string()))
			})
			.collect::<Result<Vec<_>, _>>()?;

		let volumes = self
			.volumes
			.unwrap_or_default()
			.iter()
			.map(|v| parse_volume(v))
			.collect::<Result<Vec<_>, _>>()?;

		Ok(RunConfig {
			stdin: self.stdin.unwrap_or(false),
			tty: self.tty.unwrap_or(false),
			interactive: self.interactive.unwrap_or(false),
			dir: self.dir,
			image_pull_secret: self.image_pull_secret,
			secret_env: self.secret_env.unwrap_or_default(),
			secret_volumes: self.secret_volumes.unwrap_or_default(),
			ports,
			volumes,
			env: self.env.unwrap_or_default(),
			supplemental_group: self.supplemental_group,
		})
	}
}

/// Parse `HOST[:CONTAINER]`; without a container path the host path is reused.
pub fn parse_volume(spec: &str) -> Result<VolumeMapping, ConfigError> {
	let (host, container) = spec.split_once(':').unwrap_or((spec, spec));
	if host.is_empty() || container.is_empty() {
		return Err(ConfigError::invalid_value(
			"run.volumes",
			format!("invalid volume '{spec}': expected HOST[:CONTAINER]"),
		));
	}
	if !container.starts_with('/') {
		return Err(ConfigError::invalid_value(
			"run.volumes",
			format!("container path '{container}' must be absolute"),
		));
	}
	Ok(VolumeMapping {
		host_path: host.to_string(),
		container_path: container.to_string(),
	})
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_defaults() {
		let config = RunConfigLayer::default().finalize().unwrap();
		assert!(!config.stdin);
		assert!(!config.tty);
		assert!(!config.interactive);
		assert!(config.ports.is_empty());
	}

	#[test]
	fn test_ports_are_parsed() {
		let layer = RunConfigLayer {
			ports: Some(vec!["8080:80".to_string(), "5432:5432".to_string()]),
			..Default::default()
		};
		let config = layer.finalize().unwrap();
		assert_eq!(
			config.ports,
			vec![PortMapping::new(8080, 80), PortMapping::new(5432, 5432)]
		);
	}

	#[test]
	fn test_invalid_port_is_reported() {
		let layer = RunConfigLayer {
			ports: Some(vec!["8080".to_string()]),
			..Default::default()
		};
		let err = layer.finalize().unwrap_err();
		assert!(err.to_string().contains("run.ports"));
	}

	#[test]
	fn test_env_merges_by_key() {
		let mut base = RunConfigLayer {
			env: Some(BTreeMap::from([
				("A".to_string(), "1".to_string()),
				("B".to_string(), "1".to_string()),
			])),
			..Default::default()
		};
		base.merge(RunConfigLayer {
			env: Some(BTreeMap::from([("B".to_string(), "2".to_string())])),
			..Default::default()
		});

		let env = base.finalize().unwrap().env;
		assert_eq!(env.get("A").map(String::as_str), Some("1"));
		assert_eq!(env.get("B").map(String::as_str), Some("2"));
	}

	#[test]
	fn test_lists_are_replaced() {
		let mut base = RunConfigLayer {
			secret_env: Some(vec!["one".to_string()]),
			..Default::default()
		};
		base.merge(RunConfigLayer {
			secret_env: Some(vec!["two".to_string()]),
			..Default::default()
		});
		assert_eq!(base.finalize().unwrap().secret_env, vec!["two".to_string()]);
	}

	#[test]
	fn test_parse_volume() {
		assert_eq!(
			parse_volume("/home/me/src:/src").unwrap(),
			VolumeMapping {
				host_path: "/home/me/src".to_string(),
				container_path: "/src".to_string(),
			}
		);
		assert_eq!(parse_volume("/data").unwrap().container_path, "/data");
		assert!(parse_volume("/data:relative").is_err());
		assert!(parse_volume(":/x").is_err());
	}
}
