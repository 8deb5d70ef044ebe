// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Layered configuration for runtainer.
//!
//! This crate provides:
//! - Layered configuration from defaults, TOML files, environment and CLI flags
//! - Consistent environment variable naming (`RT_*`)
//! - Validation of port and volume mappings before anything touches the cluster
//!
//! # Usage
//!
//! ```ignore
//! use runtainer_config::{load_config, RuntainerConfigLayer};
//!
//! let config = load_config(None, RuntainerConfigLayer::default())?;
//! println!("namespace: {:?}", config.kube.namespace);
//! ```

pub mod error;
pub mod layer;
pub mod paths;
pub mod sections;
pub mod sources;

pub use error::ConfigError;
pub use layer::RuntainerConfigLayer;
pub use paths::{resolve_paths, ConfigPaths};
pub use sections::*;
pub use sources::{
	layer_from_env, parse_env_pairs, CliSource, ConfigSource, DefaultsSource, EnvSource, Precedence,
	TomlSource,
};

use std::path::Path;

use tracing::debug;

/// Fully resolved configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuntainerConfig {
	pub kube: KubeConfig,
	pub run: RunConfig,
	pub logging: LoggingConfig,
}

/// Load configuration from all sources with standard precedence.
///
/// Precedence (highest to lowest):
/// 1. Command line flags (`cli`)
/// 2. Environment variables (`RT_*`)
/// 3. Workspace file (`./.runtainer.toml`)
/// 4. `explicit` file if given, otherwise the user file
/// 5. System file (`/etc/runtainer/config.toml`)
/// 6. Built-in defaults
pub fn load_config(
	explicit: Option<&Path>,
	cli: RuntainerConfigLayer,
) -> Result<RuntainerConfig, ConfigError> {
	let paths = resolve_paths()?;
	let file_source = match explicit {
		Some(path) => TomlSource::explicit(path),
		None => TomlSource::user(&paths.user_config_file),
	};

	let sources: Vec<Box<dyn ConfigSource>> = vec![
		Box::new(DefaultsSource),
		Box::new(TomlSource::system(&paths.system_config_file)),
		Box::new(file_source),
		Box::new(TomlSource::workspace(&paths.workspace_config_file)),
		Box::new(EnvSource),
		Box::new(CliSource(cli)),
	];

	load_config_from_sources(sources)
}

/// Merge `sources` in precedence order and resolve the result.
pub fn load_config_from_sources(
	mut sources: Vec<Box<dyn ConfigSource>>,
) -> Result<RuntainerConfig, ConfigError> {
	sources.sort_by_key(|s| s.precedence());

	let mut merged = RuntainerConfigLayer::default();
	for source in sources {
		debug!(source = source.name(), "loading configuration source");
		let layer = source.load()?;
		merged.merge(layer);
	}

	finalize(merged)
}

fn finalize(layer: RuntainerConfigLayer) -> Result<RuntainerConfig, ConfigError> {
	let kube = layer.kube.unwrap_or_default().finalize();
	let run = layer.run.unwrap_or_default().finalize()?;
	let logging = layer.logging.unwrap_or_default().finalize();

	validate_config(&kube, &run)?;

	debug!(
		namespace = ?kube.namespace,
		context = ?kube.context,
		tty = run.tty,
		stdin = run.stdin,
		ports = run.ports.len(),
		volumes = run.volumes.len(),
		"configuration loaded"
	);

	Ok(RuntainerConfig { kube, run, logging })
}

fn validate_config(kube: &KubeConfig, run: &RunConfig) -> Result<(), ConfigError> {
	if kube.namespace.as_deref() == Some("") {
		return Err(ConfigError::validation("kube.namespace must not be empty"));
	}

	let mut seen = std::collections::HashSet::new();
	for mapping in &run.ports {
		if !seen.insert(mapping.local) {
			return Err(ConfigError::validation(format!(
				"local port {} is mapped more than once",
				mapping.local
			)));
		}
	}

	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;
	use proptest::prelude::*;
	use runtainer_launcher::PortMapping;

	struct StaticSource(Precedence, RuntainerConfigLayer);

	impl ConfigSource for StaticSource {
		fn name(&self) -> &'static str {
			"static"
		}

		fn precedence(&self) -> Precedence {
			self.0
		}

		fn load(&self) -> Result<RuntainerConfigLayer, ConfigError> {
			Ok(self.1.clone())
		}
	}

	fn namespace_layer(namespace: &str) -> RuntainerConfigLayer {
		RuntainerConfigLayer {
			kube: Some(KubeConfigLayer {
				namespace: Some(namespace.to_string()),
				..Default::default()
			}),
			..Default::default()
		}
	}

	fn ports_layer(ports: &[&str]) -> RuntainerConfigLayer {
		RuntainerConfigLayer {
			run: Some(RunConfigLayer {
				ports: Some(ports.iter().map(|p| p.to_string()).collect()),
				..Default::default()
			}),
			..Default::default()
		}
	}

	#[test]
	fn test_defaults_only() {
		let config = load_config_from_sources(vec![Box::new(DefaultsSource)]).unwrap();
		assert_eq!(config, RuntainerConfig::default());
	}

	#[test]
	fn test_higher_precedence_wins_regardless_of_order() {
		let config = load_config_from_sources(vec![
			Box::new(CliSource(namespace_layer("from-cli"))),
			Box::new(StaticSource(Precedence::UserFile, namespace_layer("from-file"))),
		])
		.unwrap();
		assert_eq!(config.kube.namespace.as_deref(), Some("from-cli"));
	}

	#[test]
	fn test_ports_resolve_to_mappings() {
		let config =
			load_config_from_sources(vec![Box::new(CliSource(ports_layer(&["8080:80"])))]).unwrap();
		assert_eq!(config.run.ports, vec![PortMapping::new(8080, 80)]);
	}

	#[test]
	fn test_duplicate_local_port_is_rejected() {
		let err = load_config_from_sources(vec![Box::new(CliSource(ports_layer(&[
			"8080:80", "8080:81",
		])))])
		.unwrap_err();
		assert!(matches!(err, ConfigError::Validation(_)));
	}

	#[test]
	fn test_empty_namespace_is_rejected() {
		let err = load_config_from_sources(vec![Box::new(CliSource(namespace_layer("")))])
			.unwrap_err();
		assert!(matches!(err, ConfigError::Validation(_)));
	}

	proptest! {
		#[test]
		fn prop_last_precedence_wins(
			low in "[a-z]{1,12}",
			high in "[a-z]{1,12}",
		) {
			let config = load_config_from_sources(vec![
				Box::new(StaticSource(Precedence::Environment, namespace_layer(&high))),
				Box::new(StaticSource(Precedence::SystemFile, namespace_layer(&low))),
			])
			.unwrap();
			prop_assert_eq!(config.kube.namespace, Some(high));
		}
	}
}
