// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Configuration sources: TOML files, environment variables and CLI flags.

use std::collections::BTreeMap;
use std::path::PathBuf;

use tracing::{debug, trace};

use crate::error::ConfigError;
use crate::layer::RuntainerConfigLayer;
use crate::sections::{KubeConfigLayer, LoggingConfigLayer, RunConfigLayer};

const ENV_PREFIX: &str = "RT_";

/// Source precedence levels (higher = overrides lower).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Precedence {
	Defaults = 10,
	SystemFile = 20,
	UserFile = 30,
	WorkspaceFile = 40,
	Environment = 50,
	Cli = 60,
}

/// Trait for configuration sources.
pub trait ConfigSource: Send + Sync {
	fn name(&self) -> &'static str;
	fn precedence(&self) -> Precedence;
	fn load(&self) -> Result<RuntainerConfigLayer, ConfigError>;
}

/// Built-in defaults source.
pub struct DefaultsSource;

impl ConfigSource for DefaultsSource {
	fn name(&self) -> &'static str {
		"defaults"
	}

	fn precedence(&self) -> Precedence {
		Precedence::Defaults
	}

	fn load(&self) -> Result<RuntainerConfigLayer, ConfigError> {
		debug!("loading defaults");
		Ok(RuntainerConfigLayer::default())
	}
}

/// TOML file configuration source.
pub struct TomlSource {
	name: &'static str,
	path: PathBuf,
	precedence: Precedence,
	required: bool,
}

impl TomlSource {
	pub fn new(path: impl Into<PathBuf>, precedence: Precedence) -> Self {
		Self {
			name: "toml-config",
			path: path.into(),
			precedence,
			required: false,
		}
	}

	pub fn system(path: impl Into<PathBuf>) -> Self {
		Self {
			name: "system-config",
			..Self::new(path, Precedence::SystemFile)
		}
	}

	pub fn user(path: impl Into<PathBuf>) -> Self {
		Self {
			name: "user-config",
			..Self::new(path, Precedence::UserFile)
		}
	}

	pub fn workspace(path: impl Into<PathBuf>) -> Self {
		Self {
			name: "workspace-config",
			..Self::new(path, Precedence::WorkspaceFile)
		}
	}

	/// A file named on the command line; it must exist. Takes the user file's slot.
	pub fn explicit(path: impl Into<PathBuf>) -> Self {
		Self {
			name: "explicit-config",
			required: true,
			..Self::new(path, Precedence::UserFile)
		}
	}
}

impl ConfigSource for TomlSource {
	fn name(&self) -> &'static str {
		self.name
	}

	fn precedence(&self) -> Precedence {
		self.precedence
	}

	fn load(&self) -> Result<RuntainerConfigLayer, ConfigError> {
		if !self.path.exists() {
			if self.required {
				return Err(ConfigError::FileNotFound(self.path.clone()));
			}
			debug!(path = %self.path.display(), "config file not found, skipping");
			return Ok(RuntainerConfigLayer::default());
		}

		debug!(path = %self.path.display(), "loading config file");
		let content = std::fs::read_to_string(&self.path).map_err(|e| ConfigError::FileRead {
			path: self.path.clone(),
			source: e,
		})?;

		let layer: RuntainerConfigLayer =
			toml::from_str(&content).map_err(|e| ConfigError::TomlParse {
				path: self.path.clone(),
				source: e,
			})?;

		trace!("parsed config layer from TOML");
		Ok(layer)
	}
}

/// Environment variable source.
///
/// Convention: RT_<FIELD>. List values are comma separated; `RT_ENV` holds
/// `KEY=VALUE` pairs.
pub struct EnvSource;

impl ConfigSource for EnvSource {
	fn name(&self) -> &'static str {
		"environment"
	}

	fn precedence(&self) -> Precedence {
		Precedence::Environment
	}

	fn load(&self) -> Result<RuntainerConfigLayer, ConfigError> {
		debug!("loading environment variables");
		layer_from_env(|name| std::env::var(name).ok())
	}
}

/// Flags given on the command line, already shaped as a layer.
pub struct CliSource(pub RuntainerConfigLayer);

impl ConfigSource for CliSource {
	fn name(&self) -> &'static str {
		"cli"
	}

	fn precedence(&self) -> Precedence {
		Precedence::Cli
	}

	fn load(&self) -> Result<RuntainerConfigLayer, ConfigError> {
		Ok(self.0.clone())
	}
}

/// Build a layer from `RT_*` variables looked up through `get`.
pub fn layer_from_env(
	get: impl Fn(&str) -> Option<String>,
) -> Result<RuntainerConfigLayer, ConfigError> {
	let var = |field: &str| {
		get(&format!("{ENV_PREFIX}{field}")).filter(|s| !s.is_empty())
	};
	let flag = |field: &str| var(field).map(|v| v.eq_ignore_ascii_case("true") || v == "1");
	let list = |field: &str| {
		var(field).map(|v| {
			v.split(',')
				.map(str::trim)
				.filter(|s| !s.is_empty())
				.map(str::to_string)
				.collect::<Vec<_>>()
		})
	};

	let delete_grace_period_secs = match var("DELETE_GRACE_PERIOD_SECS") {
		Some(v) => Some(v.parse::<u32>().map_err(|_| {
			ConfigError::invalid_value(
				format!("{ENV_PREFIX}DELETE_GRACE_PERIOD_SECS"),
				format!("invalid u32 value '{v}'"),
			)
		})?),
		None => None,
	};

	let supplemental_group = match var("SUPPLEMENTAL_GROUP") {
		Some(v) => Some(v.parse::<i64>().map_err(|_| {
			ConfigError::invalid_value(
				format!("{ENV_PREFIX}SUPPLEMENTAL_GROUP"),
				format!("invalid group id '{v}'"),
			)
		})?),
		None => None,
	};

	let env = match list("ENV") {
		Some(pairs) => Some(parse_env_pairs(&pairs, &format!("{ENV_PREFIX}ENV"))?),
		None => None,
	};

	Ok(RuntainerConfigLayer {
		kube: Some(KubeConfigLayer {
			namespace: var("NAMESPACE"),
			context: var("CONTEXT"),
			delete_grace_period_secs,
		}),
		run: Some(RunConfigLayer {
			stdin: flag("STDIN"),
			tty: flag("TTY"),
			interactive: flag("INTERACTIVE"),
			dir: var("DIR"),
			image_pull_secret: var("IMAGE_PULL_SECRET"),
			secret_env: list("SECRET_ENV"),
			secret_volumes: list("SECRET_VOLUMES"),
			ports: list("PORTS"),
			volumes: list("VOLUMES"),
			env,
			supplemental_group,
		}),
		logging: Some(LoggingConfigLayer {
			level: var("LOG_LEVEL"),
		}),
	})
}

/// Parse `KEY=VALUE` pairs; `field` names the setting in errors.
pub fn parse_env_pairs(
	pairs: &[String],
	field: &str,
) -> Result<BTreeMap<String, String>, ConfigError> {
	pairs
		.iter()
		.map(|pair| match pair.split_once('=') {
			Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
			_ => Err(ConfigError::invalid_value(
				field,
				format!("expected KEY=VALUE, got '{pair}'"),
			)),
		})
		.collect()
}
