// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Config file locations.

use std::path::PathBuf;

use crate::ConfigError;

const APP_DIR: &str = "runtainer";
const SYSTEM_CONFIG_FILE: &str = "/etc/runtainer/config.toml";
const WORKSPACE_CONFIG_FILE: &str = ".runtainer.toml";

/// Resolved config file paths, lowest precedence first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigPaths {
	/// /etc/runtainer/config.toml
	pub system_config_file: PathBuf,
	/// $XDG_CONFIG_HOME/runtainer/config.toml
	pub user_config_file: PathBuf,
	/// ./.runtainer.toml
	pub workspace_config_file: PathBuf,
}

/// Resolve config paths, honouring `XDG_CONFIG_HOME`.
pub fn resolve_paths() -> Result<ConfigPaths, ConfigError> {
	let config_home = match std::env::var_os("XDG_CONFIG_HOME") {
		Some(dir) if !dir.is_empty() => PathBuf::from(dir),
		_ => dirs::home_dir()
			.ok_or(ConfigError::HomeDirNotFound)?
			.join(".config"),
	};
	let cwd = std::env::current_dir()?;

	tracing::debug!(config_home = %config_home.display(), cwd = %cwd.display(), "resolved config paths");

	Ok(ConfigPaths {
		system_config_file: PathBuf::from(SYSTEM_CONFIG_FILE),
		user_config_file: config_home.join(APP_DIR).join("config.toml"),
		workspace_config_file: cwd.join(WORKSPACE_CONFIG_FILE),
	})
}
