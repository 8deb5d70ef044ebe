// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Workload spec to pod manifest mapping.

use std::collections::BTreeMap;

use runtainer_k8s::{
	Container, EnvFromSource, EnvVar, HostPathVolumeSource, LocalObjectReference, ObjectMeta, Pod,
	PodSecurityContext, PodSpec, SecretEnvSource, SecretVolumeSource, Volume, VolumeMount,
};

use crate::error::LaunchError;
use crate::types::{PodName, RunMode, WorkloadSpec};

/// Name of the single workload container.
pub const CONTAINER_NAME: &str = "runtainer";
/// Label marking pods created by this tool.
pub const MANAGED_LABEL: &str = "runtainer";
/// Label carrying the pod's own generated name.
pub const NAME_LABEL: &str = "runtainer_name";
/// Long-lived command the container runs when the workload is exec'd.
pub const PLACEHOLDER_COMMAND: &str = "cat";
/// Directory under which secret volumes are mounted.
pub const SECRET_MOUNT_ROOT: &str = "/rt-secrets";

const IMAGE_PULL_POLICY: &str = "IfNotPresent";
const RESTART_POLICY: &str = "Never";
const VOLUME_PREFIX: &str = "runtainer-vol";
const SECRET_VOLUME_PREFIX: &str = "runtainer-secret";

/// The command vector an exec mode runs, or `None` for the other modes.
pub fn exec_command(spec: &WorkloadSpec, mode: RunMode) -> Result<Option<Vec<String>>, LaunchError> {
	let command = match mode {
		RunMode::Attach | RunMode::LogFollow => return Ok(None),
		RunMode::Exec => spec.exec_command.clone().unwrap_or_default(),
		RunMode::ExecDeclared => spec
			.command
			.iter()
			.chain(spec.args.iter())
			.cloned()
			.collect(),
	};

	if command.is_empty() {
		return Err(LaunchError::MissingExecCommand);
	}
	Ok(Some(command))
}

/// Build the pod manifest for one launch.
///
/// In [`RunMode::ExecDeclared`] the declared command is left out of the
/// manifest; the container runs [`PLACEHOLDER_COMMAND`] with stdin held open
/// and the declared command is exec'd separately.
pub fn build_pod(spec: &WorkloadSpec, mode: RunMode, name: &PodName, namespace: &str) -> Pod {
	let mut labels = BTreeMap::new();
	labels.insert(MANAGED_LABEL.to_string(), "true".to_string());
	labels.insert(NAME_LABEL.to_string(), name.to_string());

	let env: Vec<EnvVar> = spec
		.env
		.iter()
		.map(|(k, v)| EnvVar {
			name: k.clone(),
			value: Some(v.clone()),
			value_from: None,
		})
		.collect();

	let env_from: Vec<EnvFromSource> = spec
		.env_from_secrets
		.iter()
		.map(|secret| EnvFromSource {
			secret_ref: Some(SecretEnvSource {
				name: secret.clone(),
				optional: Some(true),
			}),
			..Default::default()
		})
		.collect();

	let mut volumes = Vec::new();
	let mut mounts = Vec::new();
	for (i, mapping) in spec.volumes.iter().enumerate() {
		let volume_name = format!("{VOLUME_PREFIX}-{i}");
		volumes.push(Volume {
			name: volume_name.clone(),
			host_path: Some(HostPathVolumeSource {
				path: mapping.host_path.clone(),
				type_: None,
			}),
			..Default::default()
		});
		mounts.push(VolumeMount {
			name: volume_name,
			mount_path: mapping.container_path.clone(),
			..Default::default()
		});
	}
	for (i, secret) in spec.secret_volumes.iter().enumerate() {
		let volume_name = format!("{SECRET_VOLUME_PREFIX}-{i}");
		volumes.push(Volume {
			name: volume_name.clone(),
			secret: Some(SecretVolumeSource {
				secret_name: Some(secret.clone()),
				..Default::default()
			}),
			..Default::default()
		});
		mounts.push(VolumeMount {
			name: volume_name,
			mount_path: format!("{SECRET_MOUNT_ROOT}/{secret}"),
			read_only: Some(true),
			..Default::default()
		});
	}

	let (command, args, stdin) = match mode {
		RunMode::ExecDeclared => (Some(vec![PLACEHOLDER_COMMAND.to_string()]), None, true),
		_ => (
			non_empty(spec.command.clone()),
			non_empty(spec.args.clone()),
			spec.stdin,
		),
	};

	let container = Container {
		name: CONTAINER_NAME.to_string(),
		image: Some(spec.image.clone()),
		image_pull_policy: Some(IMAGE_PULL_POLICY.to_string()),
		command,
		args,
		working_dir: spec.working_dir.clone(),
		env: non_empty(env),
		env_from: non_empty(env_from),
		volume_mounts: non_empty(mounts),
		stdin: Some(stdin),
		tty: Some(spec.tty),
		..Default::default()
	};

	let security_context = spec.supplemental_group.map(|gid| PodSecurityContext {
		supplemental_groups: Some(vec![gid]),
		fs_group: Some(gid),
		..Default::default()
	});

	Pod {
		metadata: ObjectMeta {
			name: Some(name.to_string()),
			namespace: Some(namespace.to_string()),
			labels: Some(labels),
			..Default::default()
		},
		spec: Some(PodSpec {
			containers: vec![container],
			restart_policy: Some(RESTART_POLICY.to_string()),
			volumes: non_empty(volumes),
			image_pull_secrets: spec
				.image_pull_secret
				.as_ref()
				.map(|secret| vec![LocalObjectReference { name: secret.clone() }]),
			security_context,
			..Default::default()
		}),
		..Default::default()
	}
}

/// YAML rendering of a manifest, for dry runs.
pub fn render_pod_yaml(pod: &Pod) -> Result<String, LaunchError> {
	Ok(serde_yaml::to_string(pod)?)
}

/// Manifest a launch of `spec` would create, rendered without touching a cluster.
pub fn render_dry_run(spec: &WorkloadSpec, mode: RunMode, namespace: &str) -> Result<String, LaunchError> {
	exec_command(spec, mode)?;
	render_pod_yaml(&build_pod(spec, mode, &PodName::generate(), namespace))
}

fn non_empty<T>(items: Vec<T>) -> Option<Vec<T>> {
	if items.is_empty() {
		None
	} else {
		Some(items)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::types::VolumeMapping;
	use proptest::prelude::*;

	fn spec() -> WorkloadSpec {
		WorkloadSpec {
			image: "alpine:3.20".to_string(),
			command: vec!["sh".to_string(), "-c".to_string()],
			args: vec!["echo hi".to_string()],
			..Default::default()
		}
	}

	fn container(pod: &Pod) -> &Container {
		&pod.spec.as_ref().unwrap().containers[0]
	}

	#[test]
	fn labels_and_policies() {
		let name = PodName::generate();
		let pod = build_pod(&spec(), RunMode::LogFollow, &name, "dev");

		let labels = pod.metadata.labels.as_ref().unwrap();
		assert_eq!(labels.get(MANAGED_LABEL).map(String::as_str), Some("true"));
		assert_eq!(labels.get(NAME_LABEL).map(String::as_str), Some(name.as_str()));
		assert_eq!(pod.metadata.namespace.as_deref(), Some("dev"));

		let pod_spec = pod.spec.as_ref().unwrap();
		assert_eq!(pod_spec.restart_policy.as_deref(), Some("Never"));
		assert_eq!(pod_spec.containers.len(), 1);
		assert_eq!(container(&pod).name, CONTAINER_NAME);
		assert_eq!(container(&pod).image_pull_policy.as_deref(), Some("IfNotPresent"));
	}

	#[test]
	fn declared_command_runs_directly_outside_exec_declared() {
		let pod = build_pod(&spec(), RunMode::Attach, &PodName::generate(), "dev");
		let c = container(&pod);
		assert_eq!(c.command, Some(vec!["sh".to_string(), "-c".to_string()]));
		assert_eq!(c.args, Some(vec!["echo hi".to_string()]));
	}

	#[test]
	fn exec_declared_runs_placeholder_with_stdin_open() {
		let pod = build_pod(&spec(), RunMode::ExecDeclared, &PodName::generate(), "dev");
		let c = container(&pod);
		assert_eq!(c.command, Some(vec![PLACEHOLDER_COMMAND.to_string()]));
		assert_eq!(c.args, None);
		assert_eq!(c.stdin, Some(true));

		assert_eq!(
			exec_command(&spec(), RunMode::ExecDeclared).unwrap(),
			Some(vec!["sh".to_string(), "-c".to_string(), "echo hi".to_string()])
		);
	}

	#[test]
	fn exec_modes_require_a_command() {
		let mut bare = spec();
		bare.command.clear();
		bare.args.clear();
		assert!(matches!(
			exec_command(&bare, RunMode::ExecDeclared),
			Err(LaunchError::MissingExecCommand)
		));
		assert!(matches!(
			exec_command(&bare, RunMode::Exec),
			Err(LaunchError::MissingExecCommand)
		));
		assert_eq!(exec_command(&bare, RunMode::Attach).unwrap(), None);

		bare.exec_command = Some(vec!["bash".to_string()]);
		assert_eq!(
			exec_command(&bare, RunMode::Exec).unwrap(),
			Some(vec!["bash".to_string()])
		);
	}

	#[test]
	fn volumes_secrets_and_groups() {
		let mut spec = spec();
		spec.volumes = vec![
			VolumeMapping {
				host_path: "/home/me/src".to_string(),
				container_path: "/src".to_string(),
			},
			VolumeMapping {
				host_path: "/tmp".to_string(),
				container_path: "/tmp".to_string(),
			},
		];
		spec.secret_volumes = vec!["db-creds".to_string()];
		spec.env_from_secrets = vec!["app-env".to_string()];
		spec.image_pull_secret = Some("registry".to_string());
		spec.supplemental_group = Some(1001);

		let pod = build_pod(&spec, RunMode::LogFollow, &PodName::generate(), "dev");
		let pod_spec = pod.spec.as_ref().unwrap();

		let volumes = pod_spec.volumes.as_ref().unwrap();
		let names: Vec<_> = volumes.iter().map(|v| v.name.as_str()).collect();
		assert_eq!(names, ["runtainer-vol-0", "runtainer-vol-1", "runtainer-secret-0"]);

		let mounts = container(&pod).volume_mounts.as_ref().unwrap();
		assert_eq!(mounts[0].mount_path, "/src");
		assert_eq!(mounts[2].mount_path, "/rt-secrets/db-creds");
		assert_eq!(mounts[2].read_only, Some(true));

		let env_from = container(&pod).env_from.as_ref().unwrap();
		assert_eq!(env_from[0].secret_ref.as_ref().unwrap().name, "app-env");
		assert_eq!(env_from[0].secret_ref.as_ref().unwrap().optional, Some(true));

		assert_eq!(
			pod_spec.image_pull_secrets.as_ref().unwrap()[0].name,
			"registry"
		);
		let security = pod_spec.security_context.as_ref().unwrap();
		assert_eq!(security.fs_group, Some(1001));
		assert_eq!(security.supplemental_groups, Some(vec![1001]));
	}

	#[test]
	fn yaml_rendering_names_the_image() {
		let name = PodName::generate();
		let pod = build_pod(&spec(), RunMode::LogFollow, &name, "dev");
		let yaml = render_pod_yaml(&pod).unwrap();

		assert!(yaml.contains("image: alpine:3.20"));
		assert!(yaml.contains(name.as_str()));
		assert!(yaml.contains("restartPolicy: Never"));
	}

	#[test]
	fn dry_run_renders_into_the_namespace() {
		let yaml = render_dry_run(&spec(), RunMode::LogFollow, "sandbox").unwrap();

		assert!(yaml.contains("namespace: sandbox"));
		assert!(yaml.contains("image: alpine:3.20"));
	}

	#[test]
	fn dry_run_rejects_exec_without_a_command() {
		let err = render_dry_run(&spec(), RunMode::Exec, "sandbox").unwrap_err();
		assert!(matches!(err, LaunchError::MissingExecCommand));
	}

	proptest! {
		#[test]
		fn env_vars_are_passed_through_sorted(
			env in proptest::collection::btree_map("[A-Z][A-Z0-9_]{0,12}", "[ -~]{0,20}", 0..8)
		) {
			let mut spec = spec();
			spec.env = env.clone();
			let pod = build_pod(&spec, RunMode::LogFollow, &PodName::generate(), "dev");
			let vars = container(&pod).env.clone().unwrap_or_default();

			prop_assert_eq!(vars.len(), env.len());
			for (var, (name, value)) in vars.iter().zip(env.iter()) {
				prop_assert_eq!(&var.name, name);
				prop_assert_eq!(var.value.as_ref(), Some(value));
			}
		}
	}
}
