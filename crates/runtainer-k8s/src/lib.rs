// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! K8s client abstraction for runtainer.
//!
//! This crate provides:
//! - A trait-based K8s client abstraction for testability
//! - Production implementation using the kube crate
//! - An in-memory mock for driving pod launches in tests
//! - Common types for pod I/O, log streaming and port forwarding

mod client;
mod error;
mod kube_client;
pub mod mock;
mod types;

pub use client::K8sClient;
pub use error::K8sError;
pub use kube_client::KubeClient;
pub use mock::{MockK8sClient, TunnelBehavior};
pub use types::{
	AttachOptions, AttachedProcess, Container, ContainerState, ContainerStateTerminated,
	ContainerStatus, EnvFromSource, EnvVar, Event, EventWatch, HostPathVolumeSource,
	LocalObjectReference, LogStream, ObjectMeta, ObjectReference, Pod, PodSecurityContext, PodSpec,
	PodStatus, PodWatch, PortTunnel, SecretEnvSource, SecretVolumeSource, Status, StatusCause,
	StatusDetails, TerminalSize, TunnelIo, Volume, VolumeMount,
};
