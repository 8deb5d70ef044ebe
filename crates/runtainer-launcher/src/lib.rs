// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Ephemeral pod launcher.
//!
//! Creates one pod per launch, waits for it to come up, wires local I/O and
//! ports to it, reports how the workload exited and always deletes the pod.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use runtainer_k8s::KubeClient;
//! use runtainer_launcher::{IoStreams, Launcher, LauncherConfig, RunMode, WorkloadSpec};
//!
//! let client = KubeClient::new(None).await?;
//! let config = LauncherConfig {
//!     namespace: client.default_namespace().to_string(),
//!     ..Default::default()
//! };
//! let launcher = Launcher::new(Arc::new(client), config);
//!
//! let spec = WorkloadSpec {
//!     image: "alpine:3.20".to_string(),
//!     command: vec!["echo".to_string(), "hello".to_string()],
//!     ..Default::default()
//! };
//! let status = launcher
//!     .launch(&spec, RunMode::LogFollow, IoStreams::stdio(false), &[])
//!     .await?;
//! std::process::exit(status.code(1));
//! ```

pub mod error;
pub mod events;
pub mod exit;
pub mod launcher;
pub mod phase;
pub mod pod;
pub mod session;
pub mod signal;
pub mod terminal;
pub mod tunnel;
pub mod types;

pub use error::{LaunchError, PortMappingError};
pub use events::{event_matches, EventLogger, EventSink, PodEvent, TracingSink};
pub use exit::{exit_code_from_pod, exit_code_from_status, ExitCodeExtractor, ExitStatus};
pub use launcher::{Launcher, LauncherConfig};
pub use phase::{PhaseWatcher, DEFAULT_RESYNC_INTERVAL};
pub use pod::{build_pod, exec_command, render_dry_run, render_pod_yaml, CONTAINER_NAME};
pub use session::{SessionTarget, StreamSession};
pub use signal::StopSignal;
pub use terminal::{CrosstermTerminal, RawModeGuard, Terminal};
pub use tunnel::{PortTunnelManager, TunnelSet};
pub use types::{IoStreams, Phase, PodHandle, PodName, PortMapping, RunMode, VolumeMapping, WorkloadSpec};
