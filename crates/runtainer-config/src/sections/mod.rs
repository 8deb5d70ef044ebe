// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Configuration sections.

mod kube;
mod logging;
mod run;

pub use kube::{KubeConfig, KubeConfigLayer};
pub use logging::{LoggingConfig, LoggingConfigLayer};
pub use run::{RunConfig, RunConfigLayer};
