// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Interactive byte stream to the workload container.

use std::io;
use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use runtainer_k8s::{AttachOptions, K8sClient, Status, TerminalSize};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::task::JoinHandle;

use crate::error::LaunchError;
use crate::pod::CONTAINER_NAME;
use crate::terminal::{RawModeGuard, Terminal};
use crate::types::{IoStreams, PodHandle};

const TTY_HINT: &[u8] = b"If you don't see a command prompt, try pressing enter.\n";

/// What the session connects to.
#[derive(Debug, Clone, Copy)]
pub enum SessionTarget<'a> {
	/// The pod's own entrypoint process
	Attach,
	/// A new process running `command` in the container
	Exec(&'a [String]),
}

/// One attach or exec stream wired to local I/O.
#[derive(Clone)]
pub struct StreamSession {
	client: Arc<dyn K8sClient>,
	terminal: Arc<dyn Terminal>,
}

impl StreamSession {
	pub fn new(client: Arc<dyn K8sClient>, terminal: Arc<dyn Terminal>) -> Self {
		Self { client, terminal }
	}

	/// Copy bytes between `io` and the remote process until the remote side
	/// closes its output.
	///
	/// With `tty` and a local input the terminal is held in raw mode for the
	/// duration of the call and size changes are forwarded to the remote
	/// pseudo-terminal. Returns the remote completion status, if the
	/// transport reported one.
	pub async fn run(
		&self,
		handle: &PodHandle,
		target: SessionTarget<'_>,
		io: IoStreams,
		tty: bool,
	) -> Result<Option<Status>, LaunchError> {
		let IoStreams {
			stdin,
			mut stdout,
			mut stderr,
		} = io;

		let opts = AttachOptions {
			container: CONTAINER_NAME.to_string(),
			stdin: stdin.is_some(),
			stdout: true,
			stderr: !tty,
			tty,
		};

		let name = handle.name.as_str();
		let mut process = match target {
			SessionTarget::Attach => {
				tracing::debug!(pod_name = %name, tty, "Attaching to pod");
				self.client.attach(name, &handle.namespace, &opts).await
			}
			SessionTarget::Exec(command) => {
				tracing::debug!(pod_name = %name, tty, command = ?command, "Executing in pod");
				self.client
					.exec(name, &handle.namespace, command, &opts)
					.await
			}
		}
		.map_err(LaunchError::transport)?;

		let raw_mode = if tty && stdin.is_some() {
			let _ = stderr.write_all(TTY_HINT).await;
			let _ = stderr.flush().await;
			Some(RawModeGuard::acquire(Arc::clone(&self.terminal)).map_err(LaunchError::Terminal)?)
		} else {
			None
		};

		let resize_task = match process.resize.take() {
			Some(mut resize) => {
				// Initial size goes out before any output is copied.
				if let Ok((width, height)) = self.terminal.size() {
					let _ = resize.send(TerminalSize { width, height }).await;
				}
				Some(forward_resizes(Arc::clone(&self.terminal), resize))
			}
			None => None,
		};

		let output = copy_output(process.stdout.take(), &mut stdout, process.stderr.take(), &mut stderr);
		tokio::pin!(output);
		let input = copy_input(stdin, process.stdin.take());

		let copied = tokio::select! {
			result = &mut output => result,
			result = input => {
				if let Err(err) = result {
					tracing::debug!(pod_name = %name, error = %err, "Input stream ended with error");
				}
				output.await
			}
		};

		if let Some(task) = resize_task {
			task.abort();
		}
		let restored = raw_mode.map_or(Ok(()), RawModeGuard::restore);

		copied.map_err(LaunchError::transport)?;
		restored.map_err(LaunchError::Terminal)?;

		Ok(process.status.await)
	}
}

async fn copy_output<W, E>(
	remote_out: Option<std::pin::Pin<Box<dyn AsyncRead + Send>>>,
	stdout: &mut W,
	remote_err: Option<std::pin::Pin<Box<dyn AsyncRead + Send>>>,
	stderr: &mut E,
) -> io::Result<()>
where
	W: AsyncWrite + Unpin + ?Sized,
	E: AsyncWrite + Unpin + ?Sized,
{
	let out = async {
		if let Some(mut remote) = remote_out {
			tokio::io::copy(&mut remote, stdout).await?;
			stdout.flush().await?;
		}
		Ok::<_, io::Error>(())
	};
	let err = async {
		if let Some(mut remote) = remote_err {
			tokio::io::copy(&mut remote, stderr).await?;
			stderr.flush().await?;
		}
		Ok::<_, io::Error>(())
	};
	futures::try_join!(out, err).map(|_| ())
}

async fn copy_input(
	local: Option<std::pin::Pin<Box<dyn AsyncRead + Send>>>,
	remote: Option<std::pin::Pin<Box<dyn AsyncWrite + Send>>>,
) -> io::Result<()> {
	if let (Some(mut local), Some(mut remote)) = (local, remote) {
		tokio::io::copy(&mut local, &mut remote).await?;
		remote.shutdown().await?;
	}
	Ok(())
}

fn forward_resizes(
	terminal: Arc<dyn Terminal>,
	mut resize: futures::channel::mpsc::Sender<TerminalSize>,
) -> JoinHandle<()> {
	tokio::spawn(async move {
		let mut sizes = terminal.resizes();
		while let Some((width, height)) = sizes.next().await {
			if resize.send(TerminalSize { width, height }).await.is_err() {
				break;
			}
		}
	})
}
