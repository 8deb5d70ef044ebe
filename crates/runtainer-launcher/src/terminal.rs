// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Local terminal control: raw mode and size changes.

use std::io;
use std::sync::Arc;

use futures::stream::BoxStream;
use futures::StreamExt;

/// The local terminal a TTY session is bound to.
pub trait Terminal: Send + Sync {
	fn enable_raw_mode(&self) -> io::Result<()>;

	fn disable_raw_mode(&self) -> io::Result<()>;

	/// Current size as `(columns, rows)`.
	fn size(&self) -> io::Result<(u16, u16)>;

	/// Stream of sizes, one item per observed change.
	fn resizes(&self) -> BoxStream<'static, (u16, u16)>;
}

/// The process's controlling terminal, via crossterm.
#[derive(Debug, Clone, Copy, Default)]
pub struct CrosstermTerminal;

impl Terminal for CrosstermTerminal {
	fn enable_raw_mode(&self) -> io::Result<()> {
		crossterm::terminal::enable_raw_mode()
	}

	fn disable_raw_mode(&self) -> io::Result<()> {
		crossterm::terminal::disable_raw_mode()
	}

	fn size(&self) -> io::Result<(u16, u16)> {
		crossterm::terminal::size()
	}

	#[cfg(unix)]
	fn resizes(&self) -> BoxStream<'static, (u16, u16)> {
		use tokio::signal::unix::{signal, SignalKind};

		let winch = match signal(SignalKind::window_change()) {
			Ok(winch) => winch,
			Err(err) => {
				tracing::debug!(error = %err, "Cannot watch terminal size changes");
				return futures::stream::empty().boxed();
			}
		};

		futures::stream::unfold(winch, |mut winch| async move {
			winch.recv().await?;
			Some((crossterm::terminal::size().ok(), winch))
		})
		.filter_map(|size| async move { size })
		.boxed()
	}

	#[cfg(not(unix))]
	fn resizes(&self) -> BoxStream<'static, (u16, u16)> {
		futures::stream::empty().boxed()
	}
}

/// Raw mode held for the lifetime of the guard.
///
/// The terminal is restored exactly once: by [`RawModeGuard::restore`] or, on
/// any other exit path, on drop.
pub struct RawModeGuard {
	terminal: Arc<dyn Terminal>,
	restored: bool,
}

impl RawModeGuard {
	pub fn acquire(terminal: Arc<dyn Terminal>) -> io::Result<Self> {
		terminal.enable_raw_mode()?;
		Ok(Self {
			terminal,
			restored: false,
		})
	}

	/// Restore the terminal now and report failure.
	pub fn restore(mut self) -> io::Result<()> {
		self.restored = true;
		self.terminal.disable_raw_mode()
	}
}

impl Drop for RawModeGuard {
	fn drop(&mut self) {
		if self.restored {
			return;
		}
		self.restored = true;
		if let Err(err) = self.terminal.disable_raw_mode() {
			tracing::warn!(error = %err, "Failed to restore terminal mode");
		}
	}
}
