// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Periodic datafile refreshing.
//!
//! The loop sleeps for the interval, then refreshes through the instance. A
//! stop signal ends the loop at the next wait; a fetch already in flight is
//! allowed to finish.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::error::{Result, TogglesError};
use crate::instance::WeakInstance;

/// Handle to a running refresh loop.
#[derive(Debug)]
pub(crate) struct Refresher {
	shutdown_tx: mpsc::Sender<()>,
	task: JoinHandle<()>,
}

impl Refresher {
	/// Spawns the loop on the current tokio runtime.
	pub(crate) fn start(instance: WeakInstance, interval: Duration) -> Result<Self> {
		let handle = Handle::try_current().map_err(|_| TogglesError::RuntimeUnavailable)?;
		let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>(1);
		let task = handle.spawn(run_refresh_loop(instance, interval, shutdown_rx));
		Ok(Self { shutdown_tx, task })
	}

	/// Signals the loop to stop without interrupting an in-flight fetch.
	pub(crate) fn stop(self) {
		let _ = self.shutdown_tx.try_send(());
	}

	pub(crate) fn is_finished(&self) -> bool {
		self.task.is_finished()
	}
}

async fn run_refresh_loop(instance: WeakInstance, interval: Duration, mut shutdown_rx: mpsc::Receiver<()>) {
	debug!(interval_ms = interval.as_millis() as u64, "Refresh loop started");

	loop {
		tokio::select! {
			_ = tokio::time::sleep(interval) => {}
			_ = shutdown_rx.recv() => {
				debug!("Refresh loop received shutdown signal");
				break;
			}
		}

		let Some(instance) = instance.upgrade() else {
			debug!("Instance dropped, ending refresh loop");
			break;
		};
		// Failures are logged and reported by `refresh`; the next tick retries.
		let _ = instance.refresh().await;
	}
}

/// Marks a refresh as in flight until dropped.
#[derive(Debug)]
pub(crate) struct InFlightGuard<'a> {
	flag: &'a AtomicBool,
}

impl<'a> InFlightGuard<'a> {
	/// Returns `None` if another refresh holds the flag.
	pub(crate) fn acquire(flag: &'a AtomicBool) -> Option<Self> {
		flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
			.ok()
			.map(|_| Self { flag })
	}
}

impl Drop for InFlightGuard<'_> {
	fn drop(&mut self) {
		self.flag.store(false, Ordering::Release);
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn guard_is_exclusive_and_resets() {
		let flag = AtomicBool::new(false);
		let guard = InFlightGuard::acquire(&flag);
		assert!(guard.is_some());
		assert!(InFlightGuard::acquire(&flag).is_none());
		drop(guard);
		assert!(InFlightGuard::acquire(&flag).is_some());
	}

	#[test]
	fn start_requires_a_runtime() {
		let err = Refresher::start(WeakInstance::dangling(), Duration::from_secs(1)).unwrap_err();
		assert!(matches!(err, TogglesError::RuntimeUnavailable));
	}

	#[tokio::test]
	async fn loop_ends_when_instance_is_gone() {
		let refresher = Refresher::start(WeakInstance::dangling(), Duration::from_millis(5)).unwrap();
		tokio::time::sleep(Duration::from_millis(100)).await;
		assert!(refresher.is_finished());
	}

	#[tokio::test]
	async fn stop_ends_the_loop() {
		let refresher = Refresher::start(WeakInstance::dangling(), Duration::from_secs(3600)).unwrap();
		let task_done = {
			let Refresher { shutdown_tx, task } = refresher;
			shutdown_tx.send(()).await.unwrap();
			task
		};
		tokio::time::timeout(Duration::from_secs(1), task_done)
			.await
			.unwrap()
			.unwrap();
	}
}
