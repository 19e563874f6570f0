// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Level-gated logger owned by each instance.
//!
//! Without a handler, messages go to `tracing` with the details attached as a
//! structured `details` field.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LogLevel {
	Debug,
	Info,
	Warn,
	Error,
}

impl LogLevel {
	pub fn as_str(&self) -> &'static str {
		match self {
			LogLevel::Debug => "debug",
			LogLevel::Info => "info",
			LogLevel::Warn => "warn",
			LogLevel::Error => "error",
		}
	}
}

impl fmt::Display for LogLevel {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

pub type LogHandler = Arc<dyn Fn(LogLevel, &str, &Value) + Send + Sync>;

#[derive(Clone)]
pub struct Logger {
	levels: BTreeSet<LogLevel>,
	handler: Option<LogHandler>,
}

impl Logger {
	/// Warn and error enabled, forwarding to `tracing`.
	pub fn new() -> Self {
		Self {
			levels: BTreeSet::from([LogLevel::Warn, LogLevel::Error]),
			handler: None,
		}
	}

	pub fn with_levels(mut self, levels: impl IntoIterator<Item = LogLevel>) -> Self {
		self.levels = levels.into_iter().collect();
		self
	}

	pub fn with_handler(mut self, handler: LogHandler) -> Self {
		self.handler = Some(handler);
		self
	}

	pub fn set_levels(&mut self, levels: impl IntoIterator<Item = LogLevel>) {
		self.levels = levels.into_iter().collect();
	}

	pub fn is_enabled(&self, level: LogLevel) -> bool {
		self.levels.contains(&level)
	}

	/// Logs `message` if `level` is enabled. `details` is only built then.
	pub fn log(&self, level: LogLevel, message: &str, details: impl FnOnce() -> Value) {
		if !self.is_enabled(level) {
			return;
		}
		let details = details();

		if let Some(handler) = &self.handler {
			handler(level, message, &details);
			return;
		}

		match level {
			LogLevel::Debug => debug!(details = %details, "{message}"),
			LogLevel::Info => info!(details = %details, "{message}"),
			LogLevel::Warn => warn!(details = %details, "{message}"),
			LogLevel::Error => error!(details = %details, "{message}"),
		}
	}

	pub fn debug(&self, message: &str, details: impl FnOnce() -> Value) {
		self.log(LogLevel::Debug, message, details);
	}

	pub fn info(&self, message: &str, details: impl FnOnce() -> Value) {
		self.log(LogLevel::Info, message, details);
	}

	pub fn warn(&self, message: &str, details: impl FnOnce() -> Value) {
		self.log(LogLevel::Warn, message, details);
	}

	pub fn error(&self, message: &str, details: impl FnOnce() -> Value) {
		self.log(LogLevel::Error, message, details);
	}
}

impl Default for Logger {
	fn default() -> Self {
		Self::new()
	}
}

impl fmt::Debug for Logger {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Logger")
			.field("levels", &self.levels)
			.field("handler", &self.handler.is_some())
			.finish()
	}
}
