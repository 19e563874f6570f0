// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Error types for the toggles SDK.

use loom_toggles_core::DatafileError;
use thiserror::Error;

/// Toggles SDK errors.
///
/// Evaluation never fails; these only surface from construction, datafile
/// loading and refresh.
#[derive(Debug, Error)]
pub enum TogglesError {
	/// Neither a datafile nor a datafile URL was supplied.
	#[error("no datafile or datafile URL configured")]
	MissingDatafileConfiguration,

	/// Fetching the datafile failed at the transport or HTTP level.
	#[error("failed to fetch datafile from {url}: {message}")]
	DatafileFetchFailed { url: String, message: String },

	/// The datafile could not be decoded.
	#[error(transparent)]
	UnparsableDatafile(#[from] DatafileError),

	/// A datafile URL was configured but no tokio runtime is running.
	#[error("no tokio runtime available to fetch the datafile")]
	RuntimeUnavailable,
}

impl TogglesError {
	pub(crate) fn fetch_failed(url: &str, message: impl ToString) -> Self {
		TogglesError::DatafileFetchFailed {
			url: url.to_string(),
			message: message.to_string(),
		}
	}
}

/// Result type alias for SDK operations.
pub type Result<T> = std::result::Result<T, TogglesError>;
