// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Error types for datafile decoding.

use serde_json::Value;
use thiserror::Error;

/// Result type for datafile operations.
pub type Result<T> = std::result::Result<T, DatafileError>;

/// Errors that can occur while decoding or encoding a datafile.
#[derive(Debug, Error)]
pub enum DatafileError {
	#[error("unparsable datafile: {0}")]
	Unparsable(#[from] serde_json::Error),

	#[error(transparent)]
	UnsupportedValueShape(#[from] UnsupportedValueShape),
}

/// A JSON value that does not fit any known tagged-union shape.
///
/// Decoders report this per value, so a single bad condition or variable
/// value does not prevent the rest of the datafile from loading. The raw
/// JSON is kept so the datafile can be re-encoded unchanged.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("unsupported value shape: {shape}")]
pub struct UnsupportedValueShape {
	pub shape: String,
	pub raw: Value,
}

impl UnsupportedValueShape {
	pub fn new(shape: impl Into<String>, raw: Value) -> Self {
		Self {
			shape: shape.into(),
			raw,
		}
	}

	/// Builds an error describing the JSON kind of `raw`.
	pub fn of(raw: &Value) -> Self {
		Self::new(json_kind(raw), raw.clone())
	}
}

/// Short human-readable name for the runtime shape of a JSON node.
pub(crate) fn json_kind(value: &Value) -> &'static str {
	match value {
		Value::Null => "null",
		Value::Bool(_) => "boolean",
		Value::Number(_) => "number",
		Value::String(_) => "string",
		Value::Array(_) => "array",
		Value::Object(_) => "object",
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn unsupported_shape_names_the_json_kind() {
		let err = UnsupportedValueShape::of(&serde_json::json!({"a": 1}));
		assert_eq!(err.shape, "object");
		assert_eq!(err.to_string(), "unsupported value shape: object");
	}

	#[test]
	fn unparsable_wraps_serde_error() {
		let err: DatafileError = serde_json::from_str::<Value>("{").unwrap_err().into();
		assert!(err.to_string().starts_with("unparsable datafile"));
	}

	#[test]
	fn unsupported_shape_converts_transparently() {
		let err: DatafileError = UnsupportedValueShape::new("null", Value::Null).into();
		assert_eq!(err.to_string(), "unsupported value shape: null");
	}
}
