// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Tagged-union values for context attributes, condition operands and
//! feature variables.
//!
//! Datafile values arrive as untyped JSON. Each union has a shape-sniffing
//! decoder that inspects the JSON node in a fixed order (null, boolean,
//! number, array, object, string) instead of trusting a declared type.

use std::collections::BTreeMap;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::de::{DeserializeOwned, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use crate::error::UnsupportedValueShape;

/// A value supplied by the caller for a single context attribute.
///
/// Decoding from JSON keeps strings as strings, including ones that look like
/// dates; date operators parse them on demand.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AttributeValue {
	Boolean(bool),
	Integer(i64),
	Double(f64),
	Date(DateTime<Utc>),
	String(String),
	Null,
}

impl AttributeValue {
	/// Renders the value as a bucketing key segment.
	///
	/// Returns `None` for `Null`, which is treated like an absent attribute.
	pub fn to_bucket_segment(&self) -> Option<String> {
		match self {
			AttributeValue::Boolean(b) => Some(b.to_string()),
			AttributeValue::Integer(i) => Some(i.to_string()),
			AttributeValue::Double(d) => Some(format_double(*d)),
			AttributeValue::Date(d) => Some(d.to_rfc3339_opts(SecondsFormat::Millis, true)),
			AttributeValue::String(s) => Some(s.clone()),
			AttributeValue::Null => None,
		}
	}
}

impl TryFrom<Value> for AttributeValue {
	type Error = UnsupportedValueShape;

	fn try_from(value: Value) -> Result<Self, Self::Error> {
		match value {
			Value::Null => Ok(AttributeValue::Null),
			Value::Bool(b) => Ok(AttributeValue::Boolean(b)),
			Value::Number(ref n) => decode_number(n, &value).map(|n| match n {
				Number::Integer(i) => AttributeValue::Integer(i),
				Number::Double(d) => AttributeValue::Double(d),
			}),
			Value::String(s) => Ok(AttributeValue::String(s)),
			other => Err(UnsupportedValueShape::of(&other)),
		}
	}
}

impl<'de> Deserialize<'de> for AttributeValue {
	fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
	where
		D: Deserializer<'de>,
	{
		let raw = Value::deserialize(deserializer)?;
		AttributeValue::try_from(raw).map_err(serde::de::Error::custom)
	}
}

/// Integral doubles print without a fractional part (`3.0` => `"3"`).
fn format_double(d: f64) -> String {
	if d.is_finite() && d.fract() == 0.0 && d.abs() < i64::MAX as f64 {
		(d as i64).to_string()
	} else {
		d.to_string()
	}
}

impl From<bool> for AttributeValue {
	fn from(value: bool) -> Self {
		AttributeValue::Boolean(value)
	}
}

impl From<i64> for AttributeValue {
	fn from(value: i64) -> Self {
		AttributeValue::Integer(value)
	}
}

impl From<i32> for AttributeValue {
	fn from(value: i32) -> Self {
		AttributeValue::Integer(value as i64)
	}
}

impl From<u32> for AttributeValue {
	fn from(value: u32) -> Self {
		AttributeValue::Integer(value as i64)
	}
}

impl From<f64> for AttributeValue {
	fn from(value: f64) -> Self {
		AttributeValue::Double(value)
	}
}

impl From<&str> for AttributeValue {
	fn from(value: &str) -> Self {
		AttributeValue::String(value.to_string())
	}
}

impl From<String> for AttributeValue {
	fn from(value: String) -> Self {
		AttributeValue::String(value)
	}
}

impl From<DateTime<Utc>> for AttributeValue {
	fn from(value: DateTime<Utc>) -> Self {
		AttributeValue::Date(value)
	}
}

/// The right-hand operand of a condition leaf.
#[derive(Debug, Clone, PartialEq)]
pub enum ConditionValue {
	String(String),
	Integer(i64),
	Double(f64),
	Boolean(bool),
	Date(DateTime<Utc>),
	/// Scalars only; nested arrays and objects are rejected by the decoder.
	Array(Vec<ConditionValue>),
	Null,
}

impl ConditionValue {
	/// Decodes a condition operand from its JSON shape.
	pub fn from_json(value: &Value) -> Result<Self, UnsupportedValueShape> {
		match value {
			Value::Null => Ok(ConditionValue::Null),
			Value::Bool(b) => Ok(ConditionValue::Boolean(*b)),
			Value::Number(n) => decode_number(n, value).map(|n| match n {
				Number::Integer(i) => ConditionValue::Integer(i),
				Number::Double(d) => ConditionValue::Double(d),
			}),
			Value::Array(items) => items
				.iter()
				.map(|item| match item {
					Value::Array(_) | Value::Object(_) => Err(UnsupportedValueShape::new(
						"array containing non-scalar elements",
						value.clone(),
					)),
					scalar => ConditionValue::from_json(scalar),
				})
				.collect::<Result<Vec<_>, _>>()
				.map(ConditionValue::Array),
			Value::Object(_) => Err(UnsupportedValueShape::of(value)),
			Value::String(s) => Ok(ConditionValue::String(s.clone())),
		}
	}

	/// Decodes a `before`/`after` operand, which must be an RFC 3339 date.
	pub fn date_from_json(value: &Value) -> Result<Self, UnsupportedValueShape> {
		match value {
			Value::String(s) => DateTime::parse_from_rfc3339(s)
				.map(|d| ConditionValue::Date(d.with_timezone(&Utc)))
				.map_err(|_| UnsupportedValueShape::new("string that is not an RFC 3339 date", value.clone())),
			other => Err(UnsupportedValueShape::of(other)),
		}
	}

	pub fn to_json(&self) -> Value {
		match self {
			ConditionValue::String(s) => Value::String(s.clone()),
			ConditionValue::Integer(i) => Value::from(*i),
			ConditionValue::Double(d) => Value::from(*d),
			ConditionValue::Boolean(b) => Value::Bool(*b),
			ConditionValue::Date(d) => Value::String(d.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
			ConditionValue::Array(items) => Value::Array(items.iter().map(Self::to_json).collect()),
			ConditionValue::Null => Value::Null,
		}
	}
}

/// Declared type of a feature variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VariableType {
	Boolean,
	String,
	Integer,
	Double,
	Array,
	Object,
	Json,
}

/// A resolved feature variable value.
///
/// `Json` holds compact JSON text exactly as it appeared in the datafile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "Value")]
pub enum VariableValue {
	Boolean(bool),
	String(String),
	Integer(i64),
	Double(f64),
	Array(Vec<String>),
	Object(Map<String, Value>),
	Json(String),
}

impl VariableValue {
	pub fn as_bool(&self) -> Option<bool> {
		match self {
			VariableValue::Boolean(b) => Some(*b),
			_ => None,
		}
	}

	pub fn as_str(&self) -> Option<&str> {
		match self {
			VariableValue::String(s) => Some(s),
			_ => None,
		}
	}

	pub fn as_i64(&self) -> Option<i64> {
		match self {
			VariableValue::Integer(i) => Some(*i),
			_ => None,
		}
	}

	/// Integers widen to doubles; nothing else converts.
	pub fn as_f64(&self) -> Option<f64> {
		match self {
			VariableValue::Double(d) => Some(*d),
			VariableValue::Integer(i) => Some(*i as f64),
			_ => None,
		}
	}

	pub fn as_array(&self) -> Option<&[String]> {
		match self {
			VariableValue::Array(items) => Some(items),
			_ => None,
		}
	}

	pub fn as_object(&self) -> Option<&Map<String, Value>> {
		match self {
			VariableValue::Object(map) => Some(map),
			_ => None,
		}
	}

	/// Deserializes an object, array or JSON-text value into `T`.
	pub fn deserialize_into<T: DeserializeOwned>(&self) -> Option<T> {
		match self {
			VariableValue::Json(text) | VariableValue::String(text) => serde_json::from_str(text).ok(),
			VariableValue::Object(map) => serde_json::from_value(Value::Object(map.clone())).ok(),
			VariableValue::Array(items) => serde_json::from_value(Value::from(items.clone())).ok(),
			_ => None,
		}
	}
}

impl TryFrom<Value> for VariableValue {
	type Error = UnsupportedValueShape;

	fn try_from(value: Value) -> Result<Self, Self::Error> {
		match value {
			Value::Null => Err(UnsupportedValueShape::of(&value)),
			Value::Bool(b) => Ok(VariableValue::Boolean(b)),
			Value::Number(ref n) => decode_number(n, &value).map(|n| match n {
				Number::Integer(i) => VariableValue::Integer(i),
				Number::Double(d) => VariableValue::Double(d),
			}),
			Value::Array(items) => {
				if items.iter().all(Value::is_string) {
					Ok(VariableValue::Array(
						items
							.into_iter()
							.filter_map(|item| match item {
								Value::String(s) => Some(s),
								_ => None,
							})
							.collect(),
					))
				} else {
					Ok(VariableValue::Json(Value::Array(items).to_string()))
				}
			}
			Value::Object(map) => Ok(VariableValue::Object(map)),
			Value::String(s) => {
				if parse_stringified_json(&s).is_some() {
					Ok(VariableValue::Json(s))
				} else {
					Ok(VariableValue::String(s))
				}
			}
		}
	}
}

impl From<VariableValue> for Value {
	fn from(value: VariableValue) -> Self {
		match value {
			VariableValue::Boolean(b) => Value::Bool(b),
			VariableValue::String(s) | VariableValue::Json(s) => Value::String(s),
			VariableValue::Integer(i) => Value::from(i),
			VariableValue::Double(d) => Value::from(d),
			VariableValue::Array(items) => Value::from(items),
			VariableValue::Object(map) => Value::Object(map),
		}
	}
}

impl From<bool> for VariableValue {
	fn from(value: bool) -> Self {
		VariableValue::Boolean(value)
	}
}

impl From<&str> for VariableValue {
	fn from(value: &str) -> Self {
		VariableValue::String(value.to_string())
	}
}

impl From<String> for VariableValue {
	fn from(value: String) -> Self {
		VariableValue::String(value)
	}
}

impl From<i64> for VariableValue {
	fn from(value: i64) -> Self {
		VariableValue::Integer(value)
	}
}

impl From<f64> for VariableValue {
	fn from(value: f64) -> Self {
		VariableValue::Double(value)
	}
}

enum Number {
	Integer(i64),
	Double(f64),
}

fn decode_number(n: &serde_json::Number, raw: &Value) -> Result<Number, UnsupportedValueShape> {
	if let Some(i) = n.as_i64() {
		Ok(Number::Integer(i))
	} else if let Some(d) = n.as_f64() {
		Ok(Number::Double(d))
	} else {
		Err(UnsupportedValueShape::new("number out of range", raw.clone()))
	}
}

/// Parses a string holding a stringified JSON object or array.
///
/// Older datafiles embed conditions, segments and JSON variables as text.
pub(crate) fn parse_stringified_json(s: &str) -> Option<Value> {
	let trimmed = s.trim_start();
	if !(trimmed.starts_with('{') || trimmed.starts_with('[')) {
		return None;
	}
	match serde_json::from_str::<Value>(trimmed) {
		Ok(value @ (Value::Object(_) | Value::Array(_))) => Some(value),
		_ => None,
	}
}

/// Deserializes an optional variable value, dropping unsupported shapes.
pub(crate) fn lenient_variable_value<'de, D>(deserializer: D) -> Result<Option<VariableValue>, D::Error>
where
	D: Deserializer<'de>,
{
	let raw = Option::<Value>::deserialize(deserializer)?;
	Ok(raw.and_then(|raw| match VariableValue::try_from(raw) {
		Ok(value) => Some(value),
		Err(e) => {
			warn!(error = %e, "ignoring variable value with unsupported shape");
			None
		}
	}))
}

/// Deserializes an optional variable map, dropping entries with unsupported shapes.
pub(crate) fn lenient_variable_map<'de, D>(
	deserializer: D,
) -> Result<Option<BTreeMap<String, VariableValue>>, D::Error>
where
	D: Deserializer<'de>,
{
	let raw = Option::<Map<String, Value>>::deserialize(deserializer)?;
	Ok(raw.map(|map| {
		map.into_iter()
			.filter_map(|(key, raw)| match VariableValue::try_from(raw) {
				Ok(value) => Some((key, value)),
				Err(e) => {
					warn!(variable = %key, error = %e, "ignoring variable value with unsupported shape");
					None
				}
			})
			.collect()
	}))
}
