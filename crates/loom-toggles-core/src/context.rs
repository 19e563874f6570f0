// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Result, UnsupportedValueShape};
use crate::value::AttributeValue;

/// Attribute values describing the user or request being evaluated.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Context {
	attributes: BTreeMap<String, AttributeValue>,
}

impl Context {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
		self.attributes.insert(key.into(), value.into());
		self
	}

	pub fn insert(&mut self, key: impl Into<String>, value: impl Into<AttributeValue>) {
		self.attributes.insert(key.into(), value.into());
	}

	pub fn get(&self, key: &str) -> Option<&AttributeValue> {
		self.attributes.get(key)
	}

	pub fn contains_key(&self, key: &str) -> bool {
		self.attributes.contains_key(key)
	}

	pub fn is_empty(&self) -> bool {
		self.attributes.is_empty()
	}

	pub fn len(&self) -> usize {
		self.attributes.len()
	}

	pub fn iter(&self) -> impl Iterator<Item = (&String, &AttributeValue)> {
		self.attributes.iter()
	}

	/// Builds a context from a JSON object.
	///
	/// Decodes like the serde impl: strings are kept as strings and dates
	/// must be supplied through [`Context::with_attribute`]. Nested objects
	/// and arrays are rejected.
	pub fn from_json(value: Value) -> Result<Self> {
		let Value::Object(map) = value else {
			return Err(UnsupportedValueShape::new("context that is not an object", value).into());
		};

		let mut context = Context::new();
		for (key, raw) in map {
			let value = AttributeValue::try_from(raw)?;
			context.attributes.insert(key, value);
		}
		Ok(context)
	}

	/// Returns only the attributes whose keys are in `keys`.
	pub fn select<'a>(&self, keys: impl IntoIterator<Item = &'a str>) -> Context {
		let attributes = keys
			.into_iter()
			.filter_map(|key| self.attributes.get(key).map(|value| (key.to_string(), value.clone())))
			.collect();
		Context { attributes }
	}
}

impl FromIterator<(String, AttributeValue)> for Context {
	fn from_iter<I: IntoIterator<Item = (String, AttributeValue)>>(iter: I) -> Self {
		Context {
			attributes: iter.into_iter().collect(),
		}
	}
}

impl From<BTreeMap<String, AttributeValue>> for Context {
	fn from(attributes: BTreeMap<String, AttributeValue>) -> Self {
		Context { attributes }
	}
}

/// Reads a context attribute as a date, accepting RFC 3339 strings.
pub fn attribute_as_date(value: &AttributeValue) -> Option<DateTime<Utc>> {
	match value {
		AttributeValue::Date(d) => Some(*d),
		AttributeValue::String(s) => DateTime::parse_from_rfc3339(s)
			.ok()
			.map(|d| d.with_timezone(&Utc)),
		_ => None,
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::error::DatafileError;
	use serde_json::json;

	#[test]
	fn builder_and_lookup() {
		let context = Context::new()
			.with_attribute("userId", "123")
			.with_attribute("age", 30)
			.with_attribute("beta", true);

		assert_eq!(context.len(), 3);
		assert_eq!(context.get("userId"), Some(&AttributeValue::String("123".to_string())));
		assert_eq!(context.get("age"), Some(&AttributeValue::Integer(30)));
		assert!(context.get("missing").is_none());
	}

	#[test]
	fn from_json_sniffs_scalars() {
		let context = Context::from_json(json!({
			"userId": "123",
			"age": 30,
			"score": 0.5,
			"beta": false,
			"nothing": null
		}))
		.unwrap();

		assert_eq!(context.get("score"), Some(&AttributeValue::Double(0.5)));
		assert_eq!(context.get("nothing"), Some(&AttributeValue::Null));
	}

	#[test]
	fn from_json_rejects_nested_values() {
		let err = Context::from_json(json!({"address": {"city": "Amsterdam"}})).unwrap_err();
		assert!(matches!(err, DatafileError::UnsupportedValueShape(_)));

		assert!(Context::from_json(json!(["userId"])).is_err());
	}

	#[test]
	fn serde_and_from_json_agree() {
		let raw = json!({
			"userId": "123",
			"signup": "2024-01-01T00:00:00Z",
			"age": 30,
			"nothing": null
		});
		let via_serde: Context = serde_json::from_value(raw.clone()).unwrap();
		let via_from_json = Context::from_json(raw).unwrap();

		assert_eq!(via_serde, via_from_json);
		assert_eq!(
			via_serde.get("signup"),
			Some(&AttributeValue::String("2024-01-01T00:00:00Z".to_string()))
		);
		assert!(serde_json::from_value::<Context>(json!({"address": {"city": "Amsterdam"}})).is_err());
	}

	#[test]
	fn select_keeps_requested_keys() {
		let context = Context::new()
			.with_attribute("userId", "123")
			.with_attribute("country", "nl");
		let selected = context.select(["country", "absent"]);
		assert_eq!(selected.len(), 1);
		assert!(selected.contains_key("country"));
	}

	#[test]
	fn dates_from_strings() {
		let value = AttributeValue::from("2024-03-01T10:00:00Z");
		assert!(attribute_as_date(&value).is_some());
		assert!(attribute_as_date(&AttributeValue::from("yesterday")).is_none());
		assert!(attribute_as_date(&AttributeValue::from(5)).is_none());
	}
}
