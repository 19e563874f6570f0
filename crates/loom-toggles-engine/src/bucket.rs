// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Deterministic bucketing of contexts into `[0, 100000)`.

use std::fmt;
use std::io::Cursor;
use std::sync::Arc;

use loom_toggles_core::{BucketBy, Context, Feature, MAX_BUCKETED_NUMBER};
use murmur3::murmur3_32;

/// Seed shared by every SDK implementation; changing it reshuffles all users.
pub const HASH_SEED: u32 = 1;

pub const DEFAULT_BUCKET_KEY_SEPARATOR: &str = ".";

/// Replaces the computed bucket key: `(feature, context, default_key) -> key`.
pub type BucketKeyHook = Arc<dyn Fn(&Feature, &Context, String) -> String + Send + Sync>;

/// Replaces the computed bucket value: `(feature, context, default_value) -> value`.
pub type BucketValueHook = Arc<dyn Fn(&Feature, &Context, u32) -> u32 + Send + Sync>;

/// MurmurHash3 x86 32-bit of `key` with [`HASH_SEED`].
pub fn hash(key: &str) -> u32 {
	// Reading from an in-memory cursor cannot fail.
	murmur3_32(&mut Cursor::new(key.as_bytes()), HASH_SEED).unwrap_or(0)
}

/// `floor(hash(key) / 2^32 * 100000)`
pub fn bucket_value(key: &str) -> u32 {
	((u64::from(hash(key)) * u64::from(MAX_BUCKETED_NUMBER)) >> 32) as u32
}

/// Joins the `bucketBy` attribute values and the feature key.
///
/// Attributes missing from the context, or set to null, are skipped.
pub fn bucket_key(feature: &Feature, context: &Context, separator: &str) -> String {
	let segment = |attribute: &str| context.get(attribute).and_then(|value| value.to_bucket_segment());

	let mut parts: Vec<String> = match &feature.bucket_by {
		BucketBy::Single(attribute) => segment(attribute).into_iter().collect(),
		BucketBy::And(attributes) => attributes.iter().filter_map(|a| segment(a)).collect(),
		BucketBy::Or { or } => or.iter().find_map(|a| segment(a)).into_iter().collect(),
	};
	parts.push(feature.key.clone());
	parts.join(separator)
}

/// Bucket key and value computed for one feature and context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bucket {
	pub key: String,
	pub value: u32,
}

/// Bucketing configuration: separator and the optional override hooks.
#[derive(Clone)]
pub struct Bucketer {
	separator: String,
	configure_key: Option<BucketKeyHook>,
	configure_value: Option<BucketValueHook>,
}

impl Bucketer {
	pub fn new() -> Self {
		Self {
			separator: DEFAULT_BUCKET_KEY_SEPARATOR.to_string(),
			configure_key: None,
			configure_value: None,
		}
	}

	pub fn with_separator(mut self, separator: impl Into<String>) -> Self {
		self.separator = separator.into();
		self
	}

	pub fn with_key_hook(mut self, hook: BucketKeyHook) -> Self {
		self.configure_key = Some(hook);
		self
	}

	pub fn with_value_hook(mut self, hook: BucketValueHook) -> Self {
		self.configure_value = Some(hook);
		self
	}

	pub fn separator(&self) -> &str {
		&self.separator
	}

	pub fn bucket(&self, feature: &Feature, context: &Context) -> Bucket {
		let mut key = bucket_key(feature, context, &self.separator);
		if let Some(hook) = &self.configure_key {
			key = hook(feature, context, key);
		}

		let mut value = bucket_value(&key);
		if let Some(hook) = &self.configure_value {
			value = hook(feature, context, value);
		}

		Bucket { key, value }
	}
}

impl Default for Bucketer {
	fn default() -> Self {
		Self::new()
	}
}

impl fmt::Debug for Bucketer {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Bucketer")
			.field("separator", &self.separator)
			.field("configure_key", &self.configure_key.is_some())
			.field("configure_value", &self.configure_value.is_some())
			.finish()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	fn feature(bucket_by: serde_json::Value) -> Feature {
		serde_json::from_value(json!({"key": "foo", "bucketBy": bucket_by})).unwrap()
	}

	#[test]
	fn reference_vectors() {
		assert_eq!(bucket_value("foo"), 20602);
		assert_eq!(bucket_value("bar"), 89144);
		assert_eq!(bucket_value("123.foo"), 3151);
		assert_eq!(bucket_value("123.bar"), 9710);
		assert_eq!(bucket_value("123.456.foo"), 14432);
		assert_eq!(bucket_value("123.456.bar"), 1982);
	}

	#[test]
	fn single_attribute_key() {
		let context = Context::new().with_attribute("userId", "123");
		assert_eq!(bucket_key(&feature(json!("userId")), &context, "."), "123.foo");
	}

	#[test]
	fn and_joins_every_present_attribute() {
		let context = Context::new()
			.with_attribute("userId", "123")
			.with_attribute("companyId", 456);
		let f = feature(json!(["userId", "companyId"]));
		assert_eq!(bucket_key(&f, &context, "."), "123.456.foo");

		let context = Context::new().with_attribute("companyId", 456);
		assert_eq!(bucket_key(&f, &context, "."), "456.foo");
	}

	#[test]
	fn or_picks_first_present_attribute() {
		let f = feature(json!({"or": ["userId", "deviceId"]}));

		let context = Context::new().with_attribute("deviceId", "abc");
		assert_eq!(bucket_key(&f, &context, "."), "abc.foo");

		let context = Context::new()
			.with_attribute("userId", "123")
			.with_attribute("deviceId", "abc");
		assert_eq!(bucket_key(&f, &context, "."), "123.foo");
	}

	#[test]
	fn null_attributes_are_skipped() {
		let context = Context::new().with_attribute("userId", loom_toggles_core::AttributeValue::Null);
		assert_eq!(bucket_key(&feature(json!("userId")), &context, "."), "foo");
	}

	#[test]
	fn custom_separator() {
		let context = Context::new().with_attribute("userId", "123");
		let bucketer = Bucketer::new().with_separator("/");
		assert_eq!(bucketer.bucket(&feature(json!("userId")), &context).key, "123/foo");
	}

	#[test]
	fn hooks_override_key_and_value() {
		let context = Context::new().with_attribute("userId", "123");
		let bucketer = Bucketer::new()
			.with_key_hook(Arc::new(|_, _, key| format!("{key}.salt")))
			.with_value_hook(Arc::new(|_, _, _| 49_999));

		let bucket = bucketer.bucket(&feature(json!("userId")), &context);
		assert_eq!(bucket.key, "123.foo.salt");
		assert_eq!(bucket.value, 49_999);
	}

	#[test]
	fn default_bucketer_matches_vectors() {
		let context = Context::new().with_attribute("userId", "123");
		let bucket = Bucketer::default().bucket(&feature(json!("userId")), &context);
		assert_eq!(bucket.value, 3151);
	}

	mod proptest_tests {
		use super::*;
		use proptest::prelude::*;

		proptest! {
			#[test]
			fn bucket_value_in_range(key in ".{0,64}") {
				prop_assert!(bucket_value(&key) < MAX_BUCKETED_NUMBER);
			}

			#[test]
			fn bucket_value_is_pure(key in "[a-zA-Z0-9.]{0,32}") {
				prop_assert_eq!(bucket_value(&key), bucket_value(&key));
			}
		}
	}
}
