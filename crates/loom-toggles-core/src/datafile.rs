// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The datafile: one versioned snapshot of attributes, segments and features.

use std::collections::BTreeMap;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::condition::Condition;
use crate::error::{DatafileError, Result};
use crate::segment::{GroupSegment, Segment};
use crate::value::{lenient_variable_map, lenient_variable_value, VariableType, VariableValue};

/// Upper bound (exclusive) of the bucket space used by traffic and ranges.
pub const MAX_BUCKETED_NUMBER: u32 = 100_000;

/// One versioned configuration snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatafileContent {
	pub schema_version: String,
	pub revision: String,
	#[serde(default)]
	pub attributes: Vec<Attribute>,
	#[serde(default)]
	pub segments: Vec<Segment>,
	#[serde(default)]
	pub features: Vec<Feature>,
}

impl DatafileContent {
	/// The placeholder served before any real datafile has been loaded.
	pub fn empty() -> Self {
		Self {
			schema_version: "1".to_string(),
			revision: "unknown".to_string(),
			attributes: Vec::new(),
			segments: Vec::new(),
			features: Vec::new(),
		}
	}

	pub fn from_json(json: &str) -> Result<Self> {
		serde_json::from_str(json).map_err(DatafileError::Unparsable)
	}

	pub fn from_value(value: Value) -> Result<Self> {
		serde_json::from_value(value).map_err(DatafileError::Unparsable)
	}

	pub fn to_json(&self) -> Result<String> {
		serde_json::to_string(self).map_err(DatafileError::Unparsable)
	}
}

impl Default for DatafileContent {
	fn default() -> Self {
		Self::empty()
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttributeType {
	Boolean,
	String,
	Integer,
	Double,
	Date,
	Semver,
	Array,
}

/// Definition of a context field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attribute {
	pub key: String,
	#[serde(rename = "type")]
	pub attribute_type: AttributeType,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub archived: Option<bool>,
	/// Whether activation events should carry this attribute.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub capture: Option<bool>,
}

/// Which context attribute(s) seed the bucketing key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BucketBy {
	Single(String),
	And(Vec<String>),
	Or { or: Vec<String> },
}

/// A slice of the bucket space.
///
/// Allocations match it inclusively on both ends while mutual-exclusion
/// ranges on a feature exclude `end`; see [`Range::contains_inclusive`] and
/// [`Range::contains_half_open`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RangeRepr", into = "[u32; 2]")]
pub struct Range {
	pub start: u32,
	pub end: u32,
}

impl Range {
	pub fn new(start: u32, end: u32) -> Self {
		Self { start, end }
	}

	/// `start <= value <= end`
	pub fn contains_inclusive(&self, value: u32) -> bool {
		self.start <= value && value <= self.end
	}

	/// `start <= value < end`
	pub fn contains_half_open(&self, value: u32) -> bool {
		self.start <= value && value < self.end
	}
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RangeRepr {
	Pair([u32; 2]),
	Bounds { start: u32, end: u32 },
}

impl From<RangeRepr> for Range {
	fn from(repr: RangeRepr) -> Self {
		match repr {
			RangeRepr::Pair([start, end]) => Range { start, end },
			RangeRepr::Bounds { start, end } => Range { start, end },
		}
	}
}

impl From<Range> for [u32; 2] {
	fn from(range: Range) -> Self {
		[range.start, range.end]
	}
}

/// A variation's share of a traffic rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Allocation {
	pub variation: String,
	pub range: Range,
}

/// One ordered targeting rule of a feature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Traffic {
	pub key: String,
	pub segments: GroupSegment,
	/// Share of the bucket space enabled by this rule, `0..=100000`.
	pub percentage: u32,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub enabled: Option<bool>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub variation: Option<String>,
	#[serde(
		default,
		deserialize_with = "lenient_variable_map",
		skip_serializing_if = "Option::is_none"
	)]
	pub variables: Option<BTreeMap<String, VariableValue>>,
	#[serde(default)]
	pub allocation: Vec<Allocation>,
}

/// Predicate attached to a force entry or variable override.
#[derive(Debug, Clone, PartialEq)]
pub enum Targeting {
	Conditions(Condition),
	Segments(GroupSegment),
}

fn targeting_from_parts(
	conditions: Option<Condition>,
	segments: Option<GroupSegment>,
) -> std::result::Result<Option<Targeting>, String> {
	match (conditions, segments) {
		(Some(_), Some(_)) => Err("`conditions` and `segments` are mutually exclusive".to_string()),
		(Some(conditions), None) => Ok(Some(Targeting::Conditions(conditions))),
		(None, Some(segments)) => Ok(Some(Targeting::Segments(segments))),
		(None, None) => Ok(None),
	}
}

fn targeting_into_parts(target: Option<Targeting>) -> (Option<Condition>, Option<GroupSegment>) {
	match target {
		Some(Targeting::Conditions(conditions)) => (Some(conditions), None),
		Some(Targeting::Segments(segments)) => (None, Some(segments)),
		None => (None, None),
	}
}

/// Conditional value replacing a variation's variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "VariableOverrideRepr", into = "VariableOverrideRepr")]
pub struct VariableOverride {
	/// `None` never matches.
	pub target: Option<Targeting>,
	pub value: VariableValue,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VariableOverrideRepr {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	conditions: Option<Condition>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	segments: Option<GroupSegment>,
	#[serde(default, deserialize_with = "lenient_variable_value")]
	value: Option<VariableValue>,
}

impl TryFrom<VariableOverrideRepr> for VariableOverride {
	type Error = String;

	fn try_from(repr: VariableOverrideRepr) -> std::result::Result<Self, Self::Error> {
		let Some(value) = repr.value else {
			return Err("variable override without a supported value".to_string());
		};
		Ok(Self {
			target: targeting_from_parts(repr.conditions, repr.segments)?,
			value,
		})
	}
}

/// Decodes overrides one by one, dropping those whose value is unsupported.
fn lenient_overrides<'de, D>(deserializer: D) -> std::result::Result<Vec<VariableOverride>, D::Error>
where
	D: Deserializer<'de>,
{
	let reprs = Vec::<VariableOverrideRepr>::deserialize(deserializer)?;
	let mut overrides = Vec::with_capacity(reprs.len());
	for repr in reprs {
		if repr.value.is_none() {
			warn!("dropping variable override without a supported value");
			continue;
		}
		overrides.push(VariableOverride::try_from(repr).map_err(D::Error::custom)?);
	}
	Ok(overrides)
}

/// Decodes the variable schema, dropping entries whose default value is unsupported.
///
/// A dropped entry behaves like an undeclared variable.
fn lenient_variables_schema<'de, D>(deserializer: D) -> std::result::Result<Vec<VariableSchema>, D::Error>
where
	D: Deserializer<'de>,
{
	let raw = Vec::<Value>::deserialize(deserializer)?;
	let mut schema = Vec::with_capacity(raw.len());
	for entry in raw {
		if let Some(default_value) = entry.get("defaultValue") {
			if let Err(e) = VariableValue::try_from(default_value.clone()) {
				let key = entry.get("key").and_then(Value::as_str).unwrap_or_default();
				warn!(variable = %key, error = %e, "dropping variable schema with unsupported default value");
				continue;
			}
		}
		schema.push(VariableSchema::deserialize(entry).map_err(D::Error::custom)?);
	}
	Ok(schema)
}

impl From<VariableOverride> for VariableOverrideRepr {
	fn from(value: VariableOverride) -> Self {
		let (conditions, segments) = targeting_into_parts(value.target);
		Self {
			conditions,
			segments,
			value: Some(value.value),
		}
	}
}

/// A variable value defined by one variation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariationVariable {
	pub key: String,
	/// `None` when absent or when the datafile value had an unsupported shape.
	#[serde(
		default,
		deserialize_with = "lenient_variable_value",
		skip_serializing_if = "Option::is_none"
	)]
	pub value: Option<VariableValue>,
	/// Overrides with an unsupported value are dropped at decode.
	#[serde(
		default,
		deserialize_with = "lenient_overrides",
		skip_serializing_if = "Vec::is_empty"
	)]
	pub overrides: Vec<VariableOverride>,
}

/// One experiment arm.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Variation {
	pub value: String,
	/// Design-time only; bucketing reads allocations.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub weight: Option<f64>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub description: Option<String>,
	#[serde(default)]
	pub variables: Vec<VariationVariable>,
}

impl Variation {
	pub fn variable(&self, key: &str) -> Option<&VariationVariable> {
		self.variables.iter().find(|v| v.key == key)
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariableSchema {
	pub key: String,
	#[serde(rename = "type")]
	pub variable_type: VariableType,
	pub default_value: VariableValue,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub deprecated: Option<bool>,
}

/// An unconditional or conditional override block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ForceRepr", into = "ForceRepr")]
pub struct Force {
	/// `None` never matches.
	pub target: Option<Targeting>,
	pub enabled: Option<bool>,
	pub variation: Option<String>,
	pub variables: Option<BTreeMap<String, VariableValue>>,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ForceRepr {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	conditions: Option<Condition>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	segments: Option<GroupSegment>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	enabled: Option<bool>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	variation: Option<String>,
	#[serde(
		default,
		deserialize_with = "lenient_variable_map",
		skip_serializing_if = "Option::is_none"
	)]
	variables: Option<BTreeMap<String, VariableValue>>,
}

impl TryFrom<ForceRepr> for Force {
	type Error = String;

	fn try_from(repr: ForceRepr) -> std::result::Result<Self, Self::Error> {
		Ok(Self {
			target: targeting_from_parts(repr.conditions, repr.segments)?,
			enabled: repr.enabled,
			variation: repr.variation,
			variables: repr.variables,
		})
	}
}

impl From<Force> for ForceRepr {
	fn from(force: Force) -> Self {
		let (conditions, segments) = targeting_into_parts(force.target);
		Self {
			conditions,
			segments,
			enabled: force.enabled,
			variation: force.variation,
			variables: force.variables,
		}
	}
}

/// A dependency on another feature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Required {
	Key(String),
	WithVariation { key: String, variation: String },
}

impl Required {
	pub fn key(&self) -> &str {
		match self {
			Required::Key(key) => key,
			Required::WithVariation { key, .. } => key,
		}
	}

	pub fn variation(&self) -> Option<&str> {
		match self {
			Required::Key(_) => None,
			Required::WithVariation { variation, .. } => Some(variation),
		}
	}
}

/// One flag or experiment definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Feature {
	pub key: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub deprecated: Option<bool>,
	pub bucket_by: BucketBy,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub required: Vec<Required>,
	#[serde(default, deserialize_with = "lenient_variables_schema")]
	pub variables_schema: Vec<VariableSchema>,
	#[serde(default)]
	pub variations: Vec<Variation>,
	/// First match wins.
	#[serde(default)]
	pub traffic: Vec<Traffic>,
	/// First match wins.
	#[serde(default)]
	pub force: Vec<Force>,
	/// Slots claimed in a mutually exclusive group.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub ranges: Option<Vec<Range>>,
}

impl Feature {
	pub fn is_deprecated(&self) -> bool {
		self.deprecated.unwrap_or(false)
	}

	pub fn variation(&self, value: &str) -> Option<&Variation> {
		self.variations.iter().find(|v| v.value == value)
	}

	pub fn variable_schema(&self, key: &str) -> Option<&VariableSchema> {
		self.variables_schema.iter().find(|s| s.key == key)
	}
}
