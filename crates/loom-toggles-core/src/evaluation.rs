// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Evaluation results and caller-supplied overrides.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::datafile::{Force, Traffic, VariableSchema, Variation};
use crate::value::VariableValue;

/// The precedence step that produced an evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvaluationReason {
	/// Feature is not in the datafile, or the variable has no schema.
	NotFound,
	/// Feature defines no variations.
	NoVariations,
	/// Flag evaluated to disabled, so variations and variables are not served.
	Disabled,
	/// A required feature is disabled or on the wrong variation.
	Required,
	/// Bucket value fell outside the feature's mutually exclusive ranges.
	OutOfRange,
	Forced,
	Sticky,
	Initial,
	/// Matched traffic rule, by percentage or by its own variation/variables.
	Rule,
	/// Traffic rule states `enabled` explicitly, or a variable override matched.
	Override,
	/// Resolved through an allocation or a mutually exclusive range.
	Allocated,
	/// Variable fell back to its schema default.
	Defaulted,
	Error,
}

impl EvaluationReason {
	pub fn as_str(&self) -> &'static str {
		match self {
			EvaluationReason::NotFound => "not_found",
			EvaluationReason::NoVariations => "no_variations",
			EvaluationReason::Disabled => "disabled",
			EvaluationReason::Required => "required",
			EvaluationReason::OutOfRange => "out_of_range",
			EvaluationReason::Forced => "forced",
			EvaluationReason::Sticky => "sticky",
			EvaluationReason::Initial => "initial",
			EvaluationReason::Rule => "rule",
			EvaluationReason::Override => "override",
			EvaluationReason::Allocated => "allocated",
			EvaluationReason::Defaulted => "defaulted",
			EvaluationReason::Error => "error",
		}
	}
}

impl std::fmt::Display for EvaluationReason {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(self.as_str())
	}
}

/// A caller-supplied result for one feature that bypasses the datafile.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StickyFeature {
	pub enabled: bool,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub variation: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub variables: Option<BTreeMap<String, VariableValue>>,
}

impl StickyFeature {
	pub fn enabled(enabled: bool) -> Self {
		Self {
			enabled,
			..Self::default()
		}
	}

	pub fn with_variation(mut self, variation: impl Into<String>) -> Self {
		self.variation = Some(variation.into());
		self
	}

	pub fn with_variable(mut self, key: impl Into<String>, value: impl Into<VariableValue>) -> Self {
		self.variables
			.get_or_insert_with(BTreeMap::new)
			.insert(key.into(), value.into());
		self
	}

	pub fn variable(&self, key: &str) -> Option<&VariableValue> {
		self.variables.as_ref().and_then(|vars| vars.get(key))
	}
}

/// Sticky or initial overrides keyed by feature key.
pub type StickyFeatures = HashMap<String, StickyFeature>;

/// The outcome of one flag, variation or variable query.
///
/// `reason` is always set. Which of the remaining fields are populated
/// depends on the query and on the step that resolved it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Evaluation {
	pub feature_key: String,
	pub reason: EvaluationReason,

	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub bucket_key: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub bucket_value: Option<u32>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub rule_key: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub error: Option<String>,

	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub enabled: Option<bool>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub traffic: Option<Traffic>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub force_index: Option<usize>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub force: Option<Force>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub sticky: Option<StickyFeature>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub initial: Option<StickyFeature>,

	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub variation: Option<Variation>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub variation_value: Option<String>,

	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub variable_key: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub variable_value: Option<VariableValue>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub variable_schema: Option<VariableSchema>,
}

impl Evaluation {
	pub fn new(feature_key: impl Into<String>, reason: EvaluationReason) -> Self {
		Self {
			feature_key: feature_key.into(),
			reason,
			bucket_key: None,
			bucket_value: None,
			rule_key: None,
			error: None,
			enabled: None,
			traffic: None,
			force_index: None,
			force: None,
			sticky: None,
			initial: None,
			variation: None,
			variation_value: None,
			variable_key: None,
			variable_value: None,
			variable_schema: None,
		}
	}

	/// `true` only when the evaluation explicitly enabled the feature.
	pub fn is_enabled(&self) -> bool {
		self.enabled == Some(true)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	#[test]
	fn reason_strings() {
		assert_eq!(EvaluationReason::OutOfRange.as_str(), "out_of_range");
		assert_eq!(
			serde_json::to_value(EvaluationReason::NoVariations).unwrap(),
			json!("no_variations")
		);
		assert_eq!(EvaluationReason::Defaulted.to_string(), "defaulted");
	}

	#[test]
	fn evaluation_serializes_only_populated_fields() {
		let mut evaluation = Evaluation::new("checkout", EvaluationReason::Rule);
		evaluation.enabled = Some(true);
		evaluation.bucket_value = Some(1234);
		evaluation.rule_key = Some("everyone".to_string());

		assert_eq!(
			serde_json::to_value(&evaluation).unwrap(),
			json!({
				"featureKey": "checkout",
				"reason": "rule",
				"bucketValue": 1234,
				"ruleKey": "everyone",
				"enabled": true
			})
		);
	}

	#[test]
	fn sticky_feature_builders() {
		let sticky = StickyFeature::enabled(true)
			.with_variation("treatment")
			.with_variable("color", "blue");
		assert!(sticky.enabled);
		assert_eq!(sticky.variation.as_deref(), Some("treatment"));
		assert_eq!(sticky.variable("color"), Some(&VariableValue::from("blue")));
		assert_eq!(sticky.variable("size"), None);
	}

	#[test]
	fn sticky_features_decode_from_json() {
		let sticky: StickyFeatures = serde_json::from_value(json!({
			"checkout": {"enabled": true, "variation": "b", "variables": {"color": "red"}}
		}))
		.unwrap();
		assert_eq!(sticky["checkout"].variation.as_deref(), Some("b"));
	}
}
