// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The evaluation precedence chain.
//!
//! Flag order: sticky, initial, not found, forced, required, then the first
//! segment-matching traffic rule (mutually exclusive ranges, explicit
//! `enabled`, percentage). Variations and variables short-circuit to
//! `Disabled` when the flag is disabled, then follow the same sticky, initial
//! and forced steps before resolving through the matched traffic rule and its
//! allocation.

use loom_toggles_core::{
	Context, Evaluation, EvaluationReason, Feature, StickyFeature, StickyFeatures, Traffic, Variation,
};
use serde_json::json;

use crate::bucket::{Bucket, Bucketer};
use crate::index::DatafileIndex;
use crate::logger::Logger;
use crate::segments::targeting_matches;
use crate::traffic::{in_exclusive_ranges, matched_force, matched_traffic, matched_traffic_and_allocation};

/// Evaluates features against one datafile snapshot.
///
/// Borrowed view over the host's state; cheap to build per call.
#[derive(Debug, Clone, Copy)]
pub struct Evaluator<'a> {
	index: &'a DatafileIndex,
	bucketer: &'a Bucketer,
	logger: &'a Logger,
	sticky: Option<&'a StickyFeatures>,
	initial: Option<&'a StickyFeatures>,
}

/// Features whose flag evaluation is in progress, for cycle detection.
#[derive(Debug, Default)]
struct Trail {
	keys: Vec<String>,
	cycle: Option<String>,
}

impl Trail {
	fn contains(&self, key: &str) -> bool {
		self.keys.iter().any(|k| k == key)
	}

	fn describe(&self, key: &str) -> String {
		let mut path = self.keys.clone();
		path.push(key.to_string());
		path.join(" -> ")
	}
}

impl<'a> Evaluator<'a> {
	pub fn new(index: &'a DatafileIndex, bucketer: &'a Bucketer, logger: &'a Logger) -> Self {
		Self {
			index,
			bucketer,
			logger,
			sticky: None,
			initial: None,
		}
	}

	pub fn with_sticky(mut self, sticky: &'a StickyFeatures) -> Self {
		self.sticky = Some(sticky);
		self
	}

	/// Initial overrides; only pass them while the host is not ready.
	pub fn with_initial(mut self, initial: &'a StickyFeatures) -> Self {
		self.initial = Some(initial);
		self
	}

	pub fn evaluate_flag(&self, feature_key: &str, context: &Context) -> Evaluation {
		self.flag(feature_key, context, &mut Trail::default())
	}

	pub fn evaluate_variation(&self, feature_key: &str, context: &Context) -> Evaluation {
		self.variation(feature_key, context, &mut Trail::default())
	}

	pub fn evaluate_variable(&self, feature_key: &str, variable_key: &str, context: &Context) -> Evaluation {
		self.variable(feature_key, variable_key, context, &mut Trail::default())
	}

	fn sticky_for(&self, key: &str) -> Option<&'a StickyFeature> {
		self.sticky.and_then(|sticky| sticky.get(key))
	}

	fn initial_for(&self, key: &str) -> Option<&'a StickyFeature> {
		self.initial.and_then(|initial| initial.get(key))
	}

	fn flag(&self, key: &str, context: &Context, trail: &mut Trail) -> Evaluation {
		if trail.contains(key) {
			let path = trail.describe(key);
			self.logger.error("required features form a cycle", || {
				json!({"featureKey": key, "cycle": path})
			});
			trail.cycle = Some(path);
			return self.cycle_error(key, trail);
		}

		if let Some(sticky) = self.sticky_for(key) {
			let mut evaluation = Evaluation::new(key, EvaluationReason::Sticky);
			evaluation.enabled = Some(sticky.enabled);
			evaluation.sticky = Some(sticky.clone());
			return self.resolved(evaluation);
		}

		if let Some(initial) = self.initial_for(key) {
			let mut evaluation = Evaluation::new(key, EvaluationReason::Initial);
			evaluation.enabled = Some(initial.enabled);
			evaluation.initial = Some(initial.clone());
			return self.resolved(evaluation);
		}

		let Some(feature) = self.index.feature(key) else {
			self.logger.warn("feature not found", || json!({"featureKey": key}));
			return self.resolved(Evaluation::new(key, EvaluationReason::NotFound));
		};

		if feature.is_deprecated() {
			self.logger.warn("feature is deprecated", || json!({"featureKey": key}));
		}

		if let Some((position, force)) = matched_force(feature, context, self.index) {
			if let Some(enabled) = force.enabled {
				let mut evaluation = Evaluation::new(key, EvaluationReason::Forced);
				evaluation.enabled = Some(enabled);
				evaluation.force_index = Some(position);
				evaluation.force = Some(force.clone());
				return self.resolved(evaluation);
			}
		}

		if !feature.required.is_empty() {
			trail.keys.push(key.to_string());
			let unmet = self.unmet_requirement(feature, context, trail);
			trail.keys.pop();

			if trail.cycle.is_some() {
				return self.cycle_error(key, trail);
			}
			if let Some(required_key) = unmet {
				let mut evaluation = Evaluation::new(key, EvaluationReason::Required);
				evaluation.enabled = Some(false);
				self.logger.debug("required feature not satisfied", || {
					json!({"featureKey": key, "requiredKey": required_key})
				});
				return self.resolved(evaluation);
			}
		}

		let bucket = self.bucketer.bucket(feature, context);
		let Some(traffic) = matched_traffic(&feature.traffic, context, self.index) else {
			let mut evaluation = bucketed(key, EvaluationReason::Error, &bucket, None);
			evaluation.enabled = Some(false);
			return self.resolved(evaluation);
		};

		if let Some(ranges) = &feature.ranges {
			let (reason, enabled) = if in_exclusive_ranges(ranges, bucket.value) {
				(EvaluationReason::Allocated, traffic.enabled.unwrap_or(true))
			} else {
				(EvaluationReason::OutOfRange, false)
			};
			let mut evaluation = bucketed(key, reason, &bucket, Some(traffic));
			evaluation.enabled = Some(enabled);
			return self.resolved(evaluation);
		}

		if let Some(enabled) = traffic.enabled {
			let mut evaluation = bucketed(key, EvaluationReason::Override, &bucket, Some(traffic));
			evaluation.enabled = Some(enabled);
			return self.resolved(evaluation);
		}

		if bucket.value < traffic.percentage {
			let mut evaluation = bucketed(key, EvaluationReason::Rule, &bucket, Some(traffic));
			evaluation.enabled = Some(true);
			return self.resolved(evaluation);
		}

		let mut evaluation = bucketed(key, EvaluationReason::Error, &bucket, Some(traffic));
		evaluation.enabled = Some(false);
		self.resolved(evaluation)
	}

	/// Returns the key of the first requirement that is not satisfied.
	fn unmet_requirement(&self, feature: &Feature, context: &Context, trail: &mut Trail) -> Option<String> {
		for required in &feature.required {
			let dependency = self.flag(required.key(), context, trail);
			if trail.cycle.is_some() {
				return None;
			}
			if !dependency.is_enabled() {
				return Some(required.key().to_string());
			}

			if let Some(expected) = required.variation() {
				let variation = self.variation(required.key(), context, trail);
				if trail.cycle.is_some() {
					return None;
				}
				if variation.variation_value.as_deref() != Some(expected) {
					return Some(required.key().to_string());
				}
			}
		}
		None
	}

	fn variation(&self, key: &str, context: &Context, trail: &mut Trail) -> Evaluation {
		let flag = self.flag(key, context, trail);
		if trail.cycle.is_some() {
			return self.cycle_error(key, trail);
		}
		if flag.enabled == Some(false) {
			return self.resolved(Evaluation::new(key, EvaluationReason::Disabled));
		}

		if let Some(sticky) = self.sticky_for(key) {
			if let Some(value) = &sticky.variation {
				let mut evaluation = Evaluation::new(key, EvaluationReason::Sticky);
				evaluation.variation_value = Some(value.clone());
				evaluation.sticky = Some(sticky.clone());
				return self.resolved(evaluation);
			}
		}

		if let Some(initial) = self.initial_for(key) {
			if let Some(value) = &initial.variation {
				let mut evaluation = Evaluation::new(key, EvaluationReason::Initial);
				evaluation.variation_value = Some(value.clone());
				evaluation.initial = Some(initial.clone());
				return self.resolved(evaluation);
			}
		}

		let Some(feature) = self.index.feature(key) else {
			return self.resolved(Evaluation::new(key, EvaluationReason::NotFound));
		};

		if feature.variations.is_empty() {
			return self.resolved(Evaluation::new(key, EvaluationReason::NoVariations));
		}

		if let Some((position, force)) = matched_force(feature, context, self.index) {
			if let Some(variation) = force.variation.as_deref().and_then(|v| feature.variation(v)) {
				let mut evaluation = with_variation(Evaluation::new(key, EvaluationReason::Forced), variation);
				evaluation.force_index = Some(position);
				evaluation.force = Some(force.clone());
				return self.resolved(evaluation);
			}
		}

		let bucket = self.bucketer.bucket(feature, context);
		let (traffic, allocation) =
			matched_traffic_and_allocation(&feature.traffic, context, bucket.value, self.index);

		if let Some(traffic) = traffic {
			if let Some(variation) = traffic.variation.as_deref().and_then(|v| feature.variation(v)) {
				let evaluation = bucketed(key, EvaluationReason::Rule, &bucket, Some(traffic));
				return self.resolved(with_variation(evaluation, variation));
			}

			if let Some(variation) = allocation.and_then(|a| feature.variation(&a.variation)) {
				let evaluation = bucketed(key, EvaluationReason::Allocated, &bucket, Some(traffic));
				return self.resolved(with_variation(evaluation, variation));
			}
		}

		self.resolved(bucketed(key, EvaluationReason::Error, &bucket, traffic))
	}

	fn variable(&self, key: &str, variable_key: &str, context: &Context, trail: &mut Trail) -> Evaluation {
		let flag = self.flag(key, context, trail);
		if trail.cycle.is_some() {
			let mut evaluation = self.cycle_error(key, trail);
			evaluation.variable_key = Some(variable_key.to_string());
			return evaluation;
		}
		if flag.enabled == Some(false) {
			let mut evaluation = Evaluation::new(key, EvaluationReason::Disabled);
			evaluation.variable_key = Some(variable_key.to_string());
			return self.resolved(evaluation);
		}

		if let Some(sticky) = self.sticky_for(key) {
			if let Some(value) = sticky.variable(variable_key) {
				let mut evaluation = Evaluation::new(key, EvaluationReason::Sticky);
				evaluation.variable_key = Some(variable_key.to_string());
				evaluation.variable_value = Some(value.clone());
				evaluation.sticky = Some(sticky.clone());
				return self.resolved(evaluation);
			}
		}

		if let Some(initial) = self.initial_for(key) {
			if let Some(value) = initial.variable(variable_key) {
				let mut evaluation = Evaluation::new(key, EvaluationReason::Initial);
				evaluation.variable_key = Some(variable_key.to_string());
				evaluation.variable_value = Some(value.clone());
				evaluation.initial = Some(initial.clone());
				return self.resolved(evaluation);
			}
		}

		let not_found = || {
			let mut evaluation = Evaluation::new(key, EvaluationReason::NotFound);
			evaluation.variable_key = Some(variable_key.to_string());
			self.resolved(evaluation)
		};
		let Some(feature) = self.index.feature(key) else {
			return not_found();
		};
		let Some(schema) = feature.variable_schema(variable_key) else {
			self.logger.warn("variable schema not found", || {
				json!({"featureKey": key, "variableKey": variable_key})
			});
			return not_found();
		};

		let with_variable = |mut evaluation: Evaluation, value| {
			evaluation.variable_key = Some(variable_key.to_string());
			evaluation.variable_value = Some(value);
			evaluation.variable_schema = Some(schema.clone());
			evaluation
		};

		let force = matched_force(feature, context, self.index);
		if let Some((position, force)) = force {
			if let Some(value) = force.variables.as_ref().and_then(|vars| vars.get(variable_key)) {
				let mut evaluation = with_variable(Evaluation::new(key, EvaluationReason::Forced), value.clone());
				evaluation.force_index = Some(position);
				evaluation.force = Some(force.clone());
				return self.resolved(evaluation);
			}
		}

		let bucket = self.bucketer.bucket(feature, context);
		let (traffic, allocation) =
			matched_traffic_and_allocation(&feature.traffic, context, bucket.value, self.index);

		if let Some(traffic) = traffic {
			if let Some(value) = traffic.variables.as_ref().and_then(|vars| vars.get(variable_key)) {
				let evaluation = bucketed(key, EvaluationReason::Rule, &bucket, Some(traffic));
				return self.resolved(with_variable(evaluation, value.clone()));
			}
		}

		let variation_value = force
			.and_then(|(_, force)| force.variation.as_deref())
			.or_else(|| traffic.and_then(|t| t.variation.as_deref()))
			.or_else(|| allocation.map(|a| a.variation.as_str()));
		let variable = variation_value
			.and_then(|value| feature.variation(value))
			.and_then(|variation| variation.variable(variable_key));

		if let Some(variable) = variable {
			if let Some(matched) = variable
				.overrides
				.iter()
				.find(|o| targeting_matches(o.target.as_ref(), context, self.index))
			{
				let evaluation = bucketed(key, EvaluationReason::Override, &bucket, traffic);
				return self.resolved(with_variable(evaluation, matched.value.clone()));
			}

			if let Some(value) = &variable.value {
				let evaluation = bucketed(key, EvaluationReason::Allocated, &bucket, traffic);
				return self.resolved(with_variable(evaluation, value.clone()));
			}
		}

		let evaluation = bucketed(key, EvaluationReason::Defaulted, &bucket, traffic);
		self.resolved(with_variable(evaluation, schema.default_value.clone()))
	}

	fn cycle_error(&self, key: &str, trail: &Trail) -> Evaluation {
		let mut evaluation = Evaluation::new(key, EvaluationReason::Error);
		evaluation.enabled = Some(false);
		evaluation.error = Some(format!(
			"required features form a cycle: {}",
			trail.cycle.as_deref().unwrap_or(key)
		));
		evaluation
	}

	fn resolved(&self, evaluation: Evaluation) -> Evaluation {
		self.logger.debug("feature evaluated", || {
			json!({
				"featureKey": evaluation.feature_key,
				"reason": evaluation.reason.as_str(),
				"bucketValue": evaluation.bucket_value,
				"ruleKey": evaluation.rule_key,
				"variableKey": evaluation.variable_key,
			})
		});
		evaluation
	}
}

fn bucketed(key: &str, reason: EvaluationReason, bucket: &Bucket, traffic: Option<&Traffic>) -> Evaluation {
	let mut evaluation = Evaluation::new(key, reason);
	evaluation.bucket_key = Some(bucket.key.clone());
	evaluation.bucket_value = Some(bucket.value);
	if let Some(traffic) = traffic {
		evaluation.rule_key = Some(traffic.key.clone());
		evaluation.traffic = Some(traffic.clone());
	}
	evaluation
}

fn with_variation(mut evaluation: Evaluation, variation: &Variation) -> Evaluation {
	evaluation.variation_value = Some(variation.value.clone());
	evaluation.variation = Some(variation.clone());
	evaluation
}
