// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Condition evaluation against a context.
//!
//! Matching is type-paired: an attribute only matches a condition value of
//! the same kind. Integers never match doubles, and any mismatch or missing
//! attribute is `false`.

use std::cmp::Ordering;

use loom_toggles_core::{
	attribute_as_date, AttributeValue, Condition, ConditionValue, Context, Operator, PlainCondition,
};
use semver::Version;

/// Evaluates a condition tree.
///
/// `And([])` is `true`, `Or([])` is `false`, and `Not` holds when none of its
/// children match.
pub fn condition_matches(condition: &Condition, context: &Context) -> bool {
	match condition {
		Condition::Plain(plain) => plain_matches(plain, context),
		Condition::And(children) => children.iter().all(|c| condition_matches(c, context)),
		Condition::Or(children) => children.iter().any(|c| condition_matches(c, context)),
		Condition::Not(children) => !children.iter().any(|c| condition_matches(c, context)),
	}
}

/// Evaluates a single `attribute operator value` leaf.
pub fn plain_matches(condition: &PlainCondition, context: &Context) -> bool {
	let Ok(expected) = &condition.value else {
		return false;
	};
	let Some(actual) = context.get(&condition.attribute) else {
		return false;
	};

	match condition.operator {
		Operator::SemverEquals
		| Operator::SemverNotEquals
		| Operator::SemverGreaterThan
		| Operator::SemverGreaterThanOrEquals
		| Operator::SemverLessThan
		| Operator::SemverLessThanOrEquals => semver_matches(condition.operator, actual, expected),
		Operator::Before | Operator::After => date_matches(condition.operator, actual, expected),
		Operator::In | Operator::NotIn => membership_matches(condition.operator, actual, expected),
		operator => scalar_matches(operator, actual, expected),
	}
}

fn scalar_matches(operator: Operator, actual: &AttributeValue, expected: &ConditionValue) -> bool {
	match (actual, expected) {
		(AttributeValue::String(a), ConditionValue::String(b)) => string_matches(operator, a, b),
		(AttributeValue::Integer(a), ConditionValue::Integer(b)) => ordering_matches(operator, Some(a.cmp(b))),
		(AttributeValue::Double(a), ConditionValue::Double(b)) => ordering_matches(operator, a.partial_cmp(b)),
		(AttributeValue::Boolean(a), ConditionValue::Boolean(b)) => match operator {
			Operator::Equals => a == b,
			Operator::NotEquals => a != b,
			_ => false,
		},
		(AttributeValue::Null, ConditionValue::Null) => operator == Operator::Equals,
		_ => false,
	}
}

fn string_matches(operator: Operator, actual: &str, expected: &str) -> bool {
	match operator {
		Operator::Equals => actual == expected,
		Operator::NotEquals => actual != expected,
		Operator::Contains => actual.contains(expected),
		Operator::NotContains => !actual.contains(expected),
		Operator::StartsWith => actual.starts_with(expected),
		Operator::EndsWith => actual.ends_with(expected),
		_ => false,
	}
}

fn ordering_matches(operator: Operator, ordering: Option<Ordering>) -> bool {
	let Some(ordering) = ordering else {
		return false;
	};
	match operator {
		Operator::Equals | Operator::SemverEquals => ordering == Ordering::Equal,
		Operator::NotEquals | Operator::SemverNotEquals => ordering != Ordering::Equal,
		Operator::GreaterThan | Operator::SemverGreaterThan | Operator::After => ordering == Ordering::Greater,
		Operator::GreaterThanOrEquals | Operator::SemverGreaterThanOrEquals => ordering != Ordering::Less,
		Operator::LessThan | Operator::SemverLessThan | Operator::Before => ordering == Ordering::Less,
		Operator::LessThanOrEquals | Operator::SemverLessThanOrEquals => ordering != Ordering::Greater,
		_ => false,
	}
}

fn semver_matches(operator: Operator, actual: &AttributeValue, expected: &ConditionValue) -> bool {
	let (AttributeValue::String(a), ConditionValue::String(b)) = (actual, expected) else {
		return false;
	};
	match (parse_semver(a), parse_semver(b)) {
		(Some(a), Some(b)) => ordering_matches(operator, Some(a.cmp_precedence(&b))),
		_ => false,
	}
}

/// Parses a version, tolerating a leading `v` and a missing minor or patch.
pub(crate) fn parse_semver(raw: &str) -> Option<Version> {
	let raw = raw.trim();
	let raw = raw.strip_prefix(['v', 'V']).unwrap_or(raw);

	let split = raw.find(['-', '+']).unwrap_or(raw.len());
	let (core, suffix) = raw.split_at(split);
	let padded = match core.matches('.').count() {
		0 => format!("{core}.0.0{suffix}"),
		1 => format!("{core}.0{suffix}"),
		_ => raw.to_string(),
	};
	Version::parse(&padded).ok()
}

fn date_matches(operator: Operator, actual: &AttributeValue, expected: &ConditionValue) -> bool {
	let ConditionValue::Date(expected) = expected else {
		return false;
	};
	let Some(actual) = attribute_as_date(actual) else {
		return false;
	};
	ordering_matches(operator, Some(actual.cmp(expected)))
}

fn membership_matches(operator: Operator, actual: &AttributeValue, expected: &ConditionValue) -> bool {
	let ConditionValue::Array(items) = expected else {
		return false;
	};
	if matches!(actual, AttributeValue::Null | AttributeValue::Date(_)) {
		return false;
	}
	let found = items.iter().any(|item| scalar_matches(Operator::Equals, actual, item));
	match operator {
		Operator::In => found,
		Operator::NotIn => !found,
		_ => false,
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn leaf(attribute: &str, operator: Operator, value: ConditionValue) -> Condition {
		Condition::plain(attribute, operator, value)
	}

	fn s(value: &str) -> ConditionValue {
		ConditionValue::String(value.to_string())
	}

	#[test]
	fn string_operators() {
		let context = Context::new().with_attribute("browser", "chrome");

		assert!(condition_matches(&leaf("browser", Operator::Equals, s("chrome")), &context));
		assert!(!condition_matches(&leaf("browser", Operator::NotEquals, s("chrome")), &context));
		assert!(condition_matches(&leaf("browser", Operator::Contains, s("chrome")), &context));
		assert!(condition_matches(&leaf("browser", Operator::NotContains, s("firefox")), &context));
		assert!(condition_matches(&leaf("browser", Operator::StartsWith, s("chr")), &context));
		assert!(condition_matches(&leaf("browser", Operator::EndsWith, s("ome")), &context));
		assert!(!condition_matches(&leaf("browser", Operator::GreaterThan, s("a")), &context));
	}

	#[test]
	fn numeric_operators_do_not_coerce() {
		let context = Context::new().with_attribute("age", 21).with_attribute("score", 0.75);

		assert!(condition_matches(&leaf("age", Operator::GreaterThan, ConditionValue::Integer(18)), &context));
		assert!(condition_matches(
			&leaf("age", Operator::LessThanOrEquals, ConditionValue::Integer(21)),
			&context
		));
		assert!(!condition_matches(&leaf("age", Operator::Equals, ConditionValue::Double(21.0)), &context));
		assert!(condition_matches(
			&leaf("score", Operator::GreaterThanOrEquals, ConditionValue::Double(0.5)),
			&context
		));
		assert!(!condition_matches(&leaf("score", Operator::Equals, ConditionValue::Integer(1)), &context));
	}

	#[test]
	fn boolean_supports_only_equality() {
		let context = Context::new().with_attribute("beta", true);
		assert!(condition_matches(&leaf("beta", Operator::Equals, ConditionValue::Boolean(true)), &context));
		assert!(condition_matches(
			&leaf("beta", Operator::NotEquals, ConditionValue::Boolean(false)),
			&context
		));
		assert!(!condition_matches(
			&leaf("beta", Operator::GreaterThan, ConditionValue::Boolean(false)),
			&context
		));
	}

	#[test]
	fn missing_attribute_and_type_mismatch_are_false() {
		let context = Context::new().with_attribute("country", "nl");
		assert!(!condition_matches(&leaf("absent", Operator::NotEquals, s("x")), &context));
		assert!(!condition_matches(&leaf("country", Operator::NotEquals, ConditionValue::Integer(1)), &context));
	}

	#[test]
	fn unsupported_operand_never_matches() {
		let condition: Condition = serde_json::from_value(serde_json::json!({
			"attribute": "country",
			"operator": "notEquals",
			"value": {"nested": true}
		}))
		.unwrap();
		let context = Context::new().with_attribute("country", "nl");
		assert!(!condition_matches(&condition, &context));
	}

	#[test]
	fn semver_operators() {
		let context = Context::new().with_attribute("version", "1.2.3");

		assert!(condition_matches(&leaf("version", Operator::SemverEquals, s("v1.2.3")), &context));
		assert!(condition_matches(&leaf("version", Operator::SemverGreaterThan, s("1.2")), &context));
		assert!(condition_matches(&leaf("version", Operator::SemverLessThan, s("2")), &context));
		assert!(condition_matches(
			&leaf("version", Operator::SemverGreaterThanOrEquals, s("1.2.3")),
			&context
		));
		assert!(condition_matches(&leaf("version", Operator::SemverNotEquals, s("1.2.4")), &context));
		assert!(!condition_matches(&leaf("version", Operator::SemverEquals, s("garbage")), &context));
	}

	#[test]
	fn semver_prerelease_sorts_before_release() {
		let context = Context::new().with_attribute("version", "2.0.0-beta.1");
		assert!(condition_matches(&leaf("version", Operator::SemverLessThan, s("2.0.0")), &context));
	}

	#[test]
	fn parse_semver_pads_components() {
		assert_eq!(parse_semver("3"), Some(Version::new(3, 0, 0)));
		assert_eq!(parse_semver("v3.1"), Some(Version::new(3, 1, 0)));
		assert!(parse_semver("1.0-rc.1").is_some());
		assert!(parse_semver("one").is_none());
	}

	#[test]
	fn date_operators() {
		let cutoff = ConditionValue::date_from_json(&serde_json::json!("2024-01-01T00:00:00Z")).unwrap();
		let before = Context::new().with_attribute("signedUpAt", "2023-06-01T00:00:00Z");
		let after = Context::new().with_attribute(
			"signedUpAt",
			chrono::DateTime::parse_from_rfc3339("2024-06-01T00:00:00Z")
				.unwrap()
				.with_timezone(&chrono::Utc),
		);

		assert!(condition_matches(&leaf("signedUpAt", Operator::Before, cutoff.clone()), &before));
		assert!(!condition_matches(&leaf("signedUpAt", Operator::After, cutoff.clone()), &before));
		assert!(condition_matches(&leaf("signedUpAt", Operator::After, cutoff), &after));
	}

	#[test]
	fn membership_operators() {
		let plans = ConditionValue::Array(vec![s("pro"), s("team")]);
		let pro = Context::new().with_attribute("plan", "pro");
		let free = Context::new().with_attribute("plan", "free");

		assert!(condition_matches(&leaf("plan", Operator::In, plans.clone()), &pro));
		assert!(!condition_matches(&leaf("plan", Operator::In, plans.clone()), &free));
		assert!(condition_matches(&leaf("plan", Operator::NotIn, plans.clone()), &free));
		assert!(!condition_matches(&leaf("plan", Operator::NotIn, plans), &pro));

		let ids = ConditionValue::Array(vec![ConditionValue::Integer(1), ConditionValue::Integer(2)]);
		let context = Context::new().with_attribute("id", 2);
		assert!(condition_matches(&leaf("id", Operator::In, ids), &context));
	}

	#[test]
	fn tree_identities() {
		let context = Context::new().with_attribute("country", "nl");
		let yes = leaf("country", Operator::Equals, s("nl"));
		let no = leaf("country", Operator::Equals, s("de"));

		assert!(condition_matches(&Condition::And(vec![]), &context));
		assert!(!condition_matches(&Condition::Or(vec![]), &context));
		assert!(condition_matches(&Condition::Or(vec![no.clone(), yes.clone()]), &context));
		assert!(!condition_matches(&Condition::And(vec![no.clone(), yes.clone()]), &context));
		assert!(!condition_matches(&Condition::Not(vec![yes.clone()]), &context));
		assert!(condition_matches(&Condition::Not(vec![no.clone()]), &context));
		assert!(!condition_matches(&Condition::Not(vec![no, yes]), &context));
		assert!(condition_matches(&Condition::everyone(), &Context::new()));
	}

	mod proptest_tests {
		use super::*;
		use proptest::prelude::*;

		proptest! {
			#[test]
			fn equals_and_not_equals_are_complements(a: i64, b: i64) {
				let context = Context::new().with_attribute("n", a);
				let eq = condition_matches(&leaf("n", Operator::Equals, ConditionValue::Integer(b)), &context);
				let ne = condition_matches(&leaf("n", Operator::NotEquals, ConditionValue::Integer(b)), &context);
				prop_assert_eq!(eq, !ne);
				prop_assert_eq!(eq, a == b);
			}

			#[test]
			fn string_equality_complements(a in "[a-z]{0,8}", b in "[a-z]{0,8}") {
				let context = Context::new().with_attribute("s", a.as_str());
				let eq = condition_matches(&leaf("s", Operator::Equals, s(&b)), &context);
				let ne = condition_matches(&leaf("s", Operator::NotEquals, s(&b)), &context);
				prop_assert_eq!(eq, !ne);
			}

			#[test]
			fn not_is_complement(a in "[a-z]{1,4}", b in "[a-z]{1,4}") {
				let context = Context::new().with_attribute("s", a.as_str());
				let x = leaf("s", Operator::Equals, s(&b));
				let matched = condition_matches(&x, &context);
				prop_assert_eq!(condition_matches(&Condition::Not(vec![x]), &context), !matched);
			}

			#[test]
			fn mismatched_types_never_match(a: i64, b in "[a-z]{0,8}") {
				let context = Context::new().with_attribute("n", a);
				prop_assert!(!condition_matches(&leaf("n", Operator::Equals, s(&b)), &context));
				prop_assert!(!condition_matches(&leaf("n", Operator::NotEquals, s(&b)), &context));
			}
		}
	}
}
