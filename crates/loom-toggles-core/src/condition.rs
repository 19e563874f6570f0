// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Boolean condition trees over context attributes.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use crate::error::{json_kind, UnsupportedValueShape};
use crate::value::{parse_stringified_json, ConditionValue};

/// Comparison applied by a condition leaf.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Operator {
	Equals,
	NotEquals,
	GreaterThan,
	#[serde(alias = "greaterThanOrEqual")]
	GreaterThanOrEquals,
	LessThan,
	#[serde(alias = "lessThanOrEqual")]
	LessThanOrEquals,
	Contains,
	NotContains,
	StartsWith,
	EndsWith,
	SemverEquals,
	SemverNotEquals,
	SemverGreaterThan,
	SemverGreaterThanOrEquals,
	SemverLessThan,
	SemverLessThanOrEquals,
	Before,
	After,
	In,
	NotIn,
}

impl Operator {
	pub fn as_str(&self) -> &'static str {
		match self {
			Operator::Equals => "equals",
			Operator::NotEquals => "notEquals",
			Operator::GreaterThan => "greaterThan",
			Operator::GreaterThanOrEquals => "greaterThanOrEquals",
			Operator::LessThan => "lessThan",
			Operator::LessThanOrEquals => "lessThanOrEquals",
			Operator::Contains => "contains",
			Operator::NotContains => "notContains",
			Operator::StartsWith => "startsWith",
			Operator::EndsWith => "endsWith",
			Operator::SemverEquals => "semverEquals",
			Operator::SemverNotEquals => "semverNotEquals",
			Operator::SemverGreaterThan => "semverGreaterThan",
			Operator::SemverGreaterThanOrEquals => "semverGreaterThanOrEquals",
			Operator::SemverLessThan => "semverLessThan",
			Operator::SemverLessThanOrEquals => "semverLessThanOrEquals",
			Operator::Before => "before",
			Operator::After => "after",
			Operator::In => "in",
			Operator::NotIn => "notIn",
		}
	}

	/// Operators whose operand is decoded as a date.
	pub fn is_date(&self) -> bool {
		matches!(self, Operator::Before | Operator::After)
	}
}

impl std::fmt::Display for Operator {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(self.as_str())
	}
}

/// A single `attribute operator value` predicate.
///
/// `value` holds the outcome of decoding the operand. A leaf whose operand
/// had an unsupported shape never matches.
#[derive(Debug, Clone, PartialEq)]
pub struct PlainCondition {
	pub attribute: String,
	pub operator: Operator,
	pub value: Result<ConditionValue, UnsupportedValueShape>,
}

impl PlainCondition {
	pub fn new(attribute: impl Into<String>, operator: Operator, value: ConditionValue) -> Self {
		Self {
			attribute: attribute.into(),
			operator,
			value: Ok(value),
		}
	}
}

/// A recursive boolean condition tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "Value")]
pub enum Condition {
	Plain(PlainCondition),
	And(Vec<Condition>),
	Or(Vec<Condition>),
	Not(Vec<Condition>),
}

impl Condition {
	/// A condition that matches every context (`"*"` in datafiles).
	pub fn everyone() -> Self {
		Condition::And(Vec::new())
	}

	pub fn plain(attribute: impl Into<String>, operator: Operator, value: ConditionValue) -> Self {
		Condition::Plain(PlainCondition::new(attribute, operator, value))
	}
}

impl TryFrom<Value> for Condition {
	type Error = UnsupportedValueShape;

	fn try_from(value: Value) -> Result<Self, Self::Error> {
		match value {
			Value::String(s) if s == "*" => Ok(Condition::everyone()),
			Value::String(s) => match parse_stringified_json(&s) {
				Some(parsed) => Condition::try_from(parsed),
				None => Err(UnsupportedValueShape::new("condition string", Value::String(s))),
			},
			Value::Array(items) => decode_children(items).map(Condition::And),
			Value::Object(map) => decode_object(map),
			other => Err(UnsupportedValueShape::new(
				format!("{} where a condition was expected", json_kind(&other)),
				other,
			)),
		}
	}
}

fn decode_children(items: Vec<Value>) -> Result<Vec<Condition>, UnsupportedValueShape> {
	items.into_iter().map(Condition::try_from).collect()
}

fn decode_list(value: Value) -> Result<Vec<Condition>, UnsupportedValueShape> {
	match value {
		Value::Array(items) => decode_children(items),
		other => Err(UnsupportedValueShape::new("non-array condition group", other)),
	}
}

fn decode_object(mut map: Map<String, Value>) -> Result<Condition, UnsupportedValueShape> {
	if let Some(items) = map.remove("and") {
		return decode_list(items).map(Condition::And);
	}
	if let Some(items) = map.remove("or") {
		return decode_list(items).map(Condition::Or);
	}
	if let Some(items) = map.remove("not") {
		return decode_list(items).map(Condition::Not);
	}

	let attribute = map.get("attribute").and_then(Value::as_str).map(str::to_string);
	let Some(attribute) = attribute else {
		return Err(UnsupportedValueShape::new("condition without attribute", Value::Object(map)));
	};
	let operator = map
		.get("operator")
		.cloned()
		.and_then(|op| serde_json::from_value::<Operator>(op).ok());
	let Some(operator) = operator else {
		return Err(UnsupportedValueShape::new(
			"condition with unknown operator",
			Value::Object(map),
		));
	};

	let raw = map.remove("value").unwrap_or(Value::Null);
	let value = if operator.is_date() {
		ConditionValue::date_from_json(&raw)
	} else {
		ConditionValue::from_json(&raw)
	};
	if let Err(e) = &value {
		warn!(
			attribute = %attribute,
			operator = %operator,
			error = %e,
			"condition operand cannot be decoded; the condition will never match"
		);
	}

	Ok(Condition::Plain(PlainCondition {
		attribute,
		operator,
		value,
	}))
}

impl From<Condition> for Value {
	fn from(condition: Condition) -> Self {
		let group = |name: &str, children: Vec<Condition>| {
			let mut map = Map::new();
			map.insert(name.to_string(), Value::Array(children.into_iter().map(Value::from).collect()));
			Value::Object(map)
		};

		match condition {
			Condition::Plain(plain) => {
				let mut map = Map::new();
				map.insert("attribute".to_string(), Value::String(plain.attribute));
				map.insert("operator".to_string(), Value::String(plain.operator.as_str().to_string()));
				let value = match plain.value {
					Ok(value) => value.to_json(),
					Err(e) => e.raw,
				};
				map.insert("value".to_string(), value);
				Value::Object(map)
			}
			Condition::And(children) => group("and", children),
			Condition::Or(children) => group("or", children),
			Condition::Not(children) => group("not", children),
		}
	}
}
