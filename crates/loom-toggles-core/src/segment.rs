// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Named segments and the group-segment trees that reference them.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::condition::Condition;
use crate::error::{json_kind, UnsupportedValueShape};
use crate::value::parse_stringified_json;

/// Segment reference that matches every context without a lookup.
pub const WILDCARD: &str = "*";

/// A named, reusable targeting predicate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Segment {
	pub key: String,
	pub conditions: Condition,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub archived: Option<bool>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub description: Option<String>,
}

/// Segment references combined with boolean logic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "Value")]
pub enum GroupSegment {
	/// A single segment key, or [`WILDCARD`].
	Plain(String),
	/// A bare list: every element must match.
	Multiple(Vec<GroupSegment>),
	And(Vec<GroupSegment>),
	Or(Vec<GroupSegment>),
	Not(Vec<GroupSegment>),
}

impl GroupSegment {
	pub fn everyone() -> Self {
		GroupSegment::Plain(WILDCARD.to_string())
	}

	pub fn key(key: impl Into<String>) -> Self {
		GroupSegment::Plain(key.into())
	}
}

impl TryFrom<Value> for GroupSegment {
	type Error = UnsupportedValueShape;

	fn try_from(value: Value) -> Result<Self, Self::Error> {
		match value {
			Value::String(s) => match parse_stringified_json(&s) {
				Some(parsed) => GroupSegment::try_from(parsed),
				None => Ok(GroupSegment::Plain(s)),
			},
			Value::Array(items) => decode_children(items).map(GroupSegment::Multiple),
			Value::Object(mut map) => {
				if let Some(items) = map.remove("and") {
					decode_list(items).map(GroupSegment::And)
				} else if let Some(items) = map.remove("or") {
					decode_list(items).map(GroupSegment::Or)
				} else if let Some(items) = map.remove("not") {
					decode_list(items).map(GroupSegment::Not)
				} else {
					Err(UnsupportedValueShape::new("segment group without and/or/not", Value::Object(map)))
				}
			}
			other => Err(UnsupportedValueShape::new(
				format!("{} where segments were expected", json_kind(&other)),
				other,
			)),
		}
	}
}

fn decode_children(items: Vec<Value>) -> Result<Vec<GroupSegment>, UnsupportedValueShape> {
	items.into_iter().map(GroupSegment::try_from).collect()
}

fn decode_list(value: Value) -> Result<Vec<GroupSegment>, UnsupportedValueShape> {
	match value {
		Value::Array(items) => decode_children(items),
		other => Err(UnsupportedValueShape::new("non-array segment group", other)),
	}
}

impl From<GroupSegment> for Value {
	fn from(group: GroupSegment) -> Self {
		let list = |children: Vec<GroupSegment>| Value::Array(children.into_iter().map(Value::from).collect());
		let named = |name: &str, children: Vec<GroupSegment>| {
			let mut map = Map::new();
			map.insert(name.to_string(), list(children));
			Value::Object(map)
		};

		match group {
			GroupSegment::Plain(key) => Value::String(key),
			GroupSegment::Multiple(children) => list(children),
			GroupSegment::And(children) => named("and", children),
			GroupSegment::Or(children) => named("or", children),
			GroupSegment::Not(children) => named("not", children),
		}
	}
}
