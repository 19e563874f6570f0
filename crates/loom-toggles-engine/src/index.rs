// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::collections::HashMap;

use loom_toggles_core::{Attribute, DatafileContent, Feature, Segment};

/// Read-only keyed lookup over one datafile revision.
///
/// When a key appears more than once, the first definition wins.
#[derive(Debug, Clone)]
pub struct DatafileIndex {
	content: DatafileContent,
	attributes: HashMap<String, usize>,
	segments: HashMap<String, usize>,
	features: HashMap<String, usize>,
}

impl DatafileIndex {
	pub fn new(content: DatafileContent) -> Self {
		let attributes = positions(content.attributes.iter().map(|a| a.key.as_str()));
		let segments = positions(content.segments.iter().map(|s| s.key.as_str()));
		let features = positions(content.features.iter().map(|f| f.key.as_str()));

		Self {
			content,
			attributes,
			segments,
			features,
		}
	}

	pub fn empty() -> Self {
		Self::new(DatafileContent::empty())
	}

	pub fn revision(&self) -> &str {
		&self.content.revision
	}

	pub fn schema_version(&self) -> &str {
		&self.content.schema_version
	}

	pub fn content(&self) -> &DatafileContent {
		&self.content
	}

	pub fn attribute(&self, key: &str) -> Option<&Attribute> {
		self.attributes.get(key).map(|&i| &self.content.attributes[i])
	}

	pub fn segment(&self, key: &str) -> Option<&Segment> {
		self.segments.get(key).map(|&i| &self.content.segments[i])
	}

	pub fn feature(&self, key: &str) -> Option<&Feature> {
		self.features.get(key).map(|&i| &self.content.features[i])
	}

	pub fn feature_keys(&self) -> impl Iterator<Item = &str> {
		self.content.features.iter().map(|f| f.key.as_str())
	}

	/// Keys of attributes flagged `capture: true`.
	pub fn captured_attributes(&self) -> impl Iterator<Item = &str> {
		self.content
			.attributes
			.iter()
			.filter(|a| a.capture.unwrap_or(false))
			.map(|a| a.key.as_str())
	}
}

impl Default for DatafileIndex {
	fn default() -> Self {
		Self::empty()
	}
}

impl From<DatafileContent> for DatafileIndex {
	fn from(content: DatafileContent) -> Self {
		Self::new(content)
	}
}

fn positions<'a>(keys: impl Iterator<Item = &'a str>) -> HashMap<String, usize> {
	let mut map = HashMap::new();
	for (i, key) in keys.enumerate() {
		map.entry(key.to_string()).or_insert(i);
	}
	map
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	fn index() -> DatafileIndex {
		let content = DatafileContent::from_value(json!({
			"schemaVersion": "1",
			"revision": "3",
			"attributes": [
				{"key": "userId", "type": "string", "capture": true},
				{"key": "country", "type": "string"},
				{"key": "plan", "type": "string", "capture": true}
			],
			"segments": [
				{"key": "nl", "conditions": [{"attribute": "country", "operator": "equals", "value": "nl"}]},
				{"key": "nl", "conditions": [{"attribute": "country", "operator": "equals", "value": "be"}]}
			],
			"features": [
				{"key": "a", "bucketBy": "userId"},
				{"key": "b", "bucketBy": "userId"}
			]
		}))
		.unwrap();
		DatafileIndex::new(content)
	}

	#[test]
	fn lookups() {
		let index = index();
		assert_eq!(index.revision(), "3");
		assert!(index.feature("a").is_some());
		assert!(index.feature("missing").is_none());
		assert!(index.attribute("country").is_some());
		assert_eq!(index.feature_keys().collect::<Vec<_>>(), vec!["a", "b"]);
	}

	#[test]
	fn first_definition_wins() {
		let index = index();
		let segment = index.segment("nl").unwrap();
		let encoded = serde_json::to_value(&segment.conditions).unwrap();
		assert_eq!(encoded["and"][0]["value"], json!("nl"));
	}

	#[test]
	fn captured_attributes_are_flagged_ones() {
		let index = index();
		assert_eq!(index.captured_attributes().collect::<Vec<_>>(), vec!["userId", "plan"]);
	}

	#[test]
	fn empty_index() {
		let index = DatafileIndex::default();
		assert_eq!(index.revision(), "unknown");
		assert_eq!(index.feature_keys().count(), 0);
	}
}
