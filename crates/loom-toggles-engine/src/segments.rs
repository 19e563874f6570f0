// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use loom_toggles_core::{Context, GroupSegment, Segment, Targeting, WILDCARD};

use crate::conditions::condition_matches;
use crate::index::DatafileIndex;

pub fn segment_matches(segment: &Segment, context: &Context) -> bool {
	condition_matches(&segment.conditions, context)
}

/// Evaluates a group-segment tree, resolving named segments through `index`.
///
/// An unknown segment key never matches.
pub fn group_segments_match(group: &GroupSegment, context: &Context, index: &DatafileIndex) -> bool {
	match group {
		GroupSegment::Plain(key) if key == WILDCARD => true,
		GroupSegment::Plain(key) => index
			.segment(key)
			.is_some_and(|segment| segment_matches(segment, context)),
		GroupSegment::Multiple(children) | GroupSegment::And(children) => children
			.iter()
			.all(|child| group_segments_match(child, context, index)),
		GroupSegment::Or(children) => children
			.iter()
			.any(|child| group_segments_match(child, context, index)),
		GroupSegment::Not(children) => !children
			.iter()
			.any(|child| group_segments_match(child, context, index)),
	}
}

/// Evaluates the predicate of a force entry or variable override.
///
/// A missing predicate never matches.
pub fn targeting_matches(target: Option<&Targeting>, context: &Context, index: &DatafileIndex) -> bool {
	match target {
		Some(Targeting::Conditions(conditions)) => condition_matches(conditions, context),
		Some(Targeting::Segments(segments)) => group_segments_match(segments, context, index),
		None => false,
	}
}
