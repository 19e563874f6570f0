// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Traffic rule, allocation and force resolution.
//!
//! Two range conventions coexist and are kept apart on purpose:
//! allocation ranges match inclusively (`start <= v <= end`), mutually
//! exclusive feature ranges match half-open (`start <= v < end`).

use loom_toggles_core::{Allocation, Context, Feature, Force, Range, Traffic};

use crate::index::DatafileIndex;
use crate::segments::{group_segments_match, targeting_matches};

/// Returns the first traffic rule whose segments match.
///
/// Later rules are never consulted, even if the first one ends up granting
/// nothing.
pub fn matched_traffic<'a>(traffic: &'a [Traffic], context: &Context, index: &DatafileIndex) -> Option<&'a Traffic> {
	traffic
		.iter()
		.find(|rule| group_segments_match(&rule.segments, context, index))
}

/// Returns the allocation of `traffic` whose inclusive range holds `bucket_value`.
pub fn matched_allocation(traffic: &Traffic, bucket_value: u32) -> Option<&Allocation> {
	traffic
		.allocation
		.iter()
		.find(|allocation| allocation.range.contains_inclusive(bucket_value))
}

/// Returns the matched traffic rule and, within that rule only, the matched allocation.
pub fn matched_traffic_and_allocation<'a>(
	traffic: &'a [Traffic],
	context: &Context,
	bucket_value: u32,
	index: &DatafileIndex,
) -> (Option<&'a Traffic>, Option<&'a Allocation>) {
	match matched_traffic(traffic, context, index) {
		Some(rule) => (Some(rule), matched_allocation(rule, bucket_value)),
		None => (None, None),
	}
}

/// Returns the first force entry whose predicate matches, with its position.
pub fn matched_force<'a>(feature: &'a Feature, context: &Context, index: &DatafileIndex) -> Option<(usize, &'a Force)> {
	feature
		.force
		.iter()
		.enumerate()
		.find(|(_, force)| targeting_matches(force.target.as_ref(), context, index))
}

/// Whether `bucket_value` falls in any half-open mutually exclusive range.
pub fn in_exclusive_ranges(ranges: &[Range], bucket_value: u32) -> bool {
	ranges.iter().any(|range| range.contains_half_open(bucket_value))
}
