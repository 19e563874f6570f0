// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Core types for the Loom toggles evaluation engine.
//!
//! This crate holds the datafile model shared by the evaluation engine
//! (`loom-toggles-engine`) and the SDK (`loom-toggles`): attributes, segments,
//! features with their traffic rules and variations, the tagged-union values
//! they carry, and the [`Evaluation`] results produced for each query.
//!
//! # Overview
//!
//! - Datafiles decode from JSON with a shape-sniffing decoder per value
//! - Conditions and group segments are recursive boolean trees
//! - A value with an unsupported shape fails only its own leaf or variable
//!
//! # Example
//!
//! ```
//! use loom_toggles_core::{Context, DatafileContent};
//!
//! let datafile = DatafileContent::from_json(r#"{
//!     "schemaVersion": "1",
//!     "revision": "7",
//!     "features": [{
//!         "key": "checkout",
//!         "bucketBy": "userId",
//!         "traffic": [{"key": "everyone", "segments": "*", "percentage": 100000}]
//!     }]
//! }"#).unwrap();
//! assert_eq!(datafile.revision, "7");
//!
//! let context = Context::new().with_attribute("userId", "123");
//! assert!(context.contains_key("userId"));
//! ```

pub mod condition;
pub mod context;
pub mod datafile;
pub mod error;
pub mod evaluation;
pub mod segment;
pub mod value;

pub use condition::{Condition, Operator, PlainCondition};
pub use context::{attribute_as_date, Context};
pub use datafile::{
	Allocation, Attribute, AttributeType, BucketBy, DatafileContent, Feature, Force, Range, Required,
	Targeting, Traffic, VariableOverride, VariableSchema, Variation, VariationVariable,
	MAX_BUCKETED_NUMBER,
};
pub use error::{DatafileError, Result, UnsupportedValueShape};
pub use evaluation::{Evaluation, EvaluationReason, StickyFeature, StickyFeatures};
pub use segment::{GroupSegment, Segment, WILDCARD};
pub use value::{AttributeValue, ConditionValue, VariableType, VariableValue};
