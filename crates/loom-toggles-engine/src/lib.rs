// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Evaluation engine for Loom toggles datafiles.
//!
//! Everything here is a pure, synchronous computation over an immutable
//! [`DatafileIndex`]; hosts swap indexes when a new datafile arrives and build
//! a short-lived [`Evaluator`] per call.
//!
//! # Example
//!
//! ```
//! use loom_toggles_core::{Context, DatafileContent, EvaluationReason};
//! use loom_toggles_engine::{Bucketer, DatafileIndex, Evaluator, Logger};
//!
//! let datafile = DatafileContent::from_json(r#"{
//!     "schemaVersion": "1",
//!     "revision": "1",
//!     "features": [{
//!         "key": "checkout",
//!         "bucketBy": "userId",
//!         "traffic": [{"key": "everyone", "segments": "*", "percentage": 100000}]
//!     }]
//! }"#).unwrap();
//!
//! let index = DatafileIndex::new(datafile);
//! let bucketer = Bucketer::new();
//! let logger = Logger::new();
//! let evaluator = Evaluator::new(&index, &bucketer, &logger);
//!
//! let context = Context::new().with_attribute("userId", "123");
//! let evaluation = evaluator.evaluate_flag("checkout", &context);
//! assert_eq!(evaluation.reason, EvaluationReason::Rule);
//! ```

pub mod bucket;
pub mod conditions;
pub mod evaluator;
pub mod index;
pub mod logger;
pub mod segments;
pub mod traffic;

pub use bucket::{
	bucket_key, bucket_value, hash, Bucket, BucketKeyHook, BucketValueHook, Bucketer,
	DEFAULT_BUCKET_KEY_SEPARATOR, HASH_SEED,
};
pub use conditions::{condition_matches, plain_matches};
pub use evaluator::Evaluator;
pub use index::DatafileIndex;
pub use logger::{LogHandler, LogLevel, Logger};
pub use segments::{group_segments_match, segment_matches, targeting_matches};
pub use traffic::{
	in_exclusive_ranges, matched_allocation, matched_force, matched_traffic, matched_traffic_and_allocation,
};
