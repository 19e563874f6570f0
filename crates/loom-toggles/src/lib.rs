// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Loom toggles Rust SDK.
//!
//! Evaluates feature flags, variations and variables locally against a
//! datafile. The datafile can be supplied directly or fetched from a URL and
//! refreshed periodically.
//!
//! # Features
//!
//! - **Deterministic bucketing**: the same context always lands in the same bucket
//! - **Sticky and initial overrides**: pin results per feature
//! - **Periodic refresh**: swap in new datafiles without blocking evaluations
//! - **Events**: READY, REFRESH, UPDATE, ACTIVATION and ERROR listeners
//!
//! # Example
//!
//! ```ignore
//! use loom_toggles::{Context, EventName, Instance};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let instance = Instance::builder()
//!         .datafile_url("https://cdn.example.com/datafile.json")
//!         .refresh_interval(Duration::from_secs(30))
//!         .on(EventName::Update, |event| println!("datafile changed: {event:?}"))
//!         .build()?;
//!     instance.ready().await;
//!
//!     let context = Context::new().with_attribute("userId", "123");
//!     if instance.is_enabled("checkout", &context) {
//!         let variation = instance.activate("checkout", &context);
//!         let color = instance.get_variable_string("checkout", "color", &context);
//!     }
//!
//!     Ok(())
//! }
//! ```

mod error;
mod events;
mod fetch;
mod instance;
mod refresh;

pub use error::{Result, TogglesError};
pub use events::{ActivationEvent, EventName, EventRegistry, Listener, SdkEvent};
pub use fetch::{DatafileFetcher, HttpDatafileFetcher, SharedDatafileFetcher};
pub use instance::{Instance, InstanceBuilder, InterceptContext};

// Re-export core types for convenience
pub use loom_toggles_core::{
	AttributeValue, Context, DatafileContent, DatafileError, Evaluation, EvaluationReason, Feature,
	StickyFeature, StickyFeatures, VariableValue,
};
pub use loom_toggles_engine::{DatafileIndex, LogHandler, LogLevel, Logger};
