// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! SDK lifecycle and activation events.
//!
//! The registry holds at most one listener per event name. Registering a
//! second listener for the same name is ignored until the first one is
//! removed.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use loom_toggles_core::{Context, Evaluation};
use parking_lot::Mutex;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EventName {
	Ready,
	Refresh,
	Update,
	Activation,
	Error,
}

impl EventName {
	pub fn as_str(&self) -> &'static str {
		match self {
			EventName::Ready => "ready",
			EventName::Refresh => "refresh",
			EventName::Update => "update",
			EventName::Activation => "activation",
			EventName::Error => "error",
		}
	}
}

impl fmt::Display for EventName {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Payload recorded when a variation is activated for a context.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivationEvent {
	pub feature_key: String,
	pub variation_value: String,
	/// Context after interception.
	pub context: Context,
	/// Only the attributes the datafile marks for capture.
	pub captured_context: Context,
	pub evaluation: Evaluation,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SdkEvent {
	Ready,
	/// A datafile was fetched, whether or not it changed.
	Refresh { revision: String },
	/// A fetched datafile carried a new revision.
	Update {
		previous_revision: String,
		revision: String,
	},
	Activation(ActivationEvent),
	Error { message: String },
}

impl SdkEvent {
	pub fn name(&self) -> EventName {
		match self {
			SdkEvent::Ready => EventName::Ready,
			SdkEvent::Refresh { .. } => EventName::Refresh,
			SdkEvent::Update { .. } => EventName::Update,
			SdkEvent::Activation(_) => EventName::Activation,
			SdkEvent::Error { .. } => EventName::Error,
		}
	}
}

pub type Listener = Arc<dyn Fn(&SdkEvent) + Send + Sync>;

#[derive(Default)]
pub struct EventRegistry {
	listeners: Mutex<HashMap<EventName, Listener>>,
}

impl EventRegistry {
	pub fn new() -> Self {
		Self::default()
	}

	/// Registers `listener` unless one already exists for `name`.
	///
	/// Returns `true` when the listener was registered.
	pub fn on(&self, name: EventName, listener: Listener) -> bool {
		let mut listeners = self.listeners.lock();
		if listeners.contains_key(&name) {
			return false;
		}
		listeners.insert(name, listener);
		true
	}

	/// Returns `true` when a listener was removed.
	pub fn remove_listener(&self, name: EventName) -> bool {
		self.listeners.lock().remove(&name).is_some()
	}

	pub fn remove_all_listeners(&self) {
		self.listeners.lock().clear();
	}

	pub fn has_listener(&self, name: EventName) -> bool {
		self.listeners.lock().contains_key(&name)
	}

	/// Invokes the listener for the event's name, outside the registry lock.
	pub fn emit(&self, event: &SdkEvent) {
		let listener = self.listeners.lock().get(&event.name()).cloned();
		if let Some(listener) = listener {
			listener(event);
		}
	}
}

impl fmt::Debug for EventRegistry {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let names: Vec<EventName> = self.listeners.lock().keys().copied().collect();
		f.debug_struct("EventRegistry").field("listeners", &names).finish()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::sync::atomic::{AtomicUsize, Ordering};

	fn counter() -> (Listener, Arc<AtomicUsize>) {
		let count = Arc::new(AtomicUsize::new(0));
		let inner = Arc::clone(&count);
		let listener: Listener = Arc::new(move |_| {
			inner.fetch_add(1, Ordering::SeqCst);
		});
		(listener, count)
	}

	#[test]
	fn first_listener_wins() {
		let registry = EventRegistry::new();
		let (first, first_count) = counter();
		let (second, second_count) = counter();

		assert!(registry.on(EventName::Ready, first));
		assert!(!registry.on(EventName::Ready, second.clone()));
		registry.emit(&SdkEvent::Ready);

		assert_eq!(first_count.load(Ordering::SeqCst), 1);
		assert_eq!(second_count.load(Ordering::SeqCst), 0);

		assert!(registry.remove_listener(EventName::Ready));
		assert!(registry.on(EventName::Ready, second));
		registry.emit(&SdkEvent::Ready);
		assert_eq!(second_count.load(Ordering::SeqCst), 1);
	}

	#[test]
	fn events_route_by_name() {
		let registry = EventRegistry::new();
		let (listener, count) = counter();
		registry.on(EventName::Refresh, listener);

		registry.emit(&SdkEvent::Ready);
		registry.emit(&SdkEvent::Refresh {
			revision: "2".to_string(),
		});
		assert_eq!(count.load(Ordering::SeqCst), 1);
	}

	#[test]
	fn listener_may_reenter_registry() {
		let registry = Arc::new(EventRegistry::new());
		let inner = Arc::clone(&registry);
		registry.on(
			EventName::Error,
			Arc::new(move |_| {
				inner.remove_listener(EventName::Error);
			}),
		);

		registry.emit(&SdkEvent::Error {
			message: "boom".to_string(),
		});
		assert!(!registry.has_listener(EventName::Error));
	}

	#[test]
	fn remove_all() {
		let registry = EventRegistry::new();
		let (a, _) = counter();
		let (b, _) = counter();
		registry.on(EventName::Ready, a);
		registry.on(EventName::Update, b);
		registry.remove_all_listeners();
		assert!(!registry.has_listener(EventName::Ready));
		assert!(!registry.remove_listener(EventName::Update));
	}
}
