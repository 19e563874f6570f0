// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The SDK instance: datafile snapshot, overrides, readiness and events.

use std::borrow::Cow;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Weak};
use std::time::Duration;

use loom_toggles_core::{Context, DatafileContent, Evaluation, Feature, StickyFeatures, VariableValue};
use loom_toggles_engine::{Bucketer, DatafileIndex, Evaluator, Logger};
use parking_lot::{Mutex, RwLock};
use serde::de::DeserializeOwned;
use serde_json::json;
use tokio::runtime::Handle;
use tokio::sync::watch;

use crate::error::{Result, TogglesError};
use crate::events::{ActivationEvent, EventName, EventRegistry, Listener, SdkEvent};
use crate::fetch::{DatafileFetcher, HttpDatafileFetcher, SharedDatafileFetcher};
use crate::refresh::{InFlightGuard, Refresher};

/// Rewrites the context before every top-level evaluation.
pub type InterceptContext = Arc<dyn Fn(Context) -> Context + Send + Sync>;

/// Builder for constructing an [`Instance`].
pub struct InstanceBuilder {
	datafile: Option<DatafileContent>,
	datafile_json: Option<String>,
	datafile_url: Option<String>,
	fetcher: Option<SharedDatafileFetcher>,
	refresh_interval: Option<Duration>,
	bucketer: Bucketer,
	intercept_context: Option<InterceptContext>,
	sticky_features: StickyFeatures,
	initial_features: Option<StickyFeatures>,
	logger: Logger,
	listeners: Vec<(EventName, Listener)>,
}

impl InstanceBuilder {
	pub fn new() -> Self {
		Self {
			datafile: None,
			datafile_json: None,
			datafile_url: None,
			fetcher: None,
			refresh_interval: None,
			bucketer: Bucketer::new(),
			intercept_context: None,
			sticky_features: StickyFeatures::new(),
			initial_features: None,
			logger: Logger::new(),
			listeners: Vec::new(),
		}
	}

	/// Serves this datafile from construction.
	pub fn datafile(mut self, datafile: DatafileContent) -> Self {
		self.datafile = Some(datafile);
		self
	}

	/// Like [`InstanceBuilder::datafile`], decoded at `build()`.
	pub fn datafile_json(mut self, json: impl Into<String>) -> Self {
		self.datafile_json = Some(json.into());
		self
	}

	/// Fetches the datafile from this URL once built, and on every refresh.
	pub fn datafile_url(mut self, url: impl Into<String>) -> Self {
		self.datafile_url = Some(url.into());
		self
	}

	/// Replaces the default HTTP fetcher.
	pub fn fetcher(mut self, fetcher: impl DatafileFetcher + 'static) -> Self {
		self.fetcher = Some(Arc::new(fetcher));
		self
	}

	/// Refreshes periodically once the first fetch succeeds.
	pub fn refresh_interval(mut self, interval: Duration) -> Self {
		self.refresh_interval = Some(interval);
		self
	}

	pub fn bucket_key_separator(mut self, separator: impl Into<String>) -> Self {
		self.bucketer = self.bucketer.with_separator(separator);
		self
	}

	pub fn configure_bucket_key<F>(mut self, hook: F) -> Self
	where
		F: Fn(&Feature, &Context, String) -> String + Send + Sync + 'static,
	{
		self.bucketer = self.bucketer.with_key_hook(Arc::new(hook));
		self
	}

	pub fn configure_bucket_value<F>(mut self, hook: F) -> Self
	where
		F: Fn(&Feature, &Context, u32) -> u32 + Send + Sync + 'static,
	{
		self.bucketer = self.bucketer.with_value_hook(Arc::new(hook));
		self
	}

	pub fn intercept_context<F>(mut self, hook: F) -> Self
	where
		F: Fn(Context) -> Context + Send + Sync + 'static,
	{
		self.intercept_context = Some(Arc::new(hook));
		self
	}

	pub fn sticky_features(mut self, sticky: StickyFeatures) -> Self {
		self.sticky_features = sticky;
		self
	}

	/// Overrides served only until the instance becomes ready.
	pub fn initial_features(mut self, initial: StickyFeatures) -> Self {
		self.initial_features = Some(initial);
		self
	}

	pub fn logger(mut self, logger: Logger) -> Self {
		self.logger = logger;
		self
	}

	/// Registers a listener before construction, so it can observe READY.
	pub fn on<F>(mut self, name: EventName, listener: F) -> Self
	where
		F: Fn(&SdkEvent) + Send + Sync + 'static,
	{
		self.listeners.push((name, Arc::new(listener)));
		self
	}

	/// Builds the instance.
	///
	/// With a datafile URL, the first fetch is spawned on the current tokio
	/// runtime and the instance becomes ready when it succeeds.
	pub fn build(self) -> Result<Instance> {
		let datafile = match (self.datafile, self.datafile_json) {
			(Some(datafile), _) => Some(datafile),
			(None, Some(json)) => Some(DatafileContent::from_json(&json)?),
			(None, None) => None,
		};
		if datafile.is_none() && self.datafile_url.is_none() {
			return Err(TogglesError::MissingDatafileConfiguration);
		}

		let runtime = match &self.datafile_url {
			Some(_) => Some(Handle::try_current().map_err(|_| TogglesError::RuntimeUnavailable)?),
			None => None,
		};
		let fetcher: Option<SharedDatafileFetcher> = match (self.fetcher, &self.datafile_url) {
			(Some(fetcher), _) => Some(fetcher),
			(None, Some(_)) => Some(Arc::new(HttpDatafileFetcher::new()?)),
			(None, None) => None,
		};

		let (ready_tx, _) = watch::channel(false);
		let events = EventRegistry::new();
		for (name, listener) in self.listeners {
			events.on(name, listener);
		}

		let inner = Arc::new(Inner {
			snapshot: RwLock::new(Arc::new(DatafileIndex::new(datafile.unwrap_or_default()))),
			sticky: RwLock::new(Arc::new(self.sticky_features)),
			initial: self.initial_features,
			bucketer: self.bucketer,
			logger: self.logger,
			intercept_context: self.intercept_context,
			events,
			datafile_url: self.datafile_url,
			fetcher,
			refresh_interval: self.refresh_interval,
			ready_tx,
			refresh_in_flight: AtomicBool::new(false),
			refresher: Mutex::new(None),
		});
		let instance = Instance { inner };

		match runtime {
			None => instance.mark_ready(),
			Some(runtime) => {
				let pending = instance.clone();
				runtime.spawn(async move { pending.initialize().await });
			}
		}

		Ok(instance)
	}
}

impl Default for InstanceBuilder {
	fn default() -> Self {
		Self::new()
	}
}

struct Inner {
	snapshot: RwLock<Arc<DatafileIndex>>,
	sticky: RwLock<Arc<StickyFeatures>>,
	initial: Option<StickyFeatures>,
	bucketer: Bucketer,
	logger: Logger,
	intercept_context: Option<InterceptContext>,
	events: EventRegistry,
	datafile_url: Option<String>,
	/// Only set when a datafile URL is configured.
	fetcher: Option<SharedDatafileFetcher>,
	refresh_interval: Option<Duration>,
	ready_tx: watch::Sender<bool>,
	refresh_in_flight: AtomicBool,
	refresher: Mutex<Option<Refresher>>,
}

/// A feature evaluation instance.
///
/// Cloning is cheap; clones share the same snapshot, overrides and listeners.
/// Evaluations read an immutable snapshot, so a concurrent datafile swap is
/// observed either entirely or not at all.
#[derive(Clone)]
pub struct Instance {
	inner: Arc<Inner>,
}

/// Non-owning handle used by the refresh loop.
#[derive(Debug, Clone)]
pub(crate) struct WeakInstance(Weak<Inner>);

impl WeakInstance {
	pub(crate) fn upgrade(&self) -> Option<Instance> {
		self.0.upgrade().map(|inner| Instance { inner })
	}

	#[cfg(test)]
	pub(crate) fn dangling() -> Self {
		WeakInstance(Weak::new())
	}
}

impl fmt::Debug for Inner {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Inner")
			.field("revision", &self.snapshot.read().revision())
			.field("datafile_url", &self.datafile_url)
			.field("ready", &*self.ready_tx.borrow())
			.finish_non_exhaustive()
	}
}

impl Instance {
	pub fn builder() -> InstanceBuilder {
		InstanceBuilder::new()
	}

	pub(crate) fn downgrade(&self) -> WeakInstance {
		WeakInstance(Arc::downgrade(&self.inner))
	}

	pub fn is_ready(&self) -> bool {
		*self.inner.ready_tx.borrow()
	}

	/// Waits until the instance is ready.
	pub async fn ready(&self) {
		let mut rx = self.inner.ready_tx.subscribe();
		// The sender lives as long as `self`, so this only ends by becoming ready.
		let _ = rx.wait_for(|ready| *ready).await;
	}

	fn mark_ready(&self) {
		let was_ready = self.inner.ready_tx.send_replace(true);
		if !was_ready {
			self.inner.logger.info("instance is ready", || {
				json!({"revision": self.get_revision()})
			});
			self.inner.events.emit(&SdkEvent::Ready);
		}
	}

	async fn initialize(self) {
		let (Some(url), Some(fetcher)) = (self.inner.datafile_url.clone(), self.inner.fetcher.clone()) else {
			return;
		};

		match fetcher.fetch(&url).await {
			Ok(datafile) => {
				self.set_datafile(datafile);
				self.mark_ready();
				if self.inner.refresh_interval.is_some() {
					self.start_refreshing();
				}
			}
			Err(e) => {
				self.inner.logger.error("failed to fetch datafile", || {
					json!({"url": url, "error": e.to_string()})
				});
				self.inner.events.emit(&SdkEvent::Error { message: e.to_string() });
			}
		}
	}

	/// Replaces the datafile snapshot.
	pub fn set_datafile(&self, datafile: DatafileContent) {
		let index = Arc::new(DatafileIndex::new(datafile));
		let revision = index.revision().to_string();
		*self.inner.snapshot.write() = index;
		self.inner.logger.debug("datafile set", || json!({"revision": revision}));
	}

	/// Decodes and swaps in a datafile; the current one stays on error.
	pub fn set_datafile_json(&self, json: &str) -> Result<()> {
		match DatafileContent::from_json(json) {
			Ok(datafile) => {
				self.set_datafile(datafile);
				Ok(())
			}
			Err(e) => {
				self.inner.logger.error("could not parse datafile", || json!({"error": e.to_string()}));
				Err(e.into())
			}
		}
	}

	pub fn set_sticky_features(&self, sticky: StickyFeatures) {
		*self.inner.sticky.write() = Arc::new(sticky);
		self.inner.logger.debug("sticky features set", || json!({}));
	}

	pub fn get_revision(&self) -> String {
		self.inner.snapshot.read().revision().to_string()
	}

	/// The datafile snapshot evaluations currently read.
	pub fn snapshot(&self) -> Arc<DatafileIndex> {
		Arc::clone(&self.inner.snapshot.read())
	}

	fn intercepted<'c>(&self, context: &'c Context) -> Cow<'c, Context> {
		match &self.inner.intercept_context {
			Some(hook) => Cow::Owned(hook(context.clone())),
			None => Cow::Borrowed(context),
		}
	}

	fn with_evaluator<T>(&self, f: impl FnOnce(&Evaluator<'_>) -> T) -> T {
		self.with_evaluator_on(&self.snapshot(), f)
	}

	fn with_evaluator_on<T>(&self, index: &DatafileIndex, f: impl FnOnce(&Evaluator<'_>) -> T) -> T {
		let sticky = Arc::clone(&self.inner.sticky.read());
		let mut evaluator = Evaluator::new(index, &self.inner.bucketer, &self.inner.logger).with_sticky(&sticky);
		if let Some(initial) = &self.inner.initial {
			if !self.is_ready() {
				evaluator = evaluator.with_initial(initial);
			}
		}
		f(&evaluator)
	}

	pub fn evaluate_flag(&self, feature_key: &str, context: &Context) -> Evaluation {
		let context = self.intercepted(context);
		self.with_evaluator(|e| e.evaluate_flag(feature_key, &context))
	}

	pub fn evaluate_variation(&self, feature_key: &str, context: &Context) -> Evaluation {
		let context = self.intercepted(context);
		self.with_evaluator(|e| e.evaluate_variation(feature_key, &context))
	}

	pub fn evaluate_variable(&self, feature_key: &str, variable_key: &str, context: &Context) -> Evaluation {
		let context = self.intercepted(context);
		self.with_evaluator(|e| e.evaluate_variable(feature_key, variable_key, &context))
	}

	pub fn is_enabled(&self, feature_key: &str, context: &Context) -> bool {
		self.evaluate_flag(feature_key, context).is_enabled()
	}

	pub fn get_variation(&self, feature_key: &str, context: &Context) -> Option<String> {
		self.evaluate_variation(feature_key, context).variation_value
	}

	pub fn get_variable(&self, feature_key: &str, variable_key: &str, context: &Context) -> Option<VariableValue> {
		self.evaluate_variable(feature_key, variable_key, context).variable_value
	}

	pub fn get_variable_boolean(&self, feature_key: &str, variable_key: &str, context: &Context) -> Option<bool> {
		self.get_variable(feature_key, variable_key, context)?.as_bool()
	}

	pub fn get_variable_string(&self, feature_key: &str, variable_key: &str, context: &Context) -> Option<String> {
		match self.get_variable(feature_key, variable_key, context)? {
			VariableValue::String(s) => Some(s),
			_ => None,
		}
	}

	pub fn get_variable_integer(&self, feature_key: &str, variable_key: &str, context: &Context) -> Option<i64> {
		self.get_variable(feature_key, variable_key, context)?.as_i64()
	}

	pub fn get_variable_double(&self, feature_key: &str, variable_key: &str, context: &Context) -> Option<f64> {
		self.get_variable(feature_key, variable_key, context)?.as_f64()
	}

	pub fn get_variable_array(&self, feature_key: &str, variable_key: &str, context: &Context) -> Option<Vec<String>> {
		match self.get_variable(feature_key, variable_key, context)? {
			VariableValue::Array(items) => Some(items),
			_ => None,
		}
	}

	/// Deserializes an object variable into `T`.
	pub fn get_variable_object<T: DeserializeOwned>(
		&self,
		feature_key: &str,
		variable_key: &str,
		context: &Context,
	) -> Option<T> {
		match self.get_variable(feature_key, variable_key, context)? {
			value @ VariableValue::Object(_) => value.deserialize_into(),
			_ => None,
		}
	}

	/// Deserializes a JSON variable into `T`.
	pub fn get_variable_json<T: DeserializeOwned>(
		&self,
		feature_key: &str,
		variable_key: &str,
		context: &Context,
	) -> Option<T> {
		self.get_variable(feature_key, variable_key, context)?
			.deserialize_into()
	}

	/// Resolves the variation and emits an ACTIVATION event.
	///
	/// Returns `None`, without an event, when no variation applies. A
	/// panicking listener is logged and does not affect the result.
	pub fn activate(&self, feature_key: &str, context: &Context) -> Option<String> {
		let context = self.intercepted(context).into_owned();
		let index = self.snapshot();
		let evaluation = self.with_evaluator_on(&index, |e| e.evaluate_variation(feature_key, &context));
		let variation_value = evaluation.variation_value.clone()?;

		let captured_context = context.select(index.captured_attributes());
		let event = SdkEvent::Activation(ActivationEvent {
			feature_key: feature_key.to_string(),
			variation_value: variation_value.clone(),
			context,
			captured_context,
			evaluation,
		});

		if catch_unwind(AssertUnwindSafe(|| self.inner.events.emit(&event))).is_err() {
			self.inner.logger.error("activation listener panicked", || {
				json!({"featureKey": feature_key, "variationValue": variation_value})
			});
		}

		Some(variation_value)
	}

	/// Fetches the datafile now and swaps it in.
	///
	/// Skipped with a warning while another refresh is in flight. Emits
	/// REFRESH on success and UPDATE when the revision changed; failures keep
	/// the current snapshot and emit ERROR.
	pub async fn refresh(&self) -> Result<()> {
		let (Some(url), Some(fetcher)) = (self.inner.datafile_url.as_deref(), self.inner.fetcher.as_ref()) else {
			self.inner.logger.warn("cannot refresh without a datafile URL", || json!({}));
			return Err(TogglesError::MissingDatafileConfiguration);
		};
		let Some(_guard) = InFlightGuard::acquire(&self.inner.refresh_in_flight) else {
			self.inner.logger.warn("refresh already in progress, skipping", || json!({"url": url}));
			return Ok(());
		};

		self.inner.logger.debug("refreshing datafile", || json!({"url": url}));
		let previous_revision = self.get_revision();

		match fetcher.fetch(url).await {
			Ok(datafile) => {
				let revision = datafile.revision.clone();
				self.set_datafile(datafile);
				self.mark_ready();

				self.inner.events.emit(&SdkEvent::Refresh {
					revision: revision.clone(),
				});
				if revision != previous_revision {
					self.inner.logger.info("datafile revision changed", || {
						json!({"previousRevision": previous_revision, "revision": revision})
					});
					self.inner.events.emit(&SdkEvent::Update {
						previous_revision,
						revision,
					});
				}
				Ok(())
			}
			Err(e) => {
				self.inner.logger.warn("failed to refresh datafile", || {
					json!({"url": url, "error": e.to_string()})
				});
				self.inner.events.emit(&SdkEvent::Error { message: e.to_string() });
				Err(e)
			}
		}
	}

	/// Starts the periodic refresh loop.
	pub fn start_refreshing(&self) {
		let Some(interval) = self.inner.refresh_interval else {
			self.inner.logger.warn("no refresh interval configured", || json!({}));
			return;
		};
		if self.inner.datafile_url.is_none() {
			self.inner.logger.warn("cannot refresh without a datafile URL", || json!({}));
			return;
		}

		let mut refresher = self.inner.refresher.lock();
		if refresher.as_ref().is_some_and(|r| !r.is_finished()) {
			self.inner.logger.warn("already refreshing", || json!({}));
			return;
		}

		match Refresher::start(self.downgrade(), interval) {
			Ok(started) => {
				*refresher = Some(started);
				self.inner.logger.debug("started refreshing", || {
					json!({"intervalMs": interval.as_millis() as u64})
				});
			}
			Err(e) => self.inner.logger.error("could not start refreshing", || json!({"error": e.to_string()})),
		}
	}

	/// Stops the refresh loop; an in-flight fetch still completes.
	pub fn stop_refreshing(&self) {
		match self.inner.refresher.lock().take() {
			Some(refresher) => {
				refresher.stop();
				self.inner.logger.debug("stopped refreshing", || json!({}));
			}
			None => self.inner.logger.warn("refreshing has not started", || json!({})),
		}
	}

	pub fn is_refreshing(&self) -> bool {
		self.inner
			.refresher
			.lock()
			.as_ref()
			.is_some_and(|r| !r.is_finished())
	}

	/// Registers a listener; ignored if `name` already has one.
	pub fn on<F>(&self, name: EventName, listener: F) -> bool
	where
		F: Fn(&SdkEvent) + Send + Sync + 'static,
	{
		self.inner.events.on(name, Arc::new(listener))
	}

	pub fn remove_listener(&self, name: EventName) -> bool {
		self.inner.events.remove_listener(name)
	}

	pub fn remove_all_listeners(&self) {
		self.inner.events.remove_all_listeners();
	}
}

impl fmt::Debug for Instance {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Instance").field("inner", &self.inner).finish()
	}
}
