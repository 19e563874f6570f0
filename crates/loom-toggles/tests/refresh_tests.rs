// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Integration tests for fetching, readiness and refreshing.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use loom_toggles::{DatafileContent, DatafileFetcher, EventName, Instance, SdkEvent, TogglesError};
use tokio::sync::Semaphore;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const URL: &str = "memory://datafile.json";

fn datafile(revision: &str) -> DatafileContent {
	let mut datafile = DatafileContent::empty();
	datafile.revision = revision.to_string();
	datafile
}

/// Serves revisions in order, repeating the last one. `None` is a failed fetch.
struct ScriptedFetcher {
	revisions: Vec<Option<&'static str>>,
	calls: Arc<AtomicUsize>,
}

impl ScriptedFetcher {
	fn new(revisions: Vec<Option<&'static str>>) -> Self {
		Self {
			revisions,
			calls: Arc::new(AtomicUsize::new(0)),
		}
	}
}

#[async_trait]
impl DatafileFetcher for ScriptedFetcher {
	async fn fetch(&self, url: &str) -> loom_toggles::Result<DatafileContent> {
		let call = self.calls.fetch_add(1, Ordering::SeqCst);
		match self.revisions[call.min(self.revisions.len() - 1)] {
			Some(revision) => Ok(datafile(revision)),
			None => Err(TogglesError::DatafileFetchFailed {
				url: url.to_string(),
				message: "connection refused".to_string(),
			}),
		}
	}
}

/// Blocks every fetch until a permit is released.
struct GatedFetcher {
	gate: Arc<Semaphore>,
	calls: Arc<AtomicUsize>,
}

#[async_trait]
impl DatafileFetcher for GatedFetcher {
	async fn fetch(&self, _url: &str) -> loom_toggles::Result<DatafileContent> {
		self.calls.fetch_add(1, Ordering::SeqCst);
		let _permit = self.gate.acquire().await.map_err(|e| TogglesError::DatafileFetchFailed {
			url: URL.to_string(),
			message: e.to_string(),
		})?;
		Ok(datafile("gated"))
	}
}

fn counter(name: EventName, instance: &Instance) -> Arc<AtomicUsize> {
	let count = Arc::new(AtomicUsize::new(0));
	let inner = Arc::clone(&count);
	instance.on(name, move |_| {
		inner.fetch_add(1, Ordering::SeqCst);
	});
	count
}

async fn eventually(mut condition: impl FnMut() -> bool) {
	let wait = async {
		while !condition() {
			tokio::time::sleep(Duration::from_millis(5)).await;
		}
	};
	tokio::time::timeout(Duration::from_secs(5), wait)
		.await
		.expect("condition not met in time");
}

async fn within<F: Future>(future: F) -> F::Output {
	tokio::time::timeout(Duration::from_secs(5), future)
		.await
		.expect("future did not complete in time")
}

#[tokio::test]
async fn test_ready_after_http_fetch() {
	let server = MockServer::start().await;
	Mock::given(method("GET"))
		.and(path("/datafile.json"))
		.respond_with(
			ResponseTemplate::new(200).set_body_string(r#"{"schemaVersion":"1","revision":"7","features":[]}"#),
		)
		.mount(&server)
		.await;

	let ready = Arc::new(AtomicUsize::new(0));
	let inner = Arc::clone(&ready);
	let instance = Instance::builder()
		.datafile_url(format!("{}/datafile.json", server.uri()))
		.on(EventName::Ready, move |event| {
			assert_eq!(*event, SdkEvent::Ready);
			inner.fetch_add(1, Ordering::SeqCst);
		})
		.build()
		.unwrap();

	within(instance.ready()).await;
	assert!(instance.is_ready());
	assert_eq!(instance.get_revision(), "7");
	assert_eq!(ready.load(Ordering::SeqCst), 1);

	// A refresh after readiness does not emit READY again.
	instance.refresh().await.unwrap();
	assert_eq!(ready.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_initial_fetch_failure_emits_error() {
	let server = MockServer::start().await;
	Mock::given(method("GET"))
		.respond_with(ResponseTemplate::new(500))
		.mount(&server)
		.await;

	let errors = Arc::new(AtomicUsize::new(0));
	let inner = Arc::clone(&errors);
	let instance = Instance::builder()
		.datafile_url(server.uri())
		.on(EventName::Error, move |_| {
			inner.fetch_add(1, Ordering::SeqCst);
		})
		.build()
		.unwrap();

	eventually(|| errors.load(Ordering::SeqCst) == 1).await;
	assert!(!instance.is_ready());
	assert_eq!(instance.get_revision(), "unknown");
}

#[tokio::test]
async fn test_refresh_emits_refresh_and_update() {
	let instance = Instance::builder()
		.datafile_url(URL)
		.fetcher(ScriptedFetcher::new(vec![Some("1"), Some("2")]))
		.build()
		.unwrap();
	within(instance.ready()).await;
	assert_eq!(instance.get_revision(), "1");

	let refreshes = counter(EventName::Refresh, &instance);
	let updates = counter(EventName::Update, &instance);

	instance.refresh().await.unwrap();
	assert_eq!(instance.get_revision(), "2");
	assert_eq!(refreshes.load(Ordering::SeqCst), 1);
	assert_eq!(updates.load(Ordering::SeqCst), 1);

	// Same revision: REFRESH only.
	instance.refresh().await.unwrap();
	assert_eq!(refreshes.load(Ordering::SeqCst), 2);
	assert_eq!(updates.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_failed_refresh_keeps_snapshot() {
	let instance = Instance::builder()
		.datafile_url(URL)
		.fetcher(ScriptedFetcher::new(vec![Some("1"), None]))
		.build()
		.unwrap();
	within(instance.ready()).await;
	let errors = counter(EventName::Error, &instance);

	let err = instance.refresh().await.unwrap_err();
	assert!(matches!(err, TogglesError::DatafileFetchFailed { .. }));
	assert_eq!(instance.get_revision(), "1");
	assert_eq!(errors.load(Ordering::SeqCst), 1);
	assert!(instance.is_ready());
}

#[tokio::test]
async fn test_periodic_refresh_until_stopped() {
	let fetcher = ScriptedFetcher::new(vec![Some("1"), Some("2"), Some("3")]);
	let calls = Arc::clone(&fetcher.calls);
	let instance = Instance::builder()
		.datafile_url(URL)
		.fetcher(fetcher)
		.refresh_interval(Duration::from_millis(10))
		.build()
		.unwrap();

	within(instance.ready()).await;
	eventually(|| instance.get_revision() == "3").await;
	assert!(instance.is_refreshing());

	instance.stop_refreshing();
	assert!(!instance.is_refreshing());

	let after_stop = calls.load(Ordering::SeqCst);
	tokio::time::sleep(Duration::from_millis(60)).await;
	// At most one fetch that was already in flight when stopping.
	assert!(calls.load(Ordering::SeqCst) <= after_stop + 1);
}

#[tokio::test]
async fn test_overlapping_refresh_is_skipped() {
	let gate = Arc::new(Semaphore::new(0));
	let calls = Arc::new(AtomicUsize::new(0));
	let instance = Instance::builder()
		.datafile_url(URL)
		.fetcher(GatedFetcher {
			gate: Arc::clone(&gate),
			calls: Arc::clone(&calls),
		})
		.build()
		.unwrap();

	// The initial fetch is parked on the gate.
	eventually(|| calls.load(Ordering::SeqCst) == 1).await;

	let first = {
		let instance = instance.clone();
		tokio::spawn(async move { instance.refresh().await })
	};
	eventually(|| calls.load(Ordering::SeqCst) == 2).await;

	// Skipped while the first refresh holds the in-flight flag.
	instance.refresh().await.unwrap();
	assert_eq!(calls.load(Ordering::SeqCst), 2);

	gate.add_permits(2);
	within(first).await.unwrap().unwrap();
	within(instance.ready()).await;
	assert_eq!(instance.get_revision(), "gated");
}

#[tokio::test]
async fn test_start_refreshing_requires_interval() {
	let instance = Instance::builder()
		.datafile_url(URL)
		.fetcher(ScriptedFetcher::new(vec![Some("1")]))
		.build()
		.unwrap();
	within(instance.ready()).await;

	instance.start_refreshing();
	assert!(!instance.is_refreshing());
}
