// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Datafile acquisition.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use loom_toggles_core::DatafileContent;
use reqwest::Client;
use tracing::debug;

use crate::error::{Result, TogglesError};

/// SDK name and version sent as the User-Agent.
const USER_AGENT: &str = concat!("loom-toggles-rust/", env!("CARGO_PKG_VERSION"));

/// Fetches and decodes a datafile.
///
/// Implement this to load datafiles from somewhere other than plain HTTP
/// (a bundled file, an authenticated CDN, a test fixture).
#[async_trait]
pub trait DatafileFetcher: Send + Sync {
	async fn fetch(&self, url: &str) -> Result<DatafileContent>;
}

pub type SharedDatafileFetcher = Arc<dyn DatafileFetcher>;

/// Default fetcher: `GET url` and decode the JSON body.
#[derive(Debug, Clone)]
pub struct HttpDatafileFetcher {
	client: Client,
}

impl HttpDatafileFetcher {
	pub fn new() -> Result<Self> {
		Self::with_timeout(Duration::from_secs(30))
	}

	pub fn with_timeout(timeout: Duration) -> Result<Self> {
		let client = Client::builder()
			.user_agent(USER_AGENT)
			.timeout(timeout)
			.build()
			.map_err(|e| TogglesError::fetch_failed("<http client>", e))?;
		Ok(Self { client })
	}

	pub fn with_client(client: Client) -> Self {
		Self { client }
	}
}

#[async_trait]
impl DatafileFetcher for HttpDatafileFetcher {
	async fn fetch(&self, url: &str) -> Result<DatafileContent> {
		debug!(url = %url, "Fetching datafile");

		let response = self
			.client
			.get(url)
			.header("Accept", "application/json")
			.send()
			.await
			.map_err(|e| TogglesError::fetch_failed(url, e))?;

		let status = response.status();
		if !status.is_success() {
			return Err(TogglesError::fetch_failed(url, format!("server returned {status}")));
		}

		let body = response
			.text()
			.await
			.map_err(|e| TogglesError::fetch_failed(url, e))?;
		let datafile = DatafileContent::from_json(&body)?;

		debug!(url = %url, revision = %datafile.revision, "Fetched datafile");
		Ok(datafile)
	}
}
