//! HTTP client for end-to-end tests
//!
//! Wraps reqwest with one method per server endpoint. When routes or request
//! formats change, update only this file.

use super::constants::*;
use reqwest::Response;
use serde_json::{json, Map, Value};
use std::time::Duration;

pub struct TestClient {
    /// The underlying reqwest client (public for custom requests in tests)
    pub client: reqwest::Client,
    /// The base URL of the test server
    pub base_url: String,
}

impl TestClient {
    pub fn new(base_url: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .expect("Failed to build reqwest client");

        Self { client, base_url }
    }

    // ========================================================================
    // Ingest
    // ========================================================================

    /// POST / with a well-formed payload
    pub async fn post_stats(&self, pcid: &str, reports: Value) -> Response {
        self.post_raw(&json!({ "PCID": pcid, "Reports": reports }).to_string())
            .await
    }

    /// POST / with an arbitrary body
    pub async fn post_raw(&self, body: &str) -> Response {
        self.client
            .post(format!("{}/", self.base_url))
            .header("content-type", "application/json")
            .body(body.to_string())
            .send()
            .await
            .expect("POST / failed")
    }

    // ========================================================================
    // Status
    // ========================================================================

    /// GET /
    pub async fn get_status(&self) -> Response {
        self.client
            .get(format!("{}/", self.base_url))
            .send()
            .await
            .expect("GET / failed")
    }

    pub async fn status_json(&self) -> Map<String, Value> {
        let response = self.get_status().await;
        assert!(response.status().is_success());
        response
            .json::<Map<String, Value>>()
            .await
            .expect("Status is not a JSON object")
    }
}
