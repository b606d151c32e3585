//! Common test utilities and helpers
//!
//! This module provides shared utilities for integration tests. Resolver
//! behaviour is scripted through [`StubExtractor`]; no test spawns yt-dlp.

#![allow(dead_code)]

use async_trait::async_trait;
use axum::{Router, body::Body, http::Request, response::Response};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tower::ServiceExt;
use ytdlp_stream_resolver::{
    FormatDescriptor, ResolveError, ResolverService,
    config::Settings,
    resolver::{ConcurrencyGate, Extraction, Extractor, Invocation, Mode, ProcessTracker},
    server::create_app,
};

type Script = dyn Fn(&Invocation) -> Result<Extraction, ResolveError> + Send + Sync;

/// Extractor answering from a closure, running inside the concurrency gate
pub struct StubExtractor {
    gate: Arc<ConcurrencyGate>,
    delay: Duration,
    script: Box<Script>,
    calls: Mutex<Vec<Invocation>>,
}

impl StubExtractor {
    pub fn new(
        max_concurrent: usize,
        delay: Duration,
        script: impl Fn(&Invocation) -> Result<Extraction, ResolveError> + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            gate: Arc::new(ConcurrencyGate::new(max_concurrent)),
            delay,
            script: Box::new(script),
            calls: Mutex::new(Vec::new()),
        })
    }

    /// Answers structured probes with [`MockData::ladder`]
    pub fn with_ladder() -> Arc<Self> {
        Self::new(4, Duration::from_millis(20), |invocation| {
            match invocation.mode {
                Mode::StructuredInfo => Ok(Extraction::Formats(MockData::ladder())),
                Mode::SingleUrl => Ok(Extraction::Url(MockData::single_url())),
            }
        })
    }

    /// Fails every invocation with `error`
    pub fn failing(error: ResolveError) -> Arc<Self> {
        Self::new(4, Duration::from_millis(5), move |_| Err(error.clone()))
    }

    pub fn gate(&self) -> Arc<ConcurrencyGate> {
        self.gate.clone()
    }

    pub fn calls(&self) -> Vec<Invocation> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Extractor for StubExtractor {
    async fn extract(&self, invocation: &Invocation) -> Result<Extraction, ResolveError> {
        self.calls.lock().unwrap().push(invocation.clone());
        let delay = self.delay;
        self.gate
            .run(async move { tokio::time::sleep(delay).await })
            .await?;
        (self.script)(invocation)
    }
}

/// Test configuration factory
pub struct TestConfig;

impl TestConfig {
    /// Single profile, fast merge window
    pub fn minimal() -> Settings {
        let mut settings = Settings::default();
        settings.resolver.clients = vec!["tv".to_string()];
        settings.prober.merge_window_ms = 100;
        settings.logging.level = "debug".to_string();
        settings
    }
}

/// Test data factory
pub struct MockData;

impl MockData {
    pub const VIDEO_ID: &'static str = "dQw4w9WgXcQ";

    /// Progressive 360p/720p, adaptive 1080p video, one audio track and a storyboard
    pub fn ladder() -> Vec<FormatDescriptor> {
        serde_json::from_value(serde_json::json!([
            {"format_id": "sb0", "ext": "mhtml", "format_note": "storyboard",
             "url": "https://i.ytimg.com/sb/0"},
            {"format_id": "18", "ext": "mp4", "height": 360, "width": 640,
             "vcodec": "avc1.42001E", "acodec": "mp4a.40.2", "protocol": "https",
             "url": "https://rr1.googlevideo.com/videoplayback?itag=18&expire=4000000000"},
            {"format_id": "22", "ext": "mp4", "height": 720, "width": 1280,
             "vcodec": "avc1.64001F", "acodec": "mp4a.40.2", "protocol": "https",
             "url": "https://rr1.googlevideo.com/videoplayback?itag=22&expire=4000000000"},
            {"format_id": "137", "ext": "mp4", "height": 1080, "width": 1920,
             "vcodec": "avc1.640028", "acodec": "none", "protocol": "https",
             "url": "https://rr1.googlevideo.com/videoplayback?itag=137"},
            {"format_id": "140", "ext": "m4a", "vcodec": "none", "acodec": "mp4a.40.2",
             "abr": 129.5, "protocol": "https",
             "url": "https://rr1.googlevideo.com/videoplayback?itag=140"}
        ]))
        .unwrap()
    }

    pub fn single_url() -> String {
        "https://rr1.googlevideo.com/videoplayback?itag=18&single=1".to_string()
    }
}

/// Service, router and stub wired together
pub struct Harness {
    pub service: Arc<ResolverService>,
    pub extractor: Arc<StubExtractor>,
    pub app: Router,
}

impl Harness {
    pub fn new(settings: Settings, extractor: Arc<StubExtractor>) -> Self {
        let service = Arc::new(
            ResolverService::from_parts(
                settings,
                extractor.clone(),
                extractor.gate(),
                ProcessTracker::new(),
                None,
            )
            .unwrap(),
        );
        let app = create_app(service.clone());
        Self {
            service,
            extractor,
            app,
        }
    }

    pub async fn get(&self, uri: &str) -> Response {
        self.send(Request::get(uri).body(Body::empty()).unwrap())
            .await
    }

    pub async fn post(&self, uri: &str) -> Response {
        self.send(Request::post(uri).body(Body::empty()).unwrap())
            .await
    }

    async fn send(&self, request: Request<Body>) -> Response {
        self.app.clone().oneshot(request).await.unwrap()
    }
}

/// Collect a response body as JSON
pub async fn json_body(response: Response) -> serde_json::Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

/// Header value as a string, empty when absent
pub fn header<'a>(response: &'a Response, name: &str) -> &'a str {
    response
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
}

/// Test utilities
pub struct TestUtils;

impl TestUtils {
    /// Initialize test logging
    pub fn init_logger() {
        let _ = tracing_subscriber::fmt()
            .with_test_writer()
            .with_env_filter("debug")
            .try_init();
    }

    /// Wait for a synchronous condition
    pub async fn wait_for(condition: impl Fn() -> bool, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, async {
            while !condition() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .is_ok()
    }
}
