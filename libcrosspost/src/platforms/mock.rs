//! Mock platform implementation for testing
//!
//! A configurable in-memory backend that records every draft it is given.
//! It can be told to reject logins, fail specific uploads or posts, and
//! resolve a fixed table of handles, which is enough to drive the
//! orchestrator through every branch without network access.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::sleep;

use crate::error::{PlatformError, Result};
use crate::platforms::Platform;
use crate::types::{EncodedImage, MediaLimits, MediaRef, PostDraft, PostRef, ReplyShape};

/// Configuration for mock platform behavior
#[derive(Debug, Clone)]
pub struct MockConfig {
    pub name: String,
    pub segment_limit: usize,
    pub supports_annotations: bool,
    pub media_limits: MediaLimits,
    pub reply_shape: ReplyShape,

    pub auth_succeeds: bool,
    pub auth_error: Option<String>,

    /// handle -> identity
    pub identities: HashMap<String, String>,

    /// 1-based upload calls that fail
    pub failing_uploads: Vec<usize>,

    /// 1-based `create_post` call that fails
    pub fail_post_at: Option<usize>,
    pub post_error: Option<String>,

    /// Simulated latency for every remote call
    pub delay: Duration,

    pub recorder: MockRecorder,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            name: "mock".to_string(),
            segment_limit: 300,
            supports_annotations: true,
            media_limits: MediaLimits {
                max_count: Some(4),
                max_bytes: 1_000_000,
            },
            reply_shape: ReplyShape::ParentAndRoot,
            auth_succeeds: true,
            auth_error: None,
            identities: HashMap::new(),
            failing_uploads: Vec::new(),
            fail_post_at: None,
            post_error: None,
            delay: Duration::from_millis(0),
            recorder: MockRecorder::default(),
        }
    }
}

/// Shared view of what a mock platform was asked to do
///
/// Clones share state, so a test can keep one after the platform itself has
/// been boxed and handed to the orchestrator.
#[derive(Debug, Clone, Default)]
pub struct MockRecorder {
    auth_calls: Arc<Mutex<usize>>,
    resolve_calls: Arc<Mutex<Vec<String>>>,
    uploads: Arc<Mutex<Vec<u64>>>,
    upload_calls: Arc<Mutex<usize>>,
    post_calls: Arc<Mutex<usize>>,
    posts: Arc<Mutex<Vec<PostDraft>>>,
}

impl MockRecorder {
    pub fn auth_call_count(&self) -> usize {
        *self.auth_calls.lock().unwrap()
    }

    /// Handles looked up, in call order
    pub fn resolved_handles(&self) -> Vec<String> {
        self.resolve_calls.lock().unwrap().clone()
    }

    pub fn upload_call_count(&self) -> usize {
        *self.upload_calls.lock().unwrap()
    }

    /// Byte sizes of the successfully uploaded images
    pub fn uploaded_sizes(&self) -> Vec<u64> {
        self.uploads.lock().unwrap().clone()
    }

    pub fn post_call_count(&self) -> usize {
        *self.post_calls.lock().unwrap()
    }

    /// Drafts that were accepted, in posting order
    pub fn posted(&self) -> Vec<PostDraft> {
        self.posts.lock().unwrap().clone()
    }
}

/// Mock platform for testing
pub struct MockPlatform {
    config: MockConfig,
    authenticated: bool,
}

impl MockPlatform {
    pub fn new(config: MockConfig) -> Self {
        Self {
            config,
            authenticated: false,
        }
    }

    /// A platform on which every operation succeeds
    pub fn success(name: &str) -> Self {
        Self::new(MockConfig {
            name: name.to_string(),
            ..Default::default()
        })
    }

    pub fn auth_failure(name: &str, error: &str) -> Self {
        Self::new(MockConfig {
            name: name.to_string(),
            auth_succeeds: false,
            auth_error: Some(error.to_string()),
            ..Default::default()
        })
    }

    /// A platform whose `n`-th post creation fails
    pub fn post_failure_at(name: &str, n: usize, error: &str) -> Self {
        Self::new(MockConfig {
            name: name.to_string(),
            fail_post_at: Some(n),
            post_error: Some(error.to_string()),
            ..Default::default()
        })
    }

    pub fn with_limit(name: &str, limit: usize) -> Self {
        Self::new(MockConfig {
            name: name.to_string(),
            segment_limit: limit,
            ..Default::default()
        })
    }

    pub fn recorder(&self) -> MockRecorder {
        self.config.recorder.clone()
    }

    async fn simulate_latency(&self) {
        if !self.config.delay.is_zero() {
            sleep(self.config.delay).await;
        }
    }

    fn require_session(&self) -> Result<()> {
        if self.authenticated {
            Ok(())
        } else {
            Err(PlatformError::Authentication("Not authenticated".to_string()).into())
        }
    }
}

#[async_trait]
impl Platform for MockPlatform {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn segment_limit(&self) -> usize {
        self.config.segment_limit
    }

    fn supports_annotations(&self) -> bool {
        self.config.supports_annotations
    }

    fn media_limits(&self) -> MediaLimits {
        self.config.media_limits
    }

    fn reply_shape(&self) -> ReplyShape {
        self.config.reply_shape
    }

    async fn authenticate(&mut self) -> Result<()> {
        *self.config.recorder.auth_calls.lock().unwrap() += 1;
        self.simulate_latency().await;

        if self.config.auth_succeeds {
            self.authenticated = true;
            Ok(())
        } else {
            let error_msg = self
                .config
                .auth_error
                .clone()
                .unwrap_or_else(|| "Mock authentication failed".to_string());
            Err(PlatformError::Authentication(error_msg).into())
        }
    }

    async fn resolve_identity(&self, handle: &str) -> Result<String> {
        self.config
            .recorder
            .resolve_calls
            .lock()
            .unwrap()
            .push(handle.to_string());
        self.simulate_latency().await;

        self.config.identities.get(handle).cloned().ok_or_else(|| {
            PlatformError::IdentityResolution(format!("Unable to resolve handle {}", handle)).into()
        })
    }

    async fn upload_media(&self, image: &EncodedImage) -> Result<MediaRef> {
        self.require_session()?;
        let call = {
            let mut calls = self.config.recorder.upload_calls.lock().unwrap();
            *calls += 1;
            *calls
        };
        self.simulate_latency().await;

        if self.config.failing_uploads.contains(&call) {
            return Err(PlatformError::MediaUpload(format!("Mock upload {} failed", call)).into());
        }

        self.config.recorder.uploads.lock().unwrap().push(image.len());
        Ok(MediaRef {
            id: format!("{}:media-{}", self.config.name, call),
            payload: None,
        })
    }

    async fn create_post(&self, draft: &PostDraft) -> Result<PostRef> {
        self.require_session()?;
        let call = {
            let mut calls = self.config.recorder.post_calls.lock().unwrap();
            *calls += 1;
            *calls
        };
        self.simulate_latency().await;

        if self.config.fail_post_at == Some(call) {
            let error_msg = self
                .config
                .post_error
                .clone()
                .unwrap_or_else(|| "Mock posting failed".to_string());
            return Err(PlatformError::Posting(error_msg).into());
        }

        self.config.recorder.posts.lock().unwrap().push(draft.clone());

        let id = format!("{}:post-{}", self.config.name, call);
        Ok(match self.config.reply_shape {
            ReplyShape::ParentAndRoot => PostRef::with_cid(id, format!("cid-{}", call)),
            ReplyShape::ParentOnly => PostRef::new(id),
        })
    }
}
