//! Bluesky platform implementation
//!
//! Talks to a PDS over plain XRPC: a session is created with an app password,
//! handles are resolved to DIDs for mention facets, images are uploaded as
//! blobs and embedded, and replies carry explicit parent and root strong refs.

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::config::BlueskyConfig;
use crate::error::{classify_http_status, PlatformError, Result};
use crate::platforms::Platform;
use crate::types::{
    Annotation, AnnotationKind, EncodedImage, MediaLimits, MediaRef, PostDraft, PostRef,
    ReplyShape,
};

/// Bluesky's post length limit in graphemes
pub const BLUESKY_SEGMENT_LIMIT: usize = 300;
pub const BLUESKY_MAX_IMAGES: usize = 4;
pub const BLUESKY_MAX_IMAGE_BYTES: u64 = 1_000_000;

const POST_COLLECTION: &str = "app.bsky.feed.post";

/// Map a transport-level reqwest failure to PlatformError
fn map_request_error(error: reqwest::Error, context: &str) -> PlatformError {
    if error.is_timeout() || error.is_connect() {
        return PlatformError::Network(format!(
            "Network error while connecting to Bluesky PDS during {}: {}. Check your internet connection and PDS availability.",
            context, error
        ));
    }
    PlatformError::Network(format!("Bluesky request failed during {}: {}", context, error))
}

/// Turn a non-success XRPC response into PlatformError
///
/// The XRPC error body (`{"error": "...", "message": "..."}`) is preserved
/// in the message so AT Protocol error codes stay visible.
async fn map_xrpc_failure(
    response: reqwest::Response,
    context: &str,
    fallback: fn(String) -> PlatformError,
) -> PlatformError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    let detail = serde_json::from_str::<XrpcError>(&body)
        .map(|e| match e.message {
            Some(message) => format!("{}: {}", e.error, message),
            None => e.error,
        })
        .unwrap_or(body);

    classify_http_status(
        status,
        format!("Bluesky {} failed ({}): {}", context, status, detail),
        fallback,
    )
}

#[derive(Debug, Deserialize)]
struct XrpcError {
    error: String,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionResponse {
    access_jwt: String,
    did: String,
}

#[derive(Debug, Deserialize)]
struct ResolveHandleResponse {
    did: String,
}

#[derive(Debug, Deserialize)]
struct UploadBlobResponse {
    blob: Value,
}

#[derive(Debug, Deserialize)]
struct CreateRecordResponse {
    uri: String,
    cid: String,
}

struct Session {
    access_jwt: SecretString,
    did: String,
}

/// Facet as stored in an `app.bsky.feed.post` record
#[derive(Debug, Serialize, PartialEq)]
pub struct Facet {
    pub index: ByteSlice,
    pub features: Vec<FacetFeature>,
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ByteSlice {
    pub byte_start: usize,
    pub byte_end: usize,
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(tag = "$type")]
pub enum FacetFeature {
    #[serde(rename = "app.bsky.richtext.facet#link")]
    Link { uri: String },
    #[serde(rename = "app.bsky.richtext.facet#tag")]
    Tag { tag: String },
    #[serde(rename = "app.bsky.richtext.facet#mention")]
    Mention { did: String },
}

impl From<&Annotation> for Facet {
    fn from(annotation: &Annotation) -> Self {
        let feature = match &annotation.kind {
            AnnotationKind::Hashtag(tag) => FacetFeature::Tag { tag: tag.clone() },
            AnnotationKind::Mention(did) => FacetFeature::Mention { did: did.clone() },
            AnnotationKind::Link(uri) => FacetFeature::Link { uri: uri.clone() },
        };
        Facet {
            index: ByteSlice {
                byte_start: annotation.byte_start,
                byte_end: annotation.byte_end,
            },
            features: vec![feature],
        }
    }
}

fn strong_ref(post: &PostRef) -> Result<Value> {
    let cid = post.cid.as_ref().ok_or_else(|| {
        PlatformError::Posting(format!("Reply target {} has no CID", post.id))
    })?;
    Ok(json!({ "uri": post.id, "cid": cid }))
}

/// Build the `app.bsky.feed.post` record for a draft
///
/// Optional fields are left out entirely when empty.
pub fn build_post_record(draft: &PostDraft, created_at: &str) -> Result<Value> {
    let mut record = json!({
        "$type": POST_COLLECTION,
        "text": draft.text,
        "createdAt": created_at,
    });

    if let Some(annotations) = draft.annotations.as_ref().filter(|a| !a.is_empty()) {
        let facets: Vec<Facet> = annotations.iter().map(Facet::from).collect();
        record["facets"] = serde_json::to_value(facets)
            .map_err(|e| PlatformError::Posting(format!("Failed to encode facets: {}", e)))?;
    }

    if !draft.media.is_empty() {
        let images: Vec<Value> = draft
            .media
            .iter()
            .map(|m| -> Result<Value> {
                let blob = m.payload.clone().ok_or_else(|| {
                    PlatformError::Posting(format!("Media {} has no blob reference", m.id))
                })?;
                Ok(json!({ "alt": "", "image": blob }))
            })
            .collect::<Result<_>>()?;
        record["embed"] = json!({
            "$type": "app.bsky.embed.images",
            "images": images,
        });
    }

    if let Some(reply) = &draft.reply {
        let parent = strong_ref(&reply.parent)?;
        // A Bluesky reply always names its thread root; the parent is the
        // root for the first reply
        let root = match &reply.root {
            Some(root) => strong_ref(root)?,
            None => parent.clone(),
        };
        record["reply"] = json!({ "parent": parent, "root": root });
    }

    Ok(record)
}

pub struct BlueskyClient {
    http: reqwest::Client,
    service: String,
    handle: String,
    app_password: SecretString,
    max_image_bytes: u64,
    session: Option<Session>,
}

impl BlueskyClient {
    /// Create a new Bluesky client
    ///
    /// # Arguments
    ///
    /// * `service` - PDS base URL (e.g., "https://bsky.social")
    /// * `handle` - The Bluesky handle (e.g., "user.bsky.social")
    /// * `app_password` - The app password for authentication
    pub fn new(service: String, handle: String, app_password: String) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("crosspost/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| PlatformError::Network(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            service: service.trim_end_matches('/').to_string(),
            handle,
            app_password: SecretString::from(app_password),
            max_image_bytes: BLUESKY_MAX_IMAGE_BYTES,
            session: None,
        })
    }

    /// Override the per-image byte ceiling
    pub fn with_max_image_bytes(mut self, max_image_bytes: u64) -> Self {
        self.max_image_bytes = max_image_bytes;
        self
    }

    /// Create a client from configuration, reading the app password file
    pub fn from_config(config: &BlueskyConfig) -> Result<Self> {
        let password_path = config.expand_password_file_path()?;
        let password = std::fs::read_to_string(&password_path)
            .map_err(|e| {
                PlatformError::Authentication(format!(
                    "Failed to read Bluesky password file {}: {}",
                    password_path.display(),
                    e
                ))
            })?
            .trim()
            .to_string();

        if password.is_empty() {
            return Err(PlatformError::Authentication(
                "Bluesky password file is empty".to_string(),
            )
            .into());
        }

        Self::new(config.service.clone(), config.handle.clone(), password)
    }

    fn xrpc_url(&self, method: &str) -> String {
        format!("{}/xrpc/{}", self.service, method)
    }

    fn session(&self) -> Result<&Session> {
        self.session
            .as_ref()
            .ok_or_else(|| PlatformError::Authentication("Not authenticated".to_string()).into())
    }
}

#[async_trait]
impl Platform for BlueskyClient {
    fn name(&self) -> &str {
        "bluesky"
    }

    fn segment_limit(&self) -> usize {
        BLUESKY_SEGMENT_LIMIT
    }

    fn supports_annotations(&self) -> bool {
        true
    }

    fn media_limits(&self) -> MediaLimits {
        MediaLimits {
            max_count: Some(BLUESKY_MAX_IMAGES),
            max_bytes: self.max_image_bytes,
        }
    }

    fn reply_shape(&self) -> ReplyShape {
        ReplyShape::ParentAndRoot
    }

    async fn authenticate(&mut self) -> Result<()> {
        tracing::debug!("Creating Bluesky session for handle: {}", self.handle);

        let response = self
            .http
            .post(self.xrpc_url("com.atproto.server.createSession"))
            .json(&json!({
                "identifier": self.handle,
                "password": self.app_password.expose_secret(),
            }))
            .send()
            .await
            .map_err(|e| map_request_error(e, "authentication"))?;

        if !response.status().is_success() {
            // The PDS answers bad credentials with 400 or 401
            let err = match map_xrpc_failure(response, "authentication", PlatformError::Authentication)
                .await
            {
                PlatformError::Validation(msg) => PlatformError::Authentication(msg),
                other => other,
            };
            return Err(err.into());
        }

        let session: SessionResponse = response.json().await.map_err(|e| {
            PlatformError::Authentication(format!("Malformed Bluesky session response: {}", e))
        })?;

        tracing::debug!("Bluesky session created for {}", session.did);
        self.session = Some(Session {
            access_jwt: SecretString::from(session.access_jwt),
            did: session.did,
        });
        Ok(())
    }

    async fn resolve_identity(&self, handle: &str) -> Result<String> {
        let response = self
            .http
            .get(self.xrpc_url("com.atproto.identity.resolveHandle"))
            .query(&[("handle", handle)])
            .send()
            .await
            .map_err(|e| map_request_error(e, "handle resolution"))?;

        if !response.status().is_success() {
            return Err(map_xrpc_failure(
                response,
                "handle resolution",
                PlatformError::IdentityResolution,
            )
            .await
            .into());
        }

        let resolved: ResolveHandleResponse = response.json().await.map_err(|e| {
            PlatformError::IdentityResolution(format!("Malformed resolveHandle response: {}", e))
        })?;
        Ok(resolved.did)
    }

    async fn upload_media(&self, image: &EncodedImage) -> Result<MediaRef> {
        let session = self.session()?;

        let response = self
            .http
            .post(self.xrpc_url("com.atproto.repo.uploadBlob"))
            .bearer_auth(session.access_jwt.expose_secret())
            .header(reqwest::header::CONTENT_TYPE, image.mime_type.as_str())
            .body(image.bytes.clone())
            .send()
            .await
            .map_err(|e| map_request_error(e, "blob upload"))?;

        if !response.status().is_success() {
            return Err(
                map_xrpc_failure(response, "blob upload", PlatformError::MediaUpload)
                    .await
                    .into(),
            );
        }

        let uploaded: UploadBlobResponse = response.json().await.map_err(|e| {
            PlatformError::MediaUpload(format!("Malformed uploadBlob response: {}", e))
        })?;

        let id = uploaded.blob["ref"]["$link"]
            .as_str()
            .unwrap_or_default()
            .to_string();
        Ok(MediaRef {
            id,
            payload: Some(uploaded.blob),
        })
    }

    async fn create_post(&self, draft: &PostDraft) -> Result<PostRef> {
        let session = self.session()?;

        let created_at = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
        let record = build_post_record(draft, &created_at)?;

        tracing::debug!(
            "Posting to Bluesky: {} bytes, reply: {}",
            draft.text.len(),
            draft.reply.is_some()
        );

        let response = self
            .http
            .post(self.xrpc_url("com.atproto.repo.createRecord"))
            .bearer_auth(session.access_jwt.expose_secret())
            .json(&json!({
                "repo": session.did,
                "collection": POST_COLLECTION,
                "record": record,
            }))
            .send()
            .await
            .map_err(|e| map_request_error(e, "posting"))?;

        if !response.status().is_success() {
            return Err(map_xrpc_failure(response, "posting", PlatformError::Posting)
                .await
                .into());
        }

        let created: CreateRecordResponse = response.json().await.map_err(|e| {
            PlatformError::Posting(format!("Malformed createRecord response: {}", e))
        })?;

        tracing::debug!("Posted to Bluesky: {}", created.uri);
        Ok(PostRef::with_cid(created.uri, created.cid))
    }
}
