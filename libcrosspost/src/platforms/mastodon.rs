//! Mastodon platform implementation
//!
//! Uses the megalodon library, so any server speaking the Mastodon API
//! (Mastodon, Pleroma, Akkoma, GoToSocial, ...) works. Mastodon parses
//! hashtags, mentions and links out of the status text itself, so posts are
//! sent as plain text and replies only reference their immediate parent.

use std::io::Cursor;

use async_trait::async_trait;
use megalodon::megalodon::{PostStatusInputOptions, PostStatusOutput};
use megalodon::{Megalodon, SNS};

use crate::config::MastodonConfig;
use crate::error::{classify_http_status, PlatformError, Result};
use crate::platforms::Platform;
use crate::types::{EncodedImage, MediaLimits, MediaRef, PostDraft, PostRef, ReplyShape};

/// Limit used until the instance reports its own
pub const MASTODON_DEFAULT_LIMIT: usize = 500;

pub struct MastodonClient {
    client: Box<dyn Megalodon + Send + Sync>,
    instance_url: String,
    character_limit: usize,
    /// Set when the limit comes from configuration and must not be replaced
    limit_pinned: bool,
    max_image_bytes: u64,
}

impl MastodonClient {
    /// Create a new Mastodon client
    ///
    /// # Arguments
    ///
    /// * `instance_url` - The base URL of the instance (e.g., "https://mastodon.social")
    /// * `access_token` - OAuth access token
    pub fn new(instance_url: String, access_token: String) -> Result<Self> {
        let client = megalodon::generator(
            SNS::Mastodon,
            instance_url.clone(),
            Some(access_token),
            Some(concat!("crosspost/", env!("CARGO_PKG_VERSION")).to_string()),
        )
        .map_err(|e| {
            PlatformError::Authentication(format!("Failed to create Mastodon client: {:?}", e))
        })?;

        Ok(Self {
            client,
            instance_url,
            character_limit: MASTODON_DEFAULT_LIMIT,
            limit_pinned: false,
            max_image_bytes: 8 * 1024 * 1024,
        })
    }

    /// Create a Mastodon client from configuration
    ///
    /// # Errors
    ///
    /// Returns `PlatformError::Authentication` if the token file cannot be
    /// read or is empty.
    pub fn from_config(config: &MastodonConfig) -> Result<Self> {
        let token_path = config.expand_token_file_path()?;

        let token = std::fs::read_to_string(&token_path)
            .map_err(|e| {
                PlatformError::Authentication(format!(
                    "Failed to read Mastodon token file {}: {}",
                    token_path.display(),
                    e
                ))
            })?
            .trim()
            .to_string();

        if token.is_empty() {
            return Err(
                PlatformError::Authentication("Mastodon token file is empty".to_string()).into(),
            );
        }

        let mut client = Self::new(config.instance_url(), token)?;
        client.max_image_bytes = config.max_image_bytes;
        if let Some(limit) = config.character_limit {
            client.character_limit = limit;
            client.limit_pinned = true;
        }
        Ok(client)
    }

    pub fn instance_url(&self) -> &str {
        &self.instance_url
    }

    /// Refresh the character limit from the instance metadata
    async fn fetch_instance_info(&mut self) -> Result<()> {
        let response = self
            .client
            .get_instance()
            .await
            .map_err(|e| map_megalodon_error(e, "fetch instance info", PlatformError::Network))?;

        let limit = response.json.configuration.statuses.max_characters as usize;
        if limit > 0 {
            self.character_limit = limit;
        }
        Ok(())
    }
}

#[async_trait]
impl Platform for MastodonClient {
    fn name(&self) -> &str {
        "mastodon"
    }

    fn segment_limit(&self) -> usize {
        self.character_limit
    }

    fn supports_annotations(&self) -> bool {
        false
    }

    fn media_limits(&self) -> MediaLimits {
        MediaLimits {
            max_count: None,
            max_bytes: self.max_image_bytes,
        }
    }

    fn reply_shape(&self) -> ReplyShape {
        ReplyShape::ParentOnly
    }

    async fn authenticate(&mut self) -> Result<()> {
        self.client
            .verify_account_credentials()
            .await
            .map_err(|e| map_megalodon_error(e, "authenticate", PlatformError::Authentication))?;

        if !self.limit_pinned {
            if let Err(e) = self.fetch_instance_info().await {
                tracing::warn!(
                    "Could not read character limit from {}, using {}: {}",
                    self.instance_url,
                    self.character_limit,
                    e
                );
            }
        }
        tracing::debug!(
            "Mastodon session ready on {} (limit {})",
            self.instance_url,
            self.character_limit
        );
        Ok(())
    }

    async fn resolve_identity(&self, handle: &str) -> Result<String> {
        Err(PlatformError::IdentityResolution(format!(
            "Mastodon links @{} from the status text itself",
            handle
        ))
        .into())
    }

    async fn upload_media(&self, image: &EncodedImage) -> Result<MediaRef> {
        let reader = Box::new(Cursor::new(image.bytes.clone()));
        let response = self
            .client
            .upload_media_reader(reader, None)
            .await
            .map_err(|e| map_megalodon_error(e, "upload media", PlatformError::MediaUpload))?;

        let id = match response.json {
            megalodon::entities::UploadMedia::Attachment(attachment) => attachment.id,
            megalodon::entities::UploadMedia::AsyncAttachment(attachment) => attachment.id,
        };
        Ok(MediaRef { id, payload: None })
    }

    async fn create_post(&self, draft: &PostDraft) -> Result<PostRef> {
        let media_ids: Vec<String> = draft.media.iter().map(|m| m.id.clone()).collect();
        let options = PostStatusInputOptions {
            media_ids: (!media_ids.is_empty()).then_some(media_ids),
            in_reply_to_id: draft.reply.as_ref().map(|r| r.parent.id.clone()),
            ..Default::default()
        };

        let response = self
            .client
            .post_status(draft.text.clone(), Some(&options))
            .await
            .map_err(|e| map_megalodon_error(e, "post status", PlatformError::Posting))?;

        let post_id = match response.json {
            PostStatusOutput::Status(status) => status.id,
            PostStatusOutput::ScheduledStatus(scheduled) => scheduled.id,
        };

        Ok(PostRef::new(post_id))
    }
}

/// Map megalodon errors to PlatformError
///
/// The HTTP status is recovered from the error text when present; `fallback`
/// picks the variant for failures with no recognizable status.
fn map_megalodon_error(
    error: megalodon::error::Error,
    context: &str,
    fallback: fn(String) -> PlatformError,
) -> PlatformError {
    let error_str = error.to_string();
    let message = format!("Mastodon {} failed: {}", context, error_str);

    match extract_http_status(&error_str) {
        Some(status) => classify_http_status(status, message, fallback),
        None => {
            let lower = error_str.to_lowercase();
            if lower.contains("unauthorized") || lower.contains("forbidden") {
                PlatformError::Authentication(message)
            } else if lower.contains("rate limit") || lower.contains("too many requests") {
                PlatformError::RateLimit(message)
            } else if lower.contains("connect") || lower.contains("timed out") {
                PlatformError::Network(message)
            } else {
                fallback(message)
            }
        }
    }
}

/// Extract an HTTP status code from an error message
///
/// Looks for "HTTP 401", "status 403", "code: 422" or a bare three-digit
/// number followed by ':' or ' '.
fn extract_http_status(error_str: &str) -> Option<u16> {
    let valid = |code: u16| (100..=599).contains(&code);

    for prefix in ["HTTP ", "status ", "code: ", "status_code: "] {
        if let Some(pos) = error_str.find(prefix) {
            let code = error_str[pos + prefix.len()..]
                .get(0..3)
                .and_then(|s| s.parse::<u16>().ok());
            if let Some(code) = code.filter(|c| valid(*c)) {
                return Some(code);
            }
        }
    }

    let bytes = error_str.as_bytes();
    for (i, window) in bytes.windows(4).enumerate() {
        let preceded_by_digit = i > 0 && bytes[i - 1].is_ascii_digit();
        if window[..3].iter().all(u8::is_ascii_digit)
            && (window[3] == b':' || window[3] == b' ')
            && !preceded_by_digit
        {
            let code = std::str::from_utf8(&window[..3])
                .ok()
                .and_then(|s| s.parse::<u16>().ok());
            if let Some(code) = code.filter(|c| valid(*c)) {
                return Some(code);
            }
        }
    }

    None
}
