//! Platform abstraction and implementations
//!
//! Each backend a message can be delivered to implements [`Platform`]. The
//! orchestrator in [`crate::poster`] is written once against this trait; the
//! implementations only describe their limits and translate the four remote
//! operations (login, identity lookup, media upload, post creation) into
//! their own API calls.
//!
//! # Examples
//!
//! ```no_run
//! use libcrosspost::platforms::{bluesky::BlueskyClient, Platform};
//!
//! # async fn example() -> libcrosspost::error::Result<()> {
//! let mut platform = BlueskyClient::new(
//!     "https://bsky.social".to_string(),
//!     "alice.bsky.social".to_string(),
//!     "app-password".to_string(),
//! )?;
//!
//! platform.authenticate().await?;
//! println!("{} allows {} graphemes per post", platform.name(), platform.segment_limit());
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{EncodedImage, MediaLimits, MediaRef, PostDraft, PostRef, ReplyShape};

pub mod bluesky;
pub mod mastodon;

// Mock platform is available for all builds (not just tests) to support integration tests
pub mod mock;

/// A posting backend
///
/// All network operations are single-attempt: an implementation returns the
/// first failure it sees and never retries on its own.
#[async_trait]
pub trait Platform: Send + Sync {
    /// Lowercase identifier (e.g. "bluesky", "mastodon")
    fn name(&self) -> &str;

    /// Maximum post length in grapheme clusters
    fn segment_limit(&self) -> usize;

    /// Whether posts carry byte-indexed rich-text annotations
    fn supports_annotations(&self) -> bool;

    fn media_limits(&self) -> MediaLimits;

    fn reply_shape(&self) -> ReplyShape;

    /// Establish a session
    ///
    /// # Errors
    ///
    /// Returns `PlatformError::Authentication` when the credentials are
    /// rejected, `PlatformError::Network` when the service is unreachable.
    async fn authenticate(&mut self) -> Result<()>;

    /// Map a human-readable handle to the platform's stable identity
    async fn resolve_identity(&self, handle: &str) -> Result<String>;

    /// Upload one encoded image, returning a reference to attach to a post
    async fn upload_media(&self, image: &EncodedImage) -> Result<MediaRef>;

    /// Create a post from a fully prepared draft
    async fn create_post(&self, draft: &PostDraft) -> Result<PostRef>;
}
