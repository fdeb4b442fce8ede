//! Thread delivery across platforms
//!
//! For every platform the same sequence runs: log in, cut the message into
//! segments that fit the platform, annotate each segment when the platform
//! supports rich text, transcode and upload images for the first segment
//! only, post the first segment, then post the rest as replies. Platforms are
//! independent and delivered concurrently; within one platform every step
//! waits for the previous one, since each reply needs the reference issued
//! for the post before it.

use futures::future::join_all;
use tracing::{info, warn};

use crate::config::{Config, DeliveryConfig};
use crate::error::{ConfigError, CrosspostError, PlatformError, Result};
use crate::media::{transcode, TranscodeOptions};
use crate::platforms::{bluesky::BlueskyClient, mastodon::MastodonClient, Platform};
use crate::richtext::annotate;
use crate::segment::segment_with_reserve;
use crate::types::{ImageAsset, MediaRef, Message, PostDraft, ReplyShape, ReplyTarget, Thread};

/// Platforms this build knows how to create from configuration
pub const KNOWN_PLATFORMS: [&str; 2] = ["bluesky", "mastodon"];

/// Step of a delivery at which it stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryStage {
    Authenticate,
    Segment,
    PostRoot,
    PostReply,
}

impl std::fmt::Display for DeliveryStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeliveryStage::Authenticate => write!(f, "authenticate"),
            DeliveryStage::Segment => write!(f, "segment"),
            DeliveryStage::PostRoot => write!(f, "post root"),
            DeliveryStage::PostReply => write!(f, "post reply"),
        }
    }
}

#[derive(Debug)]
pub struct DeliveryFailure {
    pub stage: DeliveryStage,
    /// 1-based segment whose creation failed
    pub segment: Option<usize>,
    pub error: CrosspostError,
}

/// An image left out of the root post, and why
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedImage {
    pub name: String,
    pub reason: String,
}

/// Outcome of delivering one message to one platform
#[derive(Debug)]
pub struct DeliveryReport {
    pub platform: String,
    /// Number of segments the message was cut into
    pub segments: usize,
    pub thread: Thread,
    pub images_attached: usize,
    pub images_skipped: Vec<SkippedImage>,
    pub failure: Option<DeliveryFailure>,
}

impl DeliveryReport {
    fn new(platform: impl Into<String>) -> Self {
        Self {
            platform: platform.into(),
            segments: 0,
            thread: Thread::default(),
            images_attached: 0,
            images_skipped: Vec::new(),
            failure: None,
        }
    }

    /// Report for a platform that could not even be set up
    pub fn unavailable(platform: impl Into<String>, error: CrosspostError) -> Self {
        let mut report = Self::new(platform);
        report.fail(DeliveryStage::Authenticate, None, error);
        report
    }

    fn fail(&mut self, stage: DeliveryStage, segment: Option<usize>, error: CrosspostError) {
        self.failure = Some(DeliveryFailure {
            stage,
            segment,
            error,
        });
    }

    /// Every segment was posted
    pub fn is_success(&self) -> bool {
        self.failure.is_none()
    }

    pub fn exit_code(&self) -> i32 {
        self.failure
            .as_ref()
            .map(|f| f.error.exit_code())
            .unwrap_or(0)
    }
}

/// Drives message delivery; holds only immutable tuning
#[derive(Debug, Clone, Default)]
pub struct Orchestrator {
    delivery: DeliveryConfig,
}

impl Orchestrator {
    pub fn new(delivery: DeliveryConfig) -> Self {
        Self { delivery }
    }

    /// Deliver `message` to every platform concurrently
    ///
    /// Reports are returned in the same order as `platforms`.
    pub async fn deliver_all(
        &self,
        platforms: &mut [Box<dyn Platform>],
        message: &Message,
    ) -> Vec<DeliveryReport> {
        let deliveries = platforms
            .iter_mut()
            .map(|platform| self.deliver(platform.as_mut(), message));
        join_all(deliveries).await
    }

    /// Log in to `platform` and deliver `message` as a thread
    ///
    /// Never fails as a whole: what was created and where it stopped are both
    /// in the returned report.
    pub async fn deliver(&self, platform: &mut dyn Platform, message: &Message) -> DeliveryReport {
        let mut report = DeliveryReport::new(platform.name());

        if let Err(e) = platform.authenticate().await {
            warn!("{}: login failed: {}", report.platform, e);
            report.fail(DeliveryStage::Authenticate, None, e);
            return report;
        }
        info!("{}: logged in", report.platform);

        self.publish(&*platform, message, &mut report).await;
        report
    }

    async fn publish(&self, platform: &dyn Platform, message: &Message, report: &mut DeliveryReport) {
        let name = platform.name();
        let segments = match segment_with_reserve(
            message.text(),
            platform.segment_limit(),
            self.delivery.page_reserve,
        ) {
            Ok(segments) => segments,
            Err(e) => {
                warn!("{}: cannot segment message: {}", name, e);
                report.fail(DeliveryStage::Segment, None, e);
                return;
            }
        };
        report.segments = segments.len();
        info!(
            "{}: message split into {} segment(s) of at most {} characters",
            name,
            segments.len(),
            platform.segment_limit()
        );

        for mut segment in segments {
            if platform.supports_annotations() {
                segment.annotations = annotate(&segment.text, platform).await;
                if !segment.annotations.is_empty() {
                    info!(
                        "{}: segment {} carries {} annotation(s)",
                        name,
                        segment.index,
                        segment.annotations.len()
                    );
                }
            }

            let media = if segment.is_root() {
                self.prepare_media(platform, message.images(), report).await
            } else {
                Vec::new()
            };

            let reply = match (report.thread.root(), report.thread.posts.last()) {
                (Some(root), Some(parent)) => Some(ReplyTarget {
                    parent: parent.clone(),
                    root: match platform.reply_shape() {
                        ReplyShape::ParentAndRoot => Some(root.clone()),
                        ReplyShape::ParentOnly => None,
                    },
                }),
                _ => None,
            };

            let draft = PostDraft {
                text: segment.text,
                media,
                annotations: (!segment.annotations.is_empty()).then_some(segment.annotations),
                reply,
            };

            match platform.create_post(&draft).await {
                Ok(post) => {
                    info!(
                        "{}: posted segment {}/{}: {}",
                        name, segment.index, segment.total, post.id
                    );
                    report.thread.posts.push(post);
                }
                Err(e) => {
                    let stage = if segment.index == 1 {
                        DeliveryStage::PostRoot
                    } else {
                        DeliveryStage::PostReply
                    };
                    warn!(
                        "{}: segment {}/{} failed, {} post(s) remain live: {}",
                        name,
                        segment.index,
                        segment.total,
                        report.thread.len(),
                        e
                    );
                    report.fail(stage, Some(segment.index), e);
                    return;
                }
            }
        }
    }

    /// Transcode and upload the images for a root post
    ///
    /// An image that cannot be transcoded or uploaded is skipped; the post
    /// goes out with whatever did succeed.
    async fn prepare_media(
        &self,
        platform: &dyn Platform,
        images: &[ImageAsset],
        report: &mut DeliveryReport,
    ) -> Vec<MediaRef> {
        let name = platform.name();
        let limits = platform.media_limits();
        let options = TranscodeOptions::from(&self.delivery);

        let allowed = limits.max_count.unwrap_or(images.len()).min(images.len());
        for extra in &images[allowed..] {
            warn!(
                "{}: skipping {}, at most {} image(s) per post",
                name,
                extra.display_name(),
                allowed
            );
            report.images_skipped.push(SkippedImage {
                name: extra.display_name(),
                reason: format!("at most {} image(s) per post", allowed),
            });
        }

        let mut media = Vec::new();
        for asset in &images[..allowed] {
            let encoded = match transcode(&asset.bytes, limits.max_bytes, &options) {
                Ok(encoded) => encoded,
                Err(e) => {
                    warn!("{}: skipping {}: {}", name, asset.display_name(), e);
                    report.images_skipped.push(SkippedImage {
                        name: asset.display_name(),
                        reason: e.to_string(),
                    });
                    continue;
                }
            };
            info!(
                "{}: transcoded {} to {} bytes at quality {}",
                name,
                asset.display_name(),
                encoded.len(),
                encoded.quality
            );

            match platform.upload_media(&encoded).await {
                Ok(media_ref) => {
                    info!("{}: uploaded {}", name, asset.display_name());
                    media.push(media_ref);
                }
                Err(e) => {
                    warn!("{}: upload of {} failed: {}", name, asset.display_name(), e);
                    report.images_skipped.push(SkippedImage {
                        name: asset.display_name(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        report.images_attached = media.len();
        media
    }
}

/// Decide which platforms to deliver to
///
/// Falls back to `[defaults] platforms` when nothing was requested. Names
/// are lowercased and deduplicated, keeping first-seen order.
pub fn select_platforms(config: &Config, requested: &[String]) -> Result<Vec<String>> {
    let source = if requested.is_empty() {
        &config.defaults.platforms
    } else {
        requested
    };

    let mut selected: Vec<String> = Vec::new();
    for name in source {
        let name = name.trim().to_lowercase();
        if name.is_empty() || selected.contains(&name) {
            continue;
        }
        if !KNOWN_PLATFORMS.contains(&name.as_str()) {
            return Err(CrosspostError::InvalidInput(format!(
                "Unknown platform '{}'. Valid platforms: {}",
                name,
                KNOWN_PLATFORMS.join(", ")
            )));
        }
        selected.push(name);
    }

    if selected.is_empty() {
        return Err(CrosspostError::InvalidInput(
            "No platform selected. Use --bluesky and/or --mastodon, or set [defaults] platforms"
                .to_string(),
        ));
    }
    Ok(selected)
}

/// Platform clients ready for delivery, plus the ones that could not be built
pub struct PlatformSet {
    pub platforms: Vec<Box<dyn Platform>>,
    pub unavailable: Vec<DeliveryReport>,
}

/// Build platform clients for the selected names
///
/// A missing or disabled config section aborts everything; a credential
/// problem only takes out that platform.
pub fn create_platforms(config: &Config, selected: &[String]) -> Result<PlatformSet> {
    let mut set = PlatformSet {
        platforms: Vec::new(),
        unavailable: Vec::new(),
    };

    for name in selected {
        let built: Result<Box<dyn Platform>> = match name.as_str() {
            "bluesky" => {
                let bluesky = config
                    .bluesky
                    .as_ref()
                    .filter(|c| c.enabled)
                    .ok_or_else(|| ConfigError::MissingField("[bluesky] section".to_string()))?;
                info!("Creating Bluesky platform client for {}", bluesky.handle);
                BlueskyClient::from_config(bluesky).map(|client| {
                    Box::new(client.with_max_image_bytes(config.delivery.max_image_bytes))
                        as Box<dyn Platform>
                })
            }
            "mastodon" => {
                let mastodon = config
                    .mastodon
                    .as_ref()
                    .filter(|c| c.enabled)
                    .ok_or_else(|| ConfigError::MissingField("[mastodon] section".to_string()))?;
                info!("Creating Mastodon platform client for {}", mastodon.instance);
                MastodonClient::from_config(mastodon)
                    .map(|client| Box::new(client) as Box<dyn Platform>)
            }
            other => Err(PlatformError::Validation(format!("Unsupported platform {}", other)).into()),
        };

        match built {
            Ok(platform) => set.platforms.push(platform),
            Err(e) => {
                warn!("{}: unavailable: {}", name, e);
                set.unavailable.push(DeliveryReport::unavailable(name.clone(), e));
            }
        }
    }

    Ok(set)
}
