//! Crosspost - publish one message as a thread on several social networks
//!
//! This library splits a message to fit each platform, annotates hashtags,
//! mentions and links where the platform supports rich text, transcodes
//! images under the platform's size ceiling and posts the result as a
//! reply chain.

pub mod config;
pub mod error;
pub mod logging;
pub mod media;
pub mod platforms;
pub mod poster;
pub mod richtext;
pub mod segment;
pub mod types;

// Re-export commonly used types
pub use config::Config;
pub use error::{ConfigError, CrosspostError, MediaError, PlatformError, Result};
pub use poster::{DeliveryReport, Orchestrator};
pub use types::{
    Annotation, AnnotationKind, EncodedImage, ImageAsset, MediaRef, Message, PostDraft, PostRef,
    ReplyShape, ReplyTarget, Segment, Thread,
};
