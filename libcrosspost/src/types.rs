//! Core types for Crosspost

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{CrosspostError, Result};

/// A message accepted for delivery: text plus zero or more images
#[derive(Debug, Clone)]
pub struct Message {
    text: String,
    images: Vec<ImageAsset>,
}

impl Message {
    /// Rejects text that is empty or whitespace only
    pub fn new(text: impl Into<String>, images: Vec<ImageAsset>) -> Result<Self> {
        let text = text.into();
        if text.trim().is_empty() {
            return Err(CrosspostError::InvalidInput(
                "Message cannot be empty".to_string(),
            ));
        }
        Ok(Self { text, images })
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn images(&self) -> &[ImageAsset] {
        &self.images
    }
}

/// One length-bounded piece of a message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    /// 1-based position in the thread
    pub index: usize,
    pub total: usize,
    /// Full text as posted, page marker included
    pub text: String,
    /// Byte offset where the message body starts inside `text`
    pub body_start: usize,
    pub annotations: Vec<Annotation>,
}

impl Segment {
    /// The slice of the original message carried by this segment
    pub fn body(&self) -> &str {
        &self.text[self.body_start..]
    }

    pub fn is_root(&self) -> bool {
        self.index == 1
    }
}

/// A rich-text marker addressed by UTF-8 byte offsets into a segment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Annotation {
    pub byte_start: usize,
    pub byte_end: usize,
    pub kind: AnnotationKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnnotationKind {
    /// Tag text without the leading `#`
    Hashtag(String),
    /// Resolved backend identity (e.g. a DID)
    Mention(String),
    Link(String),
}

/// Supported image MIME types
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ImageMimeType {
    Jpeg,
    Png,
    Gif,
    WebP,
    Bmp,
}

impl ImageMimeType {
    /// Detect MIME type from file extension
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "jpg" | "jpeg" => Some(Self::Jpeg),
            "png" => Some(Self::Png),
            "gif" => Some(Self::Gif),
            "webp" => Some(Self::WebP),
            "bmp" => Some(Self::Bmp),
            _ => None,
        }
    }

    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(Self::from_extension)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
            Self::Gif => "image/gif",
            Self::WebP => "image/webp",
            Self::Bmp => "image/bmp",
        }
    }
}

impl std::fmt::Display for ImageMimeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An input image as supplied by the user
#[derive(Debug, Clone)]
pub struct ImageAsset {
    pub path: PathBuf,
    pub bytes: Vec<u8>,
}

impl ImageAsset {
    pub fn new(path: impl Into<PathBuf>, bytes: Vec<u8>) -> Self {
        Self {
            path: path.into(),
            bytes,
        }
    }

    /// Read an image file from disk
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if ImageMimeType::from_path(path).is_none() {
            return Err(CrosspostError::InvalidInput(format!(
                "Unsupported image type: {}",
                path.display()
            )));
        }
        let bytes = std::fs::read(path).map_err(|e| {
            CrosspostError::InvalidInput(format!("Cannot read image {}: {}", path.display(), e))
        })?;
        Ok(Self::new(path, bytes))
    }

    pub fn display_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string())
    }
}

/// Transcoder output, guaranteed to fit the ceiling it was produced for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedImage {
    pub bytes: Vec<u8>,
    pub mime_type: ImageMimeType,
    pub quality: u8,
}

impl EncodedImage {
    pub fn len(&self) -> u64 {
        self.bytes.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Reference to uploaded media, opaque outside the issuing platform
#[derive(Debug, Clone, PartialEq)]
pub struct MediaRef {
    pub id: String,
    /// Platform payload that must be echoed back when attaching (Bluesky blob)
    pub payload: Option<serde_json::Value>,
}

/// Backend-issued identifier of a created post
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostRef {
    /// Status id (Mastodon) or AT URI (Bluesky)
    pub id: String,
    /// Content hash, for platforms that address records by URI + CID
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cid: Option<String>,
}

impl PostRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            cid: None,
        }
    }

    pub fn with_cid(id: impl Into<String>, cid: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            cid: Some(cid.into()),
        }
    }
}

/// How a platform links a reply back into its thread
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReplyShape {
    /// Explicit parent and thread root on every reply
    ParentAndRoot,
    /// Only the immediate parent is referenced
    ParentOnly,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyTarget {
    pub parent: PostRef,
    /// Present only for `ReplyShape::ParentAndRoot` platforms
    pub root: Option<PostRef>,
}

/// Everything a platform needs to create one post
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PostDraft {
    pub text: String,
    pub media: Vec<MediaRef>,
    /// `None` means the field is omitted, never an empty list
    pub annotations: Option<Vec<Annotation>>,
    pub reply: Option<ReplyTarget>,
}

/// Media constraints of a platform
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MediaLimits {
    pub max_count: Option<usize>,
    pub max_bytes: u64,
}

/// Posts created while delivering one message to one platform, in order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Thread {
    pub posts: Vec<PostRef>,
}

impl Thread {
    pub fn root(&self) -> Option<&PostRef> {
        self.posts.first()
    }

    pub fn len(&self) -> usize {
        self.posts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.posts.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_rejects_blank_text() {
        assert!(matches!(
            Message::new("   \n", vec![]),
            Err(CrosspostError::InvalidInput(_))
        ));
        assert!(Message::new("hi", vec![]).is_ok());
    }

    #[test]
    fn test_segment_body_skips_marker() {
        let segment = Segment {
            index: 2,
            total: 3,
            text: "(2/3) héllo".to_string(),
            body_start: 6,
            annotations: vec![],
        };
        assert_eq!(segment.body(), "héllo");
        assert!(!segment.is_root());
    }

    #[test]
    fn test_mime_type_from_path() {
        assert_eq!(
            ImageMimeType::from_path(Path::new("cat.JPG")),
            Some(ImageMimeType::Jpeg)
        );
        assert_eq!(ImageMimeType::from_path(Path::new("notes.txt")), None);
        assert_eq!(ImageMimeType::WebP.as_str(), "image/webp");
    }

    #[test]
    fn test_image_asset_load_rejects_unknown_extension() {
        let result = ImageAsset::load("/tmp/definitely-not-an-image.txt");
        assert!(matches!(result, Err(CrosspostError::InvalidInput(_))));
    }

    #[test]
    fn test_image_asset_load_missing_file() {
        let result = ImageAsset::load("/nonexistent/dir/photo.png");
        match result {
            Err(CrosspostError::InvalidInput(msg)) => assert!(msg.contains("Cannot read image")),
            other => panic!("Expected invalid input, got {:?}", other),
        }
    }

    #[test]
    fn test_thread_root_is_first_post() {
        let thread = Thread {
            posts: vec![PostRef::new("1"), PostRef::new("2")],
        };
        assert_eq!(thread.root(), Some(&PostRef::new("1")));
        assert_eq!(thread.len(), 2);
        assert!(Thread::default().root().is_none());
    }
}
