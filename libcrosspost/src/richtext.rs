//! Rich-text annotation of segment text
//!
//! Hashtags, mentions and links are located with a single left-to-right scan.
//! Offsets are UTF-8 byte positions, which is what facet-based platforms
//! index by.

use std::ops::Range;
use std::sync::OnceLock;

use regex::Regex;
use tracing::{debug, warn};

use crate::platforms::Platform;
use crate::types::{Annotation, AnnotationKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Hashtag,
    Mention,
    Link,
}

/// A raw match before any identity lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token<'a> {
    pub kind: TokenKind,
    /// Byte span of the token including its `#`/`@` sigil
    pub span: Range<usize>,
    /// Token text without the sigil (full URI for links)
    pub value: &'a str,
}

fn token_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"https?://\S+|@[\w.-]+|#\w+").expect("token pattern is a valid regex")
    })
}

/// Find every hashtag, mention and link in `text`, in order of appearance
pub fn scan(text: &str) -> Vec<Token<'_>> {
    token_pattern()
        .find_iter(text)
        .filter_map(|m| {
            let matched = m.as_str();
            if let Some(tag) = matched.strip_prefix('#') {
                Some(Token {
                    kind: TokenKind::Hashtag,
                    span: m.range(),
                    value: tag,
                })
            } else if let Some(handle) = matched.strip_prefix('@') {
                // "@alice." at the end of a sentence
                let handle = handle.trim_end_matches('.');
                if handle.is_empty() {
                    return None;
                }
                Some(Token {
                    kind: TokenKind::Mention,
                    span: m.start()..m.start() + 1 + handle.len(),
                    value: handle,
                })
            } else {
                Some(Token {
                    kind: TokenKind::Link,
                    span: m.range(),
                    value: matched,
                })
            }
        })
        .collect()
}

/// Annotate `text`, resolving mentions through `platform`
///
/// A mention whose handle cannot be resolved is left out of the result; the
/// failure is logged and never returned.
pub async fn annotate<P: Platform + ?Sized>(text: &str, platform: &P) -> Vec<Annotation> {
    let mut annotations = Vec::new();

    for token in scan(text) {
        let kind = match token.kind {
            TokenKind::Hashtag => AnnotationKind::Hashtag(token.value.to_string()),
            TokenKind::Link => AnnotationKind::Link(token.value.to_string()),
            TokenKind::Mention => match platform.resolve_identity(token.value).await {
                Ok(identity) => {
                    debug!("Resolved @{} to {}", token.value, identity);
                    AnnotationKind::Mention(identity)
                }
                Err(e) => {
                    warn!(
                        "Dropping mention @{} on {}: {}",
                        token.value,
                        platform.name(),
                        e
                    );
                    continue;
                }
            },
        };

        annotations.push(Annotation {
            byte_start: token.span.start,
            byte_end: token.span.end,
            kind,
        });
    }

    annotations
}
