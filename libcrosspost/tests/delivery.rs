//! Integration tests for thread delivery
//!
//! These drive the orchestrator end to end against mock platforms: login,
//! segmenting, annotation, media preparation and the reply chain.

use std::collections::HashMap;
use std::io::Cursor;
use std::time::Duration;

use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use libcrosspost::config::DeliveryConfig;
use libcrosspost::platforms::mock::{MockConfig, MockPlatform};
use libcrosspost::platforms::Platform;
use libcrosspost::poster::{DeliveryStage, Orchestrator};
use libcrosspost::types::{AnnotationKind, MediaLimits, ReplyShape};
use libcrosspost::{ImageAsset, Message};

fn png_asset(name: &str, size: u32) -> ImageAsset {
    let img = RgbImage::from_fn(size, size, |x, y| {
        Rgb([(x * 7 % 256) as u8, (y * 13 % 256) as u8, ((x ^ y) % 256) as u8])
    });
    let mut out = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(img)
        .write_to(&mut out, ImageFormat::Png)
        .unwrap();
    ImageAsset::new(name, out.into_inner())
}

/// 50 graphemes; three segments at a limit of 30 with the default reserve
fn three_segment_text() -> String {
    "x".repeat(50)
}

#[tokio::test]
async fn test_thread_replies_reference_parent_and_root() {
    let mut platform = MockPlatform::with_limit("sky", 30);
    let recorder = platform.recorder();
    let message = Message::new(three_segment_text(), vec![]).unwrap();

    let report = Orchestrator::default().deliver(&mut platform, &message).await;

    assert!(report.is_success());
    assert_eq!(report.segments, 3);
    let ids: Vec<&str> = report.thread.posts.iter().map(|p| p.id.as_str()).collect();
    assert_eq!(ids, vec!["sky:post-1", "sky:post-2", "sky:post-3"]);

    let posted = recorder.posted();
    assert!(posted[0].reply.is_none());
    assert!(posted[0].text.starts_with("(1/3) "));

    let second = posted[1].reply.as_ref().unwrap();
    assert_eq!(second.parent.id, "sky:post-1");
    assert_eq!(second.root.as_ref().unwrap().id, "sky:post-1");

    let third = posted[2].reply.as_ref().unwrap();
    assert_eq!(third.parent.id, "sky:post-2");
    assert_eq!(third.parent.cid.as_deref(), Some("cid-2"));
    assert_eq!(third.root.as_ref().unwrap().id, "sky:post-1");
}

#[tokio::test]
async fn test_parent_only_platform_gets_no_root() {
    let mut platform = MockPlatform::new(MockConfig {
        name: "toot".to_string(),
        segment_limit: 30,
        reply_shape: ReplyShape::ParentOnly,
        ..Default::default()
    });
    let recorder = platform.recorder();
    let message = Message::new(three_segment_text(), vec![]).unwrap();

    let report = Orchestrator::default().deliver(&mut platform, &message).await;

    assert!(report.is_success());
    for (i, draft) in recorder.posted().iter().enumerate().skip(1) {
        let reply = draft.reply.as_ref().unwrap();
        assert_eq!(reply.parent.id, format!("toot:post-{}", i));
        assert!(reply.root.is_none());
    }
}

#[tokio::test]
async fn test_failed_reply_halts_thread() {
    let mut platform = MockPlatform::new(MockConfig {
        name: "sky".to_string(),
        segment_limit: 30,
        fail_post_at: Some(2),
        post_error: Some("Server exploded".to_string()),
        ..Default::default()
    });
    let recorder = platform.recorder();
    let message = Message::new(three_segment_text(), vec![]).unwrap();

    let report = Orchestrator::default().deliver(&mut platform, &message).await;

    assert!(!report.is_success());
    assert_eq!(report.exit_code(), 1);
    assert_eq!(report.thread.len(), 1);
    assert_eq!(report.thread.root().unwrap().id, "sky:post-1");

    let failure = report.failure.as_ref().unwrap();
    assert_eq!(failure.stage, DeliveryStage::PostReply);
    assert_eq!(failure.segment, Some(2));
    assert!(failure.error.to_string().contains("Server exploded"));

    // segment 3 is never attempted
    assert_eq!(recorder.post_call_count(), 2);
}

#[tokio::test]
async fn test_failed_root_post_leaves_nothing_live() {
    let mut platform = MockPlatform::post_failure_at("sky", 1, "Rejected");
    let message = Message::new("short", vec![]).unwrap();

    let report = Orchestrator::default().deliver(&mut platform, &message).await;

    let failure = report.failure.as_ref().unwrap();
    assert_eq!(failure.stage, DeliveryStage::PostRoot);
    assert_eq!(failure.segment, Some(1));
    assert!(report.thread.is_empty());
}

#[tokio::test]
async fn test_authentication_failure_stops_before_posting() {
    let mut platform = MockPlatform::auth_failure("sky", "Invalid app password");
    let recorder = platform.recorder();
    let message = Message::new("hello", vec![png_asset("a.png", 8)]).unwrap();

    let report = Orchestrator::default().deliver(&mut platform, &message).await;

    assert_eq!(report.exit_code(), 2);
    let failure = report.failure.as_ref().unwrap();
    assert_eq!(failure.stage, DeliveryStage::Authenticate);
    assert_eq!(failure.segment, None);
    assert_eq!(recorder.upload_call_count(), 0);
    assert_eq!(recorder.post_call_count(), 0);
}

#[tokio::test]
async fn test_media_only_on_root_post() {
    let mut platform = MockPlatform::with_limit("sky", 30);
    let recorder = platform.recorder();
    let message = Message::new(
        three_segment_text(),
        vec![png_asset("a.png", 32), png_asset("b.png", 24)],
    )
    .unwrap();

    let report = Orchestrator::default().deliver(&mut platform, &message).await;

    assert!(report.is_success());
    assert_eq!(report.images_attached, 2);
    let posted = recorder.posted();
    let media_ids: Vec<&str> = posted[0].media.iter().map(|m| m.id.as_str()).collect();
    assert_eq!(media_ids, vec!["sky:media-1", "sky:media-2"]);
    assert!(posted[1].media.is_empty());
    assert!(posted[2].media.is_empty());
    assert!(recorder
        .uploaded_sizes()
        .iter()
        .all(|size| *size <= 1_000_000));
}

#[tokio::test]
async fn test_failed_upload_is_skipped() {
    let mut platform = MockPlatform::new(MockConfig {
        failing_uploads: vec![1],
        ..Default::default()
    });
    let recorder = platform.recorder();
    let message = Message::new(
        "two pictures",
        vec![png_asset("first.png", 16), png_asset("second.png", 16)],
    )
    .unwrap();

    let report = Orchestrator::default().deliver(&mut platform, &message).await;

    assert!(report.is_success());
    assert_eq!(report.images_attached, 1);
    assert_eq!(report.images_skipped.len(), 1);
    assert_eq!(report.images_skipped[0].name, "first.png");
    assert_eq!(recorder.posted()[0].media.len(), 1);
}

#[tokio::test]
async fn test_images_beyond_count_cap_are_skipped() {
    let mut platform = MockPlatform::new(MockConfig {
        media_limits: MediaLimits {
            max_count: Some(1),
            max_bytes: 1_000_000,
        },
        ..Default::default()
    });
    let recorder = platform.recorder();
    let images = vec![
        png_asset("1.png", 8),
        png_asset("2.png", 8),
        png_asset("3.png", 8),
    ];
    let message = Message::new("capped", images).unwrap();

    let report = Orchestrator::default().deliver(&mut platform, &message).await;

    assert!(report.is_success());
    assert_eq!(report.images_attached, 1);
    let skipped: Vec<&str> = report
        .images_skipped
        .iter()
        .map(|s| s.name.as_str())
        .collect();
    assert_eq!(skipped, vec!["2.png", "3.png"]);
    assert_eq!(recorder.upload_call_count(), 1);
}

#[tokio::test]
async fn test_image_that_cannot_fit_is_skipped() {
    let mut platform = MockPlatform::new(MockConfig {
        media_limits: MediaLimits {
            max_count: None,
            max_bytes: 50,
        },
        ..Default::default()
    });
    let recorder = platform.recorder();
    let message = Message::new("too big", vec![png_asset("huge.png", 64)]).unwrap();

    let report = Orchestrator::default().deliver(&mut platform, &message).await;

    assert!(report.is_success());
    assert_eq!(report.images_attached, 0);
    assert_eq!(report.images_skipped.len(), 1);
    assert_eq!(recorder.upload_call_count(), 0);
    assert!(recorder.posted()[0].media.is_empty());
}

#[tokio::test]
async fn test_unresolvable_mentions_are_dropped() {
    let mut identities = HashMap::new();
    identities.insert("alice.test".to_string(), "did:plc:alice".to_string());
    let mut platform = MockPlatform::new(MockConfig {
        identities,
        ..Default::default()
    });
    let recorder = platform.recorder();
    let message = Message::new("Hi @alice.test and @ghost.test #rust", vec![]).unwrap();

    let report = Orchestrator::default().deliver(&mut platform, &message).await;

    assert!(report.is_success());
    assert_eq!(
        recorder.resolved_handles(),
        vec!["alice.test", "ghost.test"]
    );

    let draft = &recorder.posted()[0];
    let annotations = draft.annotations.as_ref().unwrap();
    let kinds: Vec<&AnnotationKind> = annotations.iter().map(|a| &a.kind).collect();
    assert_eq!(
        kinds,
        vec![
            &AnnotationKind::Mention("did:plc:alice".to_string()),
            &AnnotationKind::Hashtag("rust".to_string()),
        ]
    );
    assert_eq!(
        &draft.text[annotations[0].byte_start..annotations[0].byte_end],
        "@alice.test"
    );
}

#[tokio::test]
async fn test_annotation_offsets_are_relative_to_segment_text() {
    let mut platform = MockPlatform::with_limit("sky", 40);
    let recorder = platform.recorder();
    let text = format!("{} #first {} #second", "a".repeat(20), "b".repeat(30));
    let message = Message::new(text, vec![]).unwrap();

    let report = Orchestrator::default().deliver(&mut platform, &message).await;
    assert!(report.is_success());
    assert!(report.segments > 1);

    let mut seen = Vec::new();
    for draft in recorder.posted() {
        for annotation in draft.annotations.iter().flatten() {
            let slice = &draft.text[annotation.byte_start..annotation.byte_end];
            assert!(slice.starts_with('#'));
            seen.push(slice.to_string());
        }
    }
    assert!(seen.contains(&"#first".to_string()));
}

#[tokio::test]
async fn test_platform_without_annotations_skips_resolution() {
    let mut platform = MockPlatform::new(MockConfig {
        supports_annotations: false,
        ..Default::default()
    });
    let recorder = platform.recorder();
    let message = Message::new("ping @alice #tag https://x.test", vec![]).unwrap();

    Orchestrator::default().deliver(&mut platform, &message).await;

    assert!(recorder.resolved_handles().is_empty());
    assert!(recorder.posted()[0].annotations.is_none());
}

#[tokio::test]
async fn test_page_reserve_comes_from_delivery_config() {
    let mut platform = MockPlatform::with_limit("sky", 30);
    let recorder = platform.recorder();
    let message = Message::new(three_segment_text(), vec![]).unwrap();
    let orchestrator = Orchestrator::new(DeliveryConfig {
        page_reserve: 20,
        ..Default::default()
    });

    let report = orchestrator.deliver(&mut platform, &message).await;

    // 10 graphemes of body per segment
    assert_eq!(report.segments, 5);
    assert!(recorder
        .posted()
        .iter()
        .all(|d| d.text.chars().count() <= 30));
}

#[tokio::test]
async fn test_platforms_are_independent() {
    let failing = MockPlatform::auth_failure("down", "Service unavailable");
    let healthy = MockPlatform::new(MockConfig {
        name: "up".to_string(),
        segment_limit: 30,
        delay: Duration::from_millis(5),
        ..Default::default()
    });
    let healthy_recorder = healthy.recorder();
    let mut platforms: Vec<Box<dyn Platform>> = vec![Box::new(failing), Box::new(healthy)];
    let message = Message::new(three_segment_text(), vec![]).unwrap();

    let reports = Orchestrator::default()
        .deliver_all(&mut platforms, &message)
        .await;

    assert_eq!(reports.len(), 2);
    assert_eq!(reports[0].platform, "down");
    assert_eq!(reports[0].exit_code(), 2);
    assert_eq!(reports[1].platform, "up");
    assert!(reports[1].is_success());
    assert_eq!(reports[1].thread.len(), 3);
    assert_eq!(healthy_recorder.post_call_count(), 3);
}

#[tokio::test]
async fn test_platforms_run_concurrently() {
    let delay = Duration::from_millis(100);
    let mut platforms: Vec<Box<dyn Platform>> = (0..3)
        .map(|i| {
            Box::new(MockPlatform::new(MockConfig {
                name: format!("p{}", i),
                delay,
                ..Default::default()
            })) as Box<dyn Platform>
        })
        .collect();
    let message = Message::new("hello", vec![]).unwrap();

    let started = std::time::Instant::now();
    let reports = Orchestrator::default()
        .deliver_all(&mut platforms, &message)
        .await;

    assert!(reports.iter().all(|r| r.is_success()));
    // each platform spends ~200ms (login + post); sequential would be ~600ms
    assert!(started.elapsed() < Duration::from_millis(500));
}
