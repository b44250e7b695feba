//! Integration tests for the `/convert/audio` endpoint.

mod common;

use std::sync::Arc;
use std::time::Duration;

use reqwest::multipart::{Form, Part};

use af_av::fake::{EchoTranscoder, FailingTranscoder, SpyTranscoder, UnavailableTranscoder};
use common::TestHarness;

fn upload_form(bytes: Vec<u8>, filename: &str) -> Form {
    Form::new().part("file", Part::bytes(bytes).file_name(filename.to_string()))
}

#[tokio::test]
async fn convert_streams_body_through_transcoder() {
    let harness = TestHarness::with_server(Arc::new(EchoTranscoder)).await;

    let payload: Vec<u8> = (0..100_000u32).map(|i| (i % 251) as u8).collect();
    let resp = harness
        .client
        .post(harness.url("/convert/audio"))
        .multipart(upload_form(payload.clone(), "clip.wav"))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 200);
    assert_eq!(
        resp.headers().get("content-type").unwrap(),
        "audio/mp3"
    );
    assert_eq!(
        resp.headers().get("content-disposition").unwrap(),
        "inline; filename=\"clip.mp3\""
    );
    assert_eq!(resp.headers().get("x-accel-buffering").unwrap(), "no");

    let body = resp.bytes().await.unwrap();
    assert_eq!(body.as_ref(), payload.as_slice());
}

#[tokio::test]
async fn convert_applies_format_to_headers_and_filename() {
    let harness = TestHarness::with_server(Arc::new(EchoTranscoder)).await;

    let resp = harness
        .client
        .post(harness.url("/convert/audio?format=OGG"))
        .multipart(upload_form(b"oggdata".to_vec(), "song.flac"))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 200);
    assert_eq!(resp.headers().get("content-type").unwrap(), "audio/ogg");
    assert_eq!(
        resp.headers().get("content-disposition").unwrap(),
        "inline; filename=\"song.ogg\""
    );
}

#[tokio::test]
async fn convert_sanitizes_hostile_parameters() {
    let spy = Arc::new(SpyTranscoder::new(Arc::new(EchoTranscoder)));
    let harness = TestHarness::with_server(spy.clone()).await;

    let resp = harness
        .client
        .post(harness.url("/convert/audio?format=..%2F..%2Fetc&bitrate=999999k&channels=7&ar=1234"))
        .multipart(upload_form(b"data".to_vec(), "x.wav"))
        .send()
        .await
        .unwrap();

    // Unrecognized values fall back to defaults instead of erroring.
    assert_eq!(resp.status(), 200);
    let seen = spy.seen_options();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].format, "etc");
    assert_eq!(seen[0].bitrate, "192k");
    assert_eq!(seen[0].channels, "2");
    assert_eq!(seen[0].sample_rate, "44100");
}

#[tokio::test]
async fn convert_tolerates_duplicate_query_keys() {
    let spy = Arc::new(SpyTranscoder::new(Arc::new(EchoTranscoder)));
    let harness = TestHarness::with_server(spy.clone()).await;

    let resp = harness
        .client
        .post(harness.url("/convert/audio?format=mp3&format=ogg&bitrate=128k&bitrate="))
        .multipart(upload_form(b"data".to_vec(), "x.wav"))
        .send()
        .await
        .unwrap();

    // A repeated key is not a rejection; the last occurrence degrades
    // through sanitization like any other raw value.
    assert_eq!(resp.status(), 200);
    let seen = spy.seen_options();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].format, "ogg");
    assert_eq!(seen[0].bitrate, "192k");
}

#[tokio::test]
async fn convert_without_file_field_is_rejected() {
    let spy = Arc::new(SpyTranscoder::new(Arc::new(EchoTranscoder)));
    let harness = TestHarness::with_server(spy.clone()).await;

    let form = Form::new().text("note", "no file here");
    let resp = harness
        .client
        .post(harness.url("/convert/audio"))
        .multipart(form)
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 400);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("file"));
    assert!(body.get("detail").is_none());
    assert_eq!(spy.spawn_count(), 0);
}

#[tokio::test]
async fn convert_reports_transcoder_failure_with_detail() {
    let transcoder = FailingTranscoder::new("pipe:0: Invalid data found when processing input", 1);
    let harness = TestHarness::with_server(Arc::new(transcoder)).await;

    let resp = harness
        .client
        .post(harness.url("/convert/audio"))
        .multipart(upload_form(b"not audio at all".to_vec(), "junk.bin"))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 500);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "Conversion failed");
    assert!(body["detail"]
        .as_str()
        .unwrap()
        .contains("Invalid data found"));
}

#[tokio::test]
async fn convert_truncates_long_diagnostics() {
    let transcoder = FailingTranscoder::new("e".repeat(5000), 1);
    let harness = TestHarness::with_server(Arc::new(transcoder)).await;

    let resp = harness
        .client
        .post(harness.url("/convert/audio"))
        .multipart(upload_form(b"x".to_vec(), "a.wav"))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 500);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["detail"].as_str().unwrap().chars().count(), 1000);
}

#[tokio::test]
async fn convert_surfaces_spawn_failure() {
    let harness = TestHarness::with_server(Arc::new(UnavailableTranscoder)).await;

    let resp = harness
        .client
        .post(harness.url("/convert/audio"))
        .multipart(upload_form(b"x".to_vec(), "a.wav"))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 500);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("ffmpeg"));
}

#[tokio::test]
async fn convert_sheds_load_while_overloaded() {
    let spy = Arc::new(SpyTranscoder::new(Arc::new(EchoTranscoder)));
    let harness = TestHarness::with_server(spy.clone()).await;

    // Breach the scheduler-delay ceiling.
    harness
        .ctx
        .health
        .record_sample(Duration::from_secs(5), 10 * 1024 * 1024);

    let resp = harness
        .client
        .post(harness.url("/convert/audio"))
        .multipart(upload_form(b"x".to_vec(), "a.wav"))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 503);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("delay"));
    // Rejected before the upload ever reached the transcoder.
    assert_eq!(spy.spawn_count(), 0);

    // A healthy sample readmits traffic immediately.
    harness
        .ctx
        .health
        .record_sample(Duration::from_millis(1), 10 * 1024 * 1024);

    let resp = harness
        .client
        .post(harness.url("/convert/audio"))
        .multipart(upload_form(b"x".to_vec(), "a.wav"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(spy.spawn_count(), 1);
}

#[tokio::test]
async fn convert_rejects_oversized_upload() {
    let mut config = af_core::config::Config::default();
    config.limits.max_upload_bytes = 64;
    let harness =
        TestHarness::with_server_config(Arc::new(EchoTranscoder), config).await;

    let resp = harness
        .client
        .post(harness.url("/convert/audio"))
        .multipart(upload_form(vec![0u8; 64 * 1024], "big.wav"))
        .send()
        .await
        .unwrap();

    // The body limit trips inside the multipart parser, surfacing as a
    // validation failure rather than a streamed conversion.
    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn convert_derives_filename_from_upload() {
    let harness = TestHarness::with_server(Arc::new(EchoTranscoder)).await;

    // No extension on the upload: the whole name is the base.
    let resp = harness
        .client
        .post(harness.url("/convert/audio?format=aac"))
        .multipart(upload_form(b"x".to_vec(), "recording"))
        .send()
        .await
        .unwrap();

    assert_eq!(
        resp.headers().get("content-disposition").unwrap(),
        "inline; filename=\"recording.aac\""
    );
}

#[tokio::test]
async fn error_responses_carry_request_id() {
    let harness = TestHarness::with_server(Arc::new(UnavailableTranscoder)).await;

    let resp = harness
        .client
        .post(harness.url("/convert/audio"))
        .header("x-request-id", "test-req-42")
        .multipart(upload_form(b"x".to_vec(), "a.wav"))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 500);
    assert_eq!(resp.headers().get("x-request-id").unwrap(), "test-req-42");
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["request_id"], "test-req-42");
}
