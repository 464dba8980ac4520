//! Route handlers with the gates switched off.

mod common;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use common::*;
use serde_json::json;
use std::sync::atomic::Ordering;

async fn open_gateway() -> TestGateway {
    TestGateway::start(|c| {
        c.signing.enabled = false;
        c.challenge.enabled = false;
        c.rate_limit.enabled = false;
    })
    .await
}

fn upload(path: &str, fields: &[(&str, &str)], audio: Option<(&str, &[u8])>) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri(path)
        .header("content-type", multipart_content_type())
        .body(Body::from(multipart_body(fields, audio)))
        .unwrap()
}

fn post_json(path: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri(path)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn request(method: Method, path: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(path)
        .body(Body::empty())
        .unwrap()
}

fn dir_is_empty(path: &std::path::Path) -> bool {
    std::fs::read_dir(path).unwrap().next().is_none()
}

#[tokio::test]
async fn test_voice_gallery_lifecycle() {
    let gw = open_gateway().await;
    let storage = gw.config.storage.clone();

    let (status, _, body) = gw
        .send(upload(
            "/voices",
            &[("name", "Narrator"), ("description", "warm"), ("language", "en")],
            Some(("take.mp3", &b"ID3 not really mp3"[..])),
        ))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let record = json_body(&body);
    let id = record["id"].as_str().unwrap().to_string();
    assert_eq!(record["name"], "Narrator");
    assert_eq!(record["description"], "warm");
    assert_eq!(record["language"], "en");
    assert_eq!(record["type"], "user");
    assert_eq!(record["duration"], 4.26);
    assert_eq!(record["created_at"], START.to_string());
    assert_eq!(record["filename"], format!("{}.wav", id));
    assert!(storage.voices_dir.join(format!("{}.wav", id)).exists());
    assert!(dir_is_empty(&storage.temp_dir));

    let (status, _, body) = gw.send(request(Method::GET, "/voices")).await;
    assert_eq!(status, StatusCode::OK);
    let listing = json_body(&body);
    assert_eq!(listing["preloaded_voices"], json!([]));
    assert_eq!(listing["user_voices"][0]["id"], id.as_str());

    let (status, headers, audio) = gw
        .send(post_json(
            &format!("/voices/{}/use", id),
            json!({ "text": "hello there", "speed": 1.2 }),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers["content-type"], "audio/wav");
    assert_eq!(&audio[..], FAKE_WAV);
    {
        let requests = gw.engine.requests.lock().unwrap();
        let job = &requests[0];
        assert_eq!(job.text, "hello there");
        assert_eq!(job.language, "en");
        assert_eq!(job.speed, 1.2);
        assert_eq!(job.temperature, 0.75);
        assert_eq!(job.speaker_wav, storage.voices_dir.join(format!("{}.wav", id)));
    }
    assert!(dir_is_empty(&storage.output_dir));

    let (status, _, body) = gw.send(request(Method::DELETE, &format!("/voices/{}", id))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json_body(&body), json!({ "success": true }));
    assert!(!storage.voices_dir.join(format!("{}.wav", id)).exists());

    let (status, _, body) = gw.send(request(Method::DELETE, &format!("/voices/{}", id))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json_body(&body)["error"], "Voice not found");

    let (status, _, _) = gw
        .send(post_json(&format!("/voices/{}/use", id), json!({ "text": "hi" })))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_save_voice_defaults_and_missing_audio() {
    let gw = open_gateway().await;

    let (status, _, body) = gw.send(upload("/voices", &[("name", "x")], None)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json_body(&body)["error"], "No audio file");

    let (status, _, body) = gw
        .send(upload("/voices", &[], Some(("clip.wav", FAKE_WAV))))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let record = json_body(&body);
    assert_eq!(record["name"], "Untitled");
    assert_eq!(record["language"], "es");
}

#[tokio::test]
async fn test_preloaded_voices_listed_separately() {
    let gw = open_gateway().await;
    std::fs::write(
        &gw.config.storage.catalog_path,
        json!([
            {
                "id": "es-female-1",
                "name": "Lucia",
                "filename": "lucia.wav",
                "type": "preloaded",
                "gender": "female"
            },
            { "id": "u1", "name": "Mine", "filename": "u1.wav" }
        ])
        .to_string(),
    )
    .unwrap();

    let (status, _, body) = gw.send(request(Method::GET, "/voices")).await;
    assert_eq!(status, StatusCode::OK);
    let listing = json_body(&body);
    assert_eq!(listing["preloaded_voices"][0]["name"], "Lucia");
    assert_eq!(listing["preloaded_voices"][0]["gender"], "female");
    assert_eq!(listing["user_voices"][0]["type"], "user");
    assert_eq!(listing["user_voices"][0]["language"], "es");
}

#[tokio::test]
async fn test_use_voice_validates_body() {
    let gw = open_gateway().await;
    std::fs::write(
        &gw.config.storage.catalog_path,
        json!([{ "id": "v1", "filename": "v1.wav" }]).to_string(),
    )
    .unwrap();

    let (status, _, body) = gw.send(post_json("/voices/v1/use", json!({ "text": "  " }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json_body(&body)["error"], "No text provided");

    let broken = Request::builder()
        .method(Method::POST)
        .uri("/voices/v1/use")
        .body(Body::from("{not json"))
        .unwrap();
    assert_eq!(gw.send(broken).await.0, StatusCode::BAD_REQUEST);

    // Catalog entry without its audio file.
    let (status, _, body) = gw.send(post_json("/voices/v1/use", json!({ "text": "hola" }))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json_body(&body)["error"], "Voice file not found");
    assert!(gw.engine.requests.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_clone_with_wav_reference() {
    let gw = open_gateway().await;

    let (status, headers, audio) = gw
        .send(upload(
            "/clone",
            &[("text", "buenos dias"), ("temperature", "0.6")],
            Some(("ref.wav", FAKE_WAV)),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers["content-type"], "audio/wav");
    assert_eq!(&audio[..], FAKE_WAV);
    assert_eq!(gw.audio.conversions.load(Ordering::SeqCst), 0);

    let job = gw.engine.requests.lock().unwrap()[0].clone();
    assert_eq!(job.language, "es");
    assert_eq!(job.temperature, 0.6);
    assert_eq!(job.speed, 1.0);

    assert!(dir_is_empty(&gw.config.storage.temp_dir));
    assert!(dir_is_empty(&gw.config.storage.output_dir));
}

#[tokio::test]
async fn test_clone_converts_other_formats() {
    let gw = open_gateway().await;

    let (status, _, _) = gw
        .send(upload("/clone", &[("text", "hi")], Some(("ref.OGG", &b"OggS"[..]))))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(gw.audio.conversions.load(Ordering::SeqCst), 1);
    assert!(dir_is_empty(&gw.config.storage.temp_dir));
}

#[tokio::test]
async fn test_clone_rejects_bad_input() {
    let gw = open_gateway().await;

    let (status, _, body) = gw
        .send(upload("/clone", &[], Some(("ref.wav", FAKE_WAV))))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json_body(&body)["error"], "No text provided");

    let (status, _, body) = gw
        .send(upload("/clone", &[("text", "hi"), ("speed", "fast")], Some(("ref.wav", FAKE_WAV))))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json_body(&body)["error"], "Invalid speed");

    *gw.audio.duration.lock().unwrap() = 1.5;
    let (status, _, body) = gw
        .send(upload("/clone", &[("text", "hi")], Some(("ref.wav", FAKE_WAV))))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let message = json_body(&body)["error"].as_str().unwrap().to_string();
    assert!(message.contains("too short"), "{}", message);

    assert!(gw.engine.requests.lock().unwrap().is_empty());
    assert!(dir_is_empty(&gw.config.storage.temp_dir));
}

#[tokio::test]
async fn test_engine_failure_hides_details() {
    let gw = open_gateway().await;
    gw.engine.fail.store(true, Ordering::SeqCst);

    let (status, _, body) = gw
        .send(upload("/clone", &[("text", "hi")], Some(("ref.wav", FAKE_WAV))))
        .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json_body(&body), json!({ "error": "Synthesis failed" }));
}

#[tokio::test]
async fn test_queue_status_counts_rate_limited_clients() {
    let gw = TestGateway::start(|c| {
        c.signing.enabled = false;
        c.challenge.enabled = false;
    })
    .await;

    for user in ["alice", "bob"] {
        let listing = Request::builder()
            .uri("/voices")
            .header("x-user-id", user)
            .body(Body::empty())
            .unwrap();
        assert_eq!(gw.send(listing).await.0, StatusCode::OK);
    }

    let (status, _, body) = gw.send(request(Method::GET, "/queue/status")).await;
    assert_eq!(status, StatusCode::OK);
    let queue = json_body(&body);
    assert_eq!(queue["jobs_queued"], 0);
    assert_eq!(queue["jobs_processing"], 0);
    assert_eq!(queue["rate_limit_users"], 2);
}

#[tokio::test]
async fn test_plain_tts_is_refused() {
    let gw = open_gateway().await;

    let (status, _, body) = gw.send(post_json("/tts", json!({ "text": "hola" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let body = json_body(&body);
    assert_eq!(body["language"], "es");
    assert!(body["error"].as_str().unwrap().contains("/clone"));
}
