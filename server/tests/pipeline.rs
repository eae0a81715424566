mod fixtures;

use std::io::{Cursor, Read, Write};
use std::sync::Arc;

use axum::response::IntoResponse;
use serde_json::{Value, json};
use zip::write::{SimpleFileOptions, ZipWriter};
use zip::{CompressionMethod, ZipArchive};

use api::report::ValidationReport;
use api::step::JobPayload;
use common::crypt4gh::writer::encrypt_stream;
use common::crypt4gh::{PublicKey, SecretKey};
use common::error::PipelineError;
use common::testkeys;
use fixtures::{MemoryTokenStore, mint_token, serve_objects, test_executor};
use server::data::PipelineData;
use server::http::AppError;

// fixture builders

const SECRET_PLAINTEXT: &[u8] = b"Super super secret file";

fn c4gh_bytes(recipient_pem: &str) -> Vec<u8> {
    let recipient = PublicKey::from_pem(recipient_pem).unwrap();
    let writer_key = SecretKey::from_bytes([5u8; 32]);

    let mut input = SECRET_PLAINTEXT;
    let mut out = Vec::new();
    encrypt_stream(&mut input, &mut out, &writer_key, &[recipient]).unwrap();
    out
}

fn preview_zip_bytes() -> Vec<u8> {
    let mtime = zip::DateTime::from_date_and_time(2024, 12, 23, 16, 21, 38).unwrap();
    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .last_modified_time(mtime);

    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    writer.add_directory("test_zip/", options).unwrap();
    writer.start_file("test_zip/test1.txt", options).unwrap();
    writer.write_all(b"Hello World!").unwrap();
    writer.finish().unwrap().into_inner()
}

fn directory_zip_bytes() -> Vec<u8> {
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    writer.add_directory("test_directory_zip/", options).unwrap();
    writer
        .add_directory("test_directory_zip/directory1/", options)
        .unwrap();
    writer
        .start_file("test_directory_zip/directory1/directory1-file1.txt", options)
        .unwrap();
    writer.write_all(b"directory1-file1\n").unwrap();
    writer
        .start_file("test_directory_zip/directory1/directory1-file2.txt", options)
        .unwrap();
    writer.write_all(b"directory1-file2\n").unwrap();
    writer.finish().unwrap().into_inner()
}

fn png_bytes() -> Vec<u8> {
    let image = image::DynamicImage::ImageRgb8(image::RgbImage::from_pixel(
        100,
        50,
        image::Rgb([12, 140, 220]),
    ));

    let mut cursor = Cursor::new(Vec::new());
    image
        .write_to(&mut cursor, image::ImageFormat::Png)
        .unwrap();
    cursor.into_inner()
}

// run a one-token pipeline against a fresh store and executor
async fn run_pipeline(payload: Value) -> Result<PipelineData, PipelineError> {
    let payload: JobPayload = serde_json::from_value(payload).unwrap();

    let store = Arc::new(MemoryTokenStore::default());
    store.put("123", mint_token(&payload)).await;

    test_executor(store).run("123").await
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn decrypt_single_step() {
    let addr = serve_objects(vec![(
        "secret.txt.c4gh",
        "application/octet-stream",
        c4gh_bytes(testkeys::RECIPIENT_C4GH_PUBLIC),
    )])
    .await;

    let mut output = run_pipeline(json!({
        "pipeline_steps": [{
            "type": "decrypt_crypt4gh",
            "arguments": {
                "source_url": format!("http://{addr}/objects/secret.txt.c4gh"),
                "recipient_sec": testkeys::RECIPIENT_C4GH_PRIVATE,
            },
        }],
    }))
    .await
    .unwrap();

    assert_eq!(output.metadata().file_name.as_deref(), Some("secret.txt"));
    assert_eq!(output.metadata().media_type(), "application/octet-stream");
    assert!(output.metadata().download());

    assert_eq!(output.read_to_end().await.unwrap(), SECRET_PLAINTEXT);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn add_recipient_then_decrypt() {
    // encrypted for the server's own key; the new recipient is added in flight
    let addr = serve_objects(vec![(
        "secret.txt.c4gh",
        "application/octet-stream",
        c4gh_bytes(testkeys::SERVER_C4GH_PUBLIC),
    )])
    .await;

    let mut output = run_pipeline(json!({
        "pipeline_steps": [
            {
                "type": "add_recipient_crypt4gh",
                "arguments": {
                    "source_url": format!("http://{addr}/objects/secret.txt.c4gh"),
                    "recipient_pub": testkeys::ANOTHER_RECIPIENT_C4GH_PUBLIC,
                },
            },
            {
                "type": "decrypt_crypt4gh",
                "arguments": {
                    "recipient_sec": testkeys::ANOTHER_RECIPIENT_C4GH_PRIVATE,
                },
            },
        ],
    }))
    .await
    .unwrap();

    assert_eq!(output.metadata().file_name.as_deref(), Some("secret.txt"));
    assert_eq!(output.read_to_end().await.unwrap(), SECRET_PLAINTEXT);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn validate_accepts_repository_file() {
    let addr = serve_objects(vec![(
        "valid.c4gh",
        "application/octet-stream",
        c4gh_bytes(testkeys::SERVER_C4GH_PUBLIC),
    )])
    .await;

    let mut output = run_pipeline(json!({
        "pipeline_steps": [{
            "type": "validate_crypt4gh",
            "arguments": { "source_url": format!("http://{addr}/objects/valid.c4gh") },
        }],
    }))
    .await
    .unwrap();

    assert_eq!(output.metadata().media_type(), "application/json");
    assert!(!output.metadata().download());

    let report: ValidationReport =
        serde_json::from_slice(&output.read_to_end().await.unwrap()).unwrap();

    assert!(report.valid);
    assert_eq!(report.error, None);
    assert_eq!(report.file_name, "valid.c4gh");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn validate_rejects_foreign_file() {
    // encrypted for a key the server does not hold
    let addr = serve_objects(vec![(
        "foreign.c4gh",
        "application/octet-stream",
        c4gh_bytes(testkeys::RECIPIENT_C4GH_PUBLIC),
    )])
    .await;

    let mut output = run_pipeline(json!({
        "pipeline_steps": [{
            "type": "validate_crypt4gh",
            "arguments": { "source_url": format!("http://{addr}/objects/foreign.c4gh") },
        }],
    }))
    .await
    .unwrap();

    let report: ValidationReport =
        serde_json::from_slice(&output.read_to_end().await.unwrap()).unwrap();

    assert!(!report.valid);
    assert!(report.error.is_some());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn preview_zip_lists_entries() {
    let addr = serve_objects(vec![(
        "test.zip",
        "application/zip",
        preview_zip_bytes(),
    )])
    .await;

    let mut output = run_pipeline(json!({
        "pipeline_steps": [{
            "type": "preview_zip",
            "arguments": { "source_url": format!("http://{addr}/objects/test.zip") },
        }],
    }))
    .await
    .unwrap();

    assert_eq!(output.metadata().media_type(), "application/json");

    let listing: Value = serde_json::from_slice(&output.read_to_end().await.unwrap()).unwrap();
    let listing = listing.as_object().unwrap();

    assert_eq!(listing.len(), 2);
    assert!(listing.contains_key("test_zip/"));

    let dir = &listing["test_zip/"];
    assert_eq!(dir["is_dir"], json!(true));
    assert_eq!(dir["media_type"], json!(""));

    let file = &listing["test_zip/test1.txt"];
    assert_eq!(file["is_dir"], json!(false));
    assert_eq!(file["file_size"], json!(12));
    assert_eq!(file["modified_time"], json!("2024-12-23 16:21:38"));
    assert_eq!(file["compress_type"], json!("deflated"));
    assert_eq!(file["media_type"], json!("text/plain"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn preview_zip_is_idempotent() {
    let addr = serve_objects(vec![(
        "test.zip",
        "application/zip",
        preview_zip_bytes(),
    )])
    .await;

    let mut first = None;

    for _ in 0..2 {
        let mut output = run_pipeline(json!({
            "pipeline_steps": [{
                "type": "preview_zip",
                "arguments": { "source_url": format!("http://{addr}/objects/test.zip") },
            }],
        }))
        .await
        .unwrap();

        let body = output.read_to_end().await.unwrap();
        match &first {
            None => first = Some(body),
            Some(previous) => assert_eq!(previous, &body),
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn extract_directory_is_zipped_implicitly() {
    let addr = serve_objects(vec![(
        "test_directory_zip.zip",
        "application/zip",
        directory_zip_bytes(),
    )])
    .await;

    let mut output = run_pipeline(json!({
        "pipeline_steps": [{
            "type": "extract_zip",
            "arguments": {
                "source_url": format!("http://{addr}/objects/test_directory_zip.zip"),
                "directory_or_file_name": "test_directory_zip/directory1/",
            },
        }],
    }))
    .await
    .unwrap();

    // more than one extracted file, so the executor zips the result
    assert_eq!(output.metadata().file_name.as_deref(), Some("created.zip"));
    assert_eq!(output.metadata().media_type(), "application/zip");

    let body = output.read_to_end().await.unwrap();
    let mut archive = ZipArchive::new(Cursor::new(body)).unwrap();

    let names: Vec<String> = (0..archive.len())
        .map(|i| archive.by_index(i).unwrap().name().to_string())
        .collect();
    assert_eq!(names, vec!["directory1-file1.txt", "directory1-file2.txt"]);

    for (name, expected) in [
        ("directory1-file1.txt", b"directory1-file1\n".as_slice()),
        ("directory1-file2.txt", b"directory1-file2\n".as_slice()),
    ] {
        let mut entry = archive.by_name(name).unwrap();
        let mut content = Vec::new();
        entry.read_to_end(&mut content).unwrap();
        assert_eq!(content, expected);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn extract_single_file_streams_directly() {
    let addr = serve_objects(vec![(
        "test_directory_zip.zip",
        "application/zip",
        directory_zip_bytes(),
    )])
    .await;

    let mut output = run_pipeline(json!({
        "pipeline_steps": [{
            "type": "extract_zip",
            "arguments": {
                "source_url": format!("http://{addr}/objects/test_directory_zip.zip"),
                "directory_or_file_name": "test_directory_zip/directory1/directory1-file1.txt",
            },
        }],
    }))
    .await
    .unwrap();

    assert_eq!(
        output.metadata().file_name.as_deref(),
        Some("directory1-file1.txt")
    );
    assert_eq!(output.metadata().media_type(), "text/plain");
    assert_eq!(output.read_to_end().await.unwrap(), b"directory1-file1\n");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn extract_missing_entry_fails() {
    let addr = serve_objects(vec![(
        "test_directory_zip.zip",
        "application/zip",
        directory_zip_bytes(),
    )])
    .await;

    let err = run_pipeline(json!({
        "pipeline_steps": [{
            "type": "extract_zip",
            "arguments": {
                "source_url": format!("http://{addr}/objects/test_directory_zip.zip"),
                "directory_or_file_name": "no/such/entry.txt",
            },
        }],
    }))
    .await
    .unwrap_err();

    assert!(matches!(err, PipelineError::EntryNotFound(_)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn preview_image_downscales_to_fit() {
    let addr = serve_objects(vec![("photo.png", "image/png", png_bytes())]).await;

    let mut output = run_pipeline(json!({
        "pipeline_steps": [{
            "type": "preview_image",
            "arguments": {
                "source_url": format!("http://{addr}/objects/photo.png"),
                "max_width": 50,
                "max_height": 50,
            },
        }],
    }))
    .await
    .unwrap();

    // 100x50 shrunk to fit 50x50 preserving aspect
    assert_eq!(output.metadata().media_type(), "image/png");
    assert_eq!(output.metadata().width, Some(50));
    assert_eq!(output.metadata().height, Some(25));
    assert_eq!(output.metadata().mode.as_deref(), Some("RGB"));
    assert_eq!(output.metadata().file_name.as_deref(), Some("photo.png"));

    let decoded = image::load_from_memory(&output.read_to_end().await.unwrap()).unwrap();
    assert_eq!((decoded.width(), decoded.height()), (50, 25));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn preview_image_passes_small_images_through() {
    let original = png_bytes();
    let addr = serve_objects(vec![("photo.png", "image/png", original.clone())]).await;

    let mut output = run_pipeline(json!({
        "pipeline_steps": [{
            "type": "preview_image",
            "arguments": {
                "source_url": format!("http://{addr}/objects/photo.png"),
                "max_width": 1000,
                "max_height": 1000,
            },
        }],
    }))
    .await
    .unwrap();

    assert_eq!(output.metadata().width, Some(100));
    assert_eq!(output.metadata().height, Some(50));
    assert_eq!(output.read_to_end().await.unwrap(), original);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn token_is_single_use() {
    let addr = serve_objects(vec![(
        "valid.c4gh",
        "application/octet-stream",
        c4gh_bytes(testkeys::SERVER_C4GH_PUBLIC),
    )])
    .await;

    let payload: JobPayload = serde_json::from_value(json!({
        "pipeline_steps": [{
            "type": "validate_crypt4gh",
            "arguments": { "source_url": format!("http://{addr}/objects/valid.c4gh") },
        }],
    }))
    .unwrap();

    let store = Arc::new(MemoryTokenStore::default());
    store.put("once", mint_token(&payload)).await;

    let executor = test_executor(store);

    assert!(executor.run("once").await.is_ok());

    let err = executor.run("once").await.unwrap_err();
    assert!(matches!(err, PipelineError::TokenMissing));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn unknown_step_is_rejected() {
    let err = run_pipeline(json!({
        "pipeline_steps": [{ "type": "reticulate_splines" }],
    }))
    .await
    .unwrap_err();

    match err {
        PipelineError::UnknownStep(name) => assert_eq!(name, "reticulate_splines"),
        other => panic!("expected UnknownStep, got {other}"),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn empty_pipeline_is_rejected() {
    let err = run_pipeline(json!({ "pipeline_steps": [] })).await.unwrap_err();
    assert!(matches!(err, PipelineError::MalformedPayload(_)));
}

#[tokio::test]
async fn missing_token_body_shape() {
    let response = AppError(PipelineError::TokenMissing).into_response();
    assert_eq!(response.status(), 404);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body: Value = serde_json::from_slice(&body).unwrap();

    assert_eq!(
        body,
        json!({ "error": "404", "message": "Token not found or expired" })
    );
}
