//! Cloudinary client tests against a mock server.

use serde_json::json;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use credcheck_service::storage::{CloudinaryConfig, CloudinaryStorage};
use credcheck_service::{StorageError, StorageProvider};

fn config() -> CloudinaryConfig {
    CloudinaryConfig {
        cloud_name: "demo".into(),
        api_key: "1234".into(),
        api_secret: "secret".into(),
    }
}

#[tokio::test]
async fn signed_upload_returns_public_id_and_url() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1_1/demo/auto/upload"))
        .and(body_string_contains("name=\"signature\""))
        .and(body_string_contains("credcheck-uploads"))
        .and(body_string_contains("essay_20260504_100000.docx"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "public_id": "credcheck-uploads/essay_20260504_100000.docx",
            "secure_url": "https://res.cloudinary.com/demo/raw/upload/essay.docx"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let storage = CloudinaryStorage::with_base_url(config(), server.uri()).unwrap();
    let stored = storage
        .upload(
            b"essay".to_vec(),
            "essay_20260504_100000.docx",
            "credcheck-uploads",
        )
        .await
        .unwrap();

    assert_eq!(
        stored.identifier,
        "credcheck-uploads/essay_20260504_100000.docx"
    );
    assert_eq!(
        stored.url,
        "https://res.cloudinary.com/demo/raw/upload/essay.docx"
    );
}

#[tokio::test]
async fn provider_error_message_is_surfaced() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1_1/demo/auto/upload"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error": { "message": "Invalid Signature" }
        })))
        .mount(&server)
        .await;

    let storage = CloudinaryStorage::with_base_url(config(), server.uri()).unwrap();
    let err = storage
        .upload(b"essay".to_vec(), "essay.docx", "credcheck-uploads")
        .await
        .unwrap_err();

    match err {
        StorageError::Rejected { status, message } => {
            assert_eq!(status, 401);
            assert_eq!(message, "Invalid Signature");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn non_json_error_body_is_kept_verbatim() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
        .mount(&server)
        .await;

    let storage = CloudinaryStorage::with_base_url(config(), server.uri()).unwrap();
    let err = storage
        .upload(b"essay".to_vec(), "essay.docx", "credcheck-uploads")
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        StorageError::Rejected { status: 502, ref message } if message == "bad gateway"
    ));
}
