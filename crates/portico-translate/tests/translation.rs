//! Inbound translation against realistic admin-panel requests.

use bytes::Bytes;
use http::StatusCode;
use portico_core::{Method, TranslationErrorKind};
use portico_translate::{
    ConnectionInfo, MultipartLimits, RawRequest, Translator, TranslatorConfig,
};

fn multipart_body() -> Bytes {
    let body = concat!(
        "--AdminBoundary\r\n",
        "Content-Disposition: form-data; name=\"title\"\r\n\r\n",
        "Quarterly report\r\n",
        "--AdminBoundary\r\n",
        "Content-Disposition: form-data; name=\"cover\"; filename=\"cover.png\"\r\n",
        "Content-Type: image/png\r\n\r\n",
        "\u{0089}PNG-not-really\r\n",
        "--AdminBoundary\r\n",
        "Content-Disposition: form-data; name=\"status\"\r\n\r\n",
        "published\r\n",
        "--AdminBoundary--\r\n",
    );
    Bytes::from_static(body.as_bytes())
}

fn post(uri: &str, content_type: &str, body: Bytes) -> RawRequest {
    let request = http::Request::builder()
        .method("POST")
        .uri(uri)
        .header("Content-Type", content_type)
        .body(body)
        .unwrap();
    RawRequest::new(request, ConnectionInfo::default())
}

#[tokio::test]
async fn test_multipart_with_one_file_and_two_fields() {
    let uploads = tempfile::tempdir().unwrap();
    let translator = Translator::new(TranslatorConfig::default().upload_dir(uploads.path()));
    let raw = post(
        "/resources/articles",
        "multipart/form-data; boundary=AdminBoundary",
        multipart_body(),
    );

    let msg = translator.inbound(&raw).await.unwrap();
    assert_eq!(msg.method(), Method::Post);
    assert_eq!(msg.form().len(), 2);
    assert_eq!(msg.form().get("title"), Some("Quarterly report"));
    assert_eq!(msg.form().get("status"), Some("published"));
    assert_eq!(msg.files().len(), 1);

    let cover = msg.file("cover").unwrap();
    assert_eq!(cover.original_name(), Some("cover.png"));
    assert_eq!(cover.mime(), Some("image/png"));
    assert_eq!(cover.extension().as_deref(), Some("png"));
    assert!(cover.size() > 0);

    let temp_path = cover.path().to_path_buf();
    assert!(temp_path.exists());
    drop(msg);
    assert!(!temp_path.exists(), "uploads are removed with the message");
}

#[tokio::test]
async fn test_multipart_limits_apply() {
    let uploads = tempfile::tempdir().unwrap();
    let translator = Translator::new(
        TranslatorConfig::default()
            .upload_dir(uploads.path())
            .multipart(MultipartLimits {
                max_fields: 1,
                ..MultipartLimits::default()
            }),
    );
    let raw = post(
        "/resources/articles",
        "multipart/form-data; boundary=AdminBoundary",
        multipart_body(),
    );
    let err = translator.inbound(&raw).await.unwrap_err();
    assert_eq!(err.kind, TranslationErrorKind::PayloadTooLarge);
    assert_eq!(err.status_code(), StatusCode::PAYLOAD_TOO_LARGE);
}

#[tokio::test]
async fn test_urlencoded_form() {
    let translator = Translator::default();
    let raw = post(
        "/admin/login",
        "application/x-www-form-urlencoded",
        Bytes::from_static(b"email=ada%40example.test&password=p%26ss&remember=on"),
    );
    let msg = translator.inbound(&raw).await.unwrap();
    assert_eq!(msg.input("email").as_deref(), Some("ada@example.test"));
    assert_eq!(msg.input("password").as_deref(), Some("p&ss"));
}

#[tokio::test]
async fn test_error_kinds_map_to_statuses() {
    let translator = Translator::new(TranslatorConfig::default().max_body_size(16));
    let cases = [
        (
            post("/x", "application/json", Bytes::from_static(b"{nope")),
            TranslationErrorKind::MalformedBody,
            StatusCode::BAD_REQUEST,
        ),
        (
            post("/x", "application/json", Bytes::from_static(b"{\"a\":\"0123456789abcdef\"}")),
            TranslationErrorKind::PayloadTooLarge,
            StatusCode::PAYLOAD_TOO_LARGE,
        ),
        (
            post("/x", "image/gif", Bytes::from_static(b"GIF89a")),
            TranslationErrorKind::UnsupportedMediaType,
            StatusCode::UNSUPPORTED_MEDIA_TYPE,
        ),
        (
            post("/x?a=%zz", "text/plain", Bytes::from_static(b"ok")),
            TranslationErrorKind::MalformedQuery,
            StatusCode::BAD_REQUEST,
        ),
    ];

    for (raw, kind, status) in cases {
        let err = translator.inbound(&raw).await.unwrap_err();
        assert_eq!(err.kind, kind, "{}", raw.request.uri());
        assert_eq!(err.status_code(), status);
    }
}

#[tokio::test]
async fn test_body_without_content_type_is_unsupported() {
    let translator = Translator::default();
    let request = http::Request::builder()
        .method("PATCH")
        .uri("/resources/articles/1")
        .body(Bytes::from_static(b"title=x"))
        .unwrap();
    let err = translator
        .inbound(&RawRequest::new(request, ConnectionInfo::default()))
        .await
        .unwrap_err();
    assert_eq!(err.kind, TranslationErrorKind::UnsupportedMediaType);
}

#[tokio::test]
async fn test_cookies_are_decoded() {
    let translator = Translator::default();
    let request = http::Request::builder()
        .uri("/admin")
        .header("Cookie", "portico_session=abc%3D%3D; theme=dark")
        .header("Cookie", "locale=en")
        .body(Bytes::new())
        .unwrap();
    let msg = translator
        .inbound(&RawRequest::new(request, ConnectionInfo::default()))
        .await
        .unwrap();
    assert_eq!(msg.cookie("portico_session"), Some("abc=="));
    assert_eq!(msg.cookie("locale"), Some("en"));
    assert_eq!(msg.cookies().len(), 3);
}
