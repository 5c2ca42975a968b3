//! HTTP 客户端测试（wiremock 模拟后端与 OCR 服务）

use serde_json::json;
use std::time::Duration;
use visa_intake::clients::{OcrClient, VisaApiClient};
use visa_intake::error::{CatalogError, OcrError, PersistenceError};
use visa_intake::models::application::ApplicantInfo;
use visa_intake::models::document::{DocumentRequirement, Side};
use visa_intake::models::progress::LocalFile;
use visa_intake::services::{ApplicationStore, CatalogSource, PassportExtractor, StepPayload};
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn applicant() -> ApplicantInfo {
    ApplicantInfo {
        visa_id: "visa-jp".into(),
        payment_id: "pay_77".into(),
        travellers: 1,
        email: "a@b.c".into(),
        phone: "9000".into(),
        country: "Japan".into(),
        processing_mode: None,
        employee_id: None,
    }
}

fn jpeg(name: &str) -> LocalFile {
    LocalFile::new(name, "image/jpeg", vec![0xFF, 0xD8, 0xFF, 0xE0])
}

#[tokio::test]
async fn catalog_is_fetched_in_order_with_bearer_token() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/configurations/documents/visa-jp/documents-only"))
        .and(header("authorization", "Bearer secret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "documents": [
                {"_id": "d1", "name": "Passport", "isMandatory": true},
                {"_id": "d2", "name": "Photo", "description": "white background", "isMandatory": false}
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = VisaApiClient::with_base_url(&server.uri(), Some("secret".into()));
    let documents = client.fetch_documents("visa-jp").await.unwrap();

    assert_eq!(documents.len(), 2);
    assert_eq!(documents[0].id, "d1");
    assert_eq!(documents[1].name, "Photo");
    assert!(!documents[1].is_mandatory);
}

#[tokio::test]
async fn catalog_server_error_is_a_bad_response() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({"message": "db down"})))
        .mount(&server)
        .await;

    let client = VisaApiClient::with_base_url(&server.uri(), None);
    let err = client.fetch_documents("visa-jp").await.unwrap_err();

    assert_eq!(
        err,
        CatalogError::BadResponse {
            visa_id: "visa-jp".into(),
            status: 500,
            message: Some("db down".into()),
        }
    );
}

#[tokio::test]
async fn missing_application_is_not_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/VisaApplication/application/pay_77"))
        .respond_with(
            ResponseTemplate::new(404).set_body_json(json!({"message": "Payment not found"})),
        )
        .mount(&server)
        .await;

    let client = VisaApiClient::with_base_url(&server.uri(), None);
    assert_eq!(client.fetch_application("pay_77").await.unwrap(), None);
}

#[tokio::test]
async fn existing_application_is_decoded() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/VisaApplication/application/pay_77"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "visaApplication": {
                "visaId": "visa-jp",
                "paymentId": "pay_77",
                "travellers": "1",
                "documents": {"0_d1": {"front": {"url": "https://cdn/f.jpg", "fileName": "Passport"}}},
                "passportData": [],
                "isFinalSubmit": false
            }
        })))
        .mount(&server)
        .await;

    let client = VisaApiClient::with_base_url(&server.uri(), None);
    let aggregate = client.fetch_application("pay_77").await.unwrap().unwrap();
    assert_eq!(aggregate.travellers, 1);
    assert!(aggregate.documents.contains_key("0_d1"));
}

#[tokio::test]
async fn step_save_posts_multipart_with_keyed_file_part() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/VisaApplication/apply-visa"))
        .and(body_string_contains("documents[0][d1][back]"))
        .and(body_string_contains("documentsMetadata"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "message": "saved",
            "visaApplication": {
                "visaId": "visa-jp",
                "travellers": 1,
                "documents": {"0_d1": {"back": {"url": "https://cdn/b.jpg", "fileName": "Passport"}}},
                "isFinalSubmit": false
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = VisaApiClient::with_base_url(&server.uri(), None);
    let document = DocumentRequirement::new("d1", "Passport", true);
    let file = jpeg("back.jpg");
    let payload = StepPayload::step(&applicant(), 0, &document, Side::Back, Some(&file), None);

    let aggregate = client.save(&payload).await.unwrap();
    assert!(aggregate.documents["0_d1"].back.is_some());

    let requests = server.received_requests().await.unwrap();
    let body = String::from_utf8_lossy(&requests[0].body);
    assert!(body.contains("name=\"paymentId\""));
    assert!(!body.contains("isFinalSubmit"));
}

#[tokio::test]
async fn rejected_save_surfaces_status_and_message() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(400)
                .set_body_json(json!({"error": "Invalid passportData format"})),
        )
        .mount(&server)
        .await;

    let client = VisaApiClient::with_base_url(&server.uri(), None);
    let document = DocumentRequirement::new("d1", "Passport", true);
    let payload = StepPayload::step(&applicant(), 0, &document, Side::Front, None, None);

    let err = client.save(&payload).await.unwrap_err();
    assert!(matches!(
        err,
        PersistenceError::Status { status: 400, message: Some(ref m), .. }
            if m == "Invalid passportData format"
    ));
}

#[tokio::test]
async fn ocr_extract_parses_passport_fields() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/warmup"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/extract"))
        .and(body_string_contains("name=\"file\""))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "filename": "front.jpg",
            "data": {"passport_number": "K1234567", "surname": "SHARMA", "spouse_name": null},
            "timestamp": "2024-05-01T10:00:00Z"
        })))
        .mount(&server)
        .await;

    let client = OcrClient::with_base_url(&server.uri(), Duration::from_secs(5));
    client.warm_up().await.unwrap();
    let response = client.extract(&jpeg("front.jpg")).await.unwrap();

    assert!(response.success);
    assert_eq!(response.data.passport_number, "K1234567");
    assert_eq!(response.data.spouse_name, "");
}

#[tokio::test]
async fn ocr_status_codes_are_classified() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/extract"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/extract"))
        .respond_with(ResponseTemplate::new(422).set_body_string("not an image"))
        .mount(&server)
        .await;

    let client = OcrClient::with_base_url(&server.uri(), Duration::from_secs(5));

    let first = client.extract(&jpeg("a.jpg")).await.unwrap_err();
    assert!(matches!(first, OcrError::Server { status: 503, .. }));
    assert!(first.is_transient());

    let second = client.extract(&jpeg("a.jpg")).await.unwrap_err();
    assert_eq!(
        second,
        OcrError::Client {
            status: 422,
            body: Some("not an image".into())
        }
    );
}

#[tokio::test]
async fn slow_ocr_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/extract"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
        .mount(&server)
        .await;

    let client = OcrClient::with_base_url(&server.uri(), Duration::from_millis(50));
    let err = client.extract(&jpeg("a.jpg")).await.unwrap_err();
    assert!(matches!(err, OcrError::Timeout { millis: 50 }));
}
