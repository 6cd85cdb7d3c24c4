//! End-to-end behavior of the HTTP routes against a temporary data directory.

use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use axum::response::Response;
use lopdf::content::{Content, Operation};
use lopdf::{Document, Object, Stream, StringFormat, dictionary};
use serde_json::{Value, json};
use tempfile::TempDir;
use tower::ServiceExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use revdesk_providers::WebhookNotifier;
use revdesk_server::{AppState, router};
use revdesk_store::{Store, builtin_seed};
use revdesk_types::Settings;

const BOUNDARY: &str = "revdesk-test-boundary";

const MEMO: &str = "Proje Kodu: 2024-123456\n\
    Talep Tutarı: 2.500.000 TL\n\
    \n\
    GEREKÇE\n\
    Sinyalizasyon ve enerji sistemlerindeki maliyet artışları nedeniyle ek ödenek gereklidir.\n";

/// A one-page request letter whose lines all sit in a single text object.
fn memo_pdf() -> Vec<u8> {
    let line = |text: &[u8]| Object::String(text.to_vec(), StringFormat::Literal);
    let operations = vec![
        Operation::new("BT", vec![]),
        Operation::new("Tf", vec!["F1".into(), 11.into()]),
        Operation::new("TL", vec![15.into()]),
        Operation::new("Td", vec![60.into(), 780.into()]),
        Operation::new("Tj", vec![line(b"T.C. Ulastirma Bakanligi")]),
        Operation::new("'", vec![line(b"Konu: Yatirim programi revizyon talebi")]),
        Operation::new("'", vec![line(b"Proje Kodu: 2024-123456")]),
        Operation::new("'", vec![line(b"Talep Tutari: 1.500.000 TL")]),
        Operation::new("T*", vec![]),
        Operation::new("'", vec![line(b"Gerek\xe7e:")]),
        Operation::new("'", vec![line(b"Kur farklari nedeniyle ek odenek gerekmektedir.")]),
        Operation::new("ET", vec![]),
    ];

    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
        "Encoding" => "WinAnsiEncoding",
    });
    let content = Content { operations }.encode().expect("encode content");
    let content_id = doc.add_object(Stream::new(dictionary! {}, content));
    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "Contents" => content_id,
        "Resources" => dictionary! { "Font" => dictionary! { "F1" => font_id } },
    });
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![page_id.into()],
            "Count" => 1,
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).expect("write pdf");
    bytes
}

struct Harness {
    _dir: TempDir,
    settings: Settings,
    app: Router,
}

fn harness_with(configure: impl FnOnce(AppState) -> AppState) -> Harness {
    let dir = tempfile::tempdir().expect("tempdir");
    let settings = Settings {
        base_url: "http://desk.test".to_string(),
        data_dir: dir.path().join("data"),
        storage_dir: dir.path().join("storage"),
        output_dir: dir.path().join("outputs"),
        ..Settings::default()
    };
    let mut store = Store::open_in_memory().expect("store");
    store
        .seed_projects_if_empty(&builtin_seed().expect("seed"))
        .expect("seed store");
    let state = configure(AppState::new(settings.clone(), store));
    Harness {
        _dir: dir,
        settings,
        app: router(state),
    }
}

fn harness() -> Harness {
    harness_with(|state| state)
}

async fn send(app: &Router, request: Request<Body>) -> Response {
    app.clone().oneshot(request).await.expect("router is infallible")
}

async fn get(app: &Router, uri: &str) -> Response {
    send(app, Request::get(uri).body(Body::empty()).unwrap()).await
}

async fn body_text(response: Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

async fn get_json(app: &Router, uri: &str) -> Value {
    let response = get(app, uri).await;
    assert_eq!(response.status(), StatusCode::OK, "GET {uri}");
    serde_json::from_str(&body_text(response).await).unwrap()
}

async fn post_form(app: &Router, uri: &str, form: &str) -> Response {
    send(
        app,
        Request::post(uri)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(form.to_string()))
            .unwrap(),
    )
    .await
}

/// Upload a document and return the new request id.
async fn upload(app: &Router, filename: &str, content: &[u8]) -> String {
    let mut body = format!(
        "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\n\
         Content-Type: application/octet-stream\r\n\r\n"
    )
    .into_bytes();
    body.extend_from_slice(content);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

    let response = send(
        app,
        Request::post("/upload")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    let location = response.headers()[header::LOCATION].to_str().unwrap();
    location
        .strip_prefix("/requests/")
        .expect("redirects to the request page")
        .to_string()
}

fn has_action(view: &Value, action: &str) -> bool {
    view["audits"]
        .as_array()
        .unwrap()
        .iter()
        .any(|entry| entry["action"] == action)
}

/// Poll the JSON view until one of `actions` shows up in the audit log.
async fn wait_for(app: &Router, id: &str, actions: &[&str]) -> Value {
    for _ in 0..200 {
        let view = get_json(app, &format!("/api/requests/{id}")).await;
        if actions.iter().any(|action| has_action(&view, action)) {
            return view;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    panic!("request {id} never reached {actions:?}");
}

#[tokio::test]
async fn health_reports_ok() {
    let h = harness();
    let body = get_json(&h.app, "/health").await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["service"], Settings::DEFAULT_APP_NAME);
    assert!(body["timestamp"].is_string());
}

#[tokio::test]
async fn static_pages_render() {
    let h = harness();
    for uri in ["/", "/upload", "/requests", "/dashboard"] {
        let response = get(&h.app, uri).await;
        assert_eq!(response.status(), StatusCode::OK, "GET {uri}");
    }
    let dashboard = body_text(get(&h.app, "/dashboard").await).await;
    assert!(dashboard.contains("Metro Line Modernization"));
}

#[tokio::test]
async fn pdf_upload_fields_are_extracted() {
    let h = harness();
    let id = upload(&h.app, "memo.pdf", &memo_pdf()).await;

    let view = wait_for(&h.app, &id, &["processed", "process_failed"]).await;
    assert!(has_action(&view, "processed"));
    assert_eq!(view["filename"], "memo.pdf");
    assert_eq!(view["project_code"], "2024-123456");
    assert_eq!(view["requested_amount_try"], 1_500_000);
    assert_eq!(
        view["justification"],
        "Kur farklari nedeniyle ek odenek gerekmektedir."
    );
    assert!(
        view["extracted_text"]
            .as_str()
            .unwrap()
            .contains("Proje Kodu: 2024-123456\nTalep Tutari: 1.500.000 TL\n")
    );

    let original = get(&h.app, &format!("/requests/{id}/download")).await;
    assert_eq!(original.headers()[header::CONTENT_TYPE], "application/pdf");
}

#[tokio::test]
async fn upload_is_processed_and_scored() {
    let h = harness();
    let id = upload(&h.app, "memo.txt", MEMO.as_bytes()).await;

    let view = wait_for(&h.app, &id, &["processed", "process_failed"]).await;
    assert!(has_action(&view, "created"));
    assert!(has_action(&view, "processed"));
    assert_eq!(view["status"], "pending");
    assert_eq!(view["filename"], "memo.txt");
    assert_eq!(view["project_code"], "2024-123456");
    assert_eq!(view["requested_amount_try"], 2_500_000);
    // 2.5M of a 12M budget is over 20%.
    assert_eq!(view["risk_score"], 15);
    assert_eq!(view["risk_band"], "low");

    let extracted: Value = serde_json::from_str(view["extracted_json"].as_str().unwrap()).unwrap();
    assert_eq!(extracted["method"], "rules");

    let detail = body_text(get(&h.app, &format!("/requests/{id}")).await).await;
    assert!(detail.contains("Metro Line Modernization"));
    assert!(detail.contains("2.500.000"));

    let original = get(&h.app, &format!("/requests/{id}/download")).await;
    assert_eq!(original.status(), StatusCode::OK);
    assert_eq!(
        original.headers()[header::CONTENT_DISPOSITION],
        "attachment; filename=\"memo.txt\""
    );
    assert_eq!(body_text(original).await, MEMO);

    let stored = std::fs::read_dir(h.settings.uploads_dir()).unwrap().count();
    assert_eq!(stored, 1);
}

#[tokio::test]
async fn approval_writes_brief_and_knowledge_base_entry() {
    let h = harness();
    let id = upload(&h.app, "memo.txt", MEMO.as_bytes()).await;
    wait_for(&h.app, &id, &["processed"]).await;

    let presentation_uri = format!("/requests/{id}/presentation");
    assert_eq!(
        get(&h.app, &presentation_uri).await.status(),
        StatusCode::NOT_FOUND
    );

    let response = post_form(&h.app, &format!("/requests/{id}/approve"), "note=Looks+fine").await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);

    let view = get_json(&h.app, &format!("/api/requests/{id}")).await;
    assert_eq!(view["status"], "approved");
    assert_eq!(view["decision"], "approved");
    assert_eq!(view["decision_note"], "Looks fine");
    assert!(has_action(&view, "decision"));
    assert!(has_action(&view, "presentation_generated"));

    let brief = get(&h.app, &presentation_uri).await;
    assert_eq!(brief.status(), StatusCode::OK);
    let brief = body_text(brief).await;
    assert!(brief.contains(&format!("Revision Request Brief: {id}")));
    assert!(brief.contains("Project name: Metro Line Modernization"));

    let kb = std::fs::read_to_string(h.settings.knowledge_base_dir().join(format!("{id}.md")))
        .unwrap();
    assert!(kb.contains("- Decision: **APPROVED**"));
    assert!(kb.contains("Looks fine"));

    let dashboard = body_text(get(&h.app, "/dashboard").await).await;
    // 12.000.000 budget + 2.500.000 approved
    assert!(dashboard.contains("<td>2.500.000</td><td>14.500.000</td>"));

    let again = post_form(&h.app, &format!("/requests/{id}/reject"), "note=").await;
    assert_eq!(again.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn rejection_writes_only_knowledge_base_entry() {
    let h = harness();
    let id = upload(&h.app, "memo.txt", MEMO.as_bytes()).await;
    wait_for(&h.app, &id, &["processed"]).await;

    let response = post_form(&h.app, &format!("/requests/{id}/reject"), "note=").await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);

    let view = get_json(&h.app, &format!("/api/requests/{id}")).await;
    assert_eq!(view["status"], "rejected");
    assert!(view["decision_note"].is_null());
    assert!(!has_action(&view, "presentation_generated"));
    assert!(
        h.settings
            .knowledge_base_dir()
            .join(format!("{id}.md"))
            .is_file()
    );
    assert_eq!(
        get(&h.app, &format!("/requests/{id}/presentation"))
            .await
            .status(),
        StatusCode::NOT_FOUND
    );
}

#[tokio::test]
async fn manual_edit_rescores() {
    let h = harness();
    let id = upload(&h.app, "memo.txt", MEMO.as_bytes()).await;
    wait_for(&h.app, &id, &["processed"]).await;

    // 2024-310077: 6.5M budget, 6.3M spent, 200k remaining.
    let response = post_form(
        &h.app,
        &format!("/requests/{id}/edit"),
        "project_code=2024-310077&requested_amount_try=1.500.000&justification=short",
    )
    .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);

    let view = get_json(&h.app, &format!("/api/requests/{id}")).await;
    assert_eq!(view["project_code"], "2024-310077");
    assert_eq!(view["requested_amount_try"], 1_500_000);
    assert_eq!(view["justification"], "short");
    assert_eq!(view["risk_score"], 50 + 15 + 15 + 10);
    assert_eq!(view["risk_band"], "high");
    assert!(has_action(&view, "edited"));
}

#[tokio::test]
async fn invalid_pdf_records_processing_error() {
    let h = harness();
    let id = upload(&h.app, "broken.pdf", b"not really a pdf").await;

    let view = wait_for(&h.app, &id, &["processed", "process_failed"]).await;
    assert!(has_action(&view, "process_failed"));
    assert!(
        view["risk_notes"]
            .as_str()
            .unwrap()
            .starts_with("PROCESSING ERROR: ")
    );
    assert!(view["risk_score"].is_null());
}

#[tokio::test]
async fn unknown_requests_are_not_found() {
    let h = harness();
    for uri in [
        "/requests/doesnotexist",
        "/requests/doesnotexist/download",
        "/requests/doesnotexist/presentation",
        "/api/requests/doesnotexist",
        "/requests/..%2Fetc",
    ] {
        assert_eq!(get(&h.app, uri).await.status(), StatusCode::NOT_FOUND, "GET {uri}");
    }
    let response = post_form(&h.app, "/requests/doesnotexist/approve", "note=").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn upload_without_file_field_is_rejected() {
    let h = harness();
    let body = format!(
        "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"other\"\r\n\r\nvalue\r\n--{BOUNDARY}--\r\n"
    );
    let response = send(
        &h.app,
        Request::post("/upload")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn processed_request_is_announced_on_webhook() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/hooks/desk"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let hook = format!("{}/hooks/desk", server.uri());
    let h = harness_with(|state| {
        state.with_notifier(WebhookNotifier::new(Some(hook)))
    });
    let id = upload(&h.app, "memo.txt", MEMO.as_bytes()).await;
    let view = wait_for(&h.app, &id, &["notified", "notify_failed"]).await;
    assert!(has_action(&view, "notified"));

    let received = server.received_requests().await.unwrap();
    let payload: Value = serde_json::from_slice(&received[0].body).unwrap();
    let text = payload["text"].as_str().unwrap();
    assert!(text.contains(&format!("(ID: {id})")));
    assert!(text.contains(&format!("http://desk.test/requests/{id}")));
}

#[tokio::test]
async fn webhook_failure_is_audited() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({ "error": "down" })))
        .mount(&server)
        .await;

    let hook = format!("{}/hooks/desk", server.uri());
    let h = harness_with(|state| {
        state.with_notifier(WebhookNotifier::new(Some(hook)))
    });
    let id = upload(&h.app, "memo.txt", MEMO.as_bytes()).await;
    let view = wait_for(&h.app, &id, &["notified", "notify_failed"]).await;
    assert!(has_action(&view, "notify_failed"));
    assert!(has_action(&view, "processed"));
    assert_eq!(view["project_code"], "2024-123456");
}
