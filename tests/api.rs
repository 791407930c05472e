use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use cardfile::{AppState, PhotoManager, Store};
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

const BOUNDARY: &str = "cardfile-test-boundary";

enum Part<'a> {
    Text(&'a str, &'a str),
    File(&'a str, &'a str, Vec<u8>),
}

struct TestApp {
    _dir: TempDir,
    uploads: PathBuf,
    router: Router,
}

impl TestApp {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let uploads = dir.path().join("uploads");
        let store = Store::open(dir.path().join("cards.db")).unwrap();
        let photos = PhotoManager::new(&uploads, store.clone());
        let state = Arc::new(AppState { store, photos });
        let router = cardfile::router(state, 16 * 1024 * 1024);
        Self { _dir: dir, uploads, router }
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, body)
    }

    async fn get(&self, uri: &str) -> (StatusCode, Value) {
        self.send(Request::get(uri).body(Body::empty()).unwrap()).await
    }

    async fn delete(&self, uri: &str) -> (StatusCode, Value) {
        self.send(Request::delete(uri).body(Body::empty()).unwrap()).await
    }

    async fn multipart(&self, method: Method, uri: &str, parts: &[Part<'_>]) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(multipart_body(parts)))
            .unwrap();
        self.send(request).await
    }

    async fn create(&self, parts: &[Part<'_>]) -> Value {
        let (status, body) = self.multipart(Method::POST, "/api/cards", parts).await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        body
    }

    fn photo_file(&self, photo_url: &str) -> PathBuf {
        self.uploads.join(photo_url.trim_start_matches("/uploads/"))
    }
}

fn multipart_body(parts: &[Part<'_>]) -> Vec<u8> {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        match part {
            Part::Text(name, value) => {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n")
                        .as_bytes(),
                );
            }
            Part::File(name, filename, data) => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{name}\"; filename=\"{filename}\"\r\n\
                         Content-Type: application/octet-stream\r\n\r\n"
                    )
                    .as_bytes(),
                );
                body.extend_from_slice(data);
                body.extend_from_slice(b"\r\n");
            }
        }
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

fn tag_count(tags: &Value, name: &str) -> Option<i64> {
    tags.as_array()?
        .iter()
        .find(|t| t["name"] == name)
        .and_then(|t| t["count"].as_i64())
}

#[tokio::test]
async fn create_delete_scenario_keeps_tags() {
    let app = TestApp::new();
    app.create(&[Part::Text("name", "Grace Hopper"), Part::Text("tags", r#"["fintech"]"#)])
        .await;

    let card = app
        .create(&[
            Part::Text("name", "Ada Lovelace"),
            Part::Text("tags", r#"["fintech","government"]"#),
        ])
        .await;
    let id = card["id"].as_i64().unwrap();
    assert_eq!(card["tags"], serde_json::json!(["fintech", "government"]));
    assert_eq!(card["photo_url"], "");

    let (_, tags) = app.get("/api/tags").await;
    assert_eq!(tag_count(&tags, "fintech"), Some(2));
    assert_eq!(tag_count(&tags, "government"), Some(1));

    let (status, _) = app.delete(&format!("/api/cards/{id}")).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, body) = app.get(&format!("/api/cards/{id}")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["kind"], "not_found");

    let (_, tags) = app.get("/api/tags").await;
    assert_eq!(tag_count(&tags, "fintech"), Some(1));
    assert_eq!(tag_count(&tags, "government"), Some(0));
}

#[tokio::test]
async fn create_returns_full_aggregate() {
    let app = TestApp::new();
    let card = app
        .create(&[
            Part::Text("name", "  Ada Lovelace  "),
            Part::Text("company", "Analytical Engines"),
            Part::Text("phones", r#"[{"label":"mobile","number":"+44 1"},{"label":"fax","number":""}]"#),
            Part::Text("emails", r#"[{"label":"work","address":"ada@engines.example"}]"#),
            Part::Text("addresses", r#"[{"label":"office","street":"1 Square","city":"London"}]"#),
            Part::Text("tags", r#"["Fintech"]"#),
        ])
        .await;

    assert_eq!(card["name"], "Ada Lovelace");
    assert_eq!(card["company"], "Analytical Engines");
    assert_eq!(card["phones"].as_array().unwrap().len(), 1);
    assert_eq!(card["phones"][0]["number"], "+44 1");
    assert_eq!(card["emails"][0]["address"], "ada@engines.example");
    assert_eq!(card["addresses"][0]["city"], "London");
    assert_eq!(card["tags"], serde_json::json!(["fintech"]));
    assert!(card["created_at"].is_string());
    assert!(card["updated_at"].is_string());
}

#[tokio::test]
async fn missing_name_is_a_validation_error() {
    let app = TestApp::new();
    let (status, body) = app
        .multipart(Method::POST, "/api/cards", &[Part::Text("title", "CTO")])
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "validation");
    assert_eq!(body["error"], "name is required");

    let (_, cards) = app.get("/api/cards").await;
    assert_eq!(cards, serde_json::json!([]));
}

#[tokio::test]
async fn malformed_sub_fields_become_empty() {
    let app = TestApp::new();
    let card = app
        .create(&[
            Part::Text("name", "Ada"),
            Part::Text("phones", "[{broken"),
            Part::Text("tags", r#"["kept"]"#),
        ])
        .await;
    assert_eq!(card["phones"], serde_json::json!([]));
    assert_eq!(card["tags"], serde_json::json!(["kept"]));
}

#[tokio::test]
async fn search_is_case_insensitive_and_combines_with_tag() {
    let app = TestApp::new();
    app.create(&[Part::Text("name", "Ada Lovelace"), Part::Text("tags", r#"["fintech"]"#)])
        .await;
    app.create(&[
        Part::Text("name", "Grace Hopper"),
        Part::Text("emails", r#"[{"label":"work","address":"grace@navy.example"}]"#),
    ])
    .await;

    for q in ["ada", "ADA"] {
        let (status, cards) = app.get(&format!("/api/cards?q={q}")).await;
        assert_eq!(status, StatusCode::OK);
        let cards = cards.as_array().unwrap();
        assert_eq!(cards.len(), 1);
        assert_eq!(cards[0]["name"], "Ada Lovelace");
        assert!(cards[0].get("phones").is_none(), "list returns summaries");
    }

    let (_, cards) = app.get("/api/cards?q=NAVY").await;
    assert_eq!(cards[0]["name"], "Grace Hopper");

    let (_, cards) = app.get("/api/cards?q=ada&tag=fintech").await;
    assert_eq!(cards.as_array().unwrap().len(), 1);
    let (_, cards) = app.get("/api/cards?q=grace&tag=fintech").await;
    assert_eq!(cards, serde_json::json!([]));
}

#[tokio::test]
async fn update_replaces_children_and_rejects_unknown_ids() {
    let app = TestApp::new();
    let card = app
        .create(&[
            Part::Text("name", "Ada"),
            Part::Text("phones", r#"[{"label":"work","number":"1"},{"label":"home","number":"2"}]"#),
            Part::Text("tags", r#"["old"]"#),
        ])
        .await;
    let id = card["id"].as_i64().unwrap();

    let (status, updated) = app
        .multipart(
            Method::PUT,
            &format!("/api/cards/{id}"),
            &[
                Part::Text("name", "Ada King"),
                Part::Text("phones", r#"[{"label":"mobile","number":"3"}]"#),
                Part::Text("tags", r#"["new"]"#),
            ],
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["name"], "Ada King");
    assert_eq!(updated["phones"].as_array().unwrap().len(), 1);
    assert_eq!(updated["phones"][0]["number"], "3");
    assert_eq!(updated["tags"], serde_json::json!(["new"]));
    assert_eq!(updated["created_at"], card["created_at"]);

    let (status, body) = app
        .multipart(Method::PUT, "/api/cards/9999", &[Part::Text("name", "Ghost")])
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["kind"], "not_found");
}

#[tokio::test]
async fn non_multipart_bodies_are_validation_errors() {
    let app = TestApp::new();
    let card = app.create(&[Part::Text("name", "Ada")]).await;
    let id = card["id"].as_i64().unwrap();

    for (method, uri) in [
        (Method::POST, "/api/cards".to_string()),
        (Method::PUT, format!("/api/cards/{id}")),
        (Method::POST, format!("/api/cards/{id}/photo")),
    ] {
        let request = Request::builder()
            .method(method)
            .uri(uri.as_str())
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"name":"Ada"}"#))
            .unwrap();
        let (status, body) = app.send(request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
        assert_eq!(body["kind"], "validation", "{uri}");
        assert!(body["error"].is_string(), "{uri}");
    }

    let (_, fetched) = app.get(&format!("/api/cards/{id}")).await;
    assert_eq!(fetched["name"], "Ada");
}

#[tokio::test]
async fn malformed_query_is_a_validation_error() {
    let app = TestApp::new();
    let (status, body) = app.get("/api/cards?q=ada&q=grace").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "validation");
}

#[tokio::test]
async fn unparseable_id_is_a_validation_error() {
    let app = TestApp::new();
    let (status, body) = app.get("/api/cards/abc").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "validation");
}

#[tokio::test]
async fn photo_lifecycle() {
    let app = TestApp::new();
    let card = app
        .create(&[
            Part::Text("name", "Ada"),
            Part::File("photo", "ada.png", b"first-png".to_vec()),
        ])
        .await;
    let id = card["id"].as_i64().unwrap();
    let first_url = card["photo_url"].as_str().unwrap().to_string();
    assert!(first_url.starts_with(&format!("/uploads/card_{id}_")));
    assert!(app.photo_file(&first_url).exists());

    let response = app
        .router
        .clone()
        .oneshot(Request::get(first_url.as_str()).body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "image/png");
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&bytes[..], b"first-png");

    let (status, body) = app
        .multipart(
            Method::POST,
            &format!("/api/cards/{id}/photo"),
            &[Part::File("photo", "ada.webp", b"second".to_vec())],
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let second_url = body["photo_url"].as_str().unwrap().to_string();
    assert_ne!(second_url, first_url);
    assert!(!app.photo_file(&first_url).exists(), "replaced photo is removed");
    assert!(app.photo_file(&second_url).exists());

    let (status, _) = app.delete(&format!("/api/cards/{id}/photo")).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert!(!app.photo_file(&second_url).exists());
    let (_, card) = app.get(&format!("/api/cards/{id}")).await;
    assert_eq!(card["photo_url"], "");
}

#[tokio::test]
async fn update_with_photo_replaces_the_old_file() {
    let app = TestApp::new();
    let card = app
        .create(&[
            Part::Text("name", "Ada"),
            Part::File("photo", "ada.jpg", b"first".to_vec()),
        ])
        .await;
    let id = card["id"].as_i64().unwrap();
    let first_url = card["photo_url"].as_str().unwrap().to_string();

    let (status, updated) = app
        .multipart(
            Method::PUT,
            &format!("/api/cards/{id}"),
            &[
                Part::Text("name", "Ada King"),
                Part::File("photo", "ada.png", b"second".to_vec()),
            ],
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{updated}");
    assert_eq!(updated["name"], "Ada King");
    let second_url = updated["photo_url"].as_str().unwrap().to_string();
    assert_ne!(second_url, first_url);
    assert!(second_url.ends_with(".png"));
    assert!(!app.photo_file(&first_url).exists(), "old photo is removed");
    assert_eq!(std::fs::read(app.photo_file(&second_url)).unwrap(), b"second");

    // An update without a photo part leaves the current photo alone.
    let (_, kept) = app
        .multipart(Method::PUT, &format!("/api/cards/{id}"), &[Part::Text("name", "Ada")])
        .await;
    assert_eq!(kept["photo_url"], second_url.as_str());
    assert!(app.photo_file(&second_url).exists());
}

#[tokio::test]
async fn rejected_uploads_keep_the_existing_photo() {
    let app = TestApp::new();
    let card = app
        .create(&[
            Part::Text("name", "Ada"),
            Part::File("photo", "ada.jpg", b"original".to_vec()),
        ])
        .await;
    let id = card["id"].as_i64().unwrap();
    let url = card["photo_url"].as_str().unwrap().to_string();

    let too_big = vec![0u8; 6 * 1024 * 1024];
    let (status, body) = app
        .multipart(
            Method::POST,
            &format!("/api/cards/{id}/photo"),
            &[Part::File("photo", "big.jpg", too_big)],
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "validation");

    let (status, _) = app
        .multipart(
            Method::POST,
            &format!("/api/cards/{id}/photo"),
            &[Part::File("photo", "photo.gif", b"GIF89a".to_vec())],
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, card) = app.get(&format!("/api/cards/{id}")).await;
    assert_eq!(card["photo_url"], url.as_str());
    assert!(app.photo_file(&url).exists());
    let leftovers: Vec<_> = std::fs::read_dir(&app.uploads).unwrap().collect();
    assert_eq!(leftovers.len(), 1, "no partial uploads remain");
}

#[tokio::test]
async fn invalid_photo_on_create_writes_nothing() {
    let app = TestApp::new();
    let (status, _) = app
        .multipart(
            Method::POST,
            "/api/cards",
            &[Part::Text("name", "Ada"), Part::File("photo", "ada.gif", b"x".to_vec())],
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (_, cards) = app.get("/api/cards").await;
    assert_eq!(cards, serde_json::json!([]));
}

#[tokio::test]
async fn deleting_a_card_removes_its_photo() {
    let app = TestApp::new();
    let card = app
        .create(&[
            Part::Text("name", "Ada"),
            Part::File("photo", "ada.jpeg", b"bytes".to_vec()),
        ])
        .await;
    let id = card["id"].as_i64().unwrap();
    let file = app.photo_file(card["photo_url"].as_str().unwrap());
    assert!(file.exists());

    let (status, _) = app.delete(&format!("/api/cards/{id}")).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert!(!file.exists());

    let (status, _) = app.delete(&format!("/api/cards/{id}")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn photo_upload_to_missing_card_is_not_found() {
    let app = TestApp::new();
    let (status, _) = app
        .multipart(
            Method::POST,
            "/api/cards/77/photo",
            &[Part::File("photo", "a.png", b"x".to_vec())],
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app.delete("/api/cards/77/photo").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn uploads_reject_traversal_and_missing_files() {
    let app = TestApp::new();
    let (status, _) = app.get("/uploads/..%2Fcards.db").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app.get("/uploads/nothing-here.png").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn health_reports_database_status() {
    let app = TestApp::new();
    let (status, body) = app.get("/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, serde_json::json!({"status": "ok", "db": "ok"}));
}

#[tokio::test]
async fn concurrent_creates_share_one_new_tag() {
    let app = Arc::new(TestApp::new());
    let tasks: Vec<_> = ["Ada", "Grace"]
        .into_iter()
        .map(|name| {
            let app = app.clone();
            tokio::spawn(async move {
                app.create(&[Part::Text("name", name), Part::Text("tags", r#"["fintech"]"#)])
                    .await
            })
        })
        .collect();
    for task in tasks {
        task.await.unwrap();
    }

    let (_, tags) = app.get("/api/tags").await;
    assert_eq!(tags, serde_json::json!([{"name": "fintech", "count": 2}]));
}
