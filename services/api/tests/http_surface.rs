//! End-to-end tests of the HTTP surface against the in-memory backends and a
//! stand-in catalog server.

use api_lib::adapters::{FileSettingsStore, InMemoryAuthProvider, InMemoryDocumentStore};
use api_lib::config::Config;
use api_lib::web::{self, AppState};
use axum::{extract::Query, http::StatusCode, routing::get, Json, Router};
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use stream_track_core::domain::collections::ALLOWED_USERS;
use stream_track_core::domain::Principal;
use tempfile::TempDir;

const ME: &str = "me@example.com";

struct TestApp {
    base: String,
    client: reqwest::Client,
    auth: Arc<InMemoryAuthProvider>,
    _settings_dir: TempDir,
}

impl TestApp {
    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    async fn get_json(&self, path: &str) -> (reqwest::StatusCode, Value) {
        let response = self.client.get(self.url(path)).send().await.unwrap();
        let status = response.status();
        let body = response.json::<Value>().await.unwrap_or(Value::Null);
        (status, body)
    }

    /// Polls `GET path` until `predicate` holds for the JSON body.
    async fn eventually<F>(&self, path: &str, predicate: F) -> Value
    where
        F: Fn(&Value) -> bool,
    {
        for _ in 0..100 {
            let (status, body) = self.get_json(path).await;
            if status.is_success() && predicate(&body) {
                return body;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("GET {} never reached the expected state", path);
    }
}

async fn fake_catalog() -> String {
    async fn search(
        Query(params): Query<HashMap<String, String>>,
    ) -> Result<Json<Value>, StatusCode> {
        if params.get("api_key").map(String::as_str) != Some("local-key") {
            return Err(StatusCode::UNAUTHORIZED);
        }
        Ok(Json(json!({
            "page": 1,
            "results": [{ "id": 1, "media_type": "tv", "name": params.get("query") }],
            "total_pages": 1,
            "total_results": 1
        })))
    }

    let app = Router::new().route("/search/multi", get(search));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

async fn spawn_app(sign_in_as: &str, allowed: &[&str]) -> TestApp {
    let catalog = fake_catalog().await;
    let settings_dir = tempfile::tempdir().unwrap();
    let settings_path = settings_dir.path().join("settings.json");

    let vars: HashMap<&str, String> = HashMap::from([
        ("BIND_ADDRESS", "127.0.0.1:0".to_string()),
        ("DEV_USER_EMAIL", sign_in_as.to_string()),
        ("TMDB_BASE_URL", catalog),
        ("SETTINGS_PATH", settings_path.display().to_string()),
    ]);
    let config = Arc::new(Config::from_lookup(|name| vars.get(name).cloned()).unwrap());

    let store = Arc::new(InMemoryDocumentStore::new());
    for email in allowed {
        store.insert(ALLOWED_USERS, email, Map::new());
    }
    let auth = Arc::new(InMemoryAuthProvider::new(Principal {
        id: "user-1".to_string(),
        email: sign_in_as.to_string(),
        display_name: Some("Tester".to_string()),
    }));
    let settings = Arc::new(FileSettingsStore::new(&config.settings_path));

    let state = Arc::new(AppState::new(config, auth.clone(), store, settings));
    state.spawn_collection_lifecycle();

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = web::router(state);
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    TestApp {
        base: format!("http://{}", addr),
        client: reqwest::Client::new(),
        auth,
        _settings_dir: settings_dir,
    }
}

#[tokio::test]
async fn watchlist_round_trip_for_an_allowlisted_user() {
    let app = spawn_app(ME, &[ME]).await;

    // Signed out: the login destination is open, everything else is not.
    let (status, session) = app.get_json("/login").await;
    assert_eq!(status, reqwest::StatusCode::OK);
    assert_eq!(session["email"], Value::Null);
    let response = app.client.get(app.url("/media")).send().await.unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::UNAUTHORIZED);

    // Sign in.
    let response = app.client.post(app.url("/login")).send().await.unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    let session: Value = response.json().await.unwrap();
    assert_eq!(session["email"], json!(ME));
    assert_eq!(session["authorized"], json!(true));
    assert_eq!(session["lastError"], Value::Null);

    // Create.
    let response = app
        .client
        .post(app.url("/media"))
        .json(&json!({ "title": "Dark", "type": "tv", "tmdbId": 70523, "status": "watching" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::CREATED);
    let id = response.json::<Value>().await.unwrap()["id"]
        .as_str()
        .unwrap()
        .to_string();
    let items = app
        .eventually("/media", |items| items.as_array().map_or(false, |a| a.len() == 1))
        .await;
    assert_eq!(items[0]["id"], json!(id));
    assert_eq!(items[0]["title"], json!("Dark"));
    assert!(items[0]["createdAt"].is_string());

    // Update one field.
    let response = app
        .client
        .patch(app.url(&format!("/media/{}", id)))
        .json(&json!({ "status": "watched" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::NO_CONTENT);
    let items = app
        .eventually("/media", |items| items[0]["status"] == json!("watched"))
        .await;
    assert_eq!(items[0]["title"], json!("Dark"));
    assert_eq!(items[0]["tmdbId"], json!(70523));

    // Delete.
    let response = app
        .client
        .delete(app.url(&format!("/media/{}", id)))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::NO_CONTENT);
    app.eventually("/media", |items| items.as_array().map_or(false, |a| a.is_empty()))
        .await;

    // Sign out: protected routes close again.
    let response = app.client.post(app.url("/logout")).send().await.unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    let response = app.client.get(app.url("/media")).send().await.unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn catalog_search_needs_a_configured_key() {
    let app = spawn_app(ME, &[ME]).await;
    app.client.post(app.url("/login")).send().await.unwrap();

    let response = app
        .client
        .get(app.url("/catalog/search?query=dark"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::PRECONDITION_FAILED);

    let response = app
        .client
        .put(app.url("/settings/api-key"))
        .json(&json!({ "key": "local-key" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::NO_CONTENT);

    let (status, results) = app.get_json("/catalog/search?query=dark").await;
    assert_eq!(status, reqwest::StatusCode::OK);
    assert_eq!(results["results"][0]["name"], json!("dark"));
}

#[tokio::test]
async fn signed_in_user_outside_the_allowlist_is_forbidden() {
    let app = spawn_app("stranger@example.com", &[ME]).await;

    let response = app.client.post(app.url("/login")).send().await.unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    let session: Value = response.json().await.unwrap();
    assert_eq!(session["authorized"], json!(false));
    assert_eq!(session["lastError"], json!("not authorized"));

    let response = app.client.get(app.url("/media")).send().await.unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::FORBIDDEN);

    // Logout only needs a signed-in user.
    let response = app.client.post(app.url("/logout")).send().await.unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);
}

#[tokio::test]
async fn switching_to_an_unlisted_user_is_forbidden_right_away() {
    let app = spawn_app(ME, &[ME]).await;
    app.client.post(app.url("/login")).send().await.unwrap();
    app.eventually("/media", Value::is_array).await;

    app.auth.set_principal(Some(Principal {
        id: "user-2".to_string(),
        email: "stranger@example.com".to_string(),
        display_name: None,
    }));
    let response = app.client.get(app.url("/media")).send().await.unwrap();

    assert_eq!(response.status(), reqwest::StatusCode::FORBIDDEN);
    assert_eq!(response.text().await.unwrap(), "not authorized");
}
