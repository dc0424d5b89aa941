use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use bytes::Bytes;
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

use odinbook::avatars::fetch::FetchedImage;
use odinbook::avatars::{AvatarFetcher, FetchError};
use odinbook::config::Config;
use odinbook::db;
use odinbook::routes;
use odinbook::state::AppState;
use odinbook::storage::LocalBlobStore;

const FEDERATION_SECRET: &str = "bridge-secret";

/// Serves a tiny PNG for every URL and counts calls.
struct StubFetcher {
    calls: AtomicU32,
}

#[async_trait]
impl AvatarFetcher for StubFetcher {
    async fn fetch(&self, _url: &str) -> Result<FetchedImage, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(FetchedImage {
            data: Bytes::from_static(b"\x89PNG\r\n\x1a\n"),
            content_type: "image/png".to_string(),
        })
    }
}

struct TestApp {
    router: Router,
    fetcher: Arc<StubFetcher>,
    _temp_dir: TempDir,
}

fn test_app() -> TestApp {
    let temp_dir = TempDir::new().unwrap();
    let pool = db::create_pool(&temp_dir.path().join("test.db")).expect("Failed to create test database");
    db::run_migrations(&pool).expect("Failed to run migrations");

    let mut config = Config::default();
    config.auth.password_cost = 4;
    config.auth.federation_secret = Some(FEDERATION_SECRET.to_string());
    config.avatars.fetch_backoff_ms = 0;

    let fetcher = Arc::new(StubFetcher {
        calls: AtomicU32::new(0),
    });
    let state = AppState {
        db: pool,
        blobs: Arc::new(LocalBlobStore::new(
            temp_dir.path().join("uploads"),
            config.storage.public_prefix.clone(),
        )),
        avatar_fetcher: fetcher.clone(),
        config,
    };

    TestApp {
        router: routes::app(state),
        fetcher,
        _temp_dir: temp_dir,
    }
}

impl TestApp {
    async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    async fn get(&self, uri: &str, cookie: Option<&str>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method("GET").uri(uri);
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        self.send(builder.body(Body::empty()).unwrap()).await
    }

    async fn json(&self, method: &str, uri: &str, cookie: &str, body: Value) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::COOKIE, cookie)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        self.send(request).await
    }

    async fn empty(&self, method: &str, uri: &str, cookie: &str) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::COOKIE, cookie)
            .body(Body::empty())
            .unwrap();
        self.send(request).await
    }

    /// Register and return (user id, cookie header value).
    async fn register(&self, name: &str) -> (String, String) {
        let lower = name.to_lowercase();
        let request = Request::builder()
            .method("POST")
            .uri("/auth/register")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(
                json!({
                    "email": format!("{lower}@example.com"),
                    "password": format!("password-{lower}"),
                    "firstname": name,
                    "lastname": "Tester",
                })
                .to_string(),
            ))
            .unwrap();

        let response = self.router.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let cookie = session_cookie(&response);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        (body["id"].as_str().unwrap().to_string(), cookie)
    }
}

fn session_cookie<B>(response: &axum::http::Response<B>) -> String {
    response
        .headers()
        .get(header::SET_COOKIE)
        .expect("Set-Cookie header")
        .to_str()
        .unwrap()
        .split(';')
        .next()
        .unwrap()
        .to_string()
}

fn feed_ids(home: &Value) -> Vec<String> {
    home["feed"]
        .as_array()
        .expect("feed")
        .iter()
        .map(|p| p["id"].as_str().unwrap().to_string())
        .collect()
}

#[tokio::test]
async fn friendship_request_accept_and_feed() {
    let app = test_app();
    let (alice_id, alice) = app.register("Alice").await;
    let (bob_id, bob) = app.register("Bob").await;
    let (_carol_id, carol) = app.register("Carol").await;

    // Anonymous home page only shows the user count
    let (status, home) = app.get("/", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(home["user_count"], 3);
    assert!(home.get("feed").is_none());

    let (status, post) = app
        .json("POST", "/posts", &bob, json!({ "body": "hello from bob" }))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let post_id = post["id"].as_str().unwrap().to_string();

    // Not friends yet
    let (_, home) = app.get("/", Some(&alice)).await;
    assert!(!feed_ids(&home).contains(&post_id));

    // Alice asks Bob
    let uri = format!("/users/{bob_id}/friendships");
    let (status, created) = app.empty("POST", &uri, &alice).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["status"], "pending_outgoing");
    assert_eq!(created["friendship"]["accepted"], false);

    let (status, _) = app.empty("POST", &uri, &alice).await;
    assert_eq!(status, StatusCode::CONFLICT);

    // Bob sees the request on his own page
    let (status, index) = app.get(&uri, Some(&bob)).await;
    assert_eq!(status, StatusCode::OK);
    let requests = index["friend_requests"].as_array().unwrap();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0]["requester"]["id"], alice_id.as_str());
    assert!(index["friends"].as_array().unwrap().is_empty());

    // Others don't
    let (_, index) = app.get(&uri, Some(&alice)).await;
    assert!(index.get("friend_requests").is_none());

    let (_, home) = app.get("/", Some(&bob)).await;
    assert_eq!(home["has_pending_friend_requests"], true);

    let (_, profile) = app.get(&format!("/users/{alice_id}"), Some(&bob)).await;
    assert_eq!(profile["user"]["friendship"], "pending_incoming");

    // Bob accepts by asking back
    let (status, accepted) = app
        .empty("POST", &format!("/users/{alice_id}/friendships"), &bob)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(accepted["status"], "accepted");

    let (_, home) = app.get("/", Some(&bob)).await;
    assert_eq!(home["has_pending_friend_requests"], false);

    let (_, home) = app.get("/", Some(&alice)).await;
    assert_eq!(feed_ids(&home), vec![post_id.clone()]);
    assert_eq!(home["feed"][0]["author_name"], "Bob Tester");

    let (_, profile) = app.get(&format!("/users/{bob_id}"), Some(&alice)).await;
    assert_eq!(profile["friend_count"], 1);
    assert_eq!(profile["user"]["friendship"], "accepted");

    // Carol is not a friend of Bob
    let (_, home) = app.get("/", Some(&carol)).await;
    assert!(feed_ids(&home).is_empty());

    // Alice unfriends Bob; the post leaves her feed
    let friendship_id = accepted["friendship"]["id"].as_str().unwrap();
    let (status, _) = app
        .empty(
            "DELETE",
            &format!("/users/{alice_id}/friendships/{friendship_id}"),
            &carol,
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app
        .empty(
            "DELETE",
            &format!("/users/{alice_id}/friendships/{friendship_id}"),
            &alice,
        )
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, home) = app.get("/", Some(&alice)).await;
    assert!(feed_ids(&home).is_empty());
}

#[tokio::test]
async fn likes_and_comments() {
    let app = test_app();
    let (_alice_id, alice) = app.register("Alice").await;
    let (_bob_id, bob) = app.register("Bob").await;

    let (_, post) = app
        .json("POST", "/posts", &alice, json!({ "body": "first post" }))
        .await;
    let post_id = post["id"].as_str().unwrap();

    let likes_uri = format!("/posts/{post_id}/likes");
    let (status, liked) = app.empty("POST", &likes_uri, &bob).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(liked["like_count"], 1);

    // Liking twice keeps one like
    let (_, again) = app.empty("POST", &likes_uri, &bob).await;
    assert_eq!(again["like_count"], 1);
    assert_eq!(again["like"]["id"], liked["like"]["id"]);

    let like_id = liked["like"]["id"].as_str().unwrap();
    let (status, _) = app.empty("DELETE", &format!("/likes/{like_id}"), &alice).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app.empty("DELETE", &format!("/likes/{like_id}"), &bob).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, home) = app.get("/", Some(&alice)).await;
    assert_eq!(home["feed"][0]["like_count"], 0);

    let comments_uri = format!("/posts/{post_id}/comments");
    let (status, _) = app
        .json("POST", &comments_uri, &bob, json!({ "body": "nice" }))
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, errors) = app
        .json("POST", &comments_uri, &bob, json!({ "body": "   " }))
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(errors["errors"][0]["field"], "body");

    let (status, comments) = app.get(&comments_uri, Some(&alice)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(comments.as_array().unwrap().len(), 1);
    assert_eq!(comments[0]["body"], "nice");

    // Only the author can delete
    let (status, _) = app.empty("DELETE", &format!("/posts/{post_id}"), &bob).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = app.empty("DELETE", &format!("/posts/{post_id}"), &alice).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn profile_validation_and_auth() {
    let app = test_app();
    let (alice_id, alice) = app.register("Alice").await;

    let (status, errors) = app
        .json(
            "PUT",
            "/profile",
            &alice,
            json!({ "firstname": "Alice", "lastname": "Tester", "about": "a".repeat(256) }),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(errors["errors"][0]["field"], "about");

    let (status, user) = app
        .json(
            "PUT",
            "/profile",
            &alice,
            json!({ "firstname": "Alice", "lastname": "Tester", "about": "a".repeat(255) }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(user["about"].as_str().unwrap().len(), 255);

    let (status, _) = app.get("/users", None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app.get(&format!("/users/{alice_id}/friendships"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app.empty("POST", "/auth/logout", &alice).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (_, home) = app.get("/", Some(&alice)).await;
    assert!(home.get("user").is_none());
}

#[tokio::test]
async fn avatar_upload_replaces_gravatar() {
    let app = test_app();
    let (alice_id, alice) = app.register("Alice").await;

    let (_, profile) = app.get(&format!("/users/{alice_id}"), None).await;
    assert!(profile["user"]["avatar_url"]
        .as_str()
        .unwrap()
        .starts_with("https://www.gravatar.com/avatar/"));

    let boundary = "odinbook-test-boundary";
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{boundary}\r\nContent-Disposition: form-data; name=\"avatar\"; filename=\"me.png\"\r\nContent-Type: image/png\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(b"\x89PNG\r\n\x1a\n");
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());

    let request = Request::builder()
        .method("POST")
        .uri("/profile/avatar")
        .header(header::COOKIE, &alice)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={boundary}"),
        )
        .body(Body::from(body))
        .unwrap();
    let (status, user) = app.send(request).await;
    assert_eq!(status, StatusCode::OK);

    let avatar_url = user["avatar_url"].as_str().unwrap();
    assert!(avatar_url.starts_with("/uploads/"));
    assert!(avatar_url.contains("resize=80x80%5E"));

    let path = avatar_url.split('?').next().unwrap();
    let response = app
        .router
        .clone()
        .oneshot(Request::builder().uri(path).body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "image/png");
}

#[tokio::test]
async fn federated_sign_in_imports_avatar() {
    let app = test_app();
    let profile = json!({
        "provider": "facebook",
        "uid": "10001",
        "email": "dana@example.com",
        "first_name": "Dana",
        "last_name": "Scully",
        "image_url": "https://graph.test/10001/picture",
    });

    let unsigned = Request::builder()
        .method("POST")
        .uri("/auth/federated")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(profile.to_string()))
        .unwrap();
    let (status, _) = app.send(unsigned).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let signed = || {
        Request::builder()
            .method("POST")
            .uri("/auth/federated")
            .header(header::CONTENT_TYPE, "application/json")
            .header("x-federation-secret", FEDERATION_SECRET)
            .body(Body::from(profile.to_string()))
            .unwrap()
    };

    let (status, user) = app.send(signed()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(user["fullname"], "Dana Scully");
    assert!(user["avatar_url"].as_str().unwrap().starts_with("/uploads/"));
    assert_eq!(app.fetcher.calls.load(Ordering::SeqCst), 1);

    // Signing in again finds the same account without refetching
    let (status, again) = app.send(signed()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(again["id"], user["id"]);
    assert_eq!(app.fetcher.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn home_feed_pages_through_every_post() {
    let app = test_app();
    let (_alice_id, alice) = app.register("Alice").await;

    let total = 52;
    for i in 0..total {
        let (status, _) = app
            .json("POST", "/posts", &alice, json!({ "body": format!("post {i}") }))
            .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let (_, first) = app.get("/", Some(&alice)).await;
    let mut seen = feed_ids(&first);
    assert_eq!(seen.len(), 50);
    let before = first["next_before"].as_str().expect("next_before").to_string();

    let (status, second) = app.get(&format!("/?before={before}"), Some(&alice)).await;
    assert_eq!(status, StatusCode::OK);
    assert!(second.get("next_before").is_none());
    seen.extend(feed_ids(&second));

    seen.sort();
    seen.dedup();
    assert_eq!(seen.len(), total);

    let (status, _) = app.get("/?before=missing", Some(&alice)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
