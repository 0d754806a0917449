//! Router-level tests against an in-memory database and the bundled theme

use super::*;
use crate::cache::MemoryCache;
use crate::db::{create_test_pool, migrations};
use axum::http::{HeaderName, StatusCode};
use axum_test::TestServer;
use serde_json::{json, Value};
use std::path::PathBuf;
use tempfile::TempDir;

const PASSWORD: &str = "s3cure-passw0rd";

struct Harness {
    server: TestServer,
    _media: TempDir,
}

async fn harness() -> Harness {
    let pool = create_test_pool().await.unwrap();
    migrations::run_migrations(&pool).await.unwrap();

    let media = TempDir::new().unwrap();
    let mut config = Config::default();
    config.theme.path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("themes");
    config.media.root = media.path().to_path_buf();
    config.server.site_url = "https://blog.example".to_string();

    let cache = Arc::new(Cache::Memory(MemoryCache::new()));
    let state = AppState::new(pool, cache, config, None).unwrap();
    Harness {
        server: TestServer::new(build_router(state)).unwrap(),
        _media: media,
    }
}

fn bearer(token: &str) -> (HeaderName, HeaderValue) {
    (
        header::AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {}", token)).unwrap(),
    )
}

/// Register `username` and return the session token
async fn register(server: &TestServer, username: &str) -> String {
    let response = server
        .post("/api/v1/auth/register")
        .json(&json!({
            "username": username,
            "email": format!("{}@example.com", username),
            "password": PASSWORD,
        }))
        .await;
    response.assert_status(StatusCode::CREATED);
    response.json::<Value>()["token"].as_str().unwrap().to_string()
}

/// Create a category and a published post as `admin`; returns the post id
async fn publish_post(server: &TestServer, admin: &str) -> i64 {
    let (name, value) = bearer(admin);
    let category = server
        .post("/api/v1/dashboard/categories")
        .add_header(name.clone(), value.clone())
        .json(&json!({ "category_name": "Rust" }))
        .await;
    category.assert_status(StatusCode::CREATED);
    let category_id = category.json::<Value>()["id"].as_i64().unwrap();

    let post = server
        .post("/api/v1/dashboard/posts")
        .add_header(name, value)
        .json(&json!({
            "title": "Ownership in practice",
            "category_id": category_id,
            "short_description": "Borrowing without tears",
            "blog_body": "Moves, borrows and lifetimes.",
            "status": "published",
            "tags": ["memory"],
        }))
        .await;
    post.assert_status(StatusCode::CREATED);
    post.json::<Value>()["id"].as_i64().unwrap()
}

#[tokio::test]
async fn test_first_user_is_admin() {
    let h = harness().await;
    let admin = register(&h.server, "ada").await;
    let reader = register(&h.server, "bob").await;

    let (name, value) = bearer(&admin);
    let me = h.server.get("/api/v1/auth/me").add_header(name, value).await;
    me.assert_status_ok();
    let body = me.json::<Value>();
    assert_eq!(body["is_admin"], json!(true));
    assert_eq!(body["is_moderator"], json!(true));
    assert!(body["user"].get("password_hash").is_none());

    let (name, value) = bearer(&reader);
    let me = h.server.get("/api/v1/auth/me").add_header(name, value).await;
    assert_eq!(me.json::<Value>()["is_admin"], json!(false));
}

#[tokio::test]
async fn test_login_redirect_and_username_limit() {
    let h = harness().await;
    register(&h.server, "ada").await;

    let ok = h
        .server
        .post("/api/v1/auth/login")
        .json(&json!({ "username_or_email": "ada@example.com", "password": PASSWORD }))
        .await;
    ok.assert_status_ok();
    assert_eq!(ok.json::<Value>()["redirect"], json!("/dashboard"));
    assert!(ok.headers().get(header::SET_COOKIE).is_some());

    for _ in 0..5 {
        h.server
            .post("/api/v1/auth/login")
            .json(&json!({ "username_or_email": "ada", "password": "wrong-password" }))
            .await
            .assert_status(StatusCode::UNAUTHORIZED);
    }
    let limited = h
        .server
        .post("/api/v1/auth/login")
        .json(&json!({ "username_or_email": "ada", "password": PASSWORD }))
        .await;
    limited.assert_status(StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(limited.json::<Value>()["error"]["details"]["retry_after"], json!(900));
}

#[tokio::test]
async fn test_dashboard_requires_admin_and_is_not_cached() {
    let h = harness().await;
    register(&h.server, "ada").await;
    let reader = register(&h.server, "bob").await;

    let anonymous = h.server.get("/api/v1/dashboard").await;
    anonymous.assert_status(StatusCode::UNAUTHORIZED);
    assert_eq!(
        anonymous.headers().get(header::CACHE_CONTROL).unwrap(),
        "no-cache, no-store, must-revalidate, max-age=0"
    );

    let (name, value) = bearer(&reader);
    h.server
        .get("/api/v1/dashboard")
        .add_header(name, value)
        .await
        .assert_status(StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_dashboard_counts_and_category_in_use() {
    let h = harness().await;
    let admin = register(&h.server, "ada").await;
    publish_post(&h.server, &admin).await;
    let (name, value) = bearer(&admin);

    let stats = h
        .server
        .get("/api/v1/dashboard")
        .add_header(name.clone(), value.clone())
        .await;
    stats.assert_status_ok();
    assert_eq!(stats.headers().get(header::PRAGMA).unwrap(), "no-cache");
    let stats = stats.json::<Value>();
    assert_eq!(stats["posts"]["published"], json!(1));
    assert_eq!(stats["categories"], json!(1));
    assert_eq!(stats["users"], json!(1));

    let categories = h
        .server
        .get("/api/v1/dashboard/categories")
        .add_header(name.clone(), value.clone())
        .await
        .json::<Value>();
    let category_id = categories[0]["id"].as_i64().unwrap();

    let blocked = h
        .server
        .delete(&format!("/api/v1/dashboard/categories/{}", category_id))
        .add_header(name, value)
        .await;
    blocked.assert_status(StatusCode::CONFLICT);
    let body = blocked.json::<Value>();
    assert_eq!(body["error"]["code"], json!("CATEGORY_IN_USE"));
    assert_eq!(body["error"]["details"]["post_count"], json!(1));
}

#[tokio::test]
async fn test_public_post_pages() {
    let h = harness().await;
    let admin = register(&h.server, "ada").await;
    publish_post(&h.server, &admin).await;

    let detail = h.server.get("/api/v1/posts/rust/ownership-in-practice").await;
    detail.assert_status_ok();
    let detail = detail.json::<Value>();
    assert_eq!(detail["post"]["views"], json!(1));
    assert_eq!(detail["tags"][0]["name"], json!("memory"));

    let page = h.server.get("/rust/ownership-in-practice/").await;
    page.assert_status_ok();
    assert!(page.text().contains("Ownership in practice"));

    h.server
        .get("/rust/no-such-post/")
        .await
        .assert_status(StatusCode::NOT_FOUND);

    let home = h.server.get("/").await;
    home.assert_status_ok();
    assert!(home.text().contains("Ownership in practice"));

    let search = h.server.get("/api/v1/search?q=BORROWING").await.json::<Value>();
    assert_eq!(search["posts"]["total"], json!(1));
    let empty = h.server.get("/api/v1/search?q=").await.json::<Value>();
    assert_eq!(empty["posts"]["total"], json!(0));

    let suggest = h.server.get("/api/v1/tags/suggest?q=me").await.json::<Value>();
    assert_eq!(suggest, json!(["memory"]));
}

#[tokio::test]
async fn test_comment_flow() {
    let h = harness().await;
    let admin = register(&h.server, "ada").await;
    let reader = register(&h.server, "bob").await;
    let post_id = publish_post(&h.server, &admin).await;

    let anonymous = h
        .server
        .post("/api/v1/comments/add")
        .json(&json!({ "content_type": "post", "object_id": post_id, "comment": "Lovely write-up, thanks a lot." }))
        .await;
    anonymous.assert_status(StatusCode::UNAUTHORIZED);

    let (name, value) = bearer(&reader);
    let created = h
        .server
        .post("/api/v1/comments/add")
        .add_header(name.clone(), value.clone())
        .json(&json!({ "content_type": "post", "object_id": post_id, "comment": "Lovely write-up, thanks a lot." }))
        .await;
    created.assert_status(StatusCode::CREATED);
    let comment_id = created.json::<Value>()["id"].as_i64().unwrap();

    let too_soon = h
        .server
        .post("/api/v1/comments/add")
        .add_header(name.clone(), value.clone())
        .json(&json!({ "content_type": "post", "object_id": post_id, "comment": "And one more thought on this." }))
        .await;
    too_soon.assert_status(StatusCode::TOO_MANY_REQUESTS);

    let thread = h
        .server
        .get(&format!("/api/v1/comments/for/post/{}", post_id))
        .await
        .json::<Value>();
    assert_eq!(thread.as_array().unwrap().len(), 1);

    let like = h
        .server
        .post(&format!("/api/v1/comments/{}/like", comment_id))
        .add_header(name.clone(), value.clone())
        .await
        .json::<Value>();
    assert_eq!(like, json!({ "liked": true, "like_count": 1 }));

    // Readers cannot moderate
    h.server
        .get("/api/v1/comments/moderate")
        .add_header(name, value)
        .await
        .assert_status(StatusCode::FORBIDDEN);

    let (name, value) = bearer(&admin);
    let rejected = h
        .server
        .post(&format!("/api/v1/comments/{}/moderate", comment_id))
        .add_header(name.clone(), value.clone())
        .json(&json!({ "action": "reject" }))
        .await;
    rejected.assert_status_ok();

    let thread = h
        .server
        .get(&format!("/api/v1/comments/for/post/{}", post_id))
        .await
        .json::<Value>();
    assert!(thread.as_array().unwrap().is_empty());

    let csv = h
        .server
        .get("/api/v1/comments/export.csv")
        .add_header(name, value)
        .await;
    csv.assert_status_ok();
    assert!(csv
        .headers()
        .get(header::CONTENT_TYPE)
        .unwrap()
        .to_str()
        .unwrap()
        .starts_with("text/csv"));

    h.server
        .get("/api/v1/comments/for/widget/1")
        .await
        .assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_sitemap_and_robots() {
    let h = harness().await;
    let admin = register(&h.server, "ada").await;
    publish_post(&h.server, &admin).await;

    let sitemap = h.server.get("/sitemap.xml").await;
    sitemap.assert_status_ok();
    assert!(sitemap
        .text()
        .contains("<loc>https://blog.example/rust/ownership-in-practice/</loc>"));

    let robots = h.server.get("/robots.txt").await.text();
    assert!(robots.contains("Disallow: /dashboard"));
    assert!(robots.contains("Sitemap: https://blog.example/sitemap.xml"));
}

#[tokio::test]
async fn test_toggle_theme_and_unsubscribe() {
    let h = harness().await;
    let token = register(&h.server, "ada").await;

    let toggled = h
        .server
        .get("/api/v1/accounts/toggle-theme")
        .add_header(header::REFERER, HeaderValue::from_static("/search"))
        .await;
    toggled.assert_status(StatusCode::SEE_OTHER);
    assert_eq!(toggled.headers().get(header::LOCATION).unwrap(), "/search");
    let cookie = toggled.headers().get(header::SET_COOKIE).unwrap().to_str().unwrap();
    assert!(cookie.starts_with("theme=dark"));
    assert!(cookie.contains("Max-Age=31536000"));

    let (name, value) = bearer(&token);
    h.server
        .put("/api/v1/accounts/profile")
        .add_header(name.clone(), value.clone())
        .json(&json!({ "newsletter_opt_in": true }))
        .await
        .assert_status_ok();
    h.server
        .post("/api/v1/accounts/unsubscribe")
        .add_header(name.clone(), value.clone())
        .await
        .assert_status_ok();
    let profile = h
        .server
        .get("/api/v1/accounts/profile")
        .add_header(name, value)
        .await
        .json::<Value>();
    assert_eq!(profile["newsletter_opt_in"], json!(false));
}

#[tokio::test]
async fn test_unknown_routes() {
    let h = harness().await;

    let api = h.server.get("/api/v1/nothing-here").await;
    api.assert_status(StatusCode::NOT_FOUND);
    assert_eq!(api.json::<Value>()["error"]["code"], json!("NOT_FOUND"));

    let page = h.server.get("/definitely/not/here").await;
    page.assert_status(StatusCode::NOT_FOUND);
    assert!(page.text().contains("404"));

    h.server
        .get("/api/v1/auth/social/myspace/login")
        .await
        .assert_status(StatusCode::NOT_FOUND);
}
