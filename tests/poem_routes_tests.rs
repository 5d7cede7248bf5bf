//! Poem route integration tests: windowed navigation, paged listing,
//! owner-gated mutation, the open display route with pinned resolution, and
//! the capture flow's composition and background persistence.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use chrono::{TimeZone, Utc};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use versegate::allowlist::{AllowlistCache, AllowlistEntry, EmptyPolicy};
use versegate::compose::TemplateComposer;
use versegate::identity::{Authenticator, StaticVerifier};
use versegate::server::{router, AppState};
use versegate::store::{MemoryStore, Poem, PoemStore};

fn gateway(entries: Vec<AllowlistEntry>) -> (Router, MemoryStore) {
    let store = MemoryStore::new();
    let allowlist = AllowlistCache::new(EmptyPolicy::Open);
    allowlist.replace(entries);
    let verifier = StaticVerifier::new()
        .grant("tok-alice", "alice", "alice@example.net")
        .grant("tok-bob", "bob", "bob@example.net");
    let state = AppState {
        store: Arc::new(store.clone()),
        composer: Arc::new(TemplateComposer),
        allowlist: allowlist.clone(),
        auth: Authenticator::new(Arc::new(verifier), allowlist),
    };
    (router(state), store)
}

// Seed ids "p0".."pN" for one owner, p0 newest under date ordering.
async fn seed_poems(store: &MemoryStore, owner: &str, count: usize) {
    for i in 0..count {
        let mut p = Poem::new(owner, "t", "x", vec![]);
        p.id = format!("p{}", i);
        p.created_at =
            Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap() - chrono::Duration::minutes(i as i64);
        store.create(p).await.unwrap();
    }
}

fn get(uri: &str, token: Option<&str>) -> Request<Body> {
    let mut b = Request::builder().uri(uri);
    if let Some(t) = token {
        b = b.header(header::AUTHORIZATION, format!("Bearer {}", t));
    }
    b.body(Body::empty()).unwrap()
}

fn post_json(uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
    let mut b = Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(t) = token {
        b = b.header(header::AUTHORIZATION, format!("Bearer {}", t));
    }
    b.body(Body::from(serde_json::to_vec(&body).unwrap())).unwrap()
}

async fn body_json(resp: axum::response::Response) -> Value {
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn neighbors_at_index_zero_have_no_next() {
    let (app, store) = gateway(vec![AllowlistEntry::new("alice")]);
    seed_poems(&store, "alice", 2).await;

    let resp = app
        .oneshot(get("/poems/neighbors?sortByDate=true", Some("tok-alice")))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await;
    assert_eq!(body["currentPoem"]["id"], "p0");
    assert_eq!(body["currentPoem"]["index"], 0);
    assert_eq!(body["previousPoem"]["id"], "p1");
    assert_eq!(body["previousPoem"]["index"], 1);
    assert!(body["nextPoem"].is_null());
}

#[tokio::test]
async fn neighbors_at_an_interior_index_carry_both_sides() {
    let (app, store) = gateway(vec![AllowlistEntry::new("alice")]);
    seed_poems(&store, "alice", 5).await;

    let resp = app
        .oneshot(get("/poems/neighbors?index=3&sortByDate=true", Some("tok-alice")))
        .await
        .unwrap();
    let body = body_json(resp).await;
    assert_eq!(body["nextPoem"]["id"], "p2");
    assert_eq!(body["nextPoem"]["index"], 2);
    assert_eq!(body["currentPoem"]["id"], "p3");
    assert_eq!(body["currentPoem"]["index"], 3);
    assert_eq!(body["previousPoem"]["id"], "p4");
    assert_eq!(body["previousPoem"]["index"], 4);
}

#[tokio::test]
async fn neighbors_on_an_empty_collection_are_all_null() {
    let (app, _) = gateway(vec![AllowlistEntry::new("alice")]);
    let resp = app
        .oneshot(get("/poems/neighbors?index=4", Some("tok-alice")))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await;
    assert!(body["currentPoem"].is_null());
    assert!(body["nextPoem"].is_null());
    assert!(body["previousPoem"].is_null());
}

#[tokio::test]
async fn garbage_index_normalizes_to_the_most_recent_item() {
    let (app, store) = gateway(vec![AllowlistEntry::new("alice")]);
    seed_poems(&store, "alice", 2).await;
    let resp = app
        .oneshot(get("/poems/neighbors?index=banana&sortByDate=true", Some("tok-alice")))
        .await
        .unwrap();
    let body = body_json(resp).await;
    assert_eq!(body["currentPoem"]["id"], "p0");
}

#[tokio::test]
async fn listing_pages_by_fifty_and_never_sees_other_owners() {
    let (app, store) = gateway(vec![AllowlistEntry::new("alice")]);
    seed_poems(&store, "alice", 55).await;
    let mut foreign = Poem::new("bob", "t", "x", vec![]);
    foreign.id = "foreign".into();
    store.create(foreign).await.unwrap();

    let resp = app
        .clone()
        .oneshot(get("/poems?sortByDate=true", Some("tok-alice")))
        .await
        .unwrap();
    let body = body_json(resp).await;
    let rows = body.as_array().unwrap();
    assert_eq!(rows.len(), 50);
    assert_eq!(rows[0]["id"], "p0");
    assert!(rows.iter().all(|r| r["ownerId"] == "alice"));

    let resp = app
        .oneshot(get("/poems?page=2&sortByDate=true", Some("tok-alice")))
        .await
        .unwrap();
    let rows = body_json(resp).await;
    assert_eq!(rows.as_array().unwrap().len(), 5);
    assert_eq!(rows[0]["id"], "p50");
}

#[tokio::test]
async fn favorite_toggles_without_a_body_and_obeys_an_explicit_flag() {
    let (app, store) = gateway(vec![AllowlistEntry::new("alice")]);
    seed_poems(&store, "alice", 1).await;

    // No body: flip false -> true.
    let req = Request::builder()
        .method("POST")
        .uri("/poems/p0/favorite")
        .header(header::AUTHORIZATION, "Bearer tok-alice")
        .body(Body::empty())
        .unwrap();
    let resp = app.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_json(resp).await["isFavorite"], true);

    // Explicit true: stays true.
    let resp = app
        .clone()
        .oneshot(post_json("/poems/p0/favorite", Some("tok-alice"), json!({"favorite": true})))
        .await
        .unwrap();
    assert_eq!(body_json(resp).await["isFavorite"], true);

    // Explicit false: cleared.
    let resp = app
        .oneshot(post_json("/poems/p0/favorite", Some("tok-alice"), json!({"favorite": false})))
        .await
        .unwrap();
    assert_eq!(body_json(resp).await["isFavorite"], false);
    assert!(!store.get("p0").await.unwrap().unwrap().is_favorite);
}

#[tokio::test]
async fn mutating_someone_elses_poem_is_forbidden_and_changes_nothing() {
    let (app, store) = gateway(vec![AllowlistEntry::new("alice"), AllowlistEntry::new("bob")]);
    seed_poems(&store, "alice", 1).await;

    let resp = app
        .clone()
        .oneshot(post_json("/poems/p0/favorite", Some("tok-bob"), json!({"favorite": true})))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    assert_eq!(body_json(resp).await["code"], "not_owner");

    let req = Request::builder()
        .method("DELETE")
        .uri("/poems/p0")
        .header(header::AUTHORIZATION, "Bearer tok-bob")
        .body(Body::empty())
        .unwrap();
    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    let untouched = store.get("p0").await.unwrap().expect("poem still present");
    assert!(!untouched.is_favorite);
}

#[tokio::test]
async fn owner_can_delete_and_missing_poems_are_404() {
    let (app, store) = gateway(vec![AllowlistEntry::new("alice")]);
    seed_poems(&store, "alice", 1).await;

    let req = Request::builder()
        .method("DELETE")
        .uri("/poems/p0")
        .header(header::AUTHORIZATION, "Bearer tok-alice")
        .body(Body::empty())
        .unwrap();
    let resp = app.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(store.get("p0").await.unwrap().is_none());

    let req = Request::builder()
        .method("DELETE")
        .uri("/poems/p0")
        .header(header::AUTHORIZATION, "Bearer tok-alice")
        .body(Body::empty())
        .unwrap();
    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(resp).await["code"], "poem_not_found");
}

#[tokio::test]
async fn display_route_navigates_without_any_credential() {
    let (app, store) = gateway(vec![AllowlistEntry::new("alice")]);
    seed_poems(&store, "alice", 3).await;

    let resp = app
        .oneshot(get("/display/alice?index=1&sortByDate=true", None))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await;
    assert_eq!(body["currentPoem"]["id"], "p1");
    assert_eq!(body["nextPoem"]["id"], "p0");
    assert_eq!(body["previousPoem"]["id"], "p2");
}

#[tokio::test]
async fn display_resolves_the_pinned_poem_when_no_index_is_given() {
    let mut entry = AllowlistEntry::new("alice");
    entry.display_poem_ref = Some("p2".into());
    let (app, store) = gateway(vec![entry]);
    seed_poems(&store, "alice", 3).await;

    let resp = app.clone().oneshot(get("/display/alice", None)).await.unwrap();
    let body = body_json(resp).await;
    assert_eq!(body["currentPoem"]["id"], "p2");
    assert_eq!(body["currentPoem"]["index"], 0);
    assert!(body["nextPoem"].is_null());
    assert!(body["previousPoem"].is_null());

    // An explicit index overrides the pin.
    let resp = app
        .oneshot(get("/display/alice?index=0&sortByDate=true", None))
        .await
        .unwrap();
    assert_eq!(body_json(resp).await["currentPoem"]["id"], "p0");
}

#[tokio::test]
async fn display_falls_back_to_index_navigation_on_a_dangling_pin() {
    let mut entry = AllowlistEntry::new("alice");
    entry.display_poem_ref = Some("gone".into());
    let (app, store) = gateway(vec![entry]);
    seed_poems(&store, "alice", 2).await;

    let resp = app.oneshot(get("/display/alice?sortByDate=true", None)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_json(resp).await["currentPoem"]["id"], "p0");
}

#[tokio::test]
async fn capture_composes_and_persists_in_the_background() {
    let mut entry = AllowlistEntry::new("alice");
    entry.pen_name = Some("A. Liddell".into());
    let (app, store) = gateway(vec![entry]);

    let resp = app
        .oneshot(post_json("/capture", Some("tok-alice"), json!({"imageData": "aGVsbG8="})))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await;
    assert_eq!(body["ownerId"], "alice");
    assert_eq!(body["isFavorite"], false);
    // Without an explicit alias the owner's pen name is used.
    assert_eq!(body["authorAlias"], "A. Liddell");
    assert!(body["palette"].as_array().map(|p| !p.is_empty()).unwrap_or(false));

    // The save is best-effort after the response; give it a moment to land.
    let id = body["id"].as_str().unwrap().to_string();
    let mut saved = None;
    for _ in 0..200 {
        if let Some(p) = store.get(&id).await.unwrap() {
            saved = Some(p);
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    let saved = saved.expect("background save landed");
    assert_eq!(saved.owner_id, "alice");
    assert_eq!(saved.title.as_str(), body["title"].as_str().unwrap());
}

#[tokio::test]
async fn capture_without_image_data_is_a_validation_error() {
    let (app, store) = gateway(vec![AllowlistEntry::new("alice")]);
    let resp = app
        .clone()
        .oneshot(post_json("/capture", Some("tok-alice"), json!({})))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(resp).await["code"], "missing_image");

    let resp = app
        .oneshot(post_json("/capture", Some("tok-alice"), json!({"imageData": "   "})))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert!(store.is_empty());
}

#[tokio::test]
async fn capture_keeps_an_explicit_alias_over_the_pen_name() {
    let mut entry = AllowlistEntry::new("alice");
    entry.pen_name = Some("A. Liddell".into());
    let (app, _) = gateway(vec![entry]);

    let resp = app
        .oneshot(post_json(
            "/capture",
            Some("tok-alice"),
            json!({"imageData": "aGVsbG8=", "authorAlias": "The Walrus"}),
        ))
        .await
        .unwrap();
    assert_eq!(body_json(resp).await["authorAlias"], "The Walrus");
}
