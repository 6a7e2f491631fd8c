#![allow(clippy::unwrap_used)]
// Read-through feeds and the polling source against wiremock.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use iotsync_api::{ApiClient, StaticToken};
use iotsync_core::{
    CacheStore, DeviceFeed, DeviceSource, DeviceStatus, NotificationFeed, NotificationKind,
    OwnerKey,
};

async fn setup() -> (MockServer, Arc<ApiClient>) {
    let server = MockServer::start().await;
    let api = ApiClient::with_client(
        reqwest::Client::new(),
        Url::parse(&server.uri()).unwrap(),
        Arc::new(StaticToken::new("test-token".to_string())),
        Duration::from_secs(5),
    );
    (server, Arc::new(api))
}

fn owner() -> OwnerKey {
    OwnerKey::new("org-1", "user-1")
}

#[tokio::test]
async fn test_device_feed_serves_fresh_cache() {
    let (server, api) = setup().await;
    Mock::given(method("GET"))
        .and(path("/api/devices"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "id": "d1", "name": "Pump 1", "status": "ONLINE", "lastSeen": "2026-03-01T10:15:00" },
            { "id": "d2", "name": "Pump 2", "status": "MAINTENANCE" }
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let feed = DeviceFeed::new(api, Arc::new(CacheStore::new(Duration::from_secs(300))));
    let first = feed.list(&owner()).await.unwrap();
    let second = feed.list(&owner()).await.unwrap();

    assert_eq!(first.len(), 2);
    assert!(first[0].last_seen.is_some());
    assert_eq!(first[1].status, DeviceStatus::Unknown);
    assert_eq!(second[0].id, "d1");

    // Another user of the same tenant does not share the entry.
    assert!(feed.cache().get(&OwnerKey::new("org-1", "user-2")).is_none());
}

#[tokio::test]
async fn test_device_stats_are_not_cached() {
    let (server, api) = setup().await;
    Mock::given(method("GET"))
        .and(path("/api/devices/stats"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "total": 5, "online": 3, "offline": 1, "warning": 1, "error": 0
        })))
        .expect(2)
        .mount(&server)
        .await;

    let feed = DeviceFeed::new(api, Arc::new(CacheStore::new(Duration::from_secs(300))));
    assert_eq!(feed.stats().await.unwrap().online, 3);
    assert_eq!(feed.stats().await.unwrap().total, 5);
}

#[tokio::test]
async fn test_mark_read_patches_cached_notification() {
    let (server, api) = setup().await;
    Mock::given(method("GET"))
        .and(path("/api/notifications"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "id": "n1", "title": "Pump offline", "message": "Pump 2 went offline",
              "type": "WARNING", "read": false, "deviceId": "d2" },
            { "id": "n2", "title": "Rule fired", "message": "Temperature above 80",
              "type": "ERROR", "read": false }
        ])))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/api/notifications/n1/read"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let feed = NotificationFeed::new(api, CacheStore::new(Duration::from_secs(300)));
    let before = feed.list(&owner()).await.unwrap();
    assert_eq!(before[0].kind, NotificationKind::Warning);

    feed.mark_read(&owner(), "n1").await.unwrap();

    let after = feed.list(&owner()).await.unwrap();
    assert!(after[0].read);
    assert!(!after[1].read);
    // The snapshot handed out earlier is untouched.
    assert!(!before[0].read);
}

#[tokio::test]
async fn test_mark_all_read_drops_cache() {
    let (server, api) = setup().await;
    Mock::given(method("GET"))
        .and(path("/api/notifications"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/api/notifications/read-all"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/notifications/unread-count"))
        .respond_with(ResponseTemplate::new(200).set_body_string("0"))
        .mount(&server)
        .await;

    let feed = NotificationFeed::new(api, CacheStore::new(Duration::from_secs(300)));
    feed.list(&owner()).await.unwrap();
    feed.mark_all_read(&owner()).await.unwrap();
    feed.list(&owner()).await.unwrap();
    assert_eq!(feed.unread_count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_api_client_is_a_polling_source() {
    let (server, api) = setup().await;
    Mock::given(method("GET"))
        .and(path("/api/devices"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "id": "d7", "name": "Fan", "status": "WARNING" }
        ])))
        .mount(&server)
        .await;

    let devices = api.fetch_devices().await.unwrap();
    assert_eq!(devices[0].status, DeviceStatus::Warning);
}
