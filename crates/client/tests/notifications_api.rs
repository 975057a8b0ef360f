// Integration tests for the notification endpoints against a mock server

use std::sync::Arc;

use bellsync_client::{ClientError, HttpClient, NotificationsClient};
use bellsync_core::{NotificationApi, NotificationStore};
use bellsync_schemas::{
    DeleteAllFilter, ListQuery, MarkAllReadFilter, NotificationId, StatusFilter,
};
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client_for(server: &MockServer) -> NotificationsClient {
    let http = HttpClient::builder(server.uri())
        .csrf_token("csrf-123")
        .build()
        .expect("client should build");
    NotificationsClient::new(http)
}

fn list_body() -> serde_json::Value {
    json!({
        "success": true,
        "data": [
            {
                "id": "n2",
                "type": "App\\Notification\\UserMentioned",
                "title": "Mentioned",
                "data": {"actions": [{"name": "view", "label": "View", "url": "/posts/1"}]},
                "created_at": "2026-03-01T10:00:00+00:00",
                "read_at": null
            },
            {
                "id": 7,
                "type": "success",
                "created_at": "2026-03-01 09:00:00",
                "read_at": "2026-03-01T09:30:00+00:00"
            },
            {"type": "orphan"}
        ],
        "pagination": {
            "current_page": 1, "per_page": 10, "total": 12,
            "total_pages": 2, "has_next_page": true, "has_prev_page": false
        },
        "meta": {"unread_count": 5}
    })
}

#[tokio::test]
async fn test_list_normalizes_page() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/notifications.json"))
        .and(query_param("page", "1"))
        .and(query_param("limit", "10"))
        .and(header("Accept", "application/json"))
        .and(header("X-Requested-With", "XMLHttpRequest"))
        .respond_with(ResponseTemplate::new(200).set_body_json(list_body()))
        .expect(1)
        .mount(&server)
        .await;

    let page = client_for(&server)
        .list(ListQuery::page(1, 10))
        .await
        .expect("list should succeed");

    assert_eq!(page.items.len(), 2, "record without id is dropped");
    assert!(page.has_more);
    assert_eq!(page.unread_count, Some(5));

    let first = &page.items[0];
    assert_eq!(first.id.as_str(), "n2");
    assert_eq!(first.actions.len(), 1);
    assert_eq!(first.data_str("icon"), Some("user"));
    assert!(first.is_unread());

    let second = &page.items[1];
    assert_eq!(second.id.as_str(), "7");
    assert!(!second.is_unread());
}

#[tokio::test]
async fn test_unread_filter_uses_unread_endpoint() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/notifications/unread.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "data": [],
            "meta": {"count": 0, "showing": 0}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let page = client_for(&server)
        .fetch_page(&ListQuery::page(1, 10).with_status(StatusFilter::Unread))
        .await
        .unwrap();

    assert!(page.items.is_empty());
    assert_eq!(page.unread_count, Some(0));
    assert!(!page.has_more);
}

#[tokio::test]
async fn test_list_failures_are_network_errors() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/notifications.json"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;

    let err = client_for(&server)
        .list(ListQuery::page(1, 10))
        .await
        .unwrap_err();
    assert!(err.is_network());
}

#[tokio::test]
async fn test_list_success_false_is_an_error() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/notifications.json"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"success": false, "message": "Not configured"})),
        )
        .mount(&server)
        .await;

    let err = client_for(&server)
        .fetch_page(&ListQuery::page(1, 10))
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::Api { ref message, .. } if message == "Not configured"));
}

#[tokio::test]
async fn test_mark_read_sends_csrf_and_reads_count() {
    let server = MockServer::start().await;

    Mock::given(method("PATCH"))
        .and(path("/notifications/n2/read.json"))
        .and(header("X-CSRF-Token", "csrf-123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "message": "Notification marked as read",
            "data": {"id": "n2", "read_at": "2026-03-01T10:05:00+00:00", "unread_count": 0}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let outcome = client_for(&server)
        .mark_read(&NotificationId::from("n2"))
        .await
        .unwrap();
    assert!(outcome.success);
    assert_eq!(outcome.unread_count, Some(0));
}

#[tokio::test]
async fn test_mark_read_not_found() {
    let server = MockServer::start().await;

    Mock::given(method("PATCH"))
        .and(path("/notifications/foreign/read.json"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "success": false, "message": "Notification not found", "code": "NOT_FOUND"
        })))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let id = NotificationId::from("foreign");

    let outcome = client.mark_read(&id).await.unwrap();
    assert!(!outcome.success);

    let strict = client.mark_read_strict(&id).await;
    assert!(matches!(strict, Err(ClientError::NotFound)));
}

#[tokio::test]
async fn test_mark_all_read_sends_filter() {
    let server = MockServer::start().await;

    Mock::given(method("PATCH"))
        .and(path("/notifications/mark-all-read.json"))
        .and(body_json(json!({"type": "App\\Notification\\Post"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true, "data": {"marked_count": 4}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let outcome = client_for(&server)
        .mark_all_read(&MarkAllReadFilter {
            kind: Some("App\\Notification\\Post".to_string()),
            before: None,
        })
        .await
        .unwrap();
    assert!(outcome.success);
    assert_eq!(outcome.marked_count, 4);
}

#[tokio::test]
async fn test_delete_endpoints() {
    let server = MockServer::start().await;

    Mock::given(method("DELETE"))
        .and(path("/notifications/n1.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true})))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("DELETE"))
        .and(path("/notifications/gone.json"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    Mock::given(method("DELETE"))
        .and(path("/notifications.json"))
        .and(body_json(json!({"status": "read"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true, "data": {"deleted_count": 3}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    assert!(client.delete(&NotificationId::from("n1")).await.unwrap());
    assert!(!client.delete(&NotificationId::from("gone")).await.unwrap());

    let deleted = client
        .delete_all(&DeleteAllFilter {
            status: Some(StatusFilter::Read),
            before: None,
        })
        .await
        .unwrap();
    assert_eq!(deleted, 3);
}

#[tokio::test]
async fn test_bearer_token_header() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/notifications.json"))
        .and(header("Authorization", "Bearer secret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true, "data": []})))
        .expect(1)
        .mount(&server)
        .await;

    let http = HttpClient::builder(server.uri())
        .auth_token("secret")
        .build()
        .unwrap();
    let page = NotificationsClient::new(http)
        .list(ListQuery::page(1, 10))
        .await
        .unwrap();
    assert!(page.items.is_empty());
    assert_eq!(page.unread_count, None);
}

#[tokio::test]
async fn test_store_over_http_degrades_mark_read() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/notifications/unread.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "data": [
                {"id": "n2", "type": "info", "created_at": "2026-03-01T10:00:00+00:00"},
                {"id": "n3", "type": "info", "created_at": "2026-03-01T09:00:00+00:00"}
            ],
            "meta": {"count": 5, "showing": 2}
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("PATCH"))
        .and(path("/notifications/n2/read.json"))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&server)
        .await;

    let store = NotificationStore::new(Arc::new(client_for(&server)));
    store.load_notifications().await.unwrap();
    assert_eq!(store.unread_count(), 5);

    assert!(store.mark_as_read(&NotificationId::from("n2")).await);
    assert!(!store.contains(&NotificationId::from("n2")));
    assert_eq!(store.unread_count(), 4);
}
