// src/services/notification_api.rs
use async_trait::async_trait;
use reqwest::{RequestBuilder, Url};
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::sync::Mutex;
use tracing;

use crate::{
    errors::{InboxError, InboxResult},
    models::notification::{Ack, BulkAck, Notification, NotificationPage, NotificationType, UnreadCount},
    state::InboxConfig,
};

/// Client side of the backend notification API.
#[async_trait]
pub trait NotificationApi: Send + Sync {
    async fn list_notifications(&self, page: u32, page_size: u32, only_unread: bool) -> InboxResult<NotificationPage>;
    async fn unread_count(&self) -> InboxResult<u32>;
    async fn mark_read(&self, id: &str) -> InboxResult<Notification>;
    async fn mark_all_read(&self) -> InboxResult<BulkAck>;
    async fn delete_notification(&self, id: &str) -> InboxResult<Ack>;
    async fn delete_all(&self) -> InboxResult<BulkAck>;
}

pub struct HttpNotificationApi {
    base_url: Url,
    client: reqwest::Client,
    auth_token: Option<String>,
}

impl HttpNotificationApi {
    pub fn new(config: &InboxConfig) -> InboxResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self {
            base_url: config.api_url()?,
            client,
            auth_token: config.auth_token.clone(),
        })
    }

    fn endpoint(&self, segments: &[&str]) -> InboxResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| InboxError::InvalidUrl(format!("{} cannot be a base", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> InboxResult<T> {
        let request = match &self.auth_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        };

        let response = request.send().await?;
        let status = response.status();

        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
            tracing::warn!("Notification API returned {}: {}", status, error_text);
            return Err(InboxError::from_status(status, error_text));
        }

        Ok(response.json::<T>().await?)
    }
}

#[async_trait]
impl NotificationApi for HttpNotificationApi {
    async fn list_notifications(&self, page: u32, page_size: u32, only_unread: bool) -> InboxResult<NotificationPage> {
        tracing::debug!("Fetching notifications page {} (size {}, unread only: {})", page, page_size, only_unread);

        let request = self.client.get(self.base_url.clone()).query(&[
            ("page", page.to_string()),
            ("limit", page_size.to_string()),
            ("unreadOnly", only_unread.to_string()),
        ]);
        let mut result: NotificationPage = self.send(request).await?;

        if result.notifications.len() > page_size as usize {
            tracing::warn!(
                "Backend returned {} notifications for a page of {}, truncating",
                result.notifications.len(),
                page_size
            );
            result.notifications.truncate(page_size as usize);
        }
        Ok(result)
    }

    async fn unread_count(&self) -> InboxResult<u32> {
        let url = self.endpoint(&["unread-count"])?;
        let count: UnreadCount = self.send(self.client.get(url)).await?;
        Ok(count.count)
    }

    async fn mark_read(&self, id: &str) -> InboxResult<Notification> {
        tracing::debug!("Marking notification {} as read", id);
        let url = self.endpoint(&[id, "read"])?;
        self.send(self.client.put(url)).await
    }

    async fn mark_all_read(&self) -> InboxResult<BulkAck> {
        let url = self.endpoint(&["read-all"])?;
        self.send(self.client.put(url)).await
    }

    async fn delete_notification(&self, id: &str) -> InboxResult<Ack> {
        tracing::debug!("Deleting notification {}", id);
        let url = self.endpoint(&[id])?;
        self.send(self.client.delete(url)).await
    }

    async fn delete_all(&self) -> InboxResult<BulkAck> {
        let url = self.endpoint(&["all"])?;
        self.send(self.client.delete(url)).await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MockOp {
    List,
    UnreadCount,
    MarkRead,
    MarkAllRead,
    Delete,
    DeleteAll,
}

/// In-memory backend for development and testing.
#[derive(Default)]
pub struct MockNotificationApi {
    store: Mutex<Vec<Notification>>,
    failing: Mutex<HashMap<MockOp, MockFailure>>,
    calls: Mutex<HashMap<MockOp, usize>>,
}

/// Which failure a mock operation should produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockFailure {
    Timeout,
    Unauthorized,
    Server,
}

impl MockFailure {
    fn to_error(self) -> InboxError {
        match self {
            MockFailure::Timeout => InboxError::NetworkTimeout,
            MockFailure::Unauthorized => InboxError::Unauthorized("mock token rejected".to_string()),
            MockFailure::Server => InboxError::ServerError {
                status: 500,
                message: "mock failure".to_string(),
            },
        }
    }
}

impl MockNotificationApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_notifications(notifications: Vec<Notification>) -> Self {
        let api = Self::default();
        if let Ok(mut store) = api.store.lock() {
            *store = notifications;
        }
        api
    }

    /// Store a notification the way the backend does: fresh uuid, unread, now.
    pub fn create(&self, kind: NotificationType, title: &str, message: &str, action_url: Option<&str>) -> Notification {
        let mut notification = Notification::new(uuid::Uuid::new_v4().to_string(), kind, title, message);
        notification.action_url = action_url.map(str::to_string);
        self.insert(notification.clone());
        notification
    }

    pub fn insert(&self, notification: Notification) {
        if let Ok(mut store) = self.store.lock() {
            store.push(notification);
        }
    }

    pub fn fail(&self, op: MockOp, kind: MockFailure) {
        if let Ok(mut failing) = self.failing.lock() {
            failing.insert(op, kind);
        }
    }

    pub fn recover(&self, op: MockOp) {
        if let Ok(mut failing) = self.failing.lock() {
            failing.remove(&op);
        }
    }

    pub fn call_count(&self, op: MockOp) -> usize {
        self.calls
            .lock()
            .map(|calls| calls.get(&op).copied().unwrap_or(0))
            .unwrap_or(0)
    }

    pub fn stored(&self) -> Vec<Notification> {
        self.store.lock().map(|s| s.clone()).unwrap_or_default()
    }

    fn record(&self, op: MockOp) -> InboxResult<()> {
        if let Ok(mut calls) = self.calls.lock() {
            *calls.entry(op).or_insert(0) += 1;
        }
        let failing = self.failing.lock().ok().and_then(|f| f.get(&op).copied());
        match failing {
            Some(kind) => {
                tracing::info!("[MOCK] Failing {:?} with {:?}", op, kind);
                Err(kind.to_error())
            }
            None => Ok(()),
        }
    }

    fn with_store<T>(&self, f: impl FnOnce(&mut Vec<Notification>) -> T) -> InboxResult<T> {
        let mut store = self
            .store
            .lock()
            .map_err(|_| InboxError::ServerError { status: 500, message: "mock store poisoned".to_string() })?;
        Ok(f(&mut store))
    }
}

#[async_trait]
impl NotificationApi for MockNotificationApi {
    async fn list_notifications(&self, page: u32, page_size: u32, only_unread: bool) -> InboxResult<NotificationPage> {
        self.record(MockOp::List)?;
        tracing::info!("[MOCK] Listing page {} (size {})", page, page_size);

        self.with_store(|store| {
            let mut matching: Vec<Notification> = store
                .iter()
                .filter(|n| !only_unread || !n.read)
                .cloned()
                .collect();
            matching.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));

            let total = matching.len() as u64;
            let unread = store.iter().filter(|n| !n.read).count() as u32;
            let skip = (page.max(1) as usize - 1) * page_size as usize;
            let notifications = matching.into_iter().skip(skip).take(page_size as usize).collect();

            NotificationPage {
                notifications,
                total,
                unread,
                page,
                limit: page_size,
            }
        })
    }

    async fn unread_count(&self) -> InboxResult<u32> {
        self.record(MockOp::UnreadCount)?;
        self.with_store(|store| store.iter().filter(|n| !n.read).count() as u32)
    }

    async fn mark_read(&self, id: &str) -> InboxResult<Notification> {
        self.record(MockOp::MarkRead)?;
        tracing::info!("[MOCK] Marking {} as read", id);
        self.with_store(|store| {
            store.iter_mut().find(|n| n.id == id).map(|n| {
                n.read = true;
                n.clone()
            })
        })?
        .ok_or_else(|| InboxError::not_found(format!("notification {}", id)))
    }

    async fn mark_all_read(&self) -> InboxResult<BulkAck> {
        self.record(MockOp::MarkAllRead)?;
        let count = self.with_store(|store| {
            let mut modified = 0;
            for n in store.iter_mut().filter(|n| !n.read) {
                n.read = true;
                modified += 1;
            }
            modified
        })?;
        Ok(BulkAck { success: true, count })
    }

    async fn delete_notification(&self, id: &str) -> InboxResult<Ack> {
        self.record(MockOp::Delete)?;
        tracing::info!("[MOCK] Deleting {}", id);
        let removed = self.with_store(|store| {
            let before = store.len();
            store.retain(|n| n.id != id);
            before != store.len()
        })?;
        if removed {
            Ok(Ack { success: true })
        } else {
            Err(InboxError::not_found(format!("notification {}", id)))
        }
    }

    async fn delete_all(&self) -> InboxResult<BulkAck> {
        self.record(MockOp::DeleteAll)?;
        let count = self.with_store(|store| {
            let count = store.len() as u64;
            store.clear();
            count
        })?;
        Ok(BulkAck { success: true, count })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        Json, Router,
        extract::{Path, Query},
        http::{HeaderMap, StatusCode},
        response::IntoResponse,
        routing::{delete, get, put},
    };
    use chrono::{Duration, Utc};
    use serde_json::json;
    use std::time::Duration as StdDuration;

    const TOTAL: u32 = 12;

    fn wire_notification(i: u32) -> serde_json::Value {
        json!({
            "id": format!("n{}", i),
            "type": "new_booking",
            "title": format!("Reserva {}", i),
            "message": "Nueva reserva",
            "timestamp": "2024-05-01T12:00:00",
            "read": i % 2 == 0,
        })
    }

    async fn list(Query(q): Query<HashMap<String, String>>) -> impl IntoResponse {
        let page: u32 = q.get("page").and_then(|p| p.parse().ok()).unwrap_or(1);
        let limit: u32 = q.get("limit").and_then(|p| p.parse().ok()).unwrap_or(20);
        let unread_only = q.get("unreadOnly").map(String::as_str) == Some("true");
        let matching: Vec<u32> = (0..TOTAL).filter(|i| !unread_only || i % 2 != 0).collect();
        let items: Vec<_> = matching
            .iter()
            .skip(((page - 1) * limit) as usize)
            .take(limit as usize)
            .map(|i| wire_notification(*i))
            .collect();
        Json(json!({
            "notifications": items,
            "total": matching.len(),
            "unread": 6,
            "page": page,
            "limit": limit,
        }))
    }

    async fn unread_count(headers: HeaderMap) -> impl IntoResponse {
        match headers.get("authorization").and_then(|v| v.to_str().ok()) {
            Some("Bearer secret-token") => Json(json!({"count": 4})).into_response(),
            _ => (StatusCode::UNAUTHORIZED, Json(json!({"error": "missing token"}))).into_response(),
        }
    }

    async fn mark_read(Path(id): Path<String>) -> impl IntoResponse {
        if id == "missing" {
            return (StatusCode::NOT_FOUND, Json(json!({"error": "Notificación no encontrada"}))).into_response();
        }
        let mut body = wire_notification(1);
        body["id"] = json!(id);
        body["read"] = json!(true);
        Json(body).into_response()
    }

    async fn spawn_backend() -> String {
        let app = Router::new()
            .route("/api/notifications", get(list))
            .route("/api/notifications/unread-count", get(unread_count))
            .route("/api/notifications/read-all", put(|| async { Json(json!({"success": true, "count": 3})) }))
            .route("/api/notifications/all", delete(|| async { Json(json!({"success": true, "count": 12})) }))
            .route("/api/notifications/:id/read", put(mark_read))
            .route(
                "/api/notifications/:id",
                delete(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "Error al eliminar notificación") }),
            )
            .route("/broken/api/notifications/unread-count", get(|| async { "not json" }));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn client(base: &str, token: Option<&str>) -> HttpNotificationApi {
        let config = InboxConfig {
            api_base_url: format!("{}/api/notifications", base),
            push_url: None,
            auth_token: token.map(str::to_string),
            request_timeout: StdDuration::from_secs(5),
            ..InboxConfig::default()
        };
        HttpNotificationApi::new(&config).unwrap()
    }

    #[tokio::test]
    async fn test_http_pagination() {
        let base = spawn_backend().await;
        let api = client(&base, None);

        let first = api.list_notifications(1, 10, false).await.unwrap();
        assert_eq!(first.notifications.len(), 10);
        assert_eq!(first.unread, 6);
        assert_eq!(first.total, 12);
        assert_eq!(first.notifications[0].id, "n0");

        let second = api.list_notifications(2, 10, false).await.unwrap();
        assert_eq!(second.notifications.len(), 2);
        assert_eq!(second.page, 2);
    }

    #[tokio::test]
    async fn test_http_unread_only_filter() {
        let base = spawn_backend().await;
        let api = client(&base, None);

        let page = api.list_notifications(1, 10, true).await.unwrap();
        assert_eq!(page.notifications.len(), 6);
        assert_eq!(page.total, 6);
        assert!(page.notifications.iter().all(|n| !n.read));
        assert_eq!(page.notifications[0].id, "n1");
    }

    #[tokio::test]
    async fn test_http_auth_header() {
        let base = spawn_backend().await;

        let with_token = client(&base, Some("secret-token"));
        assert_eq!(with_token.unread_count().await.unwrap(), 4);

        let without = client(&base, None);
        let err = without.unread_count().await.unwrap_err();
        assert!(err.is_auth(), "unexpected error: {}", err);
    }

    #[tokio::test]
    async fn test_http_mutations() {
        let base = spawn_backend().await;
        let api = client(&base, None);

        let updated = api.mark_read("abc").await.unwrap();
        assert_eq!(updated.id, "abc");
        assert!(updated.read);

        assert!(matches!(api.mark_read("missing").await, Err(InboxError::NotFound(_))));
        assert_eq!(api.mark_all_read().await.unwrap().count, 3);
        assert_eq!(api.delete_all().await.unwrap().count, 12);
        assert!(matches!(
            api.delete_notification("abc").await,
            Err(InboxError::ServerError { status: 500, .. })
        ));
    }

    #[tokio::test]
    async fn test_http_malformed_response() {
        let base = spawn_backend().await;
        let api = client(&format!("{}/broken", base), None);
        assert!(matches!(api.unread_count().await, Err(InboxError::JsonParsing(_))));
    }

    #[tokio::test]
    async fn test_http_connection_refused() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        drop(listener);

        let err = client(&base, None).unread_count().await.unwrap_err();
        assert!(err.is_transport(), "unexpected error: {}", err);
    }

    #[tokio::test]
    async fn test_mock_pages_newest_first() {
        let now = Utc::now();
        let api = MockNotificationApi::with_notifications(
            (0..13)
                .map(|i| {
                    Notification::new(format!("{}", i), NotificationType::System, "t", "m")
                        .with_timestamp(now - Duration::minutes(i))
                        .with_read(i >= 5)
                })
                .collect(),
        );

        let first = api.list_notifications(1, 10, false).await.unwrap();
        assert_eq!(first.notifications.len(), 10);
        assert_eq!(first.notifications[0].id, "0");
        assert_eq!(first.unread, 5);

        let second = api.list_notifications(2, 10, false).await.unwrap();
        assert_eq!(second.notifications.len(), 3);

        let unread_only = api.list_notifications(1, 10, true).await.unwrap();
        assert_eq!(unread_only.notifications.len(), 5);
        assert_eq!(unread_only.total, 5);
    }

    #[tokio::test]
    async fn test_mock_failure_injection() {
        let api = MockNotificationApi::new();
        let created = api.create(NotificationType::PaymentSuccess, "Pago", "Pago recibido", None);

        api.fail(MockOp::MarkRead, MockFailure::Timeout);
        assert!(matches!(api.mark_read(&created.id).await, Err(InboxError::NetworkTimeout)));
        api.recover(MockOp::MarkRead);
        assert!(api.mark_read(&created.id).await.unwrap().read);
        assert_eq!(api.call_count(MockOp::MarkRead), 2);

        assert!(api.delete_notification(&created.id).await.unwrap().success);
        assert!(matches!(api.delete_notification(&created.id).await, Err(InboxError::NotFound(_))));
    }
}
