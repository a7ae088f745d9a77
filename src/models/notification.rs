// src/models/notification.rs
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    SupportMessage,  // New message in a support conversation
    NewBooking,      // A customer created a reservation
    BookingCanceled, // A reservation was cancelled
    PaymentSuccess,  // Payment confirmed by the processor
    #[serde(other)]
    System,          // Generic/system notice, also any type we don't know yet
}

impl NotificationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationType::SupportMessage => "support_message",
            NotificationType::NewBooking => "new_booking",
            NotificationType::BookingCanceled => "booking_canceled",
            NotificationType::PaymentSuccess => "payment_success",
            NotificationType::System => "system",
        }
    }
}

impl std::fmt::Display for NotificationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: NotificationType,
    pub title: String,
    pub message: String,
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub read: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_url: Option<String>, // Where a click should take the admin
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub related_id: Option<String>, // e.g. the support conversation id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub related_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
}

impl Notification {
    pub fn new(id: impl Into<String>, kind: NotificationType, title: &str, message: &str) -> Self {
        Self {
            id: id.into(),
            kind,
            title: title.to_string(),
            message: message.to_string(),
            timestamp: Utc::now(),
            read: false,
            action_url: None,
            related_id: None,
            related_type: None,
            icon: None,
        }
    }

    pub fn with_read(mut self, read: bool) -> Self {
        self.read = read;
        self
    }

    pub fn with_action_url(mut self, url: impl Into<String>) -> Self {
        self.action_url = Some(url.into());
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_related(mut self, related_id: impl Into<String>, related_type: impl Into<String>) -> Self {
        self.related_id = Some(related_id.into());
        self.related_type = Some(related_type.into());
        self
    }
}

/// Accepts RFC 3339 as well as the offset-less ISO form the backend emits
/// (`2024-05-01T12:34:56.123456`), which is taken as UTC.
fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_timestamp(&raw).map_err(serde::de::Error::custom)
}

pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    match DateTime::parse_from_rfc3339(raw) {
        Ok(dt) => Ok(dt.with_timezone(&Utc)),
        Err(rfc_err) => NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
            .map(|naive| naive.and_utc())
            .map_err(|_| rfc_err),
    }
}

// Response Models
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct NotificationPage {
    pub notifications: Vec<Notification>,
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub unread: u32, // Unread across the whole inbox, not just this page
    #[serde(default)]
    pub page: u32,
    #[serde(default)]
    pub limit: u32,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct UnreadCount {
    pub count: u32,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct Ack {
    pub success: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct BulkAck {
    pub success: bool,
    #[serde(default)]
    pub count: u64,
}
