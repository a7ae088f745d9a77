// src/services/presentation.rs
use chrono::{DateTime, Utc};
use regex::Regex;
use std::sync::LazyLock;

use crate::{
    models::notification::{Notification, NotificationType},
    services::inbox_cache::{InboxCache, ReadState},
};

pub const PANEL_TITLE: &str = "Notificaciones";
pub const LOADING_LABEL: &str = "Cargando notificaciones...";
pub const EMPTY_LABEL: &str = "No tienes notificaciones";
pub const MARK_ALL_LABEL: &str = "Marcar todas como leídas";
pub const LOAD_MORE_LABEL: &str = "Cargar más";
pub const LOADING_MORE_LABEL: &str = "Cargando...";
pub const VIEW_ALL_LABEL: &str = "Ver todas las notificaciones";
pub const VIEW_ALL_ROUTE: &str = "/admin/notifications";

static CONVERSATION_PARAM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[?&]conversation=([^&]+)").expect("conversation param regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IconColor {
    Red,
    Green,
    Orange,
    Blue,
    Gray,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotificationIcon {
    pub label: &'static str,
    pub color: IconColor,
}

pub fn icon_for(kind: NotificationType) -> NotificationIcon {
    let (label, color) = match kind {
        NotificationType::SupportMessage => ("CS", IconColor::Red),
        NotificationType::NewBooking => ("NR", IconColor::Green),
        NotificationType::BookingCanceled => ("RC", IconColor::Orange),
        NotificationType::PaymentSuccess => ("PO", IconColor::Blue),
        NotificationType::System => ("SYS", IconColor::Gray),
    };
    NotificationIcon { label, color }
}

/// Relative age of `timestamp` as of `now`, falling back to the date after a week.
pub fn format_relative(timestamp: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let elapsed = now.signed_duration_since(timestamp);
    let seconds = elapsed.num_seconds();

    if seconds < 60 {
        return "Hace un momento".to_string();
    }
    if seconds < 3_600 {
        return plural(seconds / 60, "minuto", "minutos");
    }
    if seconds < 86_400 {
        return plural(seconds / 3_600, "hora", "horas");
    }
    if seconds < 604_800 {
        return plural(seconds / 86_400, "día", "días");
    }
    timestamp.format("%d/%m/%Y").to_string()
}

fn plural(n: i64, one: &str, many: &str) -> String {
    format!("Hace {} {}", n, if n == 1 { one } else { many })
}

/// Badge content, `None` when there is nothing unread.
pub fn badge_text(unread: u32) -> Option<String> {
    match unread {
        0 => None,
        1..=9 => Some(unread.to_string()),
        _ => Some("9+".to_string()),
    }
}

pub fn extract_conversation_id(action_url: &str) -> Option<String> {
    CONVERSATION_PARAM
        .captures(action_url)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClickAction {
    /// Already on the admin surface: hand the conversation to the host.
    SelectConversation(String),
    Navigate(String),
    Nothing,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClickOutcome {
    pub mark_read: bool,
    pub action: ClickAction,
    pub close_menu: bool,
}

pub fn resolve_click(
    notification: &Notification,
    current_path: &str,
    admin_path: &str,
    has_conversation_handler: bool,
) -> ClickOutcome {
    let action = match (&notification.kind, notification.action_url.as_deref()) {
        (NotificationType::SupportMessage, Some(url)) => {
            let conversation = extract_conversation_id(url);
            if current_path == admin_path {
                if has_conversation_handler {
                    ClickAction::SelectConversation(conversation.unwrap_or_default())
                } else {
                    ClickAction::Nothing
                }
            } else {
                match conversation {
                    Some(id) => ClickAction::Navigate(format!("{}?section=support&conversation={}", admin_path, id)),
                    None => ClickAction::Navigate(format!("{}?section=support", admin_path)),
                }
            }
        }
        (_, Some(url)) if !url.is_empty() => ClickAction::Navigate(url.to_string()),
        _ => ClickAction::Nothing,
    };

    ClickOutcome {
        mark_read: !notification.read,
        action,
        close_menu: true,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PanelBody {
    Loading,
    Empty,
    List,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EntryView {
    pub id: String,
    pub title: String,
    pub message: String,
    pub icon: NotificationIcon,
    pub age: String,
    pub read: bool,
    pub read_state: ReadState,
    pub action_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadMoreButton {
    pub label: &'static str,
    pub enabled: bool,
}

/// Everything a host needs to draw the bell and its dropdown.
#[derive(Debug, Clone, PartialEq)]
pub struct InboxSnapshot {
    pub unread: u32,
    pub badge: Option<String>,
    pub is_open: bool,
    pub body: PanelBody,
    pub entries: Vec<EntryView>,
    pub can_mark_all: bool,
    pub load_more: Option<LoadMoreButton>,
    pub error: Option<String>,
}

impl InboxSnapshot {
    pub fn build(cache: &InboxCache, is_open: bool, now: DateTime<Utc>) -> Self {
        let loading = cache.is_loading();
        let body = if cache.is_empty() {
            if loading { PanelBody::Loading } else { PanelBody::Empty }
        } else {
            PanelBody::List
        };

        let entries = cache
            .entries()
            .iter()
            .map(|entry| {
                let n = &entry.notification;
                EntryView {
                    id: n.id.clone(),
                    title: n.title.clone(),
                    message: n.message.clone(),
                    icon: icon_for(n.kind),
                    age: format_relative(n.timestamp, now),
                    read: n.read,
                    read_state: entry.read_state,
                    action_url: n.action_url.clone(),
                }
            })
            .collect();

        let load_more = (cache.has_more() && !cache.is_empty()).then(|| LoadMoreButton {
            label: if loading { LOADING_MORE_LABEL } else { LOAD_MORE_LABEL },
            enabled: !loading,
        });

        Self {
            unread: cache.unread(),
            badge: badge_text(cache.unread()),
            is_open,
            body,
            entries,
            can_mark_all: cache.unread() > 0,
            load_more,
            error: cache.error().map(str::to_string),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::notification::NotificationPage;
    use chrono::{Duration, TimeZone};

    fn at(seconds_ago: i64) -> (DateTime<Utc>, DateTime<Utc>) {
        let now = Utc.with_ymd_and_hms(2024, 6, 15, 12, 0, 0).unwrap();
        (now - Duration::seconds(seconds_ago), now)
    }

    #[test]
    fn test_relative_thresholds() {
        let cases = [
            (0, "Hace un momento"),
            (30, "Hace un momento"),
            (59, "Hace un momento"),
            (60, "Hace 1 minuto"),
            (90, "Hace 1 minuto"),
            (120, "Hace 2 minutos"),
            (3_599, "Hace 59 minutos"),
            (3_600, "Hace 1 hora"),
            (7_200, "Hace 2 horas"),
            (86_400, "Hace 1 día"),
            (6 * 86_400, "Hace 6 días"),
        ];
        for (ago, expected) in cases {
            let (ts, now) = at(ago);
            assert_eq!(format_relative(ts, now), expected, "{} seconds ago", ago);
        }
    }

    #[test]
    fn test_relative_falls_back_to_date() {
        let (ts, now) = at(8 * 86_400);
        assert_eq!(format_relative(ts, now), "07/06/2024");
    }

    #[test]
    fn test_future_timestamp_is_just_now() {
        let (ts, now) = at(-300);
        assert_eq!(format_relative(ts, now), "Hace un momento");
    }

    #[test]
    fn test_badge() {
        assert_eq!(badge_text(0), None);
        assert_eq!(badge_text(1).as_deref(), Some("1"));
        assert_eq!(badge_text(9).as_deref(), Some("9"));
        assert_eq!(badge_text(10).as_deref(), Some("9+"));
    }

    #[test]
    fn test_icons() {
        assert_eq!(icon_for(NotificationType::SupportMessage).label, "CS");
        assert_eq!(icon_for(NotificationType::NewBooking).color, IconColor::Green);
        assert_eq!(icon_for(NotificationType::BookingCanceled).label, "RC");
        assert_eq!(icon_for(NotificationType::PaymentSuccess).label, "PO");
        assert_eq!(icon_for(NotificationType::System).label, "SYS");
    }

    #[test]
    fn test_extract_conversation_id() {
        assert_eq!(extract_conversation_id("/admin/support?conversation=42").as_deref(), Some("42"));
        assert_eq!(
            extract_conversation_id("/support?tab=open&conversation=abc-1&x=2").as_deref(),
            Some("abc-1")
        );
        assert_eq!(extract_conversation_id("/admin/support"), None);
        assert_eq!(extract_conversation_id("/admin/support?conversation="), None);
    }

    fn support(read: bool, url: &str) -> Notification {
        Notification::new("s1", NotificationType::SupportMessage, "Nuevo mensaje", "Hola")
            .with_read(read)
            .with_action_url(url)
    }

    #[test]
    fn test_support_click_on_admin_uses_handler() {
        let outcome = resolve_click(&support(false, "/admin/support?conversation=42"), "/admin", "/admin", true);
        assert_eq!(
            outcome,
            ClickOutcome {
                mark_read: true,
                action: ClickAction::SelectConversation("42".to_string()),
                close_menu: true,
            }
        );

        let outcome = resolve_click(&support(true, "/admin/support"), "/admin", "/admin", true);
        assert_eq!(outcome.action, ClickAction::SelectConversation(String::new()));
        assert!(!outcome.mark_read);

        let outcome = resolve_click(&support(true, "/admin/support?conversation=42"), "/admin", "/admin", false);
        assert_eq!(outcome.action, ClickAction::Nothing);
        assert!(outcome.close_menu);
    }

    #[test]
    fn test_support_click_elsewhere_navigates() {
        let outcome = resolve_click(&support(false, "/admin/support?conversation=42"), "/trips", "/admin", true);
        assert_eq!(
            outcome.action,
            ClickAction::Navigate("/admin?section=support&conversation=42".to_string())
        );

        let outcome = resolve_click(&support(false, "/admin/support"), "/trips", "/admin", false);
        assert_eq!(outcome.action, ClickAction::Navigate("/admin?section=support".to_string()));
    }

    #[test]
    fn test_other_clicks() {
        let booking = Notification::new("b", NotificationType::NewBooking, "Reserva", "Nueva")
            .with_action_url("/admin?section=bookings&id=7");
        let outcome = resolve_click(&booking, "/admin", "/admin", true);
        assert_eq!(outcome.action, ClickAction::Navigate("/admin?section=bookings&id=7".to_string()));

        let plain = Notification::new("p", NotificationType::System, "Aviso", "Mantenimiento").with_read(true);
        let outcome = resolve_click(&plain, "/admin", "/admin", true);
        assert_eq!(
            outcome,
            ClickOutcome {
                mark_read: false,
                action: ClickAction::Nothing,
                close_menu: true
            }
        );
    }

    #[test]
    fn test_snapshot_states() {
        let mut cache = InboxCache::new(2);
        let now = Utc::now();

        let snapshot = InboxSnapshot::build(&cache, true, now);
        assert_eq!(snapshot.body, PanelBody::Empty);
        assert!(snapshot.load_more.is_none());

        let request = cache.begin_load(false).unwrap();
        assert_eq!(InboxSnapshot::build(&cache, true, now).body, PanelBody::Loading);

        cache.apply_page(
            request,
            NotificationPage {
                notifications: vec![
                    Notification::new("1", NotificationType::NewBooking, "a", "b").with_timestamp(now),
                    Notification::new("2", NotificationType::PaymentSuccess, "c", "d").with_read(true),
                ],
                unread: 12,
                ..NotificationPage::default()
            },
        );
        let snapshot = InboxSnapshot::build(&cache, true, now);
        assert_eq!(snapshot.body, PanelBody::List);
        assert_eq!(snapshot.badge.as_deref(), Some("9+"));
        assert!(snapshot.can_mark_all);
        assert_eq!(snapshot.entries[0].age, "Hace un momento");
        assert_eq!(
            snapshot.load_more,
            Some(LoadMoreButton {
                label: LOAD_MORE_LABEL,
                enabled: true
            })
        );

        cache.begin_load(false).unwrap();
        let snapshot = InboxSnapshot::build(&cache, true, now);
        assert_eq!(snapshot.body, PanelBody::List);
        assert_eq!(
            snapshot.load_more,
            Some(LoadMoreButton {
                label: LOADING_MORE_LABEL,
                enabled: false
            })
        );
    }
}
