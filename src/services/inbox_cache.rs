// src/services/inbox_cache.rs
use std::collections::HashSet;

use tracing;

use crate::models::notification::{Notification, NotificationPage};

pub const LOAD_ERROR_MESSAGE: &str =
    "No se pudieron cargar las notificaciones. Por favor, inténtalo de nuevo.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    Empty,            // Nothing fetched yet
    LoadingFirstPage, // Mount or refresh in flight
    Loaded,
    LoadingMore,      // Next page in flight, list stays visible
    Error,            // Last load failed, list kept as it was
}

/// Read state of a single entry, tracking the optimistic mark-as-read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadState {
    Unread,
    Pending,          // Shown as read, confirmation in flight
    Confirmed,
    FailedNeedsRetry, // Shown as read, confirmation failed
}

#[derive(Debug, Clone, PartialEq)]
pub struct InboxEntry {
    pub notification: Notification,
    pub read_state: ReadState,
}

impl InboxEntry {
    fn from_server(notification: Notification) -> Self {
        let read_state = if notification.read {
            ReadState::Confirmed
        } else {
            ReadState::Unread
        };
        Self {
            notification,
            read_state,
        }
    }

    fn awaiting_confirmation(&self) -> bool {
        matches!(self.read_state, ReadState::Pending | ReadState::FailedNeedsRetry)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub page_size: u32,
    seq: u64, // Only the latest request may land
}

impl PageRequest {
    pub fn is_first_page(&self) -> bool {
        self.page == 1
    }
}

/// Local copy of the inbox plus the unread counter, reconciled against
/// fetched pages, pushes and authoritative counts.
#[derive(Debug, Clone)]
pub struct InboxCache {
    entries: Vec<InboxEntry>,
    unread: u32,
    state: LoadState,
    next_page: u32,
    has_more: bool,
    page_size: u32,
    error: Option<String>,
    load_seq: u64,
}

impl InboxCache {
    pub fn new(page_size: u32) -> Self {
        Self {
            entries: Vec::new(),
            unread: 0,
            state: LoadState::Empty,
            next_page: 1,
            has_more: true,
            page_size: page_size.max(1),
            error: None,
            load_seq: 0,
        }
    }

    pub fn entries(&self) -> &[InboxEntry] {
        &self.entries
    }

    pub fn get(&self, id: &str) -> Option<&InboxEntry> {
        self.entries.iter().find(|e| e.notification.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn unread(&self) -> u32 {
        self.unread
    }

    pub fn state(&self) -> LoadState {
        self.state
    }

    pub fn has_more(&self) -> bool {
        self.has_more
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn is_loading(&self) -> bool {
        matches!(self.state, LoadState::LoadingFirstPage | LoadState::LoadingMore)
    }

    /// Starts a load, or returns `None` when it would duplicate one in flight
    /// or there is nothing more to fetch. A refresh supersedes a pending
    /// load-more, whose result is then dropped.
    pub fn begin_load(&mut self, refresh: bool) -> Option<PageRequest> {
        match self.state {
            LoadState::LoadingFirstPage => return None,
            LoadState::LoadingMore if !refresh => return None,
            _ => {}
        }
        if !refresh && !self.has_more {
            return None;
        }

        let page = if refresh { 1 } else { self.next_page };
        self.state = if page == 1 {
            LoadState::LoadingFirstPage
        } else {
            LoadState::LoadingMore
        };
        self.error = None;
        self.load_seq += 1;

        Some(PageRequest {
            page,
            page_size: self.page_size,
            seq: self.load_seq,
        })
    }

    fn is_stale(&self, request: PageRequest) -> bool {
        if request.seq != self.load_seq {
            tracing::debug!("Dropping superseded load of page {}", request.page);
            return true;
        }
        false
    }

    /// Applies a fetched page. Returns false when a newer load superseded it.
    pub fn apply_page(&mut self, request: PageRequest, page: NotificationPage) -> bool {
        if self.is_stale(request) {
            return false;
        }
        let mut incoming = page.notifications;
        incoming.truncate(request.page_size as usize);
        let received = incoming.len();

        if request.is_first_page() {
            let previous: Vec<InboxEntry> = std::mem::take(&mut self.entries);
            let mut seen = HashSet::new();
            for notification in incoming {
                if !seen.insert(notification.id.clone()) {
                    continue;
                }
                let local = previous
                    .iter()
                    .find(|e| e.notification.id == notification.id && e.awaiting_confirmation());
                let entry = match local {
                    // keep the optimistic read until the confirmation lands
                    Some(local) if !notification.read => InboxEntry {
                        notification: Notification { read: true, ..notification },
                        read_state: local.read_state,
                    },
                    _ => InboxEntry::from_server(notification),
                };
                self.entries.push(entry);
            }
        } else {
            for notification in incoming {
                if self.contains(&notification.id) {
                    continue;
                }
                self.entries.push(InboxEntry::from_server(notification));
            }
        }

        self.next_page = request.page + 1;
        self.has_more = received == request.page_size as usize;
        self.unread = page.unread;
        self.state = LoadState::Loaded;
        self.error = None;
        true
    }

    pub fn fail_load(&mut self, request: PageRequest) {
        if self.is_stale(request) {
            return;
        }
        tracing::debug!("Load of page {} failed, keeping {} entries", request.page, self.entries.len());
        self.state = LoadState::Error;
        self.error = Some(LOAD_ERROR_MESSAGE.to_string());
    }

    /// Inserts a pushed notification at the head. Returns false for duplicates.
    pub fn push_arrival(&mut self, notification: Notification) -> bool {
        if self.contains(&notification.id) {
            return false;
        }
        if !notification.read {
            self.unread += 1;
        }
        self.entries.insert(0, InboxEntry::from_server(notification));
        true
    }

    pub fn set_unread(&mut self, count: u32) {
        self.unread = count;
    }

    /// Optimistically marks one entry read. Returns true if a confirming
    /// request should be sent.
    pub fn begin_mark_read(&mut self, id: &str) -> bool {
        let Some(entry) = self.entries.iter_mut().find(|e| e.notification.id == id) else {
            return false;
        };
        if entry.notification.read {
            return false;
        }
        entry.notification.read = true;
        entry.read_state = ReadState::Pending;
        self.unread = self.unread.saturating_sub(1);
        true
    }

    pub fn confirm_read(&mut self, id: &str) {
        if let Some(entry) = self.entries.iter_mut().find(|e| e.notification.id == id) {
            entry.notification.read = true;
            entry.read_state = ReadState::Confirmed;
        }
    }

    pub fn fail_read(&mut self, id: &str) {
        if let Some(entry) = self.entries.iter_mut().find(|e| e.notification.id == id) {
            if entry.read_state == ReadState::Pending {
                entry.read_state = ReadState::FailedNeedsRetry;
            }
        }
    }

    /// Ids whose read confirmation failed, flipped back to pending for a retry.
    pub fn take_retries(&mut self) -> Vec<String> {
        self.entries
            .iter_mut()
            .filter(|e| e.read_state == ReadState::FailedNeedsRetry)
            .map(|e| {
                e.read_state = ReadState::Pending;
                e.notification.id.clone()
            })
            .collect()
    }

    pub fn apply_mark_all_read(&mut self) {
        for entry in &mut self.entries {
            entry.notification.read = true;
            entry.read_state = ReadState::Confirmed;
        }
        self.unread = 0;
    }

    /// Removes a confirmed delete. The counter drops only for unread entries.
    pub fn apply_delete(&mut self, id: &str) -> Option<InboxEntry> {
        let index = self.entries.iter().position(|e| e.notification.id == id)?;
        let removed = self.entries.remove(index);
        if !removed.notification.read {
            self.unread = self.unread.saturating_sub(1);
        }
        Some(removed)
    }

    pub fn apply_delete_all(&mut self) {
        self.entries.clear();
        self.unread = 0;
        self.has_more = false;
        self.next_page = 1;
    }
}
