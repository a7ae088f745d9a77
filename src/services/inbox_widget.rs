// src/services/inbox_widget.rs
use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Interval, MissedTickBehavior};
use tracing;

use crate::{
    models::notification::Notification,
    services::{
        inbox_cache::InboxCache,
        notification_api::NotificationApi,
        presentation::{ClickAction, ClickOutcome, InboxSnapshot, VIEW_ALL_ROUTE, resolve_click},
        push_listener::{PushChannel, run_listener},
    },
    state::InboxConfig,
};

/// Host routing, kept outside the widget.
pub trait Navigator: Send + Sync {
    fn current_path(&self) -> String;
    fn navigate(&self, target: &str);
}

pub type ConversationHandler = Arc<dyn Fn(&str) + Send + Sync>;

struct Inner {
    cache: InboxCache,
    generation: u64,
    mounted: bool,
}

struct Shared {
    inner: Mutex<Inner>,
    is_open: AtomicBool,
    changes: watch::Sender<u64>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        // cache updates never panic midway, a poisoned lock still holds a usable cache
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn current_generation(&self) -> Option<u64> {
        let inner = self.lock();
        inner.mounted.then_some(inner.generation)
    }

    /// Runs `f` against the cache if it still belongs to `generation`.
    fn apply<T>(&self, generation: u64, f: impl FnOnce(&mut InboxCache) -> T) -> Option<T> {
        let out = {
            let mut inner = self.lock();
            if !inner.mounted || inner.generation != generation {
                tracing::debug!("Discarding result from a previous mount");
                return None;
            }
            f(&mut inner.cache)
        };
        self.notify();
        Some(out)
    }

    fn notify(&self) {
        self.changes.send_modify(|revision| *revision += 1);
    }
}

struct Mount {
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

/// Notification bell and dropdown for the admin dashboard, without the drawing.
pub struct NotificationInbox {
    config: InboxConfig,
    api: Arc<dyn NotificationApi>,
    navigator: Arc<dyn Navigator>,
    on_support_conversation: Option<ConversationHandler>,
    shared: Arc<Shared>,
    mount: Mutex<Option<Mount>>,
}

impl NotificationInbox {
    pub fn new(config: InboxConfig, api: Arc<dyn NotificationApi>, navigator: Arc<dyn Navigator>) -> Self {
        let (changes, _) = watch::channel(0);
        let shared = Arc::new(Shared {
            inner: Mutex::new(Inner {
                cache: InboxCache::new(config.page_size),
                generation: 0,
                mounted: false,
            }),
            is_open: AtomicBool::new(false),
            changes,
        });

        Self {
            config,
            api,
            navigator,
            on_support_conversation: None,
            shared,
            mount: Mutex::new(None),
        }
    }

    pub fn with_conversation_handler(mut self, handler: ConversationHandler) -> Self {
        self.on_support_conversation = Some(handler);
        self
    }

    pub fn is_mounted(&self) -> bool {
        self.shared.current_generation().is_some()
    }

    pub fn is_open(&self) -> bool {
        self.shared.is_open.load(Ordering::SeqCst)
    }

    /// Revision counter bumped on every state change.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.shared.changes.subscribe()
    }

    pub fn snapshot(&self) -> InboxSnapshot {
        let inner = self.shared.lock();
        InboxSnapshot::build(&inner.cache, self.is_open(), Utc::now())
    }

    /// Starts the listener and poll tasks and loads the first page.
    pub async fn mount(&self, push: Option<Box<dyn PushChannel>>) {
        let generation = {
            let mut slot = self.mount.lock().unwrap_or_else(|p| p.into_inner());
            if slot.is_some() {
                tracing::warn!("Notification inbox already mounted, ignoring");
                return;
            }

            let generation = {
                let mut inner = self.shared.lock();
                inner.generation += 1;
                inner.mounted = true;
                inner.cache = InboxCache::new(self.config.page_size);
                inner.generation
            };

            let (shutdown, shutdown_rx) = watch::channel(false);
            let mut tasks = Vec::with_capacity(2);

            if let Some(channel) = push {
                let shared = self.shared.clone();
                tasks.push(tokio::spawn(run_listener(channel, shutdown_rx.clone(), move |notification| {
                    let id = notification.id.clone();
                    if shared.apply(generation, |cache| cache.push_arrival(notification)) == Some(false) {
                        tracing::debug!("Ignoring duplicate push {}", id);
                    }
                })));
            }

            tasks.push(tokio::spawn(poll_unread(
                self.shared.clone(),
                self.api.clone(),
                generation,
                self.config.poll_interval,
                shutdown_rx,
            )));

            *slot = Some(Mount { shutdown, tasks });
            generation
        };

        tracing::info!("Notification inbox mounted (generation {})", generation);
        self.shared.notify();
        self.load(false).await;
    }

    /// Stops both tasks and drops the cache. Calling it again is a no-op.
    pub async fn unmount(&self) {
        let Some(mount) = self.mount.lock().unwrap_or_else(|p| p.into_inner()).take() else {
            return;
        };

        {
            let mut inner = self.shared.lock();
            inner.mounted = false;
            inner.generation += 1;
            inner.cache = InboxCache::new(self.config.page_size);
        }
        self.shared.is_open.store(false, Ordering::SeqCst);

        let _ = mount.shutdown.send(true);
        for task in mount.tasks {
            if let Err(e) = task.await {
                tracing::warn!("Notification inbox task ended abnormally: {}", e);
            }
        }

        tracing::info!("Notification inbox unmounted");
        self.shared.notify();
    }

    pub async fn toggle_menu(&self) {
        if self.is_open() {
            self.close_menu();
        } else {
            self.open_menu().await;
        }
    }

    /// Opening always refreshes from the first page.
    pub async fn open_menu(&self) {
        self.shared.is_open.store(true, Ordering::SeqCst);
        self.shared.notify();
        self.load(true).await;
    }

    pub fn close_menu(&self) {
        if self.shared.is_open.swap(false, Ordering::SeqCst) {
            self.shared.notify();
        }
    }

    pub fn outside_click(&self) {
        self.close_menu();
    }

    pub async fn load_more(&self) {
        self.load(false).await;
    }

    async fn load(&self, refresh: bool) {
        let Some(generation) = self.shared.current_generation() else {
            return;
        };
        let Some(request) = self.shared.apply(generation, |cache| cache.begin_load(refresh)).flatten() else {
            return;
        };

        let result = self.api.list_notifications(request.page, request.page_size, false).await;
        self.shared.apply(generation, |cache| match result {
            Ok(page) => {
                cache.apply_page(request, page);
            }
            Err(e) => {
                tracing::error!("Error loading notifications (page {}): {}", request.page, e);
                cache.fail_load(request);
            }
        });
    }

    pub async fn mark_read(&self, id: &str) {
        let Some(generation) = self.shared.current_generation() else {
            return;
        };
        if self.shared.apply(generation, |cache| cache.begin_mark_read(id)) != Some(true) {
            return;
        }
        confirm_read(&self.shared, self.api.as_ref(), generation, id).await;
    }

    pub async fn mark_all_read(&self) {
        let Some(generation) = self.shared.current_generation() else {
            return;
        };
        match self.api.mark_all_read().await {
            Ok(ack) => {
                tracing::debug!("Marked {} notifications as read", ack.count);
                self.shared.apply(generation, |cache| cache.apply_mark_all_read());
            }
            Err(e) => tracing::warn!("Error marking all notifications as read: {}", e),
        }
    }

    pub async fn delete(&self, id: &str) {
        let Some(generation) = self.shared.current_generation() else {
            return;
        };
        match self.api.delete_notification(id).await {
            Ok(_) => {
                self.shared.apply(generation, |cache| cache.apply_delete(id));
            }
            Err(e) => tracing::warn!("Error deleting notification {}: {}", id, e),
        }
    }

    pub async fn delete_all(&self) {
        let Some(generation) = self.shared.current_generation() else {
            return;
        };
        match self.api.delete_all().await {
            Ok(ack) => {
                tracing::info!("Deleted {} notifications", ack.count);
                self.shared.apply(generation, |cache| cache.apply_delete_all());
            }
            Err(e) => tracing::warn!("Error deleting all notifications: {}", e),
        }
    }

    /// Handles a click on one entry. Returns `None` for ids not in the list.
    pub async fn click(&self, id: &str) -> Option<ClickOutcome> {
        let notification: Notification = {
            let inner = self.shared.lock();
            inner.cache.get(id)?.notification.clone()
        };

        let outcome = resolve_click(
            &notification,
            &self.navigator.current_path(),
            &self.config.admin_path,
            self.on_support_conversation.is_some(),
        );

        match &outcome.action {
            ClickAction::SelectConversation(conversation) => {
                tracing::debug!("Selecting support conversation '{}'", conversation);
                if let Some(handler) = &self.on_support_conversation {
                    handler(conversation.as_str());
                }
            }
            ClickAction::Navigate(target) => self.navigator.navigate(target),
            ClickAction::Nothing => {}
        }
        if outcome.close_menu {
            self.close_menu();
        }
        if outcome.mark_read {
            self.mark_read(id).await;
        }

        Some(outcome)
    }

    pub fn view_all(&self) {
        self.navigator.navigate(VIEW_ALL_ROUTE);
        self.close_menu();
    }
}

async fn confirm_read(shared: &Shared, api: &dyn NotificationApi, generation: u64, id: &str) {
    match api.mark_read(id).await {
        Ok(_) => {
            shared.apply(generation, |cache| cache.confirm_read(id));
        }
        Err(e) => {
            tracing::warn!("Error marking notification {} as read: {}", id, e);
            shared.apply(generation, |cache| cache.fail_read(id));
        }
    }
}

/// Refreshes the authoritative unread count on a fixed interval and retries
/// read confirmations that failed earlier. The first tick fires immediately.
async fn poll_unread(
    shared: Arc<Shared>,
    api: Arc<dyn NotificationApi>,
    generation: u64,
    every: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    // shutdown also cancels a tick whose calls are still in flight
    loop {
        tokio::select! {
            _ = stopped(&mut shutdown) => break,
            _ = poll_tick(&mut ticker, &shared, api.as_ref(), generation) => {}
        }
    }
    tracing::debug!("Unread poll stopped");
}

async fn poll_tick(ticker: &mut Interval, shared: &Shared, api: &dyn NotificationApi, generation: u64) {
    ticker.tick().await;

    match api.unread_count().await {
        Ok(count) => {
            shared.apply(generation, |cache| cache.set_unread(count));
        }
        Err(e) => tracing::warn!("Error loading unread count: {}", e),
    }

    let retries = shared.apply(generation, |cache| cache.take_retries()).unwrap_or_default();
    for id in retries {
        tracing::debug!("Retrying read confirmation for {}", id);
        confirm_read(shared, api, generation, &id).await;
    }
}

/// Resolves once shutdown is requested or the sender is gone.
async fn stopped(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}
