use std::sync::Arc;

use notification_inbox::{
    HttpNotificationApi, InboxConfig, InboxSnapshot, Navigator, NotificationInbox, PushChannel, SocketIoChannel,
};

/// Stands in for the dashboard router: logs where a click would go.
struct LoggingNavigator {
    path: String,
}

impl Navigator for LoggingNavigator {
    fn current_path(&self) -> String {
        self.path.clone()
    }

    fn navigate(&self, target: &str) {
        tracing::info!("Navigate to {}", target);
    }
}

fn log_snapshot(snapshot: &InboxSnapshot) {
    tracing::info!(
        "badge={} open={} entries={} error={:?}",
        snapshot.badge.as_deref().unwrap_or("-"),
        snapshot.is_open,
        snapshot.entries.len(),
        snapshot.error
    );
    for entry in snapshot.entries.iter().take(5) {
        tracing::info!(
            "  [{}] {} {} ({}){}",
            entry.icon.label,
            entry.title,
            entry.message,
            entry.age,
            if entry.read { "" } else { " *" }
        );
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let config = match InboxConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("{}", e);
            std::process::exit(2);
        }
    };

    let api = match HttpNotificationApi::new(&config) {
        Ok(api) => api,
        Err(e) => {
            tracing::error!("Could not build notification client: {}", e);
            std::process::exit(2);
        }
    };

    let push: Option<Box<dyn PushChannel>> = match &config.push_url {
        Some(url) => match SocketIoChannel::connect(url, &config.namespace).await {
            Ok(channel) => Some(Box::new(channel) as Box<dyn PushChannel>),
            Err(e) => {
                tracing::warn!("Push channel unavailable, relying on polling: {}", e);
                None
            }
        },
        None => None,
    };

    let navigator = Arc::new(LoggingNavigator {
        path: config.admin_path.clone(),
    });
    let inbox = NotificationInbox::new(config, Arc::new(api), navigator).with_conversation_handler(Arc::new(
        |conversation: &str| tracing::info!("Open support conversation '{}'", conversation),
    ));

    inbox.mount(push).await;
    inbox.open_menu().await;

    let mut changes = inbox.subscribe();
    log_snapshot(&inbox.snapshot());
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = changes.changed() => {
                if changed.is_err() {
                    break;
                }
                log_snapshot(&inbox.snapshot());
            }
        }
    }

    inbox.unmount().await;
}
