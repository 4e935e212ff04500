//! Secondary lifecycle events: background sync, push, notification clicks
//! and control messages.
//!
//! None of these take part in routing. Failures inside sync and push are
//! logged and swallowed so one bad event never affects the next.

use serde::{Deserialize, Serialize};

use super::{ActivateReport, Coordinator, WorkerState};
use crate::fetch::resolve;
use safenest_core::Error;

/// Sync tag the dashboard registers for deferred work.
pub const BACKGROUND_SYNC_TAG: &str = "background-sync";

const NOTIFICATION_TITLE: &str = "SafeNest";
const NOTIFICATION_BODY: &str = "New notification from SafeNest";
const NOTIFICATION_ICON: &str = "/static/images/icon-192x192.png";
const NOTIFICATION_BADGE: &str = "/static/images/badge-72x72.png";

/// Outcome of a `sync` event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncOutcome {
    Completed,
    /// Tag not handled by this coordinator.
    Ignored,
    /// Sync routine failed; the error was logged.
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotificationAction {
    pub action: String,
    pub title: String,
    pub icon: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotificationData {
    /// Page opened when the notification is clicked.
    pub url: String,
    pub received_at: String,
}

/// Notification the host should display for a push.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub title: String,
    pub body: String,
    pub icon: String,
    pub badge: String,
    pub vibrate: Vec<u32>,
    pub data: NotificationData,
    pub actions: Vec<NotificationAction>,
}

/// Structured push payload; plain-text payloads become the body.
#[derive(Debug, Default, Deserialize)]
struct PushPayload {
    title: Option<String>,
    body: Option<String>,
    url: Option<String>,
}

impl PushPayload {
    fn parse(payload: Option<&str>) -> Self {
        let Some(text) = payload.map(str::trim).filter(|text| !text.is_empty()) else {
            return Self::default();
        };

        if text.starts_with('{') {
            match serde_json::from_str(text) {
                Ok(parsed) => return parsed,
                Err(e) => tracing::warn!("malformed push payload, using it as text: {e}"),
            }
        }

        Self { body: Some(text.to_string()), ..Default::default() }
    }
}

/// What the host should do after a notification click.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClickOutcome {
    pub close: bool,
    /// Window to open or focus, if any.
    pub open_url: Option<String>,
}

/// Control message posted by a page.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type")]
pub enum ControlMessage {
    /// Activate an installed coordinator without waiting for tabs to close.
    #[serde(rename = "SKIP_WAITING")]
    SkipWaiting,
    #[serde(other)]
    Unknown,
}

impl ControlMessage {
    /// Decode a posted message; anything unrecognized is `Unknown`.
    pub fn parse(value: &serde_json::Value) -> Self {
        serde_json::from_value(value.clone()).unwrap_or(ControlMessage::Unknown)
    }
}

impl Coordinator {
    /// Handle a `sync` event.
    pub async fn handle_sync(&self, tag: &str) -> SyncOutcome {
        if tag != BACKGROUND_SYNC_TAG {
            tracing::debug!(tag, "ignoring unknown sync tag");
            return SyncOutcome::Ignored;
        }

        match self.background_sync().await {
            Ok(()) => SyncOutcome::Completed,
            Err(e) => {
                tracing::error!(tag, "background sync failed: {e}");
                SyncOutcome::Failed
            }
        }
    }

    /// Deferred work replayed when connectivity returns.
    ///
    /// Nothing is queued yet; the hook only records that the browser
    /// delivered the event.
    async fn background_sync(&self) -> Result<(), Error> {
        tracing::info!(state = %self.state(), "background sync triggered");
        Ok(())
    }

    /// Handle a `push` event, returning the notification to display.
    pub fn handle_push(&self, payload: Option<&str>) -> Notification {
        let payload = PushPayload::parse(payload);
        let url = payload.url.unwrap_or_else(|| "/".to_string());

        tracing::info!("push received, showing notification for {}", url);

        Notification {
            title: payload.title.unwrap_or_else(|| NOTIFICATION_TITLE.to_string()),
            body: payload.body.unwrap_or_else(|| NOTIFICATION_BODY.to_string()),
            icon: NOTIFICATION_ICON.to_string(),
            badge: NOTIFICATION_BADGE.to_string(),
            vibrate: vec![100, 50, 100],
            data: NotificationData { url, received_at: chrono::Utc::now().to_rfc3339() },
            actions: vec![
                NotificationAction {
                    action: "explore".to_string(),
                    title: "Open SafeNest".to_string(),
                    icon: "/static/images/checkmark.png".to_string(),
                },
                NotificationAction {
                    action: "close".to_string(),
                    title: "Close".to_string(),
                    icon: "/static/images/xmark.png".to_string(),
                },
            ],
        }
    }

    /// Handle a `notificationclick` event.
    pub fn handle_notification_click(&self, action: Option<&str>, url: Option<&str>) -> ClickOutcome {
        match action {
            Some("close") => ClickOutcome { close: true, open_url: None },
            Some("explore") | Some("") | None => {
                let target = url.unwrap_or("/");
                let open_url = match resolve(&self.config().origin, target) {
                    Ok(resolved) => resolved.to_string(),
                    Err(e) => {
                        tracing::warn!("bad notification url {:?}, opening origin: {e}", target);
                        self.config().origin.to_string()
                    }
                };
                ClickOutcome { close: true, open_url: Some(open_url) }
            }
            Some(other) => {
                tracing::debug!(action = other, "unknown notification action, closing");
                ClickOutcome { close: true, open_url: None }
            }
        }
    }

    /// Handle a `message` event.
    ///
    /// Returns the activation report when the message caused activation.
    pub async fn handle_message(&self, message: ControlMessage) -> Result<Option<ActivateReport>, Error> {
        match message {
            ControlMessage::SkipWaiting => {
                self.lifecycle.skip_waiting();
                if self.state() == WorkerState::Installed {
                    return self.activate().await.map(Some);
                }
                tracing::debug!(state = %self.state(), "skip waiting recorded");
                Ok(None)
            }
            ControlMessage::Unknown => {
                tracing::debug!("ignoring unknown control message");
                Ok(None)
            }
        }
    }
}
