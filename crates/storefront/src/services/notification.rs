//! LINE notification after a purchase.
//!
//! Inside the LINE app the customer gets a visible countdown, then the receipt
//! is sent to their chat and the LIFF window closes shortly after. The
//! purchase has already completed when this runs; a failed send only changes
//! the notification status.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::config::PointsConfig;
use crate::liff::{ClientDirective, LiffSdk, LineMessage};

const TICK: Duration = Duration::from_secs(1);

/// Progress of the notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum NotificationStatus {
    Idle,
    #[serde(rename_all = "camelCase")]
    CountingDown {
        remaining_secs: u64,
    },
    Sent,
    Failed {
        message: String,
    },
    Cancelled,
}

impl NotificationStatus {
    /// Whether the flow has stopped.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Sent | Self::Failed { .. } | Self::Cancelled)
    }
}

/// Countdown, send and close for one purchase notification.
pub struct NotificationFlow {
    countdown: Duration,
    close_delay: Duration,
    status: watch::Sender<NotificationStatus>,
    cancel: CancellationToken,
    directives: Mutex<Vec<ClientDirective>>,
}

impl std::fmt::Debug for NotificationFlow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationFlow")
            .field("countdown", &self.countdown)
            .field("close_delay", &self.close_delay)
            .field("status", &*self.status.borrow())
            .finish_non_exhaustive()
    }
}

impl NotificationFlow {
    #[must_use]
    pub fn new(countdown: Duration, close_delay: Duration) -> Self {
        let (status, _) = watch::channel(NotificationStatus::Idle);
        Self {
            countdown,
            close_delay,
            status,
            cancel: CancellationToken::new(),
            directives: Mutex::new(Vec::new()),
        }
    }

    #[must_use]
    pub fn from_config(config: &PointsConfig) -> Self {
        Self::new(config.notification_countdown, config.close_delay)
    }

    /// Current status.
    #[must_use]
    pub fn status(&self) -> NotificationStatus {
        self.status.borrow().clone()
    }

    /// Watch status changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<NotificationStatus> {
        self.status.subscribe()
    }

    /// Stop the countdown or the pending close.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Browser actions produced by the flow (the close-window request).
    pub fn take_directives(&self) -> Vec<ClientDirective> {
        std::mem::take(&mut *self.directives.lock().unwrap_or_else(PoisonError::into_inner))
    }

    fn publish(&self, status: NotificationStatus) {
        debug!(?status, "Notification status");
        self.status.send_replace(status);
    }

    /// Run the flow to completion and return the final status.
    ///
    /// Outside the LINE client nothing happens and the status stays `Idle`.
    #[instrument(skip_all, fields(messages = messages.len()))]
    pub async fn run(&self, sdk: Arc<dyn LiffSdk>, messages: Vec<LineMessage>) -> NotificationStatus {
        if !sdk.is_in_client() {
            debug!("Not inside LINE, skipping notification");
            return self.status();
        }

        let mut remaining = self.countdown.as_secs();
        while remaining > 0 {
            self.publish(NotificationStatus::CountingDown {
                remaining_secs: remaining,
            });
            tokio::select! {
                () = self.cancel.cancelled() => {
                    info!("Notification cancelled during countdown");
                    self.publish(NotificationStatus::Cancelled);
                    return self.status();
                }
                () = tokio::time::sleep(TICK) => {}
            }
            remaining -= 1;
        }

        if let Err(e) = sdk.send_messages(&messages).await {
            warn!(error = %e, "Failed to send LINE notification");
            self.publish(NotificationStatus::Failed {
                message: format!("LINE 訊息傳送失敗：{e}"),
            });
            return self.status();
        }
        info!("LINE notification sent");
        self.publish(NotificationStatus::Sent);

        tokio::select! {
            () = self.cancel.cancelled() => {
                debug!("Close cancelled");
            }
            () = tokio::time::sleep(self.close_delay) => {
                match sdk.close_window().await {
                    Ok(()) => self
                        .directives
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .extend(sdk.take_directives()),
                    Err(e) => warn!(error = %e, "Failed to close LIFF window"),
                }
            }
        }
        self.status()
    }

    /// Run the flow on a background task.
    pub fn spawn(
        self: &Arc<Self>,
        sdk: Arc<dyn LiffSdk>,
        messages: Vec<LineMessage>,
    ) -> tokio::task::JoinHandle<NotificationStatus> {
        let flow = Arc::clone(self);
        tokio::spawn(async move { flow.run(sdk, messages).await })
    }
}

impl Drop for NotificationFlow {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
