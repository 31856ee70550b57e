//! Notifier gateway: admin/user notifications and order emails.
//!
//! Delivery is fire-and-forget. The gateway spawns each call on the runtime
//! and only logs failures; the order workflow never waits on it.

use std::sync::Arc;

use async_trait::async_trait;
use common::UserId;
use domain::Order;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::Mutex;

/// Notification category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    OrderPlaced,
    OrderStatusChanged,
    OrderCancelled,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::OrderPlaced => "order_placed",
            NotificationKind::OrderStatusChanged => "order_status_changed",
            NotificationKind::OrderCancelled => "order_cancelled",
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Notification failed: {0}")]
pub struct NotifyError(pub String);

/// Delivery channel for notifications and order emails.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify_admin(
        &self,
        kind: NotificationKind,
        payload: serde_json::Value,
    ) -> Result<(), NotifyError>;

    async fn notify_user(
        &self,
        user_id: UserId,
        kind: NotificationKind,
        payload: serde_json::Value,
    ) -> Result<(), NotifyError>;

    async fn send_order_confirmation_email(
        &self,
        order: &Order,
        is_admin_copy: bool,
    ) -> Result<(), NotifyError>;

    async fn send_order_status_update_email(&self, order: &Order) -> Result<(), NotifyError>;
}

/// Notifier that writes every call to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

#[async_trait]
impl Notifier for TracingNotifier {
    async fn notify_admin(
        &self,
        kind: NotificationKind,
        payload: serde_json::Value,
    ) -> Result<(), NotifyError> {
        tracing::info!(kind = kind.as_str(), %payload, "admin notification");
        Ok(())
    }

    async fn notify_user(
        &self,
        user_id: UserId,
        kind: NotificationKind,
        payload: serde_json::Value,
    ) -> Result<(), NotifyError> {
        tracing::info!(%user_id, kind = kind.as_str(), %payload, "user notification");
        Ok(())
    }

    async fn send_order_confirmation_email(
        &self,
        order: &Order,
        is_admin_copy: bool,
    ) -> Result<(), NotifyError> {
        tracing::info!(
            order_number = %order.order_number,
            to = %order.customer_email,
            is_admin_copy,
            "order confirmation email"
        );
        Ok(())
    }

    async fn send_order_status_update_email(&self, order: &Order) -> Result<(), NotifyError> {
        tracing::info!(
            order_number = %order.order_number,
            status = %order.status,
            "order status update email"
        );
        Ok(())
    }
}

/// A call captured by [`RecordingNotifier`].
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    Admin {
        kind: NotificationKind,
        payload: serde_json::Value,
    },
    User {
        user_id: UserId,
        kind: NotificationKind,
    },
    ConfirmationEmail {
        order_number: String,
        is_admin_copy: bool,
    },
    StatusUpdateEmail {
        order_number: String,
        status: domain::OrderStatus,
    },
}

#[derive(Debug, Default)]
struct RecordingState {
    sent: Vec<Notification>,
    fail: bool,
}

/// In-memory notifier for testing.
#[derive(Debug, Clone, Default)]
pub struct RecordingNotifier {
    state: Arc<Mutex<RecordingState>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures every call to fail after being recorded.
    pub async fn set_fail(&self, fail: bool) {
        self.state.lock().await.fail = fail;
    }

    pub async fn notifications(&self) -> Vec<Notification> {
        self.state.lock().await.sent.clone()
    }

    async fn record(&self, notification: Notification) -> Result<(), NotifyError> {
        let mut state = self.state.lock().await;
        state.sent.push(notification);
        if state.fail {
            return Err(NotifyError("delivery disabled".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify_admin(
        &self,
        kind: NotificationKind,
        payload: serde_json::Value,
    ) -> Result<(), NotifyError> {
        self.record(Notification::Admin { kind, payload }).await
    }

    async fn notify_user(
        &self,
        user_id: UserId,
        kind: NotificationKind,
        _payload: serde_json::Value,
    ) -> Result<(), NotifyError> {
        self.record(Notification::User { user_id, kind }).await
    }

    async fn send_order_confirmation_email(
        &self,
        order: &Order,
        is_admin_copy: bool,
    ) -> Result<(), NotifyError> {
        self.record(Notification::ConfirmationEmail {
            order_number: order.order_number.clone(),
            is_admin_copy,
        })
        .await
    }

    async fn send_order_status_update_email(&self, order: &Order) -> Result<(), NotifyError> {
        self.record(Notification::StatusUpdateEmail {
            order_number: order.order_number.clone(),
            status: order.status,
        })
        .await
    }
}

/// Spawns notifier calls without awaiting them.
#[derive(Clone)]
pub struct NotifierGateway {
    notifier: Arc<dyn Notifier>,
}

impl NotifierGateway {
    pub fn new(notifier: Arc<dyn Notifier>) -> Self {
        Self { notifier }
    }

    /// Admin alert plus confirmation emails to the customer and the admin copy.
    pub fn order_placed(&self, order: &Order) {
        let notifier = Arc::clone(&self.notifier);
        let order = order.clone();

        tokio::spawn(async move {
            let payload = order_payload(&order);
            log_failure(
                &order,
                "notify_admin",
                notifier
                    .notify_admin(NotificationKind::OrderPlaced, payload.clone())
                    .await,
            );
            if let Some(user_id) = order.user_id {
                log_failure(
                    &order,
                    "notify_user",
                    notifier
                        .notify_user(user_id, NotificationKind::OrderPlaced, payload)
                        .await,
                );
            }
            log_failure(
                &order,
                "confirmation_email",
                notifier.send_order_confirmation_email(&order, false).await,
            );
            log_failure(
                &order,
                "confirmation_email_admin",
                notifier.send_order_confirmation_email(&order, true).await,
            );
        });
    }

    /// Customer-facing update for shipped, out-for-delivery and delivered orders.
    pub fn status_changed(&self, order: &Order) {
        if !order.status.notifies_customer() {
            return;
        }
        let notifier = Arc::clone(&self.notifier);
        let order = order.clone();

        tokio::spawn(async move {
            log_failure(
                &order,
                "status_update_email",
                notifier.send_order_status_update_email(&order).await,
            );
            if let Some(user_id) = order.user_id {
                log_failure(
                    &order,
                    "notify_user",
                    notifier
                        .notify_user(
                            user_id,
                            NotificationKind::OrderStatusChanged,
                            order_payload(&order),
                        )
                        .await,
                );
            }
        });
    }

    pub fn order_cancelled(&self, order: &Order) {
        let notifier = Arc::clone(&self.notifier);
        let order = order.clone();

        tokio::spawn(async move {
            log_failure(
                &order,
                "notify_admin",
                notifier
                    .notify_admin(NotificationKind::OrderCancelled, order_payload(&order))
                    .await,
            );
        });
    }
}

fn order_payload(order: &Order) -> serde_json::Value {
    serde_json::json!({
        "order_id": order.id,
        "order_number": order.order_number,
        "status": order.status,
        "total_cents": order.total.cents(),
    })
}

fn log_failure(order: &Order, channel: &'static str, result: Result<(), NotifyError>) {
    if let Err(e) = result {
        tracing::warn!(order_id = %order.id, channel, error = %e, "notification failed");
    }
}
