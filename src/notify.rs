use async_trait::async_trait;
use uuid::Uuid;

/// Details handed to the notifier after a checkout commits.
#[derive(Debug, Clone)]
pub struct OrderPlaced {
    pub order_id: Uuid,
    pub order_number: String,
    pub user_id: Uuid,
    pub user_email: String,
    pub total_amount: String,
    pub items_count: usize,
}

#[derive(Debug, Clone)]
pub struct OrderCancelled {
    pub order_id: Uuid,
    pub order_number: String,
    pub user_id: Uuid,
    pub reason: String,
}

/// Outbound notification boundary (mailer, push, ...). Checkout success never
/// depends on delivery: callers log and swallow every error from here.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Order confirmation for the buyer.
    async fn order_confirmation(&self, event: &OrderPlaced) -> anyhow::Result<()>;

    /// New-order alert for administrators.
    async fn admin_order_alert(&self, event: &OrderPlaced) -> anyhow::Result<()>;

    async fn order_cancelled(&self, event: &OrderCancelled) -> anyhow::Result<()>;
}

/// Default notifier: writes structured log lines instead of delivering mail.
/// Stands in until a real mail provider is wired up.
#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn order_confirmation(&self, event: &OrderPlaced) -> anyhow::Result<()> {
        tracing::info!(
            order_id = %event.order_id,
            order_number = %event.order_number,
            email = %event.user_email,
            total = %event.total_amount,
            "order confirmation notification"
        );
        Ok(())
    }

    async fn admin_order_alert(&self, event: &OrderPlaced) -> anyhow::Result<()> {
        tracing::info!(
            order_id = %event.order_id,
            order_number = %event.order_number,
            items = event.items_count,
            "new order admin alert"
        );
        Ok(())
    }

    async fn order_cancelled(&self, event: &OrderCancelled) -> anyhow::Result<()> {
        tracing::info!(
            order_id = %event.order_id,
            order_number = %event.order_number,
            reason = %event.reason,
            "order cancelled notification"
        );
        Ok(())
    }
}
