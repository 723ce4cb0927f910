use std::sync::Arc;
use std::time::Duration;
use tokio::time;
use tracing::{error, info, warn};
use shared::*;
use crate::store::DeliveryStore;

/// Marks long-shipped orders as delivered and keeps an audit trail of each transition.
#[derive(Clone)]
pub struct DeliverySweeper {
    store: Arc<dyn DeliveryStore>,
    threshold_days: i32,
}

impl DeliverySweeper {
    pub fn new(store: Arc<dyn DeliveryStore>, threshold_days: i32) -> Self {
        Self { store, threshold_days }
    }

    pub async fn run(&self, every: Duration) {
        let mut interval = time::interval(every);

        loop {
            interval.tick().await;

            let report = self.sweep().await;
            if report.processed_count > 0 || !report.errors.is_empty() {
                info!(
                    processed = report.processed_count,
                    errors = report.errors.len(),
                    "Auto-delivery sweep finished"
                );
            }
        }
    }

    /// Safe to call on every start. Failures are logged and otherwise ignored.
    pub async fn ensure_log_table_exists(&self) {
        match self.store.ensure_log_tables().await {
            Ok(()) => info!("Auto-delivery log tables ready"),
            Err(e) => error!("Failed to create auto-delivery log tables: {}", e),
        }
    }

    pub async fn sweep(&self) -> SweepReport {
        let rows = match self.store.find_eligible(self.threshold_days).await {
            Ok(rows) => rows,
            Err(e) => {
                let message = format!("Failed to select shipped orders: {}", e);
                error!("{}", message);
                self.record_error(None, None, &message).await;
                return SweepReport::failed(message);
            }
        };

        let mut report = SweepReport::default();
        if rows.is_empty() {
            return report;
        }
        info!("Found {} shipped orders due for delivery", rows.len());

        for row in rows {
            let order_id = row.id;
            let order_number = row.order_number.clone();

            let order = match EligibleOrder::try_from(row) {
                Ok(order) => order,
                Err(e) => {
                    let message = format!("Skipping order {}: {}", order_number, e);
                    warn!("{}", message);
                    self.record_error(Some(order_id), Some(&order_number), &message).await;
                    report.errors.push(message);
                    continue;
                }
            };

            match self.store.mark_delivered(order.id).await {
                Ok(0) => {
                    info!("Order {} was no longer shipped, skipping", order.order_number);
                }
                Ok(_) => {
                    report.record_delivered(&order.order_number);
                    info!("Order {} marked as delivered", order.order_number);

                    if let Err(e) = self.store.append_log(AutoDeliveryLogEntry::for_order(&order)).await {
                        warn!("Failed to write auto-delivery log for order {}: {}", order.order_number, e);
                    }
                }
                Err(e) => {
                    let message = format!("Failed to deliver order {}: {}", order.order_number, e);
                    error!("{}", message);
                    self.record_error(Some(order.id), Some(&order.order_number), &message).await;
                    report.errors.push(message);
                }
            }
        }

        report
    }

    pub async fn stats(&self) -> DeliveryStats {
        match self.store.log_stats().await {
            Ok(stats) => stats,
            Err(e) => {
                warn!("Failed to read auto-delivery stats: {}", e);
                DeliveryStats::default()
            }
        }
    }

    async fn record_error(&self, order_id: Option<i32>, order_number: Option<&str>, message: &str) {
        let error = SweepError {
            order_id,
            order_number: order_number.map(str::to_string),
            message: message.to_string(),
        };
        if let Err(e) = self.store.record_error(error).await {
            warn!("Failed to record auto-delivery error: {}", e);
        }
    }
}
