//! In-memory stores for exercising the sweeper and the HTTP API without Postgres.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use shared::*;
use uuid::Uuid;

use crate::addresses::AddressStore;
use crate::health::{HealthProbe, HealthReport};
use crate::store::DeliveryStore;

#[derive(Debug, Clone)]
pub struct StoredOrder {
    pub id: i32,
    pub order_number: String,
    pub status: String,
    pub shipped_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub customer_email: Option<String>,
}

pub fn shipped_days_ago(id: i32, order_number: &str, days: i64) -> StoredOrder {
    StoredOrder {
        id,
        order_number: order_number.to_string(),
        status: "shipped".to_string(),
        shipped_at: Some(Utc::now() - Duration::days(days)),
        delivered_at: None,
        customer_email: Some(format!("{}@example.com", order_number.to_lowercase())),
    }
}

#[derive(Default)]
struct DeliveryState {
    orders: Vec<StoredOrder>,
    log_tables: bool,
    log: Vec<(AutoDeliveryLogEntry, DateTime<Utc>)>,
    errors: Vec<SweepError>,
    update_attempts: HashMap<i32, usize>,
    failing_updates: HashSet<i32>,
    delivered_elsewhere: HashSet<i32>,
    status_overrides: HashMap<i32, String>,
    fail_selection: bool,
    fail_log_writes: bool,
    fail_stats: bool,
    fail_table_creation: bool,
}

pub struct InMemoryDeliveryStore {
    state: Mutex<DeliveryState>,
}

impl InMemoryDeliveryStore {
    pub fn new() -> Self {
        let store = Self::without_log_tables();
        store.state.lock().unwrap().log_tables = true;
        store
    }

    pub fn without_log_tables() -> Self {
        Self { state: Mutex::new(DeliveryState::default()) }
    }

    pub fn insert(&self, order: StoredOrder) {
        self.state.lock().unwrap().orders.push(order);
    }

    pub fn order(&self, id: i32) -> Option<StoredOrder> {
        self.state.lock().unwrap().orders.iter().find(|o| o.id == id).cloned()
    }

    pub fn log_entries(&self) -> Vec<AutoDeliveryLogEntry> {
        self.state.lock().unwrap().log.iter().map(|(entry, _)| entry.clone()).collect()
    }

    pub fn has_log_tables(&self) -> bool {
        self.state.lock().unwrap().log_tables
    }

    pub fn update_attempts(&self, id: i32) -> usize {
        self.state.lock().unwrap().update_attempts.get(&id).copied().unwrap_or(0)
    }

    pub fn fail_update_for(&self, id: i32) {
        self.state.lock().unwrap().failing_updates.insert(id);
    }

    /// Another actor delivers order `id` between selection and the conditional update.
    pub fn deliver_concurrently(&self, id: i32) {
        self.state.lock().unwrap().delivered_elsewhere.insert(id);
    }

    /// Makes the next selection report `status` for order `id`.
    pub fn corrupt_next_selection(&self, id: i32, status: &str) {
        self.state.lock().unwrap().status_overrides.insert(id, status.to_string());
    }

    pub fn fail_selection(&self, fail: bool) {
        self.state.lock().unwrap().fail_selection = fail;
    }

    pub fn fail_log_writes(&self, fail: bool) {
        self.state.lock().unwrap().fail_log_writes = fail;
    }

    pub fn fail_stats(&self, fail: bool) {
        self.state.lock().unwrap().fail_stats = fail;
    }

    pub fn fail_table_creation(&self, fail: bool) {
        self.state.lock().unwrap().fail_table_creation = fail;
    }
}

#[async_trait]
impl DeliveryStore for InMemoryDeliveryStore {
    async fn ensure_log_tables(&self) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.fail_table_creation {
            return Err(anyhow!("permission denied for schema public"));
        }
        state.log_tables = true;
        Ok(())
    }

    async fn find_eligible(&self, threshold_days: i32) -> Result<Vec<OrderRow>> {
        let mut state = self.state.lock().unwrap();
        if state.fail_selection {
            return Err(anyhow!("connection refused"));
        }

        let cutoff = Utc::now() - Duration::days(threshold_days as i64);
        let mut due: Vec<&StoredOrder> = state
            .orders
            .iter()
            .filter(|o| o.status == "shipped" && o.status != "delivered")
            .filter(|o| o.shipped_at.map_or(false, |at| at <= cutoff))
            .collect();
        due.sort_by_key(|o| o.shipped_at);

        let mut rows: Vec<OrderRow> = due
            .into_iter()
            .map(|o| OrderRow {
                id: o.id,
                order_number: o.order_number.clone(),
                status: o.status.clone(),
                shipped_at: o.shipped_at,
                customer_email: o.customer_email.clone(),
            })
            .collect();

        let overrides = std::mem::take(&mut state.status_overrides);
        for row in rows.iter_mut() {
            if let Some(status) = overrides.get(&row.id) {
                row.status = status.clone();
            }
        }
        Ok(rows)
    }

    async fn mark_delivered(&self, order_id: i32) -> Result<usize> {
        let mut state = self.state.lock().unwrap();
        *state.update_attempts.entry(order_id).or_insert(0) += 1;
        if state.failing_updates.contains(&order_id) {
            return Err(anyhow!("server closed the connection unexpectedly"));
        }
        if state.delivered_elsewhere.remove(&order_id) {
            if let Some(order) = state.orders.iter_mut().find(|o| o.id == order_id) {
                order.status = "delivered".to_string();
                order.delivered_at = Some(Utc::now());
            }
        }

        match state.orders.iter_mut().find(|o| o.id == order_id && o.status == "shipped") {
            Some(order) => {
                order.status = "delivered".to_string();
                order.delivered_at = Some(Utc::now());
                Ok(1)
            }
            None => Ok(0),
        }
    }

    async fn append_log(&self, entry: AutoDeliveryLogEntry) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.fail_log_writes {
            return Err(anyhow!("disk full"));
        }
        if !state.log_tables {
            return Err(anyhow!("relation \"auto_delivery_log\" does not exist"));
        }
        state.log.push((entry, Utc::now()));
        Ok(())
    }

    async fn record_error(&self, error: SweepError) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if !state.log_tables {
            return Err(anyhow!("relation \"auto_delivery_errors\" does not exist"));
        }
        state.errors.push(error);
        Ok(())
    }

    async fn log_stats(&self) -> Result<DeliveryStats> {
        let state = self.state.lock().unwrap();
        if state.fail_stats {
            return Err(anyhow!("connection refused"));
        }
        if !state.log_tables {
            return Ok(DeliveryStats::default());
        }
        Ok(DeliveryStats {
            total_processed: state.log.len() as i64,
            last_processed: state.log.iter().map(|(_, processed_at)| *processed_at).max(),
            error_count: state.errors.len() as i64,
        })
    }
}

#[derive(Default)]
pub struct InMemoryAddressStore {
    addresses: Mutex<Vec<Address>>,
}

impl InMemoryAddressStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AddressStore for InMemoryAddressStore {
    async fn list(&self, user_id: Uuid) -> Result<Vec<Address>> {
        let mut found: Vec<Address> = self
            .addresses
            .lock()
            .unwrap()
            .iter()
            .filter(|a| a.user_id == user_id)
            .cloned()
            .collect();
        found.sort_by(|a, b| b.is_default.cmp(&a.is_default).then(b.created_at.cmp(&a.created_at)));
        Ok(found)
    }

    async fn get(&self, user_id: Uuid, id: Uuid) -> Result<Option<Address>> {
        Ok(self
            .addresses
            .lock()
            .unwrap()
            .iter()
            .find(|a| a.user_id == user_id && a.id == id)
            .cloned())
    }

    async fn create(&self, user_id: Uuid, new: NewAddress) -> Result<Address> {
        let mut addresses = self.addresses.lock().unwrap();
        let first = !addresses.iter().any(|a| a.user_id == user_id);
        let make_default = new.is_default || first;
        let address = Address::new(user_id, new, make_default);
        if address.is_default {
            for other in addresses.iter_mut().filter(|a| a.user_id == user_id) {
                other.is_default = false;
            }
        }
        addresses.push(address.clone());
        Ok(address)
    }

    async fn update(&self, user_id: Uuid, id: Uuid, changes: AddressChanges) -> Result<Option<Address>> {
        let mut addresses = self.addresses.lock().unwrap();
        let Some(index) = addresses.iter().position(|a| a.user_id == user_id && a.id == id) else {
            return Ok(None);
        };
        let make_default = changes.is_default == Some(true);
        changes.apply_to(&mut addresses[index]);
        if make_default {
            for other in addresses.iter_mut().filter(|a| a.user_id == user_id && a.id != id) {
                other.is_default = false;
            }
        }
        Ok(Some(addresses[index].clone()))
    }

    async fn delete(&self, user_id: Uuid, id: Uuid) -> Result<bool> {
        let mut addresses = self.addresses.lock().unwrap();
        let before = addresses.len();
        addresses.retain(|a| !(a.user_id == user_id && a.id == id));
        Ok(addresses.len() < before)
    }
}

pub struct StaticHealthProbe {
    pub report: HealthReport,
}

impl StaticHealthProbe {
    pub fn up() -> Self {
        Self { report: HealthReport::up("db.internal".to_string(), "storefront".to_string()) }
    }

    pub fn down(error: &str) -> Self {
        Self {
            report: HealthReport::down("db.internal".to_string(), "storefront".to_string(), error.to_string()),
        }
    }
}

#[async_trait]
impl HealthProbe for StaticHealthProbe {
    async fn probe(&self) -> HealthReport {
        self.report.clone()
    }
}
