use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;
use chrono::{DateTime, Utc};
use std::fmt;
use std::str::FromStr;

/// Orders older than this many days since shipping are considered delivered.
pub const DEFAULT_DELIVERY_THRESHOLD_DAYS: i32 = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Paid,
    Shipped,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Paid => "paid",
            OrderStatus::Shipped => "shipped",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = OrderMappingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(OrderStatus::Pending),
            "paid" => Ok(OrderStatus::Paid),
            "shipped" => Ok(OrderStatus::Shipped),
            "delivered" => Ok(OrderStatus::Delivered),
            "cancelled" => Ok(OrderStatus::Cancelled),
            other => Err(OrderMappingError::UnknownStatus(other.to_string())),
        }
    }
}

/// Raw order row as returned by the eligibility query, before validation.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderRow {
    pub id: i32,
    pub order_number: String,
    pub status: String,
    pub shipped_at: Option<DateTime<Utc>>,
    pub customer_email: Option<String>,
}

/// A shipped order that the sweeper may transition to delivered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EligibleOrder {
    pub id: i32,
    pub order_number: String,
    pub status: OrderStatus,
    pub shipped_at: DateTime<Utc>,
    pub customer_email: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum OrderMappingError {
    UnknownStatus(String),
    NotShipped { order_number: String, status: OrderStatus },
    MissingShippedAt { order_number: String },
}

impl fmt::Display for OrderMappingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderMappingError::UnknownStatus(status) => write!(f, "unknown order status '{}'", status),
            OrderMappingError::NotShipped { order_number, status } => {
                write!(f, "order {} is {}, expected shipped", order_number, status)
            }
            OrderMappingError::MissingShippedAt { order_number } => {
                write!(f, "order {} has no shipped_at timestamp", order_number)
            }
        }
    }
}

impl std::error::Error for OrderMappingError {}

impl TryFrom<OrderRow> for EligibleOrder {
    type Error = OrderMappingError;

    fn try_from(row: OrderRow) -> Result<Self, Self::Error> {
        let status: OrderStatus = row.status.parse()?;
        if status != OrderStatus::Shipped {
            return Err(OrderMappingError::NotShipped {
                order_number: row.order_number,
                status,
            });
        }
        let shipped_at = row.shipped_at.ok_or_else(|| OrderMappingError::MissingShippedAt {
            order_number: row.order_number.clone(),
        })?;

        Ok(Self {
            id: row.id,
            order_number: row.order_number,
            status,
            shipped_at,
            customer_email: row.customer_email,
        })
    }
}

/// Audit record for one automatic delivery. `processed_at` is assigned by the
/// store at write time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutoDeliveryLogEntry {
    pub order_id: i32,
    pub order_number: String,
    pub customer_email: Option<String>,
}

impl AutoDeliveryLogEntry {
    pub fn for_order(order: &EligibleOrder) -> Self {
        Self {
            order_id: order.id,
            order_number: order.order_number.clone(),
            customer_email: order.customer_email.clone(),
        }
    }
}

/// Failure captured during a sweep. Selection failures carry no order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepError {
    pub order_id: Option<i32>,
    pub order_number: Option<String>,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepReport {
    pub processed_count: usize,
    pub processed_orders: Vec<String>,
    pub errors: Vec<String>,
}

impl SweepReport {
    pub fn failed(message: String) -> Self {
        Self {
            processed_count: 0,
            processed_orders: Vec::new(),
            errors: vec![message],
        }
    }

    pub fn record_delivered(&mut self, order_number: &str) {
        self.processed_count += 1;
        self.processed_orders.push(order_number.to_string());
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryStats {
    pub total_processed: i64,
    pub last_processed: Option<DateTime<Utc>>,
    pub error_count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Address {
    pub id: Uuid,
    pub user_id: Uuid,
    pub recipient_name: String,
    pub line1: String,
    pub line2: Option<String>,
    pub city: String,
    pub region: Option<String>,
    pub postal_code: String,
    pub country: String,
    pub phone: Option<String>,
    pub is_default: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewAddress {
    pub recipient_name: String,
    pub line1: String,
    pub line2: Option<String>,
    pub city: String,
    pub region: Option<String>,
    pub postal_code: String,
    pub country: String,
    pub phone: Option<String>,
    #[serde(default)]
    pub is_default: bool,
}

/// Partial update. For the optional fields a missing key leaves the value
/// alone and an explicit `null` clears it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AddressChanges {
    pub recipient_name: Option<String>,
    pub line1: Option<String>,
    #[serde(default, deserialize_with = "clearable", skip_serializing_if = "Option::is_none")]
    pub line2: Option<Option<String>>,
    pub city: Option<String>,
    #[serde(default, deserialize_with = "clearable", skip_serializing_if = "Option::is_none")]
    pub region: Option<Option<String>>,
    pub postal_code: Option<String>,
    pub country: Option<String>,
    #[serde(default, deserialize_with = "clearable", skip_serializing_if = "Option::is_none")]
    pub phone: Option<Option<String>>,
    pub is_default: Option<bool>,
}

fn clearable<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

fn require(field: &str, value: &str) -> anyhow::Result<()> {
    if value.trim().is_empty() {
        anyhow::bail!("{} must not be empty", field);
    }
    Ok(())
}

impl NewAddress {
    pub fn validate(&self) -> anyhow::Result<()> {
        require("recipient_name", &self.recipient_name)?;
        require("line1", &self.line1)?;
        require("city", &self.city)?;
        require("postal_code", &self.postal_code)?;
        require("country", &self.country)?;
        Ok(())
    }
}

impl Address {
    pub fn new(user_id: Uuid, new: NewAddress, is_default: bool) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id,
            recipient_name: new.recipient_name,
            line1: new.line1,
            line2: new.line2,
            city: new.city,
            region: new.region,
            postal_code: new.postal_code,
            country: new.country,
            phone: new.phone,
            is_default,
            created_at: now,
            updated_at: now,
        }
    }
}

impl AddressChanges {
    pub fn validate(&self) -> anyhow::Result<()> {
        let required = [
            ("recipient_name", &self.recipient_name),
            ("line1", &self.line1),
            ("city", &self.city),
            ("postal_code", &self.postal_code),
            ("country", &self.country),
        ];
        for (field, value) in required {
            if let Some(value) = value {
                require(field, value)?;
            }
        }
        Ok(())
    }

    pub fn apply_to(self, address: &mut Address) {
        if let Some(v) = self.recipient_name {
            address.recipient_name = v;
        }
        if let Some(v) = self.line1 {
            address.line1 = v;
        }
        if let Some(v) = self.line2 {
            address.line2 = v;
        }
        if let Some(v) = self.city {
            address.city = v;
        }
        if let Some(v) = self.region {
            address.region = v;
        }
        if let Some(v) = self.postal_code {
            address.postal_code = v;
        }
        if let Some(v) = self.country {
            address.country = v;
        }
        if let Some(v) = self.phone {
            address.phone = v;
        }
        if let Some(v) = self.is_default {
            address.is_default = v;
        }
        address.updated_at = Utc::now();
    }
}
