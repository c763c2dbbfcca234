//! Data models for the Commission Engine.
//!
//! The `models` module defines the serialisable structs and enums that
//! describe sales, spiffs, users, shared deals and the statistics the
//! engine produces.  They derive `Serialize` and `Deserialize` so they
//! can be stored and sent over the HTTP API unchanged.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kind of vehicle deal.  The kind decides which accessories threshold
/// applies when computing commission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SaleType {
    New,
    Used,
    #[serde(rename = "Trade-In")]
    TradeIn,
}

/// The commission-relevant part of a single vehicle sale.
///
/// Optional amounts that are absent (or zero) contribute nothing to the
/// commission; they are never treated as errors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaleEntry {
    /// Vehicle selling price in dollars.
    pub sale_price: f64,
    pub sale_type: SaleType,
    /// Total accessories revenue.
    #[serde(default)]
    pub accessories_price: Option<f64>,
    /// Warranty revenue.
    #[serde(default)]
    pub warranty_price: Option<f64>,
    /// Warranty cost basis; the warranty commission is paid on
    /// `warranty_price - warranty_cost`.
    #[serde(default)]
    pub warranty_cost: Option<f64>,
    /// Maintenance plan revenue.
    #[serde(default)]
    pub maintenance_price: Option<f64>,
}

/// Commission owed for one sale, split by component.
///
/// All amounts are whole dollars.  The warranty component (and so the
/// total) goes negative when the warranty was sold below cost.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommissionBreakdown {
    pub car_commission: i64,
    pub accessories_commission: i64,
    pub warranty_commission: i64,
    pub maintenance_commission: i64,
    /// Always the sum of the four components above.
    pub total_commission: i64,
}

/// A stored sale belonging to one user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaleRecord {
    pub id: Uuid,
    pub owner_id: Uuid,
    /// Date the deal was delivered; used for monthly grouping.
    pub sold_on: NaiveDate,
    pub customer_name: String,
    /// Free-form vehicle description, e.g. `"2024 Civic EX"`.
    pub vehicle: String,
    #[serde(default)]
    pub stock_number: Option<String>,
    /// Set when this record was created by accepting a shared sale; holds
    /// the id of the sender's record.
    #[serde(default)]
    pub shared_from: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    #[serde(flatten)]
    pub entry: SaleEntry,
}

/// Payload for creating or replacing a sale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewSale {
    pub sold_on: NaiveDate,
    pub customer_name: String,
    pub vehicle: String,
    #[serde(default)]
    pub stock_number: Option<String>,
    #[serde(flatten)]
    pub entry: SaleEntry,
}

/// A sale together with its computed commission, as returned by the API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaleWithCommission {
    #[serde(flatten)]
    pub sale: SaleRecord,
    pub commission: CommissionBreakdown,
}

/// A discretionary bonus ("spiff") not tied to a particular sale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpiffEntry {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub awarded_on: NaiveDate,
    /// Bonus in whole dollars.
    pub amount: i64,
    pub description: String,
    /// Blob-store path of the uploaded proof image, if any.
    #[serde(default)]
    pub proof_path: Option<String>,
    #[serde(default)]
    pub proof_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Payload for creating or replacing a spiff.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewSpiff {
    pub awarded_on: NaiveDate,
    pub amount: i64,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    /// Always stored trimmed and lower-cased.
    pub email: String,
    pub display_name: String,
}

/// A signed-in user and the bearer token identifying the session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub token: String,
    pub user: User,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShareStatus {
    Pending,
    Accepted,
    Rejected,
}

/// Request from one user to hand a copy of a sale to another user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShareRequest {
    pub id: Uuid,
    pub sale_id: Uuid,
    pub from_user: Uuid,
    pub to_user: Uuid,
    pub status: ShareStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub responded_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    ShareReceived,
    ShareAccepted,
    ShareRejected,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub user_id: Uuid,
    pub kind: NotificationKind,
    pub share_id: Uuid,
    pub message: String,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

/// Aggregated earnings of one user for one calendar month.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlyStats {
    pub year: i32,
    pub month: u32,
    pub sale_count: usize,
    pub new_count: usize,
    pub used_count: usize,
    pub trade_in_count: usize,
    pub car_commission: i64,
    pub accessories_commission: i64,
    pub warranty_commission: i64,
    pub maintenance_commission: i64,
    /// Sum of every sale's total commission.
    pub sales_commission: i64,
    pub spiff_count: usize,
    pub spiff_total: i64,
    /// `sales_commission + spiff_total`.
    pub total_earnings: i64,
    /// Sum of vehicle sale prices.
    pub gross_sales: f64,
    /// `sales_commission / sale_count`, or zero for a month without sales.
    pub average_commission: f64,
}
