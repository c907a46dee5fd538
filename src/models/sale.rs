use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::FromRow;

/// Slim row fetched with FOR UPDATE before any sale mutation. The sale row
/// is the unit of mutual exclusion for the aggregate.
#[derive(Debug, FromRow)]
pub struct SaleGuardRow {
    pub seller_id: i64,
    pub total_value: Decimal,
    pub payment_status: String,
    pub commission_percent: Decimal,
}

/// Full sale header with joined client/seller names, for projections.
#[derive(Debug, FromRow)]
pub struct SaleHeaderRow {
    pub id: i64,
    pub seller_id: i64,
    pub seller_name: String,
    pub client_id: i64,
    pub client_name: String,
    pub sale_date: DateTime<Utc>,
    pub notes: Option<String>,
    pub total_value: Decimal,
    pub payment_status: String,
    pub payment_method: Option<String>,
    pub payment_date: Option<NaiveDate>,
    pub commission_percent: Decimal,
    pub commission_value: Option<Decimal>,
}

#[derive(Debug, FromRow)]
pub struct SaleItemRow {
    pub id: i64,
    pub product_id: i64,
    pub product_name: String,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub subtotal: Decimal,
}

/// One row of the paginated sale list.
#[derive(Debug, FromRow)]
pub struct SaleListRow {
    pub id: i64,
    pub client_id: i64,
    pub client_name: String,
    pub seller_id: i64,
    pub seller_name: String,
    pub sale_date: DateTime<Utc>,
    pub total_value: Decimal,
    pub payment_status: String,
    pub item_count: i64,
}

/// Product reference data read during item replacement. Price is a snapshot
/// read; no lock is held on the product.
#[derive(Debug, FromRow)]
pub struct ProductRef {
    pub id: i64,
    pub name: String,
    pub price: Decimal,
    pub is_active: bool,
}
