use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::sale::PaymentMethod;
use crate::domain::stage::StageView;

#[derive(Deserialize)]
pub struct CreateSaleRequest {
    pub client_id: i64,
    pub notes: Option<String>,
}

/// Client association is editable at any stage; items and payment are not
/// touched by this request.
#[derive(Deserialize)]
pub struct UpdateSaleRequest {
    pub client_id: Option<i64>,
    pub notes: Option<String>,
}

#[derive(Deserialize)]
pub struct ReplaceItemsRequest {
    pub items: Vec<SaleItemInput>,
}

#[derive(Deserialize)]
pub struct SaleItemInput {
    pub product_id: i64,
    pub quantity: i32,
}

#[derive(Deserialize)]
pub struct PayRequest {
    pub payment_method: PaymentMethod,
    pub payment_date: NaiveDate,
}

#[derive(Serialize)]
pub struct SaleResponse {
    pub id: i64,
    pub client_id: i64,
    pub client_name: String,
    pub seller_id: i64,
    pub seller_name: String,
    pub sale_date: DateTime<Utc>,
    pub notes: Option<String>,
    pub total_value: Decimal,
    pub payment_status: String,
    pub payment_method: Option<String>,
    pub payment_date: Option<NaiveDate>,
    pub commission_percent: Decimal,
    pub commission_value: Option<Decimal>,
    pub items: Vec<SaleItemResponse>,
    pub wizard: StageView,
}

#[derive(Serialize)]
pub struct SaleItemResponse {
    pub id: i64,
    pub product_id: i64,
    pub product_name: String,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub subtotal: Decimal,
}

#[derive(Deserialize)]
pub struct SaleListQuery {
    pub client_name: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub payment_status: Option<String>,
    #[serde(default = "default_page")]
    pub page: i64,
    #[serde(default = "default_per_page")]
    pub per_page: i64,
}

fn default_page() -> i64 {
    1
}

fn default_per_page() -> i64 {
    10
}

#[derive(Serialize)]
pub struct SaleListItem {
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

#[derive(Serialize)]
pub struct SaleListResponse {
    pub items: Vec<SaleListItem>,
    pub page: i64,
    pub per_page: i64,
    pub total: i64,
    pub total_pages: i64,
}

#[derive(Deserialize)]
pub struct StatusCountsQuery {
    pub client_name: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

#[derive(Serialize)]
pub struct StatusCountsResponse {
    pub total: i64,
    pub paid: i64,
    pub pending: i64,
    pub canceled: i64,
}
