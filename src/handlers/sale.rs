use std::collections::HashMap;

use axum::{extract::{Path, Query, State}, Extension, Json};
use axum::http::StatusCode;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, QueryBuilder, Transaction};
use tracing::instrument;

use crate::domain::{access, money, sale as lifecycle};
use crate::domain::sale::PaymentStatus;
use crate::domain::stage::{derive_stage, StageInput};
use crate::dtos::sale::{
    CreateSaleRequest, PayRequest, ReplaceItemsRequest, SaleItemInput, SaleItemResponse,
    SaleListItem, SaleListQuery, SaleListResponse, SaleResponse, StatusCountsQuery,
    StatusCountsResponse, UpdateSaleRequest,
};
use crate::error::{is_transient_conflict, AppError};
use crate::middleware::auth::AuthContext;
use crate::models::sale::{ProductRef, SaleGuardRow, SaleHeaderRow, SaleItemRow, SaleListRow};
use crate::state::AppState;

/// Extra attempts after a serialization failure or deadlock. Business-rule
/// errors are never retried.
const MAX_TRANSIENT_RETRIES: u32 = 2;

// ==================== Create ====================

pub async fn create_sale(
    State(AppState { db_pool }): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(req): Json<CreateSaleRequest>,
) -> Result<(StatusCode, Json<SaleResponse>), AppError> {
    let mut tx = db_pool.begin().await?;

    // The caller is the owning seller; the commission rate is snapshotted
    // here and never recomputed for this sale.
    let commission_percent = sqlx::query_scalar::<_, Decimal>(
        "SELECT commission_percent FROM sellers WHERE id = $1 AND is_active",
    )
    .bind(auth.user_id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or_else(|| AppError::not_found("Seller not found"))?;

    let client_exists = sqlx::query_scalar::<_, bool>(
        "SELECT EXISTS(SELECT 1 FROM clients WHERE id = $1)",
    )
    .bind(req.client_id)
    .fetch_one(&mut *tx)
    .await?;
    if !client_exists {
        return Err(AppError::not_found("Client not found"));
    }

    let sale_id = sqlx::query_scalar::<_, i64>(
        "INSERT INTO sales (seller_id, client_id, notes, commission_percent)
         VALUES ($1, $2, $3, $4) RETURNING id",
    )
    .bind(auth.user_id)
    .bind(req.client_id)
    .bind(&req.notes)
    .bind(commission_percent)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;

    let sale = fetch_sale_projection(&db_pool, sale_id).await?;
    Ok((StatusCode::CREATED, Json(sale)))
}

// ==================== Replace items ====================

#[instrument(skip_all, fields(sale_id = id))]
pub async fn replace_items(
    State(AppState { db_pool }): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<i64>,
    Json(req): Json<ReplaceItemsRequest>,
) -> Result<Json<SaleResponse>, AppError> {
    if req.items.is_empty() {
        return Err(AppError::validation("Item list must not be empty"));
    }
    if req.items.iter().any(|line| line.quantity < 1) {
        return Err(AppError::validation("Quantity must be at least 1"));
    }

    let mut attempts = 0;
    loop {
        match try_replace_items(&db_pool, &auth, id, &req.items).await {
            Err(err) if is_transient_conflict(&err) && attempts < MAX_TRANSIENT_RETRIES => {
                attempts += 1;
                tracing::warn!(sale_id = id, attempts, "Transient conflict, retrying item replacement");
            }
            result => return result.map(Json),
        }
    }
}

/// One atomic unit of work: delete all old items, snapshot current product
/// prices into new items, recompute the total. Any failure rolls the whole
/// set back; the sale is never observable with a total that does not match
/// its items.
async fn try_replace_items(
    db_pool: &PgPool,
    auth: &AuthContext,
    sale_id: i64,
    lines: &[SaleItemInput],
) -> Result<SaleResponse, AppError> {
    let mut tx = db_pool.begin().await?;

    let sale = lock_sale(&mut tx, sale_id).await?;
    ensure_can_manage(auth, &sale)?;
    lifecycle::ensure_items_mutable(parse_status(&sale.payment_status)?)?;

    let product_ids: Vec<i64> = lines.iter().map(|line| line.product_id).collect();
    let products = sqlx::query_as::<_, ProductRef>(
        "SELECT id, name, price, is_active FROM products WHERE id = ANY($1)",
    )
    .bind(&product_ids)
    .fetch_all(&mut *tx)
    .await?;
    let products: HashMap<i64, ProductRef> = products.into_iter().map(|p| (p.id, p)).collect();

    // All-or-nothing: one unknown or inactive product rejects the whole call.
    let mut new_items = Vec::with_capacity(lines.len());
    for line in lines {
        let product = products
            .get(&line.product_id)
            .filter(|p| p.is_active)
            .ok_or_else(|| {
                AppError::validation(format!("Invalid or inactive product {}", line.product_id))
            })?;
        let subtotal = money::line_subtotal(product.price, line.quantity);
        new_items.push((line.product_id, line.quantity, product.price, subtotal));
    }
    let total_value = money::items_total(new_items.iter().map(|item| item.3));

    sqlx::query("DELETE FROM sale_items WHERE sale_id = $1")
        .bind(sale_id)
        .execute(&mut *tx)
        .await?;

    for (product_id, quantity, unit_price, subtotal) in &new_items {
        sqlx::query(
            "INSERT INTO sale_items (sale_id, product_id, quantity, unit_price, subtotal)
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(sale_id)
        .bind(product_id)
        .bind(quantity)
        .bind(unit_price)
        .bind(subtotal)
        .execute(&mut *tx)
        .await?;
    }

    sqlx::query("UPDATE sales SET total_value = $2 WHERE id = $1")
        .bind(sale_id)
        .bind(total_value)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    fetch_sale_projection(db_pool, sale_id).await
}

// ==================== Pay ====================

#[instrument(skip_all, fields(sale_id = id))]
pub async fn pay_sale(
    State(AppState { db_pool }): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<i64>,
    Json(req): Json<PayRequest>,
) -> Result<Json<SaleResponse>, AppError> {
    let mut attempts = 0;
    loop {
        match try_pay_sale(&db_pool, &auth, id, &req).await {
            Err(err) if is_transient_conflict(&err) && attempts < MAX_TRANSIENT_RETRIES => {
                attempts += 1;
                tracing::warn!(sale_id = id, attempts, "Transient conflict, retrying payment");
            }
            result => return result.map(Json),
        }
    }
}

async fn try_pay_sale(
    db_pool: &PgPool,
    auth: &AuthContext,
    sale_id: i64,
    req: &PayRequest,
) -> Result<SaleResponse, AppError> {
    let mut tx = db_pool.begin().await?;

    let sale = lock_sale(&mut tx, sale_id).await?;
    ensure_can_manage(auth, &sale)?;
    lifecycle::ensure_payable(parse_status(&sale.payment_status)?, sale.total_value)?;

    // Commission is written exactly once, at the PENDING -> PAID transition,
    // from the rate snapshotted at creation. After this the items are frozen.
    let commission_value = money::commission(sale.total_value, sale.commission_percent);

    sqlx::query(
        "UPDATE sales
         SET payment_status = $2, payment_method = $3, payment_date = $4, commission_value = $5
         WHERE id = $1",
    )
    .bind(sale_id)
    .bind(PaymentStatus::Paid.as_str())
    .bind(req.payment_method.as_str())
    .bind(req.payment_date)
    .bind(commission_value)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    fetch_sale_projection(db_pool, sale_id).await
}

// ==================== Update (client / notes) ====================

pub async fn update_sale(
    State(AppState { db_pool }): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<i64>,
    Json(req): Json<UpdateSaleRequest>,
) -> Result<Json<SaleResponse>, AppError> {
    let mut tx = db_pool.begin().await?;

    let sale = lock_sale(&mut tx, id).await?;
    ensure_can_manage(&auth, &sale)?;

    if let Some(client_id) = req.client_id {
        let client_exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM clients WHERE id = $1)",
        )
        .bind(client_id)
        .fetch_one(&mut *tx)
        .await?;
        if !client_exists {
            return Err(AppError::not_found("Client not found"));
        }
    }

    sqlx::query(
        "UPDATE sales SET
         client_id = COALESCE($2, client_id),
         notes = COALESCE($3, notes)
         WHERE id = $1",
    )
    .bind(id)
    .bind(req.client_id)
    .bind(&req.notes)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    fetch_sale_projection(&db_pool, id).await.map(Json)
}

// ==================== Get by id ====================

pub async fn get_sale(
    State(AppState { db_pool }): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<i64>,
) -> Result<Json<SaleResponse>, AppError> {
    let sale = fetch_sale_projection(&db_pool, id).await?;
    if !access::can_manage_sale(auth.user_id, &auth.role, sale.seller_id) {
        return Err(AppError::forbidden("You can only view your own sales"));
    }
    Ok(Json(sale))
}

// ==================== List ====================

#[instrument(skip_all)]
pub async fn list_sales(
    State(AppState { db_pool }): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Query(query): Query<SaleListQuery>,
) -> Result<Json<SaleListResponse>, AppError> {
    let page = query.page.max(1);
    let per_page = query.per_page.clamp(1, 100);

    let status = match &query.payment_status {
        Some(value) => Some(
            PaymentStatus::parse(value)
                .ok_or_else(|| AppError::validation(format!("Invalid payment status: {value}")))?,
        ),
        None => None,
    };
    let filters = ListFilters {
        owner: owner_restriction(&auth),
        client_name: query.client_name.clone(),
        start_bound: query.start_date.map(start_of_day_utc),
        end_bound: query.end_date.and_then(day_after_utc),
        payment_status: status,
    };

    let mut count_query = QueryBuilder::<Postgres>::new(
        "SELECT COUNT(*) FROM sales s JOIN clients c ON s.client_id = c.id WHERE 1=1",
    );
    push_filters(&mut count_query, &filters);
    let total: i64 = count_query.build_query_scalar().fetch_one(&db_pool).await?;

    let mut list_query = QueryBuilder::<Postgres>::new(
        "SELECT s.id, s.client_id, c.name AS client_name, s.seller_id, sl.name AS seller_name,
                s.sale_date, s.total_value, s.payment_status,
                (SELECT COUNT(*) FROM sale_items si WHERE si.sale_id = s.id) AS item_count
         FROM sales s
         JOIN clients c ON s.client_id = c.id
         JOIN sellers sl ON s.seller_id = sl.id
         WHERE 1=1",
    );
    push_filters(&mut list_query, &filters);
    list_query.push(" ORDER BY s.sale_date DESC, s.id DESC LIMIT ");
    list_query.push_bind(per_page);
    list_query.push(" OFFSET ");
    list_query.push_bind((page - 1) * per_page);

    let rows = list_query
        .build_query_as::<SaleListRow>()
        .fetch_all(&db_pool)
        .await?;

    Ok(Json(SaleListResponse {
        items: rows.into_iter().map(list_item_from_row).collect(),
        page,
        per_page,
        total,
        total_pages: total_pages(total, per_page),
    }))
}

// ==================== Status counts ====================

/// Counts are computed over the whole filtered set, never from a page.
pub async fn status_counts(
    State(AppState { db_pool }): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Query(query): Query<StatusCountsQuery>,
) -> Result<Json<StatusCountsResponse>, AppError> {
    let filters = ListFilters {
        owner: owner_restriction(&auth),
        client_name: query.client_name.clone(),
        start_bound: query.start_date.map(start_of_day_utc),
        end_bound: query.end_date.and_then(day_after_utc),
        payment_status: None,
    };

    let mut counts_query = QueryBuilder::<Postgres>::new(
        "SELECT COUNT(*) AS total,
                COUNT(*) FILTER (WHERE s.payment_status = 'PAID') AS paid,
                COUNT(*) FILTER (WHERE s.payment_status = 'PENDING') AS pending,
                COUNT(*) FILTER (WHERE s.payment_status = 'CANCELED') AS canceled
         FROM sales s JOIN clients c ON s.client_id = c.id WHERE 1=1",
    );
    push_filters(&mut counts_query, &filters);

    let (total, paid, pending, canceled): (i64, i64, i64, i64) = counts_query
        .build_query_as()
        .fetch_one(&db_pool)
        .await?;

    Ok(Json(StatusCountsResponse { total, paid, pending, canceled }))
}

// ==================== Helpers ====================

/// Locks the sale row for the duration of the transaction so concurrent
/// mutations of the same sale serialize.
async fn lock_sale(
    tx: &mut Transaction<'_, Postgres>,
    sale_id: i64,
) -> Result<SaleGuardRow, AppError> {
    sqlx::query_as::<_, SaleGuardRow>(
        "SELECT seller_id, total_value, payment_status, commission_percent
         FROM sales WHERE id = $1 FOR UPDATE",
    )
    .bind(sale_id)
    .fetch_optional(&mut **tx)
    .await?
    .ok_or_else(|| AppError::not_found("Sale not found"))
}

fn ensure_can_manage(auth: &AuthContext, sale: &SaleGuardRow) -> Result<(), AppError> {
    if !access::can_manage_sale(auth.user_id, &auth.role, sale.seller_id) {
        return Err(AppError::forbidden("You can only manage your own sales"));
    }
    Ok(())
}

fn parse_status(value: &str) -> Result<PaymentStatus, AppError> {
    PaymentStatus::parse(value)
        .ok_or_else(|| AppError::internal(format!("Unknown payment status: {value}")))
}

async fn fetch_sale_projection(db_pool: &PgPool, sale_id: i64) -> Result<SaleResponse, AppError> {
    let header = sqlx::query_as::<_, SaleHeaderRow>(
        "SELECT s.id, s.seller_id, sl.name AS seller_name, s.client_id, c.name AS client_name,
                s.sale_date, s.notes, s.total_value, s.payment_status, s.payment_method,
                s.payment_date, s.commission_percent, s.commission_value
         FROM sales s
         JOIN sellers sl ON s.seller_id = sl.id
         JOIN clients c ON s.client_id = c.id
         WHERE s.id = $1",
    )
    .bind(sale_id)
    .fetch_optional(db_pool)
    .await?
    .ok_or_else(|| AppError::not_found("Sale not found"))?;

    let items = sqlx::query_as::<_, SaleItemRow>(
        "SELECT si.id, si.product_id, p.name AS product_name, si.quantity, si.unit_price, si.subtotal
         FROM sale_items si
         JOIN products p ON si.product_id = p.id
         WHERE si.sale_id = $1
         ORDER BY si.id",
    )
    .bind(sale_id)
    .fetch_all(db_pool)
    .await?;

    let wizard = derive_stage(&StageInput {
        // client_id is NOT NULL on sales, so the client stage is complete
        // for every persisted sale
        has_client: true,
        item_count: items.len() as i64,
        total_value: header.total_value,
        payment_status: parse_status(&header.payment_status)?,
        has_payment_method: header.payment_method.is_some(),
    });

    Ok(SaleResponse {
        id: header.id,
        client_id: header.client_id,
        client_name: header.client_name,
        seller_id: header.seller_id,
        seller_name: header.seller_name,
        sale_date: header.sale_date,
        notes: header.notes,
        total_value: header.total_value,
        payment_status: header.payment_status,
        payment_method: header.payment_method,
        payment_date: header.payment_date,
        commission_percent: header.commission_percent,
        commission_value: header.commission_value,
        items: items
            .into_iter()
            .map(|item| SaleItemResponse {
                id: item.id,
                product_id: item.product_id,
                product_name: item.product_name,
                quantity: item.quantity,
                unit_price: item.unit_price,
                subtotal: item.subtotal,
            })
            .collect(),
        wizard,
    })
}

fn list_item_from_row(row: SaleListRow) -> SaleListItem {
    SaleListItem {
        id: row.id,
        client_id: row.client_id,
        client_name: row.client_name,
        seller_id: row.seller_id,
        seller_name: row.seller_name,
        sale_date: row.sale_date,
        total_value: row.total_value,
        payment_status: row.payment_status,
        item_count: row.item_count,
    }
}

struct ListFilters {
    owner: Option<i64>,
    client_name: Option<String>,
    start_bound: Option<DateTime<Utc>>,
    end_bound: Option<DateTime<Utc>>,
    payment_status: Option<PaymentStatus>,
}

/// Non-elevated callers only ever see their own sales.
fn owner_restriction(auth: &AuthContext) -> Option<i64> {
    if access::is_elevated(&auth.role) {
        None
    } else {
        Some(auth.user_id)
    }
}

fn push_filters(query: &mut QueryBuilder<'_, Postgres>, filters: &ListFilters) {
    if let Some(owner) = filters.owner {
        query.push(" AND s.seller_id = ");
        query.push_bind(owner);
    }
    if let Some(name) = &filters.client_name {
        query.push(" AND c.name ILIKE ");
        query.push_bind(format!("%{name}%"));
    }
    if let Some(start) = filters.start_bound {
        query.push(" AND s.sale_date >= ");
        query.push_bind(start);
    }
    if let Some(end) = filters.end_bound {
        query.push(" AND s.sale_date < ");
        query.push_bind(end);
    }
    if let Some(status) = filters.payment_status {
        query.push(" AND s.payment_status = ");
        query.push_bind(status.as_str());
    }
}

fn start_of_day_utc(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(NaiveTime::MIN).and_utc()
}

/// Inclusive end date: normalize to a strict upper bound at the start of the
/// following day. `None` only at the calendar maximum, where no upper bound
/// is needed.
fn day_after_utc(date: NaiveDate) -> Option<DateTime<Utc>> {
    date.succ_opt().map(start_of_day_utc)
}

fn total_pages(total: i64, per_page: i64) -> i64 {
    if total == 0 {
        0
    } else {
        (total + per_page - 1) / per_page
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn total_pages_rounds_up() {
        assert_eq!(total_pages(0, 10), 0);
        assert_eq!(total_pages(1, 10), 1);
        assert_eq!(total_pages(10, 10), 1);
        assert_eq!(total_pages(11, 10), 2);
        assert_eq!(total_pages(41, 10), 5);
    }

    #[test]
    fn end_date_is_inclusive_via_next_day_bound() {
        let end = NaiveDate::from_ymd_opt(2024, 1, 10).unwrap();
        let bound = day_after_utc(end).unwrap();
        assert_eq!(bound.to_rfc3339(), "2024-01-11T00:00:00+00:00");

        let start = start_of_day_utc(end);
        assert_eq!(start.to_rfc3339(), "2024-01-10T00:00:00+00:00");
    }

    #[test]
    fn sellers_are_restricted_to_their_own_sales() {
        let seller = AuthContext { user_id: 7, role: "seller".to_string() };
        let admin = AuthContext { user_id: 1, role: "admin".to_string() };
        assert_eq!(owner_restriction(&seller), Some(7));
        assert_eq!(owner_restriction(&admin), None);
    }
}
