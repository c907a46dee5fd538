use axum::{
    routing::{get, patch, put},
    Router,
};
use crate::state::AppState;
use crate::handlers::sale;
use crate::middleware::auth::require_auth;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/sales", get(sale::list_sales).post(sale::create_sale))
        .route("/sales/status-counts", get(sale::status_counts))
        .route("/sales/{id}", get(sale::get_sale).patch(sale::update_sale))
        .route("/sales/{id}/items", put(sale::replace_items))
        .route("/sales/{id}/payment", patch(sale::pay_sale))
        .route_layer(axum::middleware::from_fn(require_auth))
}
