//! Customer export API handlers
//!
//! POST /export/customers exports a listing supplied by the caller;
//! GET /export/customers fetches the current listing from the CRM first.

use axum::{
    extract::{rejection::JsonRejection, Query, State},
    response::Response,
    routing::get,
    Json, Router,
};
use serde::Deserialize;

use crate::{
    error::ApiResult,
    models::{CustomerListing, ListingQuery},
    services::{export_listing, EXPORT_FILE_NAME},
    AppState,
};

/// POST /export/customers request
#[derive(Debug, Deserialize)]
pub struct ExportRequest {
    pub customers: Vec<CustomerListing>,
    #[serde(default)]
    pub query: ListingQuery,
}

/// POST /export/customers
pub async fn export_supplied(
    payload: Result<Json<ExportRequest>, JsonRejection>,
) -> ApiResult<Response> {
    let Json(request) = payload?;
    let body = export_listing(&request.customers, &request.query);
    Ok(super::csv_attachment(EXPORT_FILE_NAME, body))
}

/// GET /export/customers?search=&status=&sort=&direction=
pub async fn export_from_store(
    State(state): State<AppState>,
    Query(query): Query<ListingQuery>,
) -> ApiResult<Response> {
    let customers = state.store.list_customers().await?;
    tracing::info!(customers = customers.len(), "Fetched customer listing for export");
    Ok(super::csv_attachment(
        EXPORT_FILE_NAME,
        export_listing(&customers, &query),
    ))
}

/// Build export routes
pub fn export_routes() -> Router<AppState> {
    Router::new().route(
        "/export/customers",
        get(export_from_store).post(export_supplied),
    )
}
