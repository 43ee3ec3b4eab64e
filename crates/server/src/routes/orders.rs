//! Order lookup route handler.

use axum::{
    Json,
    extract::{Path, State},
};
use orderflow_core::Order;
use tracing::instrument;

use crate::error::Result;
use crate::state::AppState;

/// Return the order with the given uid.
///
/// Served from the cache when possible, otherwise from the store.
#[instrument(skip(state))]
pub async fn show(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<Order>> {
    let order = state.orders().get_order(&id).await?;
    Ok(Json(order))
}
