use std::sync::RwLockReadGuard;

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use types::ids::Symbol;

use super::{ApiError, AppState, DEFAULT_DEPTH, MAX_DEPTH};
use crate::aggregate::OrderBookAggregate;

#[derive(Debug, Deserialize)]
pub struct DepthQuery {
    pub depth: Option<usize>,
}

fn read_book(state: &AppState) -> Result<RwLockReadGuard<'_, OrderBookAggregate>, ApiError> {
    state
        .book
        .read()
        .map_err(|_| ApiError::Internal("book lock poisoned".to_string()))
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

pub async fn health(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let book = read_book(&state)?;
    Ok(Json(json!({
        "status": "healthy",
        "symbols": book.symbol_count(),
        "total_orders": book.total_orders(),
        "timestamp": now_ms(),
    })))
}

pub async fn metrics(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    Ok(Json(json!({
        "engine": state.recorder.snapshot(),
        "stream": state.stream_metrics.snapshot(),
    })))
}

pub async fn symbols(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let symbols = read_book(&state)?.list_symbols();
    Ok(Json(json!({ "symbols": symbols })))
}

pub async fn book(
    State(state): State<AppState>,
    Path(symbol): Path<String>,
    Query(query): Query<DepthQuery>,
) -> Result<Json<Value>, ApiError> {
    let depth = query.depth.unwrap_or(DEFAULT_DEPTH);
    if !(1..=MAX_DEPTH).contains(&depth) {
        return Err(ApiError::BadRequest(format!("depth must be 1-{}", MAX_DEPTH)));
    }
    let symbol = Symbol::new(symbol);
    let top = read_book(&state)?.top(symbol.as_str(), depth);
    Ok(Json(json!({
        "symbol": symbol,
        "bids": top.bids,
        "asks": top.asks,
        "timestamp": now_ms(),
    })))
}

pub async fn bba(
    State(state): State<AppState>,
    Path(symbol): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let symbol = Symbol::new(symbol);
    let bba = read_book(&state)?.best_bid_ask(symbol.as_str());
    Ok(Json(json!({
        "symbol": symbol,
        "best_bid": bba.best_bid,
        "best_ask": bba.best_ask,
        "bid_depth": bba.bid_depth,
        "ask_depth": bba.ask_depth,
    })))
}

pub async fn verify(
    State(state): State<AppState>,
    Path(symbol): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let report = read_book(&state)?.verify(&symbol);
    Ok(Json(json!(report)))
}

pub async fn snapshot(
    State(state): State<AppState>,
    Path(symbol): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let symbol = Symbol::new(symbol);
    let book = read_book(&state)?;
    if book.book(symbol.as_str()).is_none() {
        return Err(ApiError::NotFound(format!("unknown symbol {}", symbol)));
    }
    Ok(Json(json!(book.full_snapshot(symbol.as_str()))))
}
