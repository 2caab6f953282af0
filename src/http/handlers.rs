//! Request handlers

use super::error::{ApiError, ApiResult};
use super::AppState;
use crate::config::FailurePolicy;
use crate::error::ValidationError;
use crate::input;
use crate::metrics::MetricsSnapshot;
use crate::service::{BatchOutcome, HealthStatus, ModelInfo, ScoredRecord};
use crate::types::transaction::RawTransaction;
use crate::types::verdict::{BatchSummary, Verdict};
use axum::{
    extract::{rejection::JsonRejection, Multipart, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, info};

/// Multipart field carrying the CSV upload
const UPLOAD_FIELD: &str = "file";

#[derive(Debug, Default, Deserialize)]
pub struct BatchParams {
    /// Overrides the configured failure policy
    pub mode: Option<FailurePolicy>,
}

#[derive(Debug, Serialize)]
pub struct BatchResponse {
    pub total_transactions: usize,
    pub fraud_detected: usize,
    pub predictions: Vec<ScoredRecord>,
}

#[derive(Debug, Serialize)]
pub struct BatchStatsResponse {
    pub summary: BatchSummary,
    pub detailed_predictions: Vec<ScoredRecord>,
}

pub async fn health(State(state): State<AppState>) -> Json<HealthStatus> {
    Json(state.service.health())
}

pub async fn model_info(State(state): State<AppState>) -> Json<ModelInfo> {
    Json(state.service.model_info())
}

pub async fn metrics(State(state): State<AppState>) -> Json<MetricsSnapshot> {
    Json(state.metrics.snapshot())
}

/// Score a single transaction
pub async fn predict(
    State(state): State<AppState>,
    payload: Result<Json<RawTransaction>, JsonRejection>,
) -> ApiResult<Json<Verdict>> {
    let started = Instant::now();

    let Json(raw) = payload.map_err(|rejection| {
        state.metrics.record_rejection();
        ApiError::from(rejection)
    })?;
    let raw = input::prepare_transaction(raw).map_err(|e| {
        state.metrics.record_rejection();
        ApiError::from(e)
    })?;

    let result = state.service.predict_one(&raw);
    state.metrics.record_latency(started.elapsed());

    match result {
        Ok(verdict) => {
            state.metrics.record_verdict(&verdict);
            Ok(Json(verdict))
        }
        Err(e) => {
            state.metrics.record_failures(1);
            Err(e.into())
        }
    }
}

/// Score every row of an uploaded CSV file
pub async fn predict_batch(
    State(state): State<AppState>,
    Query(params): Query<BatchParams>,
    multipart: Multipart,
) -> ApiResult<Json<BatchResponse>> {
    let outcome = score_upload(&state, multipart, params.mode).await?;

    Ok(Json(BatchResponse {
        total_transactions: outcome.summary.total_transactions,
        fraud_detected: outcome.summary.fraud_detected,
        predictions: outcome.records,
    }))
}

/// Score an uploaded CSV file and return its summary plus a sample of rows
pub async fn predict_batch_stats(
    State(state): State<AppState>,
    Query(params): Query<BatchParams>,
    multipart: Multipart,
) -> ApiResult<Json<BatchStatsResponse>> {
    let mut outcome = score_upload(&state, multipart, params.mode).await?;
    outcome.records.truncate(state.batch.sample_size);

    Ok(Json(BatchStatsResponse {
        summary: outcome.summary,
        detailed_predictions: outcome.records,
    }))
}

async fn score_upload(
    state: &AppState,
    multipart: Multipart,
    mode: Option<FailurePolicy>,
) -> ApiResult<BatchOutcome> {
    let started = Instant::now();

    let records = match read_upload(multipart)
        .await
        .and_then(|bytes| input::parse_upload(&bytes).map_err(ApiError::from))
    {
        Ok(records) => records,
        Err(e) => {
            state.metrics.record_rejection();
            return Err(e);
        }
    };

    let policy = mode.unwrap_or(state.batch.failure_policy);
    info!(transaction_count = records.len(), policy = ?policy, "Scoring batch upload");

    // Scoring is CPU-bound; keep it off the async workers
    let service = state.service.clone();
    let result = tokio::task::spawn_blocking(move || service.predict_batch(&records, policy)).await?;

    state.metrics.record_batch();
    state.metrics.record_latency(started.elapsed());

    match result {
        Ok(outcome) => {
            for verdict in outcome.records.iter().filter_map(ScoredRecord::verdict) {
                state.metrics.record_verdict(verdict);
            }
            state.metrics.record_failures(outcome.summary.failed as u64);
            Ok(outcome)
        }
        Err(e) => {
            state.metrics.record_failures(1);
            Err(e.into())
        }
    }
}

async fn read_upload(mut multipart: Multipart) -> ApiResult<Vec<u8>> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() == Some(UPLOAD_FIELD) {
            let bytes = field.bytes().await?;
            debug!(bytes = bytes.len(), "Upload received");
            return Ok(bytes.to_vec());
        }
    }

    Err(ValidationError::MissingFile.into())
}
