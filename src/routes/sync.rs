//! Sync triggers and the sync audit views.

use std::sync::Arc;

use rocket::serde::json::Json;
use rocket::{State, get, post};
use rocket_okapi::okapi::schemars::JsonSchema;
use rocket_okapi::openapi;
use serde::{Deserialize, Serialize};

use crate::auth::{AuthUser, CronCaller};
use crate::error::ApiError;
use crate::models::{BatchReport, CursorSummary, DataResponse, RunResult, SyncLogEntry, SyncMode};
use crate::sync::{SingleRunError, SyncOrchestrator};

const DEFAULT_LOG_LIMIT: u32 = 50;
const MAX_LOG_LIMIT: u32 = 500;

/// Request body for an on-demand sync of one account.
///
/// Fields are parsed leniently and validated by hand so every rule violation
/// is reported as a 400 with a specific message.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct AccountSyncRequest {
    /// Account to synchronize.
    #[serde(rename = "accountId")]
    pub account_id: Option<i64>,
    /// `incremental` or `full`.
    pub mode: Option<String>,
    /// Maximum number of messages to pull; defaults to the manual limit.
    pub limit: Option<i64>,
}

#[derive(Debug, PartialEq, Eq)]
pub(crate) struct ValidatedSyncRequest {
    pub account_id: i32,
    pub mode: SyncMode,
    pub limit: Option<u32>,
}

impl AccountSyncRequest {
    pub(crate) fn validate(&self, max_limit: u32) -> Result<ValidatedSyncRequest, ApiError> {
        let account_id = self
            .account_id
            .ok_or_else(|| ApiError::BadRequest("accountId is required".into()))?;
        let account_id = i32::try_from(account_id)
            .ok()
            .filter(|id| *id > 0)
            .ok_or_else(|| ApiError::BadRequest(format!("invalid accountId {account_id}")))?;

        let mode = self
            .mode
            .as_deref()
            .ok_or_else(|| ApiError::BadRequest("mode is required".into()))?
            .parse::<SyncMode>()
            .map_err(ApiError::BadRequest)?;

        let limit = match self.limit {
            None => None,
            Some(limit) if limit >= 1 && limit <= i64::from(max_limit) => Some(limit as u32),
            Some(limit) => {
                return Err(ApiError::BadRequest(format!(
                    "limit {limit} out of range, expected 1..={max_limit}"
                )));
            }
        };

        Ok(ValidatedSyncRequest {
            account_id,
            mode,
            limit,
        })
    }
}

/// Run the scheduled incremental pass over every active account.
///
/// Called by the external scheduler with the shared cron secret.
#[openapi(tag = "Sync")]
#[post("/sync/cron")]
pub async fn cron_sync(
    _caller: CronCaller,
    orchestrator: &State<Arc<SyncOrchestrator>>,
) -> Result<Json<BatchReport>, ApiError> {
    let report = orchestrator.run_scheduled().await?;
    Ok(Json(report))
}

/// Synchronize a single account now.
///
/// Responds with the account's `RunResult`: `success`, `newCount`, `logId`
/// and `error` as for a scheduled run, plus the `accountId` and `name` it
/// refers to. A failed run is still a 200; only an unknown account is a 404.
#[openapi(tag = "Sync")]
#[post("/sync/accounts", data = "<request>")]
pub async fn run_account_sync(
    user: AuthUser,
    orchestrator: &State<Arc<SyncOrchestrator>>,
    request: Json<AccountSyncRequest>,
) -> Result<Json<RunResult>, ApiError> {
    let request = request.validate(orchestrator.config().max_manual_limit)?;
    log::info!(
        "on-demand {} sync of account {} requested by {} ({})",
        request.mode,
        request.account_id,
        user.subject,
        user.role
    );

    match orchestrator
        .run_single(request.account_id, request.mode, request.limit)
        .await
    {
        Ok(result) => Ok(Json(result)),
        Err(SingleRunError::NotFound(id)) => {
            Err(ApiError::NotFound(format!("mail account {id} not found")))
        }
        Err(SingleRunError::Registry(e)) => Err(e.into()),
    }
}

/// Query parameters accepted by the sync log listing.
#[derive(Debug, Clone, Default, Serialize, Deserialize, rocket::form::FromForm, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SyncLogParams {
    /// Restrict to one account.
    #[field(name = "accountId")]
    pub account_id: Option<i32>,
    /// Number of rows (defaults to 50, maximum 500).
    pub limit: Option<u32>,
}

impl SyncLogParams {
    pub fn limit(&self) -> u32 {
        self.limit.unwrap_or(DEFAULT_LOG_LIMIT).clamp(1, MAX_LOG_LIMIT)
    }
}

/// Recent sync runs, newest first.
#[openapi(tag = "Sync")]
#[get("/sync/logs?<params..>")]
pub async fn list_sync_logs(
    _user: AuthUser,
    orchestrator: &State<Arc<SyncOrchestrator>>,
    params: Option<SyncLogParams>,
) -> Result<Json<DataResponse<Vec<SyncLogEntry>>>, ApiError> {
    let params = params.unwrap_or_default();
    let logs = orchestrator
        .recent_logs(params.account_id, params.limit())
        .await?;
    Ok(Json(DataResponse { data: logs }))
}

/// Current sync position of one account.
#[openapi(tag = "Sync")]
#[get("/sync/accounts/<account_id>/cursor")]
pub async fn get_account_cursor(
    _user: AuthUser,
    orchestrator: &State<Arc<SyncOrchestrator>>,
    account_id: i32,
) -> Result<Json<CursorSummary>, ApiError> {
    if orchestrator.account(account_id).await?.is_none() {
        return Err(ApiError::NotFound(format!(
            "mail account {account_id} not found"
        )));
    }

    let cursor = orchestrator.cursor(account_id).await?.ok_or_else(|| {
        ApiError::NotFound(format!("mail account {account_id} has not been synced yet"))
    })?;
    Ok(Json(CursorSummary::from(&cursor)))
}
