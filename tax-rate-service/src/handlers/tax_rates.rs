use crate::dtos::{parse_date_param, CreateTaxRateRequest, UpdateTaxRateRequest};
use crate::middleware::{AuthUser, TaxWriter};
use crate::models::{Permission, TaxRate, TaxRateOverview};
use crate::startup::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use service_core::error::AppError;
use uuid::Uuid;
use validator::Validate;

fn tax_rate_not_found() -> AppError {
    AppError::NotFound(anyhow::anyhow!("Tax rate not found"))
}

/// The current rate and the rest of the history, newest first.
pub async fn list_tax_rates(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<TaxRateOverview>, AppError> {
    user.require(Permission::TaxRead)?;

    let overview = state.ledger.get_overview().await?;
    Ok(Json(overview))
}

pub async fn create_tax_rate(
    State(state): State<AppState>,
    TaxWriter(user): TaxWriter,
    Json(payload): Json<CreateTaxRateRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let created = state.ledger.create(user.id, payload.into()).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn get_effective_tax_rate(
    State(state): State<AppState>,
    user: AuthUser,
    Path(date): Path<String>,
) -> Result<Json<TaxRate>, AppError> {
    user.require(Permission::TaxRead)?;
    let date = parse_date_param(&date)?;

    state
        .ledger
        .get_effective_on_date(date)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("No tax rate found for the given date")))
}

pub async fn get_tax_rate(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<TaxRate>, AppError> {
    user.require(Permission::TaxRead)?;

    state
        .ledger
        .get_by_id(id)
        .await?
        .map(Json)
        .ok_or_else(tax_rate_not_found)
}

pub async fn update_tax_rate(
    State(state): State<AppState>,
    _writer: TaxWriter,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateTaxRateRequest>,
) -> Result<Json<TaxRate>, AppError> {
    payload.validate()?;

    state
        .ledger
        .update(id, payload.into())
        .await?
        .map(Json)
        .ok_or_else(tax_rate_not_found)
}

pub async fn delete_tax_rate(
    State(state): State<AppState>,
    _writer: TaxWriter,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    if state.ledger.delete(id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(tax_rate_not_found())
    }
}
