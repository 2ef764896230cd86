// Copyright (c) 2025 sbksba
//
// This software is licensed under the terms of the MIT License.
// See the LICENSE file in the project root for the full license text.
use crate::billing;
use crate::database;
use crate::error::LedgerError;
use axum::{
    extract::{FromRequest, FromRequestParts, Json, Path, Query, Request, State},
    http::{StatusCode, request::Parts},
    response::{IntoResponse, Response},
};
use chrono::{NaiveDate, Utc};
use common::{
    Client, ClientDetails, CreateClientPayload, CreatePaymentPayload, CreateProgramPayload,
    DashboardStats, HealthResponse, MarkPaidResponse, Payment, PaymentDetails, PaymentRangeQuery,
    PaymentView, Program, UpdateClientPayload,
};
use serde::de::DeserializeOwned;
use sqlx::SqlitePool;
use tracing::{debug, info};

/// Liveness probe.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        timestamp: Utc::now(),
    })
}

// --- Programs ---

pub async fn list_programs(State(pool): State<SqlitePool>) -> Result<Json<Vec<Program>>, AppError> {
    let programs = database::list_programs_from_db(&pool).await?;
    info!("Successfully retrieved {} programs.", programs.len());
    Ok(Json(programs))
}

pub async fn create_program(
    State(pool): State<SqlitePool>,
    ApiJson(payload): ApiJson<CreateProgramPayload>,
) -> Result<(StatusCode, Json<Program>), AppError> {
    debug!("Received request to create program: {}", payload.name);
    let program = database::create_program_in_db(&pool, payload).await?;
    Ok((StatusCode::CREATED, Json(program)))
}

pub async fn delete_program(
    State(pool): State<SqlitePool>,
    Path(program_id): Path<i64>,
) -> Result<StatusCode, AppError> {
    debug!("Attempting to delete program with ID: {}", program_id);
    database::delete_program_in_db(&pool, program_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// --- Clients ---

pub async fn list_clients(
    State(pool): State<SqlitePool>,
) -> Result<Json<Vec<ClientDetails>>, AppError> {
    let clients = database::list_clients_from_db(&pool).await?;
    info!("Successfully retrieved {} clients.", clients.len());
    Ok(Json(clients))
}

pub async fn get_client(
    State(pool): State<SqlitePool>,
    Path(client_id): Path<i64>,
) -> Result<Json<Client>, AppError> {
    Ok(Json(database::get_client_from_db(&pool, client_id).await?))
}

/// Enrolls a client. The first payment is created alongside; only the
/// client is returned.
pub async fn create_client(
    State(pool): State<SqlitePool>,
    ApiJson(payload): ApiJson<CreateClientPayload>,
) -> Result<(StatusCode, Json<Client>), AppError> {
    debug!("Received request to enroll client: {}", payload.name);
    let (client, _first_payment) =
        database::create_client_in_db(&pool, payload, billing::today()).await?;
    Ok((StatusCode::CREATED, Json(client)))
}

pub async fn update_client(
    State(pool): State<SqlitePool>,
    Path(client_id): Path<i64>,
    ApiJson(payload): ApiJson<UpdateClientPayload>,
) -> Result<Json<Client>, AppError> {
    debug!("Received request to update client with ID: {}", client_id);
    let client = database::update_client_in_db(&pool, client_id, payload).await?;
    Ok(Json(client))
}

pub async fn delete_client(
    State(pool): State<SqlitePool>,
    Path(client_id): Path<i64>,
) -> Result<StatusCode, AppError> {
    debug!("Attempting to delete client with ID: {}", client_id);
    database::delete_client_in_db(&pool, client_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// --- Payments ---

fn into_views(payments: Vec<PaymentDetails>, today: NaiveDate) -> Vec<PaymentView> {
    payments
        .into_iter()
        .map(|details| {
            let state = billing::classify(details.payment.status, details.payment.due_date, today);
            PaymentView { details, state }
        })
        .collect()
}

/// Lists payments. With both `from` and `to` the listing is limited to that
/// inclusive due-date range, earliest first; otherwise everything is
/// returned, latest first.
pub async fn list_payments(
    State(pool): State<SqlitePool>,
    ApiQuery(range): ApiQuery<PaymentRangeQuery>,
) -> Result<Json<Vec<PaymentView>>, AppError> {
    let payments = match (range.from, range.to) {
        (Some(from), Some(to)) => database::list_payments_in_range_from_db(&pool, from, to).await?,
        (None, None) => database::list_payments_from_db(&pool).await?,
        _ => {
            return Err(AppError::new(
                StatusCode::BAD_REQUEST,
                "Both 'from' and 'to' are required for a date range.",
            ));
        }
    };
    info!("Successfully retrieved {} payments.", payments.len());
    Ok(Json(into_views(payments, billing::today())))
}

pub async fn list_current_month_payments(
    State(pool): State<SqlitePool>,
) -> Result<Json<Vec<PaymentView>>, AppError> {
    let today = billing::today();
    let (first, last) = billing::month_bounds(today).ok_or_else(|| {
        AppError::new(StatusCode::INTERNAL_SERVER_ERROR, "An internal error occurred.")
    })?;
    let payments = database::list_payments_in_range_from_db(&pool, first, last).await?;
    info!(
        "Successfully retrieved {} payments for {} to {}.",
        payments.len(),
        first,
        last
    );
    Ok(Json(into_views(payments, today)))
}

pub async fn create_payment(
    State(pool): State<SqlitePool>,
    ApiJson(payload): ApiJson<CreatePaymentPayload>,
) -> Result<(StatusCode, Json<Payment>), AppError> {
    debug!(
        "Received request to create payment for client {} due {}",
        payload.client_id, payload.due_date
    );
    let payment = database::create_payment_in_db(&pool, payload, billing::today()).await?;
    Ok((StatusCode::CREATED, Json(payment)))
}

pub async fn mark_payment_paid(
    State(pool): State<SqlitePool>,
    Path(payment_id): Path<i64>,
) -> Result<Json<MarkPaidResponse>, AppError> {
    debug!("Received request to mark payment {} as paid", payment_id);
    let outcome = database::mark_payment_paid_in_db(&pool, payment_id, billing::today()).await?;
    Ok(Json(outcome))
}

// --- Dashboard ---

pub async fn dashboard_stats(
    State(pool): State<SqlitePool>,
) -> Result<Json<DashboardStats>, AppError> {
    let stats = database::get_month_stats_from_db(&pool, billing::today()).await?;
    Ok(Json(stats))
}

// --- Extractors ---

/// `Json` whose rejection is reported as an `AppError` body.
pub struct ApiJson<T>(pub T);

impl<T, S> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|rejection| AppError {
                code: rejection.status(),
                message: rejection.body_text(),
            })?;
        Ok(Self(value))
    }
}

/// `Query` whose rejection is reported as an `AppError` body.
pub struct ApiQuery<T>(pub T);

impl<T, S> FromRequestParts<S> for ApiQuery<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Query(value) = Query::<T>::from_request_parts(parts, state)
            .await
            .map_err(|rejection| AppError {
                code: rejection.status(),
                message: rejection.body_text(),
            })?;
        Ok(Self(value))
    }
}

// --- Custom Error Handling ---

/// Our custom error type for the application.
#[derive(Debug)]
pub struct AppError {
    code: StatusCode,
    message: String,
}

impl AppError {
    fn new(code: StatusCode, message: &str) -> Self {
        Self {
            code,
            message: message.to_string(),
        }
    }
}

impl From<LedgerError> for AppError {
    fn from(err: LedgerError) -> Self {
        let code = match &err {
            LedgerError::Validation { .. } => StatusCode::BAD_REQUEST,
            LedgerError::NotFound { .. } => StatusCode::NOT_FOUND,
            LedgerError::InUse { .. } => StatusCode::CONFLICT,
            LedgerError::Persistence(_) => {
                // Log the internal error for debugging, never expose it.
                tracing::error!("Internal server error: {:?}", err);
                return Self::new(StatusCode::INTERNAL_SERVER_ERROR, "An internal error occurred.");
            }
        };
        Self {
            code,
            message: err.to_string(),
        }
    }
}

/// Allows Axum to convert our `AppError` into an HTTP `Response`.
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        tracing::error!(
            "Responding with error: status_code={}, message={}",
            self.code.as_u16(),
            self.message
        );
        (
            self.code,
            Json(serde_json::json!({ "error": self.message })),
        )
            .into_response()
    }
}
