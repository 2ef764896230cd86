// Copyright (c) 2025 sbksba
//
// This software is licensed under the terms of the MIT License.
// See the LICENSE file in the project root for the full license text.
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// A billing plan clients can be enrolled in.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct Program {
    #[sqlx(rename = "id")]
    pub id: i64,

    #[sqlx(rename = "name")]
    pub name: String,

    #[sqlx(rename = "price")]
    pub price: f64,

    #[sqlx(rename = "created_at")]
    pub created_at: DateTime<Utc>,
}

#[derive(Deserialize, Debug)]
pub struct CreateProgramPayload {
    pub name: String,
    pub price: f64,
}

/// A person enrolled in a program.
///
/// `due_day` is the billing anchor: a day-of-month between 1 and 31. It is
/// stored and serialized as `due_date`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct Client {
    #[sqlx(rename = "id")]
    pub id: i64,

    #[sqlx(rename = "name")]
    pub name: String,

    // Reminders are delivered to this number.
    #[sqlx(rename = "phone")]
    pub phone: String,

    #[sqlx(rename = "program_id")]
    pub program_id: i64,

    // Per-client override, independent from `Program::price`.
    #[sqlx(rename = "payment_amount")]
    pub payment_amount: f64,

    #[sqlx(rename = "due_date")]
    #[serde(rename = "due_date")]
    pub due_day: u32,

    #[sqlx(rename = "created_at")]
    pub created_at: DateTime<Utc>,
}

/// A client row joined with the name of its program.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct ClientDetails {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub client: Client,

    #[sqlx(rename = "program_name")]
    pub program_name: String,
}

/// Enrollment data received from the API.
#[derive(Deserialize, Debug, Clone)]
pub struct CreateClientPayload {
    pub name: String,
    pub phone: String,
    pub program_id: i64,
    pub payment_amount: f64,
    #[serde(rename = "due_date")]
    pub due_day: u32,
}

/// Partial client update. Fields left out keep their current value.
#[derive(Deserialize, Debug, Clone, Default)]
pub struct UpdateClientPayload {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub program_id: Option<i64>,
    pub payment_amount: Option<f64>,
    #[serde(rename = "due_date")]
    pub due_day: Option<u32>,
}

/// Stored status of a payment. Overdue is never stored, see [`PaymentState`].
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Paid,
}

/// Status as seen by a reader on a given day.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PaymentState {
    Pending,
    Paid,
    Overdue,
}

/// One billing-cycle obligation for a client.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct Payment {
    #[sqlx(rename = "id")]
    pub id: i64,

    #[sqlx(rename = "client_id")]
    pub client_id: i64,

    // Set at creation, overwritten when the payment is marked paid.
    #[sqlx(rename = "payment_date")]
    pub payment_date: NaiveDate,

    // Snapshot of the client's amount when the obligation was created.
    #[sqlx(rename = "amount")]
    pub amount: f64,

    #[sqlx(rename = "due_date")]
    pub due_date: NaiveDate,

    #[sqlx(rename = "status")]
    pub status: PaymentStatus,

    #[sqlx(rename = "sms_sent")]
    pub sms_sent: bool,

    #[sqlx(rename = "created_at")]
    pub created_at: DateTime<Utc>,
}

/// A payment joined with the client and program display fields.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct PaymentDetails {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub payment: Payment,

    #[sqlx(rename = "client_name")]
    pub client_name: String,

    #[sqlx(rename = "phone")]
    pub phone: String,

    #[sqlx(rename = "program_name")]
    pub program_name: String,
}

/// What the API returns for a payment listing: the joined row plus its
/// state derived for the day of the request.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PaymentView {
    #[serde(flatten)]
    pub details: PaymentDetails,
    pub state: PaymentState,
}

/// Manual obligation creation. `amount` defaults to the client's current
/// `payment_amount`.
#[derive(Deserialize, Debug, Clone)]
pub struct CreatePaymentPayload {
    pub client_id: i64,
    pub due_date: NaiveDate,
    pub amount: Option<f64>,
}

/// Inclusive `due_date` range for payment listings.
#[derive(Deserialize, Debug, Clone, Copy, Default)]
pub struct PaymentRangeQuery {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

/// Result of a mark-paid request. `successor` is `None` when the payment
/// was already paid.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct MarkPaidResponse {
    pub payment: Payment,
    pub successor: Option<Payment>,
}

/// Dashboard figures for one billing month.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct DashboardStats {
    pub month_start: NaiveDate,
    pub month_end: NaiveDate,
    pub paid_count: i64,
    pub total_received: f64,
    // Overdue payments are counted here too.
    pub pending_count: i64,
    pub total_pending: f64,
    pub expected_count: i64,
    pub total_expected: f64,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: DateTime<Utc>,
}
