// Copyright (c) 2025 sbksba
//
// This software is licensed under the terms of the MIT License.
// See the LICENSE file in the project root for the full license text.
use crate::billing::{self, MarkPaid};
use crate::error::{LedgerError, LedgerResult};

use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use common::{
    Client, ClientDetails, CreateClientPayload, CreatePaymentPayload, CreateProgramPayload,
    DashboardStats, MarkPaidResponse, Payment, PaymentDetails, PaymentStatus, Program,
    UpdateClientPayload,
};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{migrate::MigrateDatabase, Sqlite, SqliteConnection, SqlitePool};
use std::path::Path;
use tracing::{debug, info, warn};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS programs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    price REAL NOT NULL,
    created_at TIMESTAMP NOT NULL
);

CREATE TABLE IF NOT EXISTS clients (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    phone TEXT NOT NULL,
    program_id INTEGER NOT NULL REFERENCES programs(id),
    payment_amount REAL NOT NULL,
    due_date INTEGER NOT NULL,
    created_at TIMESTAMP NOT NULL
);

CREATE TABLE IF NOT EXISTS payments (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    client_id INTEGER NOT NULL REFERENCES clients(id) ON DELETE CASCADE,
    payment_date DATE NOT NULL,
    amount REAL NOT NULL,
    due_date DATE NOT NULL,
    status TEXT NOT NULL DEFAULT 'pending',
    sms_sent INTEGER NOT NULL DEFAULT 0,
    created_at TIMESTAMP NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_payments_due_date ON payments (due_date);
"#;

const PAYMENT_DETAILS_SELECT: &str = r#"
SELECT p.*, c.name AS client_name, c.phone AS phone, pr.name AS program_name
FROM payments p
JOIN clients c ON p.client_id = c.id
JOIN programs pr ON c.program_id = pr.id
"#;

/// Establishes the database connection pool.
/// If the database (or the directory holding it) does not exist, it creates it,
/// then makes sure the schema is in place.
pub async fn establish_connection_pool(database_url: &str) -> Result<SqlitePool> {
    if !Sqlite::database_exists(database_url).await.unwrap_or(false) {
        if let Some(parent) = database_file_path(database_url).and_then(Path::parent) {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create database directory {}", parent.display())
                })?;
            }
        }
        info!("Creating database {}", database_url);
        Sqlite::create_database(database_url)
            .await
            .context("Failed to create database")?;
    } else {
        info!("Database already exists.");
    }

    // Foreign keys are enabled by sqlx on every SQLite connection.
    let pool = SqlitePool::connect(database_url)
        .await
        .context("Failed to connect to database")?;

    create_schema(&pool).await?;

    Ok(pool)
}

/// Opens a private in-memory ledger with the schema applied.
///
/// The pool holds a single connection that never expires: every connection
/// to `sqlite::memory:` would otherwise see its own empty database.
pub async fn connect_in_memory() -> Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .context("Failed to open in-memory database")?;

    create_schema(&pool).await?;

    Ok(pool)
}

/// Creates the `programs`, `clients` and `payments` tables if needed.
pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::raw_sql(SCHEMA)
        .execute(pool)
        .await
        .context("Failed to create ledger tables")?;

    info!("Ledger tables are ready.");
    Ok(())
}

fn database_file_path(database_url: &str) -> Option<&Path> {
    let path = database_url
        .strip_prefix("sqlite://")
        .or_else(|| database_url.strip_prefix("sqlite:"))?;
    let path = path.split('?').next()?;
    if path.is_empty() || path.starts_with(":memory:") {
        None
    } else {
        Some(Path::new(path))
    }
}

fn validate_name(field: &'static str, value: &str) -> LedgerResult<()> {
    if value.trim().is_empty() {
        return Err(LedgerError::validation(field, "cannot be empty"));
    }
    Ok(())
}

fn validate_amount(field: &'static str, value: f64) -> LedgerResult<()> {
    if !value.is_finite() || value < 0.0 {
        return Err(LedgerError::validation(field, "must be a non-negative amount"));
    }
    Ok(())
}

async fn ensure_program_exists(conn: &mut SqliteConnection, program_id: i64) -> LedgerResult<()> {
    let found: Option<i64> = sqlx::query_scalar("SELECT id FROM programs WHERE id = ?")
        .bind(program_id)
        .fetch_optional(conn)
        .await?;

    match found {
        Some(_) => Ok(()),
        None => Err(LedgerError::validation(
            "program_id",
            format!("program {program_id} does not exist"),
        )),
    }
}

async fn fetch_client(conn: &mut SqliteConnection, client_id: i64) -> LedgerResult<Option<Client>> {
    let client = sqlx::query_as::<_, Client>("SELECT * FROM clients WHERE id = ?")
        .bind(client_id)
        .fetch_optional(conn)
        .await?;
    Ok(client)
}

/// Inserts a fresh `pending` obligation with no reminder sent.
async fn insert_payment(
    conn: &mut SqliteConnection,
    client_id: i64,
    payment_date: NaiveDate,
    amount: f64,
    due_date: NaiveDate,
) -> LedgerResult<Payment> {
    let created_at = Utc::now();
    let id = sqlx::query(
        "INSERT INTO payments (client_id, payment_date, amount, due_date, status, sms_sent, created_at) VALUES (?, ?, ?, ?, ?, 0, ?)",
    )
    .bind(client_id)
    .bind(payment_date)
    .bind(amount)
    .bind(due_date)
    .bind(PaymentStatus::Pending)
    .bind(created_at)
    .execute(conn)
    .await?
    .last_insert_rowid();

    debug!(
        "Inserted payment {} for client {}: amount={:.2}, due_date={}",
        id, client_id, amount, due_date
    );

    Ok(Payment {
        id,
        client_id,
        payment_date,
        amount,
        due_date,
        status: PaymentStatus::Pending,
        sms_sent: false,
        created_at,
    })
}

// --- Programs ---

pub async fn list_programs_from_db(pool: &SqlitePool) -> LedgerResult<Vec<Program>> {
    let programs = sqlx::query_as::<_, Program>("SELECT * FROM programs ORDER BY name ASC")
        .fetch_all(pool)
        .await?;
    Ok(programs)
}

pub async fn create_program_in_db(
    pool: &SqlitePool,
    payload: CreateProgramPayload,
) -> LedgerResult<Program> {
    validate_name("name", &payload.name)?;
    validate_amount("price", payload.price)?;

    let created_at = Utc::now();
    let id = sqlx::query("INSERT INTO programs (name, price, created_at) VALUES (?, ?, ?)")
        .bind(&payload.name)
        .bind(payload.price)
        .bind(created_at)
        .execute(pool)
        .await?
        .last_insert_rowid();

    info!("Created program {} ({})", id, payload.name);

    Ok(Program {
        id,
        name: payload.name,
        price: payload.price,
        created_at,
    })
}

/// Deletes a program. Refused while any client is still enrolled in it;
/// clients must be moved to another program first.
pub async fn delete_program_in_db(pool: &SqlitePool, program_id: i64) -> LedgerResult<()> {
    let mut tx = pool.begin().await?;

    let dependents: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM clients WHERE program_id = ?")
        .bind(program_id)
        .fetch_one(&mut *tx)
        .await?;

    if dependents > 0 {
        return Err(LedgerError::InUse {
            entity: "Program",
            id: program_id,
            dependents,
        });
    }

    let deleted = sqlx::query("DELETE FROM programs WHERE id = ?")
        .bind(program_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

    if deleted == 0 {
        return Err(LedgerError::not_found("Program", program_id));
    }

    tx.commit().await?;
    info!("Deleted program {}", program_id);
    Ok(())
}

// --- Clients ---

pub async fn list_clients_from_db(pool: &SqlitePool) -> LedgerResult<Vec<ClientDetails>> {
    let clients = sqlx::query_as::<_, ClientDetails>(
        r#"
        SELECT c.*, p.name AS program_name
        FROM clients c
        JOIN programs p ON c.program_id = p.id
        ORDER BY c.name ASC
        "#,
    )
    .fetch_all(pool)
    .await?;
    Ok(clients)
}

pub async fn get_client_from_db(pool: &SqlitePool, client_id: i64) -> LedgerResult<Client> {
    let mut conn = pool.acquire().await?;
    fetch_client(&mut conn, client_id)
        .await?
        .ok_or_else(|| LedgerError::not_found("Client", client_id))
}

/// Enrolls a client and opens their first obligation, due on the anchor day
/// of the current month, in one transaction.
pub async fn create_client_in_db(
    pool: &SqlitePool,
    payload: CreateClientPayload,
    today: NaiveDate,
) -> LedgerResult<(Client, Payment)> {
    validate_name("name", &payload.name)?;
    validate_name("phone", &payload.phone)?;
    validate_amount("payment_amount", payload.payment_amount)?;
    let first_due_date = billing::initial_due_date(payload.due_day, today)?;

    let mut tx = pool.begin().await?;
    ensure_program_exists(&mut tx, payload.program_id).await?;

    let created_at = Utc::now();
    let id = sqlx::query(
        "INSERT INTO clients (name, phone, program_id, payment_amount, due_date, created_at) VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(&payload.name)
    .bind(&payload.phone)
    .bind(payload.program_id)
    .bind(payload.payment_amount)
    .bind(payload.due_day)
    .bind(created_at)
    .execute(&mut *tx)
    .await?
    .last_insert_rowid();

    let payment = insert_payment(&mut tx, id, today, payload.payment_amount, first_due_date).await?;

    tx.commit().await?;
    info!(
        "Enrolled client {} ({}); first payment {} due {}",
        id, payload.name, payment.id, payment.due_date
    );

    let client = Client {
        id,
        name: payload.name,
        phone: payload.phone,
        program_id: payload.program_id,
        payment_amount: payload.payment_amount,
        due_day: payload.due_day,
        created_at,
    };

    Ok((client, payment))
}

/// Applies a partial update. Existing payments keep the amount and due date
/// they were created with.
pub async fn update_client_in_db(
    pool: &SqlitePool,
    client_id: i64,
    payload: UpdateClientPayload,
) -> LedgerResult<Client> {
    let mut tx = pool.begin().await?;

    let current = fetch_client(&mut tx, client_id)
        .await?
        .ok_or_else(|| LedgerError::not_found("Client", client_id))?;

    let updated = Client {
        name: payload.name.unwrap_or(current.name),
        phone: payload.phone.unwrap_or(current.phone),
        program_id: payload.program_id.unwrap_or(current.program_id),
        payment_amount: payload.payment_amount.unwrap_or(current.payment_amount),
        due_day: payload.due_day.unwrap_or(current.due_day),
        ..current
    };

    validate_name("name", &updated.name)?;
    validate_name("phone", &updated.phone)?;
    validate_amount("payment_amount", updated.payment_amount)?;
    billing::validate_due_day(updated.due_day)?;
    if updated.program_id != current.program_id {
        ensure_program_exists(&mut tx, updated.program_id).await?;
    }

    sqlx::query(
        "UPDATE clients SET name = ?, phone = ?, program_id = ?, payment_amount = ?, due_date = ? WHERE id = ?",
    )
    .bind(&updated.name)
    .bind(&updated.phone)
    .bind(updated.program_id)
    .bind(updated.payment_amount)
    .bind(updated.due_day)
    .bind(client_id)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    info!("Updated client {}", client_id);
    Ok(updated)
}

/// Removes a client together with all of their payments.
/// Returns the number of payments removed.
pub async fn delete_client_in_db(pool: &SqlitePool, client_id: i64) -> LedgerResult<u64> {
    let mut tx = pool.begin().await?;

    let removed_payments = sqlx::query("DELETE FROM payments WHERE client_id = ?")
        .bind(client_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

    let deleted = sqlx::query("DELETE FROM clients WHERE id = ?")
        .bind(client_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

    if deleted == 0 {
        return Err(LedgerError::not_found("Client", client_id));
    }

    tx.commit().await?;
    info!(
        "Deleted client {} and {} payment(s)",
        client_id, removed_payments
    );
    Ok(removed_payments)
}

// --- Payments ---

/// Every payment, most recent due date first.
pub async fn list_payments_from_db(pool: &SqlitePool) -> LedgerResult<Vec<PaymentDetails>> {
    let query = format!("{PAYMENT_DETAILS_SELECT} ORDER BY p.due_date DESC, p.id DESC");
    let payments = sqlx::query_as::<_, PaymentDetails>(&query)
        .fetch_all(pool)
        .await?;
    Ok(payments)
}

/// Payments whose due date falls in `[start, end]`, earliest first.
pub async fn list_payments_in_range_from_db(
    pool: &SqlitePool,
    start: NaiveDate,
    end: NaiveDate,
) -> LedgerResult<Vec<PaymentDetails>> {
    if start > end {
        return Err(LedgerError::validation(
            "from",
            format!("range start {start} is after range end {end}"),
        ));
    }

    let query = format!(
        "{PAYMENT_DETAILS_SELECT} WHERE p.due_date BETWEEN ? AND ? ORDER BY p.due_date ASC, p.id ASC"
    );
    let payments = sqlx::query_as::<_, PaymentDetails>(&query)
        .bind(start)
        .bind(end)
        .fetch_all(pool)
        .await?;
    Ok(payments)
}

/// Records an obligation by hand, outside the enrollment and roll-forward flows.
pub async fn create_payment_in_db(
    pool: &SqlitePool,
    payload: CreatePaymentPayload,
    today: NaiveDate,
) -> LedgerResult<Payment> {
    if let Some(amount) = payload.amount {
        validate_amount("amount", amount)?;
    }

    let mut tx = pool.begin().await?;
    let client = fetch_client(&mut tx, payload.client_id)
        .await?
        .ok_or_else(|| {
            LedgerError::validation(
                "client_id",
                format!("client {} does not exist", payload.client_id),
            )
        })?;

    let amount = payload.amount.unwrap_or(client.payment_amount);
    let payment = insert_payment(&mut tx, client.id, today, amount, payload.due_date).await?;
    tx.commit().await?;

    info!(
        "Created payment {} for client {} due {}",
        payment.id, client.id, payment.due_date
    );
    Ok(payment)
}

/// Settles a pending payment and opens the next cycle's obligation.
///
/// Both writes share one transaction: either the payment is paid and has
/// exactly one successor, or nothing changed. Marking an already paid
/// payment returns it unchanged with no successor.
pub async fn mark_payment_paid_in_db(
    pool: &SqlitePool,
    payment_id: i64,
    today: NaiveDate,
) -> LedgerResult<MarkPaidResponse> {
    let mut tx = pool.begin().await?;

    let payment = sqlx::query_as::<_, Payment>("SELECT * FROM payments WHERE id = ?")
        .bind(payment_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| LedgerError::not_found("Payment", payment_id))?;

    if billing::mark_paid_transition(payment.status) == MarkPaid::AlreadyPaid {
        debug!("Payment {} is already paid, nothing to do.", payment_id);
        return Ok(MarkPaidResponse {
            payment,
            successor: None,
        });
    }

    // The status guard makes a concurrent second settle a no-op.
    let settled = sqlx::query(
        "UPDATE payments SET status = ?, payment_date = ? WHERE id = ? AND status = ?",
    )
    .bind(PaymentStatus::Paid)
    .bind(today)
    .bind(payment_id)
    .bind(PaymentStatus::Pending)
    .execute(&mut *tx)
    .await?
    .rows_affected();

    if settled == 0 {
        warn!("Payment {} was settled concurrently.", payment_id);
        let payment = sqlx::query_as::<_, Payment>("SELECT * FROM payments WHERE id = ?")
            .bind(payment_id)
            .fetch_one(&mut *tx)
            .await?;
        return Ok(MarkPaidResponse {
            payment,
            successor: None,
        });
    }

    let client = fetch_client(&mut tx, payment.client_id)
        .await?
        .ok_or_else(|| LedgerError::not_found("Client", payment.client_id))?;

    let next_due_date = billing::next_due_date(payment.due_date, client.due_day)?;
    let successor =
        insert_payment(&mut tx, client.id, today, client.payment_amount, next_due_date).await?;

    tx.commit().await?;
    info!(
        "Payment {} marked paid; next payment {} due {}",
        payment_id, successor.id, successor.due_date
    );

    Ok(MarkPaidResponse {
        payment: Payment {
            status: PaymentStatus::Paid,
            payment_date: today,
            ..payment
        },
        successor: Some(successor),
    })
}

// --- Reminders ---

/// A pending, not yet reminded payment with the contact details needed to
/// remind its client.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct ReminderCandidate {
    pub payment_id: i64,
    pub client_id: i64,
    pub client_name: String,
    pub phone: String,
    pub amount: f64,
    pub due_date: NaiveDate,
}

pub async fn find_reminder_candidates_from_db(
    pool: &SqlitePool,
    due_date: NaiveDate,
) -> LedgerResult<Vec<ReminderCandidate>> {
    let candidates = sqlx::query_as::<_, ReminderCandidate>(
        r#"
        SELECT p.id AS payment_id, p.client_id, c.name AS client_name, c.phone,
               p.amount, p.due_date
        FROM payments p
        JOIN clients c ON p.client_id = c.id
        WHERE p.status = ? AND p.due_date = ? AND p.sms_sent = 0
        ORDER BY p.id ASC
        "#,
    )
    .bind(PaymentStatus::Pending)
    .bind(due_date)
    .fetch_all(pool)
    .await?;
    Ok(candidates)
}

/// Flags a payment as reminded. Returns false if it already was.
pub async fn mark_reminder_sent_in_db(pool: &SqlitePool, payment_id: i64) -> LedgerResult<bool> {
    let updated = sqlx::query("UPDATE payments SET sms_sent = 1 WHERE id = ? AND sms_sent = 0")
        .bind(payment_id)
        .execute(pool)
        .await?
        .rows_affected();
    Ok(updated > 0)
}

// --- Stats ---

fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Paid and pending counts and sums for the month containing `today`.
pub async fn get_month_stats_from_db(
    pool: &SqlitePool,
    today: NaiveDate,
) -> LedgerResult<DashboardStats> {
    let (month_start, month_end) = billing::month_bounds(today)
        .ok_or_else(|| LedgerError::validation("today", "no month contains this date"))?;

    let (paid_count, pending_count, total_received, total_pending): (i64, i64, f64, f64) =
        sqlx::query_as(
            r#"
            SELECT
                COUNT(CASE WHEN status = 'paid' THEN 1 END),
                COUNT(CASE WHEN status = 'pending' THEN 1 END),
                COALESCE(SUM(CASE WHEN status = 'paid' THEN amount END), 0.0),
                COALESCE(SUM(CASE WHEN status = 'pending' THEN amount END), 0.0)
            FROM payments
            WHERE due_date BETWEEN ? AND ?
            "#,
        )
        .bind(month_start)
        .bind(month_end)
        .fetch_one(pool)
        .await?;

    let total_received = round_cents(total_received);
    let total_pending = round_cents(total_pending);

    Ok(DashboardStats {
        month_start,
        month_end,
        paid_count,
        total_received,
        pending_count,
        total_pending,
        expected_count: paid_count + pending_count,
        total_expected: round_cents(total_received + total_pending),
    })
}
