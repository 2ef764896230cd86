// Copyright (c) 2025 sbksba
//
// This software is licensed under the terms of the MIT License.
// See the LICENSE file in the project root for the full license text.

//! Billing rules for a single payment: due-date computation, the
//! pending -> paid transition and the read-time overdue derivation.
//!
//! Everything here is pure. The ledger applies these rules inside its
//! transactions; nothing in this module touches storage.

use crate::error::{LedgerError, LedgerResult};
use chrono::{Datelike, Local, Months, NaiveDate};
use common::{PaymentState, PaymentStatus};

pub const MIN_DUE_DAY: u32 = 1;
pub const MAX_DUE_DAY: u32 = 31;

/// The business runs on local time: "today" is the local calendar day.
pub fn today() -> NaiveDate {
    Local::now().date_naive()
}

/// Rejects anchor days outside `1..=31`.
#[allow(clippy::uninlined_format_args)]
pub fn validate_due_day(day: u32) -> LedgerResult<()> {
    if (MIN_DUE_DAY..=MAX_DUE_DAY).contains(&day) {
        Ok(())
    } else {
        Err(LedgerError::validation(
            "due_date",
            format!(
                "day of month must be between {} and {}, got {}",
                MIN_DUE_DAY, MAX_DUE_DAY, day
            ),
        ))
    }
}

/// Number of days in the given month, `None` if the month is not a valid date.
pub fn days_in_month(year: i32, month: u32) -> Option<u32> {
    let first = NaiveDate::from_ymd_opt(year, month, 1)?;
    let next = first.checked_add_months(Months::new(1))?;
    u32::try_from(next.signed_duration_since(first).num_days()).ok()
}

/// Applies the clamp rule: the anchor day, or the last day of the month
/// when the month is shorter than the anchor.
pub fn due_date_in_month(anchor_day: u32, year: i32, month: u32) -> Option<NaiveDate> {
    let last = days_in_month(year, month)?;
    NaiveDate::from_ymd_opt(year, month, anchor_day.clamp(MIN_DUE_DAY, last))
}

/// Due date of the obligation created at enrollment: the anchor day in the
/// month of `today`.
pub fn initial_due_date(anchor_day: u32, today: NaiveDate) -> LedgerResult<NaiveDate> {
    validate_due_day(anchor_day)?;
    due_date_in_month(anchor_day, today.year(), today.month())
        .ok_or_else(|| LedgerError::validation("due_date", "no valid date in the current month"))
}

/// Due date of the successor obligation: the anchor day, clamped, in the
/// month following `previous`.
///
/// The anchor is reapplied from scratch rather than derived from `previous`,
/// so a clamped February 28 still rolls forward to March 31 for a client
/// anchored on the 31st.
pub fn next_due_date(previous: NaiveDate, anchor_day: u32) -> LedgerResult<NaiveDate> {
    validate_due_day(anchor_day)?;
    previous
        .with_day(1)
        .and_then(|first| first.checked_add_months(Months::new(1)))
        .and_then(|next| due_date_in_month(anchor_day, next.year(), next.month()))
        .ok_or_else(|| LedgerError::validation("due_date", "cannot roll forward past the calendar range"))
}

/// First and last day of the month containing `day`.
pub fn month_bounds(day: NaiveDate) -> Option<(NaiveDate, NaiveDate)> {
    let first = day.with_day(1)?;
    let last = due_date_in_month(MAX_DUE_DAY, day.year(), day.month())?;
    Some((first, last))
}

/// Derives the read-time state of a payment. Overdue means still pending
/// with a due date strictly before `today`; a paid payment is never overdue.
pub fn classify(status: PaymentStatus, due_date: NaiveDate, today: NaiveDate) -> PaymentState {
    match status {
        PaymentStatus::Paid => PaymentState::Paid,
        PaymentStatus::Pending if due_date < today => PaymentState::Overdue,
        PaymentStatus::Pending => PaymentState::Pending,
    }
}

/// What a mark-paid request does to a payment in a given status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkPaid {
    /// pending -> paid, with exactly one successor created.
    Settle,
    /// Already paid: nothing changes and no successor is created.
    AlreadyPaid,
}

pub fn mark_paid_transition(status: PaymentStatus) -> MarkPaid {
    match status {
        PaymentStatus::Pending => MarkPaid::Settle,
        PaymentStatus::Paid => MarkPaid::AlreadyPaid,
    }
}
