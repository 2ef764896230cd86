// Copyright (c) 2025 sbksba
//
// This software is licensed under the terms of the MIT License.
// See the LICENSE file in the project root for the full license text.

//! Daily scan for payments that became overdue yesterday.
//!
//! A payment is a candidate only on the day after its due date, and only
//! while it is pending and not yet reminded. A failed delivery leaves
//! `sms_sent` unset, but the payment will not match the next day's target
//! date, so it is not retried. A delivered reminder whose flag could not be
//! written is counted as unrecorded and the run still completes, so the
//! scheduler does not send it again that day.

use crate::database::{self, ReminderCandidate};
use crate::error::LedgerResult;
use crate::notifier::Notifier;
use chrono::{Days, NaiveDate};
use serde::Serialize;
use sqlx::SqlitePool;
use tracing::{debug, error, info, warn};

/// Outcome of one sweep run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub target_date: NaiveDate,
    pub candidates: usize,
    pub delivered: usize,
    pub failed: usize,
    /// Delivered, but `sms_sent` could not be stored.
    pub unrecorded: usize,
}

/// What happened to one candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Delivered,
    Unrecorded,
    Failed,
}

/// Text of the reminder sent to a client.
pub fn reminder_message(client_name: &str, amount: f64) -> String {
    format!(
        "Hi {client_name}, this is a reminder that your payment of ${amount:.2} was due yesterday. \
         Please make your payment at your earliest convenience. Thank you!"
    )
}

/// Reminds every client whose payment was due the day before `today`.
///
/// Failing to load the candidates aborts the run. A delivery failure, or a
/// flag write failing after delivery, is logged and the run moves on to the
/// next candidate.
pub async fn run_reminder_sweep(
    pool: &SqlitePool,
    notifier: &dyn Notifier,
    today: NaiveDate,
) -> LedgerResult<SweepReport> {
    let target_date = today.checked_sub_days(Days::new(1)).unwrap_or(today);
    info!("Checking for payments missed on {}", target_date);

    let candidates = database::find_reminder_candidates_from_db(pool, target_date).await?;
    info!("Found {} missed payment(s) to process", candidates.len());

    let mut report = SweepReport {
        target_date,
        candidates: candidates.len(),
        delivered: 0,
        failed: 0,
        unrecorded: 0,
    };

    for candidate in &candidates {
        match remind(pool, notifier, candidate).await {
            Outcome::Delivered => report.delivered += 1,
            Outcome::Unrecorded => {
                report.delivered += 1;
                report.unrecorded += 1;
            }
            Outcome::Failed => report.failed += 1,
        }
    }

    info!(
        "Reminder sweep for {} done: {} delivered ({} unrecorded), {} failed",
        target_date, report.delivered, report.unrecorded, report.failed
    );
    Ok(report)
}

async fn remind(
    pool: &SqlitePool,
    notifier: &dyn Notifier,
    candidate: &ReminderCandidate,
) -> Outcome {
    let message = reminder_message(&candidate.client_name, candidate.amount);

    if let Err(e) = notifier.send(&candidate.phone, &message).await {
        warn!(
            "Could not remind {} about payment {}: {}",
            candidate.client_name, candidate.payment_id, e
        );
        return Outcome::Failed;
    }

    match database::mark_reminder_sent_in_db(pool, candidate.payment_id).await {
        Ok(flagged) => {
            if !flagged {
                debug!("Payment {} was already flagged as reminded", candidate.payment_id);
            }
            info!(
                "Processed payment reminder for {} (payment {})",
                candidate.client_name, candidate.payment_id
            );
            Outcome::Delivered
        }
        Err(e) => {
            error!(
                "Reminded {} about payment {} but could not record it: {:?}",
                candidate.client_name, candidate.payment_id, e
            );
            Outcome::Unrecorded
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::{
        connect_in_memory, create_client_in_db, create_payment_in_db, create_program_in_db,
        mark_payment_paid_in_db,
    };
    use crate::notifier::DeliveryError;
    use async_trait::async_trait;
    use common::{CreateClientPayload, CreatePaymentPayload, CreateProgramPayload, Payment};
    use std::collections::HashSet;
    use std::sync::Mutex;

    /// Records every message and fails for the listed numbers.
    #[derive(Default)]
    struct RecordingNotifier {
        sent: Mutex<Vec<(String, String)>>,
        failing: HashSet<String>,
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn send(&self, to: &str, body: &str) -> Result<(), DeliveryError> {
            if self.failing.contains(to) {
                return Err(DeliveryError::Rejected {
                    status: 503,
                    body: "unavailable".to_string(),
                });
            }
            self.sent
                .lock()
                .unwrap()
                .push((to.to_string(), body.to_string()));
            Ok(())
        }

        fn name(&self) -> &'static str {
            "recording"
        }
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    async fn enroll(pool: &SqlitePool, name: &str, phone: &str, due_day: u32, today: NaiveDate) -> Payment {
        let program = create_program_in_db(
            pool,
            CreateProgramPayload {
                name: format!("Program for {name}"),
                price: 40.0,
            },
        )
        .await
        .unwrap();
        let (_, payment) = create_client_in_db(
            pool,
            CreateClientPayload {
                name: name.to_string(),
                phone: phone.to_string(),
                program_id: program.id,
                payment_amount: 40.0,
                due_day,
            },
            today,
        )
        .await
        .unwrap();
        payment
    }

    async fn sms_sent(pool: &SqlitePool, payment_id: i64) -> bool {
        sqlx::query_scalar("SELECT sms_sent FROM payments WHERE id = ?")
            .bind(payment_id)
            .fetch_one(pool)
            .await
            .unwrap()
    }

    #[test]
    fn test_reminder_message() {
        assert_eq!(
            reminder_message("Ana", 45.5),
            "Hi Ana, this is a reminder that your payment of $45.50 was due yesterday. \
             Please make your payment at your earliest convenience. Thank you!"
        );
    }

    #[tokio::test]
    async fn test_sweep_selects_only_yesterdays_pending_payments() {
        let pool = connect_in_memory().await.unwrap();
        let enrolled = date(2025, 5, 1);
        let due_yesterday = enroll(&pool, "Ana", "+1001", 9, enrolled).await;
        let due_today = enroll(&pool, "Ben", "+1002", 10, enrolled).await;
        let due_earlier = enroll(&pool, "Cy", "+1003", 8, enrolled).await;
        let paid = enroll(&pool, "Di", "+1004", 9, enrolled).await;
        mark_payment_paid_in_db(&pool, paid.id, enrolled).await.unwrap();

        let notifier = RecordingNotifier::default();
        let report = run_reminder_sweep(&pool, &notifier, date(2025, 5, 10)).await.unwrap();

        assert_eq!(
            report,
            SweepReport {
                target_date: date(2025, 5, 9),
                candidates: 1,
                delivered: 1,
                failed: 0,
                unrecorded: 0,
            }
        );
        let sent = notifier.sent.lock().unwrap().clone();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "+1001");
        assert!(sent[0].1.contains("Ana"));
        assert!(sent[0].1.contains("$40.00"));

        assert!(sms_sent(&pool, due_yesterday.id).await);
        assert!(!sms_sent(&pool, due_today.id).await);
        assert!(!sms_sent(&pool, due_earlier.id).await);
        assert!(!sms_sent(&pool, paid.id).await);
    }

    #[tokio::test]
    async fn test_sweep_never_reminds_twice() {
        let pool = connect_in_memory().await.unwrap();
        enroll(&pool, "Ana", "+1001", 9, date(2025, 5, 1)).await;
        let notifier = RecordingNotifier::default();

        run_reminder_sweep(&pool, &notifier, date(2025, 5, 10)).await.unwrap();
        let second = run_reminder_sweep(&pool, &notifier, date(2025, 5, 10)).await.unwrap();

        assert_eq!(second.candidates, 0);
        assert_eq!(notifier.sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_delivery_does_not_stop_the_run() {
        let pool = connect_in_memory().await.unwrap();
        let failing = enroll(&pool, "Ana", "+1001", 9, date(2025, 5, 1)).await;
        let ok = enroll(&pool, "Ben", "+1002", 9, date(2025, 5, 1)).await;

        let notifier = RecordingNotifier {
            failing: HashSet::from(["+1001".to_string()]),
            ..Default::default()
        };
        let report = run_reminder_sweep(&pool, &notifier, date(2025, 5, 10)).await.unwrap();

        assert_eq!(report.candidates, 2);
        assert_eq!(report.delivered, 1);
        assert_eq!(report.failed, 1);
        assert!(!sms_sent(&pool, failing.id).await);
        assert!(sms_sent(&pool, ok.id).await);

        // The window has closed by the next day: the failed one is not retried.
        let next_day = run_reminder_sweep(&pool, &notifier, date(2025, 5, 11)).await.unwrap();
        assert_eq!(next_day.candidates, 0);
        assert!(!sms_sent(&pool, failing.id).await);
    }

    #[tokio::test]
    async fn test_sweep_handles_month_boundary() {
        let pool = connect_in_memory().await.unwrap();
        let enrolled = enroll(&pool, "Ana", "+1001", 1, date(2025, 6, 1)).await;
        let manual_payment = create_payment_in_db(
            &pool,
            CreatePaymentPayload {
                client_id: enrolled.client_id,
                due_date: date(2025, 5, 31),
                amount: Some(12.0),
            },
            date(2025, 5, 1),
        )
        .await
        .unwrap();

        let notifier = RecordingNotifier::default();
        let report = run_reminder_sweep(&pool, &notifier, date(2025, 6, 1)).await.unwrap();

        assert_eq!(report.target_date, date(2025, 5, 31));
        assert_eq!(report.delivered, 1);
        assert!(sms_sent(&pool, manual_payment.id).await);
        assert!(!sms_sent(&pool, enrolled.id).await);
    }

    #[tokio::test]
    async fn test_unrecorded_reminder_does_not_abort_the_run() {
        let pool = connect_in_memory().await.unwrap();
        let ana = enroll(&pool, "Ana", "+1001", 9, date(2025, 5, 1)).await;
        let ben = enroll(&pool, "Ben", "+1002", 9, date(2025, 5, 1)).await;
        sqlx::raw_sql(
            "CREATE TRIGGER refuse_sms_flag BEFORE UPDATE OF sms_sent ON payments \
             BEGIN SELECT RAISE(ABORT, 'flag writes refused'); END;",
        )
        .execute(&pool)
        .await
        .unwrap();

        let notifier = RecordingNotifier::default();
        let report = run_reminder_sweep(&pool, &notifier, date(2025, 5, 10)).await.unwrap();

        assert_eq!(report.candidates, 2);
        assert_eq!(report.delivered, 2);
        assert_eq!(report.unrecorded, 2);
        assert_eq!(report.failed, 0);
        assert_eq!(notifier.sent.lock().unwrap().len(), 2);
        assert!(!sms_sent(&pool, ana.id).await);
        assert!(!sms_sent(&pool, ben.id).await);
    }
}
