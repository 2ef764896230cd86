// Copyright (c) 2025 sbksba
//
// This software is licensed under the terms of the MIT License.
// See the LICENSE file in the project root for the full license text.

//! Recurring payment tracking for a small fitness business: programs,
//! clients, monthly payment obligations and daily SMS reminders for missed
//! payments.

pub mod billing;
pub mod config;
pub mod database;
pub mod error;
pub mod handlers;
pub mod notifier;
pub mod routes;
pub mod scheduler;
pub mod sweep;
