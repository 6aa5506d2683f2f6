//! Job invoicing workflow
//!
//! Tracks billable jobs from deliverable request to payment: a job status
//! state machine, single-use expiring access tokens for unauthenticated
//! providers and payers, a document ingestion pipeline backed by R2, and
//! localized email notifications.

pub mod app_state;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod routes;
pub mod services;
pub mod startup;
