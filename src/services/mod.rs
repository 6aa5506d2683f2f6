pub mod hook;
pub mod ingestion;
pub mod mailer;
pub mod notifications;
pub mod payment;
pub mod queue;
pub mod state_machine;
pub mod storage;
pub mod templates;
pub mod tokens;
pub mod workflow;
