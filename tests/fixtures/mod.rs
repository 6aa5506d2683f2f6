//! Canned jobs and contacts shared by the workflow and API tests

use chrono::NaiveDate;
use invoice_workflow::models::job::{JobStatus, NewJob};
use invoice_workflow::models::line_item::NewLineItem;
use invoice_workflow::models::notification::{Contact, JobContacts};
use uuid::Uuid;

pub const PROVIDER_EMAIL: &str = "camille@provider.example";
pub const MANAGER_EMAIL: &str = "dana@agency.example";
pub const FINANCE_EMAIL: &str = "pagos@client.example";

pub fn new_job(status: JobStatus, due_date: Option<NaiveDate>) -> NewJob {
    NewJob {
        campaign_id: Uuid::new_v4(),
        provider_id: Uuid::new_v4(),
        manager_id: Uuid::new_v4(),
        status,
        currency: "EUR".to_string(),
        due_date,
        public_notes: Some("Spring campaign shoot".to_string()),
        private_notes: None,
    }
}

pub fn line_item(value_cents: i64) -> NewLineItem {
    NewLineItem {
        client_id: Uuid::new_v4(),
        campaign_id: Uuid::new_v4(),
        job_type_id: Uuid::new_v4(),
        manager_id: Uuid::new_v4(),
        provider_id: Uuid::new_v4(),
        period_year: 2026,
        period_month: 3,
        value_cents,
    }
}

/// Provider reads French, finance Spanish, the manager has no preference.
pub fn contacts() -> JobContacts {
    JobContacts {
        provider: Some(Contact {
            name: "Camille".to_string(),
            email: PROVIDER_EMAIL.to_string(),
            preferred_language: Some("fr-FR".to_string()),
        }),
        manager: Some(Contact {
            name: "Dana".to_string(),
            email: MANAGER_EMAIL.to_string(),
            preferred_language: None,
        }),
        finance: Some(Contact {
            name: "Cuentas".to_string(),
            email: FINANCE_EMAIL.to_string(),
            preferred_language: Some("es".to_string()),
        }),
    }
}

pub fn contacts_without_finance() -> JobContacts {
    JobContacts {
        finance: None,
        ..contacts()
    }
}
