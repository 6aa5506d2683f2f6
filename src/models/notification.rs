use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

/// Workflow events that announce themselves by email.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Display, EnumString, EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum NotificationKind {
    /// Job entered `pending_invoice`; provider gets the upload link.
    InvoiceRequested,
    /// Job entered `pending_payment`; finance gets the payment link.
    PaymentRequested,
    /// Job entered `paid`.
    PaymentConfirmed,
}

#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Display, EnumString, EnumIter,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Locale {
    En,
    Fr,
    Es,
}

impl Locale {
    /// Resolve a stored language tag ("fr", "fr-CA", "ES") to a supported
    /// locale, falling back to `default`.
    pub fn resolve(tag: Option<&str>, default: Locale) -> Locale {
        tag.and_then(|t| t.split(|c| c == '-' || c == '_').next())
            .and_then(|primary| primary.trim().parse().ok())
            .unwrap_or(default)
    }
}

/// Which party of the job a recipient is.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RecipientRole {
    Provider,
    Manager,
    Finance,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contact {
    pub name: String,
    pub email: String,
    pub preferred_language: Option<String>,
}

/// People attached to a job, as far as the store knows them.
#[derive(Debug, Clone, Default)]
pub struct JobContacts {
    pub provider: Option<Contact>,
    pub manager: Option<Contact>,
    pub finance: Option<Contact>,
}

impl JobContacts {
    pub fn for_role(&self, role: RecipientRole) -> Option<&Contact> {
        match role {
            RecipientRole::Provider => self.provider.as_ref(),
            RecipientRole::Manager => self.manager.as_ref(),
            RecipientRole::Finance => self.finance.as_ref(),
        }
    }
}

/// A rendered message ready for the mail transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub to: String,
    pub locale: Locale,
    pub kind: NotificationKind,
    pub subject: String,
    pub body: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locale_resolution_uses_primary_subtag() {
        assert_eq!(Locale::resolve(Some("fr-CA"), Locale::En), Locale::Fr);
        assert_eq!(Locale::resolve(Some("ES"), Locale::En), Locale::Es);
        assert_eq!(Locale::resolve(Some("pt_BR"), Locale::En), Locale::En);
        assert_eq!(Locale::resolve(None, Locale::Fr), Locale::Fr);
    }
}
