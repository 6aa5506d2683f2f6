use std::collections::HashMap;
use strum::IntoEnumIterator;

use crate::models::notification::{Locale, NotificationKind};

/// Subject and body with `{placeholder}` slots.
#[derive(Debug, Clone, Copy)]
pub struct Template {
    pub subject: &'static str,
    pub body: &'static str,
}

/// Values substituted into a template.
#[derive(Debug, Clone, Default)]
pub struct TemplateVars {
    pub recipient_name: String,
    pub job_ref: String,
    pub amount: String,
    pub due_date: String,
    pub link: String,
}

impl TemplateVars {
    fn value(&self, name: &str) -> Option<&str> {
        match name {
            "recipient_name" => Some(self.recipient_name.as_str()),
            "job_ref" => Some(self.job_ref.as_str()),
            "amount" => Some(self.amount.as_str()),
            "due_date" => Some(self.due_date.as_str()),
            "link" => Some(self.link.as_str()),
            _ => None,
        }
    }

    /// Substitute in one pass over the template; substituted values are
    /// never scanned again. Unknown slots are kept as written.
    fn apply(&self, text: &str) -> String {
        let mut out = String::with_capacity(text.len());
        let mut rest = text;
        while let Some(open) = rest.find('{') {
            let Some(close) = rest[open..].find('}').map(|c| open + c) else {
                break;
            };
            let name = &rest[open + 1..close];
            if name.contains('{') {
                out.push_str(&rest[..=open]);
                rest = &rest[open + 1..];
                continue;
            }
            out.push_str(&rest[..open]);
            match self.value(name) {
                Some(value) => out.push_str(value),
                None => out.push_str(&rest[open..=close]),
            }
            rest = &rest[close + 1..];
        }
        out.push_str(rest);
        out
    }
}

/// Templates keyed by `(kind, locale)` with a fallback locale.
#[derive(Debug, Clone)]
pub struct TemplateRegistry {
    templates: HashMap<(NotificationKind, Locale), Template>,
    fallback: Locale,
}

impl TemplateRegistry {
    pub fn empty(fallback: Locale) -> Self {
        Self {
            templates: HashMap::new(),
            fallback,
        }
    }

    pub fn insert(&mut self, kind: NotificationKind, locale: Locale, template: Template) {
        self.templates.insert((kind, locale), template);
    }

    /// The shipped templates, checked for completeness.
    pub fn builtin(fallback: Locale) -> Result<Self, TemplateError> {
        let mut registry = Self::empty(fallback);
        for (kind, locale, template) in BUILTIN {
            registry.insert(*kind, *locale, *template);
        }
        registry.validate()?;
        Ok(registry)
    }

    /// Every `(kind, locale)` pair must have a template that mentions the
    /// link when the kind carries one.
    pub fn validate(&self) -> Result<(), TemplateError> {
        for kind in NotificationKind::iter() {
            for locale in Locale::iter() {
                let template = self
                    .templates
                    .get(&(kind, locale))
                    .ok_or(TemplateError::Missing { kind, locale })?;
                if carries_link(kind) && !template.body.contains("{link}") {
                    return Err(TemplateError::MissingLink { kind, locale });
                }
            }
        }
        Ok(())
    }

    /// Render `kind` in `locale`, or in the fallback locale if absent.
    pub fn render(
        &self,
        kind: NotificationKind,
        locale: Locale,
        vars: &TemplateVars,
    ) -> Result<(String, String), TemplateError> {
        let template = self
            .templates
            .get(&(kind, locale))
            .or_else(|| self.templates.get(&(kind, self.fallback)))
            .ok_or(TemplateError::Missing {
                kind,
                locale: self.fallback,
            })?;
        Ok((vars.apply(template.subject), vars.apply(template.body)))
    }
}

pub fn carries_link(kind: NotificationKind) -> bool {
    matches!(
        kind,
        NotificationKind::InvoiceRequested | NotificationKind::PaymentRequested
    )
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum TemplateError {
    #[error("no template for {kind} in locale {locale}")]
    Missing {
        kind: NotificationKind,
        locale: Locale,
    },

    #[error("template for {kind} in locale {locale} does not include the link")]
    MissingLink {
        kind: NotificationKind,
        locale: Locale,
    },
}

const BUILTIN: &[(NotificationKind, Locale, Template)] = &[
    (
        NotificationKind::InvoiceRequested,
        Locale::En,
        Template {
            subject: "Invoice requested for job {job_ref}",
            body: "Hello {recipient_name},\n\n\
                   Please upload your invoice and supporting documents for job {job_ref} \
                   ({amount}) before {due_date}:\n\n{link}\n\n\
                   The link can be used once.",
        },
    ),
    (
        NotificationKind::InvoiceRequested,
        Locale::Fr,
        Template {
            subject: "Facture demandée pour le job {job_ref}",
            body: "Bonjour {recipient_name},\n\n\
                   Merci de déposer votre facture et vos justificatifs pour le job {job_ref} \
                   ({amount}) avant le {due_date} :\n\n{link}\n\n\
                   Ce lien n'est utilisable qu'une seule fois.",
        },
    ),
    (
        NotificationKind::InvoiceRequested,
        Locale::Es,
        Template {
            subject: "Factura solicitada para el trabajo {job_ref}",
            body: "Hola {recipient_name},\n\n\
                   Por favor suba su factura y los documentos del trabajo {job_ref} \
                   ({amount}) antes del {due_date}:\n\n{link}\n\n\
                   El enlace solo puede usarse una vez.",
        },
    ),
    (
        NotificationKind::PaymentRequested,
        Locale::En,
        Template {
            subject: "Payment due for job {job_ref}",
            body: "Hello {recipient_name},\n\n\
                   The provider has submitted the invoice for job {job_ref} ({amount}). \
                   Review the documents and confirm payment here:\n\n{link}",
        },
    ),
    (
        NotificationKind::PaymentRequested,
        Locale::Fr,
        Template {
            subject: "Paiement à effectuer pour le job {job_ref}",
            body: "Bonjour {recipient_name},\n\n\
                   Le prestataire a transmis la facture du job {job_ref} ({amount}). \
                   Consultez les documents et confirmez le paiement ici :\n\n{link}",
        },
    ),
    (
        NotificationKind::PaymentRequested,
        Locale::Es,
        Template {
            subject: "Pago pendiente del trabajo {job_ref}",
            body: "Hola {recipient_name},\n\n\
                   El proveedor ha enviado la factura del trabajo {job_ref} ({amount}). \
                   Revise los documentos y confirme el pago aquí:\n\n{link}",
        },
    ),
    (
        NotificationKind::PaymentConfirmed,
        Locale::En,
        Template {
            subject: "Payment confirmed for job {job_ref}",
            body: "Hello {recipient_name},\n\n\
                   Payment of {amount} for job {job_ref} has been confirmed.",
        },
    ),
    (
        NotificationKind::PaymentConfirmed,
        Locale::Fr,
        Template {
            subject: "Paiement confirmé pour le job {job_ref}",
            body: "Bonjour {recipient_name},\n\n\
                   Le paiement de {amount} pour le job {job_ref} a été confirmé.",
        },
    ),
    (
        NotificationKind::PaymentConfirmed,
        Locale::Es,
        Template {
            subject: "Pago confirmado del trabajo {job_ref}",
            body: "Hola {recipient_name},\n\n\
                   Se ha confirmado el pago de {amount} del trabajo {job_ref}.",
        },
    ),
];
