use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Optional external processing hook (OCR / ledger integration) that may
/// replace a stored document's URL with a canonical reference.
///
/// Best effort: [`DocumentHook::enrich`] always returns a reference, falling
/// back to the direct storage URL when the hook is disabled, failing, or its
/// breaker is open.
pub struct DocumentHook {
    http: Client,
    url: Option<String>,
    breaker: Mutex<Breaker>,
    failure_threshold: u32,
    cooldown: Duration,
}

#[derive(Default)]
struct Breaker {
    consecutive_failures: u32,
    open_until: Option<Instant>,
}

#[derive(Serialize)]
struct HookRequest<'a> {
    job_id: Uuid,
    url: &'a str,
}

#[derive(Deserialize)]
struct HookResponse {
    url: String,
}

impl DocumentHook {
    pub fn new(
        url: Option<String>,
        timeout: Duration,
        failure_threshold: u32,
        cooldown: Duration,
    ) -> Result<Self, HookError> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            url: url.filter(|u| !u.trim().is_empty()),
            breaker: Mutex::new(Breaker::default()),
            failure_threshold: failure_threshold.max(1),
            cooldown,
        })
    }

    pub fn disabled() -> Self {
        Self {
            http: Client::new(),
            url: None,
            breaker: Mutex::new(Breaker::default()),
            failure_threshold: 1,
            cooldown: Duration::ZERO,
        }
    }

    /// Canonical reference for a stored document.
    pub async fn enrich(&self, job_id: Uuid, direct_url: &str) -> String {
        let Some(hook_url) = self.url.as_deref() else {
            return direct_url.to_string();
        };

        if self.is_open() {
            tracing::warn!(job_id = %job_id, "Document hook circuit open, using direct reference");
            metrics::counter!("document_hook_fallbacks_total", "reason" => "circuit_open")
                .increment(1);
            return direct_url.to_string();
        }

        match self.call(hook_url, job_id, direct_url).await {
            Ok(canonical) => {
                self.record_success();
                canonical
            }
            Err(e) => {
                self.record_failure();
                tracing::warn!(
                    job_id = %job_id,
                    error = %e,
                    "Downstream integration failure, using direct reference"
                );
                metrics::counter!("document_hook_fallbacks_total", "reason" => "error")
                    .increment(1);
                direct_url.to_string()
            }
        }
    }

    async fn call(&self, hook_url: &str, job_id: Uuid, direct_url: &str) -> Result<String, HookError> {
        let response = self
            .http
            .post(hook_url)
            .json(&HookRequest {
                job_id,
                url: direct_url,
            })
            .send()
            .await?
            .error_for_status()?;

        let body: HookResponse = response.json().await?;
        if body.url.trim().is_empty() {
            return Err(HookError::EmptyReference);
        }
        Ok(body.url)
    }

    fn is_open(&self) -> bool {
        let mut breaker = self.breaker.lock().unwrap_or_else(PoisonError::into_inner);
        match breaker.open_until {
            Some(until) if Instant::now() < until => true,
            Some(_) => {
                // Half-open: let the next call through.
                breaker.open_until = None;
                false
            }
            None => false,
        }
    }

    fn record_success(&self) {
        let mut breaker = self.breaker.lock().unwrap_or_else(PoisonError::into_inner);
        breaker.consecutive_failures = 0;
        breaker.open_until = None;
    }

    fn record_failure(&self) {
        let mut breaker = self.breaker.lock().unwrap_or_else(PoisonError::into_inner);
        breaker.consecutive_failures += 1;
        if breaker.consecutive_failures >= self.failure_threshold {
            breaker.open_until = Some(Instant::now() + self.cooldown);
            breaker.consecutive_failures = 0;
            tracing::warn!(cooldown_secs = self.cooldown.as_secs(), "Document hook circuit opened");
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum HookError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Hook returned an empty reference")]
    EmptyReference,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn disabled_hook_returns_direct_url() {
        let hook = DocumentHook::disabled();
        let url = hook.enrich(Uuid::new_v4(), "https://files/x.pdf").await;
        assert_eq!(url, "https://files/x.pdf");
    }

    #[tokio::test]
    async fn unreachable_hook_falls_back_and_opens_breaker() {
        // Port 9 (discard) on localhost refuses connections.
        let hook = DocumentHook::new(
            Some("http://127.0.0.1:9/hook".into()),
            Duration::from_millis(500),
            2,
            Duration::from_secs(60),
        )
        .unwrap();

        for _ in 0..2 {
            let url = hook.enrich(Uuid::new_v4(), "https://files/y.pdf").await;
            assert_eq!(url, "https://files/y.pdf");
        }
        assert!(hook.is_open());
    }

    #[test]
    fn breaker_half_opens_after_cooldown() {
        let hook = DocumentHook::new(
            Some("http://127.0.0.1:9/hook".into()),
            Duration::from_millis(100),
            1,
            Duration::ZERO,
        )
        .unwrap();
        hook.record_failure();
        assert!(!hook.is_open());
        hook.record_success();
        assert!(!hook.is_open());
    }
}
