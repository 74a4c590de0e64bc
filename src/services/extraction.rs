//! Extraction client: fixed prompt contracts over a [`TextGenerator`], with the
//! retry/backoff policy applied uniformly to every provider.

use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::error::{ExtractionError, ProviderError};
use crate::services::providers::TextGenerator;

const PROPOSAL_SYSTEM_PROMPT: &str =
    "You are an expert in vendor proposal parsing. Respond ONLY with JSON.";
const SCORING_SYSTEM_PROMPT: &str =
    "You are an expert procurement evaluator. Respond ONLY with JSON.";
const COMPARISON_SYSTEM_PROMPT: &str = "You are a senior procurement consultant.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Exponential backoff for a 1-indexed attempt: `base * 2^attempt`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(2u32.saturating_pow(attempt))
    }

    /// Wait before the next attempt. Rate limits honour the provider hint when given.
    pub fn delay_for(&self, attempt: u32, error: &ProviderError) -> Duration {
        match error {
            ProviderError::RateLimited { retry_after: Some(hint) } => *hint,
            _ => self.backoff(attempt),
        }
    }
}

/// Structured data extracted from a vendor's reply.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StructuredProposal {
    pub total_price: Option<f64>,
    pub delivery_days: Option<f64>,
    pub payment_terms: Option<String>,
    pub warranty: Option<String>,
    pub items: Vec<ExtractedItem>,
    pub summary: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExtractedItem {
    pub item_name: Option<String>,
    pub quantity: Option<f64>,
    pub unit_price: Option<f64>,
    pub total_price: Option<f64>,
    pub specifications: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProposalScore {
    pub score: f64,
    pub reasoning: String,
}

/// What the scoring and comparison prompts see of a proposal.
#[derive(Debug, Clone)]
pub struct ProposalDigest {
    pub vendor_name: String,
    pub total_price: Option<f64>,
    pub delivery_days: Option<i32>,
    pub payment_terms: Option<String>,
    pub warranty: Option<String>,
    pub summary: Option<String>,
    pub score: Option<f64>,
}

impl ProposalDigest {
    fn render(&self) -> String {
        fn or_na<T: ToString>(value: &Option<T>) -> String {
            value.as_ref().map(|v| v.to_string()).unwrap_or_else(|| "N/A".to_string())
        }

        let mut text = format!(
            "Vendor: {}\nPrice: ${}\nDelivery: {} days\nPayment Terms: {}\nWarranty: {}",
            self.vendor_name,
            or_na(&self.total_price),
            or_na(&self.delivery_days),
            or_na(&self.payment_terms),
            or_na(&self.warranty),
        );
        if let Some(summary) = &self.summary {
            text.push_str(&format!("\nSummary: {}", summary));
        }
        if self.score.is_some() {
            text.push_str(&format!("\nScore: {}", or_na(&self.score)));
        }
        text
    }
}

#[derive(Clone)]
pub struct ExtractionClient {
    generator: Arc<dyn TextGenerator>,
    retry: RetryPolicy,
}

impl ExtractionClient {
    pub fn new(generator: Arc<dyn TextGenerator>, retry: RetryPolicy) -> Self {
        Self { generator, retry }
    }

    /// Call the provider, retrying transport and rate-limit failures up to the budget.
    pub async fn generate(&self, prompt: &str, system_prompt: &str) -> Result<String, ExtractionError> {
        let max_attempts = self.retry.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            match self.generator.generate(prompt, system_prompt).await {
                Ok(text) => return Ok(text),
                Err(err) if attempt < max_attempts => {
                    let wait = self.retry.delay_for(attempt, &err);
                    if err.is_rate_limit() {
                        warn!(
                            provider = self.generator.name(),
                            attempt,
                            max_attempts,
                            wait_secs = wait.as_secs_f64(),
                            "Rate limit hit, retrying"
                        );
                    } else {
                        warn!(
                            provider = self.generator.name(),
                            attempt,
                            max_attempts,
                            wait_secs = wait.as_secs_f64(),
                            error = %err,
                            "Extraction call failed, retrying"
                        );
                    }
                    tokio::time::sleep(wait).await;
                    attempt += 1;
                }
                Err(err) => {
                    error!(
                        provider = self.generator.name(),
                        attempts = attempt,
                        error = %err,
                        "Extraction call failed after retries"
                    );
                    return Err(ExtractionError::Provider { attempts: attempt, source: err });
                }
            }
        }
    }

    /// Generate and parse a JSON reply. Malformed output fails without another call.
    async fn generate_json<T: DeserializeOwned>(
        &self,
        prompt: &str,
        system_prompt: &str,
    ) -> Result<T, ExtractionError> {
        let raw = self.generate(prompt, system_prompt).await?;
        parse_json_reply(&raw)
    }

    /// Parse a vendor reply into structured proposal data.
    pub async fn extract_proposal(
        &self,
        email_body: &str,
        request_context: &str,
    ) -> Result<StructuredProposal, ExtractionError> {
        let prompt = format!(
            r#"Parse the following vendor proposal email and extract structured data.

RFP Context: {request_context}

Vendor Email: {email_body}

Respond with ONLY a JSON object with this structure:
{{
  "totalPrice": numeric,
  "deliveryDays": number,
  "paymentTerms": "string",
  "warranty": "string",
  "items": [
    {{
      "itemName": "string",
      "quantity": number,
      "unitPrice": number,
      "totalPrice": number,
      "specifications": "string"
    }}
  ],
  "summary": "string"
}}"#
        );

        let proposal: StructuredProposal = self.generate_json(&prompt, PROPOSAL_SYSTEM_PROMPT).await?;
        info!(
            items = proposal.items.len(),
            total_price = ?proposal.total_price,
            "Extracted proposal"
        );
        Ok(proposal)
    }

    /// Score one proposal against the request's requirements, 0 to 100.
    pub async fn score_proposal(
        &self,
        proposal: &ProposalDigest,
        requirements: &str,
    ) -> Result<ProposalScore, ExtractionError> {
        let prompt = format!(
            r#"Score this vendor proposal against the RFP on a scale of 0-100.

RFP Requirements: {requirements}

Proposal:
{proposal}

Respond ONLY with:
{{ "score": number, "reasoning": "string" }}"#,
            proposal = proposal.render(),
        );

        let mut score: ProposalScore = self.generate_json(&prompt, SCORING_SYSTEM_PROMPT).await?;
        if !score.score.is_finite() {
            return Err(ExtractionError::Format {
                reason: "score is not a finite number".to_string(),
                raw: score.score.to_string(),
            });
        }
        score.score = score.score.clamp(0.0, 100.0);
        Ok(score)
    }

    /// Free-text recommendation across all proposals, in one call.
    pub async fn recommend(
        &self,
        proposals: &[ProposalDigest],
        requirements: &str,
    ) -> Result<String, ExtractionError> {
        let summary = proposals
            .iter()
            .map(ProposalDigest::render)
            .collect::<Vec<_>>()
            .join("\n\n");

        let prompt = format!(
            "Compare these vendor proposals and give a recommendation.\n\nRFP Requirements: {}\n\nProposals:\n{}",
            requirements, summary
        );

        self.generate(&prompt, COMPARISON_SYSTEM_PROMPT).await
    }
}

/// Remove a surrounding Markdown code fence (```json ... ``` or ``` ... ```).
pub fn strip_code_fences(text: &str) -> &str {
    let mut cleaned = text.trim();
    if let Some(rest) = cleaned.strip_prefix("```json") {
        cleaned = rest;
    } else if let Some(rest) = cleaned.strip_prefix("```") {
        cleaned = rest;
    }
    if let Some(rest) = cleaned.strip_suffix("```") {
        cleaned = rest;
    }
    cleaned.trim()
}

pub fn parse_json_reply<T: DeserializeOwned>(raw: &str) -> Result<T, ExtractionError> {
    serde_json::from_str(strip_code_fences(raw)).map_err(|e| {
        error!(error = %e, response = %preview(raw), "Model returned invalid JSON");
        ExtractionError::Format {
            reason: e.to_string(),
            raw: raw.to_string(),
        }
    })
}

fn preview(text: &str) -> &str {
    match text.char_indices().nth(200) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockGenerator;

    fn client(generator: &Arc<MockGenerator>) -> ExtractionClient {
        ExtractionClient::new(
            generator.clone(),
            RetryPolicy {
                max_attempts: 3,
                base_delay: Duration::from_millis(10),
            },
        )
    }

    #[test]
    fn strips_json_and_bare_fences() {
        assert_eq!(strip_code_fences("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fences("```\n{\"a\":1}```"), "{\"a\":1}");
        assert_eq!(strip_code_fences("  {\"a\":1}  "), "{\"a\":1}");
    }

    #[test]
    fn backoff_doubles_from_first_attempt() {
        let policy = RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
        };
        assert_eq!(policy.backoff(1), Duration::from_secs(2));
        assert_eq!(policy.backoff(2), Duration::from_secs(4));
        assert_eq!(policy.backoff(3), Duration::from_secs(8));
    }

    #[test]
    fn rate_limit_hint_overrides_backoff() {
        let policy = RetryPolicy::default();
        let hinted = ProviderError::RateLimited {
            retry_after: Some(Duration::from_secs(30)),
        };
        let unhinted = ProviderError::RateLimited { retry_after: None };
        let transport = ProviderError::Transport("reset".to_string());

        assert_eq!(policy.delay_for(1, &hinted), Duration::from_secs(30));
        assert_eq!(policy.delay_for(1, &unhinted), Duration::from_secs(2));
        assert_eq!(policy.delay_for(2, &transport), Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_after_two_rate_limits() {
        let generator = Arc::new(
            MockGenerator::new()
                .with_rate_limit(None)
                .with_rate_limit(None)
                .with_response(r#"{"totalPrice": 1200, "items": [], "summary": "ok"}"#),
        );

        let proposal = client(&generator)
            .extract_proposal("body", "[]")
            .await
            .expect("third attempt should succeed");

        assert_eq!(proposal.total_price, Some(1200.0));
        assert_eq!(generator.call_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_retry_budget() {
        let generator = Arc::new(MockGenerator::new().always_rate_limited());

        let err = client(&generator)
            .generate("prompt", "system")
            .await
            .expect_err("should exhaust the budget");

        assert!(matches!(
            err,
            ExtractionError::Provider { attempts: 3, source: ProviderError::RateLimited { .. } }
        ));
        assert_eq!(generator.call_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn waits_for_the_advertised_hint() {
        let generator = Arc::new(
            MockGenerator::new()
                .with_rate_limit(Some(Duration::from_secs(7)))
                .with_response("done"),
        );

        let started = tokio::time::Instant::now();
        let text = client(&generator).generate("prompt", "system").await.unwrap();

        assert_eq!(text, "done");
        assert!(started.elapsed() >= Duration::from_secs(7));
    }

    #[tokio::test]
    async fn malformed_output_is_not_retried() {
        let generator = Arc::new(
            MockGenerator::new()
                .with_response("Sure! Here is the proposal you asked for.")
                .with_response(r#"{"totalPrice": 5}"#),
        );

        let err = client(&generator)
            .extract_proposal("body", "[]")
            .await
            .expect_err("non-JSON must fail");

        assert!(err.is_format());
        assert_eq!(generator.call_count(), 1);
    }

    #[tokio::test]
    async fn null_item_names_are_accepted() {
        let generator = Arc::new(MockGenerator::new().with_response(
            r#"{"totalPrice": 300, "items": [{"itemName": null, "quantity": 3}, {"itemName": "Chair"}]}"#,
        ));

        let proposal = client(&generator)
            .extract_proposal("Three chairs, $300 total.", r#"[{"itemName":"Chair"}]"#)
            .await
            .expect("null names should not fail the reply");

        assert_eq!(proposal.items.len(), 2);
        assert_eq!(proposal.items[0].item_name, None);
        assert_eq!(proposal.items[1].item_name.as_deref(), Some("Chair"));

        let prompts = generator.prompts();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("Vendor Email: Three chairs, $300 total."));
        assert!(prompts[0].contains(r#"RFP Context: [{"itemName":"Chair"}]"#));
    }

    #[tokio::test]
    async fn scores_are_clamped_to_range() {
        let generator = Arc::new(
            MockGenerator::new().with_response(r#"```json
{"score": 130, "reasoning": "excellent"}
```"#),
        );
        let digest = ProposalDigest {
            vendor_name: "Acme".to_string(),
            total_price: Some(10.0),
            delivery_days: Some(5),
            payment_terms: None,
            warranty: None,
            summary: None,
            score: None,
        };

        let score = client(&generator).score_proposal(&digest, "[]").await.unwrap();
        assert_eq!(score.score, 100.0);
        assert_eq!(score.reasoning, "excellent");
    }
}
