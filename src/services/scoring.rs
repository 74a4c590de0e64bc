use std::sync::Arc;

use tracing::{info, warn};
use uuid::Uuid;

use crate::error::ServiceError;
use crate::services::extraction::{ExtractionClient, ProposalDigest};
use crate::services::store::{ProcurementStore, ProposalRecord};

pub const NEUTRAL_SCORE: f64 = 50.0;
pub const EVALUATION_UNAVAILABLE: &str =
    "Unable to evaluate this proposal automatically. Please review it manually.";
pub const RECOMMENDATION_UNAVAILABLE: &str =
    "Unable to generate an AI comparison right now. Please review the proposals manually or try again later.";
pub const NO_PROPOSALS: &str = "No proposals submitted yet.";

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PriceRange {
    pub min: f64,
    pub max: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoredProposal {
    pub record: ProposalRecord,
    pub score: f64,
    pub reasoning: String,
    /// False when the neutral fallback was substituted.
    pub evaluated: bool,
}

impl ScoredProposal {
    pub fn proposal_id(&self) -> Uuid {
        self.record.proposal.id
    }

    fn digest(&self) -> ProposalDigest {
        ProposalDigest {
            score: Some(self.score),
            ..digest(&self.record)
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Comparison {
    pub request_id: Uuid,
    pub total_proposals: usize,
    pub price_range: PriceRange,
    pub avg_score: f64,
    /// Highest score first; equal scores keep submission order.
    pub ranked_proposals: Vec<ScoredProposal>,
    pub recommendation_text: String,
    pub recommended_proposal: Option<ScoredProposal>,
}

impl Comparison {
    fn empty(request_id: Uuid) -> Self {
        Self {
            request_id,
            total_proposals: 0,
            price_range: PriceRange::default(),
            avg_score: 0.0,
            ranked_proposals: Vec::new(),
            recommendation_text: NO_PROPOSALS.to_string(),
            recommended_proposal: None,
        }
    }
}

fn digest(record: &ProposalRecord) -> ProposalDigest {
    let p = &record.proposal;
    ProposalDigest {
        vendor_name: record.vendor_name.clone(),
        total_price: p.total_price,
        delivery_days: p.delivery_days,
        payment_terms: p.payment_terms.clone(),
        warranty: p.warranty.clone(),
        summary: p.ai_summary.clone(),
        score: p.ai_score,
    }
}

/// Min and max total price; a missing price counts as 0.
pub fn price_range(proposals: &[ScoredProposal]) -> PriceRange {
    let mut prices = proposals
        .iter()
        .map(|p| p.record.proposal.total_price.unwrap_or(0.0));
    let Some(first) = prices.next() else {
        return PriceRange::default();
    };
    prices.fold(PriceRange { min: first, max: first }, |range, price| PriceRange {
        min: range.min.min(price),
        max: range.max.max(price),
    })
}

pub fn average_score(proposals: &[ScoredProposal]) -> f64 {
    if proposals.is_empty() {
        return 0.0;
    }
    proposals.iter().map(|p| p.score).sum::<f64>() / proposals.len() as f64
}

/// Strictly highest score wins; the first seen keeps ties.
pub fn pick_recommended(proposals: &[ScoredProposal]) -> Option<&ScoredProposal> {
    proposals.iter().fold(None, |best, p| match best {
        Some(b) if p.score <= b.score => Some(b),
        _ => Some(p),
    })
}

#[derive(Clone)]
pub struct ComparisonService {
    store: Arc<dyn ProcurementStore>,
    extraction: ExtractionClient,
}

impl ComparisonService {
    pub fn new(store: Arc<dyn ProcurementStore>, extraction: ExtractionClient) -> Self {
        Self { store, extraction }
    }

    /// Score every proposal for a request and produce a recommendation.
    ///
    /// Extraction failures degrade the content (neutral score, fixed text) but
    /// never fail the comparison.
    pub async fn compare(&self, request_id: Uuid) -> Result<Comparison, ServiceError> {
        let request = self
            .store
            .find_request(request_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Request {}", request_id)))?;

        let mut records = self.store.proposals_for_request(request_id).await?;
        if records.is_empty() {
            return Ok(Comparison::empty(request_id));
        }
        // Stored newest first; evaluate in submission order.
        records.reverse();

        let requirements = request.requirements_context();
        let mut scored = Vec::with_capacity(records.len());
        for record in records {
            scored.push(self.score_one(record, &requirements).await);
        }

        let digests: Vec<ProposalDigest> = scored.iter().map(ScoredProposal::digest).collect();
        let recommendation_text = match self.extraction.recommend(&digests, &requirements).await {
            Ok(text) => text,
            Err(e) => {
                warn!(%request_id, error = %e, "Recommendation unavailable, using fallback text");
                RECOMMENDATION_UNAVAILABLE.to_string()
            }
        };

        let recommended_proposal = pick_recommended(&scored).cloned();
        let price_range = price_range(&scored);
        let avg_score = average_score(&scored);

        let mut ranked_proposals = scored;
        ranked_proposals.sort_by(|a, b| b.score.total_cmp(&a.score));

        info!(
            %request_id,
            total = ranked_proposals.len(),
            avg_score,
            recommended = ?recommended_proposal.as_ref().map(ScoredProposal::proposal_id),
            "Proposals compared"
        );

        Ok(Comparison {
            request_id,
            total_proposals: ranked_proposals.len(),
            price_range,
            avg_score,
            ranked_proposals,
            recommendation_text,
            recommended_proposal,
        })
    }

    async fn score_one(&self, record: ProposalRecord, requirements: &str) -> ScoredProposal {
        let proposal_id = record.proposal.id;
        match self.extraction.score_proposal(&digest(&record), requirements).await {
            Ok(score) => {
                if let Err(e) = self.store.record_score(proposal_id, score.score).await {
                    warn!(%proposal_id, error = %e, "Failed to persist proposal score");
                }
                ScoredProposal {
                    record,
                    score: score.score,
                    reasoning: score.reasoning,
                    evaluated: true,
                }
            }
            Err(e) => {
                warn!(%proposal_id, error = %e, "Scoring failed, using neutral score");
                ScoredProposal {
                    record,
                    score: NEUTRAL_SCORE,
                    reasoning: EVALUATION_UNAVAILABLE.to_string(),
                    evaluated: false,
                }
            }
        }
    }
}
