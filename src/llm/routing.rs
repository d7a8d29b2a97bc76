//! Model selection and sampling parameters.
//!
//! Every completion attempt draws a fresh model, temperature and output
//! budget so consecutive messages don't read alike.

use crate::config::LlmConfig;
use crate::error::LlmError;
use rand::Rng;
use rand::seq::IndexedRandom as _;
use std::ops::RangeInclusive;

/// Bounds the per-attempt draw is taken from.
#[derive(Debug, Clone, PartialEq)]
pub struct SamplingRanges {
    pub models: Vec<String>,
    pub temperature: RangeInclusive<f64>,
    pub max_tokens: RangeInclusive<u32>,
}

impl SamplingRanges {
    pub fn from_config(config: &LlmConfig) -> Self {
        Self {
            models: config
                .models
                .iter()
                .map(|model| model.trim().to_string())
                .filter(|model| !model.is_empty())
                .collect(),
            temperature: config.min_temperature..=config.max_temperature,
            max_tokens: config.min_max_tokens..=config.max_max_tokens,
        }
    }

    /// Draw a plan for one attempt. `None` when no model is configured.
    pub fn draw<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<SamplingPlan> {
        let model = self.models.choose(rng)?.clone();
        let temperature = rng.random_range(self.temperature.clone());
        let max_tokens = rng.random_range(self.max_tokens.clone());
        Some(SamplingPlan {
            model,
            temperature,
            max_tokens,
        })
    }
}

impl Default for SamplingRanges {
    fn default() -> Self {
        Self::from_config(&LlmConfig::default())
    }
}

/// Model and sampling parameters for a single attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct SamplingPlan {
    pub model: String,
    pub temperature: f64,
    pub max_tokens: u32,
}

/// Whether an HTTP status code points at a transient provider problem.
pub fn is_retriable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

/// Whether a completion error is likely to clear up on a later attempt.
///
/// Every failure still consumes an attempt; this only feeds the logs.
pub fn is_retriable(error: &LlmError) -> bool {
    match error {
        LlmError::ProviderRequest(_) | LlmError::EmptyResponse => true,
        LlmError::ProviderStatus { .. } => error.status().is_some_and(is_retriable_status),
        LlmError::UnknownModel(_) | LlmError::CompletionFailed(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng as _;
    use rand::rngs::StdRng;

    #[test]
    fn draws_stay_within_ranges() {
        let ranges = SamplingRanges::default();
        let mut rng = StdRng::seed_from_u64(11);

        for _ in 0..500 {
            let plan = ranges.draw(&mut rng).unwrap();
            assert!(ranges.models.contains(&plan.model));
            assert!((0.9..=1.0).contains(&plan.temperature));
            assert!((60..=100).contains(&plan.max_tokens));
        }
    }

    #[test]
    fn every_model_gets_picked_eventually() {
        let ranges = SamplingRanges::default();
        let mut rng = StdRng::seed_from_u64(5);

        let picked: std::collections::HashSet<String> =
            (0..200).filter_map(|_| ranges.draw(&mut rng)).map(|plan| plan.model).collect();
        assert_eq!(picked.len(), ranges.models.len());
    }

    #[test]
    fn no_models_no_plan() {
        let ranges = SamplingRanges {
            models: Vec::new(),
            ..SamplingRanges::default()
        };
        assert!(ranges.draw(&mut StdRng::seed_from_u64(0)).is_none());
    }

    #[test]
    fn blank_model_names_are_dropped() {
        let config = LlmConfig {
            models: vec!["  ".into(), " llama-3.1-8b-instant ".into()],
            ..LlmConfig::default()
        };
        let ranges = SamplingRanges::from_config(&config);
        assert_eq!(ranges.models, vec!["llama-3.1-8b-instant".to_string()]);
    }

    #[test]
    fn rate_limits_and_outages_are_retriable() {
        for status in [429, 500, 502, 503, 504] {
            let error = LlmError::ProviderStatus {
                status,
                message: "try later".into(),
            };
            assert!(is_retriable(&error), "status {status}");
        }
        assert!(is_retriable(&LlmError::ProviderRequest("connection reset".into())));
        assert!(is_retriable(&LlmError::EmptyResponse));
    }

    #[test]
    fn client_errors_are_not_retriable() {
        let unauthorized = LlmError::ProviderStatus {
            status: 401,
            message: "Invalid API Key".into(),
        };
        assert!(!is_retriable(&unauthorized));
        assert!(!is_retriable(&LlmError::UnknownModel("gpt-4o".into())));
        assert!(!is_retriable(&LlmError::CompletionFailed("no choices".into())));
    }
}
