//! Per-stage call profiles and dynamic token budgeting.
//!
//! Each LLM stage has a base output allowance that grows with the size of
//! its input (up to a capped multiplier) and is then clamped to a
//! stage-specific ceiling.

use crate::providers::models::ModelClass;
use crate::types::StageKind;

/// Input chars that add one full unit to the budget multiplier.
const CHARS_PER_SCALE_STEP: usize = 20_000;

/// Largest multiplier applied to a stage's base allowance.
const MAX_SCALE: f64 = 2.5;

/// Static call parameters for one stage.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StageProfile {
    pub base_tokens: usize,
    pub max_tokens: usize,
    pub temperature: f32,
    pub model_class: ModelClass,
}

impl StageProfile {
    pub fn for_stage(stage: StageKind) -> Self {
        use ModelClass::{Fast, Reasoning};
        let (base_tokens, max_tokens, temperature, model_class) = match stage {
            StageKind::Rerank => (800, 1_500, 0.0, Fast),
            StageKind::Summarize => (2_000, 4_000, 0.2, Fast),
            StageKind::Extraction => (1_200, 2_500, 0.2, Fast),
            StageKind::Synthesis => (6_000, 14_000, 0.3, Reasoning),
            StageKind::Speculation => (4_000, 9_000, 0.7, Reasoning),
            StageKind::Assembly => (8_000, 16_000, 0.4, Reasoning),
            StageKind::Validation => (600, 1_500, 0.0, Fast),
        };
        Self {
            base_tokens,
            max_tokens,
            temperature,
            model_class,
        }
    }
}

/// Output-token allowance for `stage` given `content_len` chars of input.
pub fn token_budget(stage: StageKind, content_len: usize) -> usize {
    let profile = StageProfile::for_stage(stage);
    let scale = (1.0 + content_len as f64 / CHARS_PER_SCALE_STEP as f64).min(MAX_SCALE);
    let scaled = (profile.base_tokens as f64 * scale).round() as usize;
    scaled.min(profile.max_tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_small_input_gets_base_budget() {
        assert_eq!(token_budget(StageKind::Synthesis, 0), 6_000);
    }

    #[test]
    fn test_budget_scales_with_content() {
        assert_eq!(token_budget(StageKind::Synthesis, 10_000), 9_000);
    }

    #[test]
    fn test_budget_is_clamped() {
        assert_eq!(token_budget(StageKind::Synthesis, 10_000_000), 14_000);
        assert_eq!(token_budget(StageKind::Assembly, 10_000_000), 16_000);
        for stage in [
            StageKind::Rerank,
            StageKind::Summarize,
            StageKind::Extraction,
            StageKind::Speculation,
            StageKind::Validation,
        ] {
            assert!(token_budget(stage, usize::MAX / 2) <= StageProfile::for_stage(stage).max_tokens);
        }
    }

    #[test]
    fn test_model_classes() {
        assert_eq!(
            StageProfile::for_stage(StageKind::Extraction).model_class,
            ModelClass::Fast
        );
        assert_eq!(
            StageProfile::for_stage(StageKind::Assembly).model_class,
            ModelClass::Reasoning
        );
        assert_eq!(
            StageProfile::for_stage(StageKind::Validation).model_class,
            ModelClass::Fast
        );
    }
}
