use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

use super::types::ContentType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SizePolicy {
    pub max_chars: usize,
    pub overlap_chars: usize,
}

impl SizePolicy {
    pub const fn new(max_chars: usize, overlap_chars: usize) -> Self {
        Self {
            max_chars,
            overlap_chars,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SizePolicies {
    pub definition: SizePolicy,
    pub covenant: SizePolicy,
    pub pricing: SizePolicy,
    pub event_of_default: SizePolicy,
    pub representation: SizePolicy,
    pub compliance_calculation: SizePolicy,
    pub general: SizePolicy,
}

impl Default for SizePolicies {
    fn default() -> Self {
        Self {
            definition: SizePolicy::new(1200, 175),
            covenant: SizePolicy::new(1500, 225),
            pricing: SizePolicy::new(600, 100),
            event_of_default: SizePolicy::new(1500, 200),
            representation: SizePolicy::new(1000, 150),
            compliance_calculation: SizePolicy::new(1000, 150),
            general: SizePolicy::new(1000, 150),
        }
    }
}

impl SizePolicies {
    /// Tables are never split; they report the general policy nominally.
    pub fn for_type(&self, content_type: ContentType) -> SizePolicy {
        match content_type {
            ContentType::Definition => self.definition,
            ContentType::Covenant => self.covenant,
            ContentType::Pricing => self.pricing,
            ContentType::EventOfDefault => self.event_of_default,
            ContentType::Representation => self.representation,
            ContentType::ComplianceCalculation => self.compliance_calculation,
            ContentType::Table | ContentType::General => self.general,
        }
    }

    fn entries(&self) -> [(&'static str, SizePolicy); 7] {
        [
            ("definition", self.definition),
            ("covenant", self.covenant),
            ("pricing", self.pricing),
            ("event_of_default", self.event_of_default),
            ("representation", self.representation),
            ("compliance_calculation", self.compliance_calculation),
            ("general", self.general),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkerConfig {
    pub min_chunk_chars: usize,
    pub policies: SizePolicies,
    pub table_context_chars: usize,
    pub preview_chars: usize,
    pub max_previews_per_reference: usize,
    pub max_linked_references: usize,
    pub max_defined_terms: usize,
    pub chars_per_token: f64,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            min_chunk_chars: 80,
            policies: SizePolicies::default(),
            table_context_chars: 300,
            preview_chars: 200,
            max_previews_per_reference: 2,
            max_linked_references: 3,
            max_defined_terms: 10,
            chars_per_token: 4.0,
        }
    }
}

impl ChunkerConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read chunker config {}", path.display()))?;
        let config: Self = serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse chunker config {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.min_chunk_chars == 0 {
            bail!("min_chunk_chars must be greater than zero");
        }
        if !(self.chars_per_token.is_finite() && self.chars_per_token > 0.0) {
            bail!(
                "chars_per_token must be a positive number, got {}",
                self.chars_per_token
            );
        }
        if self.max_previews_per_reference == 0 {
            bail!("max_previews_per_reference must be greater than zero");
        }

        for (name, policy) in self.policies.entries() {
            if policy.max_chars == 0 {
                bail!("{name}: max_chars must be greater than zero");
            }
            if policy.overlap_chars * 2 >= policy.max_chars {
                bail!(
                    "{name}: overlap_chars {} must be less than half of max_chars {}",
                    policy.overlap_chars,
                    policy.max_chars
                );
            }
            if self.min_chunk_chars * 4 > policy.max_chars {
                bail!(
                    "{name}: min_chunk_chars {} must not exceed a quarter of max_chars {}",
                    self.min_chunk_chars,
                    policy.max_chars
                );
            }
        }

        Ok(())
    }
}

/// Characters over the configured characters-per-token ratio, rounded up.
pub fn estimate_tokens(char_count: usize, chars_per_token: f64) -> usize {
    (char_count as f64 / chars_per_token).ceil() as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_policy_table() {
        let config = ChunkerConfig::default();
        config.validate().expect("defaults are valid");

        let pricing = config.policies.for_type(ContentType::Pricing);
        assert_eq!(pricing, SizePolicy::new(600, 100));
        let representation = config.policies.for_type(ContentType::Representation);
        assert_eq!(representation, config.policies.general);
        assert_eq!(config.min_chunk_chars, 80);
    }

    #[test]
    fn partial_json_keeps_remaining_defaults() {
        let config: ChunkerConfig = serde_json::from_str(
            r#"{"min_chunk_chars": 60, "policies": {"pricing": {"max_chars": 800, "overlap_chars": 120}}}"#,
        )
        .expect("parse config");

        assert_eq!(config.min_chunk_chars, 60);
        assert_eq!(config.policies.pricing.max_chars, 800);
        assert_eq!(config.policies.covenant, SizePolicy::new(1500, 225));
        assert_eq!(config.preview_chars, 200);
    }

    #[test]
    fn rejects_overlap_that_swallows_the_budget() {
        let mut config = ChunkerConfig::default();
        config.policies.general = SizePolicy::new(400, 250);

        let err = config.validate().expect_err("overlap too large");
        assert!(err.to_string().contains("general"));
    }

    #[test]
    fn token_estimate_rounds_up() {
        let config = ChunkerConfig::default();
        assert_eq!(estimate_tokens(9, config.chars_per_token), 3);
        assert_eq!(estimate_tokens(0, config.chars_per_token), 0);
    }
}
