//! The chunking strategy × embedding model grid under evaluation.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkStrategy {
    Fixed,
    Semantic,
    Hierarchical,
}

impl ChunkStrategy {
    pub const ALL: [ChunkStrategy; 3] = [
        ChunkStrategy::Fixed,
        ChunkStrategy::Semantic,
        ChunkStrategy::Hierarchical,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ChunkStrategy::Fixed => "fixed",
            ChunkStrategy::Semantic => "semantic",
            ChunkStrategy::Hierarchical => "hierarchical",
        }
    }
}

impl fmt::Display for ChunkStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChunkStrategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|v| v.as_str() == s)
            .ok_or_else(|| Error::InvalidInput(format!("'{}' is not a valid chunk strategy", s)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EmbedModel {
    #[serde(rename = "voyage-3-large")]
    Voyage3Large,
    #[serde(rename = "voyage-3.5")]
    Voyage3_5,
    #[serde(rename = "voyage-law-2")]
    VoyageLaw2,
}

impl EmbedModel {
    pub const ALL: [EmbedModel; 3] = [
        EmbedModel::Voyage3Large,
        EmbedModel::Voyage3_5,
        EmbedModel::VoyageLaw2,
    ];

    /// Model name as the provider knows it.
    pub fn as_str(&self) -> &'static str {
        match self {
            EmbedModel::Voyage3Large => "voyage-3-large",
            EmbedModel::Voyage3_5 => "voyage-3.5",
            EmbedModel::VoyageLaw2 => "voyage-law-2",
        }
    }
}

impl fmt::Display for EmbedModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EmbedModel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|v| v.as_str() == s)
            .ok_or_else(|| Error::InvalidInput(format!("'{}' is not a valid embedding model", s)))
    }
}

/// One point in the grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Variant {
    pub strategy: ChunkStrategy,
    pub embed_model: EmbedModel,
}

impl Variant {
    pub fn new(strategy: ChunkStrategy, embed_model: EmbedModel) -> Self {
        Self {
            strategy,
            embed_model,
        }
    }

    /// Results-store key and vector table name for this variant.
    pub fn key(&self) -> String {
        variant_key(self.strategy, self.embed_model)
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

/// `"{strategy}_{model}"`, lowercased, with everything outside `[a-z0-9]`
/// replaced by `_`.
pub fn variant_key(strategy: ChunkStrategy, model: EmbedModel) -> String {
    format!("{}_{}", strategy.as_str(), model.as_str())
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_lowercase() || c.is_ascii_digit() { c } else { '_' })
        .collect()
}

/// Every variant, strategy-major.
pub fn all_variants() -> Vec<Variant> {
    ChunkStrategy::ALL
        .into_iter()
        .flat_map(|s| EmbedModel::ALL.into_iter().map(move |m| Variant::new(s, m)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_variant_key_examples() {
        assert_eq!(
            variant_key(ChunkStrategy::Fixed, EmbedModel::Voyage3Large),
            "fixed_voyage_3_large"
        );
        assert_eq!(
            variant_key(ChunkStrategy::Semantic, EmbedModel::Voyage3_5),
            "semantic_voyage_3_5"
        );
        assert_eq!(
            variant_key(ChunkStrategy::Hierarchical, EmbedModel::VoyageLaw2),
            "hierarchical_voyage_law_2"
        );
    }

    #[test]
    fn test_all_keys_unique() {
        let keys: HashSet<String> = all_variants().iter().map(Variant::key).collect();
        assert_eq!(keys.len(), 9);
    }

    #[test]
    fn test_keys_are_valid_identifiers() {
        for v in all_variants() {
            let key = v.key();
            let first = key.chars().next().unwrap();
            assert!(first.is_ascii_lowercase(), "{} must start with a letter", key);
            assert!(
                key.chars()
                    .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_'),
                "{} is not a valid identifier",
                key
            );
        }
    }

    #[test]
    fn test_enumeration_order_is_strategy_major() {
        let variants = all_variants();
        assert_eq!(variants.len(), 9);
        assert_eq!(variants[0].key(), "fixed_voyage_3_large");
        assert_eq!(variants[1].key(), "fixed_voyage_3_5");
        assert_eq!(variants[3].key(), "semantic_voyage_3_large");
        assert_eq!(variants[8].key(), "hierarchical_voyage_law_2");
        assert_eq!(variants, all_variants());
    }

    #[test]
    fn test_parse_wire_values() {
        assert_eq!("semantic".parse::<ChunkStrategy>().unwrap(), ChunkStrategy::Semantic);
        assert_eq!("voyage-3.5".parse::<EmbedModel>().unwrap(), EmbedModel::Voyage3_5);
        assert!("invalid".parse::<ChunkStrategy>().is_err());
        assert!("voyage_3_5".parse::<EmbedModel>().is_err());
    }

    #[test]
    fn test_serde_matches_wire_values() {
        assert_eq!(
            serde_json::to_string(&EmbedModel::VoyageLaw2).unwrap(),
            "\"voyage-law-2\""
        );
        assert_eq!(
            serde_json::to_string(&ChunkStrategy::Hierarchical).unwrap(),
            "\"hierarchical\""
        );
    }
}
