//! Intent-to-retrieval-configuration policy.
//!
//! A query's intent category selects how the store searches for it: how
//! many results, exact scan or approximate index, which distance metric,
//! and how much index refinement. The mapping is a fixed table - the only
//! "policy" here is its content, which is a tuning surface. Broad and
//! comparative intents get larger k, approximate search and more
//! refinement; narrow and statistical intents get exact search and small k.

use serde::{Deserialize, Serialize};

/// How the store should execute a similarity query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexType {
    /// Exhaustive scan over all stored vectors, bypassing any index
    Exact,
    /// Approximate nearest-neighbor search through the trained index
    Approximate,
}

/// Distance metric used when ranking results at query time.
///
/// Independent of the metric the index was trained with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMetric {
    Cosine,
    Euclidean,
    Dot,
}

/// Immutable per-query retrieval tuning, selected by intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrievalConfig {
    pub index_type: IndexType,
    /// Number of results to return; always > 0
    pub k: usize,
    pub distance_metric: DistanceMetric,
    /// Candidate multiplier for two-stage approximate search; always >= 1
    pub refine_factor: usize,
}

/// Supported query intent categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryIntent {
    FactualRetrieval,
    ConceptualExploration,
    ComparativeAnalysis,
    ProceduralGuidance,
    StatisticalLookup,
}

impl QueryIntent {
    /// Parse an intent label. Unknown or empty labels fall back to
    /// `FactualRetrieval`.
    pub fn parse(label: &str) -> Self {
        match label {
            "factual_retrieval" => Self::FactualRetrieval,
            "conceptual_exploration" => Self::ConceptualExploration,
            "comparative_analysis" => Self::ComparativeAnalysis,
            "procedural_guidance" => Self::ProceduralGuidance,
            "statistical_lookup" => Self::StatisticalLookup,
            _ => Self::FactualRetrieval,
        }
    }
}

/// Look up the retrieval configuration for an intent category.
pub fn retrieval_config(intent: QueryIntent) -> RetrievalConfig {
    match intent {
        QueryIntent::FactualRetrieval => RetrievalConfig {
            index_type: IndexType::Exact,
            k: 5,
            distance_metric: DistanceMetric::Cosine,
            refine_factor: 1,
        },
        QueryIntent::ConceptualExploration => RetrievalConfig {
            index_type: IndexType::Approximate,
            k: 12,
            distance_metric: DistanceMetric::Cosine,
            refine_factor: 2,
        },
        QueryIntent::ComparativeAnalysis => RetrievalConfig {
            index_type: IndexType::Approximate,
            k: 15,
            distance_metric: DistanceMetric::Cosine,
            refine_factor: 3,
        },
        QueryIntent::ProceduralGuidance => RetrievalConfig {
            index_type: IndexType::Approximate,
            k: 8,
            distance_metric: DistanceMetric::Cosine,
            refine_factor: 2,
        },
        QueryIntent::StatisticalLookup => RetrievalConfig {
            index_type: IndexType::Exact,
            k: 3,
            distance_metric: DistanceMetric::Cosine,
            refine_factor: 1,
        },
    }
}

/// Look up the retrieval configuration for an intent label.
///
/// Unknown labels resolve to the `factual_retrieval` configuration.
pub fn retrieval_config_for(label: &str) -> RetrievalConfig {
    retrieval_config(QueryIntent::parse(label))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_intent_falls_back_to_factual() {
        assert_eq!(
            retrieval_config_for("unknown_intent"),
            retrieval_config_for("factual_retrieval")
        );
        assert_eq!(
            retrieval_config_for(""),
            retrieval_config(QueryIntent::FactualRetrieval)
        );
    }

    #[test]
    fn test_configs_are_well_formed() {
        for intent in [
            QueryIntent::FactualRetrieval,
            QueryIntent::ConceptualExploration,
            QueryIntent::ComparativeAnalysis,
            QueryIntent::ProceduralGuidance,
            QueryIntent::StatisticalLookup,
        ] {
            let config = retrieval_config(intent);
            assert!(config.k > 0);
            assert!(config.refine_factor >= 1);
        }
    }

    #[test]
    fn test_broad_intents_use_the_index() {
        let broad = retrieval_config(QueryIntent::ComparativeAnalysis);
        let narrow = retrieval_config(QueryIntent::StatisticalLookup);

        assert_eq!(broad.index_type, IndexType::Approximate);
        assert_eq!(narrow.index_type, IndexType::Exact);
        assert!(broad.k > narrow.k);
        assert!(broad.refine_factor > narrow.refine_factor);
    }
}
