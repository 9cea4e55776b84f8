//! Query system for the security knowledge graph
//!
//! Question-driven retrieval (intent classification feeding the selective
//! retriever) and direct lookups over the ATT&CK graph.

mod intent;
mod lookup;
mod retrieve;

pub use intent::{Intent, IntentClassifier};
pub use lookup::{
    CatalogEntry, FrameworkSummary, GraphQueries, GroupTechnique, KnowledgeBaseStats, TacticTechnique,
    TechniqueDetail,
};
pub use retrieve::{SelectiveRetriever, BROAD_LIMIT, NO_RESULTS, PER_CATEGORY_LIMIT};
