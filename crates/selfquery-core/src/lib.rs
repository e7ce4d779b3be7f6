//! Shared vocabulary for self-query retrieval: attribute schemas, the filter
//! tree, structured queries, store options, index definitions, the error
//! taxonomy and the oracle/store traits every other crate programs against.

#![deny(unused_imports)]

pub mod config;
pub mod context;
pub mod error;
pub mod filter;
pub mod http;
pub mod logging;
pub mod traits;
pub mod types;

pub use context::Context;
pub use error::{BatchItemFailure, Error, Result};
pub use filter::{Comparator, FilterExpression, FilterValue, Operator};
pub use traits::{Embedder, IndexManager, LanguageModel, VectorStore};
pub use types::{
    AttributeInfo, AttributeType, DistanceMetric, Document, GraphParams, IndexConfig, Metadata, ScoredDocument,
    SearchOptions, StructuredQuery,
};
