//! Store Adapter and Index Lifecycle Manager over three backends.
//!
//! [`EmbeddingStore`] owns the backend-agnostic pipeline (embedding, `k`
//! validation, score threshold, ordering); [`Backend`] implementations only
//! insert and search vectors natively:
//!
//! - [`MemoryBackend`]: exact scan, in-process filter evaluation.
//! - [`LanceBackend`]: LanceDB tables with SQL predicates and IVF-HNSW indexes.
//! - [`AzureSearchBackend`]: Azure AI Search REST with OData filters.

use std::sync::Arc;

use serde::Deserialize;

use selfquery_core::{Embedder, IndexConfig, IndexManager, Result, VectorStore};

pub mod azure;
pub mod backend;
pub mod lance;
pub mod memory;
pub mod score;
pub mod store;
pub mod testing;

pub use azure::{AzureSearchBackend, AzureSearchConfig};
pub use backend::{Backend, EmbeddedDocument};
pub use lance::{LanceBackend, LanceConfig};
pub use memory::MemoryBackend;
pub use store::{EmbeddingStore, StoreSettings};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum BackendSettings {
    #[default]
    Memory,
    Lance(LanceConfig),
    Azure(AzureSearchConfig),
}

/// One store bound to one index, seen through both capability traits.
pub struct StoreHandles {
    pub store: Arc<dyn VectorStore>,
    pub indexes: Arc<dyn IndexManager>,
}

fn handles<B: Backend + 'static>(
    backend: Arc<B>,
    embedder: Arc<dyn Embedder>,
    index: IndexConfig,
    settings: StoreSettings,
) -> StoreHandles {
    let store = Arc::new(EmbeddingStore::new(backend, embedder, index).with_settings(settings));
    StoreHandles { store: store.clone(), indexes: store }
}

pub async fn open_store(
    backend: BackendSettings,
    embedder: Arc<dyn Embedder>,
    index: IndexConfig,
    settings: StoreSettings,
) -> Result<StoreHandles> {
    Ok(match backend {
        BackendSettings::Memory => handles(Arc::new(MemoryBackend::new()), embedder, index, settings),
        BackendSettings::Lance(cfg) => handles(Arc::new(LanceBackend::connect(cfg).await?), embedder, index, settings),
        BackendSettings::Azure(cfg) => handles(Arc::new(AzureSearchBackend::new(cfg)), embedder, index, settings),
    })
}
