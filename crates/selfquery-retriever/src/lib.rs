//! Self-query retrieval: a language model turns the user's question into a
//! semantic query plus a metadata filter, and a vector store answers it.

pub mod parser;
pub mod prompt;
pub mod retriever;
pub mod translator;

pub use parser::{parse_filter, parse_output, RawQuery, NO_FILTER};
pub use prompt::build_prompt;
pub use retriever::{Retriever, RetrieverConfig};
pub use translator::{QueryTranslator, TranslatorConfig};
