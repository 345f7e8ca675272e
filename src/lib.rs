pub mod core;
pub mod storage;
pub mod analysis;
pub mod schema;
pub mod index;
pub mod scoring;
pub mod search;
pub mod query;
pub mod mvcc;
pub mod writer;
pub mod columnar;
pub mod compression;
pub mod parallel;
pub mod ingest;

pub use crate::compression::quantize::Quantization;
pub use crate::core::config::{Config, DefaultOperator};
pub use crate::core::database::Database;
pub use crate::core::error::{Error, ErrorKind, Result};
pub use crate::core::types::{DocId, Document, FieldValue};
pub use crate::query::ast::Query;
pub use crate::schema::schema::{FieldType, Schema};
pub use crate::scoring::scorer::ScoringMode;
pub use crate::search::context::CancellationToken;
pub use crate::search::executor::SearchOptions;
pub use crate::search::knn::KnnQuery;
pub use crate::search::results::{ScoredDocument, SearchResults};
