pub mod context;
pub mod executor;
pub mod knn;
pub mod results;
