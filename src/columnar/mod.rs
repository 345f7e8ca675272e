pub mod block;
pub mod cache;
