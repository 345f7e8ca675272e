pub mod json;

pub use json::{
    ingest_columnar_json, ingest_json_lines, rows_from_columnar_json, IngestFailure, IngestOptions,
    IngestReport,
};
