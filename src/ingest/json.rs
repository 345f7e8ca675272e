use std::io::BufRead;
use std::time::{Duration, Instant};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{info, warn};
use crate::core::database::Database;
use crate::core::error::{Error, ErrorKind, Result};

#[derive(Debug, Clone)]
pub struct IngestOptions {
    pub batch_size: usize,
    pub progress_every: usize,      // log after this many records; 0 = never
    pub continue_on_error: bool,    // record bad lines instead of stopping
    pub commit: bool,               // commit once everything is buffered
}

impl Default for IngestOptions {
    fn default() -> Self {
        IngestOptions {
            batch_size: 1000,
            progress_every: 10_000,
            continue_on_error: true,
            commit: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestFailure {
    pub line: usize,   // 1-based line, or row for column-oriented input
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IngestReport {
    pub indexed: usize,
    pub failed: Vec<IngestFailure>,
    pub elapsed_ms: u64,
    pub avg_latency_us: f64,   // buffering time per indexed record
}

struct Ingester<'a> {
    db: &'a Database,
    options: &'a IngestOptions,
    batch: Vec<(usize, Value)>,
    report: IngestReport,
    indexing_time: Duration,
    next_progress: usize,
    started: Instant,
}

impl<'a> Ingester<'a> {
    fn new(db: &'a Database, options: &'a IngestOptions) -> Self {
        Ingester {
            db,
            options,
            batch: Vec::with_capacity(options.batch_size),
            report: IngestReport::default(),
            indexing_time: Duration::ZERO,
            next_progress: options.progress_every,
            started: Instant::now(),
        }
    }

    fn push(&mut self, line: usize, record: Value) -> Result<()> {
        self.batch.push((line, record));
        if self.batch.len() >= self.options.batch_size.max(1) {
            self.flush()?;
        }
        Ok(())
    }

    fn fail(&mut self, line: usize, error: Error) -> Result<()> {
        if !self.options.continue_on_error {
            return Err(Error::new(error.kind, format!("line {}: {}", line, error.context)));
        }
        warn!(line, %error, "skipping record");
        self.report.failed.push(IngestFailure {
            line,
            error: error.to_string(),
        });
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        if self.batch.is_empty() {
            return Ok(());
        }
        let batch = std::mem::take(&mut self.batch);
        let start = Instant::now();
        let records: Vec<Value> = batch.iter().map(|(_, r)| r.clone()).collect();

        match self.db.add_records(&records) {
            Ok(ids) => self.report.indexed += ids.len(),
            // One bad record rejects the batch; retry one by one to find it
            Err(_) => {
                for (line, record) in batch {
                    match self.db.add_record(&record) {
                        Ok(_) => self.report.indexed += 1,
                        Err(err) => self.fail(line, err)?,
                    }
                }
            }
        }
        self.indexing_time += start.elapsed();

        if self.options.progress_every > 0 && self.report.indexed >= self.next_progress {
            let secs = self.started.elapsed().as_secs_f64().max(f64::EPSILON);
            info!(
                indexed = self.report.indexed,
                failed = self.report.failed.len(),
                docs_per_sec = (self.report.indexed as f64 / secs) as u64,
                "ingest progress"
            );
            while self.next_progress <= self.report.indexed {
                self.next_progress += self.options.progress_every;
            }
        }
        Ok(())
    }

    fn finish(mut self) -> Result<IngestReport> {
        self.flush()?;
        if self.options.commit {
            self.db.commit()?;
        }
        self.report.elapsed_ms = self.started.elapsed().as_millis() as u64;
        if self.report.indexed > 0 {
            self.report.avg_latency_us = self.indexing_time.as_micros() as f64 / self.report.indexed as f64;
        }
        info!(
            indexed = self.report.indexed,
            failed = self.report.failed.len(),
            elapsed_ms = self.report.elapsed_ms,
            avg_latency_us = self.report.avg_latency_us,
            "ingest finished"
        );
        Ok(self.report)
    }
}

/// Index one JSON object per line. Blank lines are skipped.
pub fn ingest_json_lines<R: BufRead>(db: &Database, reader: R, options: &IngestOptions) -> Result<IngestReport> {
    let mut ingester = Ingester::new(db, options);
    for (index, line) in reader.lines().enumerate() {
        let line_no = index + 1;
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<Value>(&line) {
            Ok(record) => ingester.push(line_no, record)?,
            Err(err) => ingester.fail(line_no, err.into())?,
        }
    }
    ingester.finish()
}

/// Turn `{"field": [v0, v1, ...], ...}` into one object per row.
/// Every column must be an array of the same length.
pub fn rows_from_columnar_json(input: &Value) -> Result<Vec<Value>> {
    let columns = input.as_object().ok_or_else(|| {
        Error::new(ErrorKind::InvalidArgument, "column-oriented input must be an object".to_string())
    })?;

    let mut rows: Option<usize> = None;
    for (name, column) in columns {
        let len = column
            .as_array()
            .ok_or_else(|| Error::new(ErrorKind::InvalidArgument, format!("column '{}' is not an array", name)))?
            .len();
        match rows {
            Some(expected) if expected != len => {
                return Err(Error::new(
                    ErrorKind::InvalidArgument,
                    format!("column '{}' has {} rows, expected {}", name, len, expected),
                ));
            }
            _ => rows = Some(len),
        }
    }

    let rows = rows.unwrap_or(0);
    let mut out = vec![Map::new(); rows];
    for (name, column) in columns {
        if let Some(values) = column.as_array() {
            for (row, value) in out.iter_mut().zip(values) {
                if !value.is_null() {
                    row.insert(name.clone(), value.clone());
                }
            }
        }
    }
    Ok(out.into_iter().map(Value::Object).collect())
}

/// Index column-oriented JSON; failures report the 1-based row
pub fn ingest_columnar_json(db: &Database, input: &Value, options: &IngestOptions) -> Result<IngestReport> {
    let rows = rows_from_columnar_json(input)?;
    let mut ingester = Ingester::new(db, options);
    for (index, row) in rows.into_iter().enumerate() {
        ingester.push(index + 1, row)?;
    }
    ingester.finish()
}
