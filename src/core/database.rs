use std::collections::HashMap;
use std::fs;
use std::sync::Arc;
use parking_lot::Mutex;
use roaring::RoaringTreemap;
use serde_json::Value;
use tracing::{debug, info, warn};
use crate::analysis::analyzer::AnalyzerRegistry;
use crate::columnar::cache::{CacheLookup, ColumnarCache};
use crate::core::config::Config;
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::stats::IndexStats;
use crate::core::types::{DocId, Document, FieldValue};
use crate::index::inverted::BufferedDoc;
use crate::mvcc::controller::{MVCCController, SegmentView, Snapshot};
use crate::parallel::merger::{MergeEvent, SegmentMerger};
use crate::query::ast::Query;
use crate::query::parser::QueryParser;
use crate::schema::document::DocumentNormalizer;
use crate::schema::schema::{FieldDefinition, FieldType, Schema};
use crate::search::context::{CancellationToken, ExecutionContext};
use crate::search::executor::{QueryExecutor, SearchOptions};
use crate::search::knn::{knn_recall, knn_search, KnnQuery};
use crate::search::results::SearchResults;
use crate::storage::file_lock::FileLock;
use crate::storage::layout::StorageLayout;
use crate::storage::manifest::{Manifest, ManifestEntry};
use crate::storage::merge_policy::{ForceMergePolicy, LogStructuredMergePolicy, MergePolicy};
use crate::storage::segment::{SegmentId, SegmentMeta};
use crate::storage::segment_reader::SegmentReader;
use crate::storage::segment_writer::SegmentWriter;
use crate::writer::index_writer::{IndexWriter, PendingWork};

// Merges handed to the merge thread and the segments they read
#[derive(Default)]
struct MergeState {
    in_flight: HashMap<u64, Vec<SegmentId>>,
}

impl MergeState {
    fn is_merging(&self, id: SegmentId) -> bool {
        self.in_flight.values().any(|ids| ids.contains(&id))
    }
}

// Readers touched by one commit attempt
#[derive(Default)]
struct CommitScratch {
    created: Vec<Arc<SegmentReader>>,
    retired: Vec<Arc<SegmentReader>>,
}

/// What one commit attempt published
struct Committed {
    generation: u64,
    // merges whose output could not be opened; their sources stay live
    failed_merges: Vec<(u64, Error)>,
}

impl CommitScratch {
    /// New segment files are removed once nothing references them
    fn abandon(self) {
        for reader in self.created {
            reader.mark_obsolete();
        }
    }
}

/// An index directory opened for reading and writing.
///
/// Writers and searchers may share it across threads. Searches run on the
/// snapshot published by the last commit; commits are serialized.
pub struct Database {
    config: Config,
    storage: Arc<StorageLayout>,
    schema: Arc<Schema>,
    query_parser: QueryParser,
    writer: IndexWriter,
    mvcc: MVCCController,
    columnar: Option<ColumnarCache>,
    merge_policy: Box<dyn MergePolicy>,
    merger: SegmentMerger,
    commit_lock: Mutex<MergeState>,
    _lock: FileLock,
}

impl Database {
    /// Open an existing index; its schema is read from the directory
    pub fn open(config: Config) -> Result<Self> {
        let storage = StorageLayout::new(config.storage_path.clone())?;
        let schema = Schema::load(&storage.schema_path())?.ok_or_else(|| {
            Error::new(
                ErrorKind::NotFound,
                format!("no index at {}", config.storage_path.display()),
            )
        })?;
        Self::open_with_schema(schema, config)
    }

    /// Open or create an index. An existing index must have been created
    /// with the same schema.
    pub fn open_with_schema(schema: Schema, config: Config) -> Result<Self> {
        let storage = Arc::new(StorageLayout::new(config.storage_path.clone())?);
        let lock = FileLock::acquire(&storage)?;

        schema.validate(&config.id_field)?;
        match Schema::load(&storage.schema_path())? {
            Some(stored) if stored != schema => {
                return Err(Error::new(
                    ErrorKind::SchemaMismatch,
                    format!("schema differs from the one stored at {}", storage.base_dir.display()),
                ));
            }
            Some(_) => {}
            None => schema.save(&storage.schema_path())?,
        }
        let schema = Arc::new(schema);
        let analyzers = Arc::new(AnalyzerRegistry::new());

        let manifest = Manifest::load(&storage)?.unwrap_or_default();
        let mut views = Vec::with_capacity(manifest.segments.len());
        for entry in &manifest.segments {
            let reader = SegmentReader::open(&storage, entry.meta.id, config.doc_cache_size)?;
            views.push(SegmentView {
                reader: Arc::new(reader),
                deleted: Arc::new(entry.deleted()?),
            });
        }
        remove_leftovers(&storage, &manifest)?;

        let snapshot = Snapshot::new(manifest.generation, views);
        let columnar = if config.columnar_cache {
            Some(rebuild_columnar(&schema, &snapshot)?)
        } else {
            None
        };

        let writer = IndexWriter::new(
            Arc::clone(&schema),
            Arc::clone(&analyzers),
            &config.analyzer,
            manifest.next_doc_id,
        )?;
        let query_parser = QueryParser::new(Arc::clone(&schema), analyzers, &config)?;
        let merger = SegmentMerger::spawn(Arc::clone(&storage))?;
        let merge_policy = Box::new(LogStructuredMergePolicy::new(
            config.merge_factor,
            config.max_merge_docs as u64,
        ));

        info!(
            path = %storage.base_dir.display(),
            generation = snapshot.generation,
            segments = snapshot.segments.len(),
            docs = snapshot.doc_count(),
            "index opened"
        );

        Ok(Database {
            config,
            storage,
            schema,
            query_parser,
            writer,
            mvcc: MVCCController::new(snapshot),
            columnar,
            merge_policy,
            merger,
            commit_lock: Mutex::new(MergeState::default()),
            _lock: lock,
        })
    }

    // ---- writes ----

    /// Normalize and buffer one JSON record
    pub fn add_record(&self, record: &Value) -> Result<DocId> {
        let normalized = DocumentNormalizer::new(&self.schema, &self.config.id_field).normalize(record)?;
        let doc = self.writer.document_from_record(normalized);
        let id = doc.id;
        let buffered = self.writer.add_document(doc)?;
        self.maybe_rotate(buffered);
        Ok(id)
    }

    /// Buffer a batch of records; nothing is buffered if any record is invalid
    pub fn add_records(&self, records: &[Value]) -> Result<Vec<DocId>> {
        let normalizer = DocumentNormalizer::new(&self.schema, &self.config.id_field);
        let normalized = records
            .iter()
            .map(|r| normalizer.normalize(r))
            .collect::<Result<Vec<_>>>()?;
        let docs: Vec<Document> = normalized
            .into_iter()
            .map(|r| self.writer.document_from_record(r))
            .collect();
        let ids = docs.iter().map(|d| d.id).collect();
        let buffered = self.writer.add_documents(docs)?;
        self.maybe_rotate(buffered);
        Ok(ids)
    }

    /// Buffer a document; an existing document with the same id is replaced
    /// at the next commit
    pub fn add_document(&self, doc: Document) -> Result<DocId> {
        let id = self.writer.assign_id(Some(doc.id));
        let buffered = self.writer.add_document(doc)?;
        self.maybe_rotate(buffered);
        Ok(id)
    }

    pub fn add_documents(&self, docs: Vec<Document>) -> Result<usize> {
        let count = docs.len();
        for doc in &docs {
            self.writer.assign_id(Some(doc.id));
        }
        let buffered = self.writer.add_documents(docs)?;
        self.maybe_rotate(buffered);
        Ok(count)
    }

    /// Remove a document; takes effect at the next commit
    pub fn delete_document(&self, doc_id: DocId) {
        self.writer.delete_document(doc_id);
    }

    fn maybe_rotate(&self, buffered: usize) {
        if buffered < self.config.writer_batch_size.max(1) {
            return;
        }
        debug!(buffered, "write buffer full, committing");
        // Failed work stays buffered for the next commit
        if let Err(err) = self.commit() {
            warn!(%err, "automatic commit failed");
        }
    }

    /// Seal buffered documents, apply deletes and finished merges, and
    /// publish a new generation. Returns the published generation.
    pub fn commit(&self) -> Result<u64> {
        let mut state = self.commit_lock.lock();
        let committed = self.commit_locked(&mut state, Vec::new(), true)?;
        self.schedule_merge(&mut state);
        Ok(committed.generation)
    }

    /// Publish finished background merges without sealing buffered work
    pub fn apply_merges(&self) -> Result<u64> {
        let mut state = self.commit_lock.lock();
        Ok(self.commit_locked(&mut state, Vec::new(), false)?.generation)
    }

    /// Commit, then merge until at most `max_segments` segments remain.
    /// Runs on the merge thread and waits for it.
    pub fn force_merge(&self, max_segments: usize) -> Result<u64> {
        let mut state = self.commit_lock.lock();

        let mut settled = Vec::new();
        let tickets: Vec<u64> = state.in_flight.keys().copied().collect();
        for ticket in tickets {
            settled.push(self.merger.wait_for(ticket)?);
        }
        let mut generation = self.commit_locked(&mut state, settled, true)?.generation;

        let policy = ForceMergePolicy { max_segments };
        loop {
            let snapshot = self.mvcc.current_snapshot();
            let selection = policy.select_segments_to_merge(&snapshot.segments);
            if selection.is_empty() {
                break;
            }
            let views = selection.iter().map(|i| snapshot.segments[*i].clone()).collect();
            let ticket = self.submit_merge(&mut state, views)?;
            let event = match self.merger.wait_for(ticket)? {
                MergeEvent::Failed { error, .. } => {
                    state.in_flight.remove(&ticket);
                    return Err(error);
                }
                event => event,
            };
            let committed = self.commit_locked(&mut state, vec![event], false)?;
            if let Some((_, error)) = committed.failed_merges.into_iter().find(|(t, _)| *t == ticket) {
                return Err(error);
            }
            generation = committed.generation;
        }

        info!(generation, segments = self.mvcc.current_snapshot().segments.len(), "force merge finished");
        Ok(generation)
    }

    fn commit_locked(&self, state: &mut MergeState, mut events: Vec<MergeEvent>, seal: bool) -> Result<Committed> {
        let current = self.mvcc.current_snapshot();
        events.extend(self.merger.drain());

        let mut segments = current.segments.clone();
        let mut scratch = CommitScratch::default();
        let (merged, failed_merges) = self.apply_merge_events(state, &mut segments, events, &mut scratch);

        let work = if seal {
            self.writer.freeze()
        } else {
            PendingWork {
                buffers: Vec::new(),
                deletes: Vec::new(),
            }
        };
        if work.is_empty() && merged == 0 {
            debug!(generation = current.generation, "nothing to commit");
            return Ok(Committed {
                generation: current.generation,
                failed_merges,
            });
        }

        let sealed = match self.seal(&work, &mut scratch) {
            Ok(sealed) => sealed,
            Err(err) => {
                scratch.abandon();
                return Err(err.into_write_failure());
            }
        };

        // Older copies of every written or deleted id go away
        let mut tombstoned = 0;
        for view in segments.iter_mut() {
            let hits: Vec<u64> = sealed
                .touched
                .iter()
                .filter(|id| view.live_ordinal(**id).is_some())
                .map(|id| id.0)
                .collect();
            if !hits.is_empty() {
                tombstoned += hits.len();
                let mut deleted = (*view.deleted).clone();
                deleted.extend(hits);
                view.deleted = Arc::new(deleted);
            }
        }
        segments.extend(sealed.views);

        let (live, empty): (Vec<SegmentView>, Vec<SegmentView>) =
            segments.into_iter().partition(|v| v.live_count() > 0);
        scratch.retired.extend(empty.into_iter().map(|v| v.reader));
        let segments = live;

        let manifest = Manifest {
            generation: current.generation + 1,
            next_doc_id: self.writer.next_doc_id(),
            segments: match segments
                .iter()
                .map(|v| ManifestEntry::new(v.reader.meta().clone(), &v.deleted))
                .collect::<Result<Vec<_>>>()
            {
                Ok(entries) => entries,
                Err(err) => {
                    scratch.abandon();
                    return Err(err);
                }
            },
            timestamp: chrono::Utc::now(),
        };
        if let Err(err) = manifest.save(&self.storage) {
            scratch.abandon();
            return Err(err.into_write_failure());
        }

        // Readers of the new generation must never see the cache's old values
        if let Some(cache) = &self.columnar {
            cache.apply(manifest.generation, sealed.inserts.iter(), &sealed.touched);
        }
        let snapshot = self.mvcc.publish(Snapshot::new(manifest.generation, segments));
        self.writer.acknowledge(&work);
        for reader in &scratch.retired {
            reader.mark_obsolete();
        }

        info!(
            generation = snapshot.generation,
            segments = snapshot.segments.len(),
            docs = snapshot.doc_count(),
            sealed_docs = sealed.inserts.len(),
            tombstoned,
            merged,
            "commit"
        );
        Ok(Committed {
            generation: snapshot.generation,
            failed_merges,
        })
    }

    /// Write one segment per frozen buffer from the documents that survive
    fn seal(&self, work: &PendingWork, scratch: &mut CommitScratch) -> Result<Sealed> {
        // Latest write per id wins; a later delete beats any earlier write
        let mut latest: HashMap<DocId, u64> = HashMap::new();
        for buffer in &work.buffers {
            for doc in buffer.documents().iter() {
                let seq = latest.entry(doc.doc_id()).or_insert(doc.seq);
                *seq = (*seq).max(doc.seq);
            }
        }
        let mut deleted: HashMap<DocId, u64> = HashMap::new();
        for delete in &work.deletes {
            let seq = deleted.entry(delete.doc_id).or_insert(delete.seq);
            *seq = (*seq).max(delete.seq);
        }
        let keep = |doc: &BufferedDoc| {
            latest.get(&doc.doc_id()) == Some(&doc.seq)
                && deleted.get(&doc.doc_id()).map_or(true, |d| *d < doc.seq)
        };

        let mut touched: Vec<DocId> = latest.keys().chain(deleted.keys()).copied().collect();
        touched.sort_unstable();
        touched.dedup();

        let mut inserts = Vec::new();
        let mut views = Vec::new();
        for buffer in &work.buffers {
            if self.columnar.is_some() {
                let docs = buffer.documents();
                inserts.extend(docs.iter().filter(|d| keep(d)).map(|d| d.document.clone()));
            }
            let Some(writer) = SegmentWriter::from_buffer(buffer, &self.schema, &keep)? else {
                continue;
            };
            let meta = writer.finish(&self.storage)?;
            let reader = self.open_segment(&meta)?;
            scratch.created.push(Arc::clone(&reader));
            views.push(SegmentView::new(reader));
        }

        Ok(Sealed { views, touched, inserts })
    }

    fn open_segment(&self, meta: &SegmentMeta) -> Result<Arc<SegmentReader>> {
        match SegmentReader::open(&self.storage, meta.id, self.config.doc_cache_size) {
            Ok(reader) => Ok(Arc::new(reader)),
            Err(err) => {
                let _ = fs::remove_file(self.storage.segment_path(&meta.id));
                Err(err)
            }
        }
    }

    /// Swap merged segments in for their sources; returns how many merges
    /// changed the segment set and the merges that could not be applied
    fn apply_merge_events(
        &self,
        state: &mut MergeState,
        segments: &mut Vec<SegmentView>,
        events: Vec<MergeEvent>,
        scratch: &mut CommitScratch,
    ) -> (usize, Vec<(u64, Error)>) {
        let mut applied = 0;
        let mut failed = Vec::new();
        for event in events {
            let (ticket, merged, sources) = match event {
                MergeEvent::Completed { ticket, merged, sources } => (ticket, merged, sources),
                MergeEvent::Failed { ticket, .. } => {
                    state.in_flight.remove(&ticket);
                    continue;
                }
            };
            state.in_flight.remove(&ticket);

            let positions: Option<Vec<usize>> = sources
                .iter()
                .map(|(id, _)| segments.iter().position(|v| v.reader.id() == *id))
                .collect();
            let Some(positions) = positions else {
                // A source was dropped meanwhile; the merged copy is stale
                if let Some(meta) = merged {
                    let _ = fs::remove_file(self.storage.segment_path(&meta.id));
                }
                debug!(ticket, "discarded stale merge");
                continue;
            };

            let view = match merged {
                Some(meta) => match self.open_merged(&meta, &sources, &positions, segments) {
                    Ok(view) => Some(view),
                    Err(err) => {
                        // open_segment already removed the unreadable file
                        warn!(ticket, %err, "could not open merged segment");
                        failed.push((ticket, err));
                        continue;
                    }
                },
                None => None,
            };

            let insert_at = positions.iter().copied().min().unwrap_or(segments.len());
            let mut descending = positions.clone();
            descending.sort_unstable_by(|a, b| b.cmp(a));
            for pos in descending {
                scratch.retired.push(segments.remove(pos).reader);
            }
            if let Some(view) = view {
                scratch.created.push(Arc::clone(&view.reader));
                segments.insert(insert_at.min(segments.len()), view);
            }
            applied += 1;
        }
        (applied, failed)
    }

    /// Open a merged segment and carry over deletes that landed on its
    /// sources while the merge ran
    fn open_merged(
        &self,
        meta: &SegmentMeta,
        sources: &[(SegmentId, Arc<RoaringTreemap>)],
        positions: &[usize],
        segments: &[SegmentView],
    ) -> Result<SegmentView> {
        let reader = self.open_segment(meta)?;
        let mut deleted = RoaringTreemap::new();
        for ((_, seen), pos) in sources.iter().zip(positions) {
            let fresh = segments[*pos].deleted.as_ref() - seen.as_ref();
            deleted.extend(fresh.iter().filter(|id| reader.ordinal(DocId(*id)).is_some()));
        }
        Ok(SegmentView {
            reader,
            deleted: Arc::new(deleted),
        })
    }

    fn schedule_merge(&self, state: &mut MergeState) {
        if !self.config.background_merge {
            return;
        }
        let snapshot = self.mvcc.current_snapshot();
        let candidates: Vec<SegmentView> = snapshot
            .segments
            .iter()
            .filter(|v| !state.is_merging(v.reader.id()))
            .cloned()
            .collect();
        let selection = self.merge_policy.select_segments_to_merge(&candidates);
        if selection.is_empty() {
            return;
        }
        let views = selection.into_iter().map(|i| candidates[i].clone()).collect();
        if let Err(err) = self.submit_merge(state, views) {
            warn!(%err, "could not schedule merge");
        }
    }

    fn submit_merge(&self, state: &mut MergeState, views: Vec<SegmentView>) -> Result<u64> {
        let ids: Vec<SegmentId> = views.iter().map(|v| v.reader.id()).collect();
        let ticket = self.merger.submit(views)?;
        debug!(ticket, segments = ids.len(), "merge scheduled");
        state.in_flight.insert(ticket, ids);
        Ok(ticket)
    }

    // ---- reads ----

    pub fn parse_query(&self, query: &str) -> Result<Query> {
        self.query_parser.parse(query)
    }

    /// Search with the configured defaults
    pub fn search(&self, query: &str) -> Result<SearchResults> {
        self.search_with(query, &SearchOptions::from_config(&self.config), None)
    }

    pub fn search_with(
        &self,
        query: &str,
        options: &SearchOptions,
        cancel: Option<&CancellationToken>,
    ) -> Result<SearchResults> {
        let query = self.parse_query(query)?;
        self.search_query(&query, options, cancel)
    }

    pub fn search_query(
        &self,
        query: &Query,
        options: &SearchOptions,
        cancel: Option<&CancellationToken>,
    ) -> Result<SearchResults> {
        let snapshot = self.mvcc.current_snapshot();
        let ctx = ExecutionContext::new(options.timeout, cancel.cloned());
        QueryExecutor::new(&snapshot, &self.schema, options)
            .with_cache(self.columnar.as_ref())
            .with_context(ctx)
            .with_id_field(&self.config.id_field)
            .execute(query)
    }

    /// Nearest neighbours of `vector` in a vector field
    pub fn knn(&self, field: &str, vector: Vec<f32>, k: usize) -> Result<SearchResults> {
        self.knn_query(&KnnQuery::new(field, vector, k))
    }

    pub fn knn_query(&self, query: &KnnQuery) -> Result<SearchResults> {
        let snapshot = self.mvcc.current_snapshot();
        let ctx = ExecutionContext::new(self.config.query_timeout(), None);
        knn_search(&snapshot, &self.schema, query, &ctx)
    }

    /// How much of the exact top-k a quantized field still finds
    pub fn knn_recall(&self, field: &str, queries: &[Vec<f32>], k: usize) -> Result<f64> {
        let snapshot = self.mvcc.current_snapshot();
        let ctx = ExecutionContext::new(self.config.query_timeout(), None);
        knn_recall(&snapshot, &self.schema, field, queries, k, &ctx)
    }

    pub fn get_document(&self, doc_id: DocId) -> Result<Option<Arc<Document>>> {
        self.mvcc.current_snapshot().get_document(doc_id)
    }

    /// One field of a committed document, from the columnar cache when it
    /// holds the value
    pub fn field_value(&self, doc_id: DocId, field: &str) -> Result<Option<FieldValue>> {
        let snapshot = self.mvcc.current_snapshot();
        if let Some(cache) = &self.columnar {
            match cache.value(snapshot.generation, field, doc_id) {
                CacheLookup::Value(value) => return Ok(Some(value)),
                CacheLookup::Empty => return Ok(None),
                CacheLookup::Miss => {}
            }
        }
        let Some((segment, ordinal)) = snapshot.locate(doc_id) else {
            return Ok(None);
        };
        let reader = snapshot.segments[segment].reader.as_ref();
        match self.schema.get_field(field) {
            // Unstored values only live in the segment's columns and terms
            Some(def) if !def.stored => {
                let columns = SegmentColumns::load(reader, vec![def])?;
                Ok(columns.document(doc_id, ordinal).get_field(field).cloned())
            }
            _ => Ok(reader.document(ordinal)?.get_field(field).cloned()),
        }
    }

    pub fn stats(&self) -> IndexStats {
        let snapshot = self.mvcc.current_snapshot();
        IndexStats {
            generation: snapshot.generation,
            segment_count: snapshot.segments.len(),
            doc_count: snapshot.doc_count(),
            deleted_count: snapshot.deleted_count(),
            term_count: snapshot.segments.iter().map(|v| v.reader.term_count() as u64).sum(),
            size_bytes: snapshot.segments.iter().map(|v| v.reader.meta().size_bytes).sum(),
            buffered_docs: self.writer.buffered_docs(),
            pending_deletes: self.writer.pending_deletes(),
            merges_in_flight: self.commit_lock.lock().in_flight.len(),
            columnar: self.columnar.as_ref().map(ColumnarCache::stats),
        }
    }

    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.mvcc.current_snapshot()
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}

struct Sealed {
    views: Vec<SegmentView>,
    touched: Vec<DocId>,
    inserts: Vec<Document>,
}

/// Remove segment files the manifest does not list and interrupted writes
fn remove_leftovers(storage: &StorageLayout, manifest: &Manifest) -> Result<()> {
    for id in storage.list_segments()? {
        if manifest.segments.iter().any(|e| e.meta.id == id) {
            continue;
        }
        match fs::remove_file(storage.segment_path(&id)) {
            Ok(()) => info!(segment = %id, "removed unreferenced segment"),
            Err(err) => warn!(segment = %id, %err, "could not remove unreferenced segment"),
        }
    }
    for path in storage.list_temp_files()? {
        if let Err(err) = fs::remove_file(&path) {
            warn!(path = %path.display(), %err, "could not remove temp file");
        }
    }
    Ok(())
}

/// Columnar values of one segment, read back without the document store
struct SegmentColumns<'a> {
    reader: &'a SegmentReader,
    fields: Vec<&'a FieldDefinition>,
    keywords: HashMap<String, Vec<Vec<String>>>,
}

impl<'a> SegmentColumns<'a> {
    fn load(reader: &'a SegmentReader, fields: Vec<&'a FieldDefinition>) -> Result<Self> {
        let mut keywords = HashMap::new();
        for def in fields.iter().filter(|f| f.field_type == FieldType::Keyword) {
            keywords.insert(def.name.clone(), reader.keyword_values(&def.name)?);
        }
        Ok(SegmentColumns { reader, fields, keywords })
    }

    fn document(&self, id: DocId, ordinal: usize) -> Document {
        let mut doc = Document::new(id);
        for def in &self.fields {
            let name = def.name.as_str();
            match def.field_type {
                FieldType::Numeric => {
                    for value in self.reader.numeric(name).map_or(&[][..], |c| c.get(ordinal)) {
                        doc.add_field(name, FieldValue::Number(*value));
                    }
                }
                FieldType::Keyword => {
                    let values = self.keywords.get(name).and_then(|k| k.get(ordinal));
                    for value in values.into_iter().flatten() {
                        doc.add_field(name, FieldValue::Keyword(value.clone()));
                    }
                }
                FieldType::Vector { .. } => {
                    if let Some(vector) = self.reader.vector(name).and_then(|c| c.get(ordinal)) {
                        doc.add_field(name, FieldValue::Vector(vector.to_vec()));
                    }
                }
                FieldType::Text => {}
            }
        }
        doc
    }
}

/// Mirror every live document from segment columns and keyword terms,
/// so unstored fields survive a reopen
fn rebuild_columnar(schema: &Schema, snapshot: &Snapshot) -> Result<ColumnarCache> {
    let cache = ColumnarCache::from_schema(schema);
    let fields: Vec<&FieldDefinition> = schema
        .fields
        .iter()
        .filter(|f| f.columnar && f.field_type != FieldType::Text)
        .collect();
    cache.apply(snapshot.generation, std::iter::empty(), &[]);
    if fields.is_empty() {
        return Ok(cache);
    }
    for view in &snapshot.segments {
        let columns = SegmentColumns::load(view.reader.as_ref(), fields.clone())?;
        let docs: Vec<Document> = view
            .reader
            .doc_ids()
            .iter()
            .enumerate()
            .filter(|(_, id)| !view.deleted.contains(**id))
            .map(|(ordinal, id)| columns.document(DocId(*id), ordinal))
            .collect();
        cache.apply(snapshot.generation, docs.iter(), &[]);
    }
    Ok(cache)
}
