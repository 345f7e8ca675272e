use std::cmp::Ordering;
use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};
use serde::{Deserialize, Serialize};
use tracing::debug;
use crate::columnar::cache::{CacheLookup, ColumnarCache};
use crate::core::config::Config;
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::types::{DocId, Document};
use crate::index::inverted::Term;
use crate::index::posting::PostingList;
use crate::mvcc::controller::{SegmentView, Snapshot};
use crate::query::ast::{PhraseQuery, Query, RangeQuery, TermQuery};
use crate::schema::schema::{FieldType, Schema};
use crate::scoring::scorer::{FieldStats, Scorer, ScoringMode};
use crate::search::context::ExecutionContext;
use crate::search::results::{rank_cmp, FacetCount, ScoredDocument, SearchResults, TopKCollector};

/// Order results by a numeric field instead of score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SortField {
    pub field: String,
    pub descending: bool,
}

/// Per-query knobs
#[derive(Debug, Clone)]
pub struct SearchOptions {
    pub max_results: usize,
    pub scoring: ScoringMode,
    pub timeout: Option<Duration>,
    pub sort_by: Option<SortField>,
    pub facets: Vec<String>,          // keyword fields to count over all hits
    pub include_documents: bool,
}

impl SearchOptions {
    pub fn from_config(config: &Config) -> Self {
        SearchOptions {
            max_results: config.max_results,
            scoring: config.scoring,
            timeout: config.query_timeout(),
            sort_by: None,
            facets: Vec::new(),
            include_documents: false,
        }
    }

    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = max_results;
        self
    }

    pub fn with_scoring(mut self, scoring: ScoringMode) -> Self {
        self.scoring = scoring;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_sort(mut self, field: &str, descending: bool) -> Self {
        self.sort_by = Some(SortField {
            field: field.to_string(),
            descending,
        });
        self
    }

    pub fn with_facet(mut self, field: &str) -> Self {
        self.facets.push(field.to_string());
        self
    }

    pub fn with_documents(mut self) -> Self {
        self.include_documents = true;
        self
    }
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Matches within one segment: (ordinal, score), ascending by ordinal
type Matches = Vec<(u32, f32)>;

#[derive(Debug, Clone, Copy)]
struct Hit {
    segment: usize,
    ordinal: usize,
    score: f32,
}

/// Statistics over every live document of the snapshot, so scores do not
/// depend on how documents are spread over segments.
#[derive(Default)]
struct CorpusStats {
    total_docs: u64,
    doc_freq: HashMap<Term, u64>,
    avg_length: HashMap<String, f32>,
}

/// Evaluates a query tree against one snapshot
pub struct QueryExecutor<'a> {
    snapshot: &'a Snapshot,
    schema: &'a Schema,
    options: &'a SearchOptions,
    cache: Option<&'a ColumnarCache>,
    id_field: &'a str,
    ctx: ExecutionContext,
    scorer: Box<dyn Scorer>,
    stats: CorpusStats,
    postings: Vec<HashMap<Term, PostingList>>,   // per segment, terms of the query only
}

impl<'a> QueryExecutor<'a> {
    pub fn new(snapshot: &'a Snapshot, schema: &'a Schema, options: &'a SearchOptions) -> Self {
        QueryExecutor {
            snapshot,
            schema,
            options,
            cache: None,
            id_field: "id",
            ctx: ExecutionContext::default(),
            scorer: options.scoring.scorer(),
            stats: CorpusStats::default(),
            postings: Vec::new(),
        }
    }

    pub fn with_cache(mut self, cache: Option<&'a ColumnarCache>) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_context(mut self, ctx: ExecutionContext) -> Self {
        self.ctx = ctx;
        self
    }

    pub fn with_id_field(mut self, id_field: &'a str) -> Self {
        self.id_field = id_field;
        self
    }

    pub fn execute(mut self, query: &Query) -> Result<SearchResults> {
        let start = Instant::now();
        self.validate_options()?;

        if self.snapshot.is_empty() {
            return Ok(SearchResults {
                took_ms: start.elapsed().as_millis() as u64,
                ..SearchResults::default()
            });
        }

        let mut incomplete = false;
        let mut hits = Vec::new();
        match self.prepare(query) {
            Ok(()) => {
                for segment in 0..self.snapshot.segments.len() {
                    match self.evaluate(segment, query) {
                        Ok(matches) => hits.extend(matches.into_iter().map(|(ordinal, score)| Hit {
                            segment,
                            ordinal: ordinal as usize,
                            score,
                        })),
                        Err(err) if err.kind == ErrorKind::EvaluationTimeout => {
                            incomplete = true;
                            break;
                        }
                        Err(err) => return Err(err),
                    }
                }
            }
            Err(err) if err.kind == ErrorKind::EvaluationTimeout => incomplete = true,
            Err(err) => return Err(err),
        }

        let mut results = self.collect(hits)?;
        results.incomplete = incomplete;
        results.took_ms = start.elapsed().as_millis() as u64;
        debug!(
            query = %query,
            total_hits = results.total_hits,
            incomplete,
            took_ms = results.took_ms,
            "query executed"
        );
        Ok(results)
    }

    fn validate_options(&self) -> Result<()> {
        if let Some(sort) = &self.options.sort_by {
            let def = self.schema.get_field(&sort.field).ok_or_else(|| Error::unknown_field(&sort.field))?;
            if def.field_type != FieldType::Numeric {
                return Err(Error::schema_mismatch(&sort.field, "sorting requires a numeric field"));
            }
        }
        for field in &self.options.facets {
            let def = self.schema.get_field(field).ok_or_else(|| Error::unknown_field(field))?;
            if def.field_type != FieldType::Keyword {
                return Err(Error::schema_mismatch(field, "facets require a keyword field"));
            }
        }
        Ok(())
    }

    /// Decode the query's postings once and gather corpus statistics
    fn prepare(&mut self, query: &Query) -> Result<()> {
        let mut terms = Vec::new();
        query.collect_terms(&mut terms);
        terms.sort();
        terms.dedup();

        let mut fields: Vec<&str> = terms.iter().filter_map(Term::field).collect();
        fields.sort_unstable();
        fields.dedup();

        let total_docs = self.snapshot.doc_count();
        let mut doc_freq: HashMap<Term, u64> = HashMap::new();
        let mut length_totals: HashMap<&str, u64> = HashMap::new();

        for view in &self.snapshot.segments {
            self.ctx.check()?;
            let mut segment_postings = HashMap::new();
            for term in &terms {
                if let Some(list) = view.reader.postings(term)? {
                    let live = list.postings.iter().filter(|p| view.is_live(p.doc_id)).count() as u64;
                    *doc_freq.entry(term.clone()).or_default() += live;
                    segment_postings.insert(term.clone(), list);
                }
            }
            self.postings.push(segment_postings);

            for field in &fields {
                *length_totals.entry(*field).or_default() += live_field_total(view, field);
            }
        }

        let avg_length = length_totals
            .into_iter()
            .map(|(field, total)| (field.to_string(), total as f32 / total_docs.max(1) as f32))
            .collect();
        self.stats = CorpusStats {
            total_docs,
            doc_freq,
            avg_length,
        };
        Ok(())
    }

    fn idf(&self, term: &Term) -> f32 {
        let df = self.stats.doc_freq.get(term).copied().unwrap_or(0);
        self.scorer.idf(df, self.stats.total_docs)
    }

    fn avg_length(&self, field: &str) -> f32 {
        self.stats.avg_length.get(field).copied().unwrap_or(0.0)
    }

    fn evaluate(&self, segment: usize, query: &Query) -> Result<Matches> {
        self.ctx.check()?;
        let view = &self.snapshot.segments[segment];
        match query {
            Query::Term(q) => Ok(self.eval_term(segment, q)),
            Query::Phrase(q) => Ok(self.eval_phrase(segment, q)),
            Query::Range(q) => Ok(eval_range(view, q)),
            Query::MatchAll => Ok(live_ordinals(view).map(|ord| (ord, 1.0)).collect()),
            Query::And(clauses) => {
                let mut clauses = clauses.iter();
                let Some(first) = clauses.next() else {
                    return Ok(live_ordinals(view).map(|ord| (ord, 1.0)).collect());
                };
                let mut acc = self.evaluate(segment, first)?;
                for clause in clauses {
                    if acc.is_empty() {
                        break;
                    }
                    acc = intersect(&acc, &self.evaluate(segment, clause)?);
                }
                Ok(acc)
            }
            Query::Or(clauses) => {
                let mut acc = Vec::new();
                for clause in clauses {
                    acc = union(&acc, &self.evaluate(segment, clause)?);
                }
                Ok(acc)
            }
            Query::Not(inner) => {
                let excluded = self.evaluate(segment, inner)?;
                Ok(complement(view, &excluded))
            }
        }
    }

    fn eval_term(&self, segment: usize, query: &TermQuery) -> Matches {
        let term = query.term();
        let Some(list) = self.postings[segment].get(&term) else {
            return Vec::new();
        };
        let view = &self.snapshot.segments[segment];
        let idf = self.idf(&term);
        let avg = self.avg_length(&query.field);

        let mut out = Vec::with_capacity(list.len());
        for posting in &list.postings {
            if !view.is_live(posting.doc_id) {
                continue;
            }
            let Some(ordinal) = view.reader.ordinal(posting.doc_id) else { continue };
            let stats = FieldStats {
                field_length: view.reader.field_length(&query.field, ordinal),
                avg_field_length: avg,
            };
            out.push((ordinal as u32, self.scorer.score(posting.term_freq, idf, &stats)));
        }
        out
    }

    fn eval_phrase(&self, segment: usize, query: &PhraseQuery) -> Matches {
        let terms: Vec<Term> = query.terms().collect();
        let mut lists = Vec::with_capacity(terms.len());
        for term in &terms {
            match self.postings[segment].get(term) {
                Some(list) => lists.push(list),
                None => return Vec::new(),
            }
        }
        let Some((first, rest)) = lists.split_first() else {
            return Vec::new();
        };

        let view = &self.snapshot.segments[segment];
        let idf: f32 = terms.iter().map(|t| self.idf(t)).sum();
        let avg = self.avg_length(&query.field);
        let base = query.offsets.first().copied().unwrap_or(0);
        let offset = |i: usize| query.offsets.get(i).copied().unwrap_or(base + i as u32).saturating_sub(base);

        let mut out = Vec::new();
        'docs: for posting in &first.postings {
            if !view.is_live(posting.doc_id) {
                continue;
            }
            let mut others = Vec::with_capacity(rest.len());
            for list in rest {
                match list.get(posting.doc_id) {
                    Some(p) => others.push(p),
                    None => continue 'docs,
                }
            }

            let matches = posting
                .positions
                .iter()
                .filter(|start| {
                    others
                        .iter()
                        .enumerate()
                        .all(|(i, p)| p.positions.binary_search(&(**start + offset(i + 1))).is_ok())
                })
                .count() as u32;
            if matches == 0 {
                continue;
            }

            let Some(ordinal) = view.reader.ordinal(posting.doc_id) else { continue };
            let stats = FieldStats {
                field_length: view.reader.field_length(&query.field, ordinal),
                avg_field_length: avg,
            };
            out.push((ordinal as u32, self.scorer.score(matches, idf, &stats)));
        }
        out
    }

    fn collect(&self, hits: Vec<Hit>) -> Result<SearchResults> {
        let total_hits = hits.len();
        let max_score = hits.iter().map(|h| h.score).fold(0.0_f32, f32::max);
        let facets = self.count_facets(&hits)?;

        let mut ranked = match &self.options.sort_by {
            None => {
                let mut collector = TopKCollector::new(self.options.max_results);
                for hit in &hits {
                    collector.collect(ScoredDocument::new(self.doc_id(hit), hit.score));
                }
                collector.into_sorted_vec()
            }
            Some(sort) => {
                let mut docs = Vec::with_capacity(hits.len());
                for hit in &hits {
                    let mut doc = ScoredDocument::new(self.doc_id(hit), hit.score);
                    doc.sort_value = self.numeric_value(hit, &sort.field)?;
                    docs.push(doc);
                }
                docs.sort_by(|a, b| sort_cmp(a, b, sort.descending));
                docs.truncate(self.options.max_results);
                docs
            }
        };

        if self.options.include_documents {
            for doc in &mut ranked {
                if let Some(stored) = self.snapshot.get_document(doc.doc_id)? {
                    doc.document = Some(stored.to_json(self.id_field));
                }
            }
        }

        Ok(SearchResults {
            hits: ranked,
            total_hits,
            max_score,
            took_ms: 0,
            incomplete: false,
            facets,
        })
    }

    fn doc_id(&self, hit: &Hit) -> DocId {
        self.snapshot.segments[hit.segment].reader.doc_id(hit.ordinal)
    }

    fn stored(&self, hit: &Hit) -> Result<Arc<Document>> {
        self.snapshot.segments[hit.segment].reader.document(hit.ordinal)
    }

    fn numeric_value(&self, hit: &Hit, field: &str) -> Result<Option<f64>> {
        if let Some(cache) = self.cache {
            match cache.numeric(self.snapshot.generation, field, self.doc_id(hit)) {
                CacheLookup::Value(v) => return Ok(Some(v)),
                CacheLookup::Empty => return Ok(None),
                CacheLookup::Miss => {}
            }
        }
        // Multi-valued fields sort by their first value
        let column = self.snapshot.segments[hit.segment].reader.numeric(field);
        Ok(column.and_then(|c| c.get(hit.ordinal).first().copied()))
    }

    fn count_facets(&self, hits: &[Hit]) -> Result<BTreeMap<String, Vec<FacetCount>>> {
        let mut facets = BTreeMap::new();
        for field in &self.options.facets {
            let stored = self.schema.get_field(field).is_some_and(|def| def.stored);
            // Unstored values are recovered from each segment's term dictionary
            let mut dictionary_values: HashMap<usize, Vec<Vec<String>>> = HashMap::new();
            let mut counts: HashMap<String, u64> = HashMap::new();
            for hit in hits {
                let cached = match self.cache {
                    Some(cache) => cache.keyword(self.snapshot.generation, field, self.doc_id(hit)),
                    None => CacheLookup::Miss,
                };
                match cached {
                    CacheLookup::Value(value) => *counts.entry(value).or_default() += 1,
                    CacheLookup::Empty => {}
                    CacheLookup::Miss if stored => {
                        let doc = self.stored(hit)?;
                        let mut values: Vec<&str> = doc.get_all(field).filter_map(|v| v.as_text()).collect();
                        values.sort_unstable();
                        values.dedup();
                        for value in values {
                            *counts.entry(value.to_string()).or_default() += 1;
                        }
                    }
                    CacheLookup::Miss => {
                        let per_ordinal = match dictionary_values.entry(hit.segment) {
                            Entry::Occupied(e) => e.into_mut(),
                            Entry::Vacant(e) => {
                                e.insert(self.snapshot.segments[hit.segment].reader.keyword_values(field)?)
                            }
                        };
                        for value in per_ordinal.get(hit.ordinal).into_iter().flatten() {
                            *counts.entry(value.clone()).or_default() += 1;
                        }
                    }
                }
            }
            let mut counts: Vec<FacetCount> = counts
                .into_iter()
                .map(|(value, count)| FacetCount { value, count })
                .collect();
            counts.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.value.cmp(&b.value)));
            facets.insert(field.clone(), counts);
        }
        Ok(facets)
    }
}

/// Missing sort values go last in both directions
fn sort_cmp(a: &ScoredDocument, b: &ScoredDocument, descending: bool) -> Ordering {
    let by_value = match (a.sort_value, b.sort_value) {
        (Some(x), Some(y)) if descending => y.total_cmp(&x),
        (Some(x), Some(y)) => x.total_cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    };
    by_value.then_with(|| rank_cmp(a, b))
}

fn live_ordinals(view: &SegmentView) -> impl Iterator<Item = u32> + '_ {
    view.reader
        .doc_ids()
        .iter()
        .enumerate()
        .filter(|(_, id)| !view.deleted.contains(**id))
        .map(|(ord, _)| ord as u32)
}

fn live_field_total(view: &SegmentView, field: &str) -> u64 {
    if view.deleted.is_empty() {
        return view.reader.field_total_length(field);
    }
    live_ordinals(view)
        .map(|ord| view.reader.field_length(field, ord as usize) as u64)
        .sum()
}

fn eval_range(view: &SegmentView, query: &RangeQuery) -> Matches {
    let Some(column) = view.reader.numeric(&query.field) else {
        return Vec::new();
    };
    live_ordinals(view)
        .filter(|ord| column.get(*ord as usize).iter().any(|v| query.contains(*v)))
        .map(|ord| (ord, 1.0))
        .collect()
}

fn intersect(a: &[(u32, f32)], b: &[(u32, f32)]) -> Matches {
    let mut out = Vec::with_capacity(a.len().min(b.len()));
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        match a[i].0.cmp(&b[j].0) {
            Ordering::Less => i += 1,
            Ordering::Greater => j += 1,
            Ordering::Equal => {
                out.push((a[i].0, a[i].1 + b[j].1));
                i += 1;
                j += 1;
            }
        }
    }
    out
}

fn union(a: &[(u32, f32)], b: &[(u32, f32)]) -> Matches {
    let mut out = Vec::with_capacity(a.len() + b.len());
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        match a[i].0.cmp(&b[j].0) {
            Ordering::Less => {
                out.push(a[i]);
                i += 1;
            }
            Ordering::Greater => {
                out.push(b[j]);
                j += 1;
            }
            Ordering::Equal => {
                out.push((a[i].0, a[i].1 + b[j].1));
                i += 1;
                j += 1;
            }
        }
    }
    out.extend_from_slice(&a[i..]);
    out.extend_from_slice(&b[j..]);
    out
}

fn complement(view: &SegmentView, excluded: &[(u32, f32)]) -> Matches {
    let mut excluded = excluded.iter().map(|(ord, _)| *ord).peekable();
    live_ordinals(view)
        .filter(|ord| {
            while excluded.next_if(|e| e < ord).is_some() {}
            excluded.peek() != Some(ord)
        })
        .map(|ord| (ord, 0.0))
        .collect()
}
