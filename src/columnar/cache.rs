use std::collections::HashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use crate::columnar::block::{BlockColumn, Slot};
use crate::core::types::{DocId, Document, FieldValue};
use crate::schema::schema::{FieldType, Schema};

/// Result of a cache read
#[derive(Debug, Clone, PartialEq)]
pub enum CacheLookup<T> {
    Value(T),
    /// The document is mirrored and has no value for the field
    Empty,
    /// Not mirrored; the caller falls back to the document store
    Miss,
}

impl<T> CacheLookup<T> {
    fn from_slot<S, F>(slot: Slot<'_, S>, convert: F) -> Self
    where
        F: FnOnce(&[S]) -> Option<T>,
    {
        match slot {
            Slot::Value(values) => convert(values).map_or(CacheLookup::Miss, CacheLookup::Value),
            Slot::Empty => CacheLookup::Empty,
            Slot::Miss => CacheLookup::Miss,
        }
    }
}

/// Keyword strings are stored once; slots hold dictionary ordinals
#[derive(Default)]
struct KeywordDict {
    ordinals: HashMap<String, u32>,
    values: Vec<String>,
}

impl KeywordDict {
    fn intern(&mut self, value: &str) -> u32 {
        if let Some(ord) = self.ordinals.get(value) {
            return *ord;
        }
        let ord = self.values.len() as u32;
        self.values.push(value.to_string());
        self.ordinals.insert(value.to_string(), ord);
        ord
    }
}

enum Column {
    Numeric(BlockColumn<f64>),
    Keyword { dict: KeywordDict, ords: BlockColumn<u32> },
    Vector(BlockColumn<f32>),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    pub columns: usize,
    pub blocks: usize,
    pub memory_bytes: usize,
}

struct CacheState {
    generation: u64,
    columns: HashMap<String, Column>,
}

/// Fixed-width mirror of columnar fields keyed by doc id, for O(1) value
/// access while sorting, faceting and fetching.
///
/// Only single-valued entries are mirrored; documents whose field has
/// several values stay a miss and are read from the document store.
/// Lookups name the snapshot generation they read; any other generation
/// than the one the cache mirrors is a miss.
pub struct ColumnarCache {
    state: RwLock<CacheState>,
}

impl ColumnarCache {
    pub fn from_schema(schema: &Schema) -> Self {
        let mut columns = HashMap::new();
        for def in schema.fields.iter().filter(|f| f.columnar) {
            let column = match def.field_type {
                FieldType::Numeric => Column::Numeric(BlockColumn::new(1)),
                FieldType::Keyword => Column::Keyword {
                    dict: KeywordDict::default(),
                    ords: BlockColumn::new(1),
                },
                FieldType::Vector { dims } => Column::Vector(BlockColumn::new(dims)),
                FieldType::Text => continue,
            };
            columns.insert(def.name.clone(), column);
        }
        ColumnarCache {
            state: RwLock::new(CacheState { generation: 0, columns }),
        }
    }

    pub fn generation(&self) -> u64 {
        self.state.read().generation
    }

    /// Mirror the documents committed in `generation` and forget removed
    /// ones in one step
    pub fn apply<'a, I>(&self, generation: u64, inserts: I, removes: &[DocId])
    where
        I: IntoIterator<Item = &'a Document>,
    {
        let mut state = self.state.write();
        state.generation = generation;
        let columns = &mut state.columns;
        for id in removes {
            for column in columns.values_mut() {
                match column {
                    Column::Numeric(c) => c.forget(*id),
                    Column::Keyword { ords, .. } => ords.forget(*id),
                    Column::Vector(c) => c.forget(*id),
                }
            }
        }
        for doc in inserts {
            for (field, column) in columns.iter_mut() {
                let mut values = doc.get_all(field);
                let first = values.next();
                let single = values.next().is_none();
                match column {
                    Column::Numeric(c) => match first.and_then(FieldValue::as_number) {
                        Some(n) if single => c.set(doc.id, Some(std::slice::from_ref(&n))),
                        Some(_) => c.forget(doc.id),
                        None => c.set(doc.id, None),
                    },
                    Column::Keyword { dict, ords } => match first.and_then(FieldValue::as_text) {
                        Some(s) if single => {
                            let ord = dict.intern(s);
                            ords.set(doc.id, Some(std::slice::from_ref(&ord)));
                        }
                        Some(_) => ords.forget(doc.id),
                        None => ords.set(doc.id, None),
                    },
                    Column::Vector(c) => match first.and_then(FieldValue::as_vector) {
                        Some(v) if single => c.set(doc.id, Some(v)),
                        Some(_) => c.forget(doc.id),
                        None => c.set(doc.id, None),
                    },
                }
            }
        }
    }

    pub fn numeric(&self, generation: u64, field: &str, doc: DocId) -> CacheLookup<f64> {
        let state = self.state.read();
        if state.generation != generation {
            return CacheLookup::Miss;
        }
        match state.columns.get(field) {
            Some(Column::Numeric(c)) => CacheLookup::from_slot(c.get(doc), |v| v.first().copied()),
            _ => CacheLookup::Miss,
        }
    }

    pub fn keyword(&self, generation: u64, field: &str, doc: DocId) -> CacheLookup<String> {
        let state = self.state.read();
        if state.generation != generation {
            return CacheLookup::Miss;
        }
        match state.columns.get(field) {
            Some(Column::Keyword { dict, ords }) => CacheLookup::from_slot(ords.get(doc), |v| {
                v.first().and_then(|ord| dict.values.get(*ord as usize)).cloned()
            }),
            _ => CacheLookup::Miss,
        }
    }

    /// Any mirrored value as a field value
    pub fn value(&self, generation: u64, field: &str, doc: DocId) -> CacheLookup<FieldValue> {
        let state = self.state.read();
        if state.generation != generation {
            return CacheLookup::Miss;
        }
        match state.columns.get(field) {
            Some(Column::Numeric(c)) => {
                CacheLookup::from_slot(c.get(doc), |v| v.first().map(|n| FieldValue::Number(*n)))
            }
            Some(Column::Keyword { dict, ords }) => CacheLookup::from_slot(ords.get(doc), |v| {
                v.first()
                    .and_then(|ord| dict.values.get(*ord as usize))
                    .map(|s| FieldValue::Keyword(s.clone()))
            }),
            Some(Column::Vector(c)) => {
                CacheLookup::from_slot(c.get(doc), |v| Some(FieldValue::Vector(v.to_vec())))
            }
            None => CacheLookup::Miss,
        }
    }

    pub fn stats(&self) -> CacheStats {
        let state = self.state.read();
        let columns = &state.columns;
        let mut stats = CacheStats {
            columns: columns.len(),
            ..CacheStats::default()
        };
        for column in columns.values() {
            let (blocks, bytes) = match column {
                Column::Numeric(c) => (c.block_count(), c.memory_bytes()),
                Column::Keyword { dict, ords } => (
                    ords.block_count(),
                    ords.memory_bytes() + dict.values.iter().map(|s| s.len() * 2).sum::<usize>(),
                ),
                Column::Vector(c) => (c.block_count(), c.memory_bytes()),
            };
            stats.blocks += blocks;
            stats.memory_bytes += bytes;
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache() -> ColumnarCache {
        let schema = Schema::new()
            .add_text_field("title", None)
            .add_numeric_field("price")
            .add_keyword_field("color")
            .add_vector_field("emb", 2);
        ColumnarCache::from_schema(&schema)
    }

    #[test]
    fn test_text_fields_have_no_column() {
        let cache = cache();
        assert_eq!(cache.stats().columns, 3);
        let doc = Document::new(DocId(1)).with_field("title", FieldValue::Text("lamp".into()));
        cache.apply(1, [&doc], &[]);
        assert_eq!(cache.value(1, "title", DocId(1)), CacheLookup::Miss);
    }

    #[test]
    fn test_apply_and_lookup() {
        let cache = cache();
        let doc = Document::new(DocId(4))
            .with_field("price", FieldValue::Number(9.5))
            .with_field("color", FieldValue::Keyword("red".into()))
            .with_field("emb", FieldValue::Vector(vec![1.0, 0.0]));
        let bare = Document::new(DocId(5));
        cache.apply(1, [&doc, &bare], &[]);

        assert_eq!(cache.numeric(1, "price", DocId(4)), CacheLookup::Value(9.5));
        assert_eq!(cache.keyword(1, "color", DocId(4)), CacheLookup::Value("red".to_string()));
        assert_eq!(
            cache.value(1, "emb", DocId(4)),
            CacheLookup::Value(FieldValue::Vector(vec![1.0, 0.0]))
        );
        assert_eq!(cache.numeric(1, "price", DocId(5)), CacheLookup::Empty);
        assert_eq!(cache.numeric(1, "price", DocId(6)), CacheLookup::Miss);

        cache.apply(2, std::iter::empty(), &[DocId(4)]);
        assert_eq!(cache.numeric(2, "price", DocId(4)), CacheLookup::Miss);
    }

    #[test]
    fn test_other_generations_miss() {
        let cache = cache();
        let old = Document::new(DocId(1)).with_field("price", FieldValue::Number(1.0));
        cache.apply(1, [&old], &[]);
        let new = Document::new(DocId(1)).with_field("price", FieldValue::Number(2.0));
        cache.apply(2, [&new], &[DocId(1)]);

        // A reader still on generation 1 must not see the replacement
        assert_eq!(cache.numeric(1, "price", DocId(1)), CacheLookup::Miss);
        assert_eq!(cache.numeric(2, "price", DocId(1)), CacheLookup::Value(2.0));
        assert_eq!(cache.generation(), 2);
    }

    #[test]
    fn test_multi_valued_entries_fall_back() {
        let cache = cache();
        let doc = Document::new(DocId(1))
            .with_field("color", FieldValue::Keyword("red".into()))
            .with_field("color", FieldValue::Keyword("blue".into()));
        cache.apply(1, [&doc], &[]);
        assert_eq!(cache.keyword(1, "color", DocId(1)), CacheLookup::Miss);
    }
}
