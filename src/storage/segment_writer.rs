use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use chrono::Utc;
use crc32fast::Hasher;
use fst::{MapBuilder, Streamer};
use fst::map::OpBuilder;
use crate::compression::compress::CompressedBlock;
use crate::core::error::Result;
use crate::core::types::{DocId, Document, FieldValue};
use crate::index::inverted::{BufferedDoc, InvertedIndex, Term};
use crate::index::posting::{Posting, PostingList};
use crate::mvcc::controller::SegmentView;
use crate::schema::schema::{FieldType, Schema};
use crate::storage::layout::StorageLayout;
use crate::storage::segment::{
    FieldLengths, NumericColumn, Section, SegmentBody, SegmentHeader, SegmentId, SegmentMeta,
    VectorColumn,
};

/// In-memory image of a segment about to be sealed.
///
/// Built either from a frozen write buffer or from existing segments during
/// a merge; ordinals are assigned in ascending doc id order in both cases.
pub struct SegmentWriter {
    doc_ids: Vec<u64>,
    postings: Vec<(Term, PostingList)>,
    field_lengths: BTreeMap<String, Vec<u32>>,
    numeric: BTreeMap<String, NumericColumn>,
    vectors: BTreeMap<String, VectorColumn>,
    stored: Vec<Vec<u8>>,
}

impl SegmentWriter {
    /// Seal the documents of a frozen buffer that `keep` accepts.
    /// Returns None when nothing survives.
    pub fn from_buffer<F>(index: &InvertedIndex, schema: &Schema, keep: F) -> Result<Option<Self>>
    where
        F: Fn(&BufferedDoc) -> bool,
    {
        let docs = index.documents();
        let mut live: Vec<(usize, &BufferedDoc)> =
            docs.iter().enumerate().filter(|(_, doc)| keep(doc)).collect();
        if live.is_empty() {
            return Ok(None);
        }
        live.sort_by_key(|(_, doc)| doc.doc_id());

        let mut writer = SegmentWriter::empty(live.len());
        for def in &schema.fields {
            match def.field_type {
                FieldType::Text | FieldType::Keyword => {
                    writer.field_lengths.insert(def.name.clone(), Vec::with_capacity(live.len()));
                }
                FieldType::Numeric => {
                    writer.numeric.insert(def.name.clone(), NumericColumn {
                        field: def.name.clone(),
                        offsets: vec![0],
                        values: Vec::new(),
                    });
                }
                FieldType::Vector { dims } => {
                    writer.vectors.insert(def.name.clone(), VectorColumn {
                        field: def.name.clone(),
                        dims: dims as u32,
                        present: Vec::with_capacity(live.len()),
                        values: Vec::with_capacity(live.len() * dims),
                        quantization: def.quantization,
                        codes: None,
                    });
                }
            }
        }

        let mut remap: Vec<Option<u32>> = vec![None; docs.len()];
        for (new_ordinal, (old_ordinal, doc)) in live.iter().enumerate() {
            remap[*old_ordinal] = Some(new_ordinal as u32);
            writer.doc_ids.push(doc.doc_id().0);

            for (field, lengths) in writer.field_lengths.iter_mut() {
                lengths.push(doc.field_length(field));
            }
            for (field, column) in writer.numeric.iter_mut() {
                column.values.extend(doc.document.get_all(field).filter_map(FieldValue::as_number));
                column.offsets.push(column.values.len() as u32);
            }
            for (field, column) in writer.vectors.iter_mut() {
                push_vector(column, doc.document.get_field(field).and_then(FieldValue::as_vector));
            }

            let stored = stored_view(&doc.document, schema);
            writer.stored.push(CompressedBlock::compress(&bincode::serialize(&stored)?));
        }

        for term in index.sorted_terms() {
            let Some(buffered) = index.postings(&term) else { continue };
            let mut postings: Vec<Posting> = buffered
                .into_iter()
                .filter_map(|p| {
                    let ordinal = remap.get(p.ordinal as usize).copied().flatten()?;
                    Some(Posting {
                        doc_id: DocId(writer.doc_ids[ordinal as usize]),
                        term_freq: p.term_freq(),
                        positions: p.positions,
                    })
                })
                .collect();
            if postings.is_empty() {
                continue;
            }
            postings.sort_by_key(|p| p.doc_id);
            writer.postings.push((term, PostingList { postings }));
        }

        Ok(Some(writer))
    }

    /// Combine the live documents of several segments.
    /// Returns None when every document has been deleted.
    pub fn from_segments(views: &[SegmentView]) -> Result<Option<Self>> {
        let mut live: Vec<(u64, usize, usize)> = Vec::new();
        for (seg, view) in views.iter().enumerate() {
            for (ordinal, id) in view.reader.doc_ids().iter().enumerate() {
                if !view.deleted.contains(*id) {
                    live.push((*id, seg, ordinal));
                }
            }
        }
        if live.is_empty() {
            return Ok(None);
        }
        live.sort_unstable();

        let mut writer = SegmentWriter::empty(live.len());
        for view in views {
            for lengths in view.reader.field_lengths() {
                writer.field_lengths.entry(lengths.field.clone()).or_default();
            }
            for column in view.reader.numeric_columns() {
                writer.numeric.entry(column.field.clone()).or_insert_with(|| NumericColumn {
                    field: column.field.clone(),
                    offsets: vec![0],
                    values: Vec::new(),
                });
            }
            for column in view.reader.vector_columns() {
                writer.vectors.entry(column.field.clone()).or_insert_with(|| VectorColumn {
                    field: column.field.clone(),
                    dims: column.dims,
                    present: Vec::new(),
                    values: Vec::new(),
                    quantization: column.quantization,
                    codes: None,
                });
            }
        }

        let mut remap: Vec<Vec<Option<u32>>> = views
            .iter()
            .map(|v| vec![None; v.reader.doc_ids().len()])
            .collect();

        for (new_ordinal, (id, seg, ordinal)) in live.iter().enumerate() {
            let reader = &views[*seg].reader;
            remap[*seg][*ordinal] = Some(new_ordinal as u32);
            writer.doc_ids.push(*id);

            for (field, lengths) in writer.field_lengths.iter_mut() {
                lengths.push(reader.field_length(field, *ordinal));
            }
            for (field, column) in writer.numeric.iter_mut() {
                if let Some(source) = reader.numeric(field) {
                    column.values.extend_from_slice(source.get(*ordinal));
                }
                column.offsets.push(column.values.len() as u32);
            }
            for (field, column) in writer.vectors.iter_mut() {
                push_vector(column, reader.vector(field).and_then(|c| c.get(*ordinal)));
            }
            writer.stored.push(reader.stored_bytes(*ordinal)?.to_vec());
        }

        let mut union = views
            .iter()
            .fold(OpBuilder::new(), |op, view| op.add(view.reader.term_dict()))
            .union();
        while let Some((key, sources)) = union.next() {
            let mut postings = Vec::new();
            for source in sources {
                let list = views[source.index].reader.postings_at(source.value)?;
                for posting in list.postings {
                    let Some(ordinal) = views[source.index]
                        .reader
                        .ordinal(posting.doc_id)
                        .and_then(|ord| remap[source.index][ord])
                    else {
                        continue;
                    };
                    debug_assert_eq!(writer.doc_ids[ordinal as usize], posting.doc_id.0);
                    postings.push(posting);
                }
            }
            if postings.is_empty() {
                continue;
            }
            postings.sort_by_key(|p| p.doc_id);
            writer.postings.push((Term::from_bytes(key.to_vec()), PostingList { postings }));
        }

        Ok(Some(writer))
    }

    fn empty(capacity: usize) -> Self {
        SegmentWriter {
            doc_ids: Vec::with_capacity(capacity),
            postings: Vec::new(),
            field_lengths: BTreeMap::new(),
            numeric: BTreeMap::new(),
            vectors: BTreeMap::new(),
            stored: Vec::with_capacity(capacity),
        }
    }

    pub fn doc_count(&self) -> usize {
        self.doc_ids.len()
    }

    pub fn doc_ids(&self) -> &[u64] {
        &self.doc_ids
    }

    // [ HEADER ][ TERM DICT ][ POSTINGS ][ BODY ]
    pub fn finish(self, storage: &StorageLayout) -> Result<SegmentMeta> {
        let id = SegmentId::new();

        let mut dict = MapBuilder::memory();
        let mut postings = Vec::new();
        for (term, list) in &self.postings {
            dict.insert(term.as_bytes(), postings.len() as u64)?;
            list.encode(&mut postings)?;
        }
        let dict = dict.into_inner()?;

        let field_lengths = self
            .field_lengths
            .into_iter()
            .map(|(field, lengths)| FieldLengths {
                field,
                total: lengths.iter().map(|l| *l as u64).sum(),
                lengths,
            })
            .collect();

        let mut body = SegmentBody {
            meta: SegmentMeta {
                id,
                doc_count: self.doc_ids.len() as u32,
                term_count: self.postings.len() as u64,
                size_bytes: 0,
                created_at: Utc::now(),
                min_doc_id: DocId(self.doc_ids.first().copied().unwrap_or(0)),
                max_doc_id: DocId(self.doc_ids.last().copied().unwrap_or(0)),
            },
            doc_ids: self.doc_ids,
            field_lengths,
            numeric: self.numeric.into_values().collect(),
            vectors: self
                .vectors
                .into_values()
                .map(|mut column| {
                    column.quantize();
                    column
                })
                .collect(),
            stored: self.stored,
        };

        // size_bytes is fixed width, so the body length does not change
        let body_len = bincode::serialized_size(&body)?;
        let total = (SegmentHeader::SIZE as u64) + dict.len() as u64 + postings.len() as u64 + body_len;
        body.meta.size_bytes = total;
        let body_bytes = bincode::serialize(&body)?;

        let dict_section = Section { offset: SegmentHeader::SIZE as u64, len: dict.len() as u64 };
        let postings_section = Section { offset: dict_section.end(), len: postings.len() as u64 };
        let body_section = Section { offset: postings_section.end(), len: body_bytes.len() as u64 };

        let mut hasher = Hasher::new();
        hasher.update(&dict);
        hasher.update(&postings);
        hasher.update(&body_bytes);

        let header = SegmentHeader {
            version: SegmentHeader::VERSION,
            checksum: hasher.finalize(),
            dict: dict_section,
            postings: postings_section,
            body: body_section,
        };

        // Write under a temporary name; the rename publishes the file
        let tmp_path = storage.segment_tmp_path(&id);
        let result = (|| -> Result<()> {
            let mut out = BufWriter::new(File::create(&tmp_path)?);
            out.write_all(&header.encode())?;
            out.write_all(&dict)?;
            out.write_all(&postings)?;
            out.write_all(&body_bytes)?;
            let file = out.into_inner().map_err(|e| e.into_error())?;
            file.sync_all()?;
            fs::rename(&tmp_path, storage.segment_path(&id))?;
            StorageLayout::sync_dir(&storage.segments_dir)
        })();

        if let Err(err) = result {
            let _ = fs::remove_file(&tmp_path);
            return Err(err);
        }

        Ok(body.meta)
    }
}

fn push_vector(column: &mut VectorColumn, vector: Option<&[f32]>) {
    let dims = column.dims as usize;
    match vector {
        Some(v) if v.len() == dims => {
            column.present.push(true);
            column.values.extend_from_slice(v);
        }
        _ => {
            column.present.push(false);
            column.values.extend(std::iter::repeat(0.0).take(dims));
        }
    }
}

/// The document as persisted in the doc store: only stored fields
fn stored_view(doc: &Document, schema: &Schema) -> Document {
    Document {
        id: doc.id,
        fields: doc
            .fields
            .iter()
            .filter(|f| schema.get_field(&f.name).map_or(false, |def| def.stored))
            .cloned()
            .collect(),
    }
}
