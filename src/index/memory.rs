//! In-memory index used for tests, demos and small collections.
//!
//! Documents are tokenized with Unicode word boundaries and lowercased, then
//! split into segments of at most `max_docs_per_segment` documents.

use std::sync::Arc;

use ahash::AHashMap;
use unicode_segmentation::UnicodeSegmentation;

use crate::error::{RankError, Result};
use crate::index::segment::{IndexReader, Postings, SegmentReader};
use crate::index::stats::{CountStats, DataNeeded};
use crate::index::{DocId, NO_MORE_DOCS};

/// A single posting in a posting list.
#[derive(Debug, Clone, PartialEq)]
pub struct Posting {
    /// Segment-relative document id.
    pub doc_id: DocId,
    /// Positions of the term in the document.
    pub positions: Vec<u32>,
}

impl Posting {
    /// Term frequency in this document.
    pub fn frequency(&self) -> u32 {
        self.positions.len() as u32
    }
}

#[derive(Debug, Default)]
struct MemoryField {
    /// Field length per segment-relative document.
    lengths: Vec<u32>,
    /// Sorted posting lists by term.
    postings: AHashMap<String, Arc<[Posting]>>,
}

/// Builder for [`MemoryIndex`].
#[derive(Debug)]
pub struct MemoryIndexBuilder {
    max_docs_per_segment: usize,
    documents: Vec<(String, Vec<(String, String)>)>,
}

impl Default for MemoryIndexBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryIndexBuilder {
    /// Create a builder that keeps every document in one segment.
    pub fn new() -> Self {
        MemoryIndexBuilder {
            max_docs_per_segment: usize::MAX,
            documents: Vec::new(),
        }
    }

    /// Split documents into segments of at most `max_docs` documents.
    pub fn max_docs_per_segment(mut self, max_docs: usize) -> Self {
        self.max_docs_per_segment = max_docs.max(1);
        self
    }

    /// Add a document with a name and `(field, text)` pairs.
    pub fn add_document<N, F, T>(&mut self, name: N, fields: Vec<(F, T)>) -> &mut Self
    where
        N: Into<String>,
        F: Into<String>,
        T: Into<String>,
    {
        let fields = fields
            .into_iter()
            .map(|(f, t)| (f.into(), t.into()))
            .collect();
        self.documents.push((name.into(), fields));
        self
    }

    /// Tokenize everything and build the segments.
    pub fn build(self) -> MemoryIndex {
        let mut segments: Vec<Arc<dyn SegmentReader>> = Vec::new();
        let mut memory_segments = Vec::new();
        let mut names = Vec::with_capacity(self.documents.len());

        for (chunk_no, chunk) in self.documents.chunks(self.max_docs_per_segment).enumerate() {
            let doc_base = (chunk_no * self.max_docs_per_segment) as DocId;
            let segment = Arc::new(MemorySegment::build(doc_base, chunk));
            names.extend(chunk.iter().map(|(name, _)| name.clone()));
            memory_segments.push(Arc::clone(&segment));
            segments.push(segment);
        }

        let name_to_id = names
            .iter()
            .enumerate()
            .map(|(id, name)| (name.clone(), id as DocId))
            .collect();

        MemoryIndex {
            segments,
            memory_segments,
            names,
            name_to_id,
        }
    }
}

/// Tokenize text the way the memory index does.
pub fn tokenize(text: &str) -> Vec<String> {
    text.unicode_words().map(|w| w.to_lowercase()).collect()
}

/// One in-memory segment.
#[derive(Debug)]
pub struct MemorySegment {
    doc_base: DocId,
    num_docs: u32,
    fields: AHashMap<String, MemoryField>,
}

impl MemorySegment {
    fn build(doc_base: DocId, documents: &[(String, Vec<(String, String)>)]) -> Self {
        let num_docs = documents.len() as u32;
        let mut builders: AHashMap<String, (Vec<u32>, AHashMap<String, Vec<Posting>>)> =
            AHashMap::new();

        for (local, (_, fields)) in documents.iter().enumerate() {
            let local = local as DocId;
            for (field, text) in fields {
                let (lengths, postings) = builders
                    .entry(field.clone())
                    .or_insert_with(|| (vec![0; num_docs as usize], AHashMap::new()));
                let tokens = tokenize(text);
                // Repeated fields continue where the previous value ended.
                let offset = lengths[local as usize];
                lengths[local as usize] += tokens.len() as u32;

                for (i, token) in tokens.into_iter().enumerate() {
                    let position = offset + i as u32;
                    let list = postings.entry(token).or_default();
                    let same_doc = list.last().is_some_and(|p| p.doc_id == local);
                    if same_doc {
                        if let Some(last) = list.last_mut() {
                            last.positions.push(position);
                        }
                    } else {
                        list.push(Posting {
                            doc_id: local,
                            positions: vec![position],
                        });
                    }
                }
            }
        }

        let fields = builders
            .into_iter()
            .map(|(field, (lengths, postings))| {
                let postings = postings
                    .into_iter()
                    .map(|(term, list)| (term, Arc::from(list)))
                    .collect();
                (field, MemoryField { lengths, postings })
            })
            .collect();

        MemorySegment {
            doc_base,
            num_docs,
            fields,
        }
    }

    fn term_stats(&self, term: &str, field: &str) -> CountStats {
        let source = format!("{field}:{term}");
        match self.fields.get(field) {
            Some(f) => {
                let (cf, df) = f
                    .postings
                    .get(term)
                    .map(|list| {
                        let cf = list.iter().map(|p| p.frequency() as u64).sum();
                        (cf, list.len() as u64)
                    })
                    .unwrap_or((0, 0));
                let (cl, dc) = Self::length_totals(&f.lengths);
                CountStats::new(source, cf, df, cl, dc)
            }
            None => CountStats::new(source, 0, 0, 0, 0),
        }
    }

    fn field_stats(&self, field: &str) -> Option<CountStats> {
        self.fields.get(field).map(|f| {
            let (cl, dc) = Self::length_totals(&f.lengths);
            CountStats::for_field(field, cl, dc)
        })
    }

    fn length_totals(lengths: &[u32]) -> (u64, u64) {
        let cl = lengths.iter().map(|&l| l as u64).sum();
        let dc = lengths.iter().filter(|&&l| l > 0).count() as u64;
        (cl, dc)
    }
}

impl SegmentReader for MemorySegment {
    fn doc_base(&self) -> DocId {
        self.doc_base
    }

    fn num_docs(&self) -> u32 {
        self.num_docs
    }

    fn open_postings(
        &self,
        term: &str,
        field: &str,
        needed: DataNeeded,
    ) -> Result<Option<Box<dyn Postings>>> {
        if needed == DataNeeded::Scores {
            return Err(RankError::contract(format!(
                "postings for {field}:{term} cannot be opened at {needed}"
            )));
        }
        let list = self
            .fields
            .get(field)
            .and_then(|f| f.postings.get(term))
            .cloned();
        Ok(list.map(|list| Box::new(MemoryPostings::new(list, needed)) as Box<dyn Postings>))
    }

    /// Raw queries are a single `field:term` pair.
    fn raw_query(&self, query: &str) -> Result<Option<Box<dyn Postings>>> {
        let (field, term) = query.split_once(':').ok_or_else(|| {
            RankError::index(format!("expected field:term, got raw query {query:?}"))
        })?;
        self.open_postings(term.trim(), field.trim(), DataNeeded::Docs)
    }

    fn field_length(&self, doc: DocId, field: &str) -> Result<u32> {
        if doc >= self.num_docs {
            return Err(RankError::index(format!(
                "doc {doc} out of range for segment of {} docs",
                self.num_docs
            )));
        }
        Ok(self
            .fields
            .get(field)
            .map(|f| f.lengths[doc as usize])
            .unwrap_or(0))
    }
}

/// Cursor over a shared in-memory posting list.
#[derive(Debug)]
pub struct MemoryPostings {
    list: Arc<[Posting]>,
    index: usize,
    needed: DataNeeded,
}

impl MemoryPostings {
    fn new(list: Arc<[Posting]>, needed: DataNeeded) -> Self {
        MemoryPostings {
            list,
            index: 0,
            needed,
        }
    }
}

impl Postings for MemoryPostings {
    fn doc_id(&self) -> DocId {
        self.list
            .get(self.index)
            .map(|p| p.doc_id)
            .unwrap_or(NO_MORE_DOCS)
    }

    fn advance(&mut self, target: DocId) -> Result<DocId> {
        if self.doc_id() < target {
            let rest = &self.list[self.index..];
            self.index += rest.partition_point(|p| p.doc_id < target);
        }
        Ok(self.doc_id())
    }

    fn count(&self) -> u32 {
        self.list
            .get(self.index)
            .map(Posting::frequency)
            .unwrap_or(0)
    }

    fn positions(&self) -> Result<Vec<u32>> {
        if self.needed < DataNeeded::Positions {
            return Err(RankError::contract(format!(
                "positions requested from postings opened at {}",
                self.needed
            )));
        }
        Ok(self
            .list
            .get(self.index)
            .map(|p| p.positions.clone())
            .unwrap_or_default())
    }

    fn cost(&self) -> u64 {
        self.list.len() as u64
    }
}

/// A multi-segment in-memory index.
#[derive(Debug)]
pub struct MemoryIndex {
    segments: Vec<Arc<dyn SegmentReader>>,
    memory_segments: Vec<Arc<MemorySegment>>,
    names: Vec<String>,
    name_to_id: AHashMap<String, DocId>,
}

impl MemoryIndex {
    /// Start building an index.
    pub fn builder() -> MemoryIndexBuilder {
        MemoryIndexBuilder::new()
    }
}

impl IndexReader for MemoryIndex {
    fn segments(&self) -> &[Arc<dyn SegmentReader>] {
        &self.segments
    }

    fn lookup_document_ids(&self, names: &[String]) -> Result<Vec<DocId>> {
        Ok(names
            .iter()
            .filter_map(|name| self.name_to_id.get(name).copied())
            .collect())
    }

    fn document_name(&self, doc: DocId) -> Result<Option<String>> {
        Ok(self.names.get(doc as usize).cloned())
    }

    fn term_stats(&self, term: &str, field: &str) -> Result<CountStats> {
        let mut total = CountStats::new(format!("{field}:{term}"), 0, 0, 0, 0);
        for segment in &self.memory_segments {
            total.add(&segment.term_stats(term, field));
        }
        Ok(total)
    }

    fn field_stats(&self, field: &str) -> Result<Option<CountStats>> {
        let mut total: Option<CountStats> = None;
        for stats in self.memory_segments.iter().filter_map(|s| s.field_stats(field)) {
            match total.as_mut() {
                Some(t) => t.add(&stats),
                None => total = Some(stats),
            }
        }
        Ok(total)
    }
}
