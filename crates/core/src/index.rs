use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use tantivy::{
    collector::TopDocs,
    doc,
    query::QueryParser,
    schema::*,
    tokenizer::{LowerCaser, RemoveLongFilter, SimpleTokenizer, TextAnalyzer},
    Index, IndexReader, IndexWriter, TantivyDocument,
};

use crate::error::IndexError;
use crate::models::{make_snippet, SearchHit};

/// Field names used in the schema.
pub mod fields {
    pub const ID: &str = "id";
    pub const NAME: &str = "name";
    pub const TEXT: &str = "text";
}

const TOKENIZER_NAME: &str = "standard_lower";
const WRITER_MEMORY_BYTES: usize = 15_000_000;

/// Persistent inverted index over documents.
///
/// The writer is created once at open time and held for the lifetime of
/// the engine, which makes the tantivy directory lockfile enforce
/// single-writer discipline: a second process (or a second engine in the
/// same process) opening the same directory fails with
/// [`IndexError::WriteConflict`] instead of proceeding write-capable.
///
/// Every mutation commits before returning, so a successful `upsert` or
/// `delete` is durable. Searches reload the reader to the last commit
/// and then run against that single snapshot.
pub struct SearchIndex {
    index: Index,
    reader: IndexReader,
    writer: Mutex<IndexWriter>,
    schema: Schema,
}

/// Resolved field handles for the schema.
#[derive(Clone, Copy)]
struct SchemaFields {
    id: Field,
    name: Field,
    text: Field,
}

fn build_schema() -> Schema {
    let mut builder = Schema::builder();

    // `id` is exact: stored and matchable as a whole term, never
    // tokenized into free text.
    builder.add_text_field(fields::ID, STRING | STORED);

    let tokenized = TextOptions::default()
        .set_indexing_options(
            TextFieldIndexing::default()
                .set_tokenizer(TOKENIZER_NAME)
                .set_index_option(IndexRecordOption::WithFreqsAndPositions),
        )
        .set_stored();
    builder.add_text_field(fields::NAME, tokenized.clone());
    // Stored so search can build snippets from the indexed text.
    builder.add_text_field(fields::TEXT, tokenized);

    builder.build()
}

fn register_tokenizers(index: &Index) {
    let analyzer = TextAnalyzer::builder(SimpleTokenizer::default())
        .filter(RemoveLongFilter::limit(40))
        .filter(LowerCaser)
        .build();
    index.tokenizers().register(TOKENIZER_NAME, analyzer);
}

impl SearchIndex {
    /// Open or create an index at the given directory.
    ///
    /// Fails with [`IndexError::WriteConflict`] when another engine
    /// already holds the write lock on that directory.
    pub fn open(dir: &Path) -> Result<Self, IndexError> {
        std::fs::create_dir_all(dir)?;
        let schema = build_schema();

        let mmap_dir = tantivy::directory::MmapDirectory::open(dir)
            .map_err(|e| tantivy::TantivyError::SystemError(e.to_string()))?;
        let index = if Index::exists(&mmap_dir)
            .map_err(|e| tantivy::TantivyError::SystemError(e.to_string()))?
        {
            Index::open(mmap_dir)?
        } else {
            Index::create(mmap_dir, schema.clone(), tantivy::IndexSettings::default())?
        };

        Self::from_index(index, schema)
    }

    /// Create an in-memory index (for testing).
    pub fn open_in_ram() -> Result<Self, IndexError> {
        let schema = build_schema();
        let index = Index::create_in_ram(schema.clone());
        Self::from_index(index, schema)
    }

    fn from_index(index: Index, schema: Schema) -> Result<Self, IndexError> {
        register_tokenizers(&index);

        let writer = match index.writer(WRITER_MEMORY_BYTES) {
            Ok(writer) => writer,
            Err(e @ tantivy::TantivyError::LockFailure(..)) => {
                return Err(IndexError::WriteConflict(e.to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        let reader = index.reader()?;

        Ok(Self {
            index,
            reader,
            writer: Mutex::new(writer),
            schema,
        })
    }

    fn fields(&self) -> SchemaFields {
        // Schema is built by this module, so the lookups cannot fail.
        let f = |name: &str| {
            self.schema
                .get_field(name)
                .unwrap_or_else(|_| panic!("schema field missing: {name}"))
        };
        SchemaFields {
            id: f(fields::ID),
            name: f(fields::NAME),
            text: f(fields::TEXT),
        }
    }

    fn writer(&self) -> Result<MutexGuard<'_, IndexWriter>, IndexError> {
        self.writer.lock().map_err(|_| IndexError::LockPoisoned)
    }

    /// Insert or replace the entry for `id` and commit durably.
    ///
    /// Delete-then-add under one writer lock, committed as a single
    /// visible unit: a concurrent searcher sees either the old entry or
    /// the new one, never a transient gap and never two entries.
    pub fn upsert(&self, id: &str, name: &str, text: &str) -> Result<(), IndexError> {
        let f = self.fields();
        let mut writer = self.writer()?;

        writer.delete_term(tantivy::Term::from_field_text(f.id, id));
        writer.add_document(doc!(
            f.id => id,
            f.name => name,
            f.text => text,
        ))?;
        writer.commit()?;

        tracing::debug!(document_id = %id, text_chars = text.len(), "index entry committed");
        Ok(())
    }

    /// Remove the entry for `id`; a no-op when absent.
    pub fn delete(&self, id: &str) -> Result<(), IndexError> {
        let f = self.fields();
        let mut writer = self.writer()?;

        writer.delete_term(tantivy::Term::from_field_text(f.id, id));
        writer.commit()?;

        tracing::debug!(document_id = %id, "index entry deleted");
        Ok(())
    }

    /// Search `name` and `text` with BM25 scoring, best first.
    ///
    /// Malformed query syntax is a [`IndexError::QueryParse`] error, not
    /// an empty result set.
    pub fn search(&self, query_str: &str, max_results: usize) -> Result<Vec<SearchHit>, IndexError> {
        let f = self.fields();
        self.reader.reload()?;
        let searcher = self.reader.searcher();

        let parser = QueryParser::for_index(&self.index, vec![f.name, f.text]);
        let query = parser
            .parse_query(query_str)
            .map_err(|e| IndexError::QueryParse {
                query: query_str.to_string(),
                message: e.to_string(),
            })?;

        // Malformed syntax errors even when no results were asked for;
        // the zero limit itself would panic TopDocs.
        if max_results == 0 {
            return Ok(Vec::new());
        }

        let top_docs = searcher.search(&query, &TopDocs::with_limit(max_results))?;

        let mut hits = Vec::with_capacity(top_docs.len());
        for (score, doc_address) in top_docs {
            let doc: TantivyDocument = searcher.doc(doc_address)?;
            hits.push(SearchHit {
                id: extract_text(&doc, f.id),
                name: extract_text(&doc, f.name),
                score,
                snippet: make_snippet(&extract_text(&doc, f.text)),
            });
        }

        Ok(hits)
    }

    /// Number of live entries as of the last commit.
    pub fn document_count(&self) -> Result<u64, IndexError> {
        self.reader.reload()?;
        Ok(self.reader.searcher().num_docs())
    }

    /// Release the index, waiting for background merges to settle and
    /// dropping the write lock.
    pub fn close(self) -> Result<(), IndexError> {
        let writer = self.writer.into_inner().map_err(|_| IndexError::LockPoisoned)?;
        writer.wait_merging_threads()?;
        Ok(())
    }
}

impl std::fmt::Debug for SearchIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchIndex").finish_non_exhaustive()
    }
}

fn extract_text(doc: &TantivyDocument, field: Field) -> String {
    doc.get_first(field)
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string()
}
