use anyhow::Result;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::classify::classify;
use super::config::ChunkerConfig;
use super::enrich::MetadataEnricher;
use super::link::{CrossReferenceLinker, LinkStats};
use super::normalize::{NormalizationStats, NormalizedText, TextNormalizer};
use super::split::BoundedSplitter;
use super::structure::StructureIndexer;
use super::tables::TableExtractor;
use super::types::{Chunk, ChunkDraft, ContentType, HierarchicalPath, StructuralSpan};
use super::validate::{ChunkValidator, Violation};
use crate::document::{Document, DocumentType, SourceDocument};
use crate::error::ChunkError;

/// A table sorts ahead of a text chunk starting at its anchor, so it lands
/// right after the text chunk that contains or ends at the anchor.
const TABLE_RANK: u8 = 0;
const TEXT_RANK: u8 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkingStrategy {
    CreditAgreement,
    ComplianceCertificate,
    Generic,
}

impl ChunkingStrategy {
    pub fn for_document_type(document_type: DocumentType) -> Self {
        match document_type {
            DocumentType::CreditAgreement => Self::CreditAgreement,
            DocumentType::ComplianceCertificate => Self::ComplianceCertificate,
            DocumentType::CreditApplication | DocumentType::Unclassified => Self::Generic,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::CreditAgreement => "credit_agreement",
            Self::ComplianceCertificate => "compliance_certificate",
            Self::Generic => "generic",
        }
    }

    pub fn expects_structure(self) -> bool {
        self == Self::CreditAgreement
    }

    pub fn resolve_content_type(self, content_type: ContentType) -> ContentType {
        match (self, content_type) {
            (Self::ComplianceCertificate, ContentType::General) => {
                ContentType::ComplianceCalculation
            }
            _ => content_type,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentReport {
    pub document: Document,
    pub strategy: ChunkingStrategy,
    pub marker_count: usize,
    pub span_count: usize,
    pub table_count: usize,
    pub chunk_count: usize,
    pub violation_count: usize,
    pub normalization: NormalizationStats,
    pub conditions: Vec<ChunkError>,
}

#[derive(Debug, Clone)]
pub struct DocumentChunks {
    pub report: DocumentReport,
    pub chunks: Vec<Chunk>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentFailure {
    pub filename: String,
    pub error: ChunkError,
}

#[derive(Debug, Clone, Default)]
pub struct CorpusRun {
    pub chunks: Vec<Chunk>,
    pub reports: Vec<DocumentReport>,
    pub failures: Vec<DocumentFailure>,
    pub link_stats: LinkStats,
    pub violations: Vec<Violation>,
}

/// Runs the full chunking pipeline. Every component is built once from the
/// configuration and shared read-only across worker threads.
#[derive(Debug)]
pub struct Chunker {
    config: ChunkerConfig,
    normalizer: TextNormalizer,
    indexer: StructureIndexer,
    splitter: BoundedSplitter,
    tables: TableExtractor,
    enricher: MetadataEnricher,
    linker: CrossReferenceLinker,
    validator: ChunkValidator,
}

impl Chunker {
    pub fn new(config: ChunkerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            normalizer: TextNormalizer::new()?,
            indexer: StructureIndexer::new()?,
            splitter: BoundedSplitter::new(&config)?,
            tables: TableExtractor::new(&config),
            enricher: MetadataEnricher::new(&config)?,
            linker: CrossReferenceLinker::new(&config),
            validator: ChunkValidator::new(&config),
            config,
        })
    }

    pub fn config(&self) -> &ChunkerConfig {
        &self.config
    }

    /// Chunks one document without linking. Degraded conditions are returned
    /// on the report; an error means the document produced nothing.
    pub fn chunk_document(&self, source: &SourceDocument) -> Result<DocumentChunks, ChunkError> {
        if !source.has_content() {
            return Err(ChunkError::Document {
                doc_id: source.resolved_id(&source.content_sha256()),
                reason: "no page text or table cells".to_string(),
            });
        }

        let normalized = self.normalizer.normalize_pages(&source.pages);
        let document = Document::resolve(source, &normalized.text);
        let strategy = ChunkingStrategy::for_document_type(document.document_type);
        let mut conditions = Vec::new();

        let index = self.indexer.index(&normalized.text);
        if index.marker_count == 0 && strategy.expects_structure() && !normalized.text.is_empty() {
            conditions.push(ChunkError::MalformedStructure {
                doc_id: document.id.clone(),
            });
        }

        let mut ordered = Vec::<((usize, u8), ChunkDraft)>::new();
        for span in &index.spans {
            // Marker-less text is general before the strategy applies, so a
            // certificate without sections still reads as a calculation.
            let content_type = if span.path.is_empty() {
                ContentType::General
            } else {
                classify(&span.text)
            };
            let content_type = strategy.resolve_content_type(content_type);
            let policy = self.config.policies.for_type(content_type);

            let output = self
                .splitter
                .split(&normalized.text, span, content_type, policy);
            debug!(
                doc_id = %document.id,
                path = %span.path,
                content_type = %content_type,
                drafts = output.drafts.len(),
                "classified structural span"
            );
            conditions.extend(output.conditions);
            ordered.extend(
                output
                    .drafts
                    .into_iter()
                    .map(|draft| ((draft.source_start, TEXT_RANK), draft)),
            );
        }

        let table_output = self
            .tables
            .extract(&self.normalizer, &normalized, &source.pages);
        conditions.extend(table_output.conditions);
        for unit in &table_output.units {
            let path = containing_span(&index.spans, unit.anchor)
                .map(|span| span.path.clone())
                .unwrap_or_default();
            ordered.push(((unit.anchor, TABLE_RANK), self.tables.draft(unit, path)));
        }
        ordered.sort_by_key(|(key, _)| *key);

        if ordered.is_empty() {
            return Err(ChunkError::Document {
                doc_id: document.id,
                reason: "normalized text and tables are empty".to_string(),
            });
        }

        let total_chunks = ordered.len();
        let chunks = ordered
            .into_iter()
            .enumerate()
            .map(|(chunk_index, (_, draft))| {
                let page = page_of(&normalized, &draft);
                let mut chunk = self.enricher.enrich(draft, &document, page);
                chunk.chunk_id = chunk_id(&document.id, &chunk.path, chunk_index);
                chunk.chunk_index = chunk_index;
                chunk.total_chunks = total_chunks;
                chunk
            })
            .collect::<Vec<Chunk>>();

        for condition in &conditions {
            warn!(doc_id = %document.id, code = condition.code(), "{condition}");
        }
        info!(
            doc_id = %document.id,
            document_type = %document.document_type,
            strategy = strategy.as_str(),
            chunks = chunks.len(),
            tables = table_output.units.len(),
            conditions = conditions.len(),
            "chunked document"
        );

        Ok(DocumentChunks {
            report: DocumentReport {
                strategy,
                marker_count: index.marker_count,
                span_count: index.spans.len(),
                table_count: table_output.units.len(),
                chunk_count: chunks.len(),
                violation_count: 0,
                normalization: normalized.stats,
                conditions,
                document,
            },
            chunks,
        })
    }

    /// Chunks every document in parallel, concatenates the results in input
    /// order, then links and validates the combined set.
    pub fn chunk_corpus(&self, sources: &[SourceDocument]) -> CorpusRun {
        let results = sources
            .par_iter()
            .map(|source| (source.filename.clone(), self.chunk_document(source)))
            .collect::<Vec<(String, Result<DocumentChunks, ChunkError>)>>();

        let mut run = CorpusRun::default();
        for (filename, result) in results {
            match result {
                Ok(document) => {
                    run.reports.push(document.report);
                    run.chunks.extend(document.chunks);
                }
                Err(error) => {
                    warn!(filename = %filename, code = error.code(), "{error}");
                    run.failures.push(DocumentFailure { filename, error });
                }
            }
        }

        run.link_stats = self.linker.link(&mut run.chunks);
        run.violations = self.validator.validate(&run.chunks);

        for report in &mut run.reports {
            let count = run
                .violations
                .iter()
                .filter(|violation| violation.document_id == report.document.id)
                .count();
            if count == 0 {
                continue;
            }
            report.violation_count = count;
            let condition = ChunkError::ValidationFailure {
                doc_id: report.document.id.clone(),
                count,
            };
            warn!(doc_id = %report.document.id, violations = count, "{condition}");
            report.conditions.push(condition);
        }

        info!(
            documents = run.reports.len(),
            failures = run.failures.len(),
            chunks = run.chunks.len(),
            linked = run.link_stats.chunks_linked,
            violations = run.violations.len(),
            "chunked corpus"
        );
        run
    }
}

pub fn chunk_id(document_id: &str, path: &HierarchicalPath, chunk_index: usize) -> String {
    let path_key = if path.is_empty() {
        "preamble".to_string()
    } else {
        path.key()
    };
    format!("{document_id}:{path_key}:{chunk_index:04}")
}

/// Span a table anchor belongs to. An anchor on a span boundary belongs to
/// the span ending there.
fn containing_span(spans: &[StructuralSpan], offset: usize) -> Option<&StructuralSpan> {
    spans
        .iter()
        .find(|span| span.start < offset && offset <= span.end)
        .or_else(|| spans.first())
}

/// Page of the first non-whitespace byte of the draft's source range.
fn page_of(normalized: &NormalizedText, draft: &ChunkDraft) -> Option<u32> {
    let body = draft.body();
    let lead = body.len() - body.trim_start().len();
    normalized.page_at(draft.source_start + lead)
}
