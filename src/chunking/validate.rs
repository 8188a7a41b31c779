use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::config::{ChunkerConfig, SizePolicies};
use super::types::{Boundary, Chunk};
use crate::document::DocumentType;

const TERMINAL_CHARS: &[char] = &['.', ';', ':', ',', '!', '?', ')', ']', '"', '\''];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ViolationCode {
    #[serde(rename = "V-EMPTY")]
    Empty,
    #[serde(rename = "V-SIZE")]
    Size,
    #[serde(rename = "V-TERMINAL")]
    Terminal,
    #[serde(rename = "V-TABLE")]
    Table,
    #[serde(rename = "V-STRUCTURE")]
    Structure,
}

impl ViolationCode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Empty => "V-EMPTY",
            Self::Size => "V-SIZE",
            Self::Terminal => "V-TERMINAL",
            Self::Table => "V-TABLE",
            Self::Structure => "V-STRUCTURE",
        }
    }
}

impl fmt::Display for ViolationCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    pub code: ViolationCode,
    pub chunk_id: String,
    pub document_id: String,
    pub message: String,
}

/// Reports chunks that break the size, terminal, table and structure rules.
/// Never mutates the chunk set.
#[derive(Debug, Clone)]
pub struct ChunkValidator {
    min_chunk_chars: usize,
    policies: SizePolicies,
}

impl ChunkValidator {
    pub fn new(config: &ChunkerConfig) -> Self {
        Self {
            min_chunk_chars: config.min_chunk_chars,
            policies: config.policies.clone(),
        }
    }

    pub fn validate(&self, chunks: &[Chunk]) -> Vec<Violation> {
        chunks
            .iter()
            .flat_map(|chunk| self.validate_chunk(chunk))
            .collect()
    }

    pub fn validate_chunk(&self, chunk: &Chunk) -> Vec<Violation> {
        let mut violations = Vec::new();
        let mut report = |code: ViolationCode, message: String| {
            violations.push(Violation {
                code,
                chunk_id: chunk.chunk_id.clone(),
                document_id: chunk.document_id.clone(),
                message,
            });
        };

        let indexed = chunk.indexed_text();
        if indexed.trim().is_empty() {
            report(ViolationCode::Empty, "chunk text is empty".to_string());
            return violations;
        }

        if chunk.is_table() {
            if let Some(message) = table_problem(chunk) {
                report(ViolationCode::Table, message);
            }
        } else {
            let len = indexed.len();
            let max = self.policies.for_type(chunk.content_type).max_chars;
            if len > max && chunk.boundary != Boundary::HardCut {
                report(
                    ViolationCode::Size,
                    format!("{len} chars exceeds the {} maximum of {max}", chunk.content_type),
                );
            }
            if !chunk.is_complete_unit && len < self.min_chunk_chars {
                report(
                    ViolationCode::Size,
                    format!("fragment of {len} chars is below the minimum of {}", self.min_chunk_chars),
                );
            }

            if !chunk.boundary.is_structural() {
                let last = indexed.trim_end().chars().next_back();
                if !last.is_some_and(|ch| TERMINAL_CHARS.contains(&ch)) {
                    report(
                        ViolationCode::Terminal,
                        format!(
                            "text ends with {:?} at a {:?} boundary",
                            last.unwrap_or(' '),
                            chunk.boundary
                        ),
                    );
                }
            }
        }

        if chunk.document_type == DocumentType::CreditAgreement
            && chunk.path.section.is_none()
            && chunk.path.article.is_none()
        {
            report(
                ViolationCode::Structure,
                "credit agreement chunk has neither article nor section".to_string(),
            );
        }

        violations
    }
}

pub fn count_by_code(violations: &[Violation]) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for violation in violations {
        *counts.entry(violation.code.as_str().to_string()).or_insert(0) += 1;
    }
    counts
}

fn table_problem(chunk: &Chunk) -> Option<String> {
    let Some(metadata) = chunk.table.as_ref() else {
        return Some("table chunk has no table metadata".to_string());
    };

    let cell_counts = chunk
        .body()
        .lines()
        .filter(|line| line.starts_with('|'))
        .map(rendered_cells)
        .collect::<Vec<usize>>();

    if cell_counts.len() != metadata.row_count + 1 {
        return Some(format!(
            "rendered {} grid lines for {} rows",
            cell_counts.len(),
            metadata.row_count
        ));
    }
    if let Some(bad) = cell_counts.iter().find(|&&count| count != metadata.column_count) {
        return Some(format!(
            "row has {bad} cells, expected {}",
            metadata.column_count
        ));
    }
    if metadata.padded_rows > 0 {
        return Some(format!(
            "{} rows were padded to {} cells",
            metadata.padded_rows, metadata.column_count
        ));
    }
    None
}

/// Cells in one `| a | b |` line; escaped pipes are cell content.
fn rendered_cells(line: &str) -> usize {
    let mut separators = 0usize;
    let mut escaped = false;
    for ch in line.trim_end().chars() {
        match ch {
            '\\' if !escaped => escaped = true,
            '|' if !escaped => separators += 1,
            _ => escaped = false,
        }
    }
    separators.saturating_sub(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunking::types::{
        sample_chunk, ContentType, HierarchicalPath, TableMetadata, TableRole,
    };

    fn section(number: &str) -> HierarchicalPath {
        HierarchicalPath {
            section: Some(number.to_string()),
            ..HierarchicalPath::default()
        }
    }

    fn validator() -> ChunkValidator {
        ChunkValidator::new(&ChunkerConfig::default())
    }

    fn codes(chunk: &Chunk) -> Vec<ViolationCode> {
        validator()
            .validate_chunk(chunk)
            .into_iter()
            .map(|violation| violation.code)
            .collect()
    }

    fn fragment(text: &str, boundary: Boundary) -> Chunk {
        let mut chunk = sample_chunk("doc", section("7.02"), text);
        chunk.is_complete_unit = false;
        chunk.boundary = boundary;
        chunk
    }

    #[test]
    fn well_formed_chunks_pass() {
        let text = "The Borrower shall deliver the annual audited financial statements within 120 days after year end.";
        assert!(codes(&sample_chunk("doc", section("5.01"), text)).is_empty());
        assert!(codes(&fragment(text, Boundary::Sentence)).is_empty());
    }

    #[test]
    fn empty_text_is_reported_alone() {
        let chunk = sample_chunk("doc", HierarchicalPath::default(), "  \n ");
        assert_eq!(codes(&chunk), vec![ViolationCode::Empty]);
    }

    #[test]
    fn size_limits_apply_to_fragments_but_not_hard_cuts() {
        let long = format!("{}.", "word ".repeat(260));
        assert_eq!(codes(&fragment(&long, Boundary::Sentence)), vec![ViolationCode::Size]);
        assert!(codes(&fragment(&long, Boundary::HardCut))
            .iter()
            .all(|code| *code != ViolationCode::Size));

        assert_eq!(codes(&fragment("Too short.", Boundary::Sentence)), vec![ViolationCode::Size]);
        assert!(codes(&sample_chunk("doc", section("7.03"), "Reserved.")).is_empty());
    }

    #[test]
    fn linked_previews_do_not_count_toward_size() {
        let mut chunk = sample_chunk("doc", section("7.02"), &format!("{}.", "word ".repeat(190)));
        chunk.text.push_str(&format!("\n\n--- Referenced sections ---\n[7.01] {}", "x ".repeat(100)));
        assert!(chunk.text.len() > 1000);
        assert!(codes(&chunk).is_empty());
    }

    #[test]
    fn terminal_punctuation_is_required_off_structural_boundaries() {
        let text = "The Borrower shall not permit the Consolidated Leverage Ratio to exceed the level set out in";
        assert_eq!(codes(&fragment(text, Boundary::Word)), vec![ViolationCode::Terminal]);
        assert!(codes(&fragment(&format!("{text} clause (a)"), Boundary::Semicolon)).is_empty());
        assert!(codes(&sample_chunk("doc", section("7.02"), text)).is_empty());
    }

    #[test]
    fn padded_tables_are_reported() {
        let grid = "| Covenant | Required | Actual |\n| --- | --- | --- |\n| Leverage Ratio | 4.50:1.00 |  |";
        let mut chunk = sample_chunk("doc", section("6.12"), grid);
        chunk.content_type = ContentType::Table;
        chunk.table = Some(TableMetadata {
            role: TableRole::CovenantMatrix,
            row_count: 2,
            column_count: 3,
            padded_rows: 1,
        });
        let violations = validator().validate_chunk(&chunk);
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].code, ViolationCode::Table);
        assert!(violations[0].message.contains("padded"));

        chunk.table = Some(TableMetadata {
            role: TableRole::CovenantMatrix,
            row_count: 2,
            column_count: 3,
            padded_rows: 0,
        });
        assert!(codes(&chunk).is_empty());
        assert_eq!(rendered_cells("| a \\| b | c |"), 2);
    }

    #[test]
    fn credit_agreement_chunks_need_structure() {
        let text = "This Credit Agreement is entered into as of March 1, 2024 among the parties hereto.";
        let preamble = sample_chunk("doc", HierarchicalPath::default(), text);
        assert_eq!(codes(&preamble), vec![ViolationCode::Structure]);

        let mut application = preamble.clone();
        application.document_type = DocumentType::CreditApplication;
        assert!(codes(&application).is_empty());

        let violations = validator().validate(&[preamble.clone(), preamble]);
        assert_eq!(count_by_code(&violations).get("V-STRUCTURE"), Some(&2));
    }
}
