use std::fmt;

use serde::{Deserialize, Serialize};

use crate::document::DocumentType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    Definition,
    Covenant,
    Pricing,
    EventOfDefault,
    Representation,
    ComplianceCalculation,
    Table,
    General,
}

impl ContentType {
    pub fn as_str(self) -> &'static str {
        match self {
            ContentType::Definition => "definition",
            ContentType::Covenant => "covenant",
            ContentType::Pricing => "pricing",
            ContentType::EventOfDefault => "event_of_default",
            ContentType::Representation => "representation",
            ContentType::ComplianceCalculation => "compliance_calculation",
            ContentType::Table => "table",
            ContentType::General => "general",
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarkerLevel {
    Article,
    Section,
    Subsection,
    Clause,
}

/// Location of a span inside the article / section / subsection / clause
/// hierarchy. Any component may be missing, including leading ones: a
/// document without articles yields paths such as `6.12/(a)`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HierarchicalPath {
    pub article: Option<String>,
    pub section: Option<String>,
    pub subsection: Option<String>,
    pub clause: Option<String>,
}

impl HierarchicalPath {
    pub fn is_empty(&self) -> bool {
        self.segments().is_empty()
    }

    pub fn segments(&self) -> Vec<&str> {
        [&self.article, &self.section, &self.subsection, &self.clause]
            .into_iter()
            .filter_map(|component| component.as_deref())
            .collect()
    }

    pub fn key(&self) -> String {
        self.segments().join("/")
    }

    /// Applies a marker, clearing every deeper component.
    pub fn descend(&mut self, level: MarkerLevel, label: &str) {
        let label = Some(label.to_string());
        match level {
            MarkerLevel::Article => {
                self.article = label;
                self.section = None;
                self.subsection = None;
                self.clause = None;
            }
            MarkerLevel::Section => {
                self.section = label;
                self.subsection = None;
                self.clause = None;
            }
            MarkerLevel::Subsection => {
                self.subsection = label;
                self.clause = None;
            }
            MarkerLevel::Clause => {
                self.clause = label;
            }
        }
    }

    pub fn component(&self, level: MarkerLevel) -> Option<&str> {
        match level {
            MarkerLevel::Article => self.article.as_deref(),
            MarkerLevel::Section => self.section.as_deref(),
            MarkerLevel::Subsection => self.subsection.as_deref(),
            MarkerLevel::Clause => self.clause.as_deref(),
        }
    }

    pub fn extended(&self, level: MarkerLevel, label: &str) -> Self {
        let mut path = self.clone();
        path.descend(level, label);
        path
    }

    /// Key used by cross-references: `7.02`, `7.02(a)`, `7.02(a)(i)`.
    pub fn reference_key(&self) -> Option<String> {
        let section = self.section.as_deref()?;
        let mut key = section.to_string();
        if let Some(subsection) = self.subsection.as_deref() {
            key.push_str(subsection);
        }
        if let Some(clause) = self.clause.as_deref() {
            key.push_str(clause);
        }
        Some(key)
    }

    /// Every key a chunk at this path answers to, shallowest first.
    pub fn reference_keys(&self) -> Vec<String> {
        let Some(section) = self.section.as_deref() else {
            return Vec::new();
        };

        let mut keys = vec![section.to_string()];
        let mut current = section.to_string();
        if let Some(subsection) = self.subsection.as_deref() {
            current.push_str(subsection);
            keys.push(current.clone());
        }
        if let Some(clause) = self.clause.as_deref() {
            current.push_str(clause);
            keys.push(current);
        }
        keys
    }
}

impl fmt::Display for HierarchicalPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructuralSpan {
    pub start: usize,
    pub end: usize,
    pub path: HierarchicalPath,
    pub level: Option<MarkerLevel>,
    pub heading: Option<String>,
    pub text: String,
}

/// What ended a chunk's body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Boundary {
    Structural,
    Subsection,
    DefinitionUnit,
    ExceptionClause,
    SentenceLine,
    Semicolon,
    Sentence,
    CommaLine,
    Paragraph,
    Line,
    Word,
    HardCut,
}

impl Boundary {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Structural => "structural",
            Self::Subsection => "subsection",
            Self::DefinitionUnit => "definition_unit",
            Self::ExceptionClause => "exception_clause",
            Self::SentenceLine => "sentence_line",
            Self::Semicolon => "semicolon",
            Self::Sentence => "sentence",
            Self::CommaLine => "comma_line",
            Self::Paragraph => "paragraph",
            Self::Line => "line",
            Self::Word => "word",
            Self::HardCut => "hard_cut",
        }
    }

    pub fn is_structural(self) -> bool {
        matches!(
            self,
            Boundary::Structural | Boundary::Subsection | Boundary::DefinitionUnit
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TableRole {
    PricingGrid,
    CovenantMatrix,
    Generic,
}

impl TableRole {
    pub fn as_str(self) -> &'static str {
        match self {
            TableRole::PricingGrid => "pricing-grid",
            TableRole::CovenantMatrix => "covenant-matrix",
            TableRole::Generic => "generic",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableUnit {
    pub page: u32,
    pub table_index: usize,
    pub rows: Vec<Vec<String>>,
    pub role: TableRole,
    pub context: String,
    pub anchor: usize,
    pub padded_rows: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableMetadata {
    pub role: TableRole,
    pub row_count: usize,
    pub column_count: usize,
    pub padded_rows: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkFlags {
    pub has_amount: bool,
    pub has_percentage: bool,
    pub has_ratio: bool,
    pub has_date: bool,
    pub has_table: bool,
}

/// Splitter / table output before metadata enrichment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkDraft {
    pub text: String,
    pub source_start: usize,
    pub source_end: usize,
    pub body_start: usize,
    pub body_end: usize,
    pub path: HierarchicalPath,
    pub content_type: ContentType,
    pub is_complete_unit: bool,
    pub boundary: Boundary,
    pub defining_term: Option<String>,
    pub table: Option<TableMetadata>,
    pub page: Option<u32>,
}

impl ChunkDraft {
    pub fn body(&self) -> &str {
        &self.text[self.body_start..self.body_end]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub chunk_id: String,
    pub document_id: String,
    pub document_type: DocumentType,
    pub filename: String,
    pub chunk_index: usize,
    pub total_chunks: usize,
    pub content_type: ContentType,
    pub path: HierarchicalPath,
    pub page: Option<u32>,
    pub text: String,
    pub char_count: usize,
    pub estimated_tokens: usize,
    pub is_complete_unit: bool,
    pub boundary: Boundary,
    pub source_start: usize,
    pub source_end: usize,
    pub body_start: usize,
    pub body_end: usize,
    pub defining_term: Option<String>,
    pub section_hint: Option<String>,
    pub cross_references: Vec<String>,
    pub defined_terms: Vec<String>,
    pub linked_references: Vec<String>,
    pub flags: ChunkFlags,
    pub table: Option<TableMetadata>,
}

impl Chunk {
    /// The verbatim slice of normalized source text this chunk covers.
    pub fn body(&self) -> &str {
        &self.text[self.body_start..self.body_end]
    }

    /// Prefix plus body, without any appended reference previews.
    pub fn indexed_text(&self) -> &str {
        &self.text[..self.body_end]
    }

    #[cfg(test)]
    pub fn appended_text(&self) -> &str {
        &self.text[self.body_end..]
    }

    pub fn is_table(&self) -> bool {
        self.content_type == ContentType::Table
    }
}

#[cfg(test)]
pub(crate) fn sample_chunk(document_id: &str, path: HierarchicalPath, text: &str) -> Chunk {
    Chunk {
        chunk_id: format!("{document_id}:{}", path.key()),
        document_id: document_id.to_string(),
        document_type: DocumentType::CreditAgreement,
        filename: format!("{document_id}.pdf"),
        chunk_index: 0,
        total_chunks: 1,
        content_type: ContentType::General,
        path,
        page: Some(1),
        text: text.to_string(),
        char_count: text.chars().count(),
        estimated_tokens: text.len() / 4,
        is_complete_unit: true,
        boundary: Boundary::Structural,
        source_start: 0,
        source_end: text.len(),
        body_start: 0,
        body_end: text.len(),
        defining_term: None,
        section_hint: None,
        cross_references: Vec::new(),
        defined_terms: Vec::new(),
        linked_references: Vec::new(),
        flags: ChunkFlags::default(),
        table: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_keys_skip_missing_levels() {
        let path = HierarchicalPath {
            article: Some("VII".to_string()),
            section: Some("7.02".to_string()),
            subsection: Some("(a)".to_string()),
            clause: Some("(iv)".to_string()),
        };
        assert_eq!(path.key(), "VII/7.02/(a)/(iv)");
        assert_eq!(path.reference_key().as_deref(), Some("7.02(a)(iv)"));
        assert_eq!(path.reference_keys(), vec!["7.02", "7.02(a)", "7.02(a)(iv)"]);

        let preamble = HierarchicalPath::default();
        assert!(preamble.is_empty());
        assert_eq!(preamble.reference_key(), None);
    }

    #[test]
    fn descend_clears_deeper_levels() {
        let mut path = HierarchicalPath::default();
        path.descend(MarkerLevel::Article, "VI");
        path.descend(MarkerLevel::Section, "6.12");
        path.descend(MarkerLevel::Subsection, "(a)");
        path.descend(MarkerLevel::Section, "6.13");
        assert_eq!(path.segments(), vec!["VI", "6.13"]);

        path.descend(MarkerLevel::Article, "VII");
        assert_eq!(path.segments(), vec!["VII"]);
    }

    #[test]
    fn chunk_slices_separate_prefix_body_and_appendix() {
        let mut chunk = sample_chunk("doc", HierarchicalPath::default(), "(continued) body text");
        chunk.body_start = 12;
        chunk.text.push_str("\n\nappendix");
        assert_eq!(chunk.body(), "body text");
        assert_eq!(chunk.indexed_text(), "(continued) body text");
        assert_eq!(chunk.appended_text(), "\n\nappendix");
    }
}
