use std::fmt;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::util::{now_utc_string, read_json, sanitize_id_component, sha256_hex};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    CreditAgreement,
    ComplianceCertificate,
    CreditApplication,
    Unclassified,
}

impl DocumentType {
    pub fn as_str(self) -> &'static str {
        match self {
            DocumentType::CreditAgreement => "credit_agreement",
            DocumentType::ComplianceCertificate => "compliance_certificate",
            DocumentType::CreditApplication => "credit_application",
            DocumentType::Unclassified => "unclassified",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            DocumentType::CreditAgreement => "Credit Agreement",
            DocumentType::ComplianceCertificate => "Compliance Certificate",
            DocumentType::CreditApplication => "Credit Application",
            DocumentType::Unclassified => "Unclassified",
        }
    }

    /// Infers the type from document text when the loader declared none.
    /// Order matters: certificates often quote the agreement's title.
    pub fn identify(text: &str) -> Self {
        let lower = text.to_lowercase();
        if lower.contains("compliance certificate") {
            DocumentType::ComplianceCertificate
        } else if lower.contains("credit agreement") || lower.contains("loan agreement") {
            DocumentType::CreditAgreement
        } else if lower.contains("credit application") {
            DocumentType::CreditApplication
        } else if lower.contains("lsta") {
            DocumentType::CreditAgreement
        } else {
            DocumentType::Unclassified
        }
    }
}

impl fmt::Display for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Loader payload for one source file: page texts plus extracted grids.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourceDocument {
    #[serde(default)]
    pub document_id: Option<String>,
    pub filename: String,
    #[serde(default)]
    pub document_type: Option<DocumentType>,
    #[serde(default)]
    pub file_type: Option<String>,
    #[serde(default)]
    pub pages: Vec<SourcePage>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourcePage {
    #[serde(default)]
    pub page_number: Option<u32>,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub tables: Vec<SourceTable>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourceTable {
    pub rows: Vec<Vec<String>>,
    #[serde(default)]
    pub anchor: Option<usize>,
}

impl SourcePage {
    /// Declared page number, else the 1-based position in the payload.
    pub fn number(&self, index: usize) -> u32 {
        self.page_number.unwrap_or(index as u32 + 1)
    }
}

impl SourceDocument {
    pub fn has_content(&self) -> bool {
        self.pages.iter().any(|page| {
            !page.text.trim().is_empty()
                || page
                    .tables
                    .iter()
                    .any(|table| table.rows.iter().flatten().any(|cell| !cell.trim().is_empty()))
        })
    }

    /// Hash over page texts and cells, independent of payload formatting.
    pub fn content_sha256(&self) -> String {
        let cells = self.pages.iter().flat_map(|page| {
            std::iter::once(page.text.as_str()).chain(
                page.tables
                    .iter()
                    .flat_map(|table| table.rows.iter().flatten().map(String::as_str)),
            )
        });
        sha256_hex(cells)
    }

    pub fn resolved_id(&self, sha256: &str) -> String {
        if let Some(id) = self
            .document_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
        {
            return id.to_string();
        }

        let stem = Path::new(&self.filename)
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or(&self.filename);
        let stem = sanitize_id_component(stem);
        let prefix = if stem.is_empty() { "document" } else { &stem };
        format!("{prefix}-{}", &sha256[..12.min(sha256.len())])
    }
}

pub fn load_source_document(path: &Path) -> Result<SourceDocument> {
    let mut document: SourceDocument = read_json(path)
        .with_context(|| format!("failed to load loader payload {}", path.display()))?;
    if document.filename.trim().is_empty() {
        document.filename = path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or_default()
            .to_string();
    }
    Ok(document)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub filename: String,
    pub file_type: String,
    pub document_type: DocumentType,
    pub declared_type: bool,
    pub sha256: String,
    pub page_count: usize,
    pub ingested_at: String,
}

impl Document {
    /// Resolves identity and type; `text` is the normalized document text
    /// used for type inference when none was declared.
    pub fn resolve(source: &SourceDocument, text: &str) -> Self {
        let sha256 = source.content_sha256();
        let id = source.resolved_id(&sha256);
        let file_type = source.file_type.clone().unwrap_or_else(|| {
            Path::new(&source.filename)
                .extension()
                .and_then(|ext| ext.to_str())
                .map(str::to_ascii_lowercase)
                .unwrap_or_default()
        });
        let (document_type, declared_type) = match source.document_type {
            Some(declared) => (declared, true),
            None => (DocumentType::identify(text), false),
        };

        Self {
            id,
            filename: source.filename.clone(),
            file_type,
            document_type,
            declared_type,
            sha256,
            page_count: source.pages.len(),
            ingested_at: now_utc_string(),
        }
    }
}
