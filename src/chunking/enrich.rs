use std::collections::HashSet;

use anyhow::{Context, Result};
use regex::Regex;

use super::config::{ChunkerConfig, estimate_tokens};
use super::text::floor_char_boundary;
use super::types::{Chunk, ChunkDraft, ChunkFlags, ContentType, HierarchicalPath};
use crate::document::Document;

const STOPWORDS: &[&str] = &["THE", "AND", "OR", "TO", "OF", "IN", "FOR", "WITH", "BY"];
const SECTION_HINT_WINDOW: usize = 500;

/// Derives citation metadata from chunk text: cross-references, defined
/// terms, numeric flags and a section hint.
#[derive(Debug)]
pub struct MetadataEnricher {
    section_list: Regex,
    section_item: Regex,
    clause_list: Regex,
    clause_item: Regex,
    quoted_term: Regex,
    capitalized_run: Regex,
    amount: Regex,
    percentage: Regex,
    ratio: Regex,
    date: Regex,
    pipe_row: Regex,
    section_hints: [Regex; 2],
    max_defined_terms: usize,
    chars_per_token: f64,
}

impl MetadataEnricher {
    pub fn new(config: &ChunkerConfig) -> Result<Self> {
        let reference = r"\d+(?:\.\d+)+(?:\([a-z0-9]{1,4}\))*";
        Ok(Self {
            section_list: Regex::new(&format!(
                r"(?i)\bSections?\s+\d+(?:\.\d+)*(?:\([a-z0-9]{{1,4}}\))*(?:(?:\s*,\s*(?:and\s+|or\s+)?|\s+(?:and|or|through|to)\s+)(?:Section\s+)?{reference})*"
            ))
            .context("failed to compile section reference regex")?,
            section_item: Regex::new(r"(\d+(?:\.\d+)*)((?:\([a-zA-Z0-9]{1,4}\))*)")
                .context("failed to compile section item regex")?,
            clause_list: Regex::new(
                r"(?i)\bclauses?\s+\([a-z]{1,4}\)(?:(?:\s*,\s*(?:and\s+|or\s+)?|\s+(?:and|or|through)\s+)\([a-z]{1,4}\))*",
            )
            .context("failed to compile clause reference regex")?,
            clause_item: Regex::new(r"\(([a-zA-Z]{1,4})\)")
                .context("failed to compile clause item regex")?,
            quoted_term: Regex::new(r#""([^"\n]{2,80})""#)
                .context("failed to compile quoted term regex")?,
            capitalized_run: Regex::new(r"\b[A-Z][A-Z0-9'&\-]+(?:[ \t]+[A-Z][A-Z0-9'&\-]+)+")
                .context("failed to compile capitalized run regex")?,
            amount: Regex::new(r"(?i)(?:U\.S\.\s?\$|\$|\bUSD\s?)\s?\d[\d,]*(?:\.\d+)?")
                .context("failed to compile amount regex")?,
            percentage: Regex::new(r"(?i)\d+(?:\.\d+)?\s?(?:%|percent\b|per cent\b)")
                .context("failed to compile percentage regex")?,
            ratio: Regex::new(r"\b\d+(?:\.\d+)?\s?:\s?\d+(?:\.\d+)?\b")
                .context("failed to compile ratio regex")?,
            date: Regex::new(
                r"\b(?:0?[1-9]|1[0-2])(?:/(?:0?[1-9]|[12]\d|3[01])/(?:\d{4}|\d{2})|-(?:0?[1-9]|[12]\d|3[01])-\d{4})\b",
            )
            .context("failed to compile date regex")?,
            pipe_row: Regex::new(r"(?m)^\|.*\|[ \t]*$").context("failed to compile pipe row regex")?,
            section_hints: [
                Regex::new(r"(?:SECTION|Section)\s+\d+(?:\.\d+)*")
                    .context("failed to compile section hint regex")?,
                Regex::new(r"(?:ARTICLE|Article)\s+(?:[IVXLCDM]+|\d+)\b")
                    .context("failed to compile article hint regex")?,
            ],
            max_defined_terms: config.max_defined_terms,
            chars_per_token: config.chars_per_token,
        })
    }

    pub fn enrich(&self, draft: ChunkDraft, document: &Document, page: Option<u32>) -> Chunk {
        let indexed = &draft.text[..draft.body_end];
        let body = draft.body();

        let cross_references = self.cross_references(indexed, &draft.path);
        let defined_terms = self.defined_terms(indexed);
        let flags = self.flags(indexed, draft.content_type);
        let section_hint = self.section_hint(body);
        let char_count = draft.text.chars().count();
        let estimated_tokens = estimate_tokens(char_count, self.chars_per_token);

        Chunk {
            chunk_id: String::new(),
            document_id: document.id.clone(),
            document_type: document.document_type,
            filename: document.filename.clone(),
            chunk_index: 0,
            total_chunks: 0,
            content_type: draft.content_type,
            path: draft.path,
            page: draft.page.or(page),
            char_count,
            estimated_tokens,
            is_complete_unit: draft.is_complete_unit,
            boundary: draft.boundary,
            source_start: draft.source_start,
            source_end: draft.source_end,
            body_start: draft.body_start,
            body_end: draft.body_end,
            defining_term: draft.defining_term,
            section_hint,
            cross_references,
            defined_terms,
            linked_references: Vec::new(),
            flags,
            table: draft.table,
            text: draft.text,
        }
    }

    /// Reference keys in source order, without duplicates or self-references.
    pub fn cross_references(&self, text: &str, path: &HierarchicalPath) -> Vec<String> {
        let mut found = Vec::<(usize, String)>::new();

        for list in self.section_list.find_iter(text) {
            for item in self.section_item.captures_iter(list.as_str()) {
                let (Some(number), Some(suffix)) = (item.get(1), item.get(2)) else {
                    continue;
                };
                let mut parts = split_suffix(suffix.as_str()).into_iter();
                let subsection = parts.next();
                let clause = parts.next();
                if is_self_reference(path, number.as_str(), subsection.as_deref()) {
                    continue;
                }

                let mut key = number.as_str().to_string();
                key.extend(subsection);
                key.extend(clause);
                found.push((list.start() + item.get(0).map_or(0, |m| m.start()), key));
            }
        }

        if let Some(own_section) = path.section.as_deref() {
            for list in self.clause_list.find_iter(text) {
                for item in self.clause_item.captures_iter(list.as_str()) {
                    let Some(label) = item.get(1) else {
                        continue;
                    };
                    let label = format!("({})", label.as_str().to_ascii_lowercase());
                    let key = match path.subsection.as_deref() {
                        Some(subsection) if is_small_roman(&label) && subsection != label => {
                            format!("{own_section}{subsection}{label}")
                        }
                        _ => format!("{own_section}{label}"),
                    };
                    let own_key = path.reference_key();
                    if own_key.as_deref() == Some(key.as_str())
                        || path.subsection.as_deref() == Some(label.as_str())
                    {
                        continue;
                    }
                    found.push((list.start() + item.get(0).map_or(0, |m| m.start()), key));
                }
            }
        }

        found.sort_by_key(|(offset, _)| *offset);
        let mut seen = HashSet::new();
        found
            .into_iter()
            .filter_map(|(_, key)| seen.insert(key.clone()).then_some(key))
            .collect()
    }

    /// Quoted terms and all-caps multi-word runs, first N in source order.
    pub fn defined_terms(&self, text: &str) -> Vec<String> {
        let mut found = Vec::<(usize, String)>::new();

        for captures in self.quoted_term.captures_iter(text) {
            let Some(term) = captures.get(1) else {
                continue;
            };
            let trimmed = term.as_str().trim();
            if !trimmed.is_empty() && trimmed.chars().any(char::is_alphabetic) {
                found.push((term.start(), trimmed.to_string()));
            }
        }

        for run in self.capitalized_run.find_iter(text) {
            if text[run.end()..].starts_with(|ch: char| ch.is_lowercase()) {
                continue;
            }
            if let Some(term) = trim_stopwords(run.as_str()) {
                found.push((run.start(), term));
            }
        }

        found.sort_by_key(|(offset, _)| *offset);
        let mut seen = HashSet::new();
        found
            .into_iter()
            .filter_map(|(_, term)| seen.insert(term.clone()).then_some(term))
            .take(self.max_defined_terms)
            .collect()
    }

    pub fn flags(&self, text: &str, content_type: ContentType) -> ChunkFlags {
        ChunkFlags {
            has_amount: self.amount.is_match(text),
            has_percentage: self.percentage.is_match(text),
            has_ratio: self.ratio.is_match(text),
            has_date: self.date.is_match(text),
            has_table: content_type == ContentType::Table || self.pipe_row.is_match(text),
        }
    }

    pub fn section_hint(&self, body: &str) -> Option<String> {
        let window = &body[..floor_char_boundary(body, SECTION_HINT_WINDOW)];
        self.section_hints
            .iter()
            .find_map(|regex| regex.find(window))
            .map(|found| found.as_str().to_string())
    }
}

fn split_suffix(suffix: &str) -> Vec<String> {
    suffix
        .split_inclusive(')')
        .filter(|part| !part.is_empty())
        .map(str::to_ascii_lowercase)
        .collect()
}

fn is_self_reference(path: &HierarchicalPath, section: &str, subsection: Option<&str>) -> bool {
    if path.section.as_deref() != Some(section) {
        return false;
    }
    match subsection {
        None => true,
        Some(subsection) => path.subsection.as_deref() == Some(subsection),
    }
}

fn is_small_roman(label: &str) -> bool {
    let inner = label.trim_start_matches('(').trim_end_matches(')');
    !inner.is_empty() && inner.chars().all(|ch| matches!(ch, 'i' | 'v' | 'x')) && inner.len() > 1
        || inner == "i"
}

fn trim_stopwords(run: &str) -> Option<String> {
    let words = run.split_whitespace().collect::<Vec<&str>>();
    let first = words.iter().position(|word| !STOPWORDS.contains(word))?;
    let last = words.iter().rposition(|word| !STOPWORDS.contains(word))?;
    let kept = &words[first..=last];
    (kept.len() >= 2).then(|| kept.join(" "))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn enricher() -> MetadataEnricher {
        MetadataEnricher::new(&ChunkerConfig::default()).expect("enricher")
    }

    fn path(section: &str, subsection: Option<&str>) -> HierarchicalPath {
        HierarchicalPath {
            section: Some(section.to_string()),
            subsection: subsection.map(str::to_string),
            ..HierarchicalPath::default()
        }
    }

    #[test]
    fn section_lists_yield_each_reference() {
        let refs = enricher().cross_references(
            "Subject to Sections 7.01, 7.02 and 7.04(b), and as set forth in Section 9.01(a)(iii), the Borrower may act.",
            &path("6.12", None),
        );
        assert_eq!(refs, vec!["7.01", "7.02", "7.04(b)", "9.01(a)(iii)"]);
    }

    #[test]
    fn self_references_are_excluded() {
        let enricher = enricher();
        let own = path("7.02", Some("(a)"));

        let refs = enricher.cross_references(
            "Liens permitted by this Section 7.02, Section 7.02(a), Section 7.02(b) and Section 7.01.",
            &own,
        );
        assert_eq!(refs, vec!["7.02(b)", "7.01"]);
    }

    #[test]
    fn clause_references_resolve_against_the_own_section() {
        let enricher = enricher();
        let refs = enricher.cross_references(
            "Liens described in clauses (c) and (d) above, but not clause (a).",
            &path("7.02", Some("(a)")),
        );
        assert_eq!(refs, vec!["7.02(c)", "7.02(d)"]);

        let refs = enricher.cross_references(
            "Amounts under clause (ii) of this paragraph.",
            &path("7.02", Some("(b)")),
        );
        assert_eq!(refs, vec!["7.02(b)(ii)"]);

        let refs = enricher.cross_references(
            "Amounts under clause (c).",
            &HierarchicalPath::default(),
        );
        assert!(refs.is_empty());
    }

    #[test]
    fn defined_terms_mix_quotes_and_capitals_in_source_order() {
        let terms = enricher().defined_terms(
            "\"Consolidated EBITDA\" means the amount reported to THE ADMINISTRATIVE AGENT and the \"Lenders\" under THE CREDIT AGREEMENT OF 2024, or TO THE.",
        );
        assert_eq!(
            terms,
            vec![
                "Consolidated EBITDA",
                "ADMINISTRATIVE AGENT",
                "Lenders",
                "CREDIT AGREEMENT"
            ]
        );
    }

    #[test]
    fn defined_terms_are_capped_at_ten() {
        let text = (0..15)
            .map(|index| format!("\"Term {index}\""))
            .collect::<Vec<String>>()
            .join(", ");
        let terms = enricher().defined_terms(&text);
        assert_eq!(terms.len(), 10);
        assert_eq!(terms[0], "Term 0");
        assert_eq!(terms[9], "Term 9");
    }

    #[test]
    fn flags_detect_numeric_cues() {
        let enricher = enricher();
        let flags = enricher.flags(
            "The Borrower shall maintain a Total Leverage Ratio not to exceed 4.50:1.00, tested quarterly.",
            ContentType::Covenant,
        );
        assert!(flags.has_ratio);
        assert!(!flags.has_percentage);
        assert!(!flags.has_amount);
        assert!(!flags.has_date);
        assert!(!flags.has_table);

        let flags = enricher.flags(
            "Commitments of $25,000,000 bear a fee of 0.375% per annum from 3/31/2024.",
            ContentType::Pricing,
        );
        assert!(flags.has_amount && flags.has_percentage && flags.has_date);
        assert!(!flags.has_ratio);

        let flags = enricher.flags("Grid:\n| A | B |\n| --- | --- |", ContentType::General);
        assert!(flags.has_table);
        assert!(enricher.flags("x", ContentType::Table).has_table);
        assert!(enricher.flags("fee of 5 percent", ContentType::General).has_percentage);
    }

    #[test]
    fn section_hint_prefers_sections_over_articles() {
        let enricher = enricher();
        assert_eq!(
            enricher.section_hint("ARTICLE VII\nNEGATIVE COVENANTS\nSection 7.01 Indebtedness."),
            Some("Section 7.01".to_string())
        );
        assert_eq!(
            enricher.section_hint("ARTICLE VII\nNEGATIVE COVENANTS"),
            Some("ARTICLE VII".to_string())
        );
        assert_eq!(enricher.section_hint("Notices."), None);
    }
}
