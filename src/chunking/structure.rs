use anyhow::{Context, Result};
use regex::{Captures, Regex};
use tracing::debug;

use super::types::{HierarchicalPath, MarkerLevel, StructuralSpan};

const MARKER_LINE_MAX_CHARS: usize = 80;
const HEADING_MAX_CHARS: usize = 200;

#[derive(Debug, Clone, PartialEq, Eq)]
struct Marker {
    line_start: usize,
    boundary: usize,
    levels: Vec<(MarkerLevel, String)>,
    heading: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StructureIndex {
    pub spans: Vec<StructuralSpan>,
    pub marker_count: usize,
}

/// Finds article and section markers and cuts the text into spans at every
/// marker. Markers only count at the start of a line that opens a new block,
/// so in-sentence references such as "...pursuant to\nSection 7.02" are
/// left alone.
#[derive(Debug)]
pub struct StructureIndexer {
    article_marker: Regex,
    section_marker: Regex,
    toc_line: Regex,
}

impl StructureIndexer {
    pub fn new() -> Result<Self> {
        Ok(Self {
            article_marker: Regex::new(r"(?im)^[ \t]*ARTICLE[ \t]+([IVXLCDM]+|\d+)\b")
                .context("failed to compile article marker regex")?,
            section_marker: Regex::new(
                r"(?im)^[ \t]*Section[ \t]+(\d+(?:\.\d+)*)(\([a-z]\))?(\([ivxlcdm]+\))?",
            )
            .context("failed to compile section marker regex")?,
            toc_line: Regex::new(r"\.{3,}\s*\d+\s*$")
                .context("failed to compile table-of-contents line regex")?,
        })
    }

    pub fn index(&self, text: &str) -> StructureIndex {
        let markers = self.detect_markers(text);

        let mut spans = Vec::with_capacity(markers.len() + 1);
        let mut path = HierarchicalPath::default();
        let mut level = None;
        let mut heading = None;
        let mut cursor = 0usize;

        for marker in &markers {
            if marker.boundary > cursor {
                spans.push(make_span(text, cursor, marker.boundary, &path, level, &heading));
            }

            for (marker_level, label) in &marker.levels {
                path.descend(*marker_level, label);
            }
            level = marker.levels.last().map(|(marker_level, _)| *marker_level);
            heading = Some(marker.heading.clone());
            cursor = marker.boundary;
        }

        if cursor < text.len() {
            spans.push(make_span(text, cursor, text.len(), &path, level, &heading));
        }

        for span in &spans {
            debug!(
                path = %span.path,
                start = span.start,
                end = span.end,
                "indexed structural span"
            );
        }

        StructureIndex {
            spans,
            marker_count: markers.len(),
        }
    }

    fn detect_markers(&self, text: &str) -> Vec<Marker> {
        let mut markers = Vec::new();

        for captures in self.article_marker.captures_iter(text) {
            let Some(numeral) = captures.get(1) else {
                continue;
            };
            let levels = vec![(MarkerLevel::Article, numeral.as_str().to_ascii_uppercase())];
            if let Some(marker) = self.marker_at(text, &captures, levels) {
                markers.push(marker);
            }
        }

        for captures in self.section_marker.captures_iter(text) {
            let Some(number) = captures.get(1) else {
                continue;
            };
            let mut levels = vec![(MarkerLevel::Section, number.as_str().to_string())];
            if let Some(letter) = captures.get(2) {
                levels.push((MarkerLevel::Subsection, letter.as_str().to_ascii_lowercase()));
            }
            if let Some(numeral) = captures.get(3) {
                levels.push((MarkerLevel::Clause, numeral.as_str().to_ascii_lowercase()));
            }
            if let Some(marker) = self.marker_at(text, &captures, levels) {
                markers.push(marker);
            }
        }

        markers.sort_by_key(|marker| marker.line_start);
        markers
    }

    fn marker_at(
        &self,
        text: &str,
        captures: &Captures<'_>,
        levels: Vec<(MarkerLevel, String)>,
    ) -> Option<Marker> {
        let whole = captures.get(0)?;
        let line_start = whole.start();
        let line_end = text[line_start..]
            .find('\n')
            .map(|index| line_start + index)
            .unwrap_or(text.len());
        let line = text[line_start..line_end].trim();

        if self.toc_line.is_match(line) || !self.opens_block(text, line_start) {
            return None;
        }

        let boundary = text[..line_start].trim_end().len();
        let heading = line.chars().take(HEADING_MAX_CHARS).collect::<String>();

        Some(Marker {
            line_start,
            boundary,
            levels,
            heading,
        })
    }

    /// True when the line starting at `line_start` follows a block break:
    /// start of text, a blank line, terminal punctuation, an all-caps
    /// heading, or a short marker line.
    fn opens_block(&self, text: &str, line_start: usize) -> bool {
        let before = text[..line_start].trim_end_matches([' ', '\t']);
        if before.trim().is_empty() {
            return true;
        }

        let Some(without_newline) = before.strip_suffix('\n') else {
            return false;
        };
        let previous = without_newline
            .rsplit('\n')
            .next()
            .unwrap_or_default()
            .trim();

        if previous.is_empty() || previous.ends_with(['.', ':', ';', ')', ']']) {
            return true;
        }
        if is_heading_line(previous) {
            return true;
        }

        previous.chars().count() <= MARKER_LINE_MAX_CHARS
            && (self.article_marker.is_match(previous) || self.section_marker.is_match(previous))
    }
}

fn make_span(
    text: &str,
    start: usize,
    end: usize,
    path: &HierarchicalPath,
    level: Option<MarkerLevel>,
    heading: &Option<String>,
) -> StructuralSpan {
    StructuralSpan {
        start,
        end,
        path: path.clone(),
        level,
        heading: heading.clone(),
        text: text[start..end].to_string(),
    }
}

fn is_heading_line(line: &str) -> bool {
    line.chars().any(char::is_alphabetic) && !line.chars().any(char::is_lowercase)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn concatenated(spans: &[StructuralSpan]) -> String {
        spans.iter().map(|span| span.text.as_str()).collect()
    }

    #[test]
    fn inline_suffix_yields_deepest_path() {
        let indexer = StructureIndexer::new().expect("indexer");
        let text = "Section 6.12(a) The Borrower shall maintain a Total Leverage Ratio not to exceed 4.50:1.00, tested quarterly.";

        let index = indexer.index(text);
        assert_eq!(index.marker_count, 1);
        assert_eq!(index.spans.len(), 1);
        assert_eq!(index.spans[0].path.segments(), vec!["6.12", "(a)"]);
        assert_eq!(index.spans[0].level, Some(MarkerLevel::Subsection));
        assert_eq!(index.spans[0].text, text);
    }

    #[test]
    fn articles_and_sections_partition_the_text() {
        let indexer = StructureIndexer::new().expect("indexer");
        let text = "PRELIMINARY STATEMENTS\nThe parties agree as follows:\nARTICLE I\nDEFINITIONS\nSection 1.01 Defined Terms. Terms are defined below.\nSection 1.02 Terms Generally. Words include the plural.\n\nARTICLE VII\nNEGATIVE COVENANTS\nSection 7.01 Indebtedness. The Borrower shall not, and shall not permit any Subsidiary to, incur any debt except as permitted by\nSection 7.02 of this Agreement.";

        let index = indexer.index(text);
        let keys = index
            .spans
            .iter()
            .map(|span| span.path.key())
            .collect::<Vec<String>>();
        assert_eq!(keys, vec!["", "I", "I/1.01", "I/1.02", "VII", "VII/7.01"]);
        assert_eq!(concatenated(&index.spans), text);

        for span in &index.spans[1..] {
            assert!(text[span.start..].starts_with(char::is_whitespace));
        }
        assert_eq!(
            index.spans[2].heading.as_deref(),
            Some("Section 1.01 Defined Terms. Terms are defined below.")
        );
    }

    #[test]
    fn section_marker_clears_deeper_levels() {
        let indexer = StructureIndexer::new().expect("indexer");
        let text = "Section 6.12(a) Leverage. Tested quarterly.\nSection 6.13 Interest Coverage. Tested quarterly.";

        let index = indexer.index(text);
        assert_eq!(index.spans.len(), 2);
        assert_eq!(index.spans[1].path.segments(), vec!["6.13"]);
    }

    #[test]
    fn table_of_contents_lines_are_not_markers() {
        let indexer = StructureIndexer::new().expect("indexer");
        let text = "TABLE OF CONTENTS\nSection 7.01 Indebtedness ........ 45\nSection 7.02 Liens ........ 47\n\nSection 7.01 Indebtedness. The Borrower shall not incur debt.";

        let index = indexer.index(text);
        assert_eq!(index.marker_count, 1);
        assert_eq!(index.spans.len(), 2);
        assert!(index.spans[0].path.is_empty());
        assert_eq!(index.spans[1].path.key(), "7.01");
    }

    #[test]
    fn unmarked_text_is_a_single_span() {
        let indexer = StructureIndexer::new().expect("indexer");
        let text = "This letter confirms the borrowing request.";

        let index = indexer.index(text);
        assert_eq!(index.marker_count, 0);
        assert_eq!(index.spans.len(), 1);
        assert!(index.spans[0].path.is_empty());
        assert_eq!(index.spans[0].level, None);
    }
}
