use tracing::{debug, warn};

use super::config::ChunkerConfig;
use super::normalize::{NormalizedText, PageRange, TextNormalizer};
use super::text::{floor_char_boundary, tail_on_word};
use super::types::{
    Boundary, ChunkDraft, ContentType, HierarchicalPath, TableMetadata, TableRole, TableUnit,
};
use crate::document::{SourcePage, SourceTable};
use crate::error::ChunkError;

const PRICING_CUES: &[&str] = &[
    "leverage",
    "margin",
    "rate",
    "pricing",
    "spread",
    "sofr",
    "libor",
    "bps",
    "basis points",
    "commitment fee",
    "level",
    "tier",
];

const COVENANT_CUES: &[&str] = &[
    "covenant",
    "ratio",
    "coverage",
    "minimum",
    "maximum",
    "test",
    "compliance",
    "required",
    "actual",
    "ebitda",
    "fixed charge",
    "capital expenditure",
];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableOutput {
    pub units: Vec<TableUnit>,
    pub conditions: Vec<ChunkError>,
}

#[derive(Debug)]
pub struct TableExtractor {
    context_chars: usize,
}

impl TableExtractor {
    pub fn new(config: &ChunkerConfig) -> Self {
        Self {
            context_chars: config.table_context_chars,
        }
    }

    pub fn extract(
        &self,
        normalizer: &TextNormalizer,
        normalized: &NormalizedText,
        pages: &[SourcePage],
    ) -> TableOutput {
        let mut output = TableOutput::default();

        for (page_index, page) in pages.iter().enumerate() {
            let page_number = page.number(page_index);
            let range = normalized.page_range(page_index);

            for (table_index, table) in page.tables.iter().enumerate() {
                let rows = clean_rows(normalizer, table);
                if rows.iter().flatten().all(String::is_empty) {
                    debug!(page = page_number, table_index, "skipping empty table grid");
                    continue;
                }

                let min_cells = rows.iter().map(Vec::len).min().unwrap_or(0);
                let max_cells = rows.iter().map(Vec::len).max().unwrap_or(0);
                let padded_rows = rows.iter().filter(|row| row.len() < max_cells).count();
                if min_cells != max_cells {
                    warn!(
                        page = page_number,
                        table_index, min_cells, max_cells, "padding ragged table rows"
                    );
                    output.conditions.push(ChunkError::TableRender {
                        page: page_number,
                        table_index,
                        min_cells,
                        max_cells,
                    });
                }

                let anchor = resolve_anchor(&normalized.text, range, table, &rows[0]);
                let context = tail_on_word(&normalized.text[..anchor], self.context_chars);
                let role = infer_role(&rows[0]);
                debug!(
                    page = page_number,
                    table_index,
                    role = role.as_str(),
                    rows = rows.len(),
                    anchor,
                    "extracted table"
                );

                output.units.push(TableUnit {
                    page: page_number,
                    table_index,
                    role,
                    context: context.to_string(),
                    anchor,
                    padded_rows,
                    rows,
                });
            }
        }

        output
    }

    /// Renders one table as a single chunk: preceding context, a blank line,
    /// then the grid.
    pub fn draft(&self, unit: &TableUnit, path: HierarchicalPath) -> ChunkDraft {
        let (grid, column_count) = render_grid(&unit.rows);
        let text = if unit.context.is_empty() {
            grid
        } else {
            format!("{}\n\n{grid}", unit.context)
        };

        ChunkDraft {
            body_start: 0,
            body_end: text.len(),
            text,
            source_start: unit.anchor,
            source_end: unit.anchor,
            path,
            content_type: ContentType::Table,
            is_complete_unit: true,
            boundary: Boundary::Structural,
            defining_term: None,
            table: Some(TableMetadata {
                role: unit.role,
                row_count: unit.rows.len(),
                column_count,
                padded_rows: unit.padded_rows,
            }),
            page: Some(unit.page),
        }
    }
}

fn clean_rows(normalizer: &TextNormalizer, table: &SourceTable) -> Vec<Vec<String>> {
    table
        .rows
        .iter()
        .map(|row| {
            row.iter()
                .map(|cell| normalizer.normalize_fragment(cell).replace('|', "\\|"))
                .collect::<Vec<String>>()
        })
        .collect()
}

/// Explicit loader anchor, else the page line opening with the header's
/// first cell, else the end of the page.
fn resolve_anchor(
    text: &str,
    range: Option<PageRange>,
    table: &SourceTable,
    header: &[String],
) -> usize {
    let Some(range) = range else {
        return text.len();
    };

    if let Some(offset) = table.anchor {
        return floor_char_boundary(text, range.start + offset.min(range.end - range.start));
    }

    if let Some(first_cell) = header.iter().find(|cell| !cell.is_empty()) {
        let first_cell = first_cell.replace("\\|", "|");
        let mut line_start = range.start;
        for line in text[range.start..range.end].split('\n') {
            if line.trim_start().starts_with(first_cell.as_str()) {
                return line_start;
            }
            line_start += line.len() + 1;
        }
    }

    range.end
}

pub fn infer_role(header: &[String]) -> TableRole {
    let joined = header.join(" ").to_lowercase();
    let words = joined
        .split(|ch: char| !ch.is_alphanumeric())
        .filter(|word| !word.is_empty())
        .collect::<Vec<&str>>();

    let mentions = |cue: &&str| {
        if cue.contains(' ') {
            joined.contains(*cue)
        } else {
            words.iter().any(|word| word.starts_with(*cue))
        }
    };

    if PRICING_CUES.iter().any(mentions) {
        TableRole::PricingGrid
    } else if COVENANT_CUES.iter().any(mentions) {
        TableRole::CovenantMatrix
    } else {
        TableRole::Generic
    }
}

/// Pipe-delimited grid with a `---` separator after the header. Short rows
/// are padded with empty cells. Returns the text and the column count.
pub fn render_grid(rows: &[Vec<String>]) -> (String, usize) {
    let col_count = rows.iter().map(Vec::len).max().unwrap_or(1).max(1);
    let padded = rows
        .iter()
        .map(|row| {
            let mut current = row.clone();
            current.resize(col_count, String::new());
            current
        })
        .collect::<Vec<Vec<String>>>();

    let header = padded
        .first()
        .cloned()
        .unwrap_or_else(|| vec![String::new(); col_count]);
    let mut lines = Vec::<String>::with_capacity(padded.len() + 1);
    lines.push(format!("| {} |", header.join(" | ")));
    lines.push(format!("| {} |", vec!["---"; col_count].join(" | ")));
    for row in padded.iter().skip(1) {
        lines.push(format!("| {} |", row.join(" | ")));
    }

    (lines.join("\n"), col_count)
}
