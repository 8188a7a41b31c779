use anyhow::{Context, Result};
use regex::Regex;
use tracing::{debug, warn};

use super::classify::defined_term_of;
use super::config::{ChunkerConfig, SizePolicy};
use super::text::{ceil_char_boundary, floor_char_boundary, tail_on_word};
use super::types::{
    Boundary, ChunkDraft, ContentType, HierarchicalPath, MarkerLevel, StructuralSpan,
};
use crate::error::ChunkError;

const CONTINUED_LABEL: &str = "(continued)";

struct Separator {
    pattern: &'static str,
    /// Offset of the cut inside the pattern; the byte at the cut is whitespace.
    cut_offset: usize,
    boundary: Boundary,
}

const SEPARATORS: [Separator; 7] = [
    Separator {
        pattern: ".\n",
        cut_offset: 1,
        boundary: Boundary::SentenceLine,
    },
    Separator {
        pattern: "; ",
        cut_offset: 1,
        boundary: Boundary::Semicolon,
    },
    Separator {
        pattern: ". ",
        cut_offset: 1,
        boundary: Boundary::Sentence,
    },
    Separator {
        pattern: ",\n",
        cut_offset: 1,
        boundary: Boundary::CommaLine,
    },
    Separator {
        pattern: "\n\n",
        cut_offset: 0,
        boundary: Boundary::Paragraph,
    },
    Separator {
        pattern: "\n",
        cut_offset: 0,
        boundary: Boundary::Line,
    },
    Separator {
        pattern: " ",
        cut_offset: 0,
        boundary: Boundary::Word,
    },
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Strategy {
    DefinitionUnits,
    Letters,
    Romans,
    Exceptions,
    Separator(usize),
    HardCut,
}

#[derive(Debug, Clone)]
struct WorkItem {
    start: usize,
    end: usize,
    path: HierarchicalPath,
    strategy: Strategy,
    term: Option<String>,
    /// Set once separator-level splitting starts; fragments of one unit
    /// share overlap and continuation labels.
    unit: Option<usize>,
    end_boundary: Boundary,
}

impl WorkItem {
    fn len(&self) -> usize {
        self.end - self.start
    }

    fn child(&self, start: usize, end: usize, strategy: Strategy) -> Self {
        Self {
            start,
            end,
            strategy,
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone)]
struct Piece {
    start: usize,
    end: usize,
    path: HierarchicalPath,
    term: Option<String>,
    unit: Option<usize>,
    boundary: Boundary,
    complete: bool,
}

#[derive(Debug, Clone)]
struct SubMarker {
    offset: usize,
    label: String,
    level: MarkerLevel,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SplitOutput {
    pub drafts: Vec<ChunkDraft>,
    pub conditions: Vec<ChunkError>,
}

/// Bounds a structural span to its content type's size policy.
///
/// Oversized spans are cut at the most meaningful boundary available,
/// trying in order: definition units, letter subsections, roman clauses,
/// covenant exception clauses, separators from sentence ends down to single
/// spaces, and finally a hard cut. Work is an explicit stack so arbitrarily
/// nested subdivisions never recurse.
#[derive(Debug)]
pub struct BoundedSplitter {
    subsection_marker: Regex,
    definition_start: Regex,
    exception_clause: Regex,
    min_chunk_chars: usize,
}

impl BoundedSplitter {
    pub fn new(config: &ChunkerConfig) -> Result<Self> {
        Ok(Self {
            subsection_marker: Regex::new(r"\(([a-z]{1,2}|[ivxlcdm]{1,6})\)\s")
                .context("failed to compile subsection marker regex")?,
            definition_start: Regex::new(
                r#"(?m)^[ \t]*"([^"\n]{1,120})"\s+(?:means|shall mean|has the meaning)\b"#,
            )
            .context("failed to compile definition start regex")?,
            exception_clause: Regex::new(
                r"(?i)\b(?:provided,?\s+(?:however,?\s+)?that|except\s+that|excluding)\b",
            )
            .context("failed to compile exception clause regex")?,
            min_chunk_chars: config.min_chunk_chars,
        })
    }

    pub fn split(
        &self,
        text: &str,
        span: &StructuralSpan,
        content_type: ContentType,
        policy: SizePolicy,
    ) -> SplitOutput {
        let mut output = SplitOutput::default();
        if span.start >= span.end {
            return output;
        }

        let first_strategy = if content_type == ContentType::Definition {
            Strategy::DefinitionUnits
        } else {
            Strategy::Letters
        };

        let mut stack = vec![WorkItem {
            start: span.start,
            end: span.end,
            path: span.path.clone(),
            strategy: first_strategy,
            term: None,
            unit: None,
            end_boundary: Boundary::Structural,
        }];
        let mut pieces = Vec::new();
        let mut next_unit = 0usize;

        while let Some(mut item) = stack.pop() {
            let reserve = label_reserve(content_type, item.term.as_deref());
            let budget = body_budget(policy, reserve);

            match item.unit {
                None if item.len() + reserve <= policy.max_chars => {
                    pieces.push(piece(&item, item.end_boundary, true));
                    continue;
                }
                Some(_) if item.len() <= budget => {
                    pieces.push(piece(&item, item.end_boundary, false));
                    continue;
                }
                _ => {}
            }

            match item.strategy {
                Strategy::DefinitionUnits => {
                    let starts = self.definition_starts(text, item.start, item.end);
                    if starts.len() >= 2 {
                        let offsets =
                            starts.iter().map(|(offset, _)| *offset).collect::<Vec<usize>>();
                        let children = split_at_markers(text, &item, &offsets, Strategy::Letters)
                            .into_iter()
                            .zip(starts)
                            .map(|(mut child, (_, term))| {
                                child.term = Some(term);
                                child
                            })
                            .collect::<Vec<WorkItem>>();
                        push_children(&mut stack, children, Boundary::DefinitionUnit);
                    } else {
                        item.term = starts
                            .into_iter()
                            .next()
                            .map(|(_, term)| term)
                            .or_else(|| defined_term_of(&text[item.start..item.end]));
                        item.strategy = Strategy::Letters;
                        stack.push(item);
                    }
                }
                Strategy::Letters | Strategy::Romans => {
                    let level = if item.strategy == Strategy::Letters {
                        MarkerLevel::Subsection
                    } else {
                        MarkerLevel::Clause
                    };
                    let next = if item.strategy == Strategy::Letters {
                        Strategy::Romans
                    } else {
                        fragment_strategy(content_type)
                    };

                    let markers = self
                        .sub_markers(text, item.start, item.end)
                        .into_iter()
                        .filter(|marker| marker.level == level)
                        .collect::<Vec<SubMarker>>();

                    // A span opened by its own inline marker, e.g. `Section 6.12(a)`,
                    // keeps its lead-in under that path.
                    let keeps_lead_in = item.path.component(level).is_some()
                        && markers.first().is_some_and(|marker| {
                            !text[item.start..marker.offset].trim().is_empty()
                        });

                    if markers.len() + usize::from(keeps_lead_in) >= 2 {
                        let mut offsets = Vec::with_capacity(markers.len() + 1);
                        let mut labels = Vec::with_capacity(markers.len() + 1);
                        if keeps_lead_in {
                            offsets.push(item.start);
                            labels.push(None);
                        }
                        for marker in markers {
                            offsets.push(marker.offset);
                            labels.push(Some(marker.label));
                        }

                        let children = split_at_markers(text, &item, &offsets, next)
                            .into_iter()
                            .zip(labels)
                            .map(|(mut child, label)| {
                                if let Some(label) = label {
                                    child.path = child.path.extended(level, &label);
                                }
                                child
                            })
                            .collect::<Vec<WorkItem>>();
                        push_children(&mut stack, children, Boundary::Subsection);
                    } else {
                        item.strategy = next;
                        stack.push(item);
                    }
                }
                Strategy::Exceptions => {
                    let unit = *item.unit.get_or_insert_with(|| {
                        next_unit += 1;
                        next_unit
                    });
                    match self.exception_cut(text, &item, budget) {
                        Some(cut) => {
                            let head = Piece {
                                end: cut,
                                unit: Some(unit),
                                ..piece(&item, Boundary::ExceptionClause, false)
                            };
                            pieces.push(head);
                            stack.push(item.child(cut, item.end, Strategy::Exceptions));
                        }
                        None => {
                            item.strategy = Strategy::Separator(0);
                            stack.push(item);
                        }
                    }
                }
                Strategy::Separator(index) => {
                    let unit = *item.unit.get_or_insert_with(|| {
                        next_unit += 1;
                        next_unit
                    });
                    let separator = &SEPARATORS[index];
                    match self.separator_cut(text, &item, budget, separator) {
                        Some(cut) => {
                            let head = Piece {
                                end: cut,
                                unit: Some(unit),
                                ..piece(&item, separator.boundary, false)
                            };
                            pieces.push(head);
                            stack.push(item.child(cut, item.end, fragment_strategy(content_type)));
                        }
                        None => {
                            item.strategy = if index + 1 < SEPARATORS.len() {
                                Strategy::Separator(index + 1)
                            } else {
                                Strategy::HardCut
                            };
                            stack.push(item);
                        }
                    }
                }
                Strategy::HardCut => {
                    let unit = *item.unit.get_or_insert_with(|| {
                        next_unit += 1;
                        next_unit
                    });
                    let target = (item.start + budget)
                        .min(item.end.saturating_sub(self.min_chunk_chars))
                        .max(item.start + budget / 2);
                    let mut cut = floor_char_boundary(text, target);
                    if cut <= item.start {
                        cut = ceil_char_boundary(text, item.start + 1);
                    }

                    let condition = ChunkError::OversizeUnsplittable {
                        path: item.path.key(),
                        len: item.len(),
                        max: policy.max_chars,
                    };
                    warn!(path = %item.path, len = item.len(), max = policy.max_chars, "hard cut");
                    output.conditions.push(condition);

                    let head = Piece {
                        end: cut,
                        unit: Some(unit),
                        ..piece(&item, Boundary::HardCut, false)
                    };
                    pieces.push(head);
                    stack.push(item.child(cut, item.end, fragment_strategy(content_type)));
                }
            }
        }

        debug!(
            path = %span.path,
            content_type = %content_type,
            pieces = pieces.len(),
            "split structural span"
        );

        output.drafts = compose_drafts(text, pieces, content_type, policy);
        output
    }

    fn definition_starts(&self, text: &str, start: usize, end: usize) -> Vec<(usize, String)> {
        self.definition_start
            .captures_iter(&text[start..end])
            .filter_map(|captures| {
                let whole = captures.get(0)?;
                let term = captures.get(1)?.as_str().trim().to_string();
                let offset = start + whole.start();
                let at_line_start = offset == 0 || text[..offset].ends_with('\n');
                (at_line_start && !term.is_empty()).then_some((offset, term))
            })
            .collect()
    }

    /// Parenthesized markers that open a subsection or clause. `(i)`, `(v)`
    /// and `(x)` are letters only when they continue a letter run.
    fn sub_markers(&self, text: &str, start: usize, end: usize) -> Vec<SubMarker> {
        let mut markers = Vec::new();
        let mut last_letter: Option<char> = None;

        for captures in self.subsection_marker.captures_iter(&text[start..end]) {
            let (Some(whole), Some(label)) = (captures.get(0), captures.get(1)) else {
                continue;
            };
            let offset = start + whole.start();
            if !opens_clause(&text[start..offset]) {
                continue;
            }

            let label = label.as_str();
            let level = if is_letter_label(label, last_letter) {
                last_letter = label.chars().next();
                MarkerLevel::Subsection
            } else if is_roman(label) {
                MarkerLevel::Clause
            } else {
                continue;
            };

            markers.push(SubMarker {
                offset,
                label: format!("({label})"),
                level,
            });
        }

        markers
    }

    fn exception_cut(&self, text: &str, item: &WorkItem, budget: usize) -> Option<usize> {
        let (floor, limit) = self.cut_window(item, budget)?;
        let search_end = ceil_char_boundary(text, (limit + 16).min(item.end));

        self.exception_clause
            .find_iter(&text[item.start..search_end])
            .filter_map(|found| {
                let phrase = item.start + found.start();
                let cut = text[..phrase].trim_end().len();
                (cut < phrase && cut >= floor && cut <= limit).then_some(cut)
            })
            .last()
    }

    fn separator_cut(
        &self,
        text: &str,
        item: &WorkItem,
        budget: usize,
        separator: &Separator,
    ) -> Option<usize> {
        let (floor, limit) = self.cut_window(item, budget)?;
        let search_start = ceil_char_boundary(text, floor.saturating_sub(separator.cut_offset));
        let search_end = floor_char_boundary(
            text,
            (limit + separator.pattern.len() - separator.cut_offset).min(item.end),
        );
        if search_start >= search_end {
            return None;
        }

        text[search_start..search_end]
            .match_indices(separator.pattern)
            .map(|(index, _)| search_start + index + separator.cut_offset)
            .filter(|cut| *cut >= floor && *cut <= limit)
            .last()
    }

    /// Allowed cut positions: the head keeps at least half the budget and the
    /// tail keeps at least the minimum chunk size.
    fn cut_window(&self, item: &WorkItem, budget: usize) -> Option<(usize, usize)> {
        let floor = item.start + budget / 2;
        let limit = (item.start + budget).min(item.end.saturating_sub(self.min_chunk_chars));
        (floor <= limit).then_some((floor, limit))
    }
}

fn fragment_strategy(content_type: ContentType) -> Strategy {
    if content_type == ContentType::Covenant {
        Strategy::Exceptions
    } else {
        Strategy::Separator(0)
    }
}

fn label_reserve(content_type: ContentType, term: Option<&str>) -> usize {
    match (content_type, term) {
        (ContentType::Definition, Some(term)) => term.len() + 2 + 1 + CONTINUED_LABEL.len() + 2,
        (ContentType::Covenant, _) => CONTINUED_LABEL.len() + 2,
        _ => 1,
    }
}

fn body_budget(policy: SizePolicy, reserve: usize) -> usize {
    policy
        .max_chars
        .saturating_sub(policy.overlap_chars + reserve)
        .max(policy.max_chars / 4)
}

fn piece(item: &WorkItem, boundary: Boundary, complete: bool) -> Piece {
    Piece {
        start: item.start,
        end: item.end,
        path: item.path.clone(),
        term: item.term.clone(),
        unit: item.unit,
        boundary,
        complete,
    }
}

/// Cuts `item` before every marker but the first; the lead-in stays with the
/// first marker's piece. Cuts sit at the start of the whitespace run before
/// each marker.
fn split_at_markers(
    text: &str,
    item: &WorkItem,
    offsets: &[usize],
    strategy: Strategy,
) -> Vec<WorkItem> {
    let mut cuts = offsets
        .iter()
        .skip(1)
        .map(|offset| text[..*offset].trim_end().len().max(item.start))
        .collect::<Vec<usize>>();
    cuts.push(item.end);

    let mut children = Vec::with_capacity(cuts.len());
    let mut start = item.start;
    for cut in cuts {
        let end = cut.max(start);
        children.push(item.child(start, end, strategy));
        start = end;
    }
    children
}

fn push_children(stack: &mut Vec<WorkItem>, mut children: Vec<WorkItem>, boundary: Boundary) {
    let count = children.len();
    for (index, child) in children.iter_mut().enumerate() {
        if index + 1 < count {
            child.end_boundary = boundary;
        }
    }
    children.retain(|child| child.start < child.end);
    stack.extend(children.into_iter().rev());
}

fn opens_clause(before: &str) -> bool {
    let trimmed = before.trim_end_matches([' ', '\t']);
    if trimmed.is_empty() || trimmed.ends_with('\n') {
        return true;
    }
    trimmed.len() < before.len() && trimmed.ends_with([':', ';', '.'])
}

fn is_letter_label(label: &str, last_letter: Option<char>) -> bool {
    let mut chars = label.chars();
    let (Some(first), rest) = (chars.next(), chars.as_str()) else {
        return false;
    };

    if !rest.is_empty() {
        return rest.chars().all(|ch| ch == first) && !is_roman(label);
    }

    match first {
        'i' | 'v' | 'x' => {
            let previous = char::from_u32(first as u32 - 1);
            last_letter.is_some() && last_letter == previous
        }
        _ => true,
    }
}

fn is_roman(label: &str) -> bool {
    const NUMERALS: [&str; 30] = [
        "i", "ii", "iii", "iv", "v", "vi", "vii", "viii", "ix", "x", "xi", "xii", "xiii", "xiv",
        "xv", "xvi", "xvii", "xviii", "xix", "xx", "xxi", "xxii", "xxiii", "xxiv", "xxv", "xxvi",
        "xxvii", "xxviii", "xxix", "xxx",
    ];
    NUMERALS.contains(&label)
}

fn compose_drafts(
    text: &str,
    pieces: Vec<Piece>,
    content_type: ContentType,
    policy: SizePolicy,
) -> Vec<ChunkDraft> {
    let mut drafts = Vec::with_capacity(pieces.len());
    let mut previous: Option<(usize, usize, usize)> = None;

    for piece in pieces {
        let body = &text[piece.start..piece.end];
        let continued_from = match (piece.unit, previous) {
            (Some(unit), Some((previous_unit, start, end))) if unit == previous_unit => {
                Some((start, end))
            }
            _ => None,
        };

        let overlap = continued_from
            .map(|(start, end)| tail_on_word(&text[start..end], policy.overlap_chars))
            .unwrap_or_default();

        let label = match (content_type, piece.term.as_deref()) {
            (ContentType::Definition, Some(term)) => {
                let quoted = format!("\"{term}\"");
                (!body.contains(&quoted) && !overlap.contains(&quoted))
                    .then(|| format!("{quoted} {CONTINUED_LABEL}"))
            }
            (ContentType::Covenant, _) if continued_from.is_some() => {
                Some(CONTINUED_LABEL.to_string())
            }
            _ => None,
        };

        let mut prefix = [label.as_deref().unwrap_or_default(), overlap]
            .into_iter()
            .filter(|part| !part.is_empty())
            .collect::<Vec<&str>>()
            .join(" ");
        if !prefix.is_empty() && !body.starts_with(char::is_whitespace) {
            prefix.push(' ');
        }

        let body_start = prefix.len();
        let chunk_text = format!("{prefix}{body}");
        drafts.push(ChunkDraft {
            body_end: chunk_text.len(),
            text: chunk_text,
            source_start: piece.start,
            source_end: piece.end,
            body_start,
            path: piece.path,
            content_type,
            is_complete_unit: piece.complete,
            boundary: piece.boundary,
            defining_term: piece.term,
            table: None,
            page: None,
        });

        previous = piece.unit.map(|unit| (unit, piece.start, piece.end));
    }

    drafts
}

#[cfg(test)]
mod tests;
