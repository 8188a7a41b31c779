use std::collections::{HashMap, HashSet};

use anyhow::{Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::document::SourcePage;

const EDGE_LINE_MAX_CHARS: usize = 120;
const EDGE_LINE_MIN_PAGES: usize = 3;
const PAGE_NUMBER_HEAD_LINES: usize = 2;
const PAGE_NUMBER_TAIL_LINES: usize = 3;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizationStats {
    pub header_lines_removed: usize,
    pub footer_lines_removed: usize,
    pub page_number_lines_removed: usize,
    pub dehyphenation_merges: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRange {
    pub page_number: u32,
    pub start: usize,
    pub end: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NormalizedText {
    pub text: String,
    pub pages: Vec<PageRange>,
    pub stats: NormalizationStats,
}

impl NormalizedText {
    /// 1-based page number of the page an offset falls in. Offsets inside the
    /// paragraph break between two pages belong to the earlier page.
    pub fn page_at(&self, offset: usize) -> Option<u32> {
        self.pages
            .iter()
            .filter(|page| page.end > page.start)
            .take_while(|page| page.start <= offset)
            .last()
            .map(|page| page.page_number)
    }

    pub fn page_range(&self, index: usize) -> Option<PageRange> {
        self.pages.get(index).copied()
    }
}

#[derive(Debug)]
pub struct TextNormalizer {
    page_number_line: Regex,
    blank_line_run: Regex,
}

impl TextNormalizer {
    pub fn new() -> Result<Self> {
        Ok(Self {
            page_number_line: Regex::new(
                r"(?i)^(?:page\s+)?[-–—]?\s*(?:\d{1,4}|x{0,3}(?:ix|iv|v?i{1,3}|v))\s*[-–—]?(?:\s+of\s+\d{1,4})?$",
            )
            .context("failed to compile page number regex")?,
            blank_line_run: Regex::new(r"\n{3,}").context("failed to compile blank line regex")?,
        })
    }

    pub fn normalize_pages(&self, pages: &[SourcePage]) -> NormalizedText {
        let mut stats = NormalizationStats::default();

        let mut page_lines = pages
            .iter()
            .map(|page| {
                let mut lines = repair_characters(&page.text)
                    .split('\n')
                    .map(collapse_spaces)
                    .collect::<Vec<String>>();
                stats.page_number_lines_removed += self.strip_page_number_lines(&mut lines);
                lines
            })
            .collect::<Vec<Vec<String>>>();

        let header_candidates = detect_repeated_edge_lines(&page_lines, true);
        let footer_candidates = detect_repeated_edge_lines(&page_lines, false);

        let mut text = String::new();
        let mut ranges = Vec::with_capacity(pages.len());

        for (index, lines) in page_lines.iter_mut().enumerate() {
            if let Some(line_index) = first_nonempty_line_index(lines) {
                if header_candidates.contains(&normalize_edge_line(&lines[line_index])) {
                    lines.remove(line_index);
                    stats.header_lines_removed += 1;
                }
            }

            if let Some(line_index) = last_nonempty_line_index(lines) {
                if footer_candidates.contains(&normalize_edge_line(&lines[line_index])) {
                    lines.remove(line_index);
                    stats.footer_lines_removed += 1;
                }
            }

            let (merged, merges) = merge_hyphenated_lines(std::mem::take(lines));
            stats.dehyphenation_merges += merges;

            let joined = merged.join("\n");
            let page_text = self.blank_line_run.replace_all(joined.trim(), "\n\n");

            let page_number = pages[index].number(index);
            if page_text.is_empty() {
                ranges.push(PageRange {
                    page_number,
                    start: text.len(),
                    end: text.len(),
                });
                continue;
            }

            if !text.is_empty() {
                text.push_str("\n\n");
            }
            let start = text.len();
            text.push_str(&page_text);
            ranges.push(PageRange {
                page_number,
                start,
                end: text.len(),
            });
        }

        NormalizedText {
            text,
            pages: ranges,
            stats,
        }
    }

    /// Single-line cleanup for table cells and other short strings.
    pub fn normalize_fragment(&self, input: &str) -> String {
        repair_characters(input)
            .split_whitespace()
            .collect::<Vec<&str>>()
            .join(" ")
    }

    fn strip_page_number_lines(&self, lines: &mut Vec<String>) -> usize {
        let nonempty = lines
            .iter()
            .enumerate()
            .filter(|(_, line)| !line.is_empty())
            .map(|(index, _)| index)
            .collect::<Vec<usize>>();

        let mut edge_indices = nonempty
            .iter()
            .take(PAGE_NUMBER_HEAD_LINES)
            .chain(nonempty.iter().rev().take(PAGE_NUMBER_TAIL_LINES))
            .copied()
            .filter(|index| self.page_number_line.is_match(&lines[*index]))
            .collect::<Vec<usize>>();
        edge_indices.sort_unstable();
        edge_indices.dedup();

        for index in edge_indices.iter().rev() {
            lines.remove(*index);
        }
        edge_indices.len()
    }
}

pub fn repair_characters(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '\u{00A0}' | '\u{2007}' | '\u{202F}' => out.push(' '),
            '\u{200B}' | '\u{200C}' | '\u{200D}' | '\u{FEFF}' | '\u{00AD}' | '\r' => {}
            '\u{FB00}' => out.push_str("ff"),
            '\u{FB01}' => out.push_str("fi"),
            '\u{FB02}' => out.push_str("fl"),
            '\u{FB03}' => out.push_str("ffi"),
            '\u{FB04}' => out.push_str("ffl"),
            '\u{2018}' | '\u{2019}' | '\u{201A}' | '\u{2032}' => out.push('\''),
            '\u{201C}' | '\u{201D}' | '\u{201E}' | '\u{2033}' => out.push('"'),
            _ => out.push(ch),
        }
    }
    out
}

fn collapse_spaces(line: &str) -> String {
    line.split([' ', '\t'])
        .filter(|part| !part.is_empty())
        .collect::<Vec<&str>>()
        .join(" ")
}

fn detect_repeated_edge_lines(pages: &[Vec<String>], header: bool) -> HashSet<String> {
    let mut counts = HashMap::<String, usize>::new();
    for lines in pages {
        let candidate = if header {
            lines.iter().find(|line| !line.is_empty())
        } else {
            lines.iter().rev().find(|line| !line.is_empty())
        };

        let Some(candidate) = candidate else {
            continue;
        };

        let normalized = normalize_edge_line(candidate);
        if normalized.is_empty() || normalized.chars().count() > EDGE_LINE_MAX_CHARS {
            continue;
        }
        *counts.entry(normalized).or_insert(0) += 1;
    }

    counts
        .into_iter()
        .filter_map(|(candidate, count)| (count >= EDGE_LINE_MIN_PAGES).then_some(candidate))
        .collect()
}

fn normalize_edge_line(input: &str) -> String {
    input
        .split_whitespace()
        .collect::<Vec<&str>>()
        .join(" ")
        .to_lowercase()
}

fn first_nonempty_line_index(lines: &[String]) -> Option<usize> {
    lines.iter().position(|line| !line.trim().is_empty())
}

fn last_nonempty_line_index(lines: &[String]) -> Option<usize> {
    lines.iter().rposition(|line| !line.trim().is_empty())
}

fn merge_hyphenated_lines(lines: Vec<String>) -> (Vec<String>, usize) {
    let mut merged = Vec::<String>::with_capacity(lines.len());
    let mut merges = 0usize;

    for line in lines {
        if let Some(previous) = merged.last_mut() {
            if should_merge_hyphenated_pair(previous, &line) {
                let keep = previous.trim_end().trim_end_matches('-').len();
                previous.truncate(keep);
                previous.push_str(line.trim_start());
                merges += 1;
                continue;
            }
        }
        merged.push(line);
    }

    (merged, merges)
}

fn should_merge_hyphenated_pair(current: &str, next: &str) -> bool {
    let left = current.trim_end();
    if !left.ends_with('-') || left.ends_with("--") {
        return false;
    }

    let starts_with_lowercase = next
        .trim_start()
        .chars()
        .next()
        .is_some_and(|character| character.is_lowercase());
    if !starts_with_lowercase {
        return false;
    }

    left.trim_end_matches('-')
        .chars()
        .last()
        .is_some_and(|character| character.is_alphabetic())
}
