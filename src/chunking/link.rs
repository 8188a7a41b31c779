use std::collections::HashMap;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::config::{ChunkerConfig, estimate_tokens};
use super::text::head_on_word;
use super::types::Chunk;

pub const REFERENCED_SECTIONS_HEADER: &str = "--- Referenced sections ---";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkStats {
    pub chunks_linked: usize,
    pub references_resolved: usize,
    pub references_unresolved: usize,
}

#[derive(Debug, Default)]
struct LinkPlan {
    lines: Vec<String>,
    linked: Vec<String>,
    unresolved: usize,
}

/// Appends short previews of the sections a chunk cites to the end of its
/// text. Targets come from the same document only, previews are built from
/// pre-link text, and a chunk never links to itself.
#[derive(Debug)]
pub struct CrossReferenceLinker {
    preview_chars: usize,
    max_previews_per_reference: usize,
    max_linked_references: usize,
    chars_per_token: f64,
}

impl CrossReferenceLinker {
    pub fn new(config: &ChunkerConfig) -> Self {
        Self {
            preview_chars: config.preview_chars,
            max_previews_per_reference: config.max_previews_per_reference,
            max_linked_references: config.max_linked_references,
            chars_per_token: config.chars_per_token,
        }
    }

    pub fn link(&self, chunks: &mut [Chunk]) -> LinkStats {
        let plans = {
            let snapshot: &[Chunk] = chunks;
            let index = reference_index(snapshot);
            snapshot
                .par_iter()
                .enumerate()
                .map(|(position, chunk)| self.plan(snapshot, &index, position, chunk))
                .collect::<Vec<LinkPlan>>()
        };

        let mut stats = LinkStats::default();
        for (chunk, plan) in chunks.iter_mut().zip(plans) {
            stats.references_unresolved += plan.unresolved;
            if plan.linked.is_empty() {
                continue;
            }

            stats.chunks_linked += 1;
            stats.references_resolved += plan.linked.len();
            chunk.text.push_str("\n\n");
            chunk.text.push_str(REFERENCED_SECTIONS_HEADER);
            for line in &plan.lines {
                chunk.text.push('\n');
                chunk.text.push_str(line);
            }
            chunk.linked_references = plan.linked;
            chunk.char_count = chunk.text.chars().count();
            chunk.estimated_tokens = estimate_tokens(chunk.char_count, self.chars_per_token);
        }

        debug!(
            chunks_linked = stats.chunks_linked,
            resolved = stats.references_resolved,
            unresolved = stats.references_unresolved,
            "linked cross-references"
        );
        stats
    }

    fn plan(
        &self,
        chunks: &[Chunk],
        index: &HashMap<&str, HashMap<String, Vec<usize>>>,
        position: usize,
        chunk: &Chunk,
    ) -> LinkPlan {
        let mut plan = LinkPlan::default();
        let Some(targets_by_key) = index.get(chunk.document_id.as_str()) else {
            plan.unresolved = chunk.cross_references.len();
            return plan;
        };

        for reference in &chunk.cross_references {
            if plan.linked.len() >= self.max_linked_references {
                break;
            }

            let previews = targets_by_key
                .get(reference.as_str())
                .into_iter()
                .flatten()
                .filter(|&&target| target != position)
                .filter_map(|&target| {
                    let target = &chunks[target];
                    let preview = self.preview(target);
                    (!preview.is_empty()).then(|| format!("[{}] {preview}", target.path))
                })
                .take(self.max_previews_per_reference)
                .collect::<Vec<String>>();

            if previews.is_empty() {
                plan.unresolved += 1;
                continue;
            }
            plan.lines.extend(previews);
            plan.linked.push(reference.clone());
        }

        plan
    }

    fn preview(&self, target: &Chunk) -> String {
        let flattened = target
            .body()
            .split_whitespace()
            .collect::<Vec<&str>>()
            .join(" ");
        let (head, truncated) = head_on_word(&flattened, self.preview_chars);
        if head.is_empty() {
            String::new()
        } else if truncated {
            format!("{head}...")
        } else {
            head.to_string()
        }
    }
}

/// document id -> reference key -> chunk positions, in document order. Each
/// chunk answers to its own key and every shallower one, so `7.02` reaches
/// the fragments of `7.02(a)` as well. Tables are never targets.
fn reference_index(chunks: &[Chunk]) -> HashMap<&str, HashMap<String, Vec<usize>>> {
    let mut index: HashMap<&str, HashMap<String, Vec<usize>>> = HashMap::new();
    for (position, chunk) in chunks.iter().enumerate() {
        if chunk.is_table() {
            continue;
        }
        let keys = index.entry(chunk.document_id.as_str()).or_default();
        for key in chunk.path.reference_keys() {
            keys.entry(key).or_default().push(position);
        }
    }
    index
}
