//! Ordered keyword rules mapping a span to one content type.
//!
//! Rules are tried top to bottom and the first hit wins, so a span that
//! both defines a term and mentions a covenant is a definition.

use super::types::ContentType;

const COVENANT_CUES: &[&str] = &["covenant", "shall not", "shall maintain"];
const PRICING_CUES: &[&str] = &["pricing", "interest rate", "margin", "applicable rate"];
const EVENT_OF_DEFAULT_CUES: &[&str] = &["event of default"];
const REPRESENTATION_CUES: &[&str] = &["representation", "warranty"];
const COMPLIANCE_CUES: &[&str] = &["compliance certificate", "covenant calculation"];

const DEFINITION_VERBS: &[&str] = &["means", "shall mean", "has the meaning"];
const DEFINED_TERM_MAX_CHARS: usize = 120;

pub fn classify(text: &str) -> ContentType {
    if defining_term(text, &["means"]).is_some() {
        return ContentType::Definition;
    }

    let lower = text.to_lowercase();
    let rules: [(&[&str], ContentType); 5] = [
        (COVENANT_CUES, ContentType::Covenant),
        (PRICING_CUES, ContentType::Pricing),
        (EVENT_OF_DEFAULT_CUES, ContentType::EventOfDefault),
        (REPRESENTATION_CUES, ContentType::Representation),
        (COMPLIANCE_CUES, ContentType::ComplianceCalculation),
    ];

    rules
        .iter()
        .find(|(cues, _)| cues.iter().any(|cue| lower.contains(cue)))
        .map(|(_, content_type)| *content_type)
        .unwrap_or(ContentType::General)
}

/// First quoted term followed by a definition verb, e.g. `"EBITDA" means`.
pub fn defined_term_of(text: &str) -> Option<String> {
    defining_term(text, DEFINITION_VERBS)
}

fn defining_term(text: &str, verbs: &[&str]) -> Option<String> {
    let mut rest = text;
    while let Some(open) = rest.find('"') {
        let after_open = &rest[open + 1..];
        let close = after_open.find('"')?;
        let term = &after_open[..close];
        let tail = &after_open[close + 1..];

        if is_term_candidate(term) && starts_with_verb(tail, verbs) {
            return Some(term.trim().to_string());
        }
        rest = tail;
    }
    None
}

fn is_term_candidate(term: &str) -> bool {
    let trimmed = term.trim();
    !trimmed.is_empty() && !term.contains('\n') && trimmed.len() <= DEFINED_TERM_MAX_CHARS
}

fn starts_with_verb(tail: &str, verbs: &[&str]) -> bool {
    let after_space = tail.trim_start();
    if after_space.len() == tail.len() {
        return false;
    }
    let lower = after_space
        .chars()
        .take(24)
        .collect::<String>()
        .to_lowercase();

    verbs.iter().any(|verb| {
        lower.starts_with(verb)
            && !lower[verb.len()..]
                .chars()
                .next()
                .is_some_and(char::is_alphanumeric)
    })
}
