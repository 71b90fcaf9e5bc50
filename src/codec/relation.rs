//! Candidate-list protocol for relation fields.
//!
//! The prompt lists related records as `id: title` lines. Answers come back
//! either as identifiers or as free-text titles, which are fuzzy matched
//! against the same candidate list. `0` encodes an empty selection.
use crate::error::WorkflowError;
use crate::schema::{FieldKind, NativeValue, RecordId};
use anyhow::Result;
use std::collections::BTreeSet;

/// Separator for title lists in to-many answers. Titles may contain commas.
pub const TITLE_LIST_SEPARATOR: &str = "|";

/// Encoding of "nothing selected" in relation answers.
pub const EMPTY_SELECTION: &str = "0";

const MIN_FUZZY_SCORE: f64 = 0.5;

/// One selectable related record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub id: RecordId,
    pub title: String,
}

/// Render the candidate list section embedded in prompts.
pub fn render_candidate_list(candidates: &[Candidate]) -> String {
    candidates
        .iter()
        .map(|candidate| format!("{}: {}", candidate.id, candidate.title))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Render a relation value as `id: title` pairs for before-value snapshots.
pub fn describe(value: &NativeValue, candidates: &[Candidate]) -> String {
    let ids: Vec<RecordId> = match value {
        NativeValue::Ref(id) => vec![*id],
        NativeValue::Refs(ids) => ids.clone(),
        _ => Vec::new(),
    };
    ids.iter()
        .map(|id| match candidates.iter().find(|candidate| candidate.id == *id) {
            Some(candidate) => format!("{}: {}", candidate.id, candidate.title),
            None => id.to_string(),
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// Decode an LM answer for a relation field.
pub fn decode(kind: &FieldKind, answer: &str, candidates: &[Candidate]) -> Result<NativeValue> {
    match kind {
        FieldKind::HasOne { .. } => decode_has_one(answer, candidates),
        FieldKind::HasMany { .. } => decode_has_many(answer, candidates),
        _ => Err(WorkflowError::Validation(format!("{kind} is not a relation kind")).into()),
    }
}

fn decode_has_one(answer: &str, candidates: &[Candidate]) -> Result<NativeValue> {
    let answer = strip_quotes(answer);
    if answer.is_empty() || answer == EMPTY_SELECTION {
        return Ok(NativeValue::Null);
    }
    resolve_one(answer, candidates).map(NativeValue::Ref)
}

fn decode_has_many(answer: &str, candidates: &[Candidate]) -> Result<NativeValue> {
    let answer = strip_quotes(answer);
    if answer.is_empty() || answer == EMPTY_SELECTION {
        return Ok(NativeValue::Refs(Vec::new()));
    }
    if let Some(ids) = parse_id_list(answer, candidates) {
        return Ok(NativeValue::Refs(ids));
    }
    let parts: Vec<&str> = if answer.contains(TITLE_LIST_SEPARATOR) {
        answer.split(TITLE_LIST_SEPARATOR).collect()
    } else {
        answer.split(',').collect()
    };
    let mut ids = Vec::new();
    let mut seen = BTreeSet::new();
    for part in parts {
        let part = strip_quotes(part);
        if part.is_empty() {
            continue;
        }
        let id = resolve_one(part, candidates)?;
        if seen.insert(id) {
            ids.push(id);
        }
    }
    Ok(NativeValue::Refs(ids))
}

/// Comma-separated identifiers, accepted only when every one is a candidate.
fn parse_id_list(answer: &str, candidates: &[Candidate]) -> Option<Vec<RecordId>> {
    let mut ids = Vec::new();
    for part in answer.split(',') {
        let id = part.trim().parse::<RecordId>().ok()?;
        if !candidates.iter().any(|candidate| candidate.id == id) {
            return None;
        }
        if !ids.contains(&id) {
            ids.push(id);
        }
    }
    Some(ids)
}

fn resolve_one(answer: &str, candidates: &[Candidate]) -> Result<RecordId> {
    if let Ok(id) = answer.parse::<RecordId>() {
        if candidates.iter().any(|candidate| candidate.id == id) {
            return Ok(id);
        }
    }
    fuzzy_match(answer, candidates).ok_or_else(|| {
        WorkflowError::Validation(format!("no candidate matches {answer:?}")).into()
    })
}

/// Pick the candidate whose title best matches `query`.
///
/// Exact matches after normalization win outright. Otherwise the score is
/// the larger of token overlap and containment ratio, and a unique best
/// score of at least one half is required.
pub fn fuzzy_match(query: &str, candidates: &[Candidate]) -> Option<RecordId> {
    let query = normalize(query);
    if query.is_empty() {
        return None;
    }
    if let Some(exact) = candidates
        .iter()
        .find(|candidate| normalize(&candidate.title) == query)
    {
        return Some(exact.id);
    }
    let mut best: Option<(f64, RecordId)> = None;
    let mut tied = false;
    for candidate in candidates {
        let score = similarity(&query, &normalize(&candidate.title));
        match best {
            Some((best_score, _)) if score < best_score => {}
            Some((best_score, _)) if score == best_score => tied = true,
            _ => {
                best = Some((score, candidate.id));
                tied = false;
            }
        }
    }
    match best {
        Some((score, id)) if score >= MIN_FUZZY_SCORE && !tied => Some(id),
        _ => None,
    }
}

fn similarity(left: &str, right: &str) -> f64 {
    if right.is_empty() {
        return 0.0;
    }
    let left_tokens: BTreeSet<&str> = left.split(' ').collect();
    let right_tokens: BTreeSet<&str> = right.split(' ').collect();
    let shared = left_tokens.intersection(&right_tokens).count() as f64;
    let union = left_tokens.union(&right_tokens).count() as f64;
    let overlap = if union == 0.0 { 0.0 } else { shared / union };
    let containment = if left.contains(right) || right.contains(left) {
        left.len().min(right.len()) as f64 / left.len().max(right.len()) as f64
    } else {
        0.0
    };
    overlap.max(containment)
}

fn normalize(text: &str) -> String {
    text.chars()
        .map(|ch| {
            if ch.is_alphanumeric() {
                ch.to_ascii_lowercase()
            } else {
                ' '
            }
        })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn strip_quotes(text: &str) -> &str {
    text.trim().trim_matches(|ch| ch == '"' || ch == '\'').trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidates() -> Vec<Candidate> {
        vec![
            Candidate {
                id: 3,
                title: "Ada Lovelace".to_string(),
            },
            Candidate {
                id: 8,
                title: "Grace Hopper".to_string(),
            },
            Candidate {
                id: 12,
                title: "Alan Turing".to_string(),
            },
        ]
    }

    fn has_one() -> FieldKind {
        FieldKind::HasOne {
            class: "Person".to_string(),
        }
    }

    fn has_many() -> FieldKind {
        FieldKind::HasMany {
            class: "Person".to_string(),
        }
    }

    #[test]
    fn has_one_accepts_identifier_from_candidate_list() {
        let value = decode(&has_one(), " 8 ", &candidates()).unwrap();
        assert_eq!(value, NativeValue::Ref(8));
    }

    #[test]
    fn has_one_zero_clears_selection() {
        let value = decode(&has_one(), "0", &candidates()).unwrap();
        assert_eq!(value, NativeValue::Null);
    }

    #[test]
    fn has_one_fuzzy_matches_title() {
        let value = decode(&has_one(), "\"grace hopper.\"", &candidates()).unwrap();
        assert_eq!(value, NativeValue::Ref(8));
        let value = decode(&has_one(), "Turing", &candidates()).unwrap();
        assert_eq!(value, NativeValue::Ref(12));
    }

    #[test]
    fn has_one_unknown_answer_is_refused() {
        assert!(decode(&has_one(), "Linus Torvalds", &candidates()).is_err());
        assert!(decode(&has_one(), "99", &candidates()).is_err());
    }

    #[test]
    fn has_many_reads_identifier_list() {
        let value = decode(&has_many(), "3, 12,3", &candidates()).unwrap();
        assert_eq!(value, NativeValue::Refs(vec![3, 12]));
    }

    #[test]
    fn has_many_reads_separated_titles() {
        let value = decode(&has_many(), "Alan Turing|ada lovelace", &candidates()).unwrap();
        assert_eq!(value, NativeValue::Refs(vec![12, 3]));
        let value = decode(&has_many(), "0", &candidates()).unwrap();
        assert_eq!(value, NativeValue::Refs(Vec::new()));
    }

    #[test]
    fn describe_pairs_identifiers_with_titles() {
        let text = describe(&NativeValue::Refs(vec![3, 40]), &candidates());
        assert_eq!(text, "3: Ada Lovelace, 40");
    }
}
