//! Prompt hydration and composition.
//!
//! Hydration binds an instruction template to one record. Composition then
//! appends the formatting rules for the target field's storage kind and the
//! closing "answer only" directive. Both steps are pure.
use crate::codec::relation::{render_candidate_list, Candidate, EMPTY_SELECTION, TITLE_LIST_SEPARATOR};
use crate::codec::CANONICAL_DATETIME_FORMAT;
use crate::error::WorkflowError;
use crate::schema::{FieldKind, RecordId};
use crate::store::ContentStore;
use crate::template::{Renderer, Template};
use anyhow::Result;

/// Reserved placeholder replaced by the relation candidate list.
pub const CANDIDATE_LIST_PLACEHOLDER: &str = "CandidateList";

pub const RESERVED_PLACEHOLDERS: &[&str] = &[CANDIDATE_LIST_PLACEHOLDER];

/// Structural tags a rich-text answer may use.
pub const RICH_TEXT_TAGS: &[&str] = &[
    "p",
    "h2",
    "h3",
    "h4",
    "ul",
    "ol",
    "li",
    "blockquote",
    "strong",
    "em",
];

pub const PLAIN_TEXT_RULE: &str = "Return plain text only, without markup or formatting.";

pub const ANSWER_ONLY_DIRECTIVE: &str =
    "Only return the answer itself. Do not add any introduction, explanation or commentary.";

/// Bind `template` to the record `class#record_id`.
///
/// `candidates` is substituted for `$CandidateList`; when the template does
/// not mention the placeholder the list is appended after the text.
pub fn hydrate<S: ContentStore + ?Sized>(
    store: &S,
    template: &str,
    class: &str,
    record_id: RecordId,
    candidates: Option<&[Candidate]>,
) -> Result<String> {
    let record = store
        .load(class, record_id)?
        .ok_or_else(|| WorkflowError::RecordNotFound {
            class: class.to_string(),
            id: record_id,
        })?;
    let template = Template::parse(template)?;
    let mut renderer = Renderer::new(store);
    let listing = candidates.map(render_candidate_list);
    if let Some(listing) = listing.as_ref() {
        renderer = renderer.with_reserved(CANDIDATE_LIST_PLACEHOLDER, listing.clone());
    }
    let mut text = renderer.render(&template, &record)?;
    if let Some(listing) = listing {
        if !template.mentions(CANDIDATE_LIST_PLACEHOLDER) {
            text.push_str("\n\nAvailable options (identifier: title):\n");
            text.push_str(&listing);
        }
    }
    Ok(text)
}

/// Formatting rules for answers destined for a field of `kind`.
///
/// Whole-record instructions (`None`) get the plain-text rule.
pub fn formatting_rules(kind: Option<&FieldKind>) -> Vec<String> {
    let Some(kind) = kind else {
        return vec![PLAIN_TEXT_RULE.to_string()];
    };
    match kind {
        FieldKind::ShortText | FieldKind::LongText => vec![PLAIN_TEXT_RULE.to_string()],
        FieldKind::RichText => {
            let tags = RICH_TEXT_TAGS
                .iter()
                .map(|tag| format!("<{tag}>"))
                .collect::<Vec<_>>()
                .join(", ");
            vec![
                format!("Wrap all text in one of these HTML tags: {tags}."),
                "Do not use any other tags, attributes, styles or Markdown.".to_string(),
            ]
        }
        FieldKind::Integer => vec!["Return a whole number only.".to_string()],
        FieldKind::Float => vec!["Return a number only, using a dot as decimal separator.".to_string()],
        FieldKind::Boolean => vec!["Return either yes or no.".to_string()],
        FieldKind::DateTime => vec![format!(
            "Return a single date and time in the format {}.",
            human_datetime_layout()
        )],
        FieldKind::HasOne { .. } => vec![
            "If one of the available options fits, return its identifier only.".to_string(),
            "Otherwise return the title of the best match as a short string.".to_string(),
            format!("If nothing should be selected, return {EMPTY_SELECTION}."),
        ],
        FieldKind::HasMany { .. } => vec![
            "Return a comma-separated list of identifiers from the available options."
                .to_string(),
            format!(
                "If identifiers are not available, return titles separated by {TITLE_LIST_SEPARATOR:?}."
            ),
            format!("If nothing should be selected, return {EMPTY_SELECTION}."),
        ],
    }
}

/// Append formatting rules and the closing directive to a hydrated prompt.
pub fn compose(hydrated: &str, kind: Option<&FieldKind>) -> String {
    let mut prompt = hydrated.trim_end().to_string();
    prompt.push_str("\n\n");
    for rule in formatting_rules(kind) {
        prompt.push_str(&rule);
        prompt.push('\n');
    }
    prompt.push_str(ANSWER_ONLY_DIRECTIVE);
    prompt
}

fn human_datetime_layout() -> String {
    CANONICAL_DATETIME_FORMAT
        .replace("%Y", "YYYY")
        .replace("%m", "MM")
        .replace("%d", "DD")
        .replace("%H", "HH")
        .replace("%M", "MM")
        .replace("%S", "SS")
}
