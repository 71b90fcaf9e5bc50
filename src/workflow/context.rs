use crate::codec::relation::Candidate;
use crate::schema::RecordId;
use crate::store::ContentStore;
use crate::workspace::config::EditConfig;
use anyhow::Result;
use std::collections::BTreeMap;

/// Per-invocation settings and caches.
///
/// Candidate lists are built once per related class and dropped with the
/// context, so nothing leaks between batch runs.
#[derive(Debug)]
pub struct RunContext {
    model: Option<String>,
    max_attempts: u32,
    candidate_limit: usize,
    candidates: BTreeMap<String, Vec<Candidate>>,
}

impl RunContext {
    pub fn new(config: &EditConfig) -> Self {
        RunContext {
            model: config.model.clone(),
            max_attempts: config.max_attempts,
            candidate_limit: config.candidate_limit,
            candidates: BTreeMap::new(),
        }
    }

    pub fn model(&self) -> Option<&str> {
        self.model.as_deref()
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// First `candidate_limit` records of `class` as id/title pairs.
    pub fn candidates<S: ContentStore + ?Sized>(
        &mut self,
        store: &S,
        class: &str,
    ) -> Result<&[Candidate]> {
        if !self.candidates.contains_key(class) {
            let list = load_candidates(store, class, self.candidate_limit)?;
            tracing::debug!(class, candidates = list.len(), "candidate list built");
            self.candidates.insert(class.to_string(), list);
        }
        Ok(self
            .candidates
            .get(class)
            .map(Vec::as_slice)
            .unwrap_or_default())
    }

    /// Drop the cached list for `class` after its records changed.
    pub fn invalidate(&mut self, class: &str) {
        self.candidates.remove(class);
    }
}

fn load_candidates<S: ContentStore + ?Sized>(
    store: &S,
    class: &str,
    limit: usize,
) -> Result<Vec<Candidate>> {
    let ids: Vec<RecordId> = store.list_identifiers(class)?;
    let mut candidates = Vec::with_capacity(ids.len().min(limit));
    for id in ids.into_iter().take(limit) {
        if let Some(record) = store.load(class, id)? {
            candidates.push(Candidate {
                id,
                title: record.title(),
            });
        }
    }
    Ok(candidates)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::sample_store;
    use crate::workspace::config::default_config;

    #[test]
    fn candidates_respect_limit_and_titles() {
        let store = sample_store();
        let mut config = default_config();
        config.candidate_limit = 1;
        let mut ctx = RunContext::new(&config);
        let people = ctx.candidates(&store, "Person").unwrap();
        assert_eq!(
            people,
            &[Candidate {
                id: 10,
                title: "Ada Lovelace".to_string()
            }]
        );
    }

    #[test]
    fn unknown_class_is_an_error() {
        let store = sample_store();
        let mut ctx = RunContext::new(&default_config());
        assert!(ctx.candidates(&store, "Nope").is_err());
    }
}
