use std::collections::HashSet;
use std::path::PathBuf;

use async_trait::async_trait;
use tracing::debug;

use super::{IntegrationError, KnowledgeEntry, KnowledgeStore, SimilarIncident};
use crate::storage::JsonArrayFile;

/// Local knowledge base ranked by keyword overlap with the query.
pub struct KeywordKnowledgeStore {
    file: JsonArrayFile<KnowledgeEntry>,
}

impl KeywordKnowledgeStore {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, IntegrationError> {
        let file = JsonArrayFile::new(path);
        file.ensure()?;
        Ok(Self { file })
    }

    pub fn len(&self) -> Result<usize, IntegrationError> {
        Ok(self.file.load()?.len())
    }

    pub fn is_empty(&self) -> Result<bool, IntegrationError> {
        Ok(self.len()? == 0)
    }
}

fn tokens(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() > 2)
        .map(str::to_lowercase)
        .collect()
}

fn score(query: &HashSet<String>, entry: &KnowledgeEntry) -> f64 {
    if query.is_empty() {
        return 0.0;
    }
    let mut doc = tokens(&entry.summary);
    for s in entry.resolution.iter().chain(entry.root_cause.iter()) {
        doc.extend(tokens(s));
    }
    query.intersection(&doc).count() as f64 / query.len() as f64
}

#[async_trait]
impl KnowledgeStore for KeywordKnowledgeStore {
    async fn add(&self, entry: KnowledgeEntry) -> Result<(), IntegrationError> {
        debug!(id = %entry.id, "adding knowledge entry");
        self.file.update(|entries| {
            match entries.iter_mut().find(|e| e.id == entry.id) {
                Some(existing) => *existing = entry,
                None => entries.push(entry),
            }
        })?;
        Ok(())
    }

    async fn search(&self, query: &str, top_n: usize) -> Result<Vec<SimilarIncident>, IntegrationError> {
        let q = tokens(query);
        let mut hits: Vec<SimilarIncident> = self
            .file
            .load()?
            .into_iter()
            .filter_map(|e| {
                let s = score(&q, &e);
                (s > 0.0).then(|| SimilarIncident {
                    id: e.id,
                    summary: e.summary,
                    score: s,
                    resolution: e.resolution,
                    root_cause: e.root_cause,
                })
            })
            .collect();
        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(top_n);
        Ok(hits)
    }
}
