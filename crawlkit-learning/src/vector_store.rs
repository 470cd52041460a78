//! In-process flat-array `VectorStore` (C5, §4.5).
//!
//! Grounded on the teacher's `traits::store::cosine_similarity`, lifted
//! from a one-off free function into the similarity metric behind a full
//! store. §4.5 allows either a local in-process implementation or an
//! external vector DB client behind the same interface; this crate ships
//! the former — an external-DB-backed implementation is a drop-in
//! alternative a deployment can add later without touching callers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;

use crate::error::{LearningError, LearningResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Pattern,
    Skill,
    Content,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorRecord {
    pub id: String,
    pub vector: Vec<f32>,
    pub dimensions: usize,
    pub model: String,
    pub version: u32,
    pub entity_type: EntityType,
    pub domain: Option<String>,
    pub tenant_id: Option<String>,
    pub text: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct SearchFilter {
    pub entity_type: Option<EntityType>,
    pub domain: Option<String>,
    pub tenant_id: Option<String>,
    pub min_version: Option<u32>,
}

impl SearchFilter {
    fn matches(&self, record: &VectorRecord) -> bool {
        if let Some(et) = self.entity_type {
            if record.entity_type != et {
                return false;
            }
        }
        if let Some(domain) = &self.domain {
            if record.domain.as_deref() != Some(domain.as_str()) {
                return false;
            }
        }
        if let Some(tenant) = &self.tenant_id {
            if record.tenant_id.as_deref() != Some(tenant.as_str()) {
                return false;
            }
        }
        if let Some(min_version) = self.min_version {
            if record.version < min_version {
                return false;
            }
        }
        true
    }
}

#[derive(Debug, Clone)]
pub struct SearchHit {
    pub id: String,
    pub score: f32,
    pub metadata: VectorRecord,
}

#[derive(Debug, Clone, Default)]
pub struct SearchOptions {
    pub limit: usize,
    pub min_score: f32,
    pub filter: SearchFilter,
}

#[derive(Debug, Clone, Default)]
pub struct VectorStoreStats {
    pub record_count: usize,
    pub dimensions: Option<usize>,
}

/// Cosine similarity, grounded on the teacher's identical helper in
/// `extraction::traits::store`.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a * norm_b)
}

/// O(N) flat-scan vector store. Dimensions are fixed at construction;
/// inserting a vector of a different width is a hard error (§4.5).
pub struct VectorStore {
    dimensions: usize,
    records: RwLock<HashMap<String, VectorRecord>>,
}

impl VectorStore {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions,
            records: RwLock::new(HashMap::new()),
        }
    }

    pub fn add(&self, record: VectorRecord) -> LearningResult<()> {
        if record.vector.len() != self.dimensions {
            return Err(LearningError::DimensionMismatch {
                expected: self.dimensions,
                actual: record.vector.len(),
            });
        }
        self.records.write().unwrap().insert(record.id.clone(), record);
        Ok(())
    }

    pub fn add_batch(&self, records: Vec<VectorRecord>) -> LearningResult<()> {
        for record in records {
            self.add(record)?;
        }
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<VectorRecord> {
        self.records.read().unwrap().get(id).cloned()
    }

    pub fn delete(&self, id: &str) -> LearningResult<()> {
        self.records
            .write()
            .unwrap()
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| LearningError::UnknownId(id.to_string()))
    }

    pub fn delete_matching(&self, filter: &SearchFilter) -> usize {
        let mut records = self.records.write().unwrap();
        let before = records.len();
        records.retain(|_, r| !filter.matches(r));
        before - records.len()
    }

    /// Cosine similarity search: `score = 1 - cosine_distance`, i.e. the
    /// raw cosine similarity, descending, filtered by `min_score` and
    /// `filter`'s conjunctive equality/version constraints (§4.5).
    pub fn search(&self, vector: &[f32], options: &SearchOptions) -> Vec<SearchHit> {
        let records = self.records.read().unwrap();
        let mut hits: Vec<SearchHit> = records
            .values()
            .filter(|r| options.filter.matches(r))
            .map(|r| SearchHit {
                id: r.id.clone(),
                score: cosine_similarity(vector, &r.vector),
                metadata: r.clone(),
            })
            .filter(|hit| hit.score >= options.min_score)
            .collect();

        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap());
        if options.limit > 0 {
            hits.truncate(options.limit);
        }
        hits
    }

    pub fn stats(&self) -> VectorStoreStats {
        let records = self.records.read().unwrap();
        VectorStoreStats {
            record_count: records.len(),
            dimensions: Some(self.dimensions),
        }
    }

    pub fn snapshot(&self) -> VectorStoreSnapshot {
        VectorStoreSnapshot {
            dimensions: self.dimensions,
            records: self.records.read().unwrap().clone(),
        }
    }

    pub fn restore(&self, snapshot: VectorStoreSnapshot) {
        *self.records.write().unwrap() = snapshot.records;
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VectorStoreSnapshot {
    dimensions: usize,
    records: HashMap<String, VectorRecord>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, vector: Vec<f32>) -> VectorRecord {
        VectorRecord {
            id: id.to_string(),
            vector,
            dimensions: 3,
            model: "test-embed".to_string(),
            version: 1,
            entity_type: EntityType::Pattern,
            domain: Some("example.com".to_string()),
            tenant_id: None,
            text: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn add_rejects_mismatched_dimensions() {
        let store = VectorStore::new(3);
        let bad = record("a", vec![1.0, 0.0]);
        assert!(matches!(store.add(bad), Err(LearningError::DimensionMismatch { .. })));
    }

    #[test]
    fn search_ranks_by_descending_cosine_similarity() {
        let store = VectorStore::new(3);
        store.add(record("same", vec![1.0, 0.0, 0.0])).unwrap();
        store.add(record("orthogonal", vec![0.0, 1.0, 0.0])).unwrap();

        let hits = store.search(&[1.0, 0.0, 0.0], &SearchOptions { limit: 10, min_score: -1.0, filter: SearchFilter::default() });
        assert_eq!(hits[0].id, "same");
        assert!(hits[0].score > hits[1].score);
    }

    #[test]
    fn search_filters_below_min_score() {
        let store = VectorStore::new(3);
        store.add(record("same", vec![1.0, 0.0, 0.0])).unwrap();
        store.add(record("orthogonal", vec![0.0, 1.0, 0.0])).unwrap();

        let hits = store.search(&[1.0, 0.0, 0.0], &SearchOptions { limit: 10, min_score: 0.5, filter: SearchFilter::default() });
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "same");
    }

    #[test]
    fn filter_by_domain_excludes_other_domains() {
        let store = VectorStore::new(3);
        let mut other = record("other-domain", vec![1.0, 0.0, 0.0]);
        other.domain = Some("other.com".to_string());
        store.add(other).unwrap();
        store.add(record("mine", vec![1.0, 0.0, 0.0])).unwrap();

        let filter = SearchFilter { domain: Some("example.com".to_string()), ..Default::default() };
        let hits = store.search(&[1.0, 0.0, 0.0], &SearchOptions { limit: 10, min_score: -1.0, filter });
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "mine");
    }
}
