//! `ProceduralMemory` — skills, trajectories, and anti-patterns (C7, §4.7).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;

use crate::vector_store::{cosine_similarity, EntityType, SearchFilter, SearchOptions, VectorRecord, VectorStore};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionStep {
    pub action_type: String,
    pub target: Option<String>,
    pub success: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SkillPreconditions {
    pub url_patterns: Vec<String>,
    pub domain_patterns: Vec<String>,
    pub required_selectors: Vec<String>,
    pub required_text: Vec<String>,
    pub page_type: Option<String>,
    pub language: Option<String>,
}

impl SkillPreconditions {
    fn url_matches(&self, url: &str) -> bool {
        self.url_patterns.is_empty() || self.url_patterns.iter().any(|p| url.contains(p.as_str()))
    }

    fn domain_matches(&self, domain: &str) -> bool {
        if self.domain_patterns.is_empty() {
            return true;
        }
        self.domain_patterns.iter().any(|p| {
            if let Some(suffix) = p.strip_prefix("*.") {
                domain == suffix || domain.ends_with(&format!(".{suffix}"))
            } else {
                domain == p
            }
        })
    }
}

/// `context` passed to [`ProceduralMemory::find_applicable_skills`].
#[derive(Debug, Clone, Default)]
pub struct PageContext {
    pub url: String,
    pub domain: String,
    pub page_type: Option<String>,
    pub language: Option<String>,
    pub available_selectors: Vec<String>,
    pub available_content: String,
    pub embedding: Vec<f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ChangeReason {
    Initial,
    Merge,
    Update,
    Rollback,
    Optimization,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillMetrics {
    pub uses: u32,
    pub successes: u32,
}

impl Default for SkillMetrics {
    fn default() -> Self {
        Self { uses: 0, successes: 0 }
    }
}

impl SkillMetrics {
    pub fn success_rate(&self) -> f32 {
        if self.uses == 0 {
            return 1.0;
        }
        self.successes as f32 / self.uses as f32
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillVersion {
    pub version: u32,
    pub created_at: DateTime<Utc>,
    pub action_sequence: Vec<ActionStep>,
    pub metrics_snapshot: SkillMetrics,
    pub change_reason: ChangeReason,
    pub change_description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Skill {
    pub id: String,
    pub description: String,
    pub preconditions: SkillPreconditions,
    pub action_sequence: Vec<ActionStep>,
    pub metrics: SkillMetrics,
    pub versions: Vec<SkillVersion>,
    pub last_used: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AntiPattern {
    pub action_type: String,
    pub preconditions_fingerprint: String,
    pub failure_count: u32,
}

#[derive(Debug, Clone)]
pub struct SkillMatch {
    pub skill: Skill,
    pub similarity: f32,
}

/// Config knobs from §4.7.
#[derive(Debug, Clone, Copy)]
pub struct ProceduralMemoryConfig {
    pub similarity_threshold: f32,
    pub merge_threshold: f32,
    pub max_skills: usize,
    pub max_versions_per_skill: usize,
    pub min_trajectory_length: usize,
    pub min_uses_before_rollback: u32,
    pub auto_rollback_threshold: f32,
    pub anti_pattern_failure_threshold: u32,
}

impl Default for ProceduralMemoryConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.7,
            merge_threshold: 0.9,
            max_skills: 500,
            max_versions_per_skill: 10,
            min_trajectory_length: 3,
            min_uses_before_rollback: 10,
            auto_rollback_threshold: 0.3,
            anti_pattern_failure_threshold: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SkillState {
    skill: Skill,
    /// Rolling window of recent use outcomes, oldest first, used to
    /// evaluate the auto-rollback trigger.
    recent_outcomes: Vec<bool>,
}

pub struct ProceduralMemory {
    config: ProceduralMemoryConfig,
    skills: RwLock<HashMap<String, SkillState>>,
    anti_patterns: RwLock<Vec<AntiPattern>>,
    index: VectorStore,
}

impl ProceduralMemory {
    pub fn new(config: ProceduralMemoryConfig, embedding_dimensions: usize) -> Self {
        Self {
            config,
            skills: RwLock::new(HashMap::new()),
            anti_patterns: RwLock::new(Vec::new()),
            index: VectorStore::new(embedding_dimensions),
        }
    }

    /// §4.7 retrieval algorithm.
    pub fn find_applicable_skills(&self, context: &PageContext, top_k: usize) -> Vec<SkillMatch> {
        let hits = self.index.search(
            &context.embedding,
            &SearchOptions {
                limit: top_k.max(1) * 4,
                min_score: self.config.similarity_threshold,
                filter: SearchFilter { entity_type: Some(EntityType::Skill), ..Default::default() },
            },
        );

        let skills = self.skills.read().unwrap();
        let mut matches: Vec<SkillMatch> = hits
            .into_iter()
            .filter_map(|hit| skills.get(&hit.id).map(|s| (hit, &s.skill)))
            .filter(|(_, skill)| preconditions_met(&skill.preconditions, context))
            .map(|(hit, skill)| SkillMatch { skill: skill.clone(), similarity: hit.score })
            .collect();

        matches.sort_by(|a, b| b.similarity.partial_cmp(&a.similarity).unwrap());
        matches.truncate(top_k);
        matches
    }

    /// §4.7 trajectory -> skill extraction. Returns the skill id that was
    /// created or merged into.
    pub fn record_trajectory(&self, context: &PageContext, actions: Vec<ActionStep>, description: impl Into<String>) -> Option<String> {
        if actions.len() < self.config.min_trajectory_length {
            return None;
        }

        let preconditions = SkillPreconditions {
            url_patterns: vec![context.url.clone()],
            domain_patterns: vec![context.domain.clone()],
            required_selectors: context.available_selectors.clone(),
            required_text: Vec::new(),
            page_type: context.page_type.clone(),
            language: context.language.clone(),
        };

        let candidate_hits = self.index.search(
            &context.embedding,
            &SearchOptions {
                limit: 1,
                min_score: self.config.merge_threshold,
                filter: SearchFilter { entity_type: Some(EntityType::Skill), ..Default::default() },
            },
        );

        if let Some(best) = candidate_hits.first() {
            if cosine_similarity(&context.embedding, &best.metadata.vector) >= self.config.merge_threshold {
                self.merge_into_skill(&best.id, actions, context);
                return Some(best.id.clone());
            }
        }

        let id = uuid::Uuid::new_v4().to_string();
        let skill = Skill {
            id: id.clone(),
            description: description.into(),
            preconditions,
            action_sequence: actions.clone(),
            metrics: SkillMetrics::default(),
            versions: vec![SkillVersion {
                version: 1,
                created_at: Utc::now(),
                action_sequence: actions,
                metrics_snapshot: SkillMetrics::default(),
                change_reason: ChangeReason::Initial,
                change_description: None,
            }],
            last_used: Utc::now(),
        };

        self.index
            .add(VectorRecord {
                id: id.clone(),
                vector: context.embedding.clone(),
                dimensions: context.embedding.len(),
                model: "procedural-memory".to_string(),
                version: 1,
                entity_type: EntityType::Skill,
                domain: Some(context.domain.clone()),
                tenant_id: None,
                text: None,
                created_at: Utc::now(),
            })
            .ok()?;

        self.skills.write().unwrap().insert(
            id.clone(),
            SkillState { skill, recent_outcomes: Vec::new() },
        );
        self.enforce_max_skills();
        Some(id)
    }

    fn merge_into_skill(&self, id: &str, actions: Vec<ActionStep>, context: &PageContext) {
        let mut skills = self.skills.write().unwrap();
        let Some(state) = skills.get_mut(id) else { return };

        for selector in &context.available_selectors {
            if !state.skill.preconditions.required_selectors.contains(selector) {
                state.skill.preconditions.required_selectors.push(selector.clone());
            }
        }

        let new_success_rate = actions.iter().filter(|a| a.success).count() as f32 / actions.len().max(1) as f32;
        if new_success_rate >= state.skill.metrics.success_rate() {
            state.skill.action_sequence = actions.clone();
        }

        state.skill.metrics.uses += 1;
        if new_success_rate >= 0.5 {
            state.skill.metrics.successes += 1;
        }
        state.skill.last_used = Utc::now();

        let version = SkillVersion {
            version: state.skill.versions.len() as u32 + 1,
            created_at: Utc::now(),
            action_sequence: actions,
            metrics_snapshot: state.skill.metrics.clone(),
            change_reason: ChangeReason::Merge,
            change_description: Some("merged trajectory with existing skill".to_string()),
        };
        state.skill.versions.push(version);
        if state.skill.versions.len() > self.config.max_versions_per_skill {
            state.skill.versions.remove(0);
        }
    }

    fn enforce_max_skills(&self) {
        let mut skills = self.skills.write().unwrap();
        if skills.len() <= self.config.max_skills {
            return;
        }
        let mut by_last_used: Vec<(String, DateTime<Utc>)> =
            skills.iter().map(|(id, s)| (id.clone(), s.skill.last_used)).collect();
        by_last_used.sort_by_key(|(_, last_used)| *last_used);
        let evict_count = skills.len() - self.config.max_skills;
        for (id, _) in by_last_used.into_iter().take(evict_count) {
            skills.remove(&id);
            let _ = self.index.delete(&id);
        }
    }

    /// Record one use's outcome and apply the auto-rollback trigger if the
    /// rolling success rate has dropped below threshold (§4.7.1).
    pub fn record_skill_use(&self, id: &str, success: bool) {
        let mut skills = self.skills.write().unwrap();
        let Some(state) = skills.get_mut(id) else { return };

        state.skill.metrics.uses += 1;
        if success {
            state.skill.metrics.successes += 1;
        }
        state.recent_outcomes.push(success);
        if state.recent_outcomes.len() > 20 {
            state.recent_outcomes.remove(0);
        }

        if state.skill.metrics.uses < self.config.min_uses_before_rollback {
            return;
        }
        let rolling_rate = state.recent_outcomes.iter().filter(|o| **o).count() as f32
            / state.recent_outcomes.len().max(1) as f32;
        if rolling_rate < self.config.auto_rollback_threshold {
            if let Some(best) = state
                .skill
                .versions
                .iter()
                .max_by(|a, b| {
                    a.metrics_snapshot
                        .success_rate()
                        .partial_cmp(&b.metrics_snapshot.success_rate())
                        .unwrap()
                })
                .cloned()
            {
                state.skill.action_sequence = best.action_sequence.clone();
                let version = SkillVersion {
                    version: state.skill.versions.len() as u32 + 1,
                    created_at: Utc::now(),
                    action_sequence: best.action_sequence,
                    metrics_snapshot: state.skill.metrics.clone(),
                    change_reason: ChangeReason::Rollback,
                    change_description: Some("auto-rollback: rolling success rate below threshold".to_string()),
                };
                state.skill.versions.push(version);
                state.recent_outcomes.clear();
            }
        }
    }

    /// §4.7: synthesize/update an anti-pattern on repeated failure of the
    /// same action under the same preconditions.
    pub fn record_action_failure(&self, action_type: &str, preconditions_fingerprint: &str) {
        let mut anti_patterns = self.anti_patterns.write().unwrap();
        if let Some(ap) = anti_patterns
            .iter_mut()
            .find(|ap| ap.action_type == action_type && ap.preconditions_fingerprint == preconditions_fingerprint)
        {
            ap.failure_count += 1;
        } else {
            anti_patterns.push(AntiPattern {
                action_type: action_type.to_string(),
                preconditions_fingerprint: preconditions_fingerprint.to_string(),
                failure_count: 1,
            });
        }
    }

    pub fn is_blocked(&self, action_type: &str, preconditions_fingerprint: &str) -> bool {
        self.anti_patterns.read().unwrap().iter().any(|ap| {
            ap.action_type == action_type
                && ap.preconditions_fingerprint == preconditions_fingerprint
                && ap.failure_count >= self.config.anti_pattern_failure_threshold
        })
    }

    /// §4.7: deterministic template rendering, no NLP.
    pub fn explain(&self, id: &str) -> Option<String> {
        let skills = self.skills.read().unwrap();
        let skill = &skills.get(id)?.skill;
        let mut lines = vec![format!("Skill: {}", skill.description)];
        for (i, step) in skill.action_sequence.iter().enumerate() {
            let target = step.target.as_deref().unwrap_or("(no target)");
            let outcome = if step.success { "succeeded" } else { "failed" };
            lines.push(format!(
                "{}. {} on {} ({}, rate={:.0}%)",
                i + 1,
                step.action_type,
                target,
                outcome,
                skill.metrics.success_rate() * 100.0
            ));
        }
        Some(lines.join("\n"))
    }

    pub fn get_skill(&self, id: &str) -> Option<Skill> {
        self.skills.read().unwrap().get(id).map(|s| s.skill.clone())
    }

    pub fn skill_count(&self) -> usize {
        self.skills.read().unwrap().len()
    }

    /// Serializable view used by `PersistentStore` (§6.2
    /// `<proceduralMemoryPath>`), including every skill's version history.
    pub fn snapshot(&self) -> ProceduralMemorySnapshot {
        ProceduralMemorySnapshot {
            skills: self.skills.read().unwrap().clone(),
            anti_patterns: self.anti_patterns.read().unwrap().clone(),
            index: self.index.snapshot(),
        }
    }

    pub fn restore(&self, snapshot: ProceduralMemorySnapshot) {
        *self.skills.write().unwrap() = snapshot.skills;
        *self.anti_patterns.write().unwrap() = snapshot.anti_patterns;
        self.index.restore(snapshot.index);
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProceduralMemorySnapshot {
    skills: HashMap<String, SkillState>,
    anti_patterns: Vec<AntiPattern>,
    index: crate::vector_store::VectorStoreSnapshot,
}

fn preconditions_met(pre: &SkillPreconditions, context: &PageContext) -> bool {
    if !pre.url_matches(&context.url) {
        return false;
    }
    if !pre.domain_matches(&context.domain) {
        return false;
    }
    if !pre
        .required_selectors
        .iter()
        .all(|s| context.available_selectors.iter().any(|a| a == s))
    {
        return false;
    }
    if !pre.required_text.iter().all(|t| context.available_content.contains(t.as_str())) {
        return false;
    }
    if let Some(page_type) = &pre.page_type {
        if context.page_type.as_deref() != Some(page_type.as_str()) {
            return false;
        }
    }
    if let Some(language) = &pre.language {
        if context.language.as_deref() != Some(language.as_str()) {
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> PageContext {
        PageContext {
            url: "https://example.com/product/1".to_string(),
            domain: "example.com".to_string(),
            page_type: Some("product".to_string()),
            language: Some("en".to_string()),
            available_selectors: vec![".price".to_string()],
            available_content: "Buy now".to_string(),
            embedding: vec![1.0, 0.0, 0.0],
        }
    }

    #[test]
    fn record_trajectory_requires_minimum_length() {
        let memory = ProceduralMemory::new(ProceduralMemoryConfig::default(), 3);
        let short = vec![ActionStep { action_type: "click".into(), target: None, success: true }];
        assert!(memory.record_trajectory(&context(), short, "too short").is_none());
    }

    #[test]
    fn record_trajectory_creates_retrievable_skill() {
        let memory = ProceduralMemory::new(ProceduralMemoryConfig::default(), 3);
        let actions = vec![
            ActionStep { action_type: "click".into(), target: Some(".buy".into()), success: true },
            ActionStep { action_type: "wait".into(), target: None, success: true },
            ActionStep { action_type: "extract".into(), target: Some(".price".into()), success: true },
        ];
        let ctx = context();
        let id = memory.record_trajectory(&ctx, actions, "buy flow").unwrap();

        let matches = memory.find_applicable_skills(&ctx, 3);
        assert!(matches.iter().any(|m| m.skill.id == id));
    }

    #[test]
    fn anti_pattern_blocks_after_threshold() {
        let memory = ProceduralMemory::new(ProceduralMemoryConfig::default(), 3);
        for _ in 0..3 {
            memory.record_action_failure("click", "fp-1");
        }
        assert!(memory.is_blocked("click", "fp-1"));
        assert!(!memory.is_blocked("click", "fp-2"));
    }

    #[test]
    fn explain_renders_deterministic_steps() {
        let memory = ProceduralMemory::new(ProceduralMemoryConfig::default(), 3);
        let actions = vec![
            ActionStep { action_type: "click".into(), target: Some(".buy".into()), success: true },
            ActionStep { action_type: "wait".into(), target: None, success: true },
            ActionStep { action_type: "extract".into(), target: Some(".price".into()), success: true },
        ];
        let id = memory.record_trajectory(&context(), actions, "buy flow").unwrap();
        let explanation = memory.explain(&id).unwrap();
        assert!(explanation.contains("1. click on .buy"));
    }
}
