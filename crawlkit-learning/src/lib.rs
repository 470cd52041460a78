//! Vector search, the learning engine, procedural memory, and WebSocket
//! pattern learning.

pub mod engine;
pub mod error;
pub mod procedural_memory;
pub mod vector_store;
pub mod websocket_learner;

pub use engine::{DecayConfig, LearningEngine, LearningEngineSnapshot, LearningStats};
pub use error::{LearningError, LearningResult};
pub use procedural_memory::{
    ActionStep, AntiPattern, ChangeReason, PageContext, ProceduralMemory, ProceduralMemoryConfig,
    ProceduralMemorySnapshot, Skill, SkillMatch, SkillMetrics, SkillPreconditions, SkillVersion,
};
pub use vector_store::{
    cosine_similarity, EntityType, SearchFilter, SearchHit, SearchOptions, VectorRecord, VectorStore, VectorStoreSnapshot, VectorStoreStats,
};
pub use websocket_learner::{learn as learn_websocket_pattern, AuthMethod, LearnedConfidence, LearnedWebSocketInsight, MessagePatternGroup, Protocol};
