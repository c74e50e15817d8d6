//! End-to-end engine behaviour over the SQLite store

use async_trait::async_trait;
use chrono::{Duration, Utc};
use companion_memory::memory_engine::SessionStore;
use companion_memory::{
    DocumentStore, EngineConfig, MemoryDatabase, MemoryEngine, TextGenerator, Tone,
    UnavailableGenerator,
};
use std::sync::Arc;

struct ScriptedGenerator;

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn generate(&self, prompt: &str) -> anyhow::Result<String> {
        if prompt.starts_with("Summarize") {
            return Ok("We chatted about music and food.".to_string());
        }
        if prompt.contains("pizza is gross") {
            return Ok(r#"["User dislikes pizza"]"#.to_string());
        }
        Ok(r#"Sure! ["User likes pizza", "User's name is Sam"]"#.to_string())
    }
}

fn engine(db: Arc<MemoryDatabase>, probability: f64) -> MemoryEngine {
    let config = EngineConfig { compaction_probability: probability, ..EngineConfig::default() };
    MemoryEngine::new(db, Arc::new(ScriptedGenerator), config)
}

#[tokio::test]
async fn test_facts_then_contradiction_persist_in_sqlite() {
    let db = Arc::new(MemoryDatabase::new_in_memory().unwrap());
    let engine = engine(db.clone(), 0.0);

    let turn = engine.handle_turn("u1", "I love pizza").unwrap();
    engine.record_turn("u1", "I love pizza", "Me too!", turn.tone).unwrap();
    engine.post_process("u1", "I love pizza", "Me too!", turn.tone).await.unwrap();

    // repeated mention bumps confidence
    engine.post_process("u1", "I love pizza", "Yum", turn.tone).await.unwrap();

    let outcome = engine
        .post_process("u1", "honestly pizza is gross", "Fair enough", Tone::Neutral)
        .await
        .unwrap();
    assert_eq!(outcome.facts_extracted, 1);

    let memory = db.find_memory("u1").unwrap().unwrap();
    let texts: Vec<&str> = memory.facts.iter().map(|f| f.text.as_str()).collect();
    assert_eq!(texts.len(), 2);
    assert!(texts.contains(&"User likes pizza"));
    assert!(!texts.contains(&"User dislikes pizza"));
    assert!(memory.facts.iter().all(|f| (f.confidence - 0.6).abs() < 1e-9));

    assert_eq!(memory.contradictions.len(), 1);
    assert_eq!(memory.contradictions[0].text, "User dislikes pizza");
    assert!(memory.contradictions[0]
        .conflicting_with
        .contains(&"User likes pizza".to_string()));
}

#[tokio::test]
async fn test_idle_gap_opens_new_session_and_compaction_folds_old_one() {
    let db = Arc::new(MemoryDatabase::new_in_memory().unwrap());
    let sessions = SessionStore::new(db.clone());
    let start = Utc::now() - Duration::hours(5);

    for i in 0..6 {
        sessions
            .append_turn_at("u1", &format!("tell me about music {}", i), "sure", Tone::Casual, start + Duration::minutes(i))
            .unwrap();
    }
    let resumed = sessions
        .append_turn_at("u1", "back again", "welcome", Tone::Neutral, start + Duration::hours(2))
        .unwrap();
    assert_eq!(db.list_sessions("u1").unwrap().len(), 2);

    let engine = engine(db.clone(), 1.0);
    let outcome = engine.post_process("u1", "hello", "hi", Tone::Neutral).await.unwrap();
    let report = outcome.compaction.unwrap();
    assert_eq!(report.examined, 2);
    assert_eq!(report.compacted, 1);
    assert_eq!(report.skipped, 1);

    // the compacted session keeps its timestamp, so the resumed one stays active
    let active = engine.session_store().get_active_session("u1").unwrap().unwrap();
    assert_eq!(active.id, resumed.id);
    assert!(!active.is_compressed);

    let all = db.list_sessions("u1").unwrap();
    let folded = all.iter().find(|s| s.is_compressed).unwrap();
    assert_eq!(folded.messages.len(), 5);
    assert_eq!(folded.summary.as_deref(), Some("We chatted about music and food."));

    let memory = db.find_memory("u1").unwrap().unwrap();
    assert_eq!(memory.conversation_summaries.len(), 1);
    assert_eq!(memory.conversation_summaries[0].key_topics, vec!["music"]);
}

#[tokio::test]
async fn test_unconfigured_generator_degrades_without_failing() {
    let db = Arc::new(MemoryDatabase::new_in_memory().unwrap());
    let config = EngineConfig { compaction_probability: 0.0, ..EngineConfig::default() };
    let engine = MemoryEngine::new(db.clone(), Arc::new(UnavailableGenerator), config);

    let outcome = engine
        .post_process("u1", "I play sports every weekend", "Nice", Tone::Neutral)
        .await
        .unwrap();
    assert_eq!(outcome.facts_extracted, 0);
    assert_eq!(outcome.topics, vec!["sports"]);

    let snapshot = engine.get_memory_snapshot("u1").unwrap();
    assert!(snapshot.memory.facts.is_empty());
    assert_eq!(snapshot.profile.preferences.interests, vec!["sports"]);
    assert!(snapshot.profile.preferences.tone.is_none());
}
