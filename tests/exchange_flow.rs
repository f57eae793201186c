//! End-to-end practice flow: orchestrator, persistence and the HTTP backend

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

use lingo_coach::agent::{
    ExchangeOrchestrator, ExchangeOutcome, ExchangeReport, HttpResponse, HttpSender, RequestSender,
    TransportError,
};
use lingo_coach::config::Config;
use lingo_coach::learning::Tier;
use lingo_coach::server::{router, CompletionBackend, ServerState};
use lingo_coach::storage::{keys, FileBackend, QuotaSafeStore};
use lingo_coach::types::{CompletionRequest, Exchange};

const RICH: &str = "मेरो नाम राम हो र म काठमाडौंमा बस्छु। म नेपाली भाषा सिक्दै छु र मलाई धेरै रमाइलो लाग्छ।";

fn file_store(dir: &TempDir) -> Arc<QuotaSafeStore> {
    let backend = FileBackend::new(dir.path(), 10 * 1024 * 1024).unwrap();
    Arc::new(QuotaSafeStore::new(Arc::new(backend), 1024 * 1024, Duration::from_millis(20)))
}

/// Sender that answers every request with the same tutor reply
struct FixedReply(String);

#[async_trait]
impl RequestSender for FixedReply {
    async fn send(&self, _request: &CompletionRequest) -> Result<HttpResponse, TransportError> {
        Ok(HttpResponse::new(200, serde_json::json!({ "response": self.0 }).to_string()))
    }
}

fn replying(text: &str) -> Arc<FixedReply> {
    Arc::new(FixedReply(text.to_string()))
}

fn report(outcome: ExchangeOutcome) -> ExchangeReport {
    match outcome {
        ExchangeOutcome::Replied(report) => report,
        ExchangeOutcome::Ignored => panic!("exchange was ignored"),
    }
}

#[tokio::test]
async fn test_fluent_learner_reaches_advanced_and_survives_restart() {
    let dir = TempDir::new().unwrap();
    let sender = replying("धेरै राम्रो! Tell me about your family.");

    {
        let coach = ExchangeOrchestrator::new(&Config::default(), sender.clone(), file_store(&dir));
        let first = report(coach.send(RICH).await.unwrap());
        assert!(first.profile.is_none());
        report(coach.send(RICH).await.unwrap());
        let third = report(coach.send(RICH).await.unwrap());

        let profile = third.profile.expect("profile after three exchanges");
        assert_eq!(profile.tier, Tier::Advanced);
        assert_eq!(profile.standardized_level, 5);
        assert_eq!(profile.confidence, 0.9);
        assert!(third.topics.contains(&"family".to_string()));
        coach.flush();
    }

    let restored = ExchangeOrchestrator::new(&Config::default(), sender, file_store(&dir));
    assert_eq!(restored.history().len(), 3);
    assert_eq!(restored.profile().map(|p| p.tier), Some(Tier::Advanced));
    assert_eq!(restored.counters().success_count, 3);
    assert!(restored.topics().contains(&"family".to_string()));
    assert_eq!(restored.streak(), 1);
}

#[tokio::test]
async fn test_repeated_corrections_recommend_grammar_review() {
    let sender = replying("Close! The correct way is: म भात खान्छु।");
    let store = Arc::new(QuotaSafeStore::in_memory(1024 * 1024));
    let coach = ExchangeOrchestrator::new(&Config::default(), sender, store);

    let mut last = None;
    for _ in 0..4 {
        last = Some(report(coach.send("म भात खान्छ").await.unwrap()));
    }
    let last = last.unwrap();

    let profile = last.profile.unwrap();
    assert_eq!(profile.tier, Tier::Beginner);
    assert!(profile.weaknesses.contains("grammar accuracy"));
    let ids: Vec<&str> = last.recommendations.iter().map(|l| l.id.as_str()).collect();
    assert_eq!(ids, vec!["basics-greetings", "basics-numbers", "grammar-review"]);
    assert_eq!(coach.counters().error_count, 4);
}

#[tokio::test]
async fn test_english_only_exchanges_are_not_counted() {
    let sender = replying("Great, try saying that in Nepali!");
    let store = Arc::new(QuotaSafeStore::in_memory(1024 * 1024));
    let coach = ExchangeOrchestrator::new(&Config::default(), sender, store);

    for _ in 0..5 {
        assert!(report(coach.send("hello there").await.unwrap()).profile.is_none());
    }
    assert_eq!(coach.counters().success_count + coach.counters().error_count, 0);
    assert_eq!(coach.history().len(), 5);
}

#[tokio::test]
async fn test_chinese_learner_with_cjk_script_range() {
    let mut config = Config::default();
    config.assessment.script_ranges = vec![[0x4E00, 0x9FFF]];
    config.validate().unwrap();
    let store = Arc::new(QuotaSafeStore::in_memory(1024 * 1024));

    let coach = ExchangeOrchestrator::new(&config, replying("很好！今天我们练习点菜。"), store.clone());
    for _ in 0..3 {
        report(coach.send("我每天学习中文，我很喜欢。").await.unwrap());
    }
    assert_eq!(coach.counters().success_count, 3);
    assert!(coach.profile().is_some());
    assert!(coach.topics().contains(&"time".to_string()));
    coach.flush();

    let corrected = ExchangeOrchestrator::new(&config, replying("应该是“我是学生”。"), store);
    report(corrected.send("我学生").await.unwrap());
    assert_eq!(corrected.counters().error_count, 1);
    assert_eq!(corrected.counters().success_count, 3);
}

#[test]
fn test_configured_store_evicts_history_when_budget_runs_out() {
    let dir = TempDir::new().unwrap();
    let mut config = Config::default();
    config.storage.data_dir = Some(dir.path().to_path_buf());
    config.storage.quota_mb = 1;
    config.storage.capacity_mb = 2;
    config.validate().unwrap();

    let store = QuotaSafeStore::from_config(&config).unwrap();
    let blob = "x".repeat(900 * 1024);
    assert!(store.set_safe(keys::HISTORY, &blob));
    assert!(store.set_safe(keys::TOPICS, &blob));

    // A third blob only fits once the history is gone
    assert!(store.set_safe(keys::PROFILE, &blob));
    assert!(!store.contains(keys::HISTORY));
    assert!(store.contains(keys::TOPICS));
    assert!(store.contains(keys::PROFILE));

    // Topics are next in line
    assert!(store.set_safe(keys::VOCABULARY, &"y".repeat(1000 * 1024)));
    assert!(!store.contains(keys::TOPICS));
    assert!(store.contains(keys::PROFILE));
    assert!(store.contains(keys::VOCABULARY));
}

struct TutorBackend;

#[async_trait]
impl CompletionBackend for TutorBackend {
    async fn complete(&self, message: &str, history: &[Exchange]) -> anyhow::Result<String> {
        Ok(format!("({} earlier) राम्रो: {}", history.len(), message))
    }

    fn model(&self) -> &str {
        "tutor"
    }
}

#[tokio::test]
async fn test_orchestrator_against_live_backend() {
    let state = ServerState::new(Config::default(), Arc::new(TutorBackend));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = tokio::spawn(async move {
        axum::serve(listener, router(state)).await.unwrap();
    });

    let sender = Arc::new(HttpSender::new(format!("http://{}/api/chat", addr)).unwrap());
    let store = Arc::new(QuotaSafeStore::in_memory(1024 * 1024));
    let coach = ExchangeOrchestrator::new(&Config::default(), sender, store);

    let first = report(coach.send("नमस्ते").await.unwrap());
    assert_eq!(first.reply, "(0 earlier) राम्रो: नमस्ते");
    let second = report(coach.send("धन्यवाद").await.unwrap());
    assert_eq!(second.reply, "(1 earlier) राम्रो: धन्यवाद");

    server.abort();
}
