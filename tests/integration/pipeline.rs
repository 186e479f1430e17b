//! Full-cycle scenarios through the public API.

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use async_trait::async_trait;
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use mockall::mock;
    use mockall::predicate::{always, eq};

    use valuebets::config::{AppConfig, EngineConfig};
    use valuebets::engine::{dedup::FingerprintMemory, evaluate, ValueEngine};
    use valuebets::provider::OddsProvider;
    use valuebets::sink::{deliver_all, RecommendationSink, TracingSink};
    use valuebets::storage::{self, history::HistoryStore};
    use valuebets::strategy::stake::{StakeAdvisor, StakeConfig};
    use valuebets::types::{Recommendation, Tier, ValuebetsError};

    use crate::mock_provider::{event, h2h_book, two_book_event, MockProvider};

    mock! {
        pub Sink {}

        #[async_trait]
        impl RecommendationSink for Sink {
            async fn deliver(&self, tier: Tier, recommendations: &[Recommendation]) -> Result<()>;
            async fn notify_empty(&self) -> Result<()>;
            fn name(&self) -> &str;
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 14, 9, 0, 0).unwrap()
    }

    fn temp_path() -> String {
        let mut p = std::env::temp_dir();
        p.push(format!("valuebets_it_memory_{}.json", uuid::Uuid::new_v4()));
        p.to_string_lossy().to_string()
    }

    #[tokio::test]
    async fn test_provider_to_tiers() {
        let provider = MockProvider::new(vec![two_book_event("ev-1", now())], now());
        let batch = provider.fetch_batch().await.unwrap();

        let mut engine = ValueEngine::new(EngineConfig::default());
        let out = engine.run_cycle(&batch, now()).unwrap();

        let spec = &out.recommendations[&Tier::Speculative];
        assert_eq!(spec.len(), 1);
        assert_eq!(spec[0].candidate.bookmaker_id, "sportsbet");
        assert_eq!(spec[0].candidate.outcome_id, "h2h/carlton");
        assert_eq!(spec[0].event.home_team, "Carlton");

        let safe = &out.recommendations[&Tier::Safe];
        assert_eq!(safe.len(), 1);
        assert_eq!(safe[0].candidate.bookmaker_id, "tab");
        assert_eq!(safe[0].candidate.outcome_id, "h2h/collingwood");

        let delivery = deliver_all(&TracingSink, &out.recommendations).await;
        assert_eq!(delivery.delivered, 2);
        assert_eq!(provider.calls(), 1);
    }

    #[test]
    fn test_lone_book_never_recommended() {
        let lone = event(
            "ev-lone",
            "Geelong",
            "Essendon",
            now(),
            4,
            vec![h2h_book("sportsbet", "SportsBet", &[("Geelong", 25.0)], now())],
        );
        let provider = MockProvider::new(vec![lone], now());
        let batch = tokio_test::block_on(provider.fetch_batch()).unwrap();

        let mut memory = FingerprintMemory::new();
        let out = evaluate(&batch, &EngineConfig::default(), &mut memory, now()).unwrap();
        assert!(out.recommendations.is_empty());
        assert_eq!(out.report.total_emitted(), 0);
        assert!(memory.is_empty());
    }

    #[test]
    fn test_config_error_aborts_cycle() {
        let provider = MockProvider::new(vec![two_book_event("ev-1", now())], now());
        let batch = tokio_test::block_on(provider.fetch_batch()).unwrap();

        let cfg = EngineConfig { min_best_edge: -0.5, ..EngineConfig::default() };
        let mut engine = ValueEngine::new(cfg);
        let err = engine.run_cycle(&batch, now()).unwrap_err();
        assert!(matches!(err, ValuebetsError::Config(_)));
        assert_eq!(engine.cycles_run(), 0);
        assert!(engine.memory().is_empty());
    }

    #[tokio::test]
    async fn test_provider_failure_surfaces() {
        let provider = MockProvider::new(vec![], now());
        provider.set_error("quota exhausted");
        assert!(provider.fetch_batch().await.is_err());
        provider.clear_error();
        assert!(provider.fetch_batch().await.unwrap().events.is_empty());
    }

    #[test]
    fn test_cooldown_survives_restart() {
        let path = temp_path();
        let provider = MockProvider::new(vec![two_book_event("ev-1", now())], now());
        let batch = tokio_test::block_on(provider.fetch_batch()).unwrap();

        // First process: emit and persist
        let mut engine = ValueEngine::new(EngineConfig::default());
        let first = engine.run_cycle(&batch, now()).unwrap();
        assert_eq!(first.report.total_emitted(), 2);
        storage::save_memory(engine.memory(), Some(&path)).unwrap();

        // Second process, one hour later: same prices are suppressed
        let later = now() + Duration::hours(1);
        let memory = storage::load_memory(Some(&path), later).unwrap();
        let mut restarted = ValueEngine::with_memory(EngineConfig::default(), memory);
        let second = restarted.run_cycle(&batch, later).unwrap();
        assert_eq!(second.report.total_emitted(), 0);
        assert_eq!(second.report.suppressed, 2);

        // After the cool-down the fingerprints are free again
        let much_later = now() + Duration::hours(7);
        let memory = storage::load_memory(Some(&path), much_later).unwrap();
        assert!(memory.is_empty());

        storage::delete_memory(Some(&path)).unwrap();
    }

    #[test]
    fn test_new_outcome_not_suppressed_by_old_fingerprint() {
        let mut engine = ValueEngine::new(EngineConfig::default());
        let batch = tokio_test::block_on(
            MockProvider::new(vec![two_book_event("ev-1", now())], now()).fetch_batch(),
        )
        .unwrap();
        engine.run_cycle(&batch, now()).unwrap();

        let later = now() + Duration::minutes(10);
        let batch = tokio_test::block_on(
            MockProvider::new(
                vec![two_book_event("ev-1", later), two_book_event("ev-2", later)],
                later,
            )
            .fetch_batch(),
        )
        .unwrap();
        let out = engine.run_cycle(&batch, later).unwrap();
        assert_eq!(out.report.suppressed, 2);
        assert!(out
            .recommendations
            .values()
            .flatten()
            .all(|r| r.candidate.event_id == "ev-2"));
        assert_eq!(out.report.total_emitted(), 2);
    }

    #[test]
    fn test_tier_caps_bound_output() {
        let events = (0..8).map(|i| two_book_event(&format!("ev-{i}"), now())).collect();
        let batch = tokio_test::block_on(MockProvider::new(events, now()).fetch_batch()).unwrap();

        let mut cfg = EngineConfig { per_tier_cap: 3, ..EngineConfig::default() };
        cfg.tier_caps.insert(Tier::Safe, 2);
        let out = ValueEngine::new(cfg).run_cycle(&batch, now()).unwrap();

        assert_eq!(out.recommendations[&Tier::Speculative].len(), 3);
        assert_eq!(out.recommendations[&Tier::Safe].len(), 2);
    }

    #[test]
    fn test_allow_list_from_config() {
        let toml = r#"
            [agent]
            name = "VALUEBETS-IT"
            cycle_interval_secs = 60

            [provider]
            api_key_env = "ODDS_API_KEY"

            [engine]
            allowed_bookmakers = ["tab"]
        "#;
        let cfg = AppConfig::from_toml_str(toml).unwrap();
        let batch = tokio_test::block_on(
            MockProvider::new(vec![two_book_event("ev-1", now())], now()).fetch_batch(),
        )
        .unwrap();

        // Only one book survives the allow-list, so nothing is peer-checked
        let out = ValueEngine::new(cfg.engine).run_cycle(&batch, now()).unwrap();
        assert!(out.recommendations.is_empty());
        assert!(out.report.rejections > 0);
    }

    #[tokio::test]
    async fn test_history_records_emitted() {
        let provider = MockProvider::new(vec![two_book_event("ev-1", now())], now());
        let batch = provider.fetch_batch().await.unwrap();
        let out = ValueEngine::new(EngineConfig::default()).run_cycle(&batch, now()).unwrap();

        let store = HistoryStore::connect("sqlite::memory:").await.unwrap();
        let stakes = StakeAdvisor::new(StakeConfig::default());
        for rec in out.recommendations.values().flatten() {
            store.record(rec, &stakes.plan(rec)).await.unwrap();
        }

        assert_eq!(store.count().await.unwrap(), 2);
        let spec = store.expected_roi(Some(Tier::Speculative)).await.unwrap();
        assert_eq!(spec.bets, 1);
        assert!(spec.roi_pct > 0.0);
    }

    #[tokio::test]
    async fn test_failed_delivery_retried_next_cycle() {
        let provider = MockProvider::new(vec![two_book_event("ev-1", now())], now());
        let batch = provider.fetch_batch().await.unwrap();
        let mut engine = ValueEngine::new(EngineConfig::default());
        let first = engine.run_cycle(&batch, now()).unwrap();

        let mut sink = MockSink::new();
        sink.expect_deliver()
            .with(eq(Tier::Speculative), always())
            .returning(|_, _| Err(anyhow::anyhow!("webhook returned 502")));
        sink.expect_deliver().with(eq(Tier::Safe), always()).returning(|_, _| Ok(()));
        sink.expect_name().return_const("mock".to_string());

        let delivery = deliver_all(&sink, &first.recommendations).await;
        assert_eq!(delivery.failed_tiers(), vec![Tier::Speculative]);
        assert_eq!(engine.release_undelivered(&first.recommendations, &delivery.failed_tiers()), 1);

        // The delivered SAFE pick stays suppressed; the failed one comes back
        let later = now() + Duration::minutes(10);
        provider.set_events(vec![two_book_event("ev-1", later)]);
        let batch = provider.fetch_batch().await.unwrap();
        let retry = engine.run_cycle(&batch, later).unwrap();
        assert_eq!(retry.report.suppressed, 1);
        let spec = &retry.recommendations[&Tier::Speculative];
        assert_eq!(spec.len(), 1);
        assert_eq!(spec[0].candidate.bookmaker_id, "sportsbet");
        assert!(!retry.recommendations.contains_key(&Tier::Safe));
    }

    #[test]
    fn test_one_sided_quote_needs_real_consensus() {
        // tab prices both sides alone; sportsbet quotes only Carlton
        let thin = event(
            "ev-thin",
            "Carlton",
            "Collingwood",
            now(),
            6,
            vec![
                h2h_book("tab", "TAB", &[("Carlton", 2.2), ("Collingwood", 1.8)], now()),
                h2h_book("sportsbet", "SportsBet", &[("Carlton", 2.5)], now()),
            ],
        );
        let batch = tokio_test::block_on(MockProvider::new(vec![thin], now()).fetch_batch()).unwrap();
        let out = ValueEngine::new(EngineConfig::default()).run_cycle(&batch, now()).unwrap();
        assert!(out.recommendations.is_empty());
        assert_eq!(out.report.candidates_scored, 0);
    }
}
