//! Unit tests for storage module

#[cfg(test)]
mod tests {
    use super::super::*;
    use crate::config::TrainingConfig;
    use crate::error::ErrorKind;
    use crate::ingester::extract_tails;
    use crate::ml::{FeatureBuilder, ModelArtifact, TrainedModel};
    use crate::types::*;
    use chrono::{Duration, NaiveDate, Utc};
    use rust_decimal_macros::dec;
    use std::collections::BTreeMap;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn hcm() -> Station {
        Station::province(Region::Xsmn, "tp-hcm")
    }

    fn draw(d: NaiveDate, special: &str) -> DrawRecord {
        let mut prizes = BTreeMap::new();
        prizes.insert(PrizeTier::Special, PrizeValue::Single(special.into()));
        prizes.insert(
            PrizeTier::Fourth,
            PrizeValue::Multiple(vec!["11134".into(), "22256".into(), "33356".into()]),
        );
        DrawRecord {
            id: None,
            draw_date: d,
            region: Region::Xsmn,
            province: Some("tp-hcm".into()),
            prizes,
        }
    }

    fn entry(version: &str, scope: WeekdayScope) -> ModelRegistryEntry {
        ModelRegistryEntry {
            id: None,
            station: hcm(),
            scope,
            version: version.into(),
            status: ModelStatus::Active,
            file_path: format!("xsmn_tp-hcm/{}.json", version),
            digest: "00".into(),
            backend: "gbdt".into(),
            train_start: date("2025-06-01"),
            train_end: date("2026-02-01"),
            train_periods: 36,
            row_count: 3600,
            metric_auc: 0.52,
            metric_hit_rate: 0.4,
            trained_at: Utc::now(),
        }
    }

    fn prediction(d: NaiveDate, pairs: &[Pair]) -> Prediction {
        Prediction {
            prediction_date: d,
            station: hcm(),
            ranked: pairs
                .iter()
                .enumerate()
                .map(|(i, p)| RankedPair {
                    pair: *p,
                    probability: 0.3 - i as f64 * 0.05,
                })
                .collect(),
            model_version: "gbdt_20260201".into(),
        }
    }

    #[tokio::test]
    async fn test_upsert_draw_is_idempotent() {
        let db = Database::in_memory().await.unwrap();
        let d = date("2026-02-16");

        let first = db.upsert_draw(&draw(d, "123456")).await.unwrap();
        let second = db.upsert_draw(&draw(d, "654321")).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(db.draw_count().await.unwrap(), 1);

        let stored = db.draws_on(d).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].id, Some(first));
        assert_eq!(
            stored[0].prizes[&PrizeTier::Special],
            PrizeValue::Single("654321".into())
        );
    }

    #[tokio::test]
    async fn test_corrected_draw_drops_stale_tails() {
        let db = Database::in_memory().await.unwrap();
        let d = date("2026-02-16");
        let mut record = draw(d, "123456");
        record.id = Some(db.upsert_draw(&record).await.unwrap());
        db.insert_tails(record.id.unwrap(), &extract_tails(&record).unwrap())
            .await
            .unwrap();

        // Same prizes again: tails stay
        db.upsert_draw(&record).await.unwrap();
        assert!(db.has_tails(record.id.unwrap()).await.unwrap());
        assert!(db.draws_without_tails().await.unwrap().is_empty());

        let mut corrected = draw(d, "123478");
        corrected.id = Some(db.upsert_draw(&corrected).await.unwrap());
        assert_eq!(corrected.id, record.id);
        assert!(!db.has_tails(record.id.unwrap()).await.unwrap());
        let pending = db.draws_without_tails().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, record.id);

        let inserted = db
            .insert_tails(corrected.id.unwrap(), &extract_tails(&pending[0]).unwrap())
            .await
            .unwrap();
        assert_eq!(inserted, 4);
        let set = db.tail_set(&hcm(), d).await.unwrap().unwrap();
        assert!(set.contains(78));
        // The old special prize also ended in 56
        assert_eq!(set.occurrences(56), 2);
    }

    #[tokio::test]
    async fn test_insert_tails_skips_known_draw() {
        let db = Database::in_memory().await.unwrap();
        let d = date("2026-02-16");
        let mut record = draw(d, "123456");
        record.id = Some(db.upsert_draw(&record).await.unwrap());
        let tails = extract_tails(&record).unwrap();

        assert_eq!(db.draws_without_tails().await.unwrap().len(), 1);
        assert_eq!(db.insert_tails(record.id.unwrap(), &tails).await.unwrap(), 4);
        assert_eq!(db.insert_tails(record.id.unwrap(), &tails).await.unwrap(), 0);
        assert_eq!(db.tail_count(&hcm()).await.unwrap(), 4);
        assert!(db.has_tails(record.id.unwrap()).await.unwrap());
        assert!(db.draws_without_tails().await.unwrap().is_empty());

        let set = db.tail_set(&hcm(), d).await.unwrap().unwrap();
        assert_eq!(set.occurrences(56), 3);
        assert_eq!(set.occurrences(34), 1);
        assert!(db.tail_set(&hcm(), d + Duration::days(1)).await.unwrap().is_none());
        assert_eq!(db.stations_with_tails().await.unwrap(), vec![hcm()]);
    }

    #[tokio::test]
    async fn test_tail_history_is_ordered() {
        let db = Database::in_memory().await.unwrap();
        for (d, special) in [("2026-02-16", "100001"), ("2026-02-09", "100002")] {
            let mut record = draw(date(d), special);
            record.id = Some(db.upsert_draw(&record).await.unwrap());
            let tails = extract_tails(&record).unwrap();
            db.insert_tails(record.id.unwrap(), &tails).await.unwrap();
        }

        let history = db.tail_history(&hcm()).await.unwrap();
        let dates: Vec<_> = history.dates().collect();
        assert_eq!(dates, vec![date("2026-02-09"), date("2026-02-16")]);
        assert!(history.tail_set_on(date("2026-02-09")).unwrap().contains(2));
    }

    #[tokio::test]
    async fn test_feature_set_roundtrip_and_idempotence() {
        let db = Database::in_memory().await.unwrap();
        let target = date("2026-02-16");
        let past = vec![(date("2026-02-09"), TailSet::from_pairs([3, 56]))];
        let rows = FeatureBuilder::new(120)
            .build(&hcm(), target, &past, Some(&TailSet::from_pairs([56])))
            .unwrap();

        db.save_feature_set(&rows).await.unwrap();
        db.save_feature_set(&rows).await.unwrap();
        assert_eq!(db.feature_row_count(&hcm(), target).await.unwrap(), 100);

        let stored = db.feature_rows(&hcm(), target).await.unwrap();
        assert_eq!(stored, rows);
    }

    #[tokio::test]
    async fn test_partial_feature_set_is_not_written() {
        let db = Database::in_memory().await.unwrap();
        let target = date("2026-02-16");
        let rows = FeatureBuilder::new(120)
            .build(&hcm(), target, &[], None)
            .unwrap();

        let err = db.save_feature_set(&rows[..99]).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Integrity);
        assert_eq!(db.feature_row_count(&hcm(), target).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_labeled_rows_respect_scope() {
        let db = Database::in_memory().await.unwrap();
        let builder = FeatureBuilder::new(120);
        let label = TailSet::from_pairs([1]);
        // Monday and Tuesday labeled, next Monday unlabeled
        for (d, labeled) in [("2026-02-16", true), ("2026-02-17", true), ("2026-02-23", false)] {
            let rows = builder
                .build(&hcm(), date(d), &[], labeled.then_some(&label))
                .unwrap();
            db.save_feature_set(&rows).await.unwrap();
        }

        let all = db.labeled_feature_rows(&hcm(), WeekdayScope::All).await.unwrap();
        assert_eq!(all.len(), 200);
        let monday = db
            .labeled_feature_rows(&hcm(), WeekdayScope::Weekday(0))
            .await
            .unwrap();
        assert_eq!(monday.len(), 100);
        assert!(monday.iter().all(|r| r.target_date == date("2026-02-16")));

        let after = db
            .labeled_dates_after(&hcm(), WeekdayScope::All, date("2026-02-16"))
            .await
            .unwrap();
        assert_eq!(after, 1);
    }

    #[tokio::test]
    async fn test_activation_keeps_one_active_per_scope() {
        let db = Database::in_memory().await.unwrap();

        db.activate_model(&entry("gbdt_20260201_wd0", WeekdayScope::Weekday(0)))
            .await
            .unwrap();
        db.activate_model(&entry("gbdt_20260208_wd0", WeekdayScope::Weekday(0)))
            .await
            .unwrap();
        db.activate_model(&entry("gbdt_20260208", WeekdayScope::All))
            .await
            .unwrap();

        let active = db.active_models().await.unwrap();
        assert_eq!(active.len(), 2);
        let wd0 = db
            .active_model(&hcm(), WeekdayScope::Weekday(0))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(wd0.version, "gbdt_20260208_wd0");

        let history = db.model_history(&hcm()).await.unwrap();
        assert_eq!(history.len(), 3);
        let old = history
            .iter()
            .find(|e| e.version == "gbdt_20260201_wd0")
            .unwrap();
        assert_eq!(old.status, ModelStatus::Deprecated);

        let versions = db
            .model_versions(&hcm(), WeekdayScope::Weekday(0))
            .await
            .unwrap();
        assert_eq!(versions.len(), 2);
    }

    #[tokio::test]
    async fn test_second_active_row_is_rejected() {
        let db = Database::in_memory().await.unwrap();
        db.activate_model(&entry("gbdt_20260201", WeekdayScope::All))
            .await
            .unwrap();

        let result = sqlx::query(
            "INSERT INTO model_registry (region, station, scope, version, status, file_path, \
             digest, backend, train_start, train_end, train_periods, row_count, metric_auc, \
             metric_hit_rate, trained_at) VALUES ('XSMN', 'tp-hcm', 'all', 'rogue', 'active', \
             'x', 'y', 'gbdt', '2026-01-01', '2026-02-01', 1, 1, 0.5, 0.5, '2026-02-01')",
        )
        .execute(db.pool())
        .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_resolve_prefers_weekday_model() {
        let db = Database::in_memory().await.unwrap();
        let monday = date("2026-02-16");
        let tuesday = date("2026-02-17");

        assert!(db.resolve_active_model(&hcm(), monday).await.unwrap().is_none());

        db.activate_model(&entry("gbdt_20260201", WeekdayScope::All))
            .await
            .unwrap();
        db.activate_model(&entry("gbdt_20260201_wd0", WeekdayScope::Weekday(0)))
            .await
            .unwrap();

        let m = db.resolve_active_model(&hcm(), monday).await.unwrap().unwrap();
        assert_eq!(m.version, "gbdt_20260201_wd0");
        let t = db.resolve_active_model(&hcm(), tuesday).await.unwrap().unwrap();
        assert_eq!(t.version, "gbdt_20260201");
    }

    #[tokio::test]
    async fn test_cleanup_queries() {
        let db = Database::in_memory().await.unwrap();
        db.activate_model(&entry("gbdt_20260101", WeekdayScope::All))
            .await
            .unwrap();
        db.activate_model(&entry("gbdt_20260201", WeekdayScope::All))
            .await
            .unwrap();

        let future = Utc::now() + Duration::days(1);
        let old = db.deprecated_models_before(future).await.unwrap();
        assert_eq!(old.len(), 1);
        assert!(db
            .deprecated_models_before(Utc::now() - Duration::days(1))
            .await
            .unwrap()
            .is_empty());

        assert!(db.delete_model(old[0].id.unwrap()).await.unwrap());
        let active = db.active_models().await.unwrap();
        // active entries are never deleted
        assert!(!db.delete_model(active[0].id.unwrap()).await.unwrap());
    }

    #[tokio::test]
    async fn test_prediction_upsert_replaces() {
        let db = Database::in_memory().await.unwrap();
        let d = date("2026-02-16");

        db.save_prediction(&prediction(d, &[12, 34, 56])).await.unwrap();
        db.save_prediction(&prediction(d, &[7, 8, 9])).await.unwrap();

        let stored = db.predictions_on(d).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].pairs(), vec![7, 8, 9]);
        assert_eq!(db.prediction(&hcm(), d).await.unwrap().unwrap(), stored[0]);
        assert_eq!(
            db.versions_used_since(d).await.unwrap(),
            vec!["gbdt_20260201".to_string()]
        );
    }

    #[tokio::test]
    async fn test_settlement_roundtrip_and_unsettled() {
        let db = Database::in_memory().await.unwrap();
        let d1 = date("2026-02-09");
        let d2 = date("2026-02-16");
        db.save_prediction(&prediction(d1, &[12, 34, 56])).await.unwrap();
        db.save_prediction(&prediction(d2, &[1, 2, 3])).await.unwrap();
        assert_eq!(db.unsettled_predictions(d2).await.unwrap().len(), 2);
        assert_eq!(db.unsettled_predictions(d1).await.unwrap().len(), 1);

        let mut details = BTreeMap::new();
        details.insert(34, 1);
        details.insert(56, 2);
        let record = SettlementRecord {
            prediction_date: d1,
            station: hcm(),
            predicted: vec![12, 34, 56],
            hit: true,
            matched_pairs: vec![34, 56],
            tail_set: vec![34, 56, 90],
            financials: Some(Financials {
                cost: dec!(98000),
                revenue: dec!(420000),
                profit: dec!(322000),
                details,
            }),
        };
        db.save_settlement(&record).await.unwrap();
        db.save_settlement(&record).await.unwrap();

        let stored = db.settlement(&hcm(), d1).await.unwrap().unwrap();
        assert_eq!(stored, record);
        assert_eq!(db.settlements_between(d1, d2).await.unwrap().len(), 1);
        assert_eq!(db.recent_settlements(&hcm(), 30).await.unwrap().len(), 1);

        let pending = db.unsettled_predictions(d2).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].prediction_date, d2);
    }

    #[tokio::test]
    async fn test_artifact_store_verifies_digest() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        let artifact = ModelArtifact::new(
            hcm(),
            WeekdayScope::All,
            "logistic_20260216".into(),
            TrainedModel::new(&TrainingConfig::default()),
        );

        let stored = store.save(&artifact).await.unwrap();
        assert_eq!(stored.file_path, "xsmn_tp-hcm/logistic_20260216.json");

        let mut e = entry("logistic_20260216", WeekdayScope::All);
        e.file_path = stored.file_path.clone();
        e.digest = stored.digest.clone();
        let loaded = store.load(&e).await.unwrap();
        assert_eq!(loaded.version, "logistic_20260216");
        assert_eq!(store.cached(), 1);

        assert!(store.delete(&stored.file_path).await.unwrap());
        assert!(!store.delete(&stored.file_path).await.unwrap());
        assert_eq!(store.cached(), 0);
    }

    #[tokio::test]
    async fn test_artifact_store_rejects_tampered_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        let artifact = ModelArtifact::new(
            hcm(),
            WeekdayScope::All,
            "logistic_20260216".into(),
            TrainedModel::new(&TrainingConfig::default()),
        );
        let stored = store.save(&artifact).await.unwrap();
        std::fs::write(dir.path().join(&stored.file_path), b"{}").unwrap();

        let mut e = entry("logistic_20260216", WeekdayScope::All);
        e.file_path = stored.file_path;
        e.digest = stored.digest;
        let err = store.load(&e).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Integrity);
    }
}
