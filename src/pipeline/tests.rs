//! Unit tests for pipeline module

#[cfg(test)]
mod tests {
    use super::super::*;
    use crate::error::ErrorKind;
    use crate::ingester::JsonLinesSource;
    use crate::types::*;
    use chrono::{Duration, NaiveDate};
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    fn start() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, 1).unwrap()
    }

    fn day(n: i64) -> NaiveDate {
        start() + Duration::days(n)
    }

    fn xsmb() -> Station {
        Station::nationwide(Region::Xsmb)
    }

    fn xsmb_draw(n: i64) -> DrawRecord {
        let value = |i: i64| format!("{:03}{:02}", n % 1000, (n * 37 + i * 11) % 100);
        let mut prizes = BTreeMap::new();
        prizes.insert(PrizeTier::Special, PrizeValue::Single(value(0)));
        prizes.insert(
            PrizeTier::Sixth,
            PrizeValue::Multiple((1..4).map(value).collect()),
        );
        prizes.insert(
            PrizeTier::Seventh,
            PrizeValue::Multiple((4..8).map(value).collect()),
        );
        DrawRecord {
            id: None,
            draw_date: day(n),
            region: Region::Xsmb,
            province: Some("ha-noi".into()),
            prizes,
        }
    }

    async fn pipeline(tmp: &TempDir) -> Pipeline {
        let mut config = Config::default();
        config.artifacts.dir = tmp.path().to_string_lossy().into_owned();
        config.training.gbdt.n_estimators = 20;
        config.retrain.min_new_periods = 5;
        let db = Database::in_memory().await.unwrap();
        Pipeline::new(config, db, Notifier::disabled())
    }

    /// Draws for days `0..days` with their tail observations
    async fn seed(pipeline: &Pipeline, days: i64) {
        for n in 0..days {
            pipeline.db().upsert_draw(&xsmb_draw(n)).await.unwrap();
        }
        let summary = pipeline.build_tails(None).await.unwrap();
        assert!(!summary.has_failures());
    }

    async fn seed_and_train(pipeline: &Pipeline, days: i64) -> ModelRegistryEntry {
        seed(pipeline, days).await;
        pipeline.build_features(FeatureTarget::Backfill).await.unwrap();
        pipeline
            .train_station(&xsmb(), WeekdayScope::All, false)
            .await
            .unwrap()
    }

    #[test]
    fn test_summary_classifies_errors() {
        let mut summary = RunSummary::new("predict");
        summary.succeeded("a", "ok");
        summary.record_error("b", &BotError::InsufficientData("3 periods".into()));
        summary.record_error("c", &BotError::MissingResult("holiday".into()));
        summary.record_error("d", &BotError::Integrity("partial".into()));
        summary.record_error("e", &BotError::Artifact("gone".into()));

        assert_eq!(summary.count(Status::Succeeded), 1);
        assert_eq!(summary.count(Status::Skipped), 1);
        assert_eq!(summary.count(Status::Pending), 1);
        assert_eq!(summary.failed(), 2);
        assert_eq!(
            summary.outcome("d").unwrap().status,
            Status::Failed(ErrorKind::Integrity)
        );
        assert_eq!(
            summary.outcome("e").unwrap().status,
            Status::Failed(ErrorKind::External)
        );
    }

    #[test]
    fn test_summary_html_is_escaped() {
        let mut summary = RunSummary::new("verify");
        summary.succeeded("XSMB <all>", "a & b");
        summary.counter("profit", "+1000");
        let html = summary.to_html();
        assert!(html.contains("XSMB &lt;all&gt;"));
        assert!(html.contains("a &amp; b"));
        assert!(html.contains("profit: <code>+1000</code>"));
        assert!(summary.to_string().contains("profit=+1000"));
    }

    #[tokio::test]
    async fn test_import_derives_tails_once() {
        let tmp = TempDir::new().unwrap();
        let pipeline = pipeline(&tmp).await;

        let path = tmp.path().join("draws.jsonl");
        let lines: Vec<String> = (0..2)
            .map(|n| serde_json::to_string(&xsmb_draw(n)).unwrap())
            .collect();
        std::fs::write(&path, lines.join("\n")).unwrap();
        let source = JsonLinesSource::new(&path);

        let summary = pipeline.import(&source, None).await.unwrap();
        assert_eq!(summary.count(Status::Succeeded), 2);
        assert_eq!(pipeline.db().tail_count(&xsmb()).await.unwrap(), 16);

        // Same file again: draws updated in place, no new tails
        pipeline.import(&source, None).await.unwrap();
        assert_eq!(pipeline.db().draw_count().await.unwrap(), 2);
        assert_eq!(pipeline.db().tail_count(&xsmb()).await.unwrap(), 16);

        let summary = pipeline.build_tails(Some(day(0))).await.unwrap();
        assert_eq!(
            summary.outcome(&format!("{} {}", xsmb(), day(0))).unwrap().detail,
            "already derived"
        );
        let summary = pipeline.build_tails(None).await.unwrap();
        assert!(summary.outcomes.is_empty());
    }

    #[tokio::test]
    async fn test_corrected_import_rederives_tails() {
        let tmp = TempDir::new().unwrap();
        let pipeline = pipeline(&tmp).await;
        assert_eq!(pipeline.import_draw(&xsmb_draw(0)).await.unwrap(), 8);
        assert_eq!(pipeline.import_draw(&xsmb_draw(0)).await.unwrap(), 0);

        let mut corrected = xsmb_draw(0);
        corrected
            .prizes
            .insert(PrizeTier::Special, PrizeValue::Single("00093".into()));
        assert_eq!(pipeline.import_draw(&corrected).await.unwrap(), 8);
        assert_eq!(pipeline.db().tail_count(&xsmb()).await.unwrap(), 8);
        let set = pipeline.db().tail_set(&xsmb(), day(0)).await.unwrap().unwrap();
        assert!(set.contains(93));
        assert!(!set.contains(0));
    }

    #[tokio::test]
    async fn test_import_rejects_unscheduled_southern_draws() {
        let tmp = TempDir::new().unwrap();
        let pipeline = pipeline(&tmp).await;

        let southern = |n: i64, province: Option<&str>| DrawRecord {
            region: Region::Xsmn,
            province: province.map(String::from),
            ..xsmb_draw(n)
        };
        // 2025-01-01 is a Wednesday, 2025-01-06 a Monday
        let records = [
            southern(0, None),
            southern(0, Some("tp-hcm")),
            southern(5, Some("tp-hcm")),
        ];
        let path = tmp.path().join("southern.jsonl");
        let lines: Vec<String> = records
            .iter()
            .map(|d| serde_json::to_string(d).unwrap())
            .collect();
        std::fs::write(&path, lines.join("\n")).unwrap();

        let summary = pipeline.import(&JsonLinesSource::new(&path), None).await.unwrap();
        assert_eq!(
            summary.outcome("XSMN/? 2025-01-01").unwrap().status,
            Status::Failed(ErrorKind::Integrity)
        );
        assert_eq!(
            summary.outcome("XSMN/tp-hcm 2025-01-01").unwrap().status,
            Status::Failed(ErrorKind::Integrity)
        );
        assert_eq!(
            summary.outcome("XSMN/tp-hcm 2025-01-06").unwrap().status,
            Status::Succeeded
        );

        // Nothing was filed under the region-wide station
        assert_eq!(pipeline.db().draw_count().await.unwrap(), 1);
        let hcm = Station::province(Region::Xsmn, "tp-hcm");
        assert_eq!(pipeline.db().tail_count(&hcm).await.unwrap(), 8);
        assert_eq!(
            pipeline
                .db()
                .tail_count(&Station::nationwide(Region::Xsmn))
                .await
                .unwrap(),
            0
        );
    }

    #[tokio::test]
    async fn test_feature_backfill_is_incremental() {
        let tmp = TempDir::new().unwrap();
        let pipeline = pipeline(&tmp).await;
        seed(&pipeline, 15).await;

        let summary = pipeline.build_features(FeatureTarget::Backfill).await.unwrap();
        // Days 0..9 have fewer than 10 periods before them
        assert_eq!(
            summary.outcome(&xsmb().to_string()).unwrap().detail,
            "5 built, 0 already stored, 10 too early"
        );
        assert_eq!(pipeline.db().feature_row_count(&xsmb(), day(12)).await.unwrap(), 100);
        assert_eq!(pipeline.db().feature_row_count(&xsmb(), day(9)).await.unwrap(), 0);
        let rows = pipeline.db().feature_rows(&xsmb(), day(12)).await.unwrap();
        assert!(rows.iter().all(|r| r.label.is_some()));

        let summary = pipeline.build_features(FeatureTarget::Backfill).await.unwrap();
        assert_eq!(
            summary.outcome(&xsmb().to_string()).unwrap().detail,
            "0 built, 5 already stored, 10 too early"
        );
    }

    #[tokio::test]
    async fn test_late_draw_refreshes_later_feature_tables() {
        let tmp = TempDir::new().unwrap();
        let pipeline = pipeline(&tmp).await;
        for n in (0..40).filter(|&n| n != 20) {
            pipeline.db().upsert_draw(&xsmb_draw(n)).await.unwrap();
        }
        pipeline.build_tails(None).await.unwrap();
        pipeline.build_features(FeatureTarget::Backfill).await.unwrap();
        let before = pipeline.db().feature_rows(&xsmb(), day(35)).await.unwrap();
        assert_eq!(before.len(), 100);

        // Day 20 arrives late
        pipeline.db().upsert_draw(&xsmb_draw(20)).await.unwrap();
        pipeline.build_tails(None).await.unwrap();
        let summary = pipeline.build_features(FeatureTarget::Backfill).await.unwrap();
        assert_eq!(
            summary.outcome(&xsmb().to_string()).unwrap().detail,
            "20 built, 10 already stored, 10 too early"
        );

        let history = pipeline.db().tail_history(&xsmb()).await.unwrap();
        let fresh = pipeline
            .features
            .build_from_history(&xsmb(), day(35), &history)
            .unwrap();
        let after = pipeline.db().feature_rows(&xsmb(), day(35)).await.unwrap();
        assert_eq!(after, fresh);
        assert_ne!(after, before);
        assert_eq!(pipeline.db().feature_row_count(&xsmb(), day(20)).await.unwrap(), 100);
    }

    #[tokio::test]
    async fn test_features_for_next_date_are_unlabeled_then_relabeled() {
        let tmp = TempDir::new().unwrap();
        let pipeline = pipeline(&tmp).await;
        seed(&pipeline, 12).await;

        let summary = pipeline.build_features(FeatureTarget::Date(day(12))).await.unwrap();
        assert_eq!(
            summary.outcome(&xsmb().to_string()).unwrap().detail,
            "100 rows"
        );
        // XSMN provinces have no history at all
        assert!(!summary.has_failures());
        assert!(summary.count(Status::Skipped) > 0);
        let before = pipeline.db().feature_rows(&xsmb(), day(12)).await.unwrap();
        assert!(before.iter().all(|r| r.label.is_none()));

        pipeline.db().upsert_draw(&xsmb_draw(12)).await.unwrap();
        pipeline.build_tails(Some(day(12))).await.unwrap();
        pipeline.build_features(FeatureTarget::Backfill).await.unwrap();

        let after = pipeline.db().feature_rows(&xsmb(), day(12)).await.unwrap();
        assert!(after.iter().all(|r| r.label.is_some()));
        for (a, b) in before.iter().zip(&after) {
            assert_eq!(a.to_vector(), b.to_vector());
        }
    }

    #[tokio::test]
    async fn test_short_history_is_skipped() {
        let tmp = TempDir::new().unwrap();
        let pipeline = pipeline(&tmp).await;
        seed(&pipeline, 3).await;

        let summary = pipeline.build_features(FeatureTarget::Date(day(3))).await.unwrap();
        assert_eq!(
            summary.outcome(&xsmb().to_string()).unwrap().status,
            Status::Skipped
        );
        assert_eq!(pipeline.db().feature_row_count(&xsmb(), day(3)).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_training_floor_and_force() {
        let tmp = TempDir::new().unwrap();
        let pipeline = pipeline(&tmp).await;
        seed(&pipeline, 15).await;
        pipeline.build_features(FeatureTarget::Backfill).await.unwrap();

        // 5 labeled tables: 500 rows, under the normal floor of 1000
        let targets = vec![(xsmb(), WeekdayScope::All)];
        let summary = pipeline.train(&targets, false).await.unwrap();
        assert_eq!(summary.count(Status::Skipped), 1);
        assert!(pipeline.db().active_models().await.unwrap().is_empty());

        let summary = pipeline.train(&targets, true).await.unwrap();
        assert_eq!(summary.count(Status::Succeeded), 1);
        let active = pipeline
            .db()
            .active_model(&xsmb(), WeekdayScope::All)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(active.row_count, 500);
        assert_eq!(active.train_periods, 5);
        assert!(active.version.starts_with("gbdt_"));
        assert!(pipeline.artifacts().dir().join(&active.file_path).exists());
    }

    #[tokio::test]
    async fn test_retraining_deprecates_previous_version() {
        let tmp = TempDir::new().unwrap();
        let pipeline = pipeline(&tmp).await;
        let first = seed_and_train(&pipeline, 30).await;
        let second = pipeline
            .train_station(&xsmb(), WeekdayScope::All, false)
            .await
            .unwrap();

        assert_eq!(second.version, format!("{}_r2", first.version));
        let history = pipeline.db().model_history(&xsmb()).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(
            history.iter().filter(|e| e.status == ModelStatus::Active).count(),
            1
        );
        let active = pipeline
            .db()
            .active_model(&xsmb(), WeekdayScope::All)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(active.version, second.version);
    }

    #[tokio::test]
    async fn test_predict_then_verify() {
        let tmp = TempDir::new().unwrap();
        let pipeline = pipeline(&tmp).await;
        seed_and_train(&pipeline, 30).await;
        let target = day(30);

        let summary = pipeline.predict(Some(target)).await.unwrap();
        let label = pipeline.schedule().display_name(&xsmb());
        assert_eq!(summary.outcome(&label).unwrap().status, Status::Succeeded);
        // Provinces without a model are skipped, not failed
        assert!(!summary.has_failures());

        let prediction = pipeline
            .db()
            .prediction(&xsmb(), target)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(prediction.ranked.len(), 3);
        // Built on the fly, never stored
        assert_eq!(pipeline.db().feature_row_count(&xsmb(), target).await.unwrap(), 0);

        // Same inputs, same prediction
        pipeline.predict(Some(target)).await.unwrap();
        let again = pipeline.db().prediction(&xsmb(), target).await.unwrap().unwrap();
        assert_eq!(again, prediction);

        // No results yet
        let summary = pipeline.verify(None).await.unwrap();
        assert_eq!(summary.count(Status::Pending), 1);
        assert!(pipeline.db().settlement(&xsmb(), target).await.unwrap().is_none());

        pipeline.db().upsert_draw(&xsmb_draw(30)).await.unwrap();
        pipeline.build_tails(Some(target)).await.unwrap();
        let summary = pipeline.verify(None).await.unwrap();
        assert_eq!(summary.count(Status::Succeeded), 1);

        let record = pipeline.db().settlement(&xsmb(), target).await.unwrap().unwrap();
        let fin = record.financials.clone().unwrap();
        assert_eq!(fin.cost, rust_decimal_macros::dec!(92000));
        assert_eq!(record.hit, !record.matched_pairs.is_empty());

        // Settled predictions drop out of the sweep
        assert!(pipeline.verify(None).await.unwrap().outcomes.is_empty());

        let report = pipeline.report(target, target).await.unwrap();
        assert_eq!(report.total.settled, 1);
        assert_eq!(report.total.profit, fin.profit);
    }

    #[tokio::test]
    async fn test_predict_without_model_is_skipped() {
        let tmp = TempDir::new().unwrap();
        let pipeline = pipeline(&tmp).await;
        seed(&pipeline, 12).await;

        let err = pipeline.predict_station(&xsmb(), day(12)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DataInsufficiency);
        assert!(pipeline.db().prediction(&xsmb(), day(12)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_predict_rejects_partial_stored_table() {
        let tmp = TempDir::new().unwrap();
        let pipeline = pipeline(&tmp).await;
        seed_and_train(&pipeline, 30).await;
        pipeline.build_station_features(&xsmb(), day(30)).await.unwrap();

        sqlx::query("DELETE FROM feature_rows WHERE target_date = ? AND pair >= 50")
            .bind(day(30))
            .execute(pipeline.db().pool())
            .await
            .unwrap();

        let err = pipeline.predict_station(&xsmb(), day(30)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Integrity);
        assert!(pipeline.db().prediction(&xsmb(), day(30)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_training_targets() {
        let tmp = TempDir::new().unwrap();
        let pipeline = pipeline(&tmp).await;
        let hcm = Station::province(Region::Xsmn, "tp-hcm");

        let all = pipeline.training_targets(None, None);
        assert!(all.contains(&(xsmb(), WeekdayScope::All)));
        assert!(all.contains(&(hcm.clone(), WeekdayScope::Weekday(0))));
        assert!(all.contains(&(hcm.clone(), WeekdayScope::Weekday(5))));
        assert!(!all.contains(&(hcm.clone(), WeekdayScope::All)));

        assert_eq!(
            pipeline.training_targets(Some(&hcm), Some(WeekdayScope::All)),
            vec![(hcm.clone(), WeekdayScope::All)]
        );
        assert_eq!(pipeline.training_targets(Some(&hcm), None).len(), 2);
    }

    #[tokio::test]
    async fn test_retrain_triggers() {
        let tmp = TempDir::new().unwrap();
        let pipeline = pipeline(&tmp).await;

        let checks = pipeline.retrain_checks().await.unwrap();
        assert!(checks.iter().all(|c| c.reason == Some(RetrainReason::NoModel)));

        seed_and_train(&pipeline, 30).await;
        assert_eq!(
            pipeline.retrain_reason(&xsmb(), WeekdayScope::All).await.unwrap(),
            None
        );

        // Pretend the model was trained on the first days only
        sqlx::query("UPDATE model_registry SET train_end = ? WHERE status = 'active'")
            .bind(day(12))
            .execute(pipeline.db().pool())
            .await
            .unwrap();
        assert!(matches!(
            pipeline.retrain_reason(&xsmb(), WeekdayScope::All).await.unwrap(),
            Some(RetrainReason::NewData { new_periods: 17, .. })
        ));

        sqlx::query(
            "UPDATE model_registry SET train_end = ?, metric_hit_rate = 0.9 WHERE status = 'active'",
        )
        .bind(day(29))
        .execute(pipeline.db().pool())
        .await
        .unwrap();
        for n in 20..25 {
            let record = SettlementRecord {
                prediction_date: day(n),
                station: xsmb(),
                predicted: vec![1, 2, 3],
                hit: n == 20,
                matched_pairs: vec![],
                tail_set: vec![4],
                financials: None,
            };
            pipeline.db().save_settlement(&record).await.unwrap();
        }
        match pipeline.retrain_reason(&xsmb(), WeekdayScope::All).await.unwrap() {
            Some(RetrainReason::PerformanceDrop { recent, trained }) => {
                assert!((recent - 0.2).abs() < 1e-12);
                assert!((trained - 0.9).abs() < 1e-12);
            }
            other => panic!("expected a performance drop, got {:?}", other),
        }

        let summary = pipeline.check_training(false, false).await.unwrap();
        let flagged = pipeline.training_targets(None, None).len();
        assert!(summary
            .counters
            .contains(&("flagged".to_string(), flagged.to_string())));
    }

    #[tokio::test]
    async fn test_cleanup_removes_unused_deprecated_models() {
        let tmp = TempDir::new().unwrap();
        let mut p = pipeline(&tmp).await;
        p.config.retrain.retention_days = 0;
        let pipeline = p;

        let first = seed_and_train(&pipeline, 30).await;
        pipeline
            .train_station(&xsmb(), WeekdayScope::All, false)
            .await
            .unwrap();
        let first_file = pipeline.artifacts().dir().join(&first.file_path);
        assert!(first_file.exists());

        let summary = pipeline.cleanup_models(true).await.unwrap();
        assert_eq!(summary.count(Status::Succeeded), 1);
        assert!(first_file.exists());

        let summary = pipeline.cleanup_models(false).await.unwrap();
        assert!(summary.counters.contains(&("deleted".to_string(), "1".to_string())));
        assert!(!first_file.exists());
        let history = pipeline.db().model_history(&xsmb()).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].status, ModelStatus::Active);
    }

    #[tokio::test]
    async fn test_cleanup_keeps_file_of_reactivated_model() {
        let tmp = TempDir::new().unwrap();
        let pipeline = pipeline(&tmp).await;

        let first = seed_and_train(&pipeline, 30).await;
        pipeline
            .train_station(&xsmb(), WeekdayScope::All, false)
            .await
            .unwrap();
        let listed = pipeline
            .db()
            .model_history(&xsmb())
            .await
            .unwrap()
            .into_iter()
            .find(|m| m.version == first.version)
            .unwrap();
        assert_eq!(listed.status, ModelStatus::Deprecated);

        // Rolled back to the first version after cleanup listed it
        sqlx::query("UPDATE model_registry SET status = 'deprecated' WHERE status = 'active'")
            .execute(pipeline.db().pool())
            .await
            .unwrap();
        sqlx::query("UPDATE model_registry SET status = 'active' WHERE id = ?")
            .bind(listed.id)
            .execute(pipeline.db().pool())
            .await
            .unwrap();

        let err = pipeline.remove_model(&listed).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Integrity);
        assert!(pipeline.artifacts().dir().join(&listed.file_path).exists());
    }
}
