//! Pipeline Driver Integration Tests
//!
//! End-to-end runs over temporary input folders: store hand-off, ordering,
//! short-circuit on failure, failure policies, cancellation and idempotence.

mod helpers;

use freqline::cli::{exit_code, EXIT_CLASSIFICATION_FAILED, EXIT_EXTRACTION_FAILED, EXIT_SUCCESS};
use freqline::models::{ClassifiedArtifact, FrequencyArtifact, PipelineState, ReclassifiedArtifact};
use freqline::workflow::{ExtractionStage, Stage};
use freqline::{FailurePolicy, PipelineDriver};
use freqline_common::events::{EventBus, PipelineEvent};
use freqline_common::{StageKind, Store};
use helpers::*;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

fn artifacts(dir: &std::path::Path) -> Vec<String> {
    Store::new(dir)
        .list_artifacts()
        .unwrap()
        .iter()
        .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
        .collect()
}

#[tokio::test]
async fn one_measurement_yields_one_artifact_per_store() {
    // Given: one group with one measurement file
    let dir = TempDir::new().unwrap();
    write_measurement_csv(dir.path(), "HL1", "Pon", &sample_rows());
    let config = test_config(dir.path());
    let stores = config.stores.clone();

    // When: the full pipeline runs
    let driver = PipelineDriver::new(config, EventBus::default());
    let run = driver.run(CancellationToken::new()).await.unwrap();

    // Then: success, and exactly one artifact in each store
    assert_eq!(run.state, PipelineState::Succeeded);
    assert_eq!(exit_code(&run), EXIT_SUCCESS);
    assert_eq!(run.completed_stages(), StageKind::ALL.to_vec());

    assert_eq!(artifacts(&stores.extraction_path), vec!["exp_20240115_HL1_Pon_magnitude.json"]);
    assert_eq!(artifacts(&stores.classification_path), vec!["exp_20240115_HL1_Pon_freq50.json"]);
    assert_eq!(
        artifacts(&stores.reclassification_path),
        vec!["exp_20240115_HL1_Pon_reclass50.json"]
    );

    let extracted: FrequencyArtifact =
        Store::read_artifact(&stores.extraction_path.join("exp_20240115_HL1_Pon_magnitude.json")).unwrap();
    assert_eq!(extracted.points.len(), 440);
    assert_eq!(extracted.frequency_column, "Frequency (Hz)");
    assert_eq!(extracted.source.path, "HL1/Pon.csv");
    // 50 Hz target: rows at 48 and 55, 48 is closer
    assert_eq!(extracted.points[0].frequency, 48.0);

    let classified: ClassifiedArtifact =
        Store::read_artifact(&stores.classification_path.join("exp_20240115_HL1_Pon_freq50.json")).unwrap();
    assert_eq!(classified.detailed.len(), 440);
    let total: usize = classified.grouped.iter().map(|g| g.count).sum();
    assert_eq!(total, 440);
    assert!(classified
        .grouped
        .windows(2)
        .all(|w| w[0].classified_frequency < w[1].classified_frequency));

    let reclassified: ReclassifiedArtifact =
        Store::read_artifact(&stores.reclassification_path.join("exp_20240115_HL1_Pon_reclass50.json"))
            .unwrap();
    assert_eq!(reclassified.revised_count, 0);
    assert_eq!(reclassified.grouped, classified.grouped);
}

#[tokio::test]
async fn groups_and_files_are_processed_in_sorted_order() {
    let dir = TempDir::new().unwrap();
    let rows = sample_rows();
    write_measurement_csv(dir.path(), "HL2", "b", &rows);
    write_measurement_csv(dir.path(), "HL1", "z", &rows);
    write_measurement_csv(dir.path(), "HL1", "a", &rows);
    write_measurement_csv(dir.path(), "notes", "ignored", &rows);

    let driver = PipelineDriver::new(test_config(dir.path()), EventBus::default());
    let mut rx = driver.event_bus().subscribe();
    let run = driver.run_stage(StageKind::Extraction, CancellationToken::new()).await.unwrap();
    assert!(run.succeeded());

    let written: Vec<String> = drain_events(&mut rx)
        .into_iter()
        .filter_map(|e| match e {
            PipelineEvent::ArtifactWritten { artifact, .. } => Some(artifact),
            _ => None,
        })
        .collect();
    assert_eq!(
        written,
        vec![
            "exp_20240115_HL1_a_magnitude.json",
            "exp_20240115_HL1_z_magnitude.json",
            "exp_20240115_HL2_b_magnitude.json",
        ]
    );
    assert_eq!(run.stage_reports[0].inputs, 3);
}

#[tokio::test]
async fn identical_input_produces_identical_stores() {
    // Given: two input folders with the same measurements
    let first = TempDir::new().unwrap();
    let second = TempDir::new().unwrap();
    for dir in [&first, &second] {
        write_measurement_csv(dir.path(), "HL1", "Pon", &sample_rows());
        write_measurement_csv(dir.path(), "HL2", "Poff", &sample_rows()[..500]);
    }

    // When: both run with the same experiment and date
    let mut snapshots = Vec::new();
    for dir in [&first, &second] {
        let config = test_config(dir.path());
        let stores = config.stores.clone();
        let run = PipelineDriver::new(config, EventBus::default())
            .run(CancellationToken::new())
            .await
            .unwrap();
        assert!(run.succeeded());
        snapshots.push(
            StageKind::ALL
                .iter()
                .map(|&stage| read_store(stores.for_stage(stage)))
                .collect::<Vec<_>>(),
        );
    }

    // Then: every store is byte-identical
    assert_eq!(snapshots[0], snapshots[1]);
    assert_eq!(snapshots[0][0].len(), 2);

    // And: re-running over existing stores changes nothing
    let config = test_config(first.path());
    let stores = config.stores.clone();
    PipelineDriver::new(config, EventBus::default())
        .run(CancellationToken::new())
        .await
        .unwrap();
    let rerun: Vec<_> = StageKind::ALL
        .iter()
        .map(|&stage| read_store(stores.for_stage(stage)))
        .collect();
    assert_eq!(rerun, snapshots[0]);
}

#[tokio::test]
async fn classification_failure_stops_before_reclassification() {
    // Given: a real extraction stage, a failing classification stage
    let dir = TempDir::new().unwrap();
    write_measurement_csv(dir.path(), "HL1", "Pon", &sample_rows());
    let config = test_config(dir.path());
    let stores = config.stores.clone();

    let (classify, classify_calls) = FailingStage::new(StageKind::Classification);
    let (reclassify, reclassify_calls) = CountingStage::new(StageKind::Reclassification);
    let stages: Vec<Arc<dyn Stage>> = vec![
        Arc::new(ExtractionStage::new()),
        Arc::new(classify),
        Arc::new(reclassify),
    ];

    // When: the pipeline runs
    let run = PipelineDriver::with_stages(config, EventBus::default(), stages)
        .run(CancellationToken::new())
        .await
        .unwrap();

    // Then: run failed at classification, reclassification never executed
    assert_eq!(run.state, PipelineState::Failed);
    assert_eq!(run.failed_stage(), Some(StageKind::Classification));
    assert_eq!(exit_code(&run), EXIT_CLASSIFICATION_FAILED);
    assert_eq!(classify_calls.load(Ordering::SeqCst), 1);
    assert_eq!(reclassify_calls.load(Ordering::SeqCst), 0);

    // And: extraction output intact, reclassification store empty
    assert_eq!(artifacts(&stores.extraction_path).len(), 1);
    assert!(read_store(&stores.reclassification_path).is_empty());
}

#[tokio::test]
async fn extraction_failure_short_circuits_everything() {
    let dir = TempDir::new().unwrap();
    let (extract, _) = FailingStage::new(StageKind::Extraction);
    let (classify, classify_calls) = CountingStage::new(StageKind::Classification);
    let (reclassify, reclassify_calls) = CountingStage::new(StageKind::Reclassification);

    let driver = PipelineDriver::with_stages(
        test_config(dir.path()),
        EventBus::default(),
        vec![Arc::new(extract), Arc::new(classify), Arc::new(reclassify)],
    );
    let mut rx = driver.event_bus().subscribe();
    let run = driver.run(CancellationToken::new()).await.unwrap();

    assert_eq!(run.failed_stage(), Some(StageKind::Extraction));
    assert_eq!(exit_code(&run), EXIT_EXTRACTION_FAILED);
    assert_eq!(classify_calls.load(Ordering::SeqCst), 0);
    assert_eq!(reclassify_calls.load(Ordering::SeqCst), 0);
    assert!(run.stage_reports.is_empty());

    let events = drain_events(&mut rx);
    assert!(events.iter().all(|e| e.stage() != Some(StageKind::Classification)));
    assert!(matches!(events.last(), Some(PipelineEvent::RunFinished { succeeded: false, .. })));
}

#[tokio::test]
async fn corrupt_upstream_artifact_fails_classification_without_output() {
    // Given: an extraction store holding an unparseable artifact
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path());
    let stores = config.stores.clone();
    std::fs::create_dir_all(&stores.extraction_path).unwrap();
    std::fs::write(stores.extraction_path.join("exp_20240115_HL1_Pon_magnitude.json"), "{ not json").unwrap();

    // When: only classification runs
    let run = PipelineDriver::new(config, EventBus::default())
        .run_stage(StageKind::Classification, CancellationToken::new())
        .await
        .unwrap();

    // Then: the stage failed and left nothing behind, not even staging dirs
    assert_eq!(run.failed_stage(), Some(StageKind::Classification));
    assert!(read_store(&stores.classification_path).is_empty());
    assert!(!stores.reclassification_path.exists());
}

#[tokio::test]
async fn single_stage_requires_upstream_store() {
    let dir = TempDir::new().unwrap();
    let run = PipelineDriver::new(test_config(dir.path()), EventBus::default())
        .run_stage(StageKind::Reclassification, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(run.failed_stage(), Some(StageKind::Reclassification));
    assert!(run.failure.unwrap().message.contains("Not found"));
}

#[tokio::test]
async fn events_show_each_store_complete_before_next_stage_starts() {
    let dir = TempDir::new().unwrap();
    write_measurement_csv(dir.path(), "HL1", "Pon", &sample_rows());
    write_measurement_csv(dir.path(), "HL1", "Poff", &sample_rows());

    let driver = PipelineDriver::new(test_config(dir.path()), EventBus::default());
    let mut rx = driver.event_bus().subscribe();
    let run = driver.run(CancellationToken::new()).await.unwrap();
    assert!(run.succeeded());

    let events = drain_events(&mut rx);
    assert!(matches!(events.first(), Some(PipelineEvent::RunStarted { .. })));
    assert!(matches!(events.last(), Some(PipelineEvent::RunFinished { succeeded: true, .. })));

    // Stage of every stage-scoped event never goes backwards
    let stages: Vec<StageKind> = events.iter().filter_map(|e| e.stage()).collect();
    assert!(stages.windows(2).all(|w| w[0] <= w[1]));

    // Each stage: started, two artifacts, completed
    for stage in StageKind::ALL {
        let kinds: Vec<&str> = events
            .iter()
            .filter(|e| e.stage() == Some(stage))
            .map(|e| e.event_type())
            .collect();
        assert_eq!(
            kinds,
            vec!["StageStarted", "ArtifactWritten", "ArtifactWritten", "StageCompleted"],
            "events for {}",
            stage
        );
    }
}

#[tokio::test]
async fn fail_fast_discards_partial_extraction() {
    // Given: one good and one unusable measurement
    let dir = TempDir::new().unwrap();
    write_measurement_csv(dir.path(), "HL1", "good", &sample_rows());
    write_text(dir.path(), "HL1", "bad.csv", "Frequency,dBSPL\n");
    let config = test_config(dir.path());
    let stores = config.stores.clone();
    assert_eq!(config.failure_policy, FailurePolicy::FailFast);

    // When
    let run = PipelineDriver::new(config, EventBus::default())
        .run(CancellationToken::new())
        .await
        .unwrap();

    // Then: extraction failed and committed nothing
    assert_eq!(run.failed_stage(), Some(StageKind::Extraction));
    assert!(run.failure.unwrap().message.contains("bad.csv"));
    assert!(read_store(&stores.extraction_path).is_empty());
    assert!(read_store(&stores.classification_path).is_empty());
}

#[tokio::test]
async fn keep_going_skips_bad_inputs() {
    let dir = TempDir::new().unwrap();
    write_measurement_csv(dir.path(), "HL1", "good", &sample_rows());
    write_text(dir.path(), "HL1", "bad.csv", "Frequency,dBSPL\n");
    let mut config = test_config(dir.path());
    config.failure_policy = FailurePolicy::KeepGoing;
    let stores = config.stores.clone();

    let driver = PipelineDriver::new(config, EventBus::default());
    let mut rx = driver.event_bus().subscribe();
    let run = driver.run(CancellationToken::new()).await.unwrap();

    assert!(run.succeeded());
    let extraction = &run.stage_reports[0];
    assert_eq!(extraction.inputs, 2);
    assert_eq!(extraction.artifacts, vec!["exp_20240115_HL1_good_magnitude.json"]);
    assert_eq!(extraction.skipped.len(), 1);
    assert_eq!(extraction.skipped[0].source, "HL1/bad.csv");

    assert_eq!(artifacts(&stores.classification_path).len(), 1);
    assert_eq!(artifacts(&stores.reclassification_path).len(), 1);

    let skipped = drain_events(&mut rx)
        .into_iter()
        .filter(|e| matches!(e, PipelineEvent::ArtifactSkipped { .. }))
        .count();
    assert_eq!(skipped, 1);
}

#[tokio::test]
async fn duplicate_artifact_names_fail_even_when_keep_going() {
    // Pon.csv and Pon.txt both map to ..._HL1_Pon_magnitude.json
    let dir = TempDir::new().unwrap();
    write_measurement_csv(dir.path(), "HL1", "Pon", &sample_rows());
    write_text(dir.path(), "HL1", "Pon.txt", "Hz\tdB\n100\t1\n200\t2\n");
    let mut config = test_config(dir.path());
    config.failure_policy = FailurePolicy::KeepGoing;
    let stores = config.stores.clone();

    let run = PipelineDriver::new(config, EventBus::default())
        .run(CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(run.failed_stage(), Some(StageKind::Extraction));
    assert!(read_store(&stores.extraction_path).is_empty());
}

#[tokio::test]
async fn cancelled_run_fails_without_output() {
    let dir = TempDir::new().unwrap();
    write_measurement_csv(dir.path(), "HL1", "Pon", &sample_rows());
    let config = test_config(dir.path());
    let stores = config.stores.clone();

    let token = CancellationToken::new();
    token.cancel();
    let run = PipelineDriver::new(config, EventBus::default()).run(token).await.unwrap();

    assert_eq!(run.state, PipelineState::Failed);
    assert_eq!(run.failed_stage(), Some(StageKind::Extraction));
    assert!(run.failure.unwrap().message.contains("Cancelled"));
    assert!(read_store(&stores.extraction_path).is_empty());
}

#[tokio::test]
async fn cancellation_mid_stage_discards_staged_output() {
    // Given: a stage that cancels the run while its second input is processed
    let dir = TempDir::new().unwrap();
    let mut config = test_config(dir.path());
    config.workers = 1;
    let stores = config.stores.clone();

    let (classify, classify_calls) = CountingStage::new(StageKind::Classification);
    let (reclassify, _) = CountingStage::new(StageKind::Reclassification);
    let driver = PipelineDriver::with_stages(
        config,
        EventBus::default(),
        vec![
            Arc::new(CancellingStage::new(StageKind::Extraction, 5, 1)),
            Arc::new(classify),
            Arc::new(reclassify),
        ],
    );
    let mut rx = driver.event_bus().subscribe();

    // When: the run starts with a live token
    let run = driver.run(CancellationToken::new()).await.unwrap();

    // Then: extraction failed as cancelled and the next stage never ran
    assert_eq!(run.failed_stage(), Some(StageKind::Extraction));
    assert!(run.failure.unwrap().message.contains("Cancelled"));
    assert_eq!(classify_calls.load(Ordering::SeqCst), 0);

    // And: the first artifact was staged, yet nothing reached the store
    let staged = drain_events(&mut rx)
        .into_iter()
        .filter(|e| matches!(e, PipelineEvent::ArtifactWritten { .. }))
        .count();
    assert!(staged >= 1);
    assert!(read_store(&stores.extraction_path).is_empty());
}

#[tokio::test]
async fn rerun_with_new_base_reads_only_this_runs_artifacts() {
    // Given: stores from a completed run at base 50
    let dir = TempDir::new().unwrap();
    write_measurement_csv(dir.path(), "HL1", "Pon", &sample_rows());
    let mut config = test_config(dir.path());
    let stores = config.stores.clone();
    let first = PipelineDriver::new(config.clone(), EventBus::default())
        .run(CancellationToken::new())
        .await
        .unwrap();
    assert!(first.succeeded());

    // When: the same stores are reused at base 100 without cleaning
    config.classification_base = 100;
    let second = PipelineDriver::new(config, EventBus::default())
        .run(CancellationToken::new())
        .await
        .unwrap();

    // Then: reclassification consumed only the base-100 artifact
    assert!(second.succeeded(), "{:?}", second.failure);
    assert_eq!(
        artifacts(&stores.classification_path),
        vec!["exp_20240115_HL1_Pon_freq100.json", "exp_20240115_HL1_Pon_freq50.json"]
    );
    assert_eq!(second.stage_reports[2].inputs, 1);
    let reclassified: ReclassifiedArtifact =
        Store::read_artifact(&stores.reclassification_path.join("exp_20240115_HL1_Pon_reclass50.json"))
            .unwrap();
    assert_eq!(reclassified.previous_base, 100);
}

#[tokio::test]
async fn single_stage_reads_whole_upstream_store() {
    let dir = TempDir::new().unwrap();
    write_measurement_csv(dir.path(), "HL1", "Pon", &sample_rows());
    write_measurement_csv(dir.path(), "HL2", "Poff", &sample_rows());
    let config = test_config(dir.path());
    let stores = config.stores.clone();
    let driver = PipelineDriver::new(config, EventBus::default());

    assert!(driver.run_stage(StageKind::Extraction, CancellationToken::new()).await.unwrap().succeeded());
    let run = driver
        .run_stage(StageKind::Classification, CancellationToken::new())
        .await
        .unwrap();

    assert!(run.succeeded());
    assert_eq!(run.stage_reports[0].inputs, 2);
    assert_eq!(artifacts(&stores.classification_path).len(), 2);
}

#[tokio::test]
async fn unclassifiable_frequency_fails_classification() {
    // Given: a finite frequency whose class does not fit in an integer
    let dir = TempDir::new().unwrap();
    write_text(dir.path(), "HL1", "Pon.csv", "Frequency,dBSPL\n1e300,60\n");
    let config = test_config(dir.path());
    let stores = config.stores.clone();

    // When
    let run = PipelineDriver::new(config, EventBus::default())
        .run(CancellationToken::new())
        .await
        .unwrap();

    // Then: a stage failure, not a worker panic
    assert_eq!(run.failed_stage(), Some(StageKind::Classification));
    let message = run.failure.unwrap().message;
    assert!(message.contains("no representable class"), "{}", message);
    assert_eq!(artifacts(&stores.extraction_path).len(), 1);
    assert!(read_store(&stores.classification_path).is_empty());
}

#[tokio::test]
async fn workbooks_are_exported_but_not_handed_downstream() {
    let dir = TempDir::new().unwrap();
    write_measurement_csv(dir.path(), "HL1", "Pon", &sample_rows());
    let mut config = test_config(dir.path());
    config.export_workbooks = true;
    let stores = config.stores.clone();

    let run = PipelineDriver::new(config, EventBus::default())
        .run(CancellationToken::new())
        .await
        .unwrap();

    assert!(run.succeeded(), "{:?}", run.failure);
    assert!(stores.classification_path.join("exp_20240115_HL1_Pon_freq50.xlsx").is_file());
    assert!(stores.reclassification_path.join("exp_20240115_HL1_Pon_reclass50.xlsx").is_file());
    assert_eq!(run.stage_reports[1].artifacts, vec!["exp_20240115_HL1_Pon_freq50.json"]);
    assert_eq!(run.stage_reports[2].inputs, 1);
    assert!(read_store(&stores.extraction_path)
        .keys()
        .all(|name| name.ends_with(".json")));
}

#[tokio::test]
async fn empty_input_root_succeeds_with_no_artifacts() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path());
    let stores = config.stores.clone();

    let run = PipelineDriver::new(config, EventBus::default())
        .run(CancellationToken::new())
        .await
        .unwrap();

    assert!(run.succeeded());
    assert!(run.stage_reports.iter().all(|r| r.artifacts.is_empty()));
    for stage in StageKind::ALL {
        assert!(stores.for_stage(stage).is_dir());
    }
}

#[tokio::test]
async fn clean_stores_removes_previous_artifacts() {
    let dir = TempDir::new().unwrap();
    write_measurement_csv(dir.path(), "HL1", "Pon", &sample_rows());
    let mut config = test_config(dir.path());
    let stores = config.stores.clone();

    std::fs::create_dir_all(&stores.reclassification_path).unwrap();
    let stale = stores.reclassification_path.join("old_20200101_HL9_x_reclass50.json");
    std::fs::write(&stale, "{}").unwrap();

    // Without clean the stale artifact survives alongside new output
    PipelineDriver::new(config.clone(), EventBus::default())
        .run(CancellationToken::new())
        .await
        .unwrap();
    assert!(stale.exists());

    config.clean_stores = true;
    let run = PipelineDriver::new(config, EventBus::default())
        .run(CancellationToken::new())
        .await
        .unwrap();
    assert!(run.succeeded());
    assert!(!stale.exists());
    assert_eq!(artifacts(&stores.reclassification_path).len(), 1);
}
