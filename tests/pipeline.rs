mod mocks;

use serde_json::json;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use mocks::{FailingStrategy, StubCaptions};
use transcript_harvester::acquire::{AcquisitionStrategy, CaptionsStrategy};
use transcript_harvester::progress::ProgressRecord;
use transcript_harvester::{
    normalize, DocumentWriter, HarvestPipeline, ProgressStore, RateLimiter, RetryPolicy, RunStatus, StrategyChain,
};

fn fast_retry() -> RetryPolicy {
    RetryPolicy::new(3, Duration::from_millis(1))
}

fn build(dir: &Path, strategies: Vec<Box<dyn AcquisitionStrategy>>) -> HarvestPipeline {
    let chain = StrategyChain::new(strategies, Arc::new(RateLimiter::new(Duration::ZERO)));
    HarvestPipeline::new(
        chain,
        ProgressStore::open(dir.join("progress.json"), dir),
        DocumentWriter::new(dir),
    )
}

fn captions_pipeline(dir: &Path, stub: &StubCaptions) -> HarvestPipeline {
    let strategy = CaptionsStrategy::new(Arc::new(stub.clone()), vec!["ja".into(), "en".into()], fast_retry());
    build(dir, vec![Box::new(strategy)])
}

fn progress_ids(dir: &Path) -> Vec<String> {
    let raw = fs_err::read_to_string(dir.join("progress.json")).unwrap();
    let record: ProgressRecord = serde_json::from_str(&raw).unwrap();
    record.processed_videos
}

#[tokio::test]
async fn test_end_to_end_captions() {
    let dir = tempfile::tempdir().unwrap();
    let stub = StubCaptions::new("hello world");
    let mut pipeline = captions_pipeline(dir.path(), &stub);

    let references = normalize(json!({"videos": [{"id": "abc12345678", "title": "T"}]}));
    let summary = pipeline.run(&references).await;

    assert_eq!(summary.status(), RunStatus::Processed { count: 1 });

    let document = fs_err::read_to_string(dir.path().join("abc12345678.md")).unwrap();
    assert!(document.starts_with("# T\n"));
    assert!(document.contains("hello world"));
    assert!(dir.path().join("abc12345678_full.json").exists());

    assert_eq!(progress_ids(dir.path()), vec!["abc12345678"]);
}

#[tokio::test]
async fn test_all_strategies_failing() {
    let dir = tempfile::tempdir().unwrap();
    let captions = FailingStrategy::new("captions", 10);
    let audio = FailingStrategy::new("audio", 30);
    let mut pipeline = build(dir.path(), vec![Box::new(captions.clone()), Box::new(audio.clone())]);

    let summary = pipeline.run(&normalize(json!(["https://youtu.be/zzzzzzzzzzz"]))).await;

    assert_eq!(summary.status(), RunStatus::NoEligibleItems);
    assert_eq!(summary.processed, 0);
    assert_eq!(summary.failed, 1);
    assert_eq!(*captions.attempts.lock().unwrap(), 1);
    assert_eq!(*audio.attempts.lock().unwrap(), 1);

    let markdown: Vec<_> = fs_err::read_dir(dir.path())
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.path().extension().is_some_and(|ext| ext == "md"))
        .collect();
    assert!(markdown.is_empty());
    assert!(progress_ids(dir.path()).is_empty());
}

#[tokio::test]
async fn test_second_run_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let input = json!({"episodes": [
        {"url": "https://www.youtube.com/watch?v=abc12345678", "title": "First"},
        {"videoId": "zzzzzzzzzzz", "title": "Second"}
    ]});

    let stub = StubCaptions::new("hello world");
    let first = captions_pipeline(dir.path(), &stub)
        .with_limit(10)
        .run(&normalize(input.clone()))
        .await;
    assert_eq!(first.status(), RunStatus::Processed { count: 2 });

    let second_stub = StubCaptions::new("changed");
    let second = captions_pipeline(dir.path(), &second_stub)
        .with_limit(10)
        .run(&normalize(input))
        .await;

    assert_eq!(second.status(), RunStatus::NoEligibleItems);
    assert_eq!(second.already_done, 2);
    assert!(second_stub.calls.lock().unwrap().is_empty());
    let document = fs_err::read_to_string(dir.path().join("zzzzzzzzzzz.md")).unwrap();
    assert!(document.contains("hello world"));
}

#[tokio::test]
async fn test_lost_progress_file_is_rebuilt_from_output() {
    let dir = tempfile::tempdir().unwrap();
    let input = json!([{"id": "abc12345678"}]);

    let stub = StubCaptions::new("hello world");
    captions_pipeline(dir.path(), &stub).run(&normalize(input.clone())).await;
    fs_err::remove_file(dir.path().join("progress.json")).unwrap();

    let second_stub = StubCaptions::new("again");
    let summary = captions_pipeline(dir.path(), &second_stub).run(&normalize(input)).await;

    assert_eq!(summary.status(), RunStatus::NoEligibleItems);
    assert!(second_stub.calls.lock().unwrap().is_empty());
    assert_eq!(progress_ids(dir.path()), vec!["abc12345678"]);
}

#[tokio::test]
async fn test_default_limit_stops_after_first_success() {
    let dir = tempfile::tempdir().unwrap();
    let stub = StubCaptions::new("hello world");
    let summary = captions_pipeline(dir.path(), &stub)
        .run(&normalize(json!({"livestreams": [
            {"id": "aaaaaaaaaaa"},
            {"id": "bbbbbbbbbbb"}
        ]})))
        .await;

    assert_eq!(summary.status(), RunStatus::Processed { count: 1 });
    assert_eq!(*stub.calls.lock().unwrap(), vec!["aaaaaaaaaaa"]);
}
