//! Run log store tests

use std::sync::Arc;

use chrono::{Days, NaiveDate};
use tokio_test::assert_ok;

use deploy_agent::errors::AgentError;
use deploy_agent::filesys::dir::Dir;
use deploy_agent::models::run::{
    RunRecord, RunStatus, StepResult, StepStatus, MAX_OUTPUT_CHARS, MAX_STDERR_CHARS,
};
use deploy_agent::storage::run_log::{partition_name, LogQuery, LogStore};

fn step(order: u32, status: StepStatus) -> StepResult {
    StepResult {
        order,
        name: format!("step {}", order),
        command: format!("./deploy.sh --phase {}", order),
        status,
        duration_ms: 100 * order as u64,
        output: "line one\nline \"two\"\n".to_string(),
        stderr: String::new(),
        error: match status {
            StepStatus::Error => Some("Command failed with exit code 1".to_string()),
            StepStatus::Success => None,
        },
    }
}

fn record(deploy_id: &str, steps: Vec<StepResult>) -> RunRecord {
    let mut record = RunRecord::begin(deploy_id, "web", "prod", "/srv/web");
    record.status = RunStatus::Success;
    record.steps = steps;
    record
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn store() -> (tempfile::TempDir, LogStore) {
    let tmp = tempfile::tempdir().unwrap();
    let store = LogStore::new(Dir::new(tmp.path().join("logs")));
    (tmp, store)
}

#[tokio::test]
async fn test_append_then_find_round_trip() {
    let (_tmp, store) = store();
    let steps = vec![step(1, StepStatus::Success), step(2, StepStatus::Error)];

    assert_ok!(store.append(&record("web-prod-100", steps.clone())).await);

    let entry = store.find_by_id("web-prod-100").await.unwrap().unwrap();
    assert_eq!(entry.deploy_id, "web-prod-100");
    assert_eq!(entry.steps.len(), 2);
    for (read, written) in entry.steps.iter().zip(&steps) {
        assert_eq!(read.order, written.order);
        assert_eq!(read.name, written.name);
        assert_eq!(read.command, written.command);
        assert_eq!(read.status, written.status);
        assert_eq!(read.duration_ms, written.duration_ms);
    }
    assert_eq!(entry.steps[1].error.as_deref(), Some("Command failed with exit code 1"));
}

#[tokio::test]
async fn test_partition_line_format() {
    let (_tmp, store) = store();
    let day = date(2024, 1, 1);

    store
        .append_on(day, &record("web-prod-1", vec![step(1, StepStatus::Success)]))
        .await
        .unwrap();

    let contents = std::fs::read_to_string(store.dir().path().join("20240101")).unwrap();
    assert_eq!(contents.lines().count(), 1);
    assert!(contents.starts_with("web-prod-1: [{"));
    assert!(contents.contains("\"durationMs\":100"));
    assert!(contents.ends_with("}]\n"));
}

#[tokio::test]
async fn test_find_by_id_searches_previous_seven_days() {
    let (_tmp, store) = store();
    let today = date(2024, 3, 10);

    let yesterday = today.checked_sub_days(Days::new(1)).unwrap();
    let week_ago = today.checked_sub_days(Days::new(7)).unwrap();
    let eight_days_ago = today.checked_sub_days(Days::new(8)).unwrap();

    for (day, id) in [
        (yesterday, "web-prod-yesterday"),
        (week_ago, "web-prod-week"),
        (eight_days_ago, "web-prod-stale"),
    ] {
        store
            .append_on(day, &record(id, vec![step(1, StepStatus::Success)]))
            .await
            .unwrap();
    }

    assert!(store
        .find_by_id_from(today, "web-prod-yesterday")
        .await
        .unwrap()
        .is_some());
    assert!(store
        .find_by_id_from(today, "web-prod-week")
        .await
        .unwrap()
        .is_some());
    assert!(store
        .find_by_id_from(today, "web-prod-stale")
        .await
        .unwrap()
        .is_none());
    assert!(store
        .find_by_id_from(today, "web-prod-missing")
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_find_by_id_skips_unreadable_partition() {
    let (_tmp, store) = store();
    let today = date(2024, 3, 10);
    let yesterday = today.checked_sub_days(Days::new(1)).unwrap();
    let two_days_ago = today.checked_sub_days(Days::new(2)).unwrap();

    store
        .append_on(two_days_ago, &record("web-prod-old", vec![step(1, StepStatus::Success)]))
        .await
        .unwrap();
    // A directory where yesterday's partition file should be cannot be read
    std::fs::create_dir_all(store.dir().path().join(partition_name(yesterday))).unwrap();

    let entry = store.find_by_id_from(today, "web-prod-old").await.unwrap();
    assert_eq!(entry.unwrap().deploy_id, "web-prod-old");
}

#[tokio::test]
async fn test_find_by_id_prefers_newest_partition() {
    let (_tmp, store) = store();
    let today = date(2024, 3, 10);
    let yesterday = today.checked_sub_days(Days::new(1)).unwrap();

    store
        .append_on(yesterday, &record("web-prod-1", vec![step(1, StepStatus::Error)]))
        .await
        .unwrap();
    store
        .append_on(today, &record("web-prod-1", vec![step(1, StepStatus::Success)]))
        .await
        .unwrap();

    let entry = store.find_by_id_from(today, "web-prod-1").await.unwrap().unwrap();
    assert_eq!(entry.steps[0].status, StepStatus::Success);
}

#[tokio::test]
async fn test_query_limit_reports_total() {
    let (_tmp, store) = store();
    let day = date(2024, 1, 1);
    for id in ["web-prod-1", "web-prod-2", "web-prod-3"] {
        store
            .append_on(day, &record(id, vec![step(1, StepStatus::Success)]))
            .await
            .unwrap();
    }

    let result = store
        .query(&LogQuery {
            limit: 1,
            date: Some("20240101".to_string()),
            ..Default::default()
        })
        .await
        .unwrap();

    assert_eq!(result.records.len(), 1);
    assert_eq!(result.total, 3);
    // Most recently appended first
    assert_eq!(result.records[0].deploy_id, "web-prod-3");
}

#[tokio::test]
async fn test_query_filters_by_app_and_env() {
    let (_tmp, store) = store();
    let day = date(2024, 1, 1);
    for id in ["web-prod-1", "web-staging-2", "api-prod-3", "web-prod-4"] {
        store
            .append_on(day, &record(id, vec![step(1, StepStatus::Success)]))
            .await
            .unwrap();
    }

    let query = |app: Option<&str>, env: Option<&str>| LogQuery {
        limit: 10,
        app: app.map(str::to_string),
        env: env.map(str::to_string),
        date: Some("20240101".to_string()),
    };

    let result = store.query(&query(Some("web"), Some("prod"))).await.unwrap();
    assert_eq!(result.total, 2);
    let ids: Vec<_> = result.records.iter().map(|r| r.deploy_id.as_str()).collect();
    assert_eq!(ids, vec!["web-prod-4", "web-prod-1"]);

    let result = store.query(&query(None, Some("prod"))).await.unwrap();
    assert_eq!(result.total, 3);

    let result = store.query(&query(Some("worker"), None)).await.unwrap();
    assert_eq!(result.total, 0);
    assert!(result.records.is_empty());
}

#[tokio::test]
async fn test_query_missing_partition_is_empty() {
    let (_tmp, store) = store();

    let result = store
        .query(&LogQuery {
            limit: 10,
            date: Some("19990101".to_string()),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(result.total, 0);

    let result = store
        .query(&LogQuery {
            limit: 10,
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(result.total, 0);
}

#[tokio::test]
async fn test_query_rejects_malformed_date() {
    let (_tmp, store) = store();

    let result = store
        .query(&LogQuery {
            limit: 10,
            date: Some("../secrets".to_string()),
            ..Default::default()
        })
        .await;
    assert!(matches!(result, Err(AgentError::ValidationError(_))));
}

#[tokio::test]
async fn test_torn_line_does_not_swallow_next_append() {
    let (_tmp, store) = store();
    let day = date(2024, 1, 1);
    store
        .append_on(day, &record("web-prod-1", vec![step(1, StepStatus::Success)]))
        .await
        .unwrap();

    // Garbage in the middle and a torn trailing write
    let path = store.dir().path().join(partition_name(day));
    let mut contents = std::fs::read_to_string(&path).unwrap();
    contents.push_str("this is not a record\n");
    contents.push_str("web-prod-2: [{\"order\":1,\"name\":\"bu");
    std::fs::write(&path, contents).unwrap();
    store
        .append_on(day, &record("web-prod-3", vec![step(1, StepStatus::Success)]))
        .await
        .unwrap();

    let result = store
        .query(&LogQuery {
            limit: 10,
            date: Some("20240101".to_string()),
            ..Default::default()
        })
        .await
        .unwrap();

    // The torn record is lost; the records around it survive
    let ids: Vec<_> = result.records.iter().map(|r| r.deploy_id.as_str()).collect();
    assert_eq!(ids, vec!["web-prod-3", "web-prod-1"]);
    assert_eq!(result.total, 2);
}

#[tokio::test]
async fn test_concurrent_appends_do_not_interleave() {
    let (_tmp, store) = store();
    let store = Arc::new(store);
    let day = date(2024, 1, 1);

    let tasks: Vec<_> = (0..50)
        .map(|i| {
            let store = store.clone();
            tokio::spawn(async move {
                let mut big = step(1, StepStatus::Success);
                big.output = "o".repeat(MAX_OUTPUT_CHARS);
                big.stderr = "e".repeat(MAX_STDERR_CHARS);
                store
                    .append_on(day, &record(&format!("web-prod-{}", i), vec![big]))
                    .await
            })
        })
        .collect();
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    let result = store
        .query(&LogQuery {
            limit: 100,
            date: Some("20240101".to_string()),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(result.total, 50);
}

#[tokio::test]
async fn test_partitions_listed_newest_first() {
    let (_tmp, store) = store();
    assert!(store.partitions().await.unwrap().is_empty());

    for day in [date(2024, 1, 2), date(2024, 1, 10), date(2023, 12, 31)] {
        store
            .append_on(day, &record("web-prod-1", vec![step(1, StepStatus::Success)]))
            .await
            .unwrap();
    }
    std::fs::write(store.dir().path().join("notes.txt"), "ignored").unwrap();

    assert_eq!(
        store.partitions().await.unwrap(),
        vec!["20240110", "20240102", "20231231"]
    );
}
