use motorstats_store::{DataStore, Error, RunStore, SqliteStore};
use motorstats_workflow::{
  Entity, Period, Post, RunId, RunStatus, StatRow, StepName, StepRecord, StepStatus, WorkflowKind,
  WorkflowRun,
};
use sqlx::sqlite::SqlitePoolOptions;

async fn store() -> SqliteStore {
  let pool = SqlitePoolOptions::new()
    .max_connections(1)
    .connect("sqlite::memory:")
    .await
    .unwrap();
  let store = SqliteStore::new(pool);
  store.migrate().await.unwrap();
  store
}

fn period(s: &str) -> Period {
  s.parse().unwrap()
}

#[tokio::test]
async fn test_run_round_trip_and_transitions() {
  let store = store().await;
  let run = WorkflowRun::new(
    WorkflowKind::DataRefresh(Entity::Coe),
    serde_json::json!({ "month": "2024-05" }),
  );
  store.create_run(&run).await.unwrap();

  let loaded = store.get_run(&run.id).await.unwrap();
  assert_eq!(loaded.kind, WorkflowKind::DataRefresh(Entity::Coe));
  assert_eq!(loaded.payload, run.payload);
  assert_eq!(loaded.status, RunStatus::Pending);

  assert!(store.transition_run(&run.id, RunStatus::Running, None).await.unwrap());
  assert!(store.transition_run(&run.id, RunStatus::Completed, None).await.unwrap());
  assert!(!store.transition_run(&run.id, RunStatus::Failed, Some("late")).await.unwrap());

  let loaded = store.get_run(&run.id).await.unwrap();
  assert_eq!(loaded.status, RunStatus::Completed);
  assert!(loaded.error.is_none());
  assert!(loaded.completed_at.is_some());

  let missing = store.get_run(&RunId::new()).await;
  assert!(matches!(missing, Err(Error::NotFound(_))));
}

#[tokio::test]
async fn test_list_runs_newest_first() {
  let store = store().await;
  let first = WorkflowRun::new(WorkflowKind::ContentPublish, serde_json::json!({}));
  let mut second = WorkflowRun::new(WorkflowKind::CacheRegenerate, serde_json::json!({}));
  second.created_at = first.created_at + chrono::Duration::seconds(1);
  store.create_run(&first).await.unwrap();
  store.create_run(&second).await.unwrap();

  let runs = store.list_runs(10).await.unwrap();
  assert_eq!(runs.len(), 2);
  assert_eq!(runs[0].id, second.id);

  assert_eq!(store.list_runs(1).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_step_record_upsert() {
  let store = store().await;
  let run = WorkflowRun::new(
    WorkflowKind::CacheRegenerate,
    serde_json::json!({ "data_type": "cars" }),
  );
  store.create_run(&run).await.unwrap();

  let mut record = StepRecord::new(&run, StepName::ResolvePeriod);
  record.status = StepStatus::InProgress;
  store.put_step(&record).await.unwrap();

  record.status = StepStatus::Succeeded;
  record.attempt_count = 2;
  record.result = Some(serde_json::json!({ "period": "2024-05" }));
  store.put_step(&record).await.unwrap();

  let loaded = store
    .get_step(&run.id, StepName::ResolvePeriod)
    .await
    .unwrap()
    .unwrap();
  assert_eq!(loaded.idempotency_key, record.idempotency_key);
  assert_eq!(loaded.status, StepStatus::Succeeded);
  assert_eq!(loaded.attempt_count, 2);
  assert_eq!(loaded.result, record.result);

  let steps = store.list_steps(&run.id).await.unwrap();
  assert_eq!(steps.len(), 1);
  assert!(
    store
      .get_step(&run.id, StepName::InvalidateDataCache)
      .await
      .unwrap()
      .is_none()
  );
}

#[tokio::test]
async fn test_stat_rows() {
  let store = store().await;
  let row = |period_str: &str, category: &str, value: i64| StatRow {
    entity: Entity::Deregistrations,
    period: period(period_str),
    category: category.to_string(),
    value,
  };

  let written = store
    .upsert_rows(&[row("2024-04", "cat-a", 1), row("2024-05", "cat-b", 2), row("2024-05", "cat-a", 3)])
    .await
    .unwrap();
  assert_eq!(written, 3);
  store.upsert_rows(&[row("2024-05", "cat-a", 30)]).await.unwrap();

  let may = store
    .rows_for_period(Entity::Deregistrations, &period("2024-05"))
    .await
    .unwrap();
  assert_eq!(may, vec![row("2024-05", "cat-a", 30), row("2024-05", "cat-b", 2)]);

  assert_eq!(
    store.max_period(Entity::Deregistrations).await.unwrap(),
    Some(period("2024-05"))
  );
  assert_eq!(store.max_period(Entity::Cars).await.unwrap(), None);
}

#[tokio::test]
async fn test_post_unique_per_month_and_type() {
  let store = store().await;
  let month = period("2024-06");
  let first = Post::new(Entity::Cars, month, "Car Registrations June 2024".into(), "first".into());
  let rival = Post::new(Entity::Cars, month, "Another take".into(), "second".into());
  let other_type = Post::new(Entity::Coe, month, "COE Results June 2024".into(), "coe".into());

  let inserted = store.insert_post(&first).await.unwrap();
  assert!(inserted.created());

  let conflict = store.insert_post(&rival).await.unwrap();
  assert!(!conflict.created());
  assert_eq!(conflict.post().id, first.id);
  assert_eq!(conflict.post().content, "first");

  assert!(store.insert_post(&other_type).await.unwrap().created());

  let found = store.find_post(&month, Entity::Cars).await.unwrap().unwrap();
  assert_eq!(found.slug, "car-registrations-june-2024");
  assert!(
    store
      .find_post(&period("2024-07"), Entity::Cars)
      .await
      .unwrap()
      .is_none()
  );
}
