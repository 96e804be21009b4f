use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::Utc;
use motorstats_workflow::{
  Entity, Period, Post, RunId, RunStatus, StatRow, StepName, StepRecord, WorkflowRun,
};
use parking_lot::RwLock;

use crate::{DataStore, Error, PostInsert, RunStore};

/// In-memory run storage for tests and single-process use.
#[derive(Debug, Default)]
pub struct InMemoryRunStore {
  runs: RwLock<HashMap<RunId, WorkflowRun>>,
  steps: RwLock<HashMap<(RunId, StepName), StepRecord>>,
}

impl InMemoryRunStore {
  pub fn new() -> Self {
    Self::default()
  }
}

#[async_trait]
impl RunStore for InMemoryRunStore {
  async fn create_run(&self, run: &WorkflowRun) -> Result<(), Error> {
    self.runs.write().insert(run.id, run.clone());
    Ok(())
  }

  async fn get_run(&self, run_id: &RunId) -> Result<WorkflowRun, Error> {
    self
      .runs
      .read()
      .get(run_id)
      .cloned()
      .ok_or_else(|| Error::NotFound(format!("run {}", run_id)))
  }

  async fn transition_run(
    &self,
    run_id: &RunId,
    status: RunStatus,
    error: Option<&str>,
  ) -> Result<bool, Error> {
    let mut runs = self.runs.write();
    let Some(run) = runs.get_mut(run_id) else {
      return Ok(false);
    };
    if run.status.is_terminal() {
      return Ok(false);
    }

    run.status = status;
    run.error = error.map(str::to_string);
    if status.is_terminal() {
      run.completed_at = Some(Utc::now());
    }
    Ok(true)
  }

  async fn list_runs(&self, limit: usize) -> Result<Vec<WorkflowRun>, Error> {
    let mut runs: Vec<WorkflowRun> = self.runs.read().values().cloned().collect();
    runs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    runs.truncate(limit);
    Ok(runs)
  }

  async fn get_step(&self, run_id: &RunId, step: StepName) -> Result<Option<StepRecord>, Error> {
    Ok(self.steps.read().get(&(*run_id, step)).cloned())
  }

  async fn put_step(&self, record: &StepRecord) -> Result<(), Error> {
    self
      .steps
      .write()
      .insert((record.run_id, record.step), record.clone());
    Ok(())
  }

  async fn list_steps(&self, run_id: &RunId) -> Result<Vec<StepRecord>, Error> {
    let mut records: Vec<StepRecord> = self
      .steps
      .read()
      .values()
      .filter(|r| r.run_id == *run_id)
      .cloned()
      .collect();
    records.sort_by(|a, b| a.updated_at.cmp(&b.updated_at));
    Ok(records)
  }
}

/// In-memory statistics and post storage.
#[derive(Debug, Default)]
pub struct InMemoryDataStore {
  rows: RwLock<BTreeMap<(Entity, Period, String), i64>>,
  posts: RwLock<HashMap<(Period, Entity), Post>>,
}

impl InMemoryDataStore {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn post_count(&self) -> usize {
    self.posts.read().len()
  }
}

#[async_trait]
impl DataStore for InMemoryDataStore {
  async fn upsert_rows(&self, rows: &[StatRow]) -> Result<usize, Error> {
    let mut stored = self.rows.write();
    for row in rows {
      stored.insert((row.entity, row.period, row.category.clone()), row.value);
    }
    Ok(rows.len())
  }

  async fn rows_for_period(&self, entity: Entity, period: &Period) -> Result<Vec<StatRow>, Error> {
    Ok(
      self
        .rows
        .read()
        .iter()
        .filter(|((e, p, _), _)| *e == entity && p == period)
        .map(|((e, p, category), value)| StatRow {
          entity: *e,
          period: *p,
          category: category.clone(),
          value: *value,
        })
        .collect(),
    )
  }

  async fn max_period(&self, entity: Entity) -> Result<Option<Period>, Error> {
    Ok(
      self
        .rows
        .read()
        .keys()
        .filter(|(e, _, _)| *e == entity)
        .map(|(_, p, _)| *p)
        .max(),
    )
  }

  async fn find_post(&self, month: &Period, data_type: Entity) -> Result<Option<Post>, Error> {
    Ok(self.posts.read().get(&(*month, data_type)).cloned())
  }

  async fn insert_post(&self, post: &Post) -> Result<PostInsert, Error> {
    let mut posts = self.posts.write();
    let key = (post.month, post.data_type);
    if let Some(existing) = posts.get(&key) {
      return Ok(PostInsert::Existing(existing.clone()));
    }
    posts.insert(key, post.clone());
    Ok(PostInsert::Created(post.clone()))
  }
}

#[cfg(test)]
mod tests {
  use motorstats_workflow::{StepStatus, WorkflowKind};

  use super::*;

  fn period(s: &str) -> Period {
    s.parse().unwrap()
  }

  #[tokio::test]
  async fn test_transition_is_conditional_on_non_terminal() {
    let store = InMemoryRunStore::new();
    let run = WorkflowRun::new(WorkflowKind::CacheRegenerate, serde_json::json!({ "data_type": "coe" }));
    store.create_run(&run).await.unwrap();

    assert!(store.transition_run(&run.id, RunStatus::Running, None).await.unwrap());
    assert!(store.transition_run(&run.id, RunStatus::Failed, Some("cancelled")).await.unwrap());
    assert!(!store.transition_run(&run.id, RunStatus::Completed, None).await.unwrap());

    let stored = store.get_run(&run.id).await.unwrap();
    assert_eq!(stored.status, RunStatus::Failed);
    assert_eq!(stored.error.as_deref(), Some("cancelled"));
    assert!(stored.completed_at.is_some());

    assert!(!store.transition_run(&RunId::new(), RunStatus::Running, None).await.unwrap());
  }

  #[tokio::test]
  async fn test_step_records_are_upserted() {
    let store = InMemoryRunStore::new();
    let run = WorkflowRun::new(WorkflowKind::CacheRegenerate, serde_json::json!({ "data_type": "coe" }));

    let mut record = StepRecord::new(&run, StepName::ResolvePeriod);
    store.put_step(&record).await.unwrap();
    record.status = StepStatus::Succeeded;
    record.attempt_count = 1;
    store.put_step(&record).await.unwrap();

    let steps = store.list_steps(&run.id).await.unwrap();
    assert_eq!(steps.len(), 1);
    assert_eq!(steps[0].status, StepStatus::Succeeded);
    assert!(store.get_step(&run.id, StepName::InvalidateDataCache).await.unwrap().is_none());
  }

  #[tokio::test]
  async fn test_rows_upsert_by_natural_key() {
    let store = InMemoryDataStore::new();
    let row = |category: &str, value: i64, p: &str| StatRow {
      entity: Entity::Cars,
      period: period(p),
      category: category.to_string(),
      value,
    };

    store
      .upsert_rows(&[row("petrol", 10, "2024-05"), row("electric", 4, "2024-05")])
      .await
      .unwrap();
    store
      .upsert_rows(&[row("petrol", 12, "2024-05"), row("petrol", 9, "2024-06")])
      .await
      .unwrap();

    let may = store.rows_for_period(Entity::Cars, &period("2024-05")).await.unwrap();
    assert_eq!(may.len(), 2);
    assert_eq!(may[0].category, "electric");
    assert_eq!(may[1].value, 12);

    assert_eq!(store.max_period(Entity::Cars).await.unwrap(), Some(period("2024-06")));
    assert_eq!(store.max_period(Entity::Coe).await.unwrap(), None);
  }

  #[tokio::test]
  async fn test_post_is_unique_per_month_and_type() {
    let store = InMemoryDataStore::new();
    let first = Post::new(Entity::Cars, period("2024-06"), "First".into(), "a".into());
    let second = Post::new(Entity::Cars, period("2024-06"), "Second".into(), "b".into());

    assert!(store.insert_post(&first).await.unwrap().created());
    let again = store.insert_post(&second).await.unwrap();
    assert!(!again.created());
    assert_eq!(again.post().title, "First");
    assert_eq!(store.post_count(), 1);
  }
}
