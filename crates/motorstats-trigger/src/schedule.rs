//! Periodic data refreshes.

use std::time::Duration;

use motorstats_config::ScheduleConfig;
use motorstats_workflow::Entity;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::boundary::TriggerRequest;

/// Enqueues a DataRefresh for every configured entity on a fixed interval.
///
/// The first tick fires immediately.
#[derive(Debug, Clone)]
pub struct Schedule {
  entities: Vec<Entity>,
  interval: Duration,
}

impl Schedule {
  pub fn new(entities: Vec<Entity>, interval: Duration) -> Self {
    Self { entities, interval }
  }

  /// Requests enqueued on every tick.
  pub fn requests(&self) -> Vec<TriggerRequest> {
    self
      .entities
      .iter()
      .map(|entity| TriggerRequest::data_refresh(*entity, None))
      .collect()
  }

  /// Tick until cancelled or until the receiving side is gone.
  pub async fn run(self, sender: mpsc::Sender<TriggerRequest>, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(self.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    info!(
      entities = self.entities.len(),
      interval_secs = self.interval.as_secs(),
      "schedule_started"
    );

    loop {
      tokio::select! {
        _ = cancel.cancelled() => {
          info!("schedule_cancelled");
          return;
        }
        _ = ticker.tick() => {
          debug!("schedule_tick");
          for request in self.requests() {
            if sender.send(request).await.is_err() {
              info!("schedule_receiver_closed");
              return;
            }
          }
        }
      }
    }
  }
}

impl From<&ScheduleConfig> for Schedule {
  fn from(config: &ScheduleConfig) -> Self {
    Self::new(
      config.entities.clone(),
      Duration::from_secs(config.interval_secs.max(1)),
    )
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_from_config() {
    let config = ScheduleConfig {
      entities: vec![Entity::Cars, Entity::Coe],
      interval_secs: 0,
    };
    let schedule = Schedule::from(&config);

    assert_eq!(schedule.interval, Duration::from_secs(1));
    assert_eq!(
      schedule
        .requests()
        .iter()
        .map(|r| r.kind.to_string())
        .collect::<Vec<_>>(),
      vec!["data_refresh:cars", "data_refresh:coe"]
    );
  }
}
