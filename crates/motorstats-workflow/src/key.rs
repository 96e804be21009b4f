use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::run::RunId;
use crate::step::StepName;

/// Deterministic identifier of one step of one run with one payload.
///
/// Hex encoded SHA-256 of the canonical JSON of `{payload, run_id, step}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdempotencyKey(String);

impl IdempotencyKey {
  pub fn derive(run_id: &RunId, step: StepName, payload: &Value) -> Self {
    let material = serde_json::json!({
      "payload": payload,
      "run_id": run_id.to_string(),
      "step": step.as_str(),
    });
    let digest = Sha256::digest(to_canonical_json(&material).as_bytes());
    Self(format!("{:x}", digest))
  }

  /// Wrap a key read back from storage.
  pub fn from_stored(key: impl Into<String>) -> Self {
    Self(key.into())
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }
}

impl fmt::Display for IdempotencyKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

/// Serialize a JSON value with object keys sorted and no whitespace.
pub fn to_canonical_json(value: &Value) -> String {
  match value {
    Value::Object(map) => {
      let mut entries: Vec<(&String, &Value)> = map.iter().collect();
      entries.sort_by(|a, b| a.0.cmp(b.0));
      let items: Vec<String> = entries
        .into_iter()
        .map(|(k, v)| format!("{}:{}", Value::String(k.clone()), to_canonical_json(v)))
        .collect();
      format!("{{{}}}", items.join(","))
    }
    Value::Array(items) => {
      let items: Vec<String> = items.iter().map(to_canonical_json).collect();
      format!("[{}]", items.join(","))
    }
    scalar => scalar.to_string(),
  }
}
