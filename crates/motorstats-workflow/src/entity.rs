use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::WorkflowError;

/// A statistics dataset that can be refreshed and written about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Entity {
  /// New car registrations.
  Cars,
  /// Certificate of Entitlement bidding results.
  Coe,
  /// Vehicle deregistrations.
  Deregistrations,
}

impl Entity {
  pub const ALL: [Entity; 3] = [Entity::Cars, Entity::Coe, Entity::Deregistrations];

  pub fn as_str(&self) -> &'static str {
    match self {
      Entity::Cars => "cars",
      Entity::Coe => "coe",
      Entity::Deregistrations => "deregistrations",
    }
  }

  /// Human readable label used in generated titles.
  pub fn label(&self) -> &'static str {
    match self {
      Entity::Cars => "Car Registrations",
      Entity::Coe => "COE Results",
      Entity::Deregistrations => "Vehicle Deregistrations",
    }
  }
}

impl fmt::Display for Entity {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for Entity {
  type Err = WorkflowError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "cars" => Ok(Entity::Cars),
      "coe" => Ok(Entity::Coe),
      "deregistrations" => Ok(Entity::Deregistrations),
      other => Err(WorkflowError::UnknownEntity(other.to_string())),
    }
  }
}

/// A calendar month, written `YYYY-MM`.
///
/// Periods order chronologically, so the newest period of a set is its max.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Period {
  year: i32,
  month: u32,
}

impl Period {
  pub fn new(year: i32, month: u32) -> Result<Self, WorkflowError> {
    if !(1..=12).contains(&month) || !(1000..=9999).contains(&year) {
      return Err(WorkflowError::InvalidPeriod(format!("{year}-{month}")));
    }
    Ok(Self { year, month })
  }

  pub fn year(&self) -> i32 {
    self.year
  }

  pub fn month(&self) -> u32 {
    self.month
  }
}

impl fmt::Display for Period {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{:04}-{:02}", self.year, self.month)
  }
}

impl FromStr for Period {
  type Err = WorkflowError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let invalid = || WorkflowError::InvalidPeriod(s.to_string());

    let (year, month) = s.split_once('-').ok_or_else(invalid)?;
    if year.len() != 4 || month.len() != 2 {
      return Err(invalid());
    }
    if !year.bytes().chain(month.bytes()).all(|b| b.is_ascii_digit()) {
      return Err(invalid());
    }

    let year: i32 = year.parse().map_err(|_| invalid())?;
    let month: u32 = month.parse().map_err(|_| invalid())?;
    Period::new(year, month).map_err(|_| invalid())
  }
}

impl TryFrom<String> for Period {
  type Error = WorkflowError;

  fn try_from(value: String) -> Result<Self, Self::Error> {
    value.parse()
  }
}

impl From<Period> for String {
  fn from(period: Period) -> Self {
    period.to_string()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_period_parse_and_display() {
    let period: Period = "2024-05".parse().unwrap();
    assert_eq!(period.year(), 2024);
    assert_eq!(period.month(), 5);
    assert_eq!(period.to_string(), "2024-05");
  }

  #[test]
  fn test_period_rejects_malformed() {
    for bad in ["2024-13", "2024-00", "2024-5", "24-05", "2024/05", "2024-0a", "", "2024-05-01"] {
      assert!(bad.parse::<Period>().is_err(), "{bad} should be rejected");
    }
  }

  #[test]
  fn test_period_ordering() {
    let dec: Period = "2023-12".parse().unwrap();
    let may: Period = "2024-05".parse().unwrap();
    let jan: Period = "2024-01".parse().unwrap();
    assert!(dec < jan);
    assert!(jan < may);
    assert_eq!([may, dec, jan].into_iter().max(), Some(may));
  }

  #[test]
  fn test_period_serde_as_string() {
    let period: Period = "2024-06".parse().unwrap();
    let json = serde_json::to_value(period).unwrap();
    assert_eq!(json, serde_json::json!("2024-06"));

    let back: Period = serde_json::from_value(json).unwrap();
    assert_eq!(back, period);
    assert!(serde_json::from_value::<Period>(serde_json::json!("June")).is_err());
  }

  #[test]
  fn test_entity_round_trip() {
    for entity in Entity::ALL {
      assert_eq!(entity.as_str().parse::<Entity>().unwrap(), entity);
    }
    assert!("trucks".parse::<Entity>().is_err());
  }
}
