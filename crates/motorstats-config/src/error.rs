use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("failed to read config file {path}")]
  Io {
    path: String,
    #[source]
    source: std::io::Error,
  },

  #[error("failed to parse config file {path}: {source}")]
  Parse {
    path: String,
    #[source]
    source: serde_json::Error,
  },

  #[error("invalid config value '{field}': {message}")]
  Invalid { field: String, message: String },
}

impl ConfigError {
  pub(crate) fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
    ConfigError::Invalid {
      field: field.into(),
      message: message.into(),
    }
  }
}
