//! Error type for `ontic-store-sqlite`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  /// Domain errors: preconditions, not-found, conflicts.
  #[error("{0}")]
  Core(#[from] ontic_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("sqlite error: {0}")]
  Sqlite(#[from] rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),
}

impl Error {
  /// The domain error, if this is one.
  pub fn as_core(&self) -> Option<&ontic_core::Error> {
    match self {
      Self::Core(e) => Some(e),
      _ => None,
    }
  }

  pub fn is_precondition(&self) -> bool {
    self.as_core().is_some_and(ontic_core::Error::is_precondition)
  }

  pub fn is_not_found(&self) -> bool {
    self.as_core().is_some_and(ontic_core::Error::is_not_found)
  }

  pub fn is_conflict(&self) -> bool {
    self.as_core().is_some_and(ontic_core::Error::is_conflict)
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
