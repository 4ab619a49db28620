//! Operator configuration: `ontic.toml` layered with `ONTIC_*` variables.

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use ontic_core::{Provenance, RequestContext, Source};
use serde::Deserialize;
use uuid::Uuid;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
  /// SQLite file backing the store. A leading `~/` is expanded.
  #[serde(default = "default_store_path")]
  pub store_path: PathBuf,
  /// Tenant every command runs against.
  pub project_id: Uuid,
  /// The operator; stamped as `updated_by`/`answered_by` on edits.
  #[serde(default)]
  pub user_id:    Option<Uuid>,
}

fn default_store_path() -> PathBuf { PathBuf::from("ontic.db") }

impl Settings {
  pub fn load(path: &Path) -> anyhow::Result<Self> {
    let settings = config::Config::builder()
      .add_source(config::File::from(path).required(false))
      .add_source(config::Environment::with_prefix("ONTIC"))
      .build()
      .context("failed to read config file")?;

    let mut settings: Self = settings
      .try_deserialize()
      .context("failed to deserialise settings (is project_id set?)")?;
    settings.store_path = expand_tilde(&settings.store_path);
    Ok(settings)
  }

  /// Everything the CLI does is a human acting by hand.
  pub fn context(&self) -> RequestContext {
    RequestContext::new(self.project_id).with_provenance(Provenance {
      source:  Source::Manual,
      user_id: self.user_id,
    })
  }
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
  match (path.strip_prefix("~"), std::env::var_os("HOME")) {
    (Ok(rest), Some(home)) => PathBuf::from(home).join(rest),
    _ => path.to_path_buf(),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn tilde_is_expanded_against_home() {
    let Ok(home) = std::env::var("HOME") else { return };
    assert_eq!(expand_tilde(Path::new("~/ontic.db")), PathBuf::from(&home).join("ontic.db"));
    assert_eq!(expand_tilde(Path::new("/var/ontic.db")), PathBuf::from("/var/ontic.db"));
    assert_eq!(expand_tilde(Path::new("~")), PathBuf::from(&home));
    assert_eq!(expand_tilde(Path::new("~ontic/db")), PathBuf::from("~ontic/db"));
  }

  #[test]
  fn cli_context_is_manual() {
    let settings = Settings {
      store_path: default_store_path(),
      project_id: Uuid::new_v4(),
      user_id:    None,
    };
    let ctx = settings.context();
    assert_eq!(ctx.project_id().unwrap(), settings.project_id);
    assert_eq!(ctx.provenance().unwrap().source, Source::Manual);
  }
}
