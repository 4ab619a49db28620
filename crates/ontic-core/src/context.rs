//! Per-call request context: tenant scope and provenance.
//!
//! Every store operation takes a [`RequestContext`] explicitly. Nothing about
//! "who is writing" lives in ambient or global state.

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Source ──────────────────────────────────────────────────────────────────

/// Where a piece of ontology data came from.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Serialize,
  Deserialize,
  AsRefStr,
  Display,
  EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Source {
  /// Produced by automated discovery. The only provenance that is ever
  /// marked stale or bulk-reset.
  Inference,
  /// Entered by a human operator.
  Manual,
  /// Entered by an agent over MCP.
  Mcp,
}

impl Source {
  /// Whether rows of this provenance participate in staleness tracking.
  pub fn is_inferred(self) -> bool { matches!(self, Self::Inference) }
}

// ─── Provenance ──────────────────────────────────────────────────────────────

/// The provenance of a mutating call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provenance {
  pub source:  Source,
  /// The acting user, if any. Discovery runs usually have none.
  pub user_id: Option<Uuid>,
}

impl Provenance {
  pub fn inference() -> Self { Self { source: Source::Inference, user_id: None } }

  pub fn manual(user_id: Uuid) -> Self {
    Self { source: Source::Manual, user_id: Some(user_id) }
  }

  pub fn mcp(user_id: Option<Uuid>) -> Self { Self { source: Source::Mcp, user_id } }
}

// ─── RequestContext ──────────────────────────────────────────────────────────

/// Scope threaded through every store call.
///
/// Both halves are optional at construction so that a missing scope is
/// reported as a precondition error by the operation that needs it, rather
/// than being papered over with a default.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
  project_id: Option<Uuid>,
  provenance: Option<Provenance>,
}

impl RequestContext {
  /// A context scoped to `project_id`, with no provenance attached.
  pub fn new(project_id: Uuid) -> Self {
    Self { project_id: Some(project_id), provenance: None }
  }

  /// A context with neither tenant scope nor provenance.
  pub fn unscoped() -> Self { Self::default() }

  pub fn with_provenance(mut self, provenance: Provenance) -> Self {
    self.provenance = Some(provenance);
    self
  }

  pub fn inference(project_id: Uuid) -> Self {
    Self::new(project_id).with_provenance(Provenance::inference())
  }

  pub fn manual(project_id: Uuid, user_id: Uuid) -> Self {
    Self::new(project_id).with_provenance(Provenance::manual(user_id))
  }

  pub fn mcp(project_id: Uuid, user_id: Option<Uuid>) -> Self {
    Self::new(project_id).with_provenance(Provenance::mcp(user_id))
  }

  /// The tenant scope, or [`Error::TenantScopeRequired`].
  pub fn project_id(&self) -> Result<Uuid> {
    self.project_id.ok_or(Error::TenantScopeRequired)
  }

  /// The provenance of this call, or [`Error::ProvenanceRequired`].
  pub fn provenance(&self) -> Result<Provenance> {
    self.provenance.ok_or(Error::ProvenanceRequired)
  }

  /// Both the tenant scope and the provenance; what every mutating ontology
  /// operation needs.
  pub fn write_scope(&self) -> Result<(Uuid, Provenance)> {
    Ok((self.project_id()?, self.provenance()?))
  }
}
