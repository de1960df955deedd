//! A resolved handler row.

use serde::{Deserialize, Serialize};

use super::LinkId;

/// One row of the `handlers` relation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HandlerRecord {
  /// Logical handler identity.
  pub handler_id: LinkId,
  /// Link holding the current distributed source text.
  pub dist_id: LinkId,
  /// Link holding the authored source.
  pub src_id: LinkId,
}
