//! Owner identity reconciliation for imports.
//!
//! A package declaring another owner id is accepted only when the declared
//! email matches the acting owner's email. That covers an account moving to a
//! new owner id without letting one tenant's data merge into another's.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::{SyncError, SyncResult};

/// Looks up the stable identity attribute of an owner.
#[async_trait]
pub trait IdentityDirectory: Send + Sync {
    /// Email registered for `owner_id`, if any.
    async fn email_for(&self, owner_id: &str) -> SyncResult<Option<String>>;
}

/// In-memory directory.
#[derive(Debug, Clone, Default)]
pub struct StaticIdentityDirectory {
    emails: HashMap<String, String>,
}

impl StaticIdentityDirectory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an owner's email.
    #[must_use]
    pub fn with(mut self, owner_id: impl Into<String>, email: impl Into<String>) -> Self {
        self.emails.insert(owner_id.into(), email.into());
        self
    }
}

#[async_trait]
impl IdentityDirectory for StaticIdentityDirectory {
    async fn email_for(&self, owner_id: &str) -> SyncResult<Option<String>> {
        Ok(self.emails.get(owner_id).cloned())
    }
}

/// Trims and lowercases an email. Returns `None` when nothing is left.
#[must_use]
pub fn normalize_email(raw: &str) -> Option<String> {
    let normalized = raw.trim().to_lowercase();
    if normalized.is_empty() {
        None
    } else {
        Some(normalized)
    }
}

/// Who owns the imported records once reconciliation succeeds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciliation {
    pub final_owner_id: String,
    /// Every record must be rewritten to `final_owner_id` before merging.
    pub rebind_required: bool,
}

/// Decides whether a package may be imported by the acting owner.
pub struct IdentityReconciler {
    directory: Arc<dyn IdentityDirectory>,
}

impl IdentityReconciler {
    pub fn new(directory: Arc<dyn IdentityDirectory>) -> Self {
        Self { directory }
    }

    pub async fn reconcile(
        &self,
        acting_owner_id: &str,
        declared_owner_id: &str,
        declared_email: Option<&str>,
    ) -> SyncResult<Reconciliation> {
        if acting_owner_id == declared_owner_id {
            return Ok(Reconciliation {
                final_owner_id: acting_owner_id.to_string(),
                rebind_required: false,
            });
        }

        let Some(declared) = declared_email.and_then(normalize_email) else {
            debug!("Package owner {declared_owner_id} declares no email");
            return Err(SyncError::IdentityMismatch(format!(
                "package owner {declared_owner_id} differs from {acting_owner_id} and declares no email"
            )));
        };

        let acting = self
            .directory
            .email_for(acting_owner_id)
            .await?
            .as_deref()
            .and_then(normalize_email);

        match acting {
            Some(acting) if acting == declared => {
                info!("Rebinding package from owner {declared_owner_id} to {acting_owner_id}");
                Ok(Reconciliation {
                    final_owner_id: acting_owner_id.to_string(),
                    rebind_required: true,
                })
            }
            Some(_) => Err(SyncError::IdentityMismatch(format!(
                "package owner {declared_owner_id} belongs to a different account"
            ))),
            None => Err(SyncError::IdentityMismatch(format!(
                "no email on record for {acting_owner_id}"
            ))),
        }
    }
}
