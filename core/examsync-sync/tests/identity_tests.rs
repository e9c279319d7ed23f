use async_trait::async_trait;
use examsync_sync::{
    normalize_email, IdentityDirectory, IdentityReconciler, Reconciliation,
    StaticIdentityDirectory, SyncError, SyncResult,
};
use std::sync::Arc;

fn make_reconciler() -> IdentityReconciler {
    IdentityReconciler::new(Arc::new(
        StaticIdentityDirectory::new()
            .with("T1-new", "  Ana.Teacher@Example.com ")
            .with("T3", "carla@example.com"),
    ))
}

struct BrokenDirectory;

#[async_trait]
impl IdentityDirectory for BrokenDirectory {
    async fn email_for(&self, _owner_id: &str) -> SyncResult<Option<String>> {
        Err(SyncError::IdentityLookup("directory offline".to_string()))
    }
}

#[test]
fn normalize_trims_and_lowercases() {
    assert_eq!(
        normalize_email("  Ana.Teacher@Example.COM\t").as_deref(),
        Some("ana.teacher@example.com")
    );
    assert_eq!(normalize_email("   "), None);
}

#[tokio::test]
async fn same_owner_needs_no_rebind() {
    let result = make_reconciler().reconcile("T1", "T1", None).await.unwrap();
    assert_eq!(
        result,
        Reconciliation {
            final_owner_id: "T1".to_string(),
            rebind_required: false,
        }
    );
}

#[tokio::test]
async fn same_owner_skips_directory() {
    let reconciler = IdentityReconciler::new(Arc::new(BrokenDirectory));
    assert!(reconciler.reconcile("T1", "T1", None).await.is_ok());
}

#[tokio::test]
async fn matching_email_rebinds_to_acting_owner() {
    let result = make_reconciler()
        .reconcile("T1-new", "T1", Some("ANA.TEACHER@example.com "))
        .await
        .unwrap();
    assert_eq!(result.final_owner_id, "T1-new");
    assert!(result.rebind_required);
}

#[tokio::test]
async fn different_email_is_mismatch() {
    let err = make_reconciler()
        .reconcile("T3", "T1", Some("ana.teacher@example.com"))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "IDENTITY_MISMATCH");
}

#[tokio::test]
async fn missing_declared_email_is_mismatch() {
    let err = make_reconciler()
        .reconcile("T1-new", "T1", None)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "IDENTITY_MISMATCH");

    let err = make_reconciler()
        .reconcile("T1-new", "T1", Some("  "))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "IDENTITY_MISMATCH");
}

#[tokio::test]
async fn acting_owner_without_email_is_mismatch() {
    let err = make_reconciler()
        .reconcile("T-unknown", "T1", Some("ana.teacher@example.com"))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "IDENTITY_MISMATCH");
}

#[tokio::test]
async fn directory_failure_propagates() {
    let reconciler = IdentityReconciler::new(Arc::new(BrokenDirectory));
    let err = reconciler
        .reconcile("T1-new", "T1", Some("ana.teacher@example.com"))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "IDENTITY_LOOKUP_FAILED");
}
