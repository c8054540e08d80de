//! Role-resolution tests: embedded-claim fast path, single directory
//! lookup, fail-closed handling of unknown and incomplete records, and the
//! optional bounded cache.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;

use hostelry::directory::{
    Directory, DirectoryError, DirectoryResult, IssueDoc, IssueStatus, RoomDoc, StudentDoc,
    StudentPatch, UserRecord,
};
use hostelry::identity::{
    AuthError, Role, RoleResolver, ScopeBinding, ScopeClaims, VerifiedIdentity,
};

/// In-memory directory: a user-record map plus a read counter, so tests can
/// assert exactly how many lookups a resolution performed.
#[derive(Default)]
struct FakeDirectory {
    users: HashMap<String, UserRecord>,
    reads: AtomicUsize,
    unavailable: bool,
}

impl FakeDirectory {
    fn with_user(mut self, record: UserRecord) -> Self {
        self.users.insert(record.subject_id.clone(), record);
        self
    }

    fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Directory for FakeDirectory {
    async fn user_record(&self, subject_id: &str) -> DirectoryResult<Option<UserRecord>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if self.unavailable {
            return Err(DirectoryError::Unavailable("connection refused".to_string()));
        }
        Ok(self.users.get(subject_id).cloned())
    }

    async fn student(&self, _id: &str) -> DirectoryResult<Option<StudentDoc>> {
        Ok(None)
    }
    async fn students_in(
        &self,
        _hostel_id: &str,
        _floor_id: Option<&str>,
    ) -> DirectoryResult<Vec<StudentDoc>> {
        Ok(Vec::new())
    }
    async fn all_students(&self) -> DirectoryResult<Vec<StudentDoc>> {
        Ok(Vec::new())
    }
    async fn update_student(&self, _id: &str, _patch: &StudentPatch) -> DirectoryResult<()> {
        Ok(())
    }
    async fn rewrite_student_id(&self, _old_id: &str, _new_id: &str) -> DirectoryResult<()> {
        Ok(())
    }
    async fn room(&self, _id: &str) -> DirectoryResult<Option<RoomDoc>> {
        Ok(None)
    }
    async fn rooms_in(
        &self,
        _hostel_id: &str,
        _floor_id: Option<&str>,
    ) -> DirectoryResult<Vec<RoomDoc>> {
        Ok(Vec::new())
    }
    async fn occupants(&self, _room_id: &str) -> DirectoryResult<Vec<StudentDoc>> {
        Ok(Vec::new())
    }
    async fn issue(&self, _id: &str) -> DirectoryResult<Option<IssueDoc>> {
        Ok(None)
    }
    async fn issues_in(
        &self,
        _hostel_id: &str,
        _floor_id: Option<&str>,
    ) -> DirectoryResult<Vec<IssueDoc>> {
        Ok(Vec::new())
    }
    async fn create_issue(&self, _doc: &IssueDoc) -> DirectoryResult<()> {
        Ok(())
    }
    async fn update_issue(
        &self,
        _id: &str,
        _status: IssueStatus,
        _resolution_note: Option<&str>,
    ) -> DirectoryResult<()> {
        Ok(())
    }
}

fn record(subject: &str, role: &str) -> UserRecord {
    UserRecord {
        subject_id: subject.to_string(),
        role: role.to_string(),
        name: None,
        email: None,
        hostel_id: None,
        floor_ids: None,
        room_id: None,
    }
}

fn identity(subject: &str) -> VerifiedIdentity {
    VerifiedIdentity { subject_id: subject.to_string(), ..Default::default() }
}

#[tokio::test]
async fn embedded_claims_resolve_without_directory_io() -> Result<()> {
    let dir = Arc::new(FakeDirectory::default());
    let resolver = RoleResolver::new(dir.clone());

    let ident = VerifiedIdentity {
        subject_id: "co-1".to_string(),
        embedded_role: Some("coAdmin".to_string()),
        embedded_scope: ScopeClaims {
            hostel_id: Some("H1".to_string()),
            floor_ids: Some(vec!["F1".to_string(), "F2".to_string()]),
            room_id: None,
        },
        ..Default::default()
    };
    let (role, scope) = resolver.resolve(&ident).await?;
    assert_eq!(role, Role::CoAdmin);
    assert_eq!(
        scope,
        ScopeBinding::Floors {
            hostel_id: "H1".to_string(),
            floor_ids: vec!["F1".to_string(), "F2".to_string()],
        }
    );
    assert_eq!(dir.read_count(), 0, "fast path must not touch the directory");
    Ok(())
}

#[tokio::test]
async fn role_claim_without_scope_falls_back_to_one_lookup() -> Result<()> {
    let mut rec = record("adm-1", "admin");
    rec.hostel_id = Some("H2".to_string());
    let dir = Arc::new(FakeDirectory::default().with_user(rec));
    let resolver = RoleResolver::new(dir.clone());

    let ident = VerifiedIdentity {
        subject_id: "adm-1".to_string(),
        embedded_role: Some("admin".to_string()),
        ..Default::default()
    };
    let (role, scope) = resolver.resolve(&ident).await?;
    assert_eq!(role, Role::Admin);
    assert_eq!(scope, ScopeBinding::Hostel { hostel_id: "H2".to_string() });
    assert_eq!(dir.read_count(), 1);
    Ok(())
}

#[tokio::test]
async fn unrecognized_embedded_claim_grants_nothing_by_itself() -> Result<()> {
    let mut rec = record("u1", "student");
    rec.hostel_id = Some("H1".to_string());
    rec.room_id = Some("R4".to_string());
    let dir = Arc::new(FakeDirectory::default().with_user(rec));
    let resolver = RoleResolver::new(dir.clone());

    let ident = VerifiedIdentity {
        subject_id: "u1".to_string(),
        embedded_role: Some("warden".to_string()),
        ..Default::default()
    };
    let (role, scope) = resolver.resolve(&ident).await?;
    assert_eq!(role, Role::Student);
    assert_eq!(
        scope,
        ScopeBinding::Room {
            hostel_id: "H1".to_string(),
            room_id: "R4".to_string(),
            occupant_id: "u1".to_string(),
        }
    );
    assert_eq!(dir.read_count(), 1);
    Ok(())
}

#[tokio::test]
async fn unknown_subject_fails_closed() {
    let dir = Arc::new(FakeDirectory::default());
    let resolver = RoleResolver::new(dir.clone());

    let err = resolver.resolve(&identity("ghost")).await.unwrap_err();
    assert_eq!(err, AuthError::UnknownIdentity("ghost".to_string()));
    assert_eq!(dir.read_count(), 1);
}

#[tokio::test]
async fn unrecognized_stored_role_fails_closed() {
    let dir = Arc::new(FakeDirectory::default().with_user(record("u2", "overlord")));
    let resolver = RoleResolver::new(dir);

    let err = resolver.resolve(&identity("u2")).await.unwrap_err();
    assert!(matches!(err, AuthError::IncompleteProfile { missing: "role", .. }));
}

#[tokio::test]
async fn co_admin_record_without_floors_is_incomplete() {
    let mut rec = record("co-2", "coAdmin");
    rec.hostel_id = Some("H1".to_string());
    rec.floor_ids = Some(Vec::new());
    let dir = Arc::new(FakeDirectory::default().with_user(rec));
    let resolver = RoleResolver::new(dir);

    let err = resolver.resolve(&identity("co-2")).await.unwrap_err();
    assert!(matches!(err, AuthError::IncompleteProfile { missing: "floor_ids", .. }));
}

#[tokio::test]
async fn student_record_without_room_is_incomplete() {
    let mut rec = record("stu-3", "student");
    rec.hostel_id = Some("H1".to_string());
    let dir = Arc::new(FakeDirectory::default().with_user(rec));
    let resolver = RoleResolver::new(dir);

    let err = resolver.resolve(&identity("stu-3")).await.unwrap_err();
    assert!(matches!(err, AuthError::IncompleteProfile { missing: "room_id", .. }));
}

#[tokio::test]
async fn store_outage_reports_provider_unavailable() {
    let dir = Arc::new(FakeDirectory { unavailable: true, ..Default::default() });
    let resolver = RoleResolver::new(dir);

    let err = resolver.resolve(&identity("anyone")).await.unwrap_err();
    assert!(err.is_transient(), "outages must surface as transient, got {err:?}");
}

#[tokio::test]
async fn cache_serves_repeat_resolutions_within_ttl() -> Result<()> {
    let mut rec = record("adm-9", "admin");
    rec.hostel_id = Some("H3".to_string());
    let dir = Arc::new(FakeDirectory::default().with_user(rec));
    let resolver = RoleResolver::new(dir.clone()).with_cache_ttl(Duration::from_secs(60));

    let first = resolver.resolve(&identity("adm-9")).await?;
    let second = resolver.resolve(&identity("adm-9")).await?;
    assert_eq!(first, second);
    assert_eq!(dir.read_count(), 1, "second resolution must come from cache");
    Ok(())
}

#[tokio::test]
async fn cache_entries_expire_after_ttl() -> Result<()> {
    let mut rec = record("adm-9", "admin");
    rec.hostel_id = Some("H3".to_string());
    let dir = Arc::new(FakeDirectory::default().with_user(rec));
    let resolver = RoleResolver::new(dir.clone()).with_cache_ttl(Duration::from_millis(1));

    resolver.resolve(&identity("adm-9")).await?;
    tokio::time::sleep(Duration::from_millis(20)).await;
    resolver.resolve(&identity("adm-9")).await?;
    assert_eq!(dir.read_count(), 2, "expired entry must be re-resolved");
    Ok(())
}
