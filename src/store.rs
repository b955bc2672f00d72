//! Narrow collaborator interfaces consumed by the gate and its handlers.
//!
//! Persistence is not part of this crate. The traits below are the only
//! surface the services depend on; the in-memory implementations back the
//! binary and the tests.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{Credential, Subject};

/// Identity store: lookup and registration of login credentials.
pub trait CredentialStore: Send + Sync {
    /// Look up a credential by login identity (case-insensitive email).
    fn find_by_identity(&self, identity: &str) -> Option<Credential>;

    fn find_by_subject(&self, subject_id: Uuid) -> Option<Credential>;

    fn identity_exists(&self, identity: &str) -> bool;

    fn username_exists(&self, username: &str) -> bool;

    /// Persist a new credential.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Conflict` if the identity or username is taken.
    fn insert(&self, credential: Credential) -> AppResult<()>;
}

/// Per-user record of cleared sections.
pub trait ProgressStore: Send + Sync {
    /// Mark a section cleared. Idempotent; returns the first completion time.
    fn mark_cleared(&self, subject_id: Uuid, catalog_id: u64, section_id: u32) -> DateTime<Utc>;

    /// Returns true if a record was removed.
    fn unmark_cleared(&self, subject_id: Uuid, catalog_id: u64, section_id: u32) -> bool;

    fn is_cleared(&self, subject_id: Uuid, catalog_id: u64, section_id: u32) -> bool;

    /// Cleared section ids in ascending order.
    fn cleared_sections(&self, subject_id: Uuid, catalog_id: u64) -> Vec<u32>;
}

/// Catalog of learning subjects.
pub trait SubjectCatalog: Send + Sync {
    fn list(&self) -> Vec<Subject>;

    fn get(&self, id: u64) -> Option<Subject>;

    fn insert(&self, title: String, description: String) -> Subject;

    /// Returns true if the subject existed.
    fn delete(&self, id: u64) -> bool;
}

// =============================================================================
// In-memory implementations
// =============================================================================

#[derive(Debug, Default)]
struct CredentialTables {
    by_subject: HashMap<Uuid, Credential>,
    /// Lowercased identity -> subject
    by_identity: HashMap<String, Uuid>,
    /// Lowercased username -> subject
    by_username: HashMap<String, Uuid>,
}

/// Credential store held in process memory.
#[derive(Debug, Default)]
pub struct InMemoryCredentialStore {
    tables: RwLock<CredentialTables>,
}

impl InMemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CredentialStore for InMemoryCredentialStore {
    fn find_by_identity(&self, identity: &str) -> Option<Credential> {
        let tables = self.tables.read();
        tables
            .by_identity
            .get(&identity.to_lowercase())
            .and_then(|id| tables.by_subject.get(id))
            .cloned()
    }

    fn find_by_subject(&self, subject_id: Uuid) -> Option<Credential> {
        self.tables.read().by_subject.get(&subject_id).cloned()
    }

    fn identity_exists(&self, identity: &str) -> bool {
        self.tables
            .read()
            .by_identity
            .contains_key(&identity.to_lowercase())
    }

    fn username_exists(&self, username: &str) -> bool {
        self.tables
            .read()
            .by_username
            .contains_key(&username.to_lowercase())
    }

    fn insert(&self, credential: Credential) -> AppResult<()> {
        let identity_key = credential.identity.to_lowercase();
        let username_key = credential.username.to_lowercase();

        // Check and insert under one write lock so concurrent sign-ups cannot
        // both claim the same identity
        let mut tables = self.tables.write();
        if tables.by_identity.contains_key(&identity_key) {
            return Err(AppError::Conflict("Email is already registered".to_string()));
        }
        if tables.by_username.contains_key(&username_key) {
            return Err(AppError::Conflict("Username is already taken".to_string()));
        }

        tables.by_identity.insert(identity_key, credential.subject_id);
        tables.by_username.insert(username_key, credential.subject_id);
        tables.by_subject.insert(credential.subject_id, credential);
        Ok(())
    }
}

type ProgressKey = (Uuid, u64);

/// Progress store held in process memory.
#[derive(Debug, Default)]
pub struct InMemoryProgressStore {
    records: RwLock<HashMap<ProgressKey, HashMap<u32, DateTime<Utc>>>>,
}

impl InMemoryProgressStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProgressStore for InMemoryProgressStore {
    fn mark_cleared(&self, subject_id: Uuid, catalog_id: u64, section_id: u32) -> DateTime<Utc> {
        *self
            .records
            .write()
            .entry((subject_id, catalog_id))
            .or_default()
            .entry(section_id)
            .or_insert_with(Utc::now)
    }

    fn unmark_cleared(&self, subject_id: Uuid, catalog_id: u64, section_id: u32) -> bool {
        self.records
            .write()
            .get_mut(&(subject_id, catalog_id))
            .is_some_and(|sections| sections.remove(&section_id).is_some())
    }

    fn is_cleared(&self, subject_id: Uuid, catalog_id: u64, section_id: u32) -> bool {
        self.records
            .read()
            .get(&(subject_id, catalog_id))
            .is_some_and(|sections| sections.contains_key(&section_id))
    }

    fn cleared_sections(&self, subject_id: Uuid, catalog_id: u64) -> Vec<u32> {
        self.records
            .read()
            .get(&(subject_id, catalog_id))
            .map(|sections| {
                sections
                    .keys()
                    .copied()
                    .collect::<BTreeSet<_>>()
                    .into_iter()
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Subject catalog held in process memory.
#[derive(Debug)]
pub struct InMemorySubjectCatalog {
    subjects: RwLock<HashMap<u64, Subject>>,
    next_id: AtomicU64,
}

impl Default for InMemorySubjectCatalog {
    fn default() -> Self {
        Self {
            subjects: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }
}

impl InMemorySubjectCatalog {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SubjectCatalog for InMemorySubjectCatalog {
    fn list(&self) -> Vec<Subject> {
        let mut subjects: Vec<Subject> = self.subjects.read().values().cloned().collect();
        subjects.sort_by_key(|s| s.id);
        subjects
    }

    fn get(&self, id: u64) -> Option<Subject> {
        self.subjects.read().get(&id).cloned()
    }

    fn insert(&self, title: String, description: String) -> Subject {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let subject = Subject {
            id,
            title,
            description,
        };
        self.subjects.write().insert(id, subject.clone());
        subject
    }

    fn delete(&self, id: u64) -> bool {
        self.subjects.write().remove(&id).is_some()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::models::{PasswordHash, Role};

    fn credential(identity: &str, username: &str) -> Credential {
        Credential {
            subject_id: Uuid::new_v4(),
            identity: identity.to_string(),
            username: username.to_string(),
            password_hash: PasswordHash::new("$argon2id$v=19$m=8,t=1,p=1$c2FsdA$aGFzaA").unwrap(),
            role: Role::Standard,
        }
    }

    #[test]
    fn test_credential_lookup_is_case_insensitive() {
        let store = InMemoryCredentialStore::new();
        let cred = credential("Alice@Example.com", "alice");
        let id = cred.subject_id;
        store.insert(cred).unwrap();

        let found = store.find_by_identity("alice@example.COM").unwrap();
        assert_eq!(found.subject_id, id);
        assert!(store.identity_exists("ALICE@example.com"));
        assert!(store.username_exists("Alice"));
        assert!(store.find_by_subject(id).is_some());
        assert!(store.find_by_identity("bob@example.com").is_none());
    }

    #[test]
    fn test_credential_insert_conflicts() {
        let store = InMemoryCredentialStore::new();
        store.insert(credential("a@example.com", "alice")).unwrap();

        let dup_email = store.insert(credential("A@example.com", "other"));
        assert!(matches!(dup_email, Err(AppError::Conflict(_))));

        let dup_username = store.insert(credential("b@example.com", "ALICE"));
        assert!(matches!(dup_username, Err(AppError::Conflict(_))));
    }

    #[test]
    fn test_progress_mark_is_idempotent() {
        let store = InMemoryProgressStore::new();
        let user = Uuid::new_v4();

        let first = store.mark_cleared(user, 1, 3);
        let second = store.mark_cleared(user, 1, 3);
        store.mark_cleared(user, 1, 1);

        assert_eq!(first, second);
        assert_eq!(store.cleared_sections(user, 1), vec![1, 3]);
        assert!(store.is_cleared(user, 1, 3));
        assert!(!store.is_cleared(user, 2, 3));
    }

    #[test]
    fn test_progress_is_scoped_per_user() {
        let store = InMemoryProgressStore::new();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();

        store.mark_cleared(alice, 1, 1);

        assert!(store.cleared_sections(bob, 1).is_empty());
        assert!(!store.unmark_cleared(bob, 1, 1));
        assert!(store.unmark_cleared(alice, 1, 1));
        assert!(!store.is_cleared(alice, 1, 1));
    }

    #[test]
    fn test_catalog_crud() {
        let catalog = InMemorySubjectCatalog::new();
        let rust = catalog.insert("Rust".to_string(), String::new());
        let go = catalog.insert("Go".to_string(), "concurrency".to_string());

        assert_eq!(rust.id, 1);
        assert_eq!(go.id, 2);
        assert_eq!(catalog.list().len(), 2);
        assert_eq!(catalog.get(2).unwrap().title, "Go");

        assert!(catalog.delete(1));
        assert!(!catalog.delete(1));
        assert!(catalog.get(1).is_none());
    }
}
