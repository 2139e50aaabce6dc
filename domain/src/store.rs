//! Ordered user collection mirrored to a blob store.
//!
//! The collection is read once from the blob store when the store is built and
//! the full collection is re-serialized after every mutation.

use std::sync::{Mutex, MutexGuard};

use tracing::debug;

use crate::{BlobStore, CoreError, UserPatch, UserRecord, USERS_KEY};

pub struct UserStore<B: BlobStore> {
    blobs: B,
    users: Mutex<Vec<UserRecord>>,
}

impl<B: BlobStore> UserStore<B> {
    /// Build a store from whatever the blob store holds under [`USERS_KEY`].
    /// An absent key yields an empty collection; an unreadable blob is an error.
    pub fn load(blobs: B) -> Result<Self, CoreError> {
        let users = match blobs.get(USERS_KEY)? {
            Some(raw) => serde_json::from_str::<Vec<UserRecord>>(&raw)
                .map_err(|e| CoreError::Serialization(format!("stored users: {e}")))?,
            None => Vec::new(),
        };
        debug!(count = users.len(), "user store loaded");
        Ok(Self {
            blobs,
            users: Mutex::new(users),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Vec<UserRecord>>, CoreError> {
        self.users
            .lock()
            .map_err(|_| CoreError::Repository("mutex poisoned".into()))
    }

    fn persist(&self, users: &[UserRecord]) -> Result<(), CoreError> {
        let raw = serde_json::to_string(users)
            .map_err(|e| CoreError::Serialization(e.to_string()))?;
        self.blobs.set(USERS_KEY, &raw)
    }

    // The in-memory collection only moves to `next` once the blob store holds it.
    fn commit(&self, users: &mut Vec<UserRecord>, next: Vec<UserRecord>) -> Result<(), CoreError> {
        self.persist(&next)?;
        *users = next;
        Ok(())
    }

    /// Insert `record`, replacing in place any record with the same email.
    pub fn add(&self, record: UserRecord) -> Result<(), CoreError> {
        let mut users = self.lock()?;
        let mut next = users.clone();
        match next.iter().position(|u| u.email == record.email) {
            Some(idx) => {
                debug!(email = %record.email, idx, "user replaced");
                next[idx] = record;
            }
            None => {
                debug!(email = %record.email, "user appended");
                next.push(record);
            }
        }
        self.commit(&mut users, next)
    }

    /// Remove the record with `email`. Absent emails are a no-op.
    pub fn delete(&self, email: &str) -> Result<(), CoreError> {
        let mut users = self.lock()?;
        let mut next = users.clone();
        next.retain(|u| u.email != email);
        debug!(email, removed = users.len() - next.len(), "user delete");
        self.commit(&mut users, next)
    }

    /// Merge `patch` into the record currently keyed by `email`.
    ///
    /// Returns the updated record, or `None` when no record matches. A patch
    /// that would move the record onto another record's email is rejected with
    /// `AlreadyExists` and leaves the collection unchanged.
    pub fn update(&self, email: &str, patch: &UserPatch) -> Result<Option<UserRecord>, CoreError> {
        let mut users = self.lock()?;
        let Some(idx) = users.iter().position(|u| u.email == email) else {
            return Ok(None);
        };
        if let Some(new_email) = &patch.email {
            if new_email != email && users.iter().any(|u| &u.email == new_email) {
                return Err(CoreError::AlreadyExists);
            }
        }
        let mut next = users.clone();
        patch.apply_to(&mut next[idx]);
        let updated = next[idx].clone();
        debug!(email, new_email = %updated.email, "user updated");
        self.commit(&mut users, next)?;
        Ok(Some(updated))
    }

    /// Snapshot of the collection in stored order.
    pub fn list(&self) -> Result<Vec<UserRecord>, CoreError> {
        Ok(self.lock()?.clone())
    }

    pub fn get(&self, email: &str) -> Result<Option<UserRecord>, CoreError> {
        Ok(self.lock()?.iter().find(|u| u.email == email).cloned())
    }

    pub fn len(&self) -> Result<usize, CoreError> {
        Ok(self.lock()?.len())
    }

    pub fn is_empty(&self) -> Result<bool, CoreError> {
        Ok(self.lock()?.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory_blob::InMemoryBlobStore;
    use std::sync::Arc;

    fn rec(email: &str, last: &str) -> UserRecord {
        UserRecord {
            first_name: "Alice".into(),
            last_name: last.into(),
            email: email.into(),
            mobile_number: "9876543210".into(),
            address_line1: "1 Main Street".into(),
            address_line2: None,
            country: "India".into(),
            state: "Kerala".into(),
            city: "Kochi".into(),
            zip_code: "682001".into(),
        }
    }

    fn emails(store: &UserStore<Arc<InMemoryBlobStore>>) -> Vec<String> {
        store.list().unwrap().into_iter().map(|u| u.email).collect()
    }

    #[test]
    fn load_from_empty_blob_store_is_empty() {
        let store = UserStore::load(InMemoryBlobStore::new()).unwrap();
        assert!(store.is_empty().unwrap());
    }

    #[test]
    fn add_appends_and_replaces_in_place() {
        let blobs = Arc::new(InMemoryBlobStore::new());
        let store = UserStore::load(blobs.clone()).unwrap();
        store.add(rec("a@e.com", "Smith")).unwrap();
        store.add(rec("b@e.com", "Smith")).unwrap();
        store.add(rec("c@e.com", "Smith")).unwrap();
        store.add(rec("a@e.com", "Jones")).unwrap();

        assert_eq!(emails(&store), vec!["a@e.com", "b@e.com", "c@e.com"]);
        assert_eq!(store.get("a@e.com").unwrap().unwrap().last_name, "Jones");
    }

    #[test]
    fn add_sequence_keeps_one_record_per_email() {
        let store = UserStore::load(Arc::new(InMemoryBlobStore::new())).unwrap();
        let seq = ["x@e.com", "y@e.com", "x@e.com", "z@e.com", "y@e.com", "x@e.com"];
        for (i, email) in seq.iter().enumerate() {
            store.add(rec(email, &format!("Last{i}"))).unwrap();
        }
        assert_eq!(emails(&store), vec!["x@e.com", "y@e.com", "z@e.com"]);
        assert_eq!(store.get("x@e.com").unwrap().unwrap().last_name, "Last5");
        assert_eq!(store.get("y@e.com").unwrap().unwrap().last_name, "Last4");
    }

    #[test]
    fn mutations_are_visible_to_a_fresh_load() {
        let blobs = Arc::new(InMemoryBlobStore::new());
        let store = UserStore::load(blobs.clone()).unwrap();
        store.add(rec("a@e.com", "Smith")).unwrap();
        store.add(rec("b@e.com", "Smith")).unwrap();
        store.delete("b@e.com").unwrap();
        store
            .update(
                "a@e.com",
                &UserPatch {
                    city: Some("Pune".into()),
                    ..Default::default()
                },
            )
            .unwrap();

        let reloaded = UserStore::load(blobs).unwrap();
        let users = reloaded.list().unwrap();
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].city, "Pune");
    }

    #[test]
    fn delete_missing_email_leaves_collection_unchanged() {
        let store = UserStore::load(Arc::new(InMemoryBlobStore::new())).unwrap();
        store.add(rec("a@e.com", "Smith")).unwrap();
        let before = store.list().unwrap();
        store.delete("ghost@e.com").unwrap();
        assert_eq!(store.list().unwrap(), before);
        store.delete("a@e.com").unwrap();
        assert!(store.get("a@e.com").unwrap().is_none());
    }

    #[test]
    fn update_changes_only_supplied_fields() {
        let store = UserStore::load(Arc::new(InMemoryBlobStore::new())).unwrap();
        store.add(rec("a@e.com", "Smith")).unwrap();
        let before = store.get("a@e.com").unwrap().unwrap();
        let updated = store
            .update(
                "a@e.com",
                &UserPatch {
                    zip_code: Some("560001".into()),
                    ..Default::default()
                },
            )
            .unwrap()
            .unwrap();
        assert_eq!(updated.zip_code, "560001");
        assert_eq!(
            UserRecord {
                zip_code: before.zip_code.clone(),
                ..updated
            },
            before
        );
    }

    #[test]
    fn update_missing_email_is_noop() {
        let store = UserStore::load(Arc::new(InMemoryBlobStore::new())).unwrap();
        store.add(rec("a@e.com", "Smith")).unwrap();
        let out = store
            .update(
                "ghost@e.com",
                &UserPatch {
                    city: Some("Pune".into()),
                    ..Default::default()
                },
            )
            .unwrap();
        assert!(out.is_none());
        assert_eq!(store.get("a@e.com").unwrap().unwrap().city, "Kochi");
    }

    #[test]
    fn update_onto_existing_email_is_rejected() {
        let store = UserStore::load(Arc::new(InMemoryBlobStore::new())).unwrap();
        store.add(rec("a@e.com", "Smith")).unwrap();
        store.add(rec("b@e.com", "Smith")).unwrap();
        let err = store
            .update(
                "a@e.com",
                &UserPatch {
                    email: Some("b@e.com".into()),
                    last_name: Some("Jones".into()),
                    ..Default::default()
                },
            )
            .unwrap_err();
        assert!(matches!(err, CoreError::AlreadyExists));
        assert_eq!(store.get("a@e.com").unwrap().unwrap().last_name, "Smith");
    }

    #[test]
    fn update_may_rename_email() {
        let store = UserStore::load(Arc::new(InMemoryBlobStore::new())).unwrap();
        store.add(rec("a@e.com", "Smith")).unwrap();
        store
            .update(
                "a@e.com",
                &UserPatch {
                    email: Some("new@e.com".into()),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(emails(&store), vec!["new@e.com"]);
    }

    #[test]
    fn loads_blob_written_by_the_browser_form() {
        let blobs = InMemoryBlobStore::new();
        blobs
            .set(
                USERS_KEY,
                r#"[{"firstname":"Alice","lastname":"Smith","email":"a@e.com","mobileNumber":"9876543210",
                    "addressOne":"1 Main","addressTwo":"","state":"Kerala","city":"Kochi",
                    "country":"India","zipcode":"682001"}]"#,
            )
            .unwrap();
        let store = UserStore::load(blobs).unwrap();
        let users = store.list().unwrap();
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].address_line1, "1 Main");
    }

    struct ReadOnlyBlobStore {
        inner: InMemoryBlobStore,
        writable: std::sync::atomic::AtomicBool,
    }

    impl BlobStore for ReadOnlyBlobStore {
        fn get(&self, key: &str) -> Result<Option<String>, CoreError> {
            self.inner.get(key)
        }

        fn set(&self, key: &str, value: &str) -> Result<(), CoreError> {
            if !self.writable.load(std::sync::atomic::Ordering::SeqCst) {
                return Err(CoreError::Repository("disk full".into()));
            }
            self.inner.set(key, value)
        }
    }

    #[test]
    fn failed_persist_leaves_collection_unchanged() {
        let blobs = Arc::new(ReadOnlyBlobStore {
            inner: InMemoryBlobStore::new(),
            writable: std::sync::atomic::AtomicBool::new(true),
        });
        let store = UserStore::load(blobs.clone()).unwrap();
        store.add(rec("a@e.com", "Smith")).unwrap();
        blobs
            .writable
            .store(false, std::sync::atomic::Ordering::SeqCst);
        let before = store.list().unwrap();

        let err = store.add(rec("b@e.com", "Smith")).unwrap_err();
        assert!(matches!(err, CoreError::Repository(_)));
        assert!(store.add(rec("a@e.com", "Jones")).is_err());
        assert_eq!(store.list().unwrap(), before);

        assert!(store.delete("a@e.com").is_err());
        assert_eq!(store.list().unwrap(), before);

        let patch = UserPatch {
            city: Some("Pune".into()),
            ..Default::default()
        };
        assert!(store.update("a@e.com", &patch).is_err());
        assert_eq!(store.list().unwrap(), before);

        // Memory and blob store still agree.
        let reloaded = UserStore::load(blobs).unwrap();
        assert_eq!(reloaded.list().unwrap(), before);
    }

    #[test]
    fn corrupt_blob_fails_to_load() {
        let blobs = InMemoryBlobStore::new();
        blobs.set(USERS_KEY, "{not json").unwrap();
        let err = UserStore::load(blobs).err().unwrap();
        assert!(matches!(err, CoreError::Serialization(_)));
    }
}
