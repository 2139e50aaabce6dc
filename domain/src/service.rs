use tracing::info;

use crate::store::UserStore;
use crate::validate::{validate, validate_record};
use crate::{BlobStore, CoreError, UserPatch, UserRecord, ValidationErrors};

/// Application service behind the profile form.
///
/// Every record entering the store passes the validation rules first; the
/// store itself trusts its input. Construct once per process and share it.
pub struct UserService<B: BlobStore> {
    store: UserStore<B>,
}

impl<B: BlobStore> UserService<B> {
    pub fn new(store: UserStore<B>) -> Self {
        Self { store }
    }

    /// Load the store from `blobs` and wrap it.
    pub fn load(blobs: B) -> Result<Self, CoreError> {
        Ok(Self::new(UserStore::load(blobs)?))
    }

    /// Validate and add a record, replacing any record with the same email.
    pub fn submit(&self, record: UserRecord) -> Result<UserRecord, CoreError> {
        validate_record(&record).map_err(CoreError::Validation)?;
        self.store.add(record.clone())?;
        info!(email = %record.email, "user submitted");
        Ok(record)
    }

    /// Apply `patch` to the record keyed by `email`.
    ///
    /// The merged record must pass validation as a whole before anything is
    /// written. An empty patch returns the stored record without a write.
    pub fn edit(&self, email: &str, patch: &UserPatch) -> Result<UserRecord, CoreError> {
        let mut merged = self.store.get(email)?.ok_or(CoreError::NotFound)?;
        if patch.is_empty() {
            return Ok(merged);
        }
        patch.apply_to(&mut merged);
        validate_record(&merged).map_err(CoreError::Validation)?;
        let updated = self.store.update(email, patch)?.ok_or(CoreError::NotFound)?;
        info!(email, new_email = %updated.email, "user edited");
        Ok(updated)
    }

    /// Delete the record keyed by `email`; absent emails are not an error.
    pub fn remove(&self, email: &str) -> Result<(), CoreError> {
        self.store.delete(email)?;
        info!(email, "user removed");
        Ok(())
    }

    pub fn list(&self) -> Result<Vec<UserRecord>, CoreError> {
        self.store.list()
    }

    pub fn get(&self, email: &str) -> Result<Option<UserRecord>, CoreError> {
        self.store.get(email)
    }

    /// Run the validation rules without touching the store.
    pub fn check(&self, candidate: &UserRecord) -> ValidationErrors {
        validate(candidate)
    }
}
