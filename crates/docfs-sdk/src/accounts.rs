use std::sync::Arc;

use docfs_lock::NamedLockManager;
use docfs_store::{DocumentStore, Filter, Transaction};
use docfs_tree::Directories;
use docfs_types::{Element, Group, ObjectId, User, UserRole};
use tracing::info;

use crate::error::{SdkError, SdkResult};

const ACCOUNTS_LOCK: &str = "Accounts";

/// User and group records.
///
/// Registering a user gives them a home directory under the root. Nothing
/// in docfs checks these records; they are kept for the front end.
pub struct Accounts<S> {
    store: Arc<S>,
    locks: NamedLockManager,
    directories: Directories<S>,
}

impl<S> Clone for Accounts<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            locks: self.locks.clone(),
            directories: self.directories.clone(),
        }
    }
}

impl<S: DocumentStore> Accounts<S> {
    pub fn new(store: Arc<S>, locks: NamedLockManager, directories: Directories<S>) -> Self {
        Self {
            store,
            locks,
            directories,
        }
    }

    pub async fn register_user(&self, username: &str, role: UserRole) -> SdkResult<User> {
        let _guard = self.locks.acquire_writer(ACCOUNTS_LOCK).await;
        if self.user_by_name(username).await?.is_some() {
            return Err(SdkError::Account(format!("username {username:?} is taken")));
        }
        // Home directory and user record land in one commit.
        let root = self.directories.root_id().clone();
        let home = Element::directory(root, username);
        let user = User::new(username, home.id.clone(), role);
        let mut tx = Transaction::new();
        tx.insert(&user)?;
        self.directories.insert_with(home, tx).await?;
        info!(user = %user.username, home = %user.root_directory, "user registered");
        Ok(user)
    }

    pub async fn user(&self, id: &ObjectId) -> SdkResult<Option<User>> {
        Ok(self.store.find_one::<User>(&Filter::by_id(id)).await?)
    }

    pub async fn user_by_name(&self, username: &str) -> SdkResult<Option<User>> {
        let username = username.to_string();
        Ok(self
            .store
            .find_one(&Filter::new(move |u: &User| u.username == username))
            .await?)
    }

    pub async fn users(&self) -> SdkResult<Vec<User>> {
        Ok(self.store.find(&Filter::<User>::all()).await?)
    }

    pub async fn create_group(&self, name: &str) -> SdkResult<Group> {
        let _guard = self.locks.acquire_writer(ACCOUNTS_LOCK).await;
        if self.group_by_name(name).await?.is_some() {
            return Err(SdkError::Account(format!("group {name:?} already exists")));
        }
        let group = Group::new(name);
        self.store.insert_one(&group).await?;
        Ok(group)
    }

    pub async fn group_by_name(&self, name: &str) -> SdkResult<Option<Group>> {
        let name = name.to_string();
        Ok(self
            .store
            .find_one(&Filter::new(move |g: &Group| g.name == name))
            .await?)
    }

    /// Add `username` to `group`, recording the membership on both records.
    pub async fn add_member(&self, group: &str, username: &str) -> SdkResult<Group> {
        let _guard = self.locks.acquire_writer(ACCOUNTS_LOCK).await;
        let mut g = self
            .group_by_name(group)
            .await?
            .ok_or_else(|| SdkError::Account(format!("no group {group:?}")))?;
        let mut user = self
            .user_by_name(username)
            .await?
            .ok_or_else(|| SdkError::Account(format!("no user {username:?}")))?;
        if !g.add_member(username) {
            return Ok(g);
        }
        if !user.member_of.iter().any(|m| m == group) {
            user.member_of.push(group.to_string());
        }
        let mut tx = Transaction::new();
        tx.replace(&g)?;
        tx.replace(&user)?;
        self.store.commit(tx).await?;
        Ok(g)
    }
}
