//! Access-control records.
//!
//! These are stored alongside the namespace but no operation consults them;
//! enforcement belongs to whatever front end sits on top of docfs.

use serde::{Deserialize, Serialize};

use crate::id::ObjectId;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UserRole {
    User,
    Admin,
}

/// A user account. Usernames are unique; the id is the record key.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: ObjectId,
    pub username: String,
    pub root_directory: ObjectId,
    pub role: UserRole,
    pub member_of: Vec<String>,
    pub permissions: Vec<String>,
}

impl User {
    pub fn new(username: impl Into<String>, root_directory: ObjectId, role: UserRole) -> Self {
        Self {
            id: ObjectId::generate(),
            username: username.into(),
            root_directory,
            role,
            member_of: Vec::new(),
            permissions: Vec::new(),
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }
}

/// A named group of usernames.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub id: ObjectId,
    pub name: String,
    pub members: Vec<String>,
}

impl Group {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: ObjectId::generate(),
            name: name.into(),
            members: Vec::new(),
        }
    }

    /// Add a member; returns `false` if already present.
    pub fn add_member(&mut self, username: &str) -> bool {
        if self.members.iter().any(|m| m == username) {
            return false;
        }
        self.members.push(username.to_string());
        true
    }
}
