//! Group entity

/// A named group: membership and ACL references, both by name.
///
/// Member and ACL names are validated against the live user map and
/// [`AclContainer`](crate::AclContainer) when the database is loaded.
#[derive(Clone, Debug, PartialEq)]
pub struct Group {
    name: String,
    pub user_names: Vec<String>,
    pub acl_names: Vec<String>,
}

impl Group {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            user_names: Vec::new(),
            acl_names: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn add_member(&mut self, user: impl Into<String>) {
        let user = user.into();
        if !self.user_names.contains(&user) {
            self.user_names.push(user);
        }
    }

    /// Returns true if the member was present
    pub fn remove_member(&mut self, user: &str) -> bool {
        let before = self.user_names.len();
        self.user_names.retain(|u| u != user);
        self.user_names.len() != before
    }

    pub fn has_member(&self, user: &str) -> bool {
        self.user_names.iter().any(|u| u == user)
    }
}
