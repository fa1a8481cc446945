//! Calling user

/// The user on whose behalf a bundle is validated and imported.
///
/// Authentication happens before requests reach the deployer; this only
/// carries the identity through to the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub username: String,
}

impl User {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
        }
    }

    pub fn anonymous() -> Self {
        Self::new("anonymous")
    }
}

impl Default for User {
    fn default() -> Self {
        Self::anonymous()
    }
}
