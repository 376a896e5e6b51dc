//! Basic-auth credentials
//!
//! Jira Cloud accepts the account email as the username and an API token
//! as the password. Token issuance and rotation happen outside this crate.

use reqwest::RequestBuilder;
use std::fmt;

/// Account email + API token pair
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    /// Account email (basic-auth username)
    pub email: String,
    /// API token (basic-auth password)
    api_token: String,
}

impl Credentials {
    /// Create credentials
    pub fn new(email: impl Into<String>, api_token: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            api_token: api_token.into(),
        }
    }

    /// Apply the credentials to a request
    pub fn apply(&self, req: RequestBuilder) -> RequestBuilder {
        req.basic_auth(&self.email, Some(&self.api_token))
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("api_token", &"***")
            .finish()
    }
}
