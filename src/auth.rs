//! Authentication capability consumed by the statement client.
//!
//! Concrete providers (LDAP, OAuth, token refresh) live outside this crate;
//! the core only needs to validate the collaborator before submission and let
//! it stamp each outgoing request.

use reqwest::RequestBuilder;

use crate::{Result, TrinoError};

/// Capability attached to every outgoing request.
pub trait Authenticator: Send + Sync {
    /// Identity this collaborator authenticates as, if it carries one.
    fn principal(&self) -> Option<&str> {
        None
    }

    /// Called once before the initial submission; reject stale credentials here.
    fn validate(&self) -> Result<()> {
        Ok(())
    }

    /// Adds credentials to an outgoing request.
    fn attach(&self, request: RequestBuilder) -> RequestBuilder;
}

/// Static bearer token.
pub struct BearerAuth {
    token: String,
}

impl BearerAuth {
    pub fn new(token: impl Into<String>) -> Self {
        Self { token: token.into() }
    }
}

impl Authenticator for BearerAuth {
    fn validate(&self) -> Result<()> {
        if self.token.trim().is_empty() {
            return Err(TrinoError::Usage("bearer token is empty".to_owned()));
        }
        Ok(())
    }

    fn attach(&self, request: RequestBuilder) -> RequestBuilder {
        request.bearer_auth(&self.token)
    }
}

/// HTTP basic credentials.
pub struct BasicAuth {
    user: String,
    password: Option<String>,
}

impl BasicAuth {
    pub fn new(user: impl Into<String>, password: Option<String>) -> Self {
        Self {
            user: user.into(),
            password,
        }
    }
}

impl Authenticator for BasicAuth {
    fn principal(&self) -> Option<&str> {
        Some(&self.user)
    }

    fn validate(&self) -> Result<()> {
        if self.user.is_empty() {
            return Err(TrinoError::Usage("basic auth user is empty".to_owned()));
        }
        Ok(())
    }

    fn attach(&self, request: RequestBuilder) -> RequestBuilder {
        request.basic_auth(&self.user, self.password.as_deref())
    }
}
