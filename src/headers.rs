//! Protocol header names, namespaced per server variant.
//!
//! Trino and its forks use the same header set under different prefixes
//! (`X-Trino-…`, `X-Presto-…`). The namespace is configurable through
//! [`crate::ClientOptions`]; every name below is derived from it.

/// Full set of request/response header names for one protocol namespace.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HeaderNames {
    pub user: String,
    pub source: String,
    pub client_info: String,
    pub client_tags: String,
    pub trace_token: String,
    pub catalog: String,
    pub schema: String,
    pub path: String,
    pub time_zone: String,
    pub language: String,
    pub session: String,
    pub resource_estimate: String,
    pub role: String,
    pub extra_credential: String,
    pub prepared_statement: String,
    pub transaction_id: String,
    pub client_capabilities: String,

    pub set_catalog: String,
    pub set_schema: String,
    pub set_path: String,
    pub set_session: String,
    pub clear_session: String,
    pub set_authorization_user: String,
    pub reset_authorization_user: String,
    pub added_prepare: String,
    pub deallocated_prepare: String,
    pub started_transaction_id: String,
    pub clear_transaction_id: String,
}

/// Default namespace prefix.
pub const DEFAULT_NAMESPACE: &str = "X-Trino";

impl HeaderNames {
    /// Builds the header set for a namespace prefix such as `X-Trino`.
    pub fn new(namespace: &str) -> Self {
        let name = |suffix: &str| format!("{namespace}-{suffix}");
        Self {
            user: name("User"),
            source: name("Source"),
            client_info: name("Client-Info"),
            client_tags: name("Client-Tags"),
            trace_token: name("Trace-Token"),
            catalog: name("Catalog"),
            schema: name("Schema"),
            path: name("Path"),
            time_zone: name("Time-Zone"),
            language: name("Language"),
            session: name("Session"),
            resource_estimate: name("Resource-Estimate"),
            role: name("Role"),
            extra_credential: name("Extra-Credential"),
            prepared_statement: name("Prepared-Statement"),
            transaction_id: name("Transaction-Id"),
            client_capabilities: name("Client-Capabilities"),

            set_catalog: name("Set-Catalog"),
            set_schema: name("Set-Schema"),
            set_path: name("Set-Path"),
            set_session: name("Set-Session"),
            clear_session: name("Clear-Session"),
            set_authorization_user: name("Set-Authorization-User"),
            reset_authorization_user: name("Reset-Authorization-User"),
            added_prepare: name("Added-Prepare"),
            deallocated_prepare: name("Deallocated-Prepare"),
            started_transaction_id: name("Started-Transaction-Id"),
            clear_transaction_id: name("Clear-Transaction-Id"),
        }
    }
}

impl Default for HeaderNames {
    fn default() -> Self {
        Self::new(DEFAULT_NAMESPACE)
    }
}

#[cfg(test)]
mod tests {
    use super::{HeaderNames, DEFAULT_NAMESPACE};

    #[test]
    fn default_namespace_is_trino() {
        let names = HeaderNames::default();
        assert_eq!(names.user, "X-Trino-User");
        assert_eq!(names.prepared_statement, "X-Trino-Prepared-Statement");
        assert_eq!(names.reset_authorization_user, "X-Trino-Reset-Authorization-User");
        assert_eq!(DEFAULT_NAMESPACE, "X-Trino");
    }

    #[test]
    fn custom_namespace() {
        let names = HeaderNames::new("X-Presto");
        assert_eq!(names.set_catalog, "X-Presto-Set-Catalog");
        assert_eq!(names.deallocated_prepare, "X-Presto-Deallocated-Prepare");
    }
}
