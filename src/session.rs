//! Per-connection session state and the header-driven mutation protocol.
//!
//! A [`Session`] is immutable while a statement runs; the statement client
//! accumulates a [`SessionDelta`] from response headers and applies it as one
//! atomic [`Session::merge`] when the statement finishes.

use std::collections::HashMap;
use std::fmt;

use crate::{Result, TrinoError};

/// Connection properties carried on every request.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Session {
    pub server: String,
    pub user: Option<String>,
    pub authorization_user: Option<String>,
    pub source: Option<String>,
    pub client_info: Option<String>,
    pub client_tags: Vec<String>,
    pub trace_token: Option<String>,
    pub catalog: Option<String>,
    pub schema: Option<String>,
    pub path: Option<String>,
    pub time_zone: Option<String>,
    pub locale: Option<String>,
    pub transaction_id: Option<String>,
    pub properties: HashMap<String, String>,
    pub prepared_statements: HashMap<String, String>,
    pub resource_estimates: HashMap<String, String>,
    pub extra_credentials: HashMap<String, String>,
    pub roles: HashMap<String, SelectedRole>,
    pub extra_headers: Vec<(String, String)>,
}

impl Session {
    pub fn builder() -> SessionBuilder {
        SessionBuilder::default()
    }

    /// Returns a new session with `delta` applied.
    ///
    /// Catalog, schema, path, and authorization user are replaced when the
    /// delta sets them. Added session properties and prepared statements never
    /// overwrite existing keys; deallocated names are removed afterwards, so a
    /// name both added and deallocated in one statement ends up absent.
    pub fn merge(&self, delta: &SessionDelta) -> Session {
        let mut next = self.clone();

        if let Some(catalog) = &delta.set_catalog {
            next.catalog = Some(catalog.clone());
        }
        if let Some(schema) = &delta.set_schema {
            next.schema = Some(schema.clone());
        }
        if let Some(path) = &delta.set_path {
            next.path = Some(path.clone());
        }

        if delta.reset_authorization_user {
            next.authorization_user = None;
        } else if let Some(user) = &delta.set_authorization_user {
            next.authorization_user = Some(user.clone());
        }

        for name in &delta.clear_properties {
            next.properties.remove(name);
        }
        for (key, value) in &delta.set_properties {
            next.properties.entry(key.clone()).or_insert_with(|| value.clone());
        }

        for (name, sql) in &delta.added_prepared {
            next.prepared_statements
                .entry(name.clone())
                .or_insert_with(|| sql.clone());
        }
        for name in &delta.deallocated_prepared {
            next.prepared_statements.remove(name);
        }

        if delta.clear_transaction_id {
            next.transaction_id = None;
        } else if let Some(id) = &delta.started_transaction_id {
            next.transaction_id = Some(id.clone());
        }

        next
    }
}

/// Builder for [`Session`] instances.
#[derive(Debug, Default)]
pub struct SessionBuilder {
    session: Session,
}

impl SessionBuilder {
    /// Server base URL, e.g. `http://localhost:8080`.
    pub fn server(mut self, url: impl Into<String>) -> Self {
        self.session.server = url.into();
        self
    }

    pub fn user(mut self, user: impl Into<String>) -> Self {
        self.session.user = Some(user.into());
        self
    }

    pub fn source(mut self, source: impl Into<String>) -> Self {
        self.session.source = Some(source.into());
        self
    }

    pub fn client_info(mut self, info: impl Into<String>) -> Self {
        self.session.client_info = Some(info.into());
        self
    }

    pub fn client_tag(mut self, tag: impl Into<String>) -> Self {
        self.session.client_tags.push(tag.into());
        self
    }

    pub fn trace_token(mut self, token: impl Into<String>) -> Self {
        self.session.trace_token = Some(token.into());
        self
    }

    pub fn catalog(mut self, catalog: impl Into<String>) -> Self {
        self.session.catalog = Some(catalog.into());
        self
    }

    pub fn schema(mut self, schema: impl Into<String>) -> Self {
        self.session.schema = Some(schema.into());
        self
    }

    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.session.path = Some(path.into());
        self
    }

    /// IANA time zone name sent with every statement.
    pub fn time_zone(mut self, zone: impl Into<String>) -> Self {
        self.session.time_zone = Some(zone.into());
        self
    }

    pub fn locale(mut self, locale: impl Into<String>) -> Self {
        self.session.locale = Some(locale.into());
        self
    }

    pub fn transaction_id(mut self, id: impl Into<String>) -> Self {
        self.session.transaction_id = Some(id.into());
        self
    }

    pub fn property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.session.properties.insert(key.into(), value.into());
        self
    }

    pub fn prepared_statement(mut self, name: impl Into<String>, sql: impl Into<String>) -> Self {
        self.session.prepared_statements.insert(name.into(), sql.into());
        self
    }

    pub fn resource_estimate(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.session.resource_estimates.insert(key.into(), value.into());
        self
    }

    pub fn extra_credential(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.session.extra_credentials.insert(key.into(), value.into());
        self
    }

    pub fn role(mut self, catalog: impl Into<String>, role: SelectedRole) -> Self {
        self.session.roles.insert(catalog.into(), role);
        self
    }

    /// Arbitrary additional header attached to every request.
    pub fn extra_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.session.extra_headers.push((name.into(), value.into()));
        self
    }

    pub fn build(self) -> Result<Session> {
        let session = self.session;
        if session.server.is_empty() {
            return Err(TrinoError::Usage("server URL is required".to_owned()));
        }
        for key in session.properties.keys() {
            if key.is_empty() || key.contains('=') {
                return Err(TrinoError::Usage(format!(
                    "invalid session property name '{key}'"
                )));
            }
        }
        for tag in &session.client_tags {
            if tag.contains(',') {
                return Err(TrinoError::Usage(format!(
                    "client tag '{tag}' must not contain a comma"
                )));
            }
        }
        Ok(session)
    }
}

/// Role selection for one catalog.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SelectedRole {
    All,
    None,
    Role(String),
}

impl fmt::Display for SelectedRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => f.write_str("ALL"),
            Self::None => f.write_str("NONE"),
            Self::Role(name) => write!(f, "ROLE:{name}"),
        }
    }
}

/// Session mutations parsed from response headers during one statement.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SessionDelta {
    pub set_catalog: Option<String>,
    pub set_schema: Option<String>,
    pub set_path: Option<String>,
    pub set_authorization_user: Option<String>,
    pub reset_authorization_user: bool,
    pub set_properties: HashMap<String, String>,
    pub clear_properties: Vec<String>,
    pub added_prepared: HashMap<String, String>,
    pub deallocated_prepared: Vec<String>,
    pub started_transaction_id: Option<String>,
    pub clear_transaction_id: bool,
}

impl SessionDelta {
    pub fn is_empty(&self) -> bool {
        self == &SessionDelta::default()
    }
}

#[cfg(test)]
mod tests {
    use super::{SelectedRole, Session, SessionDelta};

    fn base_session() -> Session {
        Session::builder()
            .server("http://localhost:8080")
            .user("alice")
            .catalog("memory")
            .property("query_max_run_time", "2h")
            .prepared_statement("q1", "select 1")
            .build()
            .expect("must build")
    }

    #[test]
    fn merge_empty_delta_is_identity() {
        let session = base_session();
        assert_eq!(session.merge(&SessionDelta::default()), session);
    }

    #[test]
    fn merge_replaces_catalog_schema_path() {
        let delta = SessionDelta {
            set_catalog: Some("tpch".to_owned()),
            set_schema: Some("sf10".to_owned()),
            set_path: Some("a.b".to_owned()),
            ..SessionDelta::default()
        };
        let merged = base_session().merge(&delta);
        assert_eq!(merged.catalog.as_deref(), Some("tpch"));
        assert_eq!(merged.schema.as_deref(), Some("sf10"));
        assert_eq!(merged.path.as_deref(), Some("a.b"));
    }

    #[test]
    fn merge_does_not_overwrite_existing_property() {
        let delta = SessionDelta {
            set_properties: [
                ("query_max_run_time".to_owned(), "1h".to_owned()),
                ("writer_min_size".to_owned(), "64MB".to_owned()),
            ]
            .into(),
            ..SessionDelta::default()
        };
        let merged = base_session().merge(&delta);
        assert_eq!(merged.properties["query_max_run_time"], "2h");
        assert_eq!(merged.properties["writer_min_size"], "64MB");
    }

    #[test]
    fn merge_removes_deallocated_prepared_even_if_added() {
        let delta = SessionDelta {
            added_prepared: [
                ("q1".to_owned(), "select 2".to_owned()),
                ("q2".to_owned(), "select 3".to_owned()),
            ]
            .into(),
            deallocated_prepared: vec!["q2".to_owned()],
            ..SessionDelta::default()
        };
        let merged = base_session().merge(&delta);
        assert_eq!(merged.prepared_statements["q1"], "select 1");
        assert!(!merged.prepared_statements.contains_key("q2"));
    }

    #[test]
    fn merge_reset_wins_over_set_authorization_user() {
        let delta = SessionDelta {
            set_authorization_user: Some("bob".to_owned()),
            reset_authorization_user: true,
            ..SessionDelta::default()
        };
        let merged = base_session().merge(&delta);
        assert!(merged.authorization_user.is_none());
    }

    #[test]
    fn merge_tracks_transaction_lifecycle() {
        let started = base_session().merge(&SessionDelta {
            started_transaction_id: Some("txn1".to_owned()),
            ..SessionDelta::default()
        });
        assert_eq!(started.transaction_id.as_deref(), Some("txn1"));

        let cleared = started.merge(&SessionDelta {
            clear_transaction_id: true,
            ..SessionDelta::default()
        });
        assert!(cleared.transaction_id.is_none());
    }

    #[test]
    fn builder_rejects_bad_inputs() {
        assert!(Session::builder().build().is_err());
        assert!(Session::builder()
            .server("http://h")
            .property("a=b", "c")
            .build()
            .is_err());
        assert!(Session::builder()
            .server("http://h")
            .client_tag("one,two")
            .build()
            .is_err());
    }

    #[test]
    fn selected_role_wire_form() {
        assert_eq!(SelectedRole::All.to_string(), "ALL");
        assert_eq!(SelectedRole::None.to_string(), "NONE");
        assert_eq!(SelectedRole::Role("admin".to_owned()).to_string(), "ROLE:admin");
    }
}
