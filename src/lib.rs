//! Async HTTP client for Trino-style paged statement execution.
//!
//! A statement is submitted with one POST; the server answers with a chain of
//! pages linked by continuation URIs. This crate follows the chain with a
//! background fetcher, buffers pages under a soft byte budget, decodes the
//! engine's JSON values into typed host values, and folds header-driven
//! session mutations back into the connection when a statement finishes.
//!
//! # Quick Start
//!
//! ```no_run
//! use trino_http::{Session, TrinoClient, Params, Value};
//!
//! # async fn example() -> trino_http::Result<()> {
//! let session = Session::builder()
//!     .server("http://localhost:8080")
//!     .user("alice")
//!     .catalog("tpch")
//!     .schema("sf1")
//!     .build()?;
//! let client = TrinoClient::new(session)?;
//!
//! let stream = client
//!     .query("select name from nation where regionkey = ?", [Value::BigInt(1)])
//!     .await?;
//! while let Some(page) = stream.next_page().await? {
//!     for row in page.rows()? {
//!         println!("{row:?}");
//!     }
//! }
//! # Ok(())
//! # }
//! ```

mod auth;
mod client;
mod decode;
mod error;
mod headers;
mod http;
mod options;
mod params;
mod queue;
mod row;
mod session;
mod stream;
mod value;
mod wire;

pub use auth::{Authenticator, BasicAuth, BearerAuth};
pub use client::{QueryState, TrinoClient};
pub use decode::{decode_value, parse_type, TrinoType};
pub use error::TrinoError;
pub use headers::HeaderNames;
pub use options::{ClientOptions, TlsOptions, DEFAULT_BUFFER_BYTES};
pub use params::Params;
pub use row::RowRef;
pub use session::{SelectedRole, Session, SessionBuilder, SessionDelta};
pub use stream::{Page, ResultStream};
pub use value::{IntervalYearToMonth, Value};
pub use wire::{
    Column, ErrorLocation, FailureInfo, QueryError, QueryResults, ServerInfo, StatementStats,
};

pub use tokio_util::sync::CancellationToken;

/// Crate-wide result type.
pub type Result<T> = std::result::Result<T, TrinoError>;
