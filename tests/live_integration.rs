//! Smoke tests against a real coordinator.
//!
//! Set `TRINO_URL` (e.g. `http://localhost:8080`) to enable; the tests skip
//! silently otherwise.

use trino_http::{Session, TrinoClient, Value};

fn live_client() -> Option<TrinoClient> {
    let url = std::env::var("TRINO_URL").ok()?;
    let session = Session::builder()
        .server(url)
        .user("trino-http-tests")
        .catalog("system")
        .schema("runtime")
        .build()
        .expect("live session must build");
    Some(TrinoClient::new(session).expect("live client must build"))
}

#[tokio::test]
async fn live_select_one() {
    let Some(client) = live_client() else {
        eprintln!("skipping live_select_one: TRINO_URL not set");
        return;
    };

    let stream = client.query("select 1", ()).await.expect("query must start");
    let mut rows = Vec::new();
    while let Some(page) = stream.next_page().await.expect("pages must stream") {
        rows.extend(page.rows().expect("rows must decode"));
    }
    assert_eq!(rows, vec![vec![Value::BigInt(1)]]);
}

#[tokio::test]
async fn live_server_info() {
    let Some(client) = live_client() else {
        eprintln!("skipping live_server_info: TRINO_URL not set");
        return;
    };

    let info = client.server_info().await.expect("info must be reachable");
    assert!(!info.node_version.version.is_empty());
}
