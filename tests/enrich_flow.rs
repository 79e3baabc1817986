//! End-to-end reconciliation tests against a mocked subscriber directory.

use authrecon::config::EnrichConfig;
use authrecon::enrich::{Engine, EngineOptions};
use authrecon::sheet::{self, Table};
use authrecon::types::DataLoadError;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use tokio::sync::Notify;
use wiremock::matchers::{body_string_contains, header, method};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Write an input spreadsheet shaped like the portal export: a banner
/// line, then the column header, then data rows.
fn write_portal_export(dir: &Path, usernames: &[&str]) -> PathBuf {
    let mut rows = vec![vec!["username".to_string(), "seen_at".to_string()]];
    for (i, username) in usernames.iter().enumerate() {
        rows.push(vec![(*username).to_string(), format!("2024-06-24 13:34:{i:02}")]);
    }
    let table = Table {
        headers: vec!["Authentication records".to_string()],
        rows,
    };
    let path = dir.join("records.xlsx");
    sheet::write(&table, &path).unwrap();
    path
}

fn full_record(username: &str, name: &str) -> Value {
    json!({
        "data": {
            "mk01": {
                "mk_conexoes": [{
                    "username": username,
                    "mk_pessoa": {
                        "nome_razaosocial": name,
                        "cpf": "123.456.789-00",
                        "email": format!("{username}@example.com"),
                        "fone01": "11 91234-5678",
                        "fone02": "11 95555-0000",
                        "cep": "01310-100",
                        "numero": "1578",
                        "complementoendereco": "ap 42"
                    },
                    "mk_logradouros": {
                        "logradouro": "Avenida Paulista",
                        "mk_bairros": {
                            "bairro": "Bela Vista",
                            "mk_cidades": {
                                "cidade": "São Paulo",
                                "mk_estado": { "siglaestado": "SP" }
                            }
                        }
                    }
                }]
            }
        }
    })
}

fn engine_for(server: &MockServer) -> Engine {
    let cfg = EnrichConfig {
        url: server.uri(),
        token: "test-token".to_string(),
    };
    Engine::new(&cfg, EngineOptions::default())
}

fn cancel() -> Arc<Notify> {
    Arc::new(Notify::new())
}

/// Enrichment column values of one output row, as (header, value) pairs.
fn enrichment_cells<'a>(table: &'a Table, row: usize) -> Vec<(&'a str, &'a str)> {
    let first = table.column_index("name").unwrap();
    table.headers[first..]
        .iter()
        .enumerate()
        .map(|(i, h)| (h.as_str(), table.cell(row, first + i).unwrap()))
        .collect()
}

#[tokio::test]
async fn partial_failure_keeps_every_row() {
    let dir = TempDir::new().unwrap();
    let input = write_portal_export(dir.path(), &["userA", "userB"]);
    let output = dir.path().join("records_enriched.xlsx");

    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(header("authorization", "Bearer test-token"))
        .and(body_string_contains("userA"))
        .respond_with(ResponseTemplate::new(200).set_body_json(full_record("userA", "Alice Andrade")))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(body_string_contains("userB"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let (path, summary) = engine_for(&server)
        .process(&input, &output, cancel())
        .await
        .expect("per-row failures must not abort the run");

    assert_eq!(summary.rows, 2);
    assert_eq!(summary.matched, 1);
    assert_eq!(summary.failed, 1);

    let table = sheet::load(&path, 0).unwrap();
    assert_eq!(table.rows.len(), 2, "row-count invariant");

    // userA: original columns intact, enrichment populated
    assert_eq!(table.cell(0, 0), Some("userA"));
    assert_eq!(table.cell(0, 1), Some("2024-06-24 13:34:00"));
    let name_col = table.column_index("name").unwrap();
    assert_eq!(table.cell(0, name_col), Some("Alice Andrade"));
    let state_col = table.column_index("state_code").unwrap();
    assert_eq!(table.cell(0, state_col), Some("SP"));

    // userB: every enrichment column present and empty
    assert_eq!(table.cell(1, 0), Some("userB"));
    for (column, value) in enrichment_cells(&table, 1) {
        assert_eq!(value, "", "column '{column}' must be empty");
    }
}

#[tokio::test]
async fn missing_identifier_column_fails_before_any_request() {
    let dir = TempDir::new().unwrap();
    let table = Table {
        headers: vec!["banner".to_string()],
        rows: vec![
            vec!["account".to_string(), "seen_at".to_string()],
            vec!["userA".to_string(), "x".to_string()],
        ],
    };
    let input = dir.path().join("records.xlsx");
    sheet::write(&table, &input).unwrap();
    let output = dir.path().join("out.xlsx");

    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(0)
        .mount(&server)
        .await;

    let err = engine_for(&server)
        .process(&input, &output, cancel())
        .await
        .unwrap_err();
    assert!(matches!(err, DataLoadError::MissingColumn(c) if c == "username"));
    assert!(!output.exists());
    server.verify().await;
}

#[tokio::test]
async fn mismatched_identifier_is_treated_as_no_match() {
    let dir = TempDir::new().unwrap();
    let input = write_portal_export(dir.path(), &["userC"]);
    let output = dir.path().join("out.xlsx");

    let server = MockServer::start().await;
    // The filter should guarantee the identifier matches; the merge step
    // re-checks and must reject this response.
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(full_record("someone-else", "Wrong Person")),
        )
        .mount(&server)
        .await;

    let (path, summary) = engine_for(&server)
        .process(&input, &output, cancel())
        .await
        .unwrap();
    assert_eq!(summary.unmatched, 1);
    assert_eq!(summary.matched, 0);

    let table = sheet::load(&path, 0).unwrap();
    for (column, value) in enrichment_cells(&table, 0) {
        assert_eq!(value, "", "column '{column}' must be empty");
    }
}

#[tokio::test]
async fn first_matching_connection_wins() {
    let dir = TempDir::new().unwrap();
    let input = write_portal_export(dir.path(), &["userD"]);
    let output = dir.path().join("out.xlsx");

    let mut body = full_record("userD", "First");
    let connections = &mut body["data"]["mk01"]["mk_conexoes"];
    let mut dup = connections[0].clone();
    dup["mk_pessoa"]["nome_razaosocial"] = json!("Second");
    connections.as_array_mut().unwrap().push(dup);

    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(&server)
        .await;

    let (path, _) = engine_for(&server)
        .process(&input, &output, cancel())
        .await
        .unwrap();
    let table = sheet::load(&path, 0).unwrap();
    let name_col = table.column_index("name").unwrap();
    assert_eq!(table.cell(0, name_col), Some("First"));
}

#[tokio::test]
async fn reprocessing_is_idempotent_against_a_stable_directory() {
    let dir = TempDir::new().unwrap();
    let input = write_portal_export(dir.path(), &["userA", "ghost"]);

    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_string_contains("userA"))
        .respond_with(ResponseTemplate::new(200).set_body_json(full_record("userA", "Alice Andrade")))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": {"mk01": {"mk_conexoes": []}}})))
        .mount(&server)
        .await;

    let engine = engine_for(&server);
    let out_a = dir.path().join("a.xlsx");
    let out_b = dir.path().join("b.xlsx");
    engine.process(&input, &out_a, cancel()).await.unwrap();
    engine.process(&input, &out_b, cancel()).await.unwrap();

    let a = sheet::load(&out_a, 0).unwrap();
    let b = sheet::load(&out_b, 0).unwrap();
    assert_eq!(a.headers, b.headers);
    assert_eq!(a.rows, b.rows);
}
