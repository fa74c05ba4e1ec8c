//! Integration tests for ingest and the CLI surface

mod common;

use common::{forty_endpoint_spec, specdex_cmd, write_spec};
use predicates::prelude::*;

#[test]
fn test_cli_ingest_and_status() {
    let work = tempfile::tempdir().unwrap();
    let spec = write_spec(work.path());
    let store = work.path().join("store");

    specdex_cmd()
        .args(["ingest"])
        .arg(&spec)
        .args(["--out"])
        .arg(&store)
        .assert()
        .success()
        .stderr(predicate::str::contains("Advertising API"))
        .stderr(predicate::str::contains("40 endpoints"));

    specdex_cmd()
        .arg("status")
        .arg(&store)
        .assert()
        .success()
        .stdout(predicate::str::contains("Endpoints:  40"))
        .stdout(predicate::str::contains("Categories: 6"));
}

#[test]
fn test_cli_status_json() {
    let work = tempfile::tempdir().unwrap();
    let spec = write_spec(work.path());
    let store = work.path().join("store");

    specdex_cmd()
        .arg("ingest")
        .arg(&spec)
        .arg("--out")
        .arg(&store)
        .assert()
        .success();

    let output = specdex_cmd()
        .args(["status", "--json"])
        .arg(&store)
        .output()
        .unwrap();
    assert!(output.status.success());

    let status: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(status["endpoints"], 40);
    assert_eq!(status["schemas"], 6);
    assert_eq!(status["name"], "advertising");
    assert_eq!(status["title"], "Advertising API");
}

#[test]
fn test_cli_reingest_requires_overwrite() {
    let work = tempfile::tempdir().unwrap();
    let spec = write_spec(work.path());
    let store = work.path().join("store");

    specdex_cmd()
        .arg("ingest")
        .arg(&spec)
        .arg("--out")
        .arg(&store)
        .assert()
        .success();

    specdex_cmd()
        .arg("ingest")
        .arg(&spec)
        .arg("--out")
        .arg(&store)
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));

    specdex_cmd()
        .arg("ingest")
        .arg(&spec)
        .arg("--out")
        .arg(&store)
        .arg("--overwrite")
        .assert()
        .success()
        .stderr(predicate::str::contains("(replaced)"));
}

#[test]
fn test_cli_rejects_malformed_spec() {
    let work = tempfile::tempdir().unwrap();
    let spec = work.path().join("broken.json");
    std::fs::write(&spec, b"{\"openapi\": \"3.0").unwrap();

    specdex_cmd()
        .arg("ingest")
        .arg(&spec)
        .arg("--out")
        .arg(work.path().join("store"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid specification"));
}

#[test]
fn test_cli_ingests_yaml() {
    let work = tempfile::tempdir().unwrap();
    let spec = work.path().join("api.yaml");
    std::fs::write(
        &spec,
        "openapi: 3.0.0\ninfo:\n  title: Yaml API\n  version: '1'\npaths:\n  /things:\n    get:\n      summary: List things\n      responses: {}\n",
    )
    .unwrap();

    specdex_cmd()
        .arg("ingest")
        .arg(&spec)
        .arg("--out")
        .arg(work.path().join("store"))
        .assert()
        .success()
        .stderr(predicate::str::contains("Yaml API"));
}

#[test]
fn test_cli_status_on_missing_store_fails() {
    let work = tempfile::tempdir().unwrap();
    specdex_cmd()
        .arg("status")
        .arg(work.path().join("nope"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("no store"));
}

/// Re-ingesting the same specification yields equivalent contents modulo
/// timestamps and surrogate keys.
#[test]
fn test_reingest_is_content_equivalent() {
    use specdex::config::Config;
    use specdex::store::{db, Store};

    let dir = tempfile::tempdir().unwrap();
    let store = Store::create(dir.path(), &Config::default()).unwrap();
    let bytes = serde_json::to_vec(&forty_endpoint_spec()).unwrap();

    store
        .ingest_sync("ads", bytes.as_slice(), false)
        .unwrap();
    let before = dump_contents(dir.path());

    store.ingest_sync("ads", bytes.as_slice(), true).unwrap();
    let after = dump_contents(dir.path());

    assert_eq!(before, after);

    fn dump_contents(dir: &std::path::Path) -> Vec<String> {
        let conn = db::open_reader(dir).unwrap();
        let mut rows = Vec::new();

        let mut stmt = conn
            .prepare(
                "SELECT path, method, summary, category, category_group, tags_json,
                        parameters_json, responses_json
                 FROM endpoints ORDER BY path, method",
            )
            .unwrap();
        let endpoint_rows = stmt
            .query_map([], |row| {
                Ok(format!(
                    "{}|{}|{:?}|{}|{:?}|{}|{}|{}",
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Option<String>>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, Option<String>>(4)?,
                    row.get::<_, String>(5)?,
                    row.get::<_, String>(6)?,
                    row.get::<_, String>(7)?,
                ))
            })
            .unwrap();
        rows.extend(endpoint_rows.map(Result::unwrap));

        let mut stmt = conn
            .prepare("SELECT name, body_json, references_json FROM schemas ORDER BY name")
            .unwrap();
        let schema_rows = stmt
            .query_map([], |row| {
                Ok(format!(
                    "{}|{}|{}",
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })
            .unwrap();
        rows.extend(schema_rows.map(Result::unwrap));

        let mut stmt = conn
            .prepare(
                "SELECT name, endpoint_count, methods_json FROM endpoint_categories ORDER BY name",
            )
            .unwrap();
        let category_rows = stmt
            .query_map([], |row| {
                Ok(format!(
                    "{}|{}|{}",
                    row.get::<_, String>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })
            .unwrap();
        rows.extend(category_rows.map(Result::unwrap));

        rows
    }
}

/// Parse -> persist -> read back: the stored records equal what the parser
/// emitted.
#[test]
fn test_parse_persist_read_back_round_trip() {
    use specdex::config::Config;
    use specdex::openapi::{parse_stream, ParsedRecord, VecSink};
    use specdex::store::{db, repo, Store};

    let bytes = serde_json::to_vec(&forty_endpoint_spec()).unwrap();

    let mut sink = VecSink::default();
    parse_stream(bytes.as_slice(), &mut sink).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let store = Store::create(dir.path(), &Config::default()).unwrap();
    store.ingest_sync("ads", bytes.as_slice(), false).unwrap();

    let conn = db::open_reader(dir.path()).unwrap();
    let api = repo::active_api(&conn).unwrap();

    for record in &sink.records {
        match record {
            ParsedRecord::Endpoint(parsed) => {
                let stored = repo::endpoint_by_path(&conn, api.id, &parsed.path)
                    .unwrap()
                    .unwrap_or_else(|| panic!("endpoint {} not persisted", parsed.path));
                assert_eq!(stored.record.method, parsed.method);
                assert_eq!(stored.record.summary, parsed.summary);
                assert_eq!(stored.record.tags, parsed.tags);
                assert_eq!(stored.record.parameters.len(), parsed.parameters.len());
            }
            ParsedRecord::Schema(parsed) => {
                let stored = repo::schema_by_name(&conn, api.id, &parsed.name)
                    .unwrap()
                    .unwrap_or_else(|| panic!("schema {} not persisted", parsed.name));
                assert_eq!(stored.body, parsed.body);
                assert_eq!(stored.references, parsed.references);
            }
            _ => {}
        }
    }
}
