//! End-to-end runs: servers file, probing, expectations, report.

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use caldav_server_tester::caldav::fixtures::TEST_CALENDAR_ID;
use caldav_server_tester::caldav::{DavClient, MockDavClient};
use caldav_server_tester::cli::{CheckCommand, CheckOptions};
use caldav_server_tester::config::{ResolvedServer, ServerSelection};
use caldav_server_tester::report::{ReportFormat, ReportOutput};
use caldav_server_tester::ui::{MockUI, OutputMode};
use caldav_server_tester::{CheckerError, DebugMode, QuirkChecker};
use tempfile::TempDir;

const SERVERS: &str = r#"
profiles:
  no-substring:
    search.text.substring: false
  tidy:
    test-calendar.compatibility-tests:
      cleanup: true
servers:
  strict:
    url: mock://caldav.test/
    features: no-substring
  tidy:
    url: mock://caldav.test/
    features: tidy
"#;

fn servers_file(temp: &TempDir) -> PathBuf {
    let path = temp.path().join("servers.yml");
    fs::write(&path, SERVERS).unwrap();
    path
}

fn command(config: PathBuf, server: &str, mock: &MockDavClient, options: CheckOptions) -> CheckCommand {
    let mock = mock.clone();
    CheckCommand::new(CheckOptions {
        config: Some(config),
        selection: ServerSelection {
            name: Some(server.to_string()),
            ..Default::default()
        },
        settle_delay: Duration::ZERO,
        format: ReportFormat::Value,
        ..options
    })
    .with_client_factory(Box::new(move |resolved: &ResolvedServer| {
        let client = mock
            .clone()
            .with_features(resolved.features.clone())
            .with_name(&resolved.name);
        Ok(Box::new(client) as Box<dyn DavClient>)
    }))
}

fn value(output: ReportOutput) -> serde_json::Value {
    match output {
        ReportOutput::Value(value) => value,
        ReportOutput::Json(text) => serde_json::from_str(&text).unwrap(),
    }
}

#[test]
fn compact_report_snapshot() {
    let mut checker =
        QuirkChecker::new(Box::new(MockDavClient::new())).with_settle_delay(Duration::ZERO);
    checker.check_one("get-current-user-principal").unwrap();
    let report = value(checker.report(false, ReportFormat::Value).unwrap());

    insta::assert_json_snapshot!(report, {
        ".ts" => "[ts]",
        ".tool_version" => "[version]",
    }, @r###"
    {
      "features": {
        "get-current-user-principal": {
          "support": "full"
        }
      },
      "name": "mock",
      "tool_version": "[version]",
      "ts": "[ts]",
      "url": "mock://caldav.test/"
    }
    "###);
}

#[test]
fn json_report_uses_four_space_indent() {
    let mut checker =
        QuirkChecker::new(Box::new(MockDavClient::new())).with_settle_delay(Duration::ZERO);
    checker.check_one("get-current-user-principal").unwrap();
    let ReportOutput::Json(text) = checker.report(false, ReportFormat::Json).unwrap() else {
        panic!("expected JSON text");
    };
    assert!(text.contains("\n    \"tool_version\": "));
    assert!(text.contains(&format!("\"{}\"", env!("CARGO_PKG_VERSION"))));
}

#[test]
fn verbose_report_lists_mismatches() {
    let temp = TempDir::new().unwrap();
    let mock = MockDavClient::new();
    let mut ui = MockUI::new();
    let options = CheckOptions {
        run_checks: vec!["search".to_string()],
        output_mode: OutputMode::Verbose,
        ..Default::default()
    };

    let report = value(
        command(servers_file(&temp), "strict", &mock, options)
            .run(&mut ui)
            .unwrap(),
    );

    assert_eq!(report["name"], "strict");
    let substring = report["mismatches"]
        .as_array()
        .unwrap()
        .iter()
        .find(|m| m["feature"] == "search.text.substring")
        .unwrap();
    assert_eq!(substring["expected"]["support"], "unsupported");
    assert_eq!(substring["observed"]["support"], "full");
    let checks_run: Vec<&str> = report["checks_run"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|c| c.as_str())
        .collect();
    assert_eq!(checks_run.last(), Some(&"search"));
}

#[test]
fn assert_mode_stops_at_first_mismatch() {
    let temp = TempDir::new().unwrap();
    let mock = MockDavClient::new();
    let mut ui = MockUI::new();
    let options = CheckOptions {
        run_checks: vec!["search".to_string()],
        debug_mode: DebugMode::Assert,
        ..Default::default()
    };

    let err = command(servers_file(&temp), "strict", &mock, options)
        .run(&mut ui)
        .unwrap_err();
    match err {
        CheckerError::ExpectationMismatch { feature, .. } => {
            assert_eq!(feature, "search.text.substring")
        }
        other => panic!("expected a mismatch, got {:?}", other),
    }
}

#[test]
fn test_data_is_kept_by_default() {
    let temp = TempDir::new().unwrap();
    let mock = MockDavClient::new();
    let mut ui = MockUI::new();
    let options = CheckOptions {
        run_checks: vec!["prepare-calendar".to_string()],
        ..Default::default()
    };

    command(servers_file(&temp), "strict", &mock, options)
        .run(&mut ui)
        .unwrap();
    assert!(!mock.object_uids(TEST_CALENDAR_ID).is_empty());
}

#[test]
fn cleanup_policy_removes_test_data() {
    let temp = TempDir::new().unwrap();
    let mock = MockDavClient::new();
    let mut ui = MockUI::new();
    let options = CheckOptions {
        run_checks: vec!["prepare-calendar".to_string()],
        ..Default::default()
    };

    command(servers_file(&temp), "tidy", &mock, options)
        .run(&mut ui)
        .unwrap();
    assert!(mock.object_uids(TEST_CALENDAR_ID).is_empty());
}

#[test]
fn unknown_server_name_is_an_error() {
    let temp = TempDir::new().unwrap();
    let mock = MockDavClient::new();
    let mut ui = MockUI::new();

    let err = command(servers_file(&temp), "nope", &mock, CheckOptions::default())
        .run(&mut ui)
        .unwrap_err();
    assert!(matches!(err, CheckerError::UnknownServer { .. }));
}
