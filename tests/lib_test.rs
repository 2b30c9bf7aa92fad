//! Library integration tests.

use std::path::Path;

use caldav_server_tester::config::{parse_servers, resolve_server, validate_servers, ServerSelection};
use caldav_server_tester::{CheckerError, FeatureSet, Support};

#[test]
fn error_types_are_public() {
    let err = CheckerError::UnknownCheck {
        name: "teleport".into(),
    };
    assert!(err.to_string().contains("teleport"));
}

#[test]
fn result_type_alias_is_public() {
    fn test_fn() -> caldav_server_tester::Result<()> {
        Ok(())
    }
    assert!(test_fn().is_ok());
}

#[test]
fn cli_types_are_public() {
    use caldav_server_tester::cli::Cli;
    use caldav_server_tester::DebugMode;
    use clap::Parser;

    let cli = Cli::parse_from([
        "caldav-server-tester",
        "--run-checks",
        "search,sync-token",
        "--debug-mode",
        "assert",
    ]);
    assert_eq!(cli.run_checks, vec!["search", "sync-token"]);
    assert_eq!(cli.debug_mode, DebugMode::Assert);
}

#[test]
fn inline_profiles_reach_the_resolved_server() {
    let file = parse_servers(
        r#"
servers:
  radicale:
    url: http://localhost:5232/
    features:
      sync-token: fragile
      search.category: false
"#,
        Path::new("servers.yml"),
    )
    .unwrap();
    assert!(validate_servers(&file).is_empty());

    let server = resolve_server(&file, &ServerSelection::default()).unwrap();
    assert_eq!(server.name, "radicale");
    assert_eq!(server.features.support_level("sync-token").unwrap(), Support::Fragile);
    assert!(!server.features.is_supported("search.category").unwrap());
    assert!(server.features.is_supported("search.text").unwrap());
}

#[test]
fn profile_mistakes_are_all_reported() {
    let file = parse_servers(
        r#"
servers:
  broken:
    url: http://localhost/
    features:
      search.teleport: true
      sync-token: sometimes
"#,
        Path::new("servers.yml"),
    )
    .unwrap();
    let errors = validate_servers(&file);
    let rules: Vec<&str> = errors.iter().map(|e| e.rule.as_str()).collect();
    assert!(rules.contains(&"unknown-feature"));
    assert!(rules.contains(&"invalid-feature-value"));
}

#[test]
fn feature_sets_answer_unrecorded_paths_from_the_catalog() {
    let set = FeatureSet::new();
    assert_eq!(set.support_level("search.text").unwrap(), Support::Full);
    assert_eq!(set.support_level("create-calendar.auto").unwrap(), Support::Unsupported);
    assert!(set.support_level("no.such.feature").is_err());
}
