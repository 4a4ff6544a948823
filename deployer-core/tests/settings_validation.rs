//! Settings validation messages and file loading.

use std::fs;

use deployer_core::{load_secrets, load_settings, parse_settings, RepoName, SettingsError, TriggerMode};
use rstest::rstest;
use tempfile::TempDir;

const VALID: &str = r#"
preference:
  cron: false
repositories:
  svc-a:
    url: https://github.com/org/svc-a
    clone: https://github.com/org/svc-a.git
    branch: main
    path: /srv/svc-a
  svc-b:
    url: https://github.com/org/svc-b
    clone: https://github.com/org/svc-b.git
    branch: release
    path: /srv/svc-b
    commands:
      - make build
      - make deploy
"#;

#[test]
fn valid_settings_load_from_disk() {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("config.yaml");
    fs::write(&path, VALID).expect("write");

    let snap = load_settings(&path).expect("load");
    assert_eq!(snap.trigger, TriggerMode::Push);
    assert_eq!(snap.repositories.len(), 2);
    assert_eq!(snap.credentials.private_key, None);
    let b = &snap.repositories[&RepoName::from("svc-b")];
    assert_eq!(b.branch, "release");
    assert_eq!(b.commands.len(), 2);
}

#[test]
fn missing_file_reports_path() {
    let dir = TempDir::new().expect("tempdir");
    let err = load_settings(&dir.path().join("absent.yaml")).unwrap_err();
    assert!(matches!(err, SettingsError::Io { .. }), "got: {err}");
    assert!(err.to_string().contains("absent.yaml"));

    let err = load_secrets(&dir.path().join(".env")).unwrap_err();
    assert!(matches!(err, SettingsError::Io { .. }), "got: {err}");
}

#[test]
fn malformed_yaml_is_a_yaml_error() {
    let err = parse_settings(b": : corrupt : yaml : !!!\n  - broken: [unclosed").unwrap_err();
    assert!(matches!(err, SettingsError::Yaml(_)), "got: {err}");
}

#[rstest]
#[case::no_repositories("preference:\n  cron: false\n", "no repositories configured")]
#[case::empty_repositories("repositories: {}\n", "no repositories configured")]
#[case::schedule_missing(
    "preference:\n  cron: true\nrepositories:\n  a: {url: u, clone: c, branch: main, path: /a}\n",
    "schedule required when polling enabled"
)]
#[case::schedule_blank(
    "preference:\n  cron: true\n  spec: '  '\nrepositories:\n  a: {url: u, clone: c, branch: main, path: /a}\n",
    "schedule required when polling enabled"
)]
#[case::schedule_invalid(
    "preference:\n  cron: true\n  spec: 'every tuesday'\nrepositories:\n  a: {url: u, clone: c, branch: main, path: /a}\n",
    "invalid schedule expression"
)]
#[case::empty_branch(
    "repositories:\n  a: {url: u, clone: c, branch: '', path: /a}\n",
    "repository 'a': branch must not be empty"
)]
#[case::missing_url(
    "repositories:\n  a: {clone: c, branch: main, path: /a}\n",
    "repository 'a': url must not be empty"
)]
#[case::missing_path(
    "repositories:\n  a: {url: u, clone: c, branch: main}\n",
    "repository 'a': path must not be empty"
)]
#[case::shared_path(
    "repositories:\n  a: {url: u, clone: c, branch: main, path: /srv/x}\n  b: {url: v, clone: d, branch: main, path: /srv/x}\n",
    "share path"
)]
fn invalid_settings_explain_the_cause(#[case] yaml: &str, #[case] expected: &str) {
    let err = parse_settings(yaml.as_bytes()).unwrap_err();
    assert!(matches!(err, SettingsError::Invalid(_)), "got: {err}");
    assert!(
        err.to_string().contains(expected),
        "expected '{expected}' in '{err}'"
    );
}
