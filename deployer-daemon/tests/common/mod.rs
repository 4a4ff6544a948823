//! Fixtures shared by the daemon integration tests.
#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use deployer_core::{parse_secrets, parse_settings, Secrets, SettingsSnapshot};
use git2::{Commit, Oid, Repository, Signature};

pub const REPO_URL: &str = "https://github.com/acme/svc-a";

/// Commit `files` onto `refs/heads/main` of a non-bare repository.
pub fn commit(repo: &Repository, files: &[(&str, &str)], message: &str) -> Oid {
    let workdir = repo.workdir().expect("non-bare repository");
    for (path, content) in files {
        let full = workdir.join(path);
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent).expect("mkdir");
        }
        fs::write(&full, content).expect("write file");
    }
    let mut index = repo.index().expect("index");
    for (path, _) in files {
        index.add_path(Path::new(path)).expect("add path");
    }
    index.write().expect("write index");
    let tree = repo
        .find_tree(index.write_tree().expect("write tree"))
        .expect("find tree");
    let sig = Signature::now("Deployer Test", "test@example.com").expect("signature");
    let parent = repo
        .refname_to_id("refs/heads/main")
        .ok()
        .map(|id| repo.find_commit(id).expect("parent"));
    let parents: Vec<&Commit> = parent.iter().collect();
    let oid = repo
        .commit(Some("refs/heads/main"), &sig, &sig, message, &tree, &parents)
        .expect("commit");
    repo.set_head("refs/heads/main").expect("set head");
    oid
}

/// Upstream repository with one commit on `main`.
pub fn upstream(dir: &Path) -> Repository {
    let repo = Repository::init(dir).expect("init upstream");
    commit(&repo, &[("README.md", "hello\n")], "initial");
    repo
}

/// One repository entry of the settings file.
pub struct RepoEntry {
    pub name: String,
    pub url: String,
    pub clone: String,
    pub branch: String,
    pub path: PathBuf,
    pub commands: Vec<String>,
}

impl RepoEntry {
    pub fn new(name: &str, clone: &Path, path: &Path) -> Self {
        Self {
            name: name.to_string(),
            url: REPO_URL.to_string(),
            clone: clone.to_string_lossy().into_owned(),
            branch: "main".to_string(),
            path: path.to_path_buf(),
            commands: Vec::new(),
        }
    }

    pub fn commands(mut self, commands: &[&str]) -> Self {
        self.commands = commands.iter().map(|c| c.to_string()).collect();
        self
    }
}

/// Render a settings file. `schedule: None` selects push mode.
pub fn settings_yaml(schedule: Option<&str>, repos: &[RepoEntry]) -> String {
    let mut yaml = String::from("preference:\n");
    match schedule {
        Some(spec) => yaml.push_str(&format!("  cron: true\n  spec: \"{spec}\"\n")),
        None => yaml.push_str("  cron: false\n"),
    }
    yaml.push_str("repositories:\n");
    for repo in repos {
        yaml.push_str(&format!(
            "  {}:\n    url: \"{}\"\n    clone: \"{}\"\n    branch: \"{}\"\n    path: \"{}\"\n",
            repo.name,
            repo.url,
            repo.clone,
            repo.branch,
            repo.path.display()
        ));
        if repo.commands.is_empty() {
            yaml.push_str("    commands: []\n");
        } else {
            yaml.push_str("    commands:\n");
            for command in &repo.commands {
                yaml.push_str(&format!("      - \"{command}\"\n"));
            }
        }
    }
    yaml
}

pub fn snapshot(schedule: Option<&str>, repos: &[RepoEntry]) -> SettingsSnapshot {
    parse_settings(settings_yaml(schedule, repos).as_bytes()).expect("valid settings")
}

pub fn env_text(port: u16, level: &str, secret: Option<&str>) -> String {
    let mut text = format!("PORT={port}\nLOG_LEVEL={level}\n");
    if let Some(secret) = secret {
        text.push_str(&format!("GITHUB_WEBHOOK_SECRET={secret}\n"));
    }
    text
}

pub fn secrets(port: u16, level: &str, secret: Option<&str>) -> Secrets {
    parse_secrets(env_text(port, level, secret).as_bytes()).expect("valid secrets")
}

/// A port that was free a moment ago.
pub fn free_port() -> u16 {
    std::net::TcpListener::bind("127.0.0.1:0")
        .and_then(|listener| listener.local_addr())
        .map(|addr| addr.port())
        .expect("ephemeral port")
}

/// Poll `check` every 20ms until it holds or `limit` elapses.
pub async fn eventually(limit: Duration, mut check: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + limit;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    check()
}
