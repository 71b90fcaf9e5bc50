//! Shared test infrastructure for integration tests.

use serde_json::Value;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

/// Articles 1 (published) and 2 (draft only).
pub const ARTICLES: &str = r#"{
  "schema": {
    "name": "Article",
    "title_field": "Title",
    "fields": {
      "Title": {"kind": "short_text"},
      "Summary": {"kind": "long_text"},
      "Author": {"kind": "has_one", "class": "Person"}
    }
  },
  "records": [
    {"id": 1, "fields": {"Title": "Hello World"}, "live": {"Title": "Hello World"}},
    {"id": 2, "fields": {"Title": "Second Post"}}
  ]
}"#;

pub const PEOPLE: &str = r#"{
  "schema": {
    "name": "Person",
    "title_field": "Name",
    "fields": {"Name": {"kind": "short_text"}}
  },
  "records": [
    {"id": 10, "fields": {"Name": "Ada Lovelace"}, "live": {"Name": "Ada Lovelace"}},
    {"id": 11, "fields": {"Name": "Grace Hopper"}, "live": {"Name": "Grace Hopper"}}
  ]
}"#;

/// Temporary workspace driven through the `pedit` binary.
pub struct Workspace {
    dir: TempDir,
}

impl Workspace {
    /// Workspace with the sample record classes in place.
    pub fn with_records() -> Self {
        let dir = tempfile::tempdir().expect("create temp dir");
        let records = dir.path().join("records");
        std::fs::create_dir_all(&records).expect("create records dir");
        std::fs::write(records.join("Article.json"), ARTICLES).expect("write articles");
        std::fs::write(records.join("Person.json"), PEOPLE).expect("write people");
        Workspace { dir }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn path(&self, relative: &str) -> PathBuf {
        self.dir.path().join(relative)
    }

    /// Run `pedit --workspace <root> <args>` with a clean LM environment.
    pub fn pedit(&self, args: &[&str]) -> Output {
        Command::new(env!("CARGO_BIN_EXE_pedit"))
            .arg("--workspace")
            .arg(self.root())
            .args(args)
            .env_remove("PEDIT_LM_COMMAND")
            .env_remove("PEDIT_LOG")
            .output()
            .expect("run pedit")
    }

    /// Run and require success, returning stdout.
    pub fn pedit_ok(&self, args: &[&str]) -> String {
        let output = self.pedit(args);
        assert!(
            output.status.success(),
            "pedit {:?} failed: {}",
            args,
            String::from_utf8_lossy(&output.stderr)
        );
        String::from_utf8(output.stdout).expect("utf-8 stdout")
    }

    pub fn read_json(&self, relative: &str) -> Value {
        let text = std::fs::read_to_string(self.path(relative))
            .unwrap_or_else(|err| panic!("read {relative}: {err}"));
        serde_json::from_str(&text).unwrap_or_else(|err| panic!("parse {relative}: {err}"))
    }

    pub fn read_lines(&self, relative: &str) -> Vec<String> {
        std::fs::read_to_string(self.path(relative))
            .unwrap_or_default()
            .lines()
            .map(str::to_string)
            .collect()
    }
}

/// LM command that ignores the prompt and prints `answer`.
pub fn echo_lm(answer: &str) -> String {
    format!("sh -c 'cat >/dev/null; echo {answer}'")
}

/// Record `id` inside a parsed class file.
pub fn record<'a>(class_file: &'a Value, id: u64) -> &'a Value {
    class_file["records"]
        .as_array()
        .expect("records array")
        .iter()
        .find(|record| record["id"] == id)
        .expect("record present")
}
