mod common;

use common::{echo_lm, Workspace};

#[test]
fn init_refuses_to_overwrite_without_force() {
    let workspace = Workspace::with_records();
    workspace.pedit_ok(&["init", "--lm", "cat"]);
    let config = workspace.read_json("edit/config.json");
    assert_eq!(config["gateway"]["kind"], "command");
    assert_eq!(config["gateway"]["command"], "cat");

    let again = workspace.pedit(&["init"]);
    assert!(!again.status.success());
    assert!(String::from_utf8_lossy(&again.stderr).contains("--force"));

    workspace.pedit_ok(&["init", "--force", "--model", "small"]);
    let config = workspace.read_json("edit/config.json");
    assert_eq!(config["model"], "small");
}

#[test]
fn invalid_instructions_are_rejected() {
    let workspace = Workspace::with_records();
    workspace.pedit_ok(&["init", "--lm", "cat"]);

    for (field, description) in [
        ("Subtitle", "Summarise $Title"),
        ("Summary", "Summarise $Headline"),
        ("Summary", "<% if $Title %>never closed"),
    ] {
        let output = workspace.pedit(&[
            "instruction",
            "add",
            "--title",
            "Broken",
            "--class",
            "Article",
            "--field",
            field,
            "--description",
            description,
        ]);
        assert!(!output.status.success(), "{field} / {description}");
    }
    assert!(!workspace.path("edit/instructions.json").exists());
}

#[test]
fn instruction_list_and_edit() {
    let workspace = Workspace::with_records();
    workspace.pedit_ok(&["init", "--lm", "cat"]);
    let template = workspace.path("template.txt");
    std::fs::write(&template, "Describe $Title<% if $Author %> by $Author.Name<% end_if %>")
        .expect("write template");
    workspace.pedit_ok(&[
        "instruction",
        "add",
        "--title",
        "Descriptions",
        "--class",
        "Article",
        "--field",
        "Summary",
        "--description-file",
        template.to_str().expect("utf-8 path"),
    ]);
    workspace.pedit_ok(&["instruction", "edit", "1", "--title", "Blurbs"]);

    let listed = workspace.pedit_ok(&["instruction", "list"]);
    assert!(listed.contains("draft"), "{listed}");
    assert!(listed.contains("Article.Summary"), "{listed}");
    assert!(listed.contains("Blurbs"), "{listed}");

    workspace.pedit_ok(&["instruction", "delete", "1"]);
    let listed = workspace.pedit_ok(&["instruction", "list", "--json"]);
    assert_eq!(listed.trim(), "[]");
}

#[test]
fn instruction_test_runs_one_record_without_writing_back() {
    let workspace = Workspace::with_records();
    workspace.pedit_ok(&["init", "--lm", &echo_lm("Test answer")]);
    workspace.pedit_ok(&[
        "instruction",
        "add",
        "--title",
        "Summaries",
        "--class",
        "Article",
        "--field",
        "Summary",
        "--description",
        "Summarise $Title",
    ]);

    let output = workspace.pedit_ok(&["instruction", "test", "1", "--record", "2"]);
    assert!(output.contains("Test answer"), "{output}");

    let tasks = workspace.read_json("edit/tasks.json");
    assert_eq!(tasks["tasks"][0]["is_test"], true);
    assert_eq!(tasks["tasks"][0]["record_id"], 2);

    workspace.pedit_ok(&["review", "accept", "1"]);
    workspace.pedit_ok(&["run"]);
    let articles = workspace.read_json("records/Article.json");
    assert!(common::record(&articles, 2)["fields"].get("Summary").is_none());
}

#[test]
fn ask_bypasses_the_workflow() {
    let workspace = Workspace::with_records();
    let answer = workspace.pedit_ok(&["ask", "--lm", "cat", "ping", "pong"]);
    assert_eq!(answer.trim(), "ping pong");
    assert!(!workspace.path("edit/tasks.json").exists());
    let log = workspace.read_lines("edit/lm_log.jsonl");
    assert_eq!(log.len(), 1);
    assert!(log[0].contains("\"outcome\":\"success\""), "{}", log[0]);
}

#[test]
fn missing_lm_binary_is_a_configuration_error() {
    let workspace = Workspace::with_records();
    let output = workspace.pedit(&["ask", "--lm", "definitely-not-an-lm-binary-xyz", "hi"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("configuration error"));
}
