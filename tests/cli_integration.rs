
use mock_gmail::MockGmailServer;
use serde_json::{json, Value};
use std::path::PathBuf;
use std::process::{Command, Output};

struct Harness {
    server: MockGmailServer,
    dir: tempfile::TempDir,
    config_path: PathBuf,
}

impl Harness {
    fn start() -> Self {
        Self::start_with_rules_config("")
    }

    fn start_with_rules_config(rules_config: &str) -> Self {
        let server = MockGmailServer::start();
        let dir = tempfile::tempdir().expect("create temp dir");
        let config_path = dir.path().join("config.toml");

        let config_content = format!(
            r#"[gmail]
api_url = "{}"
token_command = "echo test"

[store]
path = "{}"

[rules]
{}
"#,
            server.api_url(),
            dir.path().join("data").join("mail.redb").display(),
            rules_config
        );
        std::fs::write(&config_path, config_content).expect("write config");

        Harness {
            server,
            dir,
            config_path,
        }
    }

    fn write_rules(&self, rules: &str) {
        std::fs::write(self.dir.path().join("rules.json"), rules).expect("write rules");
    }

    fn run(&self, args: &[&str]) -> Output {
        Command::new(env!("CARGO_BIN_EXE_mailsift"))
            .arg(format!("--config={}", self.config_path.display()))
            .args(args)
            .env_remove("MAILSIFT_DEBUG")
            .output()
            .expect("run mailsift")
    }

    fn run_ok(&self, args: &[&str]) -> String {
        let output = self.run(args);
        assert!(
            output.status.success(),
            "mailsift {:?} failed: {}",
            args,
            String::from_utf8_lossy(&output.stderr)
        );
        String::from_utf8_lossy(&output.stdout).to_string()
    }

    fn fetch(&self) {
        let stdout = self.run_ok(&["fetch"]);
        assert!(stdout.contains("Fetched 2 message(s)."), "stdout: {}", stdout);
    }
}

const NEWSLETTER_RULES: &str = r#"[
    {
        "predicate": "Any",
        "rules": [
            {"field": "From", "predicate": "Contains", "value": "newsletter@"},
            {"field": "Subject", "predicate": "Equals", "value": "weekly digest"}
        ],
        "actions": [
            {"type": "move_message", "label": "Newsletters"},
            {"type": "mark_as_read"}
        ]
    },
    {
        "predicate": "All",
        "rules": [
            {"field": "Received", "predicate": "GreaterThanMonths", "value": 6}
        ],
        "actions": [{"type": "mark_as_read"}]
    }
]"#;

fn ids(requests: &[Value]) -> Vec<&str> {
    requests
        .iter()
        .map(|r| r["id"].as_str().unwrap_or_default())
        .collect()
}

#[test]
fn test_init_db_creates_store() {
    let h = Harness::start();
    let stdout = h.run_ok(&["init-db"]);
    assert!(stdout.contains("Store ready at"), "stdout: {}", stdout);
    assert!(stdout.contains("(0 email(s))"), "stdout: {}", stdout);
    assert!(h.dir.path().join("data").join("mail.redb").exists());
}

#[test]
fn test_fetch_then_process_allow_multiple() {
    let h = Harness::start();
    h.fetch();
    let stdout = h.run_ok(&["init-db"]);
    assert!(stdout.contains("(2 email(s))"), "stdout: {}", stdout);

    h.write_rules(NEWSLETTER_RULES);
    let stdout = h.run_ok(&["process", "--allow-multiple"]);
    assert!(stdout.contains("Loaded 2 rule-set(s) from"), "stdout: {}", stdout);
    assert!(
        stdout.contains("Applied rules to 2 matching email(s)."),
        "stdout: {}",
        stdout
    );

    let requests = h.server.modify_requests();
    assert_eq!(ids(&requests), vec!["m1", "m1"]);
    assert_eq!(requests[0]["addLabelIds"], json!(["Label_7"]));
    assert_eq!(requests[0]["removeLabelIds"], json!(["INBOX", "UNREAD"]));
    assert_eq!(requests[1]["addLabelIds"], json!([]));
    assert_eq!(requests[1]["removeLabelIds"], json!(["UNREAD"]));
    assert!(h.server.created_labels().is_empty());
}

#[test]
fn test_process_stop_after_first_match() {
    let h = Harness::start();
    h.fetch();
    h.write_rules(NEWSLETTER_RULES);

    let stdout = h.run_ok(&["process", "--stop-after-first-match"]);
    assert!(
        stdout.contains("Applied rules to 1 matching email(s)."),
        "stdout: {}",
        stdout
    );
    assert_eq!(ids(&h.server.modify_requests()), vec!["m1"]);
}

#[test]
fn test_stop_after_first_match_from_config() {
    let h = Harness::start_with_rules_config("stop_after_first_match = true");
    h.fetch();
    h.write_rules(NEWSLETTER_RULES);

    let stdout = h.run_ok(&["process"]);
    assert!(
        stdout.contains("Applied rules to 1 matching email(s)."),
        "stdout: {}",
        stdout
    );

    // The flag overrides the config.
    let stdout = h.run_ok(&["process", "--allow-multiple"]);
    assert!(
        stdout.contains("Applied rules to 2 matching email(s)."),
        "stdout: {}",
        stdout
    );
}

#[test]
fn test_move_without_label_creates_default_label() {
    let h = Harness::start_with_rules_config("default_move_label = \"Sorted\"");
    h.fetch();
    h.write_rules(
        r#"{"predicate": "All",
            "rules": [{"field": "from", "predicate": "Equals", "value": "BOSS@example.com"}],
            "actions": [{"type": "move_message"}]}"#,
    );

    let stdout = h.run_ok(&["process"]);
    assert!(
        stdout.contains("Applied rules to 1 matching email(s)."),
        "stdout: {}",
        stdout
    );

    assert_eq!(h.server.created_labels(), vec!["Sorted"]);
    let requests = h.server.modify_requests();
    assert_eq!(ids(&requests), vec!["m2"]);
    assert_eq!(requests[0]["addLabelIds"], json!(["Label_new_1"]));
    assert_eq!(requests[0]["removeLabelIds"], json!(["INBOX"]));
}

#[test]
fn test_message_field_matches_plain_text_body() {
    let h = Harness::start();
    h.fetch();
    let rules_path = h.dir.path().join("custom-rules.json");
    std::fs::write(
        &rules_path,
        r#"[{"rules": [{"field": "message", "predicate": "Contains", "value": "before friday"}],
             "actions": [{"type": "mark_as_unread"}]}]"#,
    )
    .unwrap();

    let stdout = h.run_ok(&["process", &format!("--rules={}", rules_path.display())]);
    assert!(
        stdout.contains("Applied rules to 1 matching email(s)."),
        "stdout: {}",
        stdout
    );
    let requests = h.server.modify_requests();
    assert_eq!(ids(&requests), vec!["m2"]);
    assert_eq!(requests[0]["addLabelIds"], json!(["UNREAD"]));
}

#[test]
fn test_malformed_rules_exit_without_provider_calls() {
    let h = Harness::start();
    h.fetch();
    h.write_rules(r#"[{"predicate": "All", "rules": ["#);

    let output = h.run(&["process"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("rule configuration error"), "stderr: {}", stderr);
    assert!(h.server.modify_requests().is_empty());
}

#[test]
fn test_unknown_predicate_rejected_at_load() {
    let h = Harness::start();
    h.fetch();
    h.write_rules(
        r#"[{"rules": [{"field": "subject", "predicate": "Contains", "value": "x"}]},
            {"rules": [{"field": "subject", "predicate": "RegexMatch", "value": "x"}]}]"#,
    );

    let output = h.run(&["process"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("rule-set 2"), "stderr: {}", stderr);
    assert!(stderr.contains("RegexMatch"), "stderr: {}", stderr);
    assert!(h.server.modify_requests().is_empty());
}

#[test]
fn test_print_rules() {
    let h = Harness::start();
    h.write_rules(NEWSLETTER_RULES);

    let stdout = h.run_ok(&["print-rules"]);
    assert!(stdout.contains("Rule-sets loaded: 2"), "stdout: {}", stdout);
    assert!(stdout.contains("Rule-set 1 (any condition):"), "stdout: {}", stdout);
    assert!(
        stdout.contains("  Match: From Contains \"newsletter@\""),
        "stdout: {}",
        stdout
    );
    assert!(
        stdout.contains("  Actions: move_message=Newsletters, mark_as_read"),
        "stdout: {}",
        stdout
    );
    assert!(stdout.contains("Rule-set 2 (all conditions):"), "stdout: {}", stdout);
}

#[test]
fn test_bad_token_fails_fetch() {
    let h = Harness::start();
    let config = std::fs::read_to_string(&h.config_path)
        .unwrap()
        .replace("echo test", "echo wrong");
    std::fs::write(&h.config_path, config).unwrap();

    let output = h.run(&["fetch"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("401"), "stderr: {}", stderr);
}

#[test]
fn test_missing_config_exits_non_zero() {
    let dir = tempfile::tempdir().unwrap();
    let output = Command::new(env!("CARGO_BIN_EXE_mailsift"))
        .arg(format!("--config={}", dir.path().join("none.toml").display()))
        .arg("init-db")
        .output()
        .expect("run mailsift");
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Error loading config"), "stderr: {}", stderr);
}

#[test]
fn test_unknown_command() {
    let h = Harness::start();
    let output = h.run(&["sync"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("Unknown command 'sync'"));
}
