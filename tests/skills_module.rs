use refactory::agents::{ChangeType, FileChange};
use refactory::config::{parse_config_str, AgentView};
use refactory::llm::{
    ChatTransport, FinishReason, LlmAdapter, LlmError, ProviderKind, RateLimiterSet,
    TransportRequest, TransportResponse, Usage,
};
use refactory::skills::{AssetWriter, ContentOnlyMerge, LlmMerge, MergeSkill, SkillError};
use std::collections::VecDeque;
use std::fs;
use std::sync::{Arc, Mutex};
use tempfile::tempdir;

fn change(path: &str, content: Option<&str>, diff: Option<&str>) -> FileChange {
    FileChange {
        file_path: path.to_string(),
        change_type: ChangeType::Modify,
        description: None,
        content: content.map(str::to_string),
        diff: diff.map(str::to_string),
    }
}

#[test]
fn writes_create_parent_directories_and_land_atomically() {
    let dir = tempdir().expect("tempdir");
    let writer = AssetWriter::new(dir.path(), dir.path().join("backups"), true);

    let receipt = writer
        .write("deep/nested/module.py", "x = 1\n", true)
        .expect("write");
    assert!(receipt.backup_path.is_none(), "fresh file needs no backup");
    assert_eq!(
        fs::read_to_string(dir.path().join("deep/nested/module.py")).expect("read"),
        "x = 1\n"
    );
}

#[test]
fn overwrites_take_a_timestamped_backup_preserving_relative_paths() {
    let dir = tempdir().expect("tempdir");
    let backups = dir.path().join("backups");
    let writer = AssetWriter::new(dir.path(), &backups, true);

    fs::create_dir_all(dir.path().join("src")).expect("mkdir");
    fs::write(dir.path().join("src/app.py"), "old\n").expect("seed");

    let receipt = writer.write("src/app.py", "new\n", true).expect("write");
    let backup_path = receipt.backup_path.expect("backup taken");
    assert_eq!(fs::read_to_string(&backup_path).expect("read backup"), "old\n");
    assert!(backup_path.starts_with(&backups));
    assert!(backup_path.ends_with("src/app.py"));
    assert_eq!(
        fs::read_to_string(dir.path().join("src/app.py")).expect("read"),
        "new\n"
    );
}

#[test]
fn disabled_backups_skip_the_copy() {
    let dir = tempdir().expect("tempdir");
    let writer = AssetWriter::new(dir.path(), dir.path().join("backups"), false);
    fs::write(dir.path().join("a.txt"), "old").expect("seed");
    let receipt = writer.write("a.txt", "new", true).expect("write");
    assert!(receipt.backup_path.is_none());
}

#[test]
fn delete_backs_up_then_removes() {
    let dir = tempdir().expect("tempdir");
    let writer = AssetWriter::new(dir.path(), dir.path().join("backups"), true);
    fs::write(dir.path().join("gone.txt"), "bye").expect("seed");

    let receipt = writer.delete("gone.txt", true).expect("delete");
    assert!(receipt.backup_path.is_some());
    assert!(!dir.path().join("gone.txt").exists());

    // Deleting a file that never existed is not an error.
    let receipt = writer.delete("never.txt", true).expect("delete absent");
    assert!(receipt.backup_path.is_none());
}

#[test]
fn read_existing_distinguishes_absent_from_unreadable() {
    let dir = tempdir().expect("tempdir");
    let writer = AssetWriter::new(dir.path(), dir.path().join("backups"), true);
    assert!(writer.read_existing("nope.txt").expect("absent ok").is_none());
    fs::write(dir.path().join("yes.txt"), "content").expect("seed");
    assert_eq!(
        writer.read_existing("yes.txt").expect("read").as_deref(),
        Some("content")
    );
}

struct ScriptedTransport {
    replies: Mutex<VecDeque<Result<TransportResponse, LlmError>>>,
}

impl ChatTransport for ScriptedTransport {
    fn send(&self, _request: &TransportRequest) -> Result<TransportResponse, LlmError> {
        self.replies
            .lock()
            .expect("replies lock")
            .pop_front()
            .unwrap_or_else(|| {
                Err(LlmError::Transport {
                    provider: ProviderKind::Anthropic,
                    detail: "script exhausted".to_string(),
                })
            })
    }
}

fn merge_skill(replies: Vec<Result<TransportResponse, LlmError>>) -> LlmMerge {
    let config = parse_config_str(
        r#"
llm_config:
  default_provider: anthropic
  providers:
    anthropic:
      default_model: merge-model
"#,
        "<test>",
    )
    .expect("config");
    let view = AgentView::resolve(&config, "merge").expect("merge view");
    let transport = Arc::new(ScriptedTransport {
        replies: Mutex::new(replies.into()),
    });
    LlmMerge::new(
        LlmAdapter::new(transport, Arc::new(RateLimiterSet::unlimited())),
        view,
    )
}

#[test]
fn llm_merge_passes_full_content_through_without_a_model_call() {
    let merge = merge_skill(vec![]);
    let with_content = change("a.py", Some("replacement\n"), None);
    let outcome = merge.merge(Some("old"), &with_content).expect("merge");
    assert_eq!(outcome.content, "replacement\n");
    assert!(outcome.llm_trace.is_none());
}

#[test]
fn llm_merge_consults_the_model_for_diff_only_changes() {
    let merge = merge_skill(vec![Ok(TransportResponse {
        content: "```python\nmerged body\n```".to_string(),
        finish_reason: FinishReason::Stop,
        usage: Usage {
            prompt_tokens: 20,
            completion_tokens: 10,
            total_tokens: 30,
        },
    })]);
    let diff_change = change(
        "a.py",
        None,
        Some("--- a.py\n+++ a.py\n@@ -1 +1 @@\n-old\n+merged body\n"),
    );
    let outcome = merge.merge(Some("old\n"), &diff_change).expect("merge");
    // Stray fences from the model are stripped from the merged file.
    assert_eq!(outcome.content, "merged body");
    let trace = outcome.llm_trace.expect("llm trace");
    assert_eq!(trace.usage.total_tokens, 30);
    assert!(trace.user.contains("a.py"));
    assert!(trace.assistant.contains("merged body"));
}

#[test]
fn content_only_merge_passes_content_through_and_rejects_diffs() {
    let merge = ContentOnlyMerge;
    let with_content = change("a.py", Some("new body\n"), None);
    let outcome = merge.merge(Some("old"), &with_content).expect("merge");
    assert_eq!(outcome.content, "new body\n");
    assert!(outcome.llm_trace.is_none());

    let diff_only = change("a.py", None, Some("--- a.py\n+++ a.py\n"));
    let err = merge.merge(Some("old"), &diff_only).expect_err("rejected");
    assert!(matches!(err, SkillError::Merge { .. }));
}
