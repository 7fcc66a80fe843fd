use super::*;
use crate::OpsError;
use std::io::Cursor;

/// Records what it was asked; `history` mimics an agent's memory
#[derive(Default)]
struct Recorder {
    asked: Vec<String>,
    history_at_call: Vec<usize>,
    history: Vec<String>,
    resets: usize,
    fail_on: Option<String>,
}

#[async_trait]
impl Conversation for Recorder {
    async fn respond(&mut self, message: &str) -> Result<String> {
        if self.fail_on.as_deref() == Some(message) {
            return Err(OpsError::Llm("service unavailable".to_string()));
        }
        self.asked.push(message.to_string());
        self.history_at_call.push(self.history.len());
        self.history.push(message.to_string());
        Ok(format!("answer to {}", message))
    }

    fn reset(&mut self) {
        self.resets += 1;
        self.history.clear();
    }
}

async fn run(conversation: &mut Recorder, script: &str) -> (Result<ReplSummary>, String) {
    let mut output = Vec::new();
    let result = run_repl(conversation, Cursor::new(script.to_string()), &mut output).await;
    (result, String::from_utf8_lossy(&output).into_owned())
}

#[test]
fn commands_are_recognized() {
    assert_eq!(parse_command("exit"), Command::Exit);
    assert_eq!(parse_command("exit\r"), Command::Exit);
    assert_eq!(parse_command("clear\n"), Command::Clear);
    assert_eq!(parse_command("   "), Command::Skip);
    assert_eq!(
        parse_command("why did order 42 fail?"),
        Command::Ask("why did order 42 fail?")
    );
    assert_eq!(parse_command("Exit"), Command::Ask("Exit"));
}

#[test]
fn sentinels_must_match_exactly() {
    assert_eq!(parse_command("  exit "), Command::Ask("exit"));
    assert_eq!(parse_command("  clear"), Command::Ask("clear"));
    assert_eq!(parse_command("exit now"), Command::Ask("exit now"));
}

#[tokio::test]
async fn padded_sentinels_are_forwarded_as_questions() {
    let mut conversation = Recorder::default();
    let (result, _) = run(&mut conversation, " clear\nexit \nexit\r\nafter\n").await;

    let summary = result.expect("loop should finish");
    assert_eq!(summary.clears, 0);
    assert_eq!(conversation.resets, 0);
    assert_eq!(conversation.asked, vec!["clear", "exit"]);
}

#[tokio::test]
async fn exit_stops_without_further_calls() {
    let mut conversation = Recorder::default();
    let (result, output) = run(&mut conversation, "first\nexit\nsecond\n").await;

    let summary = result.expect("loop should finish");
    assert_eq!(summary.questions, 1);
    assert_eq!(conversation.asked, vec!["first"]);
    assert!(output.contains("answer to first"));
    assert!(!output.contains("second"));
}

#[tokio::test]
async fn clear_resets_history_before_next_question() {
    let mut conversation = Recorder::default();
    let (result, output) = run(&mut conversation, "one\ntwo\nclear\nthree\n").await;

    let summary = result.expect("loop should finish");
    assert_eq!(summary.clears, 1);
    assert_eq!(conversation.resets, 1);
    assert_eq!(conversation.history_at_call, vec![0, 1, 0]);
    assert!(output.contains("Conversation history cleared."));
}

#[tokio::test]
async fn blank_lines_and_eof() {
    let mut conversation = Recorder::default();
    let (result, output) = run(&mut conversation, "\n   \nquestion").await;

    assert_eq!(result.expect("loop should finish").questions, 1);
    assert_eq!(conversation.asked, vec!["question"]);
    assert_eq!(output.matches(PROMPT).count(), 4);
}

#[tokio::test]
async fn conversation_errors_end_the_loop() {
    let mut conversation = Recorder {
        fail_on: Some("boom".to_string()),
        ..Recorder::default()
    };
    let (result, _) = run(&mut conversation, "ok\nboom\nafter\n").await;

    assert!(matches!(result, Err(OpsError::Llm(_))));
    assert_eq!(conversation.asked, vec!["ok"]);
}
