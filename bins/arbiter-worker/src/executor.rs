/// Judge Orchestrator - High-Level Orchestration
///
/// **Responsibility:**
/// Drive one `Pending` submission to exactly one terminal verdict.
///
/// **Architecture:**
/// 1. Load the submission and its question through the store (store.rs)
/// 2. Run each test case, in order, through the engine (engine.rs)
/// 3. Let the evaluator decide pass or verdict (evaluator.rs)
/// 4. Stop at the first failing test case and persist the verdict
///
/// Progress is saved after every passing test case so a restarted worker
/// resumes where the previous one stopped instead of re-running from 1.

use anyhow::Result;
use arbiter_common::types::{Submission, Verdict};
use thiserror::Error;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::engine::ExecutionEngine;
use crate::evaluator::{self, TestOutcome};
use crate::store::SubmissionStore;

#[derive(Debug, Error)]
pub enum JudgeError {
    #[error("question '{0}' not found")]
    QuestionNotFound(String),
    #[error("store error: {0}")]
    Store(#[from] anyhow::Error),
}

/// Judge the submission `id` and persist its verdict.
///
/// Returns the verdict that was written, or `None` when there was nothing to
/// do (submission missing, already terminal, or finished by someone else).
#[instrument(skip(store, engine))]
pub async fn judge_submission(
    store: &dyn SubmissionStore,
    engine: &dyn ExecutionEngine,
    id: Uuid,
) -> Result<Option<Verdict>> {
    let submission = match store.load_submission(id).await? {
        Some(submission) => submission,
        None => {
            warn!("Submission not found, dropping job");
            return Ok(None);
        }
    };

    if submission.status.is_terminal() {
        debug!(status = %submission.status, "Submission already judged");
        return Ok(None);
    }

    let verdict = match evaluate_submission(store, engine, &submission).await {
        Ok(verdict) => verdict,
        Err(e) => {
            error!(error = %e, "Judging failed outside test execution");
            evaluator::internal_error()
        }
    };

    if store.finish(id, &verdict).await? {
        info!(status = %verdict.status, "Verdict recorded");
        Ok(Some(verdict))
    } else {
        warn!("Submission left Pending concurrently, verdict discarded");
        Ok(None)
    }
}

/// Fail-fast pass over the question's test cases, starting at the saved cursor
async fn evaluate_submission(
    store: &dyn SubmissionStore,
    engine: &dyn ExecutionEngine,
    submission: &Submission,
) -> Result<Verdict, JudgeError> {
    let question = store
        .load_question(&submission.question_id)
        .await?
        .ok_or_else(|| JudgeError::QuestionNotFound(submission.question_id.clone()))?;

    let start = store.load_cursor(submission.id).await?;
    if start > 0 {
        info!(resume_from = start + 1, total = question.test_cases.len(), "Resuming submission");
    }

    for (idx, test_case) in question.test_cases.iter().enumerate().skip(start) {
        let number = idx + 1;

        let response = match engine
            .run(&submission.language, &submission.code, &test_case.input)
            .await
        {
            Ok(response) => response,
            Err(e) => {
                warn!(test_case = number, error = %e, "Executor call failed");
                return Ok(evaluator::executor_failure(number, &format!("{:#}", e)));
            }
        };

        match evaluator::evaluate_test(number, test_case, &response) {
            TestOutcome::Passed => {
                debug!(test_case = number, "Test case passed");
                store.save_cursor(submission.id, number).await?;
            }
            TestOutcome::Failed(verdict) => {
                info!(test_case = number, status = %verdict.status, "Test case failed");
                return Ok(verdict);
            }
        }
    }

    Ok(evaluator::accepted())
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::bail;
    use arbiter_common::types::{
        FailureKind, Question, RunResponse, SubmissionStatus, TestCase,
    };
    use async_trait::async_trait;
    use std::collections::{HashMap, VecDeque};
    use std::sync::Mutex;

    #[derive(Default)]
    struct MemoryStore {
        submissions: Mutex<HashMap<Uuid, Submission>>,
        questions: Mutex<HashMap<String, Question>>,
        cursors: Mutex<HashMap<Uuid, usize>>,
        fail_questions: bool,
    }

    impl MemoryStore {
        fn status(&self, id: Uuid) -> (SubmissionStatus, String) {
            let submissions = self.submissions.lock().unwrap();
            let s = &submissions[&id];
            (s.status, s.output.clone())
        }
    }

    #[async_trait]
    impl SubmissionStore for MemoryStore {
        async fn load_submission(&self, id: Uuid) -> Result<Option<Submission>> {
            Ok(self.submissions.lock().unwrap().get(&id).cloned())
        }

        async fn load_question(&self, question_id: &str) -> Result<Option<Question>> {
            if self.fail_questions {
                bail!("connection reset");
            }
            Ok(self.questions.lock().unwrap().get(question_id).cloned())
        }

        async fn load_cursor(&self, id: Uuid) -> Result<usize> {
            Ok(self.cursors.lock().unwrap().get(&id).copied().unwrap_or(0))
        }

        async fn save_cursor(&self, id: Uuid, next: usize) -> Result<()> {
            self.cursors.lock().unwrap().insert(id, next);
            Ok(())
        }

        async fn finish(&self, id: Uuid, verdict: &Verdict) -> Result<bool> {
            let mut submissions = self.submissions.lock().unwrap();
            match submissions.get_mut(&id) {
                Some(s) if !s.status.is_terminal() => {
                    s.status = verdict.status;
                    s.output = verdict.output.clone();
                    self.cursors.lock().unwrap().remove(&id);
                    Ok(true)
                }
                _ => Ok(false),
            }
        }
    }

    /// Answers from a script and records every input it was asked to run
    struct ScriptedEngine {
        responses: Mutex<VecDeque<Result<RunResponse>>>,
        calls: Mutex<Vec<String>>,
    }

    impl ScriptedEngine {
        fn new(responses: Vec<Result<RunResponse>>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ExecutionEngine for ScriptedEngine {
        async fn run(&self, _language: &str, _code: &str, input: &str) -> Result<RunResponse> {
            self.calls.lock().unwrap().push(input.to_string());
            match self.responses.lock().unwrap().pop_front() {
                Some(response) => response,
                None => bail!("unexpected executor call"),
            }
        }
    }

    fn sum_question() -> Question {
        Question {
            title: "Sum".to_string(),
            description: String::new(),
            test_cases: vec![
                TestCase { input: "5 3".to_string(), expected_output: "8".to_string() },
                TestCase { input: "10 20".to_string(), expected_output: "30".to_string() },
                TestCase { input: "-1 1".to_string(), expected_output: "0".to_string() },
            ],
        }
    }

    fn setup(question: Question) -> (MemoryStore, Uuid) {
        let store = MemoryStore::default();
        let submission = Submission::new_pending(
            "user-1".to_string(),
            "sum".to_string(),
            "cpp".to_string(),
            "int main() {}".to_string(),
        );
        let id = submission.id;
        store.submissions.lock().unwrap().insert(id, submission);
        store.questions.lock().unwrap().insert("sum".to_string(), question);
        (store, id)
    }

    fn ok(output: &str) -> Result<RunResponse> {
        Ok(RunResponse::ok(output.to_string()))
    }

    #[tokio::test]
    async fn test_all_pass_is_accepted() {
        let (store, id) = setup(sum_question());
        let engine = ScriptedEngine::new(vec![ok("8\n"), ok("30\n"), ok("0\n")]);

        let verdict = judge_submission(&store, &engine, id).await.unwrap().unwrap();

        assert_eq!(verdict.status, SubmissionStatus::Accepted);
        assert_eq!(
            store.status(id),
            (SubmissionStatus::Accepted, "All test cases passed!".to_string())
        );
        assert_eq!(engine.calls(), vec!["5 3", "10 20", "-1 1"]);
    }

    #[tokio::test]
    async fn test_wrong_answer_stops_at_first_failure() {
        let (store, id) = setup(sum_question());
        let engine = ScriptedEngine::new(vec![ok("8"), ok("31")]);

        judge_submission(&store, &engine, id).await.unwrap();

        let (status, output) = store.status(id);
        assert_eq!(status, SubmissionStatus::WrongAnswer);
        assert_eq!(
            output,
            "Failed on test case 2.\nInput:\n10 20\n\nExpected Output:\n30\n\nYour Output:\n31"
        );
        // Test case 3 never reaches the executor
        assert_eq!(engine.calls(), vec!["5 3", "10 20"]);
    }

    #[tokio::test]
    async fn test_compile_failure_is_compilation_error() {
        let (store, id) = setup(sum_question());
        let diagnostic = "main.cpp:1:12: error: expected ';' before '}' token";
        let engine = ScriptedEngine::new(vec![Ok(RunResponse::failed(
            diagnostic.to_string(),
            Some(FailureKind::Compile),
        ))]);

        judge_submission(&store, &engine, id).await.unwrap();

        assert_eq!(
            store.status(id),
            (SubmissionStatus::CompilationError, diagnostic.to_string())
        );
        assert_eq!(engine.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_runtime_failure_is_runtime_error() {
        let (store, id) = setup(sum_question());
        let engine = ScriptedEngine::new(vec![
            ok("8"),
            Ok(RunResponse::failed(
                "ZeroDivisionError: division by zero".to_string(),
                Some(FailureKind::Runtime),
            )),
        ]);

        judge_submission(&store, &engine, id).await.unwrap();

        let (status, output) = store.status(id);
        assert_eq!(status, SubmissionStatus::RuntimeError);
        assert!(output.contains("ZeroDivisionError"));
    }

    #[tokio::test]
    async fn test_timeout_is_runtime_error() {
        let (store, id) = setup(sum_question());
        let engine = ScriptedEngine::new(vec![Ok(RunResponse::failed(
            "Time limit exceeded: execution took longer than 10000 ms".to_string(),
            Some(FailureKind::Timeout),
        ))]);

        judge_submission(&store, &engine, id).await.unwrap();

        assert_eq!(store.status(id).0, SubmissionStatus::RuntimeError);
    }

    #[tokio::test]
    async fn test_unsupported_language_is_compilation_error() {
        let (store, id) = setup(sum_question());
        let engine = ScriptedEngine::new(vec![Ok(RunResponse::unsupported_language("ruby"))]);

        judge_submission(&store, &engine, id).await.unwrap();

        assert_eq!(
            store.status(id),
            (
                SubmissionStatus::CompilationError,
                "Unsupported language: ruby".to_string()
            )
        );
    }

    #[tokio::test]
    async fn test_executor_unreachable_is_runtime_error() {
        let (store, id) = setup(sum_question());
        let engine = ScriptedEngine::new(vec![ok("8"), Err(anyhow::anyhow!("connection refused"))]);

        judge_submission(&store, &engine, id).await.unwrap();

        assert_eq!(
            store.status(id),
            (
                SubmissionStatus::RuntimeError,
                "Error on test case 2: connection refused".to_string()
            )
        );
    }

    #[tokio::test]
    async fn test_missing_question_is_error() {
        let (store, id) = setup(sum_question());
        store.questions.lock().unwrap().clear();
        let engine = ScriptedEngine::new(vec![]);

        judge_submission(&store, &engine, id).await.unwrap();

        assert_eq!(
            store.status(id),
            (
                SubmissionStatus::Error,
                "Internal server error during processing".to_string()
            )
        );
        assert!(engine.calls().is_empty());
    }

    #[tokio::test]
    async fn test_store_failure_is_error() {
        let (mut store, id) = setup(sum_question());
        store.fail_questions = true;
        let engine = ScriptedEngine::new(vec![]);

        judge_submission(&store, &engine, id).await.unwrap();

        assert_eq!(store.status(id).0, SubmissionStatus::Error);
    }

    #[tokio::test]
    async fn test_terminal_submission_is_left_alone() {
        let (store, id) = setup(sum_question());
        store.submissions.lock().unwrap().get_mut(&id).unwrap().status = SubmissionStatus::Accepted;
        let engine = ScriptedEngine::new(vec![]);

        let verdict = judge_submission(&store, &engine, id).await.unwrap();

        assert!(verdict.is_none());
        assert!(engine.calls().is_empty());
        assert_eq!(store.status(id).0, SubmissionStatus::Accepted);
    }

    #[tokio::test]
    async fn test_missing_submission_is_skipped() {
        let (store, _) = setup(sum_question());
        let engine = ScriptedEngine::new(vec![]);

        let verdict = judge_submission(&store, &engine, Uuid::new_v4()).await.unwrap();

        assert!(verdict.is_none());
        assert!(engine.calls().is_empty());
    }

    #[tokio::test]
    async fn test_resumes_from_saved_cursor() {
        let (store, id) = setup(sum_question());
        store.cursors.lock().unwrap().insert(id, 2);
        let engine = ScriptedEngine::new(vec![ok("0")]);

        judge_submission(&store, &engine, id).await.unwrap();

        assert_eq!(store.status(id).0, SubmissionStatus::Accepted);
        assert_eq!(engine.calls(), vec!["-1 1"]);
        assert!(store.cursors.lock().unwrap().get(&id).is_none());
    }

    #[tokio::test]
    async fn test_cursor_tracks_passed_cases() {
        let (store, id) = setup(sum_question());
        let engine = ScriptedEngine::new(vec![ok("8"), ok("30"), ok("1")]);

        judge_submission(&store, &engine, id).await.unwrap();

        // Wrong answer on case 3; verdict written, cursor cleared
        assert_eq!(store.status(id).0, SubmissionStatus::WrongAnswer);
        assert!(store.cursors.lock().unwrap().get(&id).is_none());
    }

    #[tokio::test]
    async fn test_no_test_cases_is_accepted() {
        let (store, id) = setup(Question {
            title: "Empty".to_string(),
            description: String::new(),
            test_cases: Vec::new(),
        });
        let engine = ScriptedEngine::new(vec![]);

        judge_submission(&store, &engine, id).await.unwrap();

        assert_eq!(store.status(id).0, SubmissionStatus::Accepted);
        assert!(engine.calls().is_empty());
    }
}
