/// Test Evaluator - Language-Agnostic Verdict Logic
///
/// **Core Responsibility:**
/// Turn one executor response into "passed" or a terminal verdict.
///
/// **Critical Properties:**
/// - Knows nothing about HTTP
/// - Knows nothing about Redis
/// - Pure function: (executor response, expected output) → outcome
///
/// **Normalization Rules (Applied to All Languages):**
/// - Trim trailing whitespace: YES
/// - Trim leading whitespace: YES
/// - Internal whitespace: preserved
/// - Case sensitivity: YES (exact match required)

use arbiter_common::types::{FailureKind, RunResponse, SubmissionStatus, TestCase, Verdict};
use std::fmt::Display;

pub const ACCEPTED_MESSAGE: &str = "All test cases passed!";
pub const INTERNAL_ERROR_MESSAGE: &str = "Internal server error during processing";

/// Result of judging a single test case
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TestOutcome {
    Passed,
    Failed(Verdict),
}

fn normalize_output(output: &str) -> &str {
    output.trim()
}

/// Evaluate the executor's response for test case `number` (1-based)
///
/// 1. Executor-classified failures (highest priority)
/// 2. Output comparison
pub fn evaluate_test(number: usize, test_case: &TestCase, response: &RunResponse) -> TestOutcome {
    if !response.success {
        let status = match response.error_kind {
            Some(FailureKind::Runtime) | Some(FailureKind::Timeout) => SubmissionStatus::RuntimeError,
            Some(FailureKind::Compile) | None => SubmissionStatus::CompilationError,
        };
        return TestOutcome::Failed(Verdict {
            status,
            output: response.output.clone(),
        });
    }

    let actual = normalize_output(&response.output);
    let expected = normalize_output(&test_case.expected_output);

    if actual == expected {
        TestOutcome::Passed
    } else {
        TestOutcome::Failed(wrong_answer(number, test_case, &response.output))
    }
}

pub fn wrong_answer(number: usize, test_case: &TestCase, actual: &str) -> Verdict {
    Verdict {
        status: SubmissionStatus::WrongAnswer,
        output: format!(
            "Failed on test case {}.\nInput:\n{}\n\nExpected Output:\n{}\n\nYour Output:\n{}",
            number, test_case.input, test_case.expected_output, actual
        ),
    }
}

pub fn accepted() -> Verdict {
    Verdict {
        status: SubmissionStatus::Accepted,
        output: ACCEPTED_MESSAGE.to_string(),
    }
}

/// The executor could not be reached or answered with an error status
pub fn executor_failure(number: usize, error: &dyn Display) -> Verdict {
    Verdict {
        status: SubmissionStatus::RuntimeError,
        output: format!("Error on test case {}: {}", number, error),
    }
}

/// Anything that went wrong outside the per-test-case loop
pub fn internal_error() -> Verdict {
    Verdict {
        status: SubmissionStatus::Error,
        output: INTERNAL_ERROR_MESSAGE.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_test_case(input: &str, expected_output: &str) -> TestCase {
        TestCase {
            input: input.to_string(),
            expected_output: expected_output.to_string(),
        }
    }

    fn ok(stdout: &str) -> RunResponse {
        RunResponse::ok(stdout.to_string())
    }

    #[test]
    fn test_normalize_output() {
        assert_eq!(normalize_output("hello"), "hello");
        assert_eq!(normalize_output("  hello  "), "hello");
        assert_eq!(normalize_output("hello\n"), "hello");
        assert_eq!(normalize_output("\nhello\r\n"), "hello");
        assert_eq!(normalize_output("  hello world  \n"), "hello world");
        assert_eq!(normalize_output(""), "");
        assert_eq!(normalize_output("   "), "");
    }

    #[test]
    fn test_exact_match_passes() {
        let outcome = evaluate_test(1, &make_test_case("5 3", "8"), &ok("8"));
        assert_eq!(outcome, TestOutcome::Passed);
    }

    #[test]
    fn test_surrounding_whitespace_ignored() {
        let outcome = evaluate_test(1, &make_test_case("", "hello"), &ok("  hello  \n"));
        assert_eq!(outcome, TestOutcome::Passed);
    }

    #[test]
    fn test_internal_whitespace_preserved() {
        let outcome = evaluate_test(1, &make_test_case("", "1 2 3"), &ok("1  2 3\n"));
        assert!(matches!(outcome, TestOutcome::Failed(ref v) if v.status == SubmissionStatus::WrongAnswer));
    }

    #[test]
    fn test_multiline_output() {
        let outcome = evaluate_test(
            1,
            &make_test_case("", "line1\nline2\nline3"),
            &ok("line1\nline2\nline3\n"),
        );
        assert_eq!(outcome, TestOutcome::Passed);
    }

    #[test]
    fn test_case_sensitivity() {
        let outcome = evaluate_test(1, &make_test_case("", "Hello"), &ok("hello"));
        assert!(matches!(outcome, TestOutcome::Failed(_)));
    }

    #[test]
    fn test_empty_expected_output() {
        let outcome = evaluate_test(1, &make_test_case("", ""), &ok("   \n"));
        assert_eq!(outcome, TestOutcome::Passed);
    }

    #[test]
    fn test_wrong_answer_diagnostic() {
        let outcome = evaluate_test(1, &make_test_case("5 3", "9"), &ok("8\n"));
        let TestOutcome::Failed(verdict) = outcome else {
            panic!("expected a failed outcome");
        };
        assert_eq!(verdict.status, SubmissionStatus::WrongAnswer);
        assert_eq!(
            verdict.output,
            "Failed on test case 1.\nInput:\n5 3\n\nExpected Output:\n9\n\nYour Output:\n8\n"
        );
    }

    #[test]
    fn test_unclassified_failure_is_compilation_error() {
        let response = RunResponse::failed("main.cpp:1:1: error: expected ';'".to_string(), None);
        let outcome = evaluate_test(1, &make_test_case("", "8"), &response);
        assert_eq!(
            outcome,
            TestOutcome::Failed(Verdict {
                status: SubmissionStatus::CompilationError,
                output: "main.cpp:1:1: error: expected ';'".to_string(),
            })
        );
    }

    #[test]
    fn test_runtime_and_timeout_failures_are_runtime_errors() {
        for kind in [FailureKind::Runtime, FailureKind::Timeout] {
            let response = RunResponse::failed("boom".to_string(), Some(kind));
            let outcome = evaluate_test(2, &make_test_case("", "8"), &response);
            assert!(matches!(
                outcome,
                TestOutcome::Failed(ref v) if v.status == SubmissionStatus::RuntimeError && v.output == "boom"
            ));
        }
    }

    #[test]
    fn test_unsupported_language_is_compilation_error() {
        let response = RunResponse::unsupported_language("ruby");
        let outcome = evaluate_test(1, &make_test_case("", "8"), &response);
        assert!(matches!(
            outcome,
            TestOutcome::Failed(ref v) if v.status == SubmissionStatus::CompilationError
                && v.output == "Unsupported language: ruby"
        ));
    }

    #[test]
    fn test_fixed_messages() {
        assert_eq!(accepted().output, "All test cases passed!");
        assert_eq!(internal_error().status, SubmissionStatus::Error);
        let verdict = executor_failure(3, &"connection refused");
        assert_eq!(verdict.status, SubmissionStatus::RuntimeError);
        assert_eq!(verdict.output, "Error on test case 3: connection refused");
    }
}
