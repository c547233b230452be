// CLI commands for operating Arbiter
use anyhow::{bail, Context, Result};
use arbiter_common::config::{env_or, executor_url, redis_url};
use arbiter_common::redis;
use arbiter_common::types::{Question, RunRequest, RunResponse, Submission, SubmissionStatus};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::{Duration, Instant};

const DEFAULT_API_URL: &str = "http://127.0.0.1:3000";
const USER_ID_HEADER: &str = "x-user-id";
const POLL_INTERVAL: Duration = Duration::from_secs(1);

fn api_url() -> String {
    env_or("API_URL", DEFAULT_API_URL)
        .trim_end_matches('/')
        .to_string()
}

fn http_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(120))
        .build()
        .context("Failed to create HTTP client")
}

/// Load and sanity-check a question file
fn load_question(path: &Path) -> Result<Question> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let question: Question = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))?;

    if question.title.trim().is_empty() {
        bail!("Question title must not be empty");
    }
    Ok(question)
}

/// Store a question in Redis
pub async fn add_question(id: &str, file: &Path) -> Result<()> {
    if id.trim().is_empty() {
        bail!("Question id must not be empty");
    }
    let question = load_question(file)?;

    println!("📝 Adding question '{}' ({})", id, question.title);

    let client = ::redis::Client::open(redis_url()).context("Invalid REDIS_URL")?;
    let mut conn = ::redis::aio::ConnectionManager::new(client)
        .await
        .context("Failed to connect to Redis")?;
    redis::put_question(&mut conn, id, &question).await?;

    println!(
        "✅ Question '{}' stored with {} test case(s)",
        id,
        question.test_cases.len()
    );
    if question.test_cases.is_empty() {
        println!("⚠️  No test cases: every submission will be Accepted");
    }
    Ok(())
}

/// Run a file once on the executor and print what it answered
pub async fn run_code(language: &str, file: &Path, input_file: Option<&Path>) -> Result<()> {
    let code = fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let input = match input_file {
        Some(path) => fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?,
        None => String::new(),
    };

    let request = RunRequest {
        language: language.to_string(),
        code: Some(code),
        input,
    };

    let url = format!("{}/run", executor_url());
    let response = http_client()?
        .post(&url)
        .json(&request)
        .send()
        .await
        .with_context(|| format!("Failed to reach executor at {}", url))?;
    let body: RunResponse = response
        .json()
        .await
        .context("Failed to parse executor response")?;

    print_run_response(&body);
    Ok(())
}

fn print_run_response(response: &RunResponse) {
    if response.success {
        println!("✅ Run succeeded\n");
    } else {
        match response.error_kind {
            Some(kind) => println!("❌ Run failed ({:?})\n", kind),
            None => println!("❌ Run failed\n"),
        }
    }
    println!("{}", response.output);
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubmitResponse {
    success: bool,
    #[serde(default)]
    submission_id: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SubmissionResponse {
    success: bool,
    #[serde(default)]
    submission: Option<Submission>,
    #[serde(default)]
    message: Option<String>,
}

/// Submit a file through the API
pub async fn submit(question: &str, language: &str, file: &Path, user: &str) -> Result<()> {
    let code = fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;

    let url = format!("{}/submissions", api_url());
    let response = http_client()?
        .post(&url)
        .header(USER_ID_HEADER, user)
        .json(&serde_json::json!({
            "questionId": question,
            "language": language,
            "code": code,
        }))
        .send()
        .await
        .with_context(|| format!("Failed to reach API at {}", url))?;

    let status = response.status();
    let body: SubmitResponse = response.json().await.context("Failed to parse API response")?;

    match (body.success, body.submission_id) {
        (true, Some(id)) => {
            println!("🚀 Submission queued: {}", id);
            println!("\n📋 Follow it with: arbiter-cli status --id {} --user {} --wait", id, user);
            Ok(())
        }
        _ => bail!(
            "Submission rejected ({}): {}",
            status,
            body.message.unwrap_or_default()
        ),
    }
}

/// Whether `status --wait` should poll again
fn keep_polling(status: SubmissionStatus, wait: Option<Duration>, elapsed: Duration) -> bool {
    match wait {
        Some(max_wait) => status == SubmissionStatus::Pending && elapsed + POLL_INTERVAL <= max_wait,
        None => false,
    }
}

/// Print a submission, optionally polling up to `wait` until it leaves Pending
pub async fn status(id: &str, user: &str, wait: Option<Duration>) -> Result<()> {
    let client = http_client()?;
    let url = format!("{}/submissions/{}", api_url(), id);
    let started = Instant::now();

    loop {
        let response = client
            .get(&url)
            .header(USER_ID_HEADER, user)
            .send()
            .await
            .with_context(|| format!("Failed to reach API at {}", url))?;
        let status = response.status();
        let body: SubmissionResponse = response.json().await.context("Failed to parse API response")?;

        let submission = match (body.success, body.submission) {
            (true, Some(submission)) => submission,
            _ => bail!("Lookup failed ({}): {}", status, body.message.unwrap_or_default()),
        };

        if keep_polling(submission.status, wait, started.elapsed()) {
            tokio::time::sleep(POLL_INTERVAL).await;
            continue;
        }

        print_submission(&submission);
        if wait.is_some() && submission.status == SubmissionStatus::Pending {
            bail!(
                "Still Pending after {}s; the submission stays queued",
                started.elapsed().as_secs()
            );
        }
        return Ok(());
    }
}

fn verdict_icon(status: SubmissionStatus) -> &'static str {
    match status {
        SubmissionStatus::Pending => "⏳",
        SubmissionStatus::Accepted => "✅",
        SubmissionStatus::WrongAnswer => "❌",
        SubmissionStatus::CompilationError | SubmissionStatus::RuntimeError => "💥",
        SubmissionStatus::Error => "⚠️ ",
    }
}

fn print_submission(submission: &Submission) {
    println!(
        "{} {} [{} / {}]",
        verdict_icon(submission.status),
        submission.status,
        submission.question_id,
        submission.language
    );
    println!("   id:      {}", submission.id);
    println!("   created: {}", submission.created_at.to_rfc3339());
    if !submission.output.is_empty() {
        println!("\n{}", submission.output);
    }
}
