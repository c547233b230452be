use crate::types::{JudgeJob, Question, Submission, Verdict};
use chrono::{DateTime, Utc};
use redis::{AsyncCommands, RedisError, RedisResult};
use uuid::Uuid;

/// Redis layout shared by the API and the worker pool.
/// Keys are deterministic so both sides agree without coordination.

pub const QUEUE_KEY: &str = "arbiter:queue";
pub const PENDING_KEY: &str = "arbiter:pending";
pub const SUBMISSION_PREFIX: &str = "arbiter:submission";
pub const CURSOR_PREFIX: &str = "arbiter:cursor";
pub const QUESTION_PREFIX: &str = "arbiter:question";
pub const USER_SUBMISSIONS_PREFIX: &str = "arbiter:user";

pub fn submission_key(id: &Uuid) -> String {
    format!("{}:{}", SUBMISSION_PREFIX, id)
}

pub fn cursor_key(id: &Uuid) -> String {
    format!("{}:{}", CURSOR_PREFIX, id)
}

pub fn question_key(question_id: &str) -> String {
    format!("{}:{}", QUESTION_PREFIX, question_id)
}

pub fn user_submissions_key(user_id: &str) -> String {
    format!("{}:{}:submissions", USER_SUBMISSIONS_PREFIX, user_id)
}

fn serde_err(context: &'static str, e: serde_json::Error) -> RedisError {
    RedisError::from((redis::ErrorKind::TypeError, context, e.to_string()))
}

/// Moves a pending submission to its terminal state, but only if it is still
/// `Pending`. Returns 1 on transition, 0 if already terminal, -1 if missing.
/// The cursor is dropped on every branch: a losing duplicate run may have
/// written it again after the winner finished.
const FINISH_SCRIPT: &str = r#"
redis.call('DEL', KEYS[3])
local raw = redis.call('GET', KEYS[1])
if not raw then
  redis.call('ZREM', KEYS[2], ARGV[3])
  return -1
end
local submission = cjson.decode(raw)
if submission['status'] ~= 'Pending' then
  return 0
end
submission['status'] = ARGV[1]
submission['output'] = ARGV[2]
redis.call('SET', KEYS[1], cjson.encode(submission))
redis.call('ZREM', KEYS[2], ARGV[3])
return 1
"#;

/// Pop a judge job (producers RPUSH, workers BLPOP), blocking up to
/// `timeout_seconds` so callers can notice shutdown
pub async fn pop_job(
    conn: &mut redis::aio::ConnectionManager,
    timeout_seconds: f64,
) -> RedisResult<Option<JudgeJob>> {
    let result: Option<(String, String)> = conn.blpop(QUEUE_KEY, timeout_seconds).await?;

    match result {
        Some((_key, payload)) => {
            let job: JudgeJob =
                serde_json::from_str(&payload).map_err(|e| serde_err("deserialization error", e))?;
            Ok(Some(job))
        }
        None => Ok(None),
    }
}

/// Persist a new `Pending` submission and queue it for judging in one transaction
pub async fn create_submission(
    conn: &mut redis::aio::ConnectionManager,
    submission: &Submission,
) -> RedisResult<()> {
    let payload =
        serde_json::to_string(submission).map_err(|e| serde_err("serialization error", e))?;
    let job = serde_json::to_string(&JudgeJob::new(submission.id))
        .map_err(|e| serde_err("serialization error", e))?;
    let member = submission.id.to_string();
    let created_ms = submission.created_at.timestamp_millis();

    redis::pipe()
        .atomic()
        .set(submission_key(&submission.id), payload)
        .ignore()
        .zadd(PENDING_KEY, &member, Utc::now().timestamp_millis())
        .ignore()
        .zadd(user_submissions_key(&submission.user_id), &member, created_ms)
        .ignore()
        .rpush(QUEUE_KEY, job)
        .ignore()
        .query_async(conn)
        .await
}

pub async fn get_submission(
    conn: &mut redis::aio::ConnectionManager,
    id: &Uuid,
) -> RedisResult<Option<Submission>> {
    let payload: Option<String> = conn.get(submission_key(id)).await?;

    match payload {
        Some(data) => {
            let submission: Submission =
                serde_json::from_str(&data).map_err(|e| serde_err("deserialization error", e))?;
            Ok(Some(submission))
        }
        None => Ok(None),
    }
}

/// All submissions of a user, newest first
pub async fn list_user_submissions(
    conn: &mut redis::aio::ConnectionManager,
    user_id: &str,
) -> RedisResult<Vec<Submission>> {
    let ids: Vec<String> = conn.zrevrange(user_submissions_key(user_id), 0, -1).await?;
    if ids.is_empty() {
        return Ok(Vec::new());
    }

    let keys: Vec<String> = ids
        .iter()
        .map(|id| format!("{}:{}", SUBMISSION_PREFIX, id))
        .collect();
    let payloads: Vec<Option<String>> = redis::cmd("MGET").arg(&keys).query_async(conn).await?;

    payloads
        .into_iter()
        .flatten()
        .map(|data| serde_json::from_str(&data).map_err(|e| serde_err("deserialization error", e)))
        .collect()
}

/// Write the terminal verdict. Returns `false` when the submission had already
/// left `Pending` (or no longer exists), in which case nothing is written.
pub async fn finish_submission(
    conn: &mut redis::aio::ConnectionManager,
    id: &Uuid,
    verdict: &Verdict,
) -> RedisResult<bool> {
    let script = redis::Script::new(FINISH_SCRIPT);
    let outcome: i64 = script
        .key(submission_key(id))
        .key(PENDING_KEY)
        .key(cursor_key(id))
        .arg(verdict.status.as_str())
        .arg(&verdict.output)
        .arg(id.to_string())
        .invoke_async(conn)
        .await?;

    Ok(outcome == 1)
}

/// Index of the next test case to evaluate (0 when judging has not started)
pub async fn get_cursor(
    conn: &mut redis::aio::ConnectionManager,
    id: &Uuid,
) -> RedisResult<usize> {
    let cursor: Option<usize> = conn.get(cursor_key(id)).await?;
    Ok(cursor.unwrap_or(0))
}

/// Record progress and refresh the submission's last-progress timestamp
pub async fn advance_cursor(
    conn: &mut redis::aio::ConnectionManager,
    id: &Uuid,
    next: usize,
) -> RedisResult<()> {
    redis::pipe()
        .atomic()
        .set(cursor_key(id), next)
        .ignore()
        .cmd("ZADD")
        .arg(PENDING_KEY)
        .arg("XX")
        .arg(Utc::now().timestamp_millis())
        .arg(id.to_string())
        .ignore()
        .query_async(conn)
        .await
}

/// Pending submissions whose last progress is at or before `cutoff`
pub async fn stale_pending(
    conn: &mut redis::aio::ConnectionManager,
    cutoff: DateTime<Utc>,
) -> RedisResult<Vec<Uuid>> {
    let members: Vec<String> = conn
        .zrangebyscore(PENDING_KEY, "-inf", cutoff.timestamp_millis())
        .await?;

    Ok(members
        .iter()
        .filter_map(|m| Uuid::parse_str(m).ok())
        .collect())
}

/// Queue a pending submission again and mark it as freshly touched so a
/// concurrent sweep does not queue it twice
pub async fn requeue(
    conn: &mut redis::aio::ConnectionManager,
    id: &Uuid,
) -> RedisResult<()> {
    let job = serde_json::to_string(&JudgeJob::new(*id))
        .map_err(|e| serde_err("serialization error", e))?;

    redis::pipe()
        .atomic()
        .cmd("ZADD")
        .arg(PENDING_KEY)
        .arg("XX")
        .arg(Utc::now().timestamp_millis())
        .arg(id.to_string())
        .ignore()
        .rpush(QUEUE_KEY, job)
        .ignore()
        .query_async(conn)
        .await
}

pub async fn get_question(
    conn: &mut redis::aio::ConnectionManager,
    question_id: &str,
) -> RedisResult<Option<Question>> {
    let payload: Option<String> = conn.get(question_key(question_id)).await?;

    match payload {
        Some(data) => {
            let question: Question =
                serde_json::from_str(&data).map_err(|e| serde_err("deserialization error", e))?;
            Ok(Some(question))
        }
        None => Ok(None),
    }
}

pub async fn put_question(
    conn: &mut redis::aio::ConnectionManager,
    question_id: &str,
    question: &Question,
) -> RedisResult<()> {
    let payload = serde_json::to_string(question).map_err(|e| serde_err("serialization error", e))?;
    conn.set(question_key(question_id), payload).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{SubmissionStatus, TestCase};

    #[test]
    fn test_key_layout() {
        let id = Uuid::new_v4();
        assert_eq!(submission_key(&id), format!("arbiter:submission:{}", id));
        assert_eq!(cursor_key(&id), format!("arbiter:cursor:{}", id));
        assert_eq!(question_key("two-sum"), "arbiter:question:two-sum");
        assert_eq!(user_submissions_key("u1"), "arbiter:user:u1:submissions");
    }

    #[test]
    fn test_keys_deterministic() {
        let id = Uuid::new_v4();
        assert_eq!(submission_key(&id), submission_key(&id));
        assert_ne!(submission_key(&id), submission_key(&Uuid::new_v4()));
    }

    async fn connect() -> redis::aio::ConnectionManager {
        let client = redis::Client::open("redis://127.0.0.1:6379")
            .expect("Failed to create Redis client");
        client
            .get_connection_manager()
            .await
            .expect("Failed to connect to Redis")
    }

    #[tokio::test]
    #[ignore] // Requires Redis
    async fn test_finish_is_compare_and_set() {
        let mut conn = connect().await;
        let submission = Submission::new_pending(
            "user-1".to_string(),
            "q-1".to_string(),
            "python".to_string(),
            "print(1)".to_string(),
        );
        create_submission(&mut conn, &submission).await.unwrap();
        advance_cursor(&mut conn, &submission.id, 2).await.unwrap();
        assert_eq!(get_cursor(&mut conn, &submission.id).await.unwrap(), 2);

        let accepted = Verdict {
            status: SubmissionStatus::Accepted,
            output: "All test cases passed!".to_string(),
        };
        assert!(finish_submission(&mut conn, &submission.id, &accepted).await.unwrap());

        let late = Verdict {
            status: SubmissionStatus::Error,
            output: "late".to_string(),
        };
        assert!(!finish_submission(&mut conn, &submission.id, &late).await.unwrap());

        let stored = get_submission(&mut conn, &submission.id).await.unwrap().unwrap();
        assert_eq!(stored.status, SubmissionStatus::Accepted);
        assert_eq!(stored.output, "All test cases passed!");
        assert_eq!(get_cursor(&mut conn, &submission.id).await.unwrap(), 0);
    }

    #[tokio::test]
    #[ignore] // Requires Redis
    async fn test_late_duplicate_run_leaves_no_cursor() {
        let mut conn = connect().await;
        let submission = Submission::new_pending(
            "user-1".to_string(),
            "q-1".to_string(),
            "python".to_string(),
            "print(1)".to_string(),
        );
        create_submission(&mut conn, &submission).await.unwrap();

        let accepted = Verdict {
            status: SubmissionStatus::Accepted,
            output: "All test cases passed!".to_string(),
        };
        assert!(finish_submission(&mut conn, &submission.id, &accepted).await.unwrap());

        // A second run of the same job keeps saving progress until it tries to finish
        advance_cursor(&mut conn, &submission.id, 3).await.unwrap();
        assert_eq!(get_cursor(&mut conn, &submission.id).await.unwrap(), 3);
        assert!(!finish_submission(&mut conn, &submission.id, &accepted).await.unwrap());

        let exists: bool = conn.exists(cursor_key(&submission.id)).await.unwrap();
        assert!(!exists);
        let score: Option<f64> = conn.zscore(PENDING_KEY, submission.id.to_string()).await.unwrap();
        assert!(score.is_none());
    }

    #[tokio::test]
    #[ignore] // Requires Redis
    async fn test_question_round_trip() {
        let mut conn = connect().await;
        let id = format!("q-{}", Uuid::new_v4());
        let question = Question {
            title: "Sum".to_string(),
            description: String::new(),
            test_cases: vec![TestCase {
                input: "5 3".to_string(),
                expected_output: "8".to_string(),
            }],
        };
        put_question(&mut conn, &id, &question).await.unwrap();
        let loaded = get_question(&mut conn, &id).await.unwrap().unwrap();
        assert_eq!(loaded.test_cases, question.test_cases);
        assert!(get_question(&mut conn, "missing-question").await.unwrap().is_none());
    }
}
