// Submission/question persistence as seen by the judge

use anyhow::Result;
use arbiter_common::redis;
use arbiter_common::types::{Question, Submission, Verdict};
use async_trait::async_trait;
use uuid::Uuid;

#[async_trait]
pub trait SubmissionStore: Send + Sync {
    async fn load_submission(&self, id: Uuid) -> Result<Option<Submission>>;

    async fn load_question(&self, question_id: &str) -> Result<Option<Question>>;

    /// Index of the next test case to evaluate
    async fn load_cursor(&self, id: Uuid) -> Result<usize>;

    async fn save_cursor(&self, id: Uuid, next: usize) -> Result<()>;

    /// Terminal transition; `false` if the submission already left `Pending`
    async fn finish(&self, id: Uuid, verdict: &Verdict) -> Result<bool>;
}

/// Redis-backed store shared by all worker tasks.
///
/// Uses one multiplexed connection; queue popping (BLPOP) must not share it.
#[derive(Clone)]
pub struct RedisStore {
    conn: ::redis::aio::ConnectionManager,
}

impl RedisStore {
    pub fn new(conn: ::redis::aio::ConnectionManager) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl SubmissionStore for RedisStore {
    async fn load_submission(&self, id: Uuid) -> Result<Option<Submission>> {
        let mut conn = self.conn.clone();
        Ok(redis::get_submission(&mut conn, &id).await?)
    }

    async fn load_question(&self, question_id: &str) -> Result<Option<Question>> {
        let mut conn = self.conn.clone();
        Ok(redis::get_question(&mut conn, question_id).await?)
    }

    async fn load_cursor(&self, id: Uuid) -> Result<usize> {
        let mut conn = self.conn.clone();
        Ok(redis::get_cursor(&mut conn, &id).await?)
    }

    async fn save_cursor(&self, id: Uuid, next: usize) -> Result<()> {
        let mut conn = self.conn.clone();
        Ok(redis::advance_cursor(&mut conn, &id, next).await?)
    }

    async fn finish(&self, id: Uuid, verdict: &Verdict) -> Result<bool> {
        let mut conn = self.conn.clone();
        Ok(redis::finish_submission(&mut conn, &id, verdict).await?)
    }
}
