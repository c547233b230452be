// Submission persistence used by the HTTP handlers

use anyhow::Result;
use arbiter_common::redis;
use arbiter_common::types::Submission;
use async_trait::async_trait;
use uuid::Uuid;

#[async_trait]
pub trait SubmissionRepository: Send + Sync {
    async fn question_exists(&self, question_id: &str) -> Result<bool>;

    /// Persist a `Pending` submission and queue it for the workers
    async fn create(&self, submission: &Submission) -> Result<()>;

    async fn get(&self, id: Uuid) -> Result<Option<Submission>>;

    /// Newest first
    async fn list_for_user(&self, user_id: &str) -> Result<Vec<Submission>>;
}

#[derive(Clone)]
pub struct RedisRepository {
    conn: ::redis::aio::ConnectionManager,
}

impl RedisRepository {
    pub fn new(conn: ::redis::aio::ConnectionManager) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl SubmissionRepository for RedisRepository {
    async fn question_exists(&self, question_id: &str) -> Result<bool> {
        let mut conn = self.conn.clone();
        Ok(redis::get_question(&mut conn, question_id).await?.is_some())
    }

    async fn create(&self, submission: &Submission) -> Result<()> {
        let mut conn = self.conn.clone();
        Ok(redis::create_submission(&mut conn, submission).await?)
    }

    async fn get(&self, id: Uuid) -> Result<Option<Submission>> {
        let mut conn = self.conn.clone();
        Ok(redis::get_submission(&mut conn, &id).await?)
    }

    async fn list_for_user(&self, user_id: &str) -> Result<Vec<Submission>> {
        let mut conn = self.conn.clone();
        Ok(redis::list_user_submissions(&mut conn, user_id).await?)
    }
}
