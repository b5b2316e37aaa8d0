use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, QueryBuilder};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    models::{QuestionId, QuizResponse, QuizSession},
    services::{clock::Clock, deadline},
};

/// Persistence for quiz sessions and their ordered responses
///
/// Storing a session is idempotent on its token: resubmitting the same token refreshes
/// the expiry of the existing row instead of creating a second one. A session whose
/// retention already ended is replaced by a fresh one, even before it is purged.
/// Responses are immutable once stored and keep their submission order.
#[async_trait::async_trait]
pub trait SessionStore: Send + Sync {
    /// Creates the session or refreshes an existing one, returning its id
    async fn store_session(&self, session_token: &str, user_id: Option<&str>) -> AppResult<Uuid>;

    /// Appends responses in order, returning how many new rows were written
    async fn store_responses(&self, session_id: Uuid, responses: &[QuizResponse])
        -> AppResult<usize>;

    /// Session with its stored responses
    async fn find_by_token(&self, session_token: &str) -> AppResult<Option<QuizSession>>;

    async fn mark_completed(&self, session_id: Uuid) -> AppResult<()>;

    /// Deletes sessions whose retention window ended before `now`
    async fn purge_expired(&self, now: DateTime<Utc>) -> AppResult<u64>;
}

/// Periodically deletes expired sessions; runs until the returned task is aborted
///
/// A purge that outlives its interval is abandoned and retried on the next tick.
pub fn spawn_purge_task(
    store: Arc<dyn SessionStore>,
    clock: Arc<dyn Clock>,
    every: std::time::Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        loop {
            ticker.tick().await;
            let purged = deadline::bounded(
                every,
                "expired session purge",
                store.purge_expired(clock.now()),
                AppError::SessionStorage,
            )
            .await;
            if let Err(e) = purged {
                tracing::warn!(error = %e, "Expired session purge failed");
            }
        }
    })
}

fn storage_error(context: &str, e: impl std::fmt::Display) -> AppError {
    AppError::SessionStorage(format!("{}: {}", context, e))
}

#[derive(Clone)]
pub struct PostgresSessionStore {
    db_pool: PgPool,
    clock: Arc<dyn Clock>,
    retention: chrono::Duration,
}

impl PostgresSessionStore {
    pub fn new(db_pool: PgPool, clock: Arc<dyn Clock>, retention: chrono::Duration) -> Self {
        Self {
            db_pool,
            clock,
            retention,
        }
    }
}

#[async_trait::async_trait]
impl SessionStore for PostgresSessionStore {
    async fn store_session(&self, session_token: &str, user_id: Option<&str>) -> AppResult<Uuid> {
        let now = self.clock.now();

        let mut tx = self
            .db_pool
            .begin()
            .await
            .map_err(|e| storage_error("failed to begin quiz session store", e))?;

        // An expired session that is not purged yet must not come back with its responses
        sqlx::query(
            r#"
            DELETE FROM user_quiz_responses
            WHERE session_id IN (
                SELECT id FROM user_quiz_sessions
                WHERE session_token = $1 AND expires_at <= $2
            )
            "#,
        )
        .bind(session_token)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(|e| storage_error("failed to drop expired quiz responses", e))?;

        sqlx::query("DELETE FROM user_quiz_sessions WHERE session_token = $1 AND expires_at <= $2")
            .bind(session_token)
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(|e| storage_error("failed to drop expired quiz session", e))?;

        let session_id: Uuid = sqlx::query_scalar(
            r#"
            INSERT INTO user_quiz_sessions
                (id, session_token, user_id, is_completed, created_at, expires_at)
            VALUES ($1, $2, $3, FALSE, $4, $5)
            ON CONFLICT (session_token) DO UPDATE
            SET expires_at = EXCLUDED.expires_at,
                user_id = COALESCE(user_quiz_sessions.user_id, EXCLUDED.user_id)
            RETURNING id
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(session_token)
        .bind(user_id)
        .bind(now)
        .bind(now + self.retention)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| storage_error("failed to upsert quiz session", e))?;

        tx.commit()
            .await
            .map_err(|e| storage_error("failed to commit quiz session", e))?;

        tracing::debug!(session_id = %session_id, "Quiz session stored");
        Ok(session_id)
    }

    async fn store_responses(
        &self,
        session_id: Uuid,
        responses: &[QuizResponse],
    ) -> AppResult<usize> {
        if responses.is_empty() {
            return Ok(0);
        }

        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
            "INSERT INTO user_quiz_responses \
             (session_id, position, question_id, answer_value, answered_at) ",
        );
        builder.push_values(responses.iter().enumerate(), |mut row, (position, response)| {
            row.push_bind(session_id)
                .push_bind(position as i32)
                .push_bind(response.question_id.as_str())
                .push_bind(&response.answer_value)
                .push_bind(response.answered_at);
        });
        builder.push(" ON CONFLICT (session_id, position) DO NOTHING");

        let result = builder
            .build()
            .execute(&self.db_pool)
            .await
            .map_err(|e| storage_error("failed to store quiz responses", e))?;

        Ok(result.rows_affected() as usize)
    }

    async fn find_by_token(&self, session_token: &str) -> AppResult<Option<QuizSession>> {
        let session = sqlx::query_as::<_, QuizSession>(
            r#"
            SELECT id, session_token, user_id, is_completed, created_at, expires_at
            FROM user_quiz_sessions
            WHERE session_token = $1
            "#,
        )
        .bind(session_token)
        .fetch_optional(&self.db_pool)
        .await
        .map_err(|e| storage_error("failed to load quiz session", e))?;

        let Some(mut session) = session else {
            return Ok(None);
        };

        let rows: Vec<(String, String, Option<DateTime<Utc>>)> = sqlx::query_as(
            r#"
            SELECT question_id, answer_value, answered_at
            FROM user_quiz_responses
            WHERE session_id = $1
            ORDER BY position
            "#,
        )
        .bind(session.id)
        .fetch_all(&self.db_pool)
        .await
        .map_err(|e| storage_error("failed to load quiz responses", e))?;

        session.responses = rows
            .into_iter()
            .filter_map(|(question_id, answer_value, answered_at)| {
                match question_id.parse::<QuestionId>() {
                    Ok(question_id) => Some(QuizResponse {
                        question_id,
                        answer_value,
                        answered_at,
                    }),
                    Err(e) => {
                        tracing::warn!(
                            error = %e,
                            "Skipping stored response with unknown question"
                        );
                        None
                    }
                }
            })
            .collect();

        Ok(Some(session))
    }

    async fn mark_completed(&self, session_id: Uuid) -> AppResult<()> {
        sqlx::query("UPDATE user_quiz_sessions SET is_completed = TRUE WHERE id = $1")
            .bind(session_id)
            .execute(&self.db_pool)
            .await
            .map_err(|e| storage_error("failed to mark quiz session completed", e))?;
        Ok(())
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> AppResult<u64> {
        let mut tx = self
            .db_pool
            .begin()
            .await
            .map_err(|e| storage_error("failed to begin purge", e))?;

        sqlx::query(
            r#"
            DELETE FROM user_quiz_responses
            WHERE session_id IN (SELECT id FROM user_quiz_sessions WHERE expires_at <= $1)
            "#,
        )
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(|e| storage_error("failed to purge expired responses", e))?;

        let purged = sqlx::query("DELETE FROM user_quiz_sessions WHERE expires_at <= $1")
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(|e| storage_error("failed to purge expired sessions", e))?
            .rows_affected();

        tx.commit()
            .await
            .map_err(|e| storage_error("failed to commit purge", e))?;

        tracing::info!(purged = purged, "Purged expired quiz sessions");
        Ok(purged)
    }
}

/// In-memory session store for testing and local runs without Postgres
pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<String, QuizSession>>,
    clock: Arc<dyn Clock>,
    retention: chrono::Duration,
}

impl InMemorySessionStore {
    pub fn new(clock: Arc<dyn Clock>, retention: chrono::Duration) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            clock,
            retention,
        }
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

#[async_trait::async_trait]
impl SessionStore for InMemorySessionStore {
    async fn store_session(&self, session_token: &str, user_id: Option<&str>) -> AppResult<Uuid> {
        let now = self.clock.now();
        let mut sessions = self.sessions.write().await;

        if sessions
            .get(session_token)
            .is_some_and(|session| session.is_expired(now))
        {
            sessions.remove(session_token);
        }

        let session = sessions
            .entry(session_token.to_string())
            .or_insert_with(|| {
                QuizSession::new(
                    session_token.to_string(),
                    user_id.map(str::to_string),
                    now,
                    self.retention,
                )
            });
        session.expires_at = now + self.retention;
        if session.user_id.is_none() {
            session.user_id = user_id.map(str::to_string);
        }

        Ok(session.id)
    }

    async fn store_responses(
        &self,
        session_id: Uuid,
        responses: &[QuizResponse],
    ) -> AppResult<usize> {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .values_mut()
            .find(|s| s.id == session_id)
            .ok_or_else(|| {
                AppError::SessionStorage(format!("no quiz session with id {}", session_id))
            })?;

        // Positions already taken stay untouched
        let stored = session.responses.len();
        let new_responses = responses.iter().skip(stored).cloned().collect::<Vec<_>>();
        let written = new_responses.len();
        session.responses.extend(new_responses);
        Ok(written)
    }

    async fn find_by_token(&self, session_token: &str) -> AppResult<Option<QuizSession>> {
        Ok(self.sessions.read().await.get(session_token).cloned())
    }

    async fn mark_completed(&self, session_id: Uuid) -> AppResult<()> {
        let mut sessions = self.sessions.write().await;
        if let Some(session) = sessions.values_mut().find(|s| s.id == session_id) {
            session.is_completed = true;
        }
        Ok(())
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> AppResult<u64> {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, session| !session.is_expired(now));
        Ok((before - sessions.len()) as u64)
    }
}
