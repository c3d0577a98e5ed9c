//! Shared fixtures for the unit tests: minimal in-memory schemas and row
//! seeds. The real schema is owned by the platform's migrations; these
//! tables carry only the columns this crate reads and writes.

use crate::pool::DbPool;
use sqlx::sqlite::SqlitePoolOptions;

pub async fn memory_pool() -> DbPool {
    SqlitePoolOptions::new()
        .max_connections(1)
        .connect(":memory:")
        .await
        .unwrap()
}

pub async fn setup_jobs_db() -> DbPool {
    let pool = memory_pool().await;
    sqlx::query(
        r#"
        CREATE TABLE jobs (
            id TEXT PRIMARY KEY,
            project_id TEXT NOT NULL DEFAULT 'p1',
            status TEXT NOT NULL,
            ssot TEXT NOT NULL DEFAULT '{}',
            stage_progress TEXT,
            retry_count INTEGER NOT NULL DEFAULT 0,
            max_retries INTEGER NOT NULL DEFAULT 3,
            locked_at TEXT,
            locked_by TEXT,
            next_run_at TEXT,
            error_code TEXT,
            error_message TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL DEFAULT ''
        )
        "#,
    )
    .execute(&pool)
    .await
    .unwrap();
    pool
}

pub async fn insert_job(pool: &DbPool, id: &str, status: &str, created_at: &str) {
    sqlx::query("INSERT INTO jobs (id, status, created_at) VALUES (?, ?, ?)")
        .bind(id)
        .bind(status)
        .bind(created_at)
        .execute(pool)
        .await
        .unwrap();
}

pub async fn setup_render_db() -> DbPool {
    let pool = memory_pool().await;
    sqlx::query(
        r#"
        CREATE TABLE render_requests (
            id TEXT PRIMARY KEY,
            job_id TEXT NOT NULL,
            page_num INTEGER NOT NULL,
            kind TEXT NOT NULL,
            dpi INTEGER NOT NULL,
            status TEXT NOT NULL DEFAULT 'PENDING',
            output_key TEXT,
            created_at TEXT NOT NULL,
            completed_at TEXT,
            UNIQUE (job_id, page_num, kind)
        )
        "#,
    )
    .execute(&pool)
    .await
    .unwrap();
    pool
}

pub async fn setup_storage_db() -> DbPool {
    let pool = memory_pool().await;
    sqlx::query(
        r#"
        CREATE TABLE storage_objects (
            id TEXT PRIMARY KEY,
            job_id TEXT NOT NULL,
            bucket TEXT NOT NULL,
            key TEXT NOT NULL,
            size_bytes INTEGER NOT NULL DEFAULT 0,
            sha256 TEXT,
            content_type TEXT,
            ttl_policy TEXT,
            expires_at TEXT,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(&pool)
    .await
    .unwrap();
    pool
}
