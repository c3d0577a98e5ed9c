//! Measurement-task rows mirroring the tasks embedded in the SSOT, so the
//! review UI can list them without parsing job documents.

use chrono::Utc;

use glazebid_protocol::MeasurementTask;

use crate::error::DbError;
use crate::pool::DbPool;

pub async fn insert_measurement_task(
    pool: &DbPool,
    job_id: &str,
    task: &MeasurementTask,
) -> Result<(), DbError> {
    sqlx::query(
        r#"
        INSERT INTO measurement_tasks
            (id, job_id, item_id, dimension_key, status, page_num, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&task.task_id)
    .bind(job_id)
    .bind(&task.item_id)
    .bind(&task.dimension_key)
    .bind(&task.status)
    .bind(task.page_num as i64)
    .bind(Utc::now().to_rfc3339())
    .execute(pool)
    .await?;
    Ok(())
}
