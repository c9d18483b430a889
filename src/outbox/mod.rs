use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool, postgres::PgExecutor, types::Json};

use crate::AppState;
use crate::gateway::{GatewayOp, StreamGateway};

// 重试上限，超过后标记为failed，等待人工处理
const MAX_ATTEMPTS: i32 = 5;
const BATCH_SIZE: i64 = 20;

/// 网关同步的outbox记录。主事务提交时入队，
/// 后台worker负责投递，失败只记录不回滚主变更。
#[derive(Debug, FromRow)]
pub struct OutboxEntry {
    pub outbox_id: i64,
    pub operation: String,
    pub payload: Json<GatewayOp>,
    pub status: String,
    pub attempts: i32,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

/// 入队一条网关同步操作。传入事务执行器即可与主写入同事务提交。
pub async fn enqueue<'e>(
    executor: impl PgExecutor<'e>,
    op: &GatewayOp,
) -> Result<(), sqlx::Error> {
    sqlx::query("INSERT INTO gateway_outbox (operation, payload) VALUES ($1, $2)")
        .bind(op.name())
        .bind(Json(op))
        .execute(executor)
        .await?;
    Ok(())
}

/// 取一批pending记录并投递。FOR UPDATE SKIP LOCKED 允许多实例并行消费。
pub async fn drain(pool: &PgPool, gateway: &StreamGateway) -> Result<usize, sqlx::Error> {
    let mut tx = pool.begin().await?;

    let entries: Vec<OutboxEntry> = sqlx::query_as(
        r#"
        SELECT outbox_id, operation, payload, status, attempts, created_at, processed_at
        FROM gateway_outbox
        WHERE status = 'pending'
        ORDER BY outbox_id
        LIMIT $1
        FOR UPDATE SKIP LOCKED
        "#,
    )
    .bind(BATCH_SIZE)
    .fetch_all(&mut *tx)
    .await?;

    let mut delivered = 0;
    for entry in &entries {
        match gateway.dispatch(&entry.payload.0).await {
            Ok(()) => {
                sqlx::query(
                    "UPDATE gateway_outbox SET status = 'done', processed_at = NOW() WHERE outbox_id = $1",
                )
                .bind(entry.outbox_id)
                .execute(&mut *tx)
                .await?;
                delivered += 1;
            }
            Err(e) => {
                // 外部网关失败永远不向上传播，只记录并择机重试
                tracing::warn!(
                    "gateway sync failed (outbox {}, op {}): {}",
                    entry.outbox_id,
                    entry.operation,
                    e
                );
                sqlx::query(
                    r#"
                    UPDATE gateway_outbox
                    SET attempts = attempts + 1,
                        status = CASE WHEN attempts + 1 >= $2 THEN 'failed' ELSE 'pending' END
                    WHERE outbox_id = $1
                    "#,
                )
                .bind(entry.outbox_id)
                .bind(MAX_ATTEMPTS)
                .execute(&mut *tx)
                .await?;
            }
        }
    }

    tx.commit().await?;
    Ok(delivered)
}

/// 常驻后台任务：周期性消费outbox
pub async fn run_worker(state: AppState) {
    let mut interval = tokio::time::interval(state.config.outbox_poll_interval());
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    tracing::info!(
        "gateway outbox worker started (poll every {:?})",
        state.config.outbox_poll_interval()
    );

    loop {
        interval.tick().await;
        match drain(&state.pool, &state.gateway).await {
            Ok(0) => {}
            Ok(n) => tracing::debug!("delivered {} gateway operations", n),
            Err(e) => tracing::error!("outbox drain failed: {}", e),
        }
    }
}
