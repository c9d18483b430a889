use std::sync::Arc;

use config::Config;
use redis::Client as RedisClient;
use sqlx::PgPool;

use gateway::StreamGateway;

pub mod config;
pub mod domain;
pub mod error;
pub mod gateway;
pub mod middleware;
pub mod outbox;
pub mod routes;
pub mod utils;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Config,
    pub redis: Arc<RedisClient>,
    pub gateway: Arc<StreamGateway>,
}
