use std::env;
use std::time::Duration;

#[derive(Debug, Clone, serde::Deserialize)]
pub struct Config {
    pub database_url: String,
    pub redis_url: String,
    pub jwt_secret: String,
    pub jwt_expiration_secs: u64,
    pub rate_limit_window_secs: u64,
    pub rate_limit_requests: u32,
    pub server_host: String,
    pub server_port: u16,
    pub stream_api_key: String,
    pub stream_api_secret: String,
    pub stream_base_url: String,
    pub outbox_poll_interval_secs: u64,
}

impl Config {
    pub fn from_env() -> Result<Self, env::VarError> {
        dotenv::dotenv().ok();

        let jwt_expiration = env::var("JWT_EXPIRATION")?
            .trim_end_matches('h')
            .parse::<u64>()
            .unwrap_or(24);
        Ok(Config {
            database_url: env::var("DATABASE_URL")?,
            redis_url: env::var("REDIS_URL")?,
            server_host: env::var("SERVER_HOST")?,
            server_port: env::var("SERVER_PORT")?.parse().unwrap_or(3000),
            jwt_secret: env::var("JWT_SECRET")?,
            jwt_expiration_secs: jwt_expiration * 3600,
            rate_limit_window_secs: env::var("RATE_LIMIT_WINDOW")?.parse().unwrap_or(60),
            rate_limit_requests: env::var("RATE_LIMIT_REQUESTS")?.parse().unwrap_or(100),
            stream_api_key: env::var("STREAM_API_KEY")?,
            stream_api_secret: env::var("STREAM_API_SECRET")?,
            stream_base_url: env::var("STREAM_BASE_URL")
                .unwrap_or_else(|_| "https://chat.stream-io-api.com".to_string()),
            outbox_poll_interval_secs: env::var("OUTBOX_POLL_INTERVAL")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(5),
        })
    }

    pub fn jwt_expiration(&self) -> Duration {
        Duration::from_secs(self.jwt_expiration_secs)
    }

    pub fn rate_limit_window(&self) -> Duration {
        Duration::from_secs(self.rate_limit_window_secs)
    }

    pub fn outbox_poll_interval(&self) -> Duration {
        Duration::from_secs(self.outbox_poll_interval_secs)
    }
}
