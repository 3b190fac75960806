use std::env;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    pub cors_origin: String,
    pub payment_provider_url: Option<String>,
    pub payment_timeout_secs: u64,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = env::var("DATABASE_URL")?;
        let host = env::var("SERVER_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("SERVER_PORT")
            .ok()
            .and_then(|p| p.parse::<u16>().ok())
            .unwrap_or(5000);
        let cors_origin = env::var("CORS_ORIGIN").unwrap_or_else(|_| "*".to_string());
        let payment_provider_url = env::var("PAYMENT_PROVIDER_URL")
            .ok()
            .filter(|u| !u.is_empty());
        let payment_timeout_secs = env::var("PAYMENT_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(30);
        Ok(Self {
            database_url,
            host,
            port,
            cors_origin,
            payment_provider_url,
            payment_timeout_secs,
        })
    }
}
