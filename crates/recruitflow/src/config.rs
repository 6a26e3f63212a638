use std::time::Duration;

// Config is a central place for runtime configuration.
// Every knob is read from the environment once, at process start.
#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub worker_id: String,
    pub admin_addr: Option<String>,
    pub migrate_on_startup: bool,

    /// Deadline applied to every executor operation.
    pub op_timeout: Duration,

    pub dispatch_interval: Duration,
    pub dispatch_batch_size: i64,
    pub dispatch_tick_deadline: Duration,

    pub onboarding_dispatch_interval: Duration,
    pub onboarding_invite_interval: Duration,
    pub onboarding_token_valid_mins: i64,
    pub employer_base_url: String,

    pub mail: MailConfig,
    pub metrics_cache_ttl: Duration,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MailMode {
    Smtp,
    Log,
}

#[derive(Clone, Debug)]
pub struct MailConfig {
    pub mode: MailMode,
    pub email_from: String,
    pub smtp_host: String,
    pub smtp_port: u16,
    pub smtp_user: Option<String>,
    pub smtp_password: Option<String>,
    /// Production relays get STARTTLS + credentials; dev relays (mailpit etc.) get neither.
    pub smtp_tls: bool,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let database_url = std::env::var("DATABASE_URL")
            .map_err(|_| anyhow::anyhow!("DATABASE_URL is missing"))?;

        let worker_id = env_or_fallback("RECRUITFLOW_WORKER_ID", "WORKER_ID")
            .or_else(|| std::env::var("HOSTNAME").ok())
            .unwrap_or_else(|| "worker-1".to_string());

        let admin_addr = env_or_fallback("RECRUITFLOW_ADMIN_ADDR", "ADMIN_ADDR")
            .and_then(|s| normalize_optional_addr(&s));

        let migrate_on_startup = env_bool("RECRUITFLOW_MIGRATE_ON_STARTUP").unwrap_or(false);

        let op_timeout = millis("RECRUITFLOW_OP_TIMEOUT_MS", "OP_TIMEOUT_MS", 10_000);

        let dispatch_interval = millis(
            "RECRUITFLOW_DISPATCH_INTERVAL_MS",
            "DISPATCH_INTERVAL_MS",
            30_000,
        );
        let dispatch_batch_size = env_or_fallback("RECRUITFLOW_DISPATCH_BATCH", "DISPATCH_BATCH")
            .and_then(|s| s.parse::<i64>().ok())
            .unwrap_or(10)
            .clamp(1, 500);
        let dispatch_tick_deadline = millis(
            "RECRUITFLOW_DISPATCH_TICK_DEADLINE_MS",
            "DISPATCH_TICK_DEADLINE_MS",
            25_000,
        );

        let onboarding_dispatch_interval = millis(
            "RECRUITFLOW_ONBOARDING_DISPATCH_INTERVAL_MS",
            "ONBOARDING_DISPATCH_INTERVAL_MS",
            60_000,
        );
        let onboarding_invite_interval = millis(
            "RECRUITFLOW_ONBOARDING_INVITE_INTERVAL_MS",
            "ONBOARDING_INVITE_INTERVAL_MS",
            180_000,
        );
        let onboarding_token_valid_mins =
            env_or_fallback("RECRUITFLOW_ONBOARD_TOKEN_VALID_MINS", "ONBOARD_TOKEN_VALID_MINS")
                .and_then(|s| s.parse().ok())
                .unwrap_or(24 * 60);
        let employer_base_url = env_or_fallback("RECRUITFLOW_EMPLOYER_BASE_URL", "EMPLOYER_BASE_URL")
            .unwrap_or_else(|| "http://localhost:3000".to_string());

        let mail = MailConfig::from_env()?;

        let metrics_cache_ttl = millis(
            "RECRUITFLOW_METRICS_CACHE_TTL_MS",
            "METRICS_CACHE_TTL_MS",
            5_000,
        );

        Ok(Self {
            database_url,
            worker_id,
            admin_addr,
            migrate_on_startup,
            op_timeout,
            dispatch_interval,
            dispatch_batch_size,
            dispatch_tick_deadline,
            onboarding_dispatch_interval,
            onboarding_invite_interval,
            onboarding_token_valid_mins,
            employer_base_url,
            mail,
            metrics_cache_ttl,
        })
    }
}

impl MailConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let mode = match env_or_fallback("RECRUITFLOW_MAIL_MODE", "MAIL_MODE")
            .unwrap_or_else(|| "log".to_string())
            .to_lowercase()
            .as_str()
        {
            "smtp" => MailMode::Smtp,
            "log" => MailMode::Log,
            other => anyhow::bail!("unknown MAIL_MODE {other:?} (expected smtp|log)"),
        };

        let email_from = env_or_fallback("RECRUITFLOW_EMAIL_FROM", "EMAIL_FROM")
            .unwrap_or_else(|| "no-reply@recruitflow.local".to_string());

        let smtp_host = env_or_fallback("RECRUITFLOW_SMTP_HOST", "SMTP_HOST")
            .unwrap_or_else(|| "localhost".to_string());
        let smtp_port = env_or_fallback("RECRUITFLOW_SMTP_PORT", "SMTP_PORT")
            .and_then(|s| s.parse().ok())
            .unwrap_or(1025);
        let smtp_user = env_or_fallback("RECRUITFLOW_SMTP_USER", "SMTP_USER");
        let smtp_password = env_or_fallback("RECRUITFLOW_SMTP_PASSWORD", "SMTP_PASSWORD");
        let smtp_tls = env_bool("RECRUITFLOW_SMTP_TLS").unwrap_or(false);

        if mode == MailMode::Smtp && smtp_tls && (smtp_user.is_none() || smtp_password.is_none()) {
            anyhow::bail!("SMTP_USER and SMTP_PASSWORD are required when SMTP_TLS is on");
        }

        Ok(Self {
            mode,
            email_from,
            smtp_host,
            smtp_port,
            smtp_user,
            smtp_password,
            smtp_tls,
        })
    }
}

fn env_or_fallback(primary: &str, fallback: &str) -> Option<String> {
    std::env::var(primary)
        .ok()
        .filter(|s| !s.trim().is_empty())
        .or_else(|| std::env::var(fallback).ok().filter(|s| !s.trim().is_empty()))
}

fn env_bool(key: &str) -> Option<bool> {
    std::env::var(key).ok().map(|v| parse_bool(&v))
}

fn parse_bool(v: &str) -> bool {
    matches!(v.to_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

fn millis(primary: &str, fallback: &str, default_ms: u64) -> Duration {
    let ms = env_or_fallback(primary, fallback)
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or(default_ms)
        .max(1);
    Duration::from_millis(ms)
}

fn normalize_optional_addr(value: &str) -> Option<String> {
    let v = value.trim();
    if v.is_empty() {
        return None;
    }
    if matches!(v.to_lowercase().as_str(), "0" | "off" | "false" | "none") {
        return None;
    }
    Some(v.to_string())
}
