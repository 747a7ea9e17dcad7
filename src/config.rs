use std::env;

/// Configuração carregada do ambiente (.env via dotenv)
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub cors_origins: Vec<String>,
    pub bcrypt_cost: u32,
    pub jwt: JwtConfig,
    pub rate_limit: RateLimitConfig,
    pub notifications: NotificationConfig,
    pub seed_admin: Option<SeedAdmin>,
}

/// First admin account, created at startup when `SEED_ADMIN_EMAIL` and
/// `SEED_ADMIN_PASSWORD` are both set.
#[derive(Debug, Clone)]
pub struct SeedAdmin {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub password: String,
}

#[derive(Debug, Clone)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub access_ttl_minutes: i64,
    pub refresh_ttl_days: i64,
}

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub auth_per_minute: u32,
    pub api_per_minute: u32,
    /// Only behind a reverse proxy: key clients by `X-Forwarded-For` / `X-Real-IP`
    /// instead of the socket peer address.
    pub trust_proxy: bool,
}

#[derive(Debug, Clone, Default)]
pub struct NotificationConfig {
    pub email_api_url: Option<String>,
    pub email_api_key: Option<String>,
    pub email_from: String,
    pub sms_api_url: Option<String>,
    pub sms_api_key: Option<String>,
    pub sms_sender: String,
}

impl Default for JwtConfig {
    fn default() -> Self {
        Self {
            secret: "default-secret-change-me".to_string(),
            issuer: "courier-service".to_string(),
            audience: "courier-api".to_string(),
            access_ttl_minutes: 60,
            refresh_ttl_days: 30,
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            auth_per_minute: 10,
            api_per_minute: 120,
            trust_proxy: false,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, String> {
        let database_url =
            env::var("DATABASE_URL").map_err(|_| "DATABASE_URL must be set".to_string())?;

        let defaults = JwtConfig::default();
        let jwt = JwtConfig {
            secret: var_or("JWT_SECRET", &defaults.secret),
            issuer: var_or("JWT_ISSUER", &defaults.issuer),
            audience: var_or("JWT_AUDIENCE", &defaults.audience),
            access_ttl_minutes: parse_or("JWT_ACCESS_TTL_MINUTES", defaults.access_ttl_minutes),
            refresh_ttl_days: parse_or("JWT_REFRESH_TTL_DAYS", defaults.refresh_ttl_days),
        };

        if jwt.secret == defaults.secret {
            log::warn!("⚠️  JWT_SECRET not set, using the default development secret");
        }

        let limits = RateLimitConfig::default();
        let rate_limit = RateLimitConfig {
            auth_per_minute: parse_or("RATE_LIMIT_AUTH_PER_MINUTE", limits.auth_per_minute),
            api_per_minute: parse_or("RATE_LIMIT_API_PER_MINUTE", limits.api_per_minute),
            trust_proxy: parse_or("RATE_LIMIT_TRUST_PROXY", limits.trust_proxy),
        };

        let notifications = NotificationConfig {
            email_api_url: env::var("EMAIL_API_URL").ok(),
            email_api_key: env::var("EMAIL_API_KEY").ok(),
            email_from: var_or("EMAIL_FROM", "no-reply@courier.local"),
            sms_api_url: env::var("SMS_API_URL").ok(),
            sms_api_key: env::var("SMS_API_KEY").ok(),
            sms_sender: var_or("SMS_SENDER", "COURIER"),
        };

        let seed_admin = match (env::var("SEED_ADMIN_EMAIL"), env::var("SEED_ADMIN_PASSWORD")) {
            (Ok(email), Ok(password)) => Some(SeedAdmin {
                name: var_or("SEED_ADMIN_NAME", "Administrator"),
                email,
                phone: var_or("SEED_ADMIN_PHONE", "+10000000000"),
                password,
            }),
            _ => None,
        };

        Ok(Self {
            host: var_or("HOST", "0.0.0.0"),
            port: parse_or("PORT", 3002),
            database_url,
            cors_origins: parse_origins(&var_or(
                "CORS_ORIGINS",
                "http://localhost:3000,http://127.0.0.1:3000",
            )),
            bcrypt_cost: parse_or("BCRYPT_COST", bcrypt::DEFAULT_COST),
            jwt,
            rate_limit,
            notifications,
            seed_admin,
        })
    }
}

fn var_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parse_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            log::warn!("⚠️  Ignoring invalid value for {}: {}", key, raw);
            default
        }),
        Err(_) => default,
    }
}

fn parse_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|origin| origin.trim().trim_end_matches('/').to_string())
        .filter(|origin| !origin.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn origins_are_trimmed() {
        assert_eq!(
            parse_origins(" http://a.test/ , ,http://b.test"),
            vec!["http://a.test".to_string(), "http://b.test".to_string()]
        );
    }

    #[test]
    fn parse_or_falls_back_on_garbage() {
        env::set_var("COURIER_TEST_PORT_GARBAGE", "not-a-number");
        assert_eq!(parse_or("COURIER_TEST_PORT_GARBAGE", 8080u16), 8080);
        env::set_var("COURIER_TEST_PORT_OK", " 9090 ");
        assert_eq!(parse_or("COURIER_TEST_PORT_OK", 8080u16), 9090);
    }
}
