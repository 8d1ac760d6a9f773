/// Authentication configuration loaded from environment variables.
#[derive(Clone)]
pub struct AuthConfig {
    pub issuer: String,
    pub audience: String,
    pub access_token_ttl_secs: i64,
    pub jwt_secret: Option<String>,
    /// Shared secret the scheduler presents as a bearer token.
    pub cron_secret: Option<String>,
}

fn env_secret(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

impl AuthConfig {
    pub fn from_env() -> Self {
        let issuer =
            std::env::var("MAILSYNC_JWT_ISSUER").unwrap_or_else(|_| "http://localhost".into());
        let audience =
            std::env::var("MAILSYNC_JWT_AUDIENCE").unwrap_or_else(|_| "mailsync-api".into());
        let access_token_ttl_secs = std::env::var("MAILSYNC_ACCESS_TOKEN_TTL_SECS")
            .ok()
            .and_then(|v| v.parse::<i64>().ok())
            .unwrap_or(900);

        Self {
            issuer,
            audience,
            access_token_ttl_secs,
            jwt_secret: env_secret("MAILSYNC_JWT_SECRET"),
            cron_secret: env_secret("MAILSYNC_CRON_SECRET"),
        }
    }
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .field("access_token_ttl_secs", &self.access_token_ttl_secs)
            .field("jwt_secret", &self.jwt_secret.as_ref().map(|_| "<redacted>"))
            .field("cron_secret", &self.cron_secret.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}
