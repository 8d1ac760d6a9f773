use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use uuid::Uuid;

use crate::auth::{AuthConfig, AuthError, AuthResult};

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct AccessTokenClaims {
    pub sub: String,
    pub iss: String,
    pub aud: String,
    pub exp: i64,
    pub iat: i64,
    pub jti: String,
    pub role: String,
}

#[derive(Debug, Clone)]
pub struct SignedAccessToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

pub struct JwtService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    issuer: String,
    audience: String,
    access_token_ttl: Duration,
}

impl JwtService {
    pub fn new(secret: &str, config: &AuthConfig) -> Self {
        let secret_bytes = secret.as_bytes();

        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_audience(&[config.audience.clone()]);
        validation.set_issuer(&[config.issuer.clone()]);
        validation.leeway = 30;

        Self {
            encoding_key: EncodingKey::from_secret(secret_bytes),
            decoding_key: DecodingKey::from_secret(secret_bytes),
            validation,
            issuer: config.issuer.clone(),
            audience: config.audience.clone(),
            access_token_ttl: Duration::seconds(config.access_token_ttl_secs),
        }
    }

    pub fn issue_access_token(&self, subject: &str, role: &str) -> AuthResult<SignedAccessToken> {
        let now = Utc::now();
        let expires_at = now + self.access_token_ttl;

        let claims = AccessTokenClaims {
            sub: subject.to_string(),
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            exp: expires_at.timestamp(),
            iat: now.timestamp(),
            jti: Uuid::new_v4().to_string(),
            role: role.to_string(),
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)?;

        Ok(SignedAccessToken { token, expires_at })
    }

    pub fn decode_access_token(&self, token: &str) -> AuthResult<AccessTokenClaims> {
        match decode::<AccessTokenClaims>(token, &self.decoding_key, &self.validation) {
            Ok(data) => Ok(data.claims),
            Err(err) => match err.kind() {
                ErrorKind::ExpiredSignature => Err(AuthError::TokenExpired),
                _ => Err(AuthError::TokenInvalid),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_test_config(ttl_secs: i64) -> AuthConfig {
        AuthConfig {
            issuer: "https://mailsync.test".into(),
            audience: "mailsync-api".into(),
            access_token_ttl_secs: ttl_secs,
            jwt_secret: Some("super-secret-test-key".into()),
            cron_secret: None,
        }
    }

    #[test]
    fn issues_and_decodes_access_tokens() {
        let config = make_test_config(900);
        let service = JwtService::new("super-secret-test-key", &config);

        let token = service
            .issue_access_token("ops@example.com", "operator")
            .expect("issue token");
        let claims = service
            .decode_access_token(&token.token)
            .expect("decode token");

        assert_eq!(claims.sub, "ops@example.com");
        assert_eq!(claims.role, "operator");
        assert_eq!(claims.aud, "mailsync-api");
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn rejects_tokens_signed_with_another_secret() {
        let config = make_test_config(900);
        let issuer = JwtService::new("some-other-secret", &config);
        let verifier = JwtService::new("super-secret-test-key", &config);

        let token = issuer
            .issue_access_token("ops@example.com", "operator")
            .expect("issue token");
        let err = verifier.decode_access_token(&token.token).unwrap_err();
        assert!(matches!(err, AuthError::TokenInvalid));
    }

    #[test]
    fn reports_expired_tokens() {
        let config = make_test_config(-3600);
        let service = JwtService::new("super-secret-test-key", &config);

        let token = service
            .issue_access_token("ops@example.com", "operator")
            .expect("issue token");
        let err = service.decode_access_token(&token.token).unwrap_err();
        assert!(matches!(err, AuthError::TokenExpired));
    }
}
