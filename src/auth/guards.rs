use rocket::Request;
use rocket::State;
use rocket::request::{FromRequest, Outcome};
use rocket_okapi::request::OpenApiFromRequest;
use sha2::{Digest, Sha256};

use crate::auth::{AuthError, AuthResult, AuthState};

/// Operator identified by a valid access token.
#[derive(Debug, Clone, OpenApiFromRequest)]
pub struct AuthUser {
    pub subject: String,
    pub role: String,
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for AuthUser {
    type Error = AuthError;

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        match extract_user(request).await {
            Ok(user) => Outcome::Success(user),
            Err(err) => {
                log::debug!("rejected access token: {}", err);
                Outcome::Error((err.status(), err))
            }
        }
    }
}

/// The external scheduler, identified by the shared cron secret.
#[derive(Debug, Clone, Copy, OpenApiFromRequest)]
pub struct CronCaller;

#[rocket::async_trait]
impl<'r> FromRequest<'r> for CronCaller {
    type Error = AuthError;

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        match check_cron_secret(request).await {
            Ok(()) => Outcome::Success(CronCaller),
            Err(err) => {
                log::warn!("rejected cron trigger from {:?}: {}", request.client_ip(), err);
                Outcome::Error((err.status(), err))
            }
        }
    }
}

async fn auth_state<'r>(request: &'r Request<'_>) -> AuthResult<&'r State<AuthState>> {
    request
        .guard::<&State<AuthState>>()
        .await
        .succeeded()
        .ok_or_else(|| AuthError::Config("AuthState missing from state".into()))
}

async fn extract_user(request: &Request<'_>) -> AuthResult<AuthUser> {
    let token = bearer_token_from_request(request)?;
    let state = auth_state(request).await?;
    let jwt = state.jwt_service.as_ref().ok_or(AuthError::Unauthorized)?;

    let claims = jwt.decode_access_token(token)?;
    Ok(AuthUser {
        subject: claims.sub,
        role: claims.role,
    })
}

async fn check_cron_secret(request: &Request<'_>) -> AuthResult<()> {
    let token = bearer_token_from_request(request)?;
    let state = auth_state(request).await?;
    let expected = state
        .config
        .cron_secret
        .as_deref()
        .ok_or(AuthError::Unauthorized)?;

    if secrets_match(token, expected) {
        Ok(())
    } else {
        Err(AuthError::Unauthorized)
    }
}

/// Constant-time comparison over SHA-256 digests of both values.
fn secrets_match(presented: &str, expected: &str) -> bool {
    let presented = Sha256::digest(presented.as_bytes());
    let expected = Sha256::digest(expected.as_bytes());
    presented
        .iter()
        .zip(expected.iter())
        .fold(0u8, |acc, (a, b)| acc | (a ^ b))
        == 0
}

fn bearer_token_from_request<'r>(request: &'r Request<'_>) -> AuthResult<&'r str> {
    let header = request
        .headers()
        .get_one("Authorization")
        .ok_or(AuthError::Unauthorized)?;
    let mut parts = header.splitn(2, ' ');
    let scheme = parts.next().unwrap_or_default();
    let token = parts.next().unwrap_or_default().trim();
    if scheme.eq_ignore_ascii_case("Bearer") && !token.is_empty() {
        Ok(token)
    } else {
        Err(AuthError::Unauthorized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secret_comparison() {
        assert!(secrets_match("cron-secret", "cron-secret"));
        assert!(!secrets_match("cron-secret ", "cron-secret"));
        assert!(!secrets_match("", "cron-secret"));
    }
}
