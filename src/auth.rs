//! HTTP Basic Authentication for the administrative endpoints

use axum::{
    body::Body,
    extract::State,
    http::{header, Request, Response, StatusCode},
    middleware::Next,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::sync::Arc;

/// Credentials protecting the admin routes (manual cleanup trigger)
#[derive(Debug, Clone)]
pub struct AdminAuthConfig {
    /// Username for admin routes (None = auth disabled)
    pub username: Option<String>,
    /// Password for admin routes
    pub password: Option<String>,
}

impl AdminAuthConfig {
    /// Load from environment. ADMIN_USERNAME and ADMIN_PASSWORD must both
    /// be set to enable auth.
    pub fn from_env() -> Self {
        let username = std::env::var("ADMIN_USERNAME")
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        let password = std::env::var("ADMIN_PASSWORD")
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        if username.is_some() && password.is_some() {
            tracing::info!("Admin authentication enabled");
            Self { username, password }
        } else {
            if username.is_some() || password.is_some() {
                tracing::warn!(
                    "ADMIN_USERNAME and ADMIN_PASSWORD must both be set to enable authentication"
                );
            }
            tracing::warn!("Admin authentication DISABLED - anyone can trigger cleanup!");
            Self {
                username: None,
                password: None,
            }
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.username.is_some() && self.password.is_some()
    }

    /// Validate credentials
    pub fn validate(&self, username: &str, password: &str) -> bool {
        match (&self.username, &self.password) {
            (Some(u), Some(p)) => {
                // Constant-time comparison to prevent timing attacks
                constant_time_eq(u.as_bytes(), username.as_bytes())
                    && constant_time_eq(p.as_bytes(), password.as_bytes())
            }
            _ => true, // Auth disabled, allow all
        }
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut result = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        result |= x ^ y;
    }
    result == 0
}

fn credentials_from(request: &Request<Body>) -> Option<(String, String)> {
    let auth_header = request.headers().get(header::AUTHORIZATION)?.to_str().ok()?;
    let encoded = auth_header.strip_prefix("Basic ")?;
    let decoded = STANDARD.decode(encoded).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (username, password) = decoded.split_once(':')?;
    Some((username.to_string(), password.to_string()))
}

/// Middleware guarding admin routes with HTTP Basic Auth
pub async fn admin_auth_middleware(
    State(auth_config): State<Arc<AdminAuthConfig>>,
    request: Request<Body>,
    next: Next,
) -> Response<Body> {
    if !auth_config.is_enabled() {
        return next.run(request).await;
    }

    if let Some((username, password)) = credentials_from(&request) {
        if auth_config.validate(&username, &password) {
            return next.run(request).await;
        }
    }

    Response::builder()
        .status(StatusCode::UNAUTHORIZED)
        .header(
            header::WWW_AUTHENTICATE,
            "Basic realm=\"Prompt Fighter Admin\"",
        )
        .body(Body::from("Unauthorized"))
        .unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_disabled_when_incomplete() {
        let config = AdminAuthConfig {
            username: None,
            password: None,
        };
        assert!(!config.is_enabled());
        assert!(config.validate("any", "thing"));

        let config = AdminAuthConfig {
            username: Some("admin".to_string()),
            password: None,
        };
        assert!(!config.is_enabled());
    }

    #[test]
    fn test_auth_enabled_validates() {
        let config = AdminAuthConfig {
            username: Some("admin".to_string()),
            password: Some("secret".to_string()),
        };
        assert!(config.is_enabled());
        assert!(config.validate("admin", "secret"));
        assert!(!config.validate("admin", "wrong"));
        assert!(!config.validate("wrong", "secret"));
        assert!(!config.validate("", ""));
    }

    #[test]
    fn test_credentials_parsed_from_header() {
        let encoded = STANDARD.encode("admin:secret");
        let request = Request::builder()
            .header(header::AUTHORIZATION, format!("Basic {encoded}"))
            .body(Body::empty())
            .unwrap();

        let (username, password) = credentials_from(&request).unwrap();
        assert_eq!(username, "admin");
        assert_eq!(password, "secret");

        let no_header = Request::builder().body(Body::empty()).unwrap();
        assert!(credentials_from(&no_header).is_none());
    }

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq(b"hello", b"hello"));
        assert!(!constant_time_eq(b"hello", b"world"));
        assert!(!constant_time_eq(b"hello", b"hell"));
        assert!(constant_time_eq(b"", b""));
    }
}
