pub mod security;

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

use crate::state::AppState;

/// Claims carried by a bearer token this service issued itself. Unlike the
/// Clerk-style frontend SDK this service's predecessor trusted, there is no
/// third party to defer signature verification to — `decode` checks it.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Claims {
    pub sub: String,
    #[serde(default)]
    pub exp: Option<i64>,
}

/// Extension added to the request by the auth middleware.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: String,
}

fn decode_bearer(token: &str, secret: &str) -> Result<Claims, String> {
    let key = DecodingKey::from_secret(secret.as_bytes());
    let mut validation = Validation::new(jsonwebtoken::Algorithm::HS256);
    validation.validate_exp = true;
    decode::<Claims>(token, &key, &validation)
        .map(|data| data.claims)
        .map_err(|e| e.to_string())
}

/// Auth middleware — verifies the bearer token's HS256 signature and adds
/// `AuthUser` to request extensions. Skips auth for public routes, health
/// checks, and the webhook endpoint (which has its own shared-secret check).
pub async fn auth_middleware(State(state): State<AppState>, mut req: Request, next: Next) -> Response {
    let path = req.uri().path().to_string();
    if path.ends_with("/health") || path.contains("/webhooks/") {
        return next.run(req).await;
    }

    let auth_header = req
        .headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string());

    let token = match auth_header {
        Some(ref h) if h.starts_with("Bearer ") => &h[7..],
        _ => {
            return (
                StatusCode::UNAUTHORIZED,
                r#"{"error":"Missing or invalid Authorization header"}"#,
            )
                .into_response();
        }
    };

    match decode_bearer(token, &state.config.auth_jwt_secret) {
        Ok(claims) => {
            tracing::debug!(user_id = %claims.sub, "authenticated request");
            req.extensions_mut().insert(AuthUser { user_id: claims.sub });
            next.run(req).await
        }
        Err(e) => {
            tracing::warn!("JWT verification failed: {}", e);
            (
                StatusCode::UNAUTHORIZED,
                format!(r#"{{"error":"Invalid token: {}"}}"#, e),
            )
                .into_response()
        }
    }
}
