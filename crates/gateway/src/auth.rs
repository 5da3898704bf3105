//! Bearer token verification.
//!
//! Tokens are HS256 JWTs issued by the identity provider. A token is accepted
//! when its signature matches the shared secret, `aud` and `iss` match the
//! configured values, and `exp` has not passed (allowing `leeway_secs` of
//! clock skew). The verified `sub` becomes the [`AuthUser`] for the request.

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use faceagent_config::{AuthConfig, ConfigError};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use tracing::debug;

use crate::AppState;
use crate::error::ApiError;

type HmacSha256 = Hmac<Sha256>;

/// The authenticated subject, inserted into request extensions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    pub subject: String,
}

/// Why a token was refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthFailure {
    Expired,
    Invalid(String),
}

impl AuthFailure {
    fn invalid(reason: impl Into<String>) -> Self {
        Self::Invalid(reason.into())
    }
}

impl From<AuthFailure> for ApiError {
    fn from(failure: AuthFailure) -> Self {
        match failure {
            AuthFailure::Expired => ApiError::Unauthorized("Token expired"),
            AuthFailure::Invalid(_) => ApiError::Unauthorized("Invalid token"),
        }
    }
}

#[derive(Deserialize)]
struct Header {
    alg: String,
}

/// `aud` may be a single string or a list.
#[derive(Deserialize)]
#[serde(untagged)]
enum Audience {
    One(String),
    Many(Vec<String>),
}

impl Audience {
    fn contains(&self, expected: &str) -> bool {
        match self {
            Audience::One(aud) => aud == expected,
            Audience::Many(auds) => auds.iter().any(|a| a == expected),
        }
    }
}

#[derive(Deserialize)]
struct Claims {
    sub: String,
    exp: i64,
    aud: Audience,
    iss: String,
}

/// HS256 verifier bound to one secret, issuer and audience.
#[derive(Clone)]
pub struct JwtVerifier {
    secret: Vec<u8>,
    issuer: String,
    audience: String,
    leeway_secs: i64,
}

impl std::fmt::Debug for JwtVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtVerifier")
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .field("leeway_secs", &self.leeway_secs)
            .finish_non_exhaustive()
    }
}

impl JwtVerifier {
    pub fn new(
        secret: impl Into<Vec<u8>>,
        issuer: impl Into<String>,
        audience: impl Into<String>,
        leeway_secs: u64,
    ) -> Self {
        Self {
            secret: secret.into(),
            issuer: issuer.into(),
            audience: audience.into(),
            leeway_secs: i64::try_from(leeway_secs).unwrap_or(i64::MAX),
        }
    }

    pub fn from_config(config: &AuthConfig) -> Result<Self, ConfigError> {
        let secret = config
            .jwt_secret
            .as_deref()
            .ok_or_else(|| ConfigError::ValidationError("auth.jwt_secret is required".into()))?;
        let issuer = config
            .issuer
            .as_deref()
            .ok_or_else(|| ConfigError::ValidationError("auth.issuer is required".into()))?;
        Ok(Self::new(secret, issuer, config.audience.clone(), config.leeway_secs))
    }

    /// Verify `token` at the current time.
    pub fn verify(&self, token: &str) -> Result<AuthUser, AuthFailure> {
        self.verify_at(token, chrono::Utc::now().timestamp())
    }

    /// Verify `token` as if the clock read `now` (seconds since the epoch).
    pub fn verify_at(&self, token: &str, now: i64) -> Result<AuthUser, AuthFailure> {
        let mut parts = token.split('.');
        let (Some(header_b64), Some(payload_b64), Some(signature_b64), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(AuthFailure::invalid("token must have three segments"));
        };

        let header: Header = decode_segment(header_b64)?;
        if header.alg != "HS256" {
            return Err(AuthFailure::invalid(format!("unsupported alg {}", header.alg)));
        }

        let signature = URL_SAFE_NO_PAD
            .decode(signature_b64)
            .map_err(|e| AuthFailure::invalid(format!("signature encoding: {e}")))?;
        let signing_input = &token[..header_b64.len() + 1 + payload_b64.len()];
        self.mac(signing_input)?
            .verify_slice(&signature)
            .map_err(|_| AuthFailure::invalid("signature mismatch"))?;

        let claims: Claims = decode_segment(payload_b64)?;
        if now > claims.exp.saturating_add(self.leeway_secs) {
            return Err(AuthFailure::Expired);
        }
        if !claims.aud.contains(&self.audience) {
            return Err(AuthFailure::invalid("audience mismatch"));
        }
        if claims.iss != self.issuer {
            return Err(AuthFailure::invalid("issuer mismatch"));
        }
        if claims.sub.is_empty() {
            return Err(AuthFailure::invalid("empty subject"));
        }

        Ok(AuthUser { subject: claims.sub })
    }

    /// Mint an HS256 token for `claims` with this verifier's secret.
    ///
    /// Used for local development tokens and in tests.
    pub fn sign(&self, claims: &serde_json::Value) -> Result<String, AuthFailure> {
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
        let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
        let signing_input = format!("{header}.{payload}");
        let signature = self.mac(&signing_input)?.finalize().into_bytes();
        Ok(format!("{signing_input}.{}", URL_SAFE_NO_PAD.encode(signature)))
    }

    /// Standard claims for `subject`, valid for `ttl_secs` from now.
    pub fn claims_for(&self, subject: &str, ttl_secs: i64) -> serde_json::Value {
        serde_json::json!({
            "sub": subject,
            "aud": self.audience,
            "iss": self.issuer,
            "exp": chrono::Utc::now().timestamp() + ttl_secs,
        })
    }

    fn mac(&self, signing_input: &str) -> Result<HmacSha256, AuthFailure> {
        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .map_err(|e| AuthFailure::invalid(format!("secret: {e}")))?;
        mac.update(signing_input.as_bytes());
        Ok(mac)
    }
}

fn decode_segment<T: serde::de::DeserializeOwned>(segment: &str) -> Result<T, AuthFailure> {
    let bytes = URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|e| AuthFailure::invalid(format!("segment encoding: {e}")))?;
    serde_json::from_slice(&bytes).map_err(|e| AuthFailure::invalid(format!("segment json: {e}")))
}

/// Extract the token from an `Authorization: Bearer <token>` header value.
/// The scheme name is case-insensitive.
fn bearer_token(header: &str) -> Option<&str> {
    let (scheme, token) = header.trim_start().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    Some(token.trim()).filter(|t| !t.is_empty())
}

/// Authentication middleware for protected routes.
///
/// Requires a valid `Authorization: Bearer <token>` header and stores the
/// verified [`AuthUser`] in the request extensions.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let header = req
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());
    let Some(token) = header.and_then(bearer_token) else {
        debug!("Missing bearer token");
        return Err(ApiError::Unauthorized("Invalid token"));
    };

    let user = state.auth.verify(token).map_err(|failure| {
        debug!(?failure, "Bearer token refused");
        ApiError::from(failure)
    })?;

    req.extensions_mut().insert(user);
    Ok(next.run(req).await)
}
