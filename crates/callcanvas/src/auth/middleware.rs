//! Authentication middleware.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{FromRequestParts, State},
    http::{
        header::{AUTHORIZATION, COOKIE},
        request::Parts,
    },
    middleware::Next,
    response::Response,
};
use chrono::Utc;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use log::{debug, warn};

use super::{AuthConfig, AuthError, Claims, Role};

/// Lifetime of tokens minted by this service.
const TOKEN_TTL: Duration = Duration::from_secs(24 * 3600);

/// Extract a Bearer token from an Authorization header value.
pub fn bearer_token_from_header(header_value: &str) -> Result<&str, AuthError> {
    let mut parts = header_value.split_whitespace();
    let scheme = parts.next().ok_or(AuthError::InvalidAuthHeader)?;

    if !scheme.eq_ignore_ascii_case("bearer") {
        return Err(AuthError::InvalidAuthHeader);
    }

    let token = parts.next().ok_or(AuthError::InvalidAuthHeader)?;
    if parts.next().is_some() {
        return Err(AuthError::InvalidAuthHeader);
    }

    Ok(token)
}

fn token_from_cookie_header<'a>(cookie_header: &'a str, cookie_name: &str) -> Option<&'a str> {
    cookie_header.split(';').map(str::trim).find_map(|pair| {
        let (name, value) = pair.split_once('=')?;
        (name.trim() == cookie_name).then(|| value.trim())
    })
}

fn token_from_query(query: &str) -> Option<String> {
    query.split('&').find_map(|pair| {
        let (key, value) = pair.split_once('=')?;
        if key == "token" {
            urlencoding::decode(value).ok().map(|s| s.into_owned())
        } else {
            None
        }
    })
}

/// Authentication state shared across handlers.
#[derive(Clone)]
pub struct AuthState {
    config: Arc<AuthConfig>,
    secret: Option<String>,
    decoding_key: Option<DecodingKey>,
}

impl AuthState {
    /// Create auth state from config.
    ///
    /// Resolves `env:VAR_NAME` in the secret at construction time; an
    /// unresolvable reference leaves the state without a key.
    pub fn new(config: AuthConfig) -> Self {
        let secret = match config.resolve_jwt_secret() {
            Ok(secret) => secret,
            Err(e) => {
                warn!("JWT secret unavailable: {}", e);
                None
            }
        };
        let decoding_key = secret
            .as_ref()
            .map(|s| DecodingKey::from_secret(s.as_bytes()));

        Self {
            config: Arc::new(config),
            secret,
            decoding_key,
        }
    }

    pub fn is_dev_mode(&self) -> bool {
        self.config.dev_mode
    }

    pub fn allowed_origins(&self) -> &[String] {
        &self.config.allowed_origins
    }

    /// Validate a token and return its claims.
    pub fn validate_token(&self, token: &str) -> Result<Claims, AuthError> {
        if token.is_empty() {
            return Err(AuthError::MissingAuthHeader);
        }

        if self.config.dev_mode
            && let Some(user_id) = token.strip_prefix("dev:")
        {
            return dev_claims(user_id);
        }

        let decoding_key = self
            .decoding_key
            .as_ref()
            .ok_or_else(|| AuthError::Internal("no JWT secret configured".to_string()))?;

        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.required_spec_claims.clear();

        let token_data = decode::<Claims>(token, decoding_key, &validation).map_err(|e| {
            debug!("JWT validation failed: {:?}", e);
            match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::TokenExpired,
                _ => AuthError::InvalidToken(e.to_string()),
            }
        })?;

        Ok(token_data.claims)
    }

    /// Mint a token for an account.
    pub fn generate_token(&self, user_id: &str, role: Role) -> Result<String, AuthError> {
        let secret = self
            .secret
            .as_ref()
            .ok_or_else(|| AuthError::Internal("no JWT secret configured".to_string()))?;

        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: user_id.to_string(),
            exp: now + TOKEN_TTL.as_secs() as i64,
            iat: Some(now),
            iss: Some("callcanvas".to_string()),
            email: None,
            name: None,
            role: Some(role.to_string()),
            roles: Vec::new(),
        };

        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .map_err(|e| AuthError::Internal(e.to_string()))
    }
}

fn dev_claims(user_id: &str) -> Result<Claims, AuthError> {
    if user_id.trim().is_empty() {
        return Err(AuthError::InvalidToken("empty dev user".to_string()));
    }
    let now = Utc::now().timestamp();
    Ok(Claims {
        sub: user_id.to_string(),
        exp: now + TOKEN_TTL.as_secs() as i64,
        iat: Some(now),
        iss: Some("dev".to_string()),
        email: None,
        name: None,
        role: Some(Role::User.to_string()),
        roles: Vec::new(),
    })
}

/// Authenticated user extracted from request.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub claims: Claims,
}

impl CurrentUser {
    pub fn id(&self) -> &str {
        &self.claims.sub
    }

    pub fn role(&self) -> Role {
        self.claims.effective_role()
    }

    pub fn is_admin(&self) -> bool {
        self.claims.is_admin()
    }
}

impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<CurrentUser>()
            .cloned()
            .ok_or(AuthError::MissingAuthHeader)
    }
}

/// Authentication middleware.
///
/// Validates the token and injects `CurrentUser` into request extensions.
/// Token sources in priority order:
/// 1. Authorization: Bearer <token> header
/// 2. auth_token cookie
/// 3. token query parameter
pub async fn auth_middleware(
    State(auth): State<AuthState>,
    mut req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Result<Response, AuthError> {
    let headers = req.headers();
    let claims = if let Some(header) = headers.get(AUTHORIZATION).and_then(|h| h.to_str().ok()) {
        auth.validate_token(bearer_token_from_header(header)?)?
    } else if let Some(token) = headers
        .get(COOKIE)
        .and_then(|h| h.to_str().ok())
        .and_then(|cookie| token_from_cookie_header(cookie, "auth_token"))
    {
        auth.validate_token(token)?
    } else if let Some(token) = req.uri().query().and_then(token_from_query) {
        auth.validate_token(&token)?
    } else {
        return Err(AuthError::MissingAuthHeader);
    };

    req.extensions_mut().insert(CurrentUser { claims });
    Ok(next.run(req).await)
}

#[cfg(test)]
#[allow(clippy::field_reassign_with_default)]
mod tests {
    use super::*;

    const SECRET: &str = "test-secret-for-unit-tests-minimum-32-chars-long";

    fn state(dev_mode: bool, secret: Option<&str>) -> AuthState {
        let mut config = AuthConfig::default();
        config.dev_mode = dev_mode;
        config.jwt_secret = secret.map(str::to_string);
        AuthState::new(config)
    }

    #[test]
    fn test_bearer_token_from_header() {
        assert_eq!(
            bearer_token_from_header("Bearer abc.def.ghi").unwrap(),
            "abc.def.ghi"
        );
        assert_eq!(bearer_token_from_header("bearer   tok").unwrap(), "tok");

        for case in ["", "Bearer", "Token something", "Bearer token extra"] {
            assert!(bearer_token_from_header(case).is_err(), "{case} should fail");
        }
    }

    #[test]
    fn test_cookie_and_query_tokens() {
        assert_eq!(
            token_from_cookie_header("theme=dark; auth_token=abc ; x=1", "auth_token"),
            Some("abc")
        );
        assert_eq!(token_from_cookie_header("theme=dark", "auth_token"), None);
        assert_eq!(
            token_from_query("a=1&token=dev%3Auser1").as_deref(),
            Some("dev:user1")
        );
        assert_eq!(token_from_query("a=1"), None);
    }

    #[test]
    fn test_generate_and_validate_token() {
        let auth = state(false, Some(SECRET));
        let token = auth.generate_token("acct-1", Role::Admin).unwrap();

        let claims = auth.validate_token(&token).unwrap();
        assert_eq!(claims.sub, "acct-1");
        assert!(claims.is_admin());

        let other = state(false, Some("another-secret-that-is-also-32-chars-long!!"));
        assert!(matches!(
            other.validate_token(&token),
            Err(AuthError::InvalidToken(_))
        ));
    }

    #[test]
    fn test_expired_token_rejected() {
        let claims = Claims {
            sub: "acct-1".to_string(),
            exp: Utc::now().timestamp() - 3600,
            iat: None,
            iss: None,
            email: None,
            name: None,
            role: None,
            roles: vec![],
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap();

        let auth = state(false, Some(SECRET));
        assert!(matches!(
            auth.validate_token(&token),
            Err(AuthError::TokenExpired)
        ));
    }

    #[test]
    fn test_dev_tokens_only_in_dev_mode() {
        let dev = state(true, None);
        assert_eq!(dev.validate_token("dev:user1").unwrap().sub, "user1");
        assert!(dev.validate_token("dev:").is_err());

        let prod = state(false, Some(SECRET));
        assert!(prod.validate_token("dev:user1").is_err());
    }

    #[test]
    fn test_missing_secret() {
        let auth = state(false, None);
        assert!(matches!(
            auth.validate_token("abc"),
            Err(AuthError::Internal(_))
        ));
        assert!(auth.generate_token("u", Role::User).is_err());
        assert!(matches!(
            auth.validate_token(""),
            Err(AuthError::MissingAuthHeader)
        ));
    }
}
