//! Token extraction for vote mutations.

use axum::extract::FromRequestParts;
use axum::http::{header, request::Parts};
use std::convert::Infallible;

/// Token presented in the `Authorization` header, if any.
///
/// Accepted forms:
///
/// ```text
/// Authorization: Bearer <token>
/// Authorization: Token <token>
/// Authorization: Token token="<token>", nonce="..."
/// ```
///
/// A missing or malformed header yields `None`; whether that is acceptable
/// is decided by the operation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PresentedToken(pub Option<String>);

impl PresentedToken {
    pub fn as_deref(&self) -> Option<&str> {
        self.0.as_deref()
    }
}

impl<S> FromRequestParts<S> for PresentedToken
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_authorization);
        Ok(PresentedToken(token))
    }
}

/// Extract the token from an `Authorization` header value
pub fn parse_authorization(value: &str) -> Option<String> {
    let (scheme, rest) = value.trim().split_once(' ')?;
    let rest = rest.trim();

    let token = if scheme.eq_ignore_ascii_case("bearer") {
        rest
    } else if scheme.eq_ignore_ascii_case("token") {
        match rest.strip_prefix("token=") {
            Some(params) => params
                .split(',')
                .next()
                .unwrap_or_default()
                .trim()
                .trim_matches('"'),
            None => rest,
        }
    } else {
        return None;
    };

    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}
