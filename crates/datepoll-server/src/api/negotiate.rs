use axum::{
    extract::{FromRequest, FromRequestParts, Request},
    http::{header, request::Parts, HeaderMap},
    middleware::Next,
    response::{Html, IntoResponse, Response},
    Json,
};
use serde::de::DeserializeOwned;
use std::convert::Infallible;

use super::views;
use crate::error::{AppError, ErrorMessage};

/// Representation requested by the client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Html,
    Json,
}

impl Format {
    /// Pick the first recognised media type of an `Accept` header.
    /// Anything unrecognised or missing falls back to JSON.
    pub fn from_accept(accept: Option<&str>) -> Self {
        let Some(accept) = accept else {
            return Format::Json;
        };

        for range in accept.split(',') {
            let media = range.split(';').next().unwrap_or_default().trim();
            match media.to_ascii_lowercase().as_str() {
                "text/html" | "application/xhtml+xml" => return Format::Html,
                "application/json" | "application/*" | "*/*" => return Format::Json,
                _ => {}
            }
        }
        Format::Json
    }
}

impl<S> FromRequestParts<S> for Format
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let accept = parts
            .headers
            .get(header::ACCEPT)
            .and_then(|v| v.to_str().ok());
        // A form post without Accept comes from a browser
        if accept.is_none() && is_form(&parts.headers) {
            return Ok(Format::Html);
        }
        Ok(Format::from_accept(accept))
    }
}

/// Answer failed browser requests with an error page.
///
/// Only responses built from an [`AppError`] are rewritten; status and the
/// token challenge header are kept.
pub async fn render_html_errors(format: Format, request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    if format != Format::Html {
        return response;
    }
    let Some(ErrorMessage(message)) = response.extensions_mut().remove::<ErrorMessage>() else {
        return response;
    };

    let status = response.status();
    let mut page = (status, Html(views::error_page(status, &message))).into_response();
    if let Some(challenge) = response.headers().get(header::WWW_AUTHENTICATE) {
        page.headers_mut()
            .insert(header::WWW_AUTHENTICATE, challenge.clone());
    }
    page
}

/// Whether the body is an urlencoded form
pub fn is_form(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("application/x-www-form-urlencoded"))
}

/// Request body given either as JSON or as an urlencoded form
pub struct Payload<T>(pub T);

impl<T, S> FromRequest<S> for Payload<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        if is_form(req.headers()) {
            let axum_extra::extract::Form(value) =
                axum_extra::extract::Form::<T>::from_request(req, state)
                    .await
                    .map_err(|e| AppError::BadRequest(e.to_string()))?;
            Ok(Payload(value))
        } else {
            let Json(value) = Json::<T>::from_request(req, state)
                .await
                .map_err(|e| AppError::BadRequest(e.to_string()))?;
            Ok(Payload(value))
        }
    }
}
