//! Request plumbing shared by every HTTP-backed oracle and store.

use reqwest::{RequestBuilder, Response};
use serde::de::DeserializeOwned;

use crate::context::Context;
use crate::error::{Error, Result};

const MAX_ERROR_BODY: usize = 512;

/// Send `request` under `ctx`, mapping transport errors and non-2xx statuses
/// to [`Error::BackendRequest`] tagged with `service`.
pub async fn send(ctx: &Context, service: &str, request: RequestBuilder) -> Result<Response> {
    let request = match ctx.remaining() {
        Some(left) => request.timeout(left),
        None => request,
    };
    ctx.run(async {
        let response = request.send().await.map_err(|e| Error::backend(service, e))?;
        ensure_success(service, response).await
    })
    .await
}

/// Send and decode a JSON body.
pub async fn send_json<T: DeserializeOwned>(ctx: &Context, service: &str, request: RequestBuilder) -> Result<T> {
    let response = send(ctx, service, request).await?;
    read_json(ctx, service, response).await
}

pub async fn read_json<T: DeserializeOwned>(ctx: &Context, service: &str, response: Response) -> Result<T> {
    let bytes = ctx
        .run(async { response.bytes().await.map_err(|e| Error::backend(service, e)) })
        .await?;
    serde_json::from_slice(&bytes).map_err(|e| Error::backend(service, e))
}

async fn ensure_success(service: &str, response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    tracing::debug!(service, status = status.as_u16(), "request rejected");
    Err(Error::backend_status(service, status.as_u16(), truncate(&body)))
}

fn truncate(body: &str) -> String {
    let body = body.trim();
    if body.len() <= MAX_ERROR_BODY {
        return body.to_string();
    }
    let mut end = MAX_ERROR_BODY;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &body[..end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn long_bodies_are_cut() {
        let body = "x".repeat(2000);
        let out = truncate(&body);
        assert_eq!(out.len(), MAX_ERROR_BODY + 3);
        assert!(out.ends_with("..."));
    }

    #[test]
    fn multibyte_cut_stays_on_boundary() {
        let body = "é".repeat(600);
        let out = truncate(&body);
        assert!(out.ends_with("..."));
    }
}
