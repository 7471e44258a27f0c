//! JSON-over-HTTP plumbing shared by the embedding and chat clients.

use lore_core::error::AppError;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Upstream error bodies are cut to this many characters in details.
const BODY_PREVIEW_CHARS: usize = 300;

/// Send `body` as JSON and decode the reply. Failures carry `code`; a rate
/// limit, a server error or a transport failure is marked retryable.
pub(crate) fn post_json<B, R>(req: ureq::Request, body: &B, code: &str, endpoint: &str) -> Result<R, AppError>
where
    B: Serialize,
    R: DeserializeOwned,
{
    let resp = req.send_json(body).map_err(|e| call_error(e, code, endpoint))?;
    resp.into_json().map_err(|e| {
        AppError::new(code, format!("Failed to decode {endpoint} response")).with_details(e.to_string())
    })
}

fn call_error(e: ureq::Error, code: &str, endpoint: &str) -> AppError {
    match e {
        ureq::Error::Status(status, resp) => {
            let body: String = resp
                .into_string()
                .unwrap_or_default()
                .chars()
                .take(BODY_PREVIEW_CHARS)
                .collect();
            AppError::new(code, format!("{endpoint} request failed"))
                .with_details(format!("status={status}; body={body}"))
                .with_retryable(status == 429 || status >= 500)
        }
        other => AppError::new(code, format!("Failed to call {endpoint} endpoint"))
            .with_details(other.to_string())
            .with_retryable(true),
    }
}
