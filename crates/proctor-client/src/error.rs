//! Mapping of transport and HTTP failures onto [`ServiceError`].

use proctor_core::error::ServiceError;
use reqwest::Response;

/// Classify a failed request.
pub(crate) fn from_reqwest(e: reqwest::Error, timeout_secs: u64) -> ServiceError {
    if e.is_timeout() {
        ServiceError::Timeout(timeout_secs)
    } else if e.is_decode() {
        ServiceError::InvalidResponse(e.to_string())
    } else {
        ServiceError::Network(e.to_string())
    }
}

/// Pass 2xx/3xx responses through; turn everything else into an error
/// carrying the response body.
pub(crate) async fn check_status(response: Response) -> Result<Response, ServiceError> {
    let status = response.status().as_u16();
    if status < 400 {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(match status {
        401 | 403 => ServiceError::Unauthorized(body),
        404 => ServiceError::NotFound(body),
        _ => ServiceError::Api {
            status,
            message: body,
        },
    })
}
