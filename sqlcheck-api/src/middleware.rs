//! Request-correlation middleware: every response carries `X-Request-ID`
//! (§6.1), either echoed from the inbound header or freshly generated.

use axum::extract::Request;
use axum::http::{HeaderName, HeaderValue};
use axum::middleware::Next;
use axum::response::Response;

pub const REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");

pub async fn request_id(request: Request, next: Next) -> Response {
    let incoming = request
        .headers()
        .get(&REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let mut response = next.run(request).await;

    let value = incoming.unwrap_or_else(|| sqlcheck_types::ids::RequestId::new().to_string());
    if let Ok(header_value) = HeaderValue::from_str(&value) {
        response.headers_mut().insert(REQUEST_ID_HEADER, header_value);
    }
    response
}
