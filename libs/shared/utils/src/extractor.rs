use axum::{
    http::Request,
    middleware::Next,
    response::Response,
    body::Body,
};
use http::HeaderMap;
use tracing::debug;

use shared_models::auth::{Requester, RequesterRole};
use shared_models::error::AppError;

/// Set by the upstream auth gateway after it has verified the caller.
pub const REQUESTER_ID_HEADER: &str = "x-requester-id";
pub const REQUESTER_ROLE_HEADER: &str = "x-requester-role";

// Middleware that turns the forwarded principal headers into a `Requester` extension
pub async fn requester_middleware(
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let requester = requester_from_headers(request.headers())?;
    debug!("Request by {} {}", requester.role, requester.id);

    request.extensions_mut().insert(requester);

    Ok(next.run(request).await)
}

pub fn requester_from_headers(headers: &HeaderMap) -> Result<Requester, AppError> {
    let id = header_str(headers, REQUESTER_ID_HEADER)?;
    if id.is_empty() {
        return Err(AppError::Auth("Empty requester id".to_string()));
    }

    let role: RequesterRole = header_str(headers, REQUESTER_ROLE_HEADER)?
        .parse()
        .map_err(AppError::Auth)?;

    Ok(Requester::new(id, role))
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Result<&'a str, AppError> {
    headers
        .get(name)
        .ok_or_else(|| AppError::Auth(format!("Missing {} header", name)))?
        .to_str()
        .map(str::trim)
        .map_err(|_| AppError::Auth(format!("Invalid {} header format", name)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use axum::{http::StatusCode, routing::get, Extension, Router};
    use http::HeaderValue;
    use tower::ServiceExt;

    fn headers(id: &str, role: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(REQUESTER_ID_HEADER, HeaderValue::from_str(id).unwrap());
        headers.insert(REQUESTER_ROLE_HEADER, HeaderValue::from_str(role).unwrap());
        headers
    }

    #[test]
    fn test_requester_from_valid_headers() {
        let requester = requester_from_headers(&headers("42", "patient")).unwrap();
        assert_eq!(requester, Requester::patient(42));
    }

    #[test]
    fn test_unknown_role_rejected() {
        let result = requester_from_headers(&headers("42", "janitor"));
        assert_matches!(result, Err(AppError::Auth(_)));
    }

    #[test]
    fn test_missing_headers_rejected() {
        let result = requester_from_headers(&HeaderMap::new());
        assert_matches!(result, Err(AppError::Auth(_)));
    }

    #[tokio::test]
    async fn test_middleware_inserts_requester() {
        let app = Router::new()
            .route("/", get(|Extension(requester): Extension<Requester>| async move {
                requester.audit_tag()
            }))
            .layer(axum::middleware::from_fn(requester_middleware));

        let request = Request::builder()
            .uri("/")
            .header(REQUESTER_ID_HEADER, "7")
            .header(REQUESTER_ROLE_HEADER, "DOCTOR")
            .body(Body::empty())
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let anonymous = Request::builder().uri("/").body(Body::empty()).unwrap();
        let response = app.oneshot(anonymous).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
