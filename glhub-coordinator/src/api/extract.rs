//! Request helpers shared by the handlers

use axum::{
    Form,
    body::Bytes,
    extract::{FromRequest, Request},
    http::{
        HeaderMap,
        header::{AUTHORIZATION, CONTENT_TYPE, HOST},
    },
};
use serde::de::DeserializeOwned;

use crate::api::error::ApiError;
use crate::config::Config;

/// Header GitLab Runner uses to send the job token
pub const JOB_TOKEN_HEADER: &str = "job-token";

/// Job token from `JOB-TOKEN` or an `Authorization: Bearer|Token` header
pub fn job_token(headers: &HeaderMap) -> Option<String> {
    if let Some(token) = header_str(headers, JOB_TOKEN_HEADER) {
        return Some(token.to_string());
    }
    let auth = header_str(headers, AUTHORIZATION.as_str())?;
    auth.strip_prefix("Bearer ")
        .or_else(|| auth.strip_prefix("Token "))
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
}

/// `host[:port]` the client addressed, falling back to the bind address
pub fn server_host(headers: &HeaderMap, config: &Config) -> String {
    header_str(headers, HOST.as_str())
        .map(str::to_string)
        .unwrap_or_else(|| config.bind_addr.replace("0.0.0.0", "localhost"))
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// JSON body whatever the `Content-Type`; failures become a 400 error body
#[derive(Debug, Clone)]
pub struct JsonBody<T>(pub T);

impl<S, T> FromRequest<S> for JsonBody<T>
where
    S: Send + Sync,
    T: DeserializeOwned,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let body = Bytes::from_request(req, state)
            .await
            .map_err(|e| ApiError::BadRequest(e.body_text()))?;
        serde_json::from_slice(&body)
            .map(JsonBody)
            .map_err(|e| ApiError::BadRequest(format!("invalid JSON body: {}", e)))
    }
}

/// Body decoded as a urlencoded form or as JSON, depending on `Content-Type`
#[derive(Debug, Clone)]
pub struct JsonOrForm<T>(pub T);

impl<S, T> FromRequest<S> for JsonOrForm<T>
where
    S: Send + Sync,
    T: DeserializeOwned + Send,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let is_form = req
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.starts_with("application/x-www-form-urlencoded"));

        if is_form {
            let Form(value) = Form::<T>::from_request(req, state)
                .await
                .map_err(|e| ApiError::BadRequest(e.body_text()))?;
            Ok(JsonOrForm(value))
        } else {
            let JsonBody(value) = JsonBody::<T>::from_request(req, state).await?;
            Ok(JsonOrForm(value))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::HeaderValue;
    use axum::response::IntoResponse;
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    struct TokenBody {
        token: String,
    }

    async fn json_body(body: &'static str) -> Result<TokenBody, ApiError> {
        let req = axum::http::Request::post("/").body(Body::from(body)).unwrap();
        JsonBody::<TokenBody>::from_request(req, &()).await.map(|JsonBody(v)| v)
    }

    #[test]
    fn test_job_token_sources() {
        let mut headers = HeaderMap::new();
        assert_eq!(job_token(&headers), None);

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer abc"));
        assert_eq!(job_token(&headers).as_deref(), Some("abc"));

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Token def"));
        assert_eq!(job_token(&headers).as_deref(), Some("def"));

        headers.insert(JOB_TOKEN_HEADER, HeaderValue::from_static("ghi"));
        assert_eq!(job_token(&headers).as_deref(), Some("ghi"));

        let mut basic = HeaderMap::new();
        basic.insert(AUTHORIZATION, HeaderValue::from_static("Basic Zm9vOmJhcg=="));
        assert_eq!(job_token(&basic), None);
    }

    #[tokio::test]
    async fn test_json_body_without_content_type() {
        assert_eq!(json_body(r#"{"token":"abc"}"#).await.unwrap().token, "abc");
    }

    #[tokio::test]
    async fn test_json_body_rejections_are_bad_requests() {
        for body in ["{", r#"{"token": 5}"#, ""] {
            let err = json_body(body).await.unwrap_err();
            assert!(matches!(err, ApiError::BadRequest(_)), "{}", body);
            assert_eq!(err.into_response().status(), axum::http::StatusCode::BAD_REQUEST);
        }
    }

    #[test]
    fn test_server_host() {
        let config = Config::default();
        let mut headers = HeaderMap::new();
        assert_eq!(server_host(&headers, &config), "localhost:8080");

        headers.insert(HOST, HeaderValue::from_static("ci.example.com:9000"));
        assert_eq!(server_host(&headers, &config), "ci.example.com:9000");
    }
}
