// Placeholder authorization endpoints. No credentials are checked or issued.

use super::ErrorResponse;
use axum::{
    extract::Query,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use url::Url;

const MOCK_AUTH_CODE: &str = "mock_auth_code";

/// Accept any client registration
pub async fn register() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

#[derive(Debug, Deserialize)]
pub struct AuthorizeQuery {
    pub redirect_uri: Option<String>,
    pub state: Option<String>,
}

/// Redirect straight back to the client with a fixed authorization code
pub async fn authorize(Query(query): Query<AuthorizeQuery>) -> Response {
    let (Some(redirect_uri), Some(state)) = (query.redirect_uri, query.state) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::new("Invalid request: missing redirect_uri or state")),
        )
            .into_response();
    };

    let mut redirect = match Url::parse(&redirect_uri) {
        Ok(url) => url,
        Err(e) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse::with_details(
                    "Invalid request: malformed redirect_uri",
                    e.to_string(),
                )),
            )
                .into_response();
        }
    };

    redirect
        .query_pairs_mut()
        .append_pair("code", MOCK_AUTH_CODE)
        .append_pair("state", &state);

    (StatusCode::FOUND, [(header::LOCATION, redirect.to_string())]).into_response()
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_in: u64,
}

/// Issue fixed tokens for any exchange
pub async fn token() -> Json<TokenResponse> {
    Json(TokenResponse {
        access_token: "mock_access_token".to_string(),
        refresh_token: "mock_refresh_token".to_string(),
        token_type: "Bearer".to_string(),
        expires_in: 3600,
    })
}
