// ABOUTME: OAuth 2.0 token and revocation endpoints
// ABOUTME: Form-encoded requests answered with token JSON or RFC 6749 error JSON
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

//! OAuth 2.0 routes
//!
//! - `GET /oauth/authorize` - issues a code for a PKCE S256 challenge and
//!   redirects to the registered URI with `code` (and the client's `state`)
//! - `POST /oauth/token` - `authorization_code` and `refresh_token` grants
//! - `POST /oauth/revoke` - RFC 7009 revocation; always answers 200

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Form, Json, Router,
};
use tracing::debug;
use url::Url;

use crate::oauth2_server::models::{AuthorizeRequest, RevokeRequest, TokenRequest};
use crate::oauth2_server::{GrantType, OAuth2Error, TokenError};
use crate::orchestrator::AuthOrchestrator;
use a2a_trust_core::constants::{endpoints, oauth};
use a2a_trust_core::AppError;

/// OAuth 2.0 routes implementation
pub struct OAuthRoutes;

impl OAuthRoutes {
    /// Create all OAuth routes
    pub fn routes(orchestrator: Arc<AuthOrchestrator>) -> Router {
        Router::new()
            .route(endpoints::OAUTH_AUTHORIZE, get(Self::handle_authorize))
            .route(endpoints::OAUTH_TOKEN, post(Self::handle_token))
            .route(endpoints::OAUTH_REVOKE, post(Self::handle_revoke))
            .with_state(orchestrator)
    }

    async fn handle_authorize(
        State(orchestrator): State<Arc<AuthOrchestrator>>,
        Query(request): Query<AuthorizeRequest>,
    ) -> Response {
        if request.response_type != oauth::RESPONSE_TYPE_CODE {
            return (
                StatusCode::BAD_REQUEST,
                Json(OAuth2Error::unsupported_response_type()),
            )
                .into_response();
        }
        if request.code_challenge_method.as_deref() != Some(oauth::CODE_CHALLENGE_METHOD_S256) {
            return (
                StatusCode::BAD_REQUEST,
                Json(OAuth2Error::invalid_request("code_challenge_method must be S256")),
            )
                .into_response();
        }

        let status = orchestrator.rate_limiter().check(&request.client_id);
        if !status.allowed {
            return AppError::rate_limit_exceeded(&request.client_id, status.limit, status.reset_at)
                .into_response();
        }

        let scopes: Vec<String> = request
            .scope
            .as_deref()
            .unwrap_or_default()
            .split_whitespace()
            .map(str::to_owned)
            .collect();
        let grant = match orchestrator.token_service().authorize_with_challenge(
            &request.client_id,
            &request.redirect_uri,
            &scopes,
            &request.code_challenge,
        ) {
            Ok(grant) => grant,
            Err(error) => {
                debug!(client_id = %request.client_id, error = %error, "Authorization request rejected");
                return token_error_response(&error);
            }
        };

        let Ok(mut location) = Url::parse(&request.redirect_uri) else {
            return (
                StatusCode::BAD_REQUEST,
                Json(OAuth2Error::invalid_request("redirect_uri is not a valid URL")),
            )
                .into_response();
        };
        {
            let mut query = location.query_pairs_mut();
            query.append_pair("code", &grant.code);
            if let Some(state) = request.state.as_deref() {
                query.append_pair("state", state);
            }
        }
        debug!(client_id = %request.client_id, scope = %grant.scope, "Authorization code issued");
        (StatusCode::FOUND, [(header::LOCATION, location.to_string())]).into_response()
    }

    async fn handle_token(
        State(orchestrator): State<Arc<AuthOrchestrator>>,
        Form(request): Form<TokenRequest>,
    ) -> Response {
        let Ok(grant) = request.grant_type.parse::<GrantType>() else {
            return (
                StatusCode::BAD_REQUEST,
                Json(OAuth2Error::unsupported_grant_type()),
            )
                .into_response();
        };

        if let Some(client_id) = request.client_id.as_deref() {
            let status = orchestrator.rate_limiter().check(client_id);
            if !status.allowed {
                return AppError::rate_limit_exceeded(client_id, status.limit, status.reset_at)
                    .into_response();
            }
        }

        let tokens = orchestrator.token_service();
        let result = match grant {
            GrantType::AuthorizationCode => {
                let (
                    Some(code),
                    Some(redirect_uri),
                    Some(client_id),
                    Some(client_secret),
                    Some(code_verifier),
                ) = (
                    request.code.as_deref(),
                    request.redirect_uri.as_deref(),
                    request.client_id.as_deref(),
                    request.client_secret.as_deref(),
                    request.code_verifier.as_deref(),
                )
                else {
                    return (
                        StatusCode::BAD_REQUEST,
                        Json(OAuth2Error::invalid_request(
                            "code, redirect_uri, client_id, client_secret and code_verifier are required",
                        )),
                    )
                        .into_response();
                };
                tokens.exchange_code_for_token(
                    code,
                    client_id,
                    client_secret,
                    redirect_uri,
                    code_verifier,
                )
            }
            GrantType::RefreshToken => {
                let Some(refresh_token) = request.refresh_token.as_deref() else {
                    return (
                        StatusCode::BAD_REQUEST,
                        Json(OAuth2Error::invalid_request("refresh_token is required")),
                    )
                        .into_response();
                };
                tokens.refresh_access_token(refresh_token)
            }
        };

        match result {
            Ok(response) => (StatusCode::OK, Json(response)).into_response(),
            Err(error) => {
                debug!(grant_type = %grant, error = %error, "Token request rejected");
                token_error_response(&error)
            }
        }
    }

    async fn handle_revoke(
        State(orchestrator): State<Arc<AuthOrchestrator>>,
        Form(request): Form<RevokeRequest>,
    ) -> StatusCode {
        let revoked = orchestrator.token_service().revoke_token(&request.token);
        debug!(revoked, "Token revocation requested");
        StatusCode::OK
    }
}

fn token_error_response(error: &TokenError) -> Response {
    let status = match error {
        TokenError::InvalidClient | TokenError::InvalidClientSecret | TokenError::ClientInactive => {
            StatusCode::UNAUTHORIZED
        }
        TokenError::Crypto(_) => StatusCode::INTERNAL_SERVER_ERROR,
        _ => StatusCode::BAD_REQUEST,
    };
    (status, Json(OAuth2Error::from(error))).into_response()
}
