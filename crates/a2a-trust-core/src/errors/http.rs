// ABOUTME: Axum response conversion for AppError
// ABOUTME: Renders errors as a JSON body with the code's HTTP status
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use axum::response::{IntoResponse, Response};
use axum::Json;
use http::StatusCode;
use serde::Serialize;

use super::{AppError, ErrorCode};

/// HTTP error response format
#[derive(Debug, Serialize)]
struct ErrorResponse<'a> {
    error: ErrorResponseDetails<'a>,
}

#[derive(Debug, Serialize)]
struct ErrorResponseDetails<'a> {
    code: ErrorCode,
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<&'a serde_json::Value>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = ErrorResponse {
            error: ErrorResponseDetails {
                code: self.code,
                message: &self.message,
                details: self.details.as_ref(),
            },
        };
        (status, Json(body)).into_response()
    }
}
