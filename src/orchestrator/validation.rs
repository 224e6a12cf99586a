// ABOUTME: Input validation for agent registration requests
// ABOUTME: Name, redirect URI and scope checks producing validation errors
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use url::Url;

use super::models::AgentRegistration;
use crate::certificates::is_valid_agent_id;
use a2a_trust_core::constants::oauth::ALLOWED_SCOPES;
use a2a_trust_core::{AppError, AppResult};

/// Longest accepted display name
const MAX_NAME_LENGTH: usize = 256;

/// Reject malformed registrations before anything is stored
///
/// # Errors
///
/// Returns a validation error naming the first offending field
pub fn validate_registration(registration: &AgentRegistration) -> AppResult<()> {
    let name = registration.name.trim();
    if name.is_empty() {
        return Err(field_error("name", "Agent name is required"));
    }
    if name.len() > MAX_NAME_LENGTH {
        return Err(field_error(
            "name",
            &format!("Agent name must be at most {MAX_NAME_LENGTH} characters"),
        ));
    }

    if registration.redirect_uris.is_empty() {
        return Err(field_error(
            "redirect_uris",
            "At least one redirect URI is required",
        ));
    }
    for uri in &registration.redirect_uris {
        validate_redirect_uri(uri)?;
    }

    if let Some(scopes) = &registration.scopes {
        if scopes.is_empty() {
            return Err(field_error("scopes", "Scopes must not be empty when given"));
        }
        if let Some(unknown) = scopes
            .iter()
            .find(|scope| !ALLOWED_SCOPES.contains(&scope.as_str()))
        {
            return Err(field_error(
                "scopes",
                &format!(
                    "Unknown scope '{unknown}'; allowed scopes are {}",
                    ALLOWED_SCOPES.join(", ")
                ),
            ));
        }
    }

    if let Some(agent_id) = &registration.agent_id {
        if !is_valid_agent_id(agent_id) {
            return Err(field_error(
                "agent_id",
                "Agent id may only contain letters, digits, '-', '_' and '.'",
            ));
        }
    }

    Ok(())
}

fn validate_redirect_uri(uri: &str) -> AppResult<()> {
    let parsed = Url::parse(uri)
        .map_err(|e| field_error("redirect_uris", &format!("Invalid redirect URI '{uri}': {e}")))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(field_error(
            "redirect_uris",
            &format!("Redirect URI '{uri}' must use http or https"),
        ));
    }
    if parsed.fragment().is_some() {
        return Err(field_error(
            "redirect_uris",
            &format!("Redirect URI '{uri}' must not contain a fragment"),
        ));
    }
    Ok(())
}

fn field_error(field: &str, message: &str) -> AppError {
    AppError::validation(message).with_details(serde_json::json!({ "field": field }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registration() -> AgentRegistration {
        AgentRegistration {
            name: "Agent A".into(),
            redirect_uris: vec!["https://a.example/callback".into()],
            scopes: Some(vec!["read".into(), "write".into()]),
            ..AgentRegistration::default()
        }
    }

    #[test]
    fn test_valid_registration() {
        assert!(validate_registration(&registration()).is_ok());
    }

    #[test]
    fn test_rejects_bad_fields() {
        let mut blank = registration();
        blank.name = "   ".into();
        assert!(validate_registration(&blank).is_err());

        let mut no_uris = registration();
        no_uris.redirect_uris.clear();
        assert!(validate_registration(&no_uris).is_err());

        let mut relative = registration();
        relative.redirect_uris = vec!["/callback".into()];
        assert!(validate_registration(&relative).is_err());

        let mut custom_scheme = registration();
        custom_scheme.redirect_uris = vec!["myapp://callback".into()];
        assert!(validate_registration(&custom_scheme).is_err());

        let mut bad_scope = registration();
        bad_scope.scopes = Some(vec!["root".into()]);
        let error = validate_registration(&bad_scope).unwrap_err();
        assert_eq!(error.code, a2a_trust_core::ErrorCode::ValidationFailed);
        assert_eq!(error.details.unwrap()["field"], "scopes");
    }
}
