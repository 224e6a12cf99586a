// ABOUTME: OAuth 2.0 token service for agent clients using authorization codes with PKCE
// ABOUTME: Registers clients, exchanges codes, rotates refresh tokens and validates bearer tokens
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use std::sync::Arc;

use tracing::{debug, info, warn};
use url::Url;

use super::error::TokenError;
use super::models::{
    AgentIdentity, AuthorizationCode, AuthorizationGrant, ClientRegistration, GrantType, PurgeReport,
    RefreshTokenRecord, RegisteredClient, TokenRecord, TokenResponse, TokenServiceConfig,
};
use super::pkce;
use crate::cleanup::ExpirySweep;
use crate::clock::SharedClock;
use crate::crypto::{constant_time_eq, random_token, sha256_hex};
use crate::store::{MemoryStore, SharedStore};
use a2a_trust_core::constants::{endpoints, oauth};

/// Backing stores of the token service
#[derive(Clone)]
pub struct TokenStores {
    /// Client id -> client
    pub clients: SharedStore<String, RegisteredClient>,
    /// State value -> pending authorization
    pub codes: SharedStore<String, AuthorizationCode>,
    /// Access token -> record
    pub tokens: SharedStore<String, TokenRecord>,
    /// Refresh token -> record
    pub refresh_tokens: SharedStore<String, RefreshTokenRecord>,
}

impl TokenStores {
    /// Fresh in-memory stores
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            clients: MemoryStore::shared(),
            codes: MemoryStore::shared(),
            tokens: MemoryStore::shared(),
            refresh_tokens: MemoryStore::shared(),
        }
    }
}

/// OAuth 2.0 authorization server for agents
pub struct TokenService {
    config: TokenServiceConfig,
    clock: SharedClock,
    stores: TokenStores,
}

impl TokenService {
    /// Create a token service over in-memory stores
    #[must_use]
    pub fn new(config: TokenServiceConfig, clock: SharedClock) -> Self {
        Self::with_stores(config, clock, TokenStores::in_memory())
    }

    /// Create a token service over caller-provided stores
    #[must_use]
    pub const fn with_stores(
        config: TokenServiceConfig,
        clock: SharedClock,
        stores: TokenStores,
    ) -> Self {
        Self {
            config,
            clock,
            stores,
        }
    }

    /// Shared handle convenience
    #[must_use]
    pub fn into_shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    /// Active configuration
    #[must_use]
    pub const fn config(&self) -> &TokenServiceConfig {
        &self.config
    }

    /// Register a client. The plaintext secret is only returned here.
    ///
    /// # Errors
    ///
    /// Returns an error if secure random generation fails
    pub fn register_client(
        &self,
        name: &str,
        redirect_uris: Vec<String>,
        scopes: Option<Vec<String>>,
        grant_types: Option<Vec<GrantType>>,
    ) -> Result<ClientRegistration, TokenError> {
        let client_id = format!(
            "{}{}",
            oauth::CLIENT_ID_PREFIX,
            random_token(oauth::CLIENT_ID_BYTES)?
        );
        let client_secret = random_token(oauth::CLIENT_SECRET_BYTES)?;

        let client = RegisteredClient {
            client_id: client_id.clone(),
            client_secret_hash: sha256_hex(client_secret.as_bytes()),
            name: name.to_owned(),
            redirect_uris,
            scopes: scopes.unwrap_or_else(|| {
                vec![oauth::SCOPE_READ.to_owned(), oauth::SCOPE_WRITE.to_owned()]
            }),
            grant_types: grant_types.unwrap_or_else(GrantType::defaults),
            is_active: true,
            created_at: self.clock.now(),
        };

        self.stores.clients.insert(client_id.clone(), client.clone());
        info!(client_id = %client_id, name = %name, "Registered OAuth client");

        Ok(ClientRegistration {
            client,
            client_secret,
        })
    }

    /// Look up a client
    #[must_use]
    pub fn get_client(&self, client_id: &str) -> Option<RegisteredClient> {
        self.stores.clients.get(&client_id.to_owned())
    }

    /// Start an authorization-code flow and return the authorization URL
    ///
    /// The `state` query parameter of the returned URL is the authorization code.
    /// An empty `scopes` slice requests every scope the client holds.
    ///
    /// # Errors
    ///
    /// Returns an error if the client is unknown or inactive, the redirect URI
    /// is not registered, a scope is not allowed, the client lacks the
    /// `authorization_code` grant, or the verifier is malformed
    pub fn create_authorization_request(
        &self,
        client_id: &str,
        redirect_uri: &str,
        scopes: &[String],
        code_verifier: &str,
    ) -> Result<Url, TokenError> {
        let granted = self.authorize_client(client_id, redirect_uri, scopes)?;
        if !pkce::is_valid_verifier(code_verifier) {
            return Err(TokenError::InvalidCodeVerifier);
        }

        let code_challenge = pkce::code_challenge(code_verifier);
        let grant = self.store_code(client_id, redirect_uri, granted, &code_challenge)?;

        let mut url = self.config.issuer.clone();
        url.set_path(endpoints::OAUTH_AUTHORIZE);
        url.query_pairs_mut()
            .append_pair("response_type", oauth::RESPONSE_TYPE_CODE)
            .append_pair("client_id", client_id)
            .append_pair("redirect_uri", redirect_uri)
            .append_pair("scope", &grant.scope)
            .append_pair("state", &grant.code)
            .append_pair("code_challenge", &code_challenge)
            .append_pair("code_challenge_method", oauth::CODE_CHALLENGE_METHOD_S256);

        debug!(client_id = %client_id, "Created authorization request");
        Ok(url)
    }

    /// Issue an authorization code bound to a client-supplied S256 challenge
    ///
    /// The verifier stays with the client; only the challenge is stored.
    ///
    /// # Errors
    ///
    /// Same client, redirect URI, scope and grant checks as
    /// [`Self::create_authorization_request`], then
    /// [`TokenError::InvalidCodeChallenge`] for a malformed challenge
    pub fn authorize_with_challenge(
        &self,
        client_id: &str,
        redirect_uri: &str,
        scopes: &[String],
        code_challenge: &str,
    ) -> Result<AuthorizationGrant, TokenError> {
        let granted = self.authorize_client(client_id, redirect_uri, scopes)?;
        if !pkce::is_valid_challenge(code_challenge) {
            return Err(TokenError::InvalidCodeChallenge);
        }
        let grant = self.store_code(client_id, redirect_uri, granted, code_challenge)?;
        debug!(client_id = %client_id, "Issued authorization code");
        Ok(grant)
    }

    fn authorize_client(
        &self,
        client_id: &str,
        redirect_uri: &str,
        scopes: &[String],
    ) -> Result<Vec<String>, TokenError> {
        let client = self
            .get_client(client_id)
            .filter(|client| client.is_active)
            .ok_or(TokenError::InvalidClient)?;

        if !client.redirect_uris.iter().any(|uri| uri == redirect_uri) {
            return Err(TokenError::InvalidRedirectUri);
        }

        let granted = if scopes.is_empty() {
            client.scopes.clone()
        } else {
            if let Some(scope) = scopes.iter().find(|s| !client.scopes.contains(s)) {
                return Err(TokenError::InvalidScope(scope.clone()));
            }
            scopes.to_vec()
        };

        if !client.allows_grant(GrantType::AuthorizationCode) {
            return Err(TokenError::UnauthorizedGrant(GrantType::AuthorizationCode));
        }
        Ok(granted)
    }

    fn store_code(
        &self,
        client_id: &str,
        redirect_uri: &str,
        scopes: Vec<String>,
        code_challenge: &str,
    ) -> Result<AuthorizationGrant, TokenError> {
        let code = random_token(oauth::TOKEN_BYTES)?;
        let scope = scopes.join(" ");
        let record = AuthorizationCode {
            code: code.clone(),
            client_id: client_id.to_owned(),
            redirect_uri: redirect_uri.to_owned(),
            scopes,
            code_challenge: code_challenge.to_owned(),
            expires_at: self.clock.now() + self.config.authorization_code_expiry,
        };
        self.stores.codes.insert(code.clone(), record);
        Ok(AuthorizationGrant { code, scope })
    }

    /// Exchange an authorization code for an access/refresh token pair
    ///
    /// # Errors
    ///
    /// Checked in order: [`TokenError::InvalidClient`],
    /// [`TokenError::InvalidClientSecret`], [`TokenError::InvalidOrExpiredCode`],
    /// [`TokenError::InvalidCodeVerifier`]. A verifier mismatch leaves the code
    /// usable.
    pub fn exchange_code_for_token(
        &self,
        code: &str,
        client_id: &str,
        client_secret: &str,
        redirect_uri: &str,
        code_verifier: &str,
    ) -> Result<TokenResponse, TokenError> {
        let client = self
            .get_client(client_id)
            .filter(|client| client.is_active)
            .ok_or(TokenError::InvalidClient)?;

        if !constant_time_eq(&sha256_hex(client_secret.as_bytes()), &client.client_secret_hash) {
            warn!(client_id = %client_id, "Client secret mismatch on code exchange");
            return Err(TokenError::InvalidClientSecret);
        }

        let now = self.clock.now();
        let matches_request = |record: &AuthorizationCode| {
            record.client_id == client_id && record.redirect_uri == redirect_uri && now < record.expires_at
        };

        let record = self
            .stores
            .codes
            .get(&code.to_owned())
            .filter(|record| matches_request(record))
            .ok_or(TokenError::InvalidOrExpiredCode)?;

        if !pkce::verify_challenge(code_verifier, &record.code_challenge) {
            warn!(client_id = %client_id, "PKCE verification failed");
            return Err(TokenError::InvalidCodeVerifier);
        }

        // Single atomic removal decides the winner among concurrent exchanges
        let record = self
            .stores
            .codes
            .remove_if(&code.to_owned(), &matches_request)
            .ok_or(TokenError::InvalidOrExpiredCode)?;

        let response = self.issue_tokens(&client.client_id, record.scopes)?;
        info!(client_id = %client_id, "Exchanged authorization code for tokens");
        Ok(response)
    }

    /// Rotate a refresh token into a new access/refresh pair
    ///
    /// # Errors
    ///
    /// Returns an error if the refresh token is unknown or expired, the client
    /// is inactive, or the client lacks the `refresh_token` grant
    pub fn refresh_access_token(&self, refresh_token: &str) -> Result<TokenResponse, TokenError> {
        let key = refresh_token.to_owned();
        let record = self
            .stores
            .refresh_tokens
            .get(&key)
            .ok_or(TokenError::InvalidRefreshToken)?;

        if self.clock.now() >= record.expires_at {
            self.stores.refresh_tokens.remove(&key);
            self.stores.tokens.remove(&record.access_token);
            return Err(TokenError::RefreshTokenExpired);
        }

        let client = self
            .get_client(&record.client_id)
            .filter(|client| client.is_active)
            .ok_or(TokenError::ClientInactive)?;

        if !client.allows_grant(GrantType::RefreshToken) {
            return Err(TokenError::UnauthorizedGrant(GrantType::RefreshToken));
        }

        let record = self
            .stores
            .refresh_tokens
            .remove(&key)
            .ok_or(TokenError::InvalidRefreshToken)?;
        self.stores.tokens.remove(&record.access_token);

        let response = self.issue_tokens(&record.client_id, record.scopes)?;
        info!(client_id = %record.client_id, "Rotated refresh token");
        Ok(response)
    }

    /// Resolve an access token to the identity it was issued to
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::InvalidToken`] for unknown tokens,
    /// [`TokenError::TokenExpired`] (evicting the token) once `now >= expires_at`,
    /// and [`TokenError::ClientInactive`] for revoked clients
    pub fn validate_token(&self, token: &str) -> Result<AgentIdentity, TokenError> {
        let key = token.to_owned();
        let record = self
            .stores
            .tokens
            .get(&key)
            .ok_or(TokenError::InvalidToken)?;

        if self.clock.now() >= record.expires_at {
            self.stores.tokens.remove(&key);
            debug!(client_id = %record.client_id, "Evicted expired access token");
            return Err(TokenError::TokenExpired);
        }

        let client = self
            .get_client(&record.client_id)
            .filter(|client| client.is_active)
            .ok_or(TokenError::ClientInactive)?;

        Ok(AgentIdentity {
            client_id: client.client_id,
            name: client.name,
            scopes: record.scopes,
            issued_at: record.issued_at,
            expires_at: record.expires_at,
        })
    }

    /// Revoke an access or refresh token together with its linked pair.
    /// Returns whether anything was removed.
    pub fn revoke_token(&self, token: &str) -> bool {
        let key = token.to_owned();
        if let Some(record) = self.stores.tokens.remove(&key) {
            self.stores.refresh_tokens.remove(&record.refresh_token);
            info!(client_id = %record.client_id, "Revoked access token");
            return true;
        }
        if let Some(record) = self.stores.refresh_tokens.remove(&key) {
            self.stores.tokens.remove(&record.access_token);
            info!(client_id = %record.client_id, "Revoked refresh token");
            return true;
        }
        false
    }

    /// Deactivate a client and drop all of its tokens and pending codes
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::InvalidClient`] if the client is unknown
    pub fn revoke_client(&self, client_id: &str) -> Result<(), TokenError> {
        if !self
            .stores
            .clients
            .update(&client_id.to_owned(), &mut |client| client.is_active = false)
        {
            return Err(TokenError::InvalidClient);
        }

        let tokens = self.stores.tokens.retain(&|_, t| t.client_id != client_id);
        let refresh = self
            .stores
            .refresh_tokens
            .retain(&|_, t| t.client_id != client_id);
        self.stores.codes.retain(&|_, c| c.client_id != client_id);

        info!(
            client_id = %client_id,
            access_tokens = tokens,
            refresh_tokens = refresh,
            "Revoked OAuth client"
        );
        Ok(())
    }

    /// Delete expired access tokens, refresh tokens and authorization codes
    pub fn purge_expired(&self) -> PurgeReport {
        let now = self.clock.now();
        let report = PurgeReport {
            access_tokens: self.stores.tokens.retain(&|_, t| now < t.expires_at),
            refresh_tokens: self.stores.refresh_tokens.retain(&|_, t| now < t.expires_at),
            authorization_codes: self.stores.codes.retain(&|_, c| now < c.expires_at),
        };
        if report.total() > 0 {
            debug!(
                access_tokens = report.access_tokens,
                refresh_tokens = report.refresh_tokens,
                authorization_codes = report.authorization_codes,
                "Purged expired OAuth state"
            );
        }
        report
    }

    /// Number of live access tokens
    #[must_use]
    pub fn active_token_count(&self) -> usize {
        self.stores.tokens.len()
    }

    fn issue_tokens(&self, client_id: &str, scopes: Vec<String>) -> Result<TokenResponse, TokenError> {
        let access_token = random_token(oauth::TOKEN_BYTES)?;
        let refresh_token = random_token(oauth::TOKEN_BYTES)?;
        let now = self.clock.now();
        let scope = scopes.join(" ");

        self.stores.refresh_tokens.insert(
            refresh_token.clone(),
            RefreshTokenRecord {
                refresh_token: refresh_token.clone(),
                access_token: access_token.clone(),
                client_id: client_id.to_owned(),
                scopes: scopes.clone(),
                expires_at: now + self.config.refresh_token_ttl,
            },
        );
        self.stores.tokens.insert(
            access_token.clone(),
            TokenRecord {
                access_token: access_token.clone(),
                client_id: client_id.to_owned(),
                scopes,
                issued_at: now,
                expires_at: now + self.config.access_token_ttl,
                refresh_token: refresh_token.clone(),
            },
        );

        Ok(TokenResponse {
            access_token,
            token_type: oauth::TOKEN_TYPE_BEARER.to_owned(),
            expires_in: self.config.access_token_ttl.num_seconds(),
            refresh_token,
            scope,
        })
    }
}

impl ExpirySweep for TokenService {
    fn sweep_name(&self) -> &'static str {
        "oauth"
    }

    fn sweep_expired(&self) -> usize {
        self.purge_expired().total()
    }
}

/// Read the `state` query parameter (the authorization code) from an authorization URL
#[must_use]
pub fn authorization_state(url: &Url) -> Option<String> {
    url.query_pairs()
        .find(|(key, _)| key == "state")
        .map(|(_, value)| value.into_owned())
}
