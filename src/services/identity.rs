//! Session-token verification against the hosted identity service.
//!
//! Tokens are RS256 JWTs carried in the `__session` cookie or an
//! `Authorization: Bearer` header. The verification key is either a configured
//! PEM public key or the JWK matching the token's `kid`, fetched from the
//! identity service's JWKS endpoint on every verification.

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use axum::http::{header, HeaderMap};
use jsonwebtoken::jwk::JwkSet;
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use reqwest::Client;
use serde::Deserialize;
use thiserror::Error;

use crate::core::config::IdentitySettings;

const SESSION_COOKIE: &str = "__session";
const CLOCK_SKEW_LEEWAY_SECONDS: u64 = 5;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub(crate) struct SessionClaims {
    pub(crate) sub: String,
    #[serde(default)]
    pub(crate) azp: Option<String>,
    #[serde(default)]
    pub(crate) sid: Option<String>,
}

#[derive(Debug, Error)]
pub(crate) enum IdentityError {
    #[error("no session token on request")]
    MissingToken,
    #[error("session token header is malformed: {0}")]
    MalformedToken(jsonwebtoken::errors::Error),
    #[error("session token has no key id")]
    MissingKeyId,
    #[error("no signing key matches kid {0}")]
    UnknownKey(String),
    #[error("failed to fetch signing keys: {0}")]
    Jwks(#[from] reqwest::Error),
    #[error("signing keys request returned status {0}")]
    JwksStatus(u16),
    #[error("session token rejected: {0}")]
    Rejected(jsonwebtoken::errors::Error),
    #[error("authorized party {0} is not allowed")]
    UnauthorizedParty(String),
    #[error("identity verification is not configured")]
    NotConfigured,
}

/// Outcome of checking one request. Verification failures are not errors at
/// this level: the caller is simply signed out.
#[derive(Debug)]
pub(crate) enum RequestState {
    SignedIn(SessionClaims),
    SignedOut(IdentityError),
}

impl RequestState {
    pub(crate) fn is_signed_in(&self) -> bool {
        matches!(self, Self::SignedIn(_))
    }

    pub(crate) fn subject(&self) -> Option<&str> {
        match self {
            Self::SignedIn(claims) => Some(&claims.sub),
            Self::SignedOut(_) => None,
        }
    }
}

#[async_trait]
pub(crate) trait IdentityVerifier: Send + Sync {
    async fn authenticate(&self, headers: &HeaderMap) -> RequestState;
}

pub(crate) struct SessionTokenVerifier {
    http: Client,
    api_url: String,
    secret_key: String,
    static_key: Option<DecodingKey>,
    authorized_parties: Vec<String>,
}

impl SessionTokenVerifier {
    pub(crate) fn from_settings(identity: &IdentitySettings) -> anyhow::Result<Self> {
        let static_key = identity
            .jwt_key
            .as_deref()
            .map(|pem| DecodingKey::from_rsa_pem(pem.as_bytes()))
            .transpose()
            .context("CLERK_JWT_KEY is not a valid RSA public key")?;

        let http = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(15))
            .build()
            .context("Failed to build identity HTTP client")?;

        Ok(Self {
            http,
            api_url: identity.api_url.trim_end_matches('/').to_string(),
            secret_key: identity.secret_key.clone(),
            static_key,
            authorized_parties: identity.authorized_parties.clone(),
        })
    }

    pub(crate) async fn verify(&self, token: &str) -> Result<SessionClaims, IdentityError> {
        let header = decode_header(token).map_err(IdentityError::MalformedToken)?;

        let fetched;
        let key = match &self.static_key {
            Some(key) => key,
            None => {
                let kid = header.kid.ok_or(IdentityError::MissingKeyId)?;
                fetched = self.fetch_signing_key(&kid).await?;
                &fetched
            }
        };

        let mut validation = Validation::new(Algorithm::RS256);
        validation.leeway = CLOCK_SKEW_LEEWAY_SECONDS;
        validation.validate_nbf = true;
        validation.validate_aud = false;
        validation.set_required_spec_claims(&["exp", "sub"]);

        let claims = decode::<SessionClaims>(token, key, &validation)
            .map_err(IdentityError::Rejected)?
            .claims;

        if let Some(azp) = &claims.azp {
            if !self.authorized_parties.is_empty()
                && !self.authorized_parties.iter().any(|party| party == azp)
            {
                return Err(IdentityError::UnauthorizedParty(azp.clone()));
            }
        }

        Ok(claims)
    }

    async fn fetch_signing_key(&self, kid: &str) -> Result<DecodingKey, IdentityError> {
        if self.secret_key.is_empty() {
            return Err(IdentityError::NotConfigured);
        }

        let response = self
            .http
            .get(format!("{}/jwks", self.api_url))
            .bearer_auth(&self.secret_key)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(IdentityError::JwksStatus(response.status().as_u16()));
        }

        let keys: JwkSet = response.json().await?;
        let jwk = keys.find(kid).ok_or_else(|| IdentityError::UnknownKey(kid.to_string()))?;
        DecodingKey::from_jwk(jwk).map_err(IdentityError::Rejected)
    }
}

#[async_trait]
impl IdentityVerifier for SessionTokenVerifier {
    async fn authenticate(&self, headers: &HeaderMap) -> RequestState {
        let Some(token) = session_token(headers) else {
            return RequestState::SignedOut(IdentityError::MissingToken);
        };

        match self.verify(token).await {
            Ok(claims) => RequestState::SignedIn(claims),
            Err(err) => {
                tracing::debug!(error = %err, "Session token verification failed");
                RequestState::SignedOut(err)
            }
        }
    }
}

/// The session cookie wins over a bearer header when both are present.
fn session_token(headers: &HeaderMap) -> Option<&str> {
    let cookie = headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|cookies| cookies.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, value)| *name == SESSION_COOKIE && !value.is_empty())
        .map(|(_, value)| value);

    cookie.or_else(|| {
        headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|token| !token.is_empty())
    })
}
