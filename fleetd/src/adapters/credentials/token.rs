// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use sha2::{Digest, Sha256};

use crate::app::ports::{AccessTokenIssuerPort, ClockPort};
use crate::app::types::RequestContext;

/// Claims carried by a callback token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenClaims {
    pub user_id: Option<i64>,
    pub tenant_id: Option<i64>,
    pub expires_at: i64,
}

/// Issues `payload.signature` tokens: the payload is `user:tenant:expiry`, the signature a
/// SHA-256 over the secret and the payload.
pub struct SignedTokenIssuer {
    secret: String,
    ttl: Duration,
    clock: Arc<dyn ClockPort>,
}

impl SignedTokenIssuer {
    pub fn new(secret: impl Into<String>, ttl: Duration, clock: Arc<dyn ClockPort>) -> Self {
        Self {
            secret: secret.into(),
            ttl,
            clock,
        }
    }

    /// Checks the signature and expiry; `None` for anything invalid.
    pub fn verify(&self, token: &str) -> Option<TokenClaims> {
        let (encoded, signature) = token.split_once('.')?;
        let payload = String::from_utf8(URL_SAFE_NO_PAD.decode(encoded).ok()?).ok()?;
        if self.sign(&payload) != signature {
            return None;
        }
        let mut parts = payload.split(':');
        let user_id = optional_id(parts.next()?)?;
        let tenant_id = optional_id(parts.next()?)?;
        let expires_at = parts.next()?.parse().ok()?;
        if parts.next().is_some() || expires_at < self.clock.now_utc().unix_timestamp() {
            return None;
        }
        Some(TokenClaims {
            user_id,
            tenant_id,
            expires_at,
        })
    }

    fn sign(&self, payload: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.secret.as_bytes());
        hasher.update(b".");
        hasher.update(payload.as_bytes());
        hasher
            .finalize()
            .iter()
            .fold(String::with_capacity(64), |mut out, byte| {
                let _ = write!(out, "{byte:02x}");
                out
            })
    }
}

impl AccessTokenIssuerPort for SignedTokenIssuer {
    fn generate_access_token(&self, ctx: &RequestContext) -> String {
        let ttl = i64::try_from(self.ttl.as_secs()).unwrap_or(i64::MAX);
        let expires_at = self.clock.now_utc().unix_timestamp().saturating_add(ttl);
        let payload = format!(
            "{}:{}:{expires_at}",
            ctx.user.as_ref().map(|user| user.id.to_string()).unwrap_or_default(),
            ctx.tenant.as_ref().map(|tenant| tenant.id.to_string()).unwrap_or_default(),
        );
        format!("{}.{}", URL_SAFE_NO_PAD.encode(&payload), self.sign(&payload))
    }
}

/// Empty means absent; anything else must be a number.
fn optional_id(raw: &str) -> Option<Option<i64>> {
    if raw.is_empty() {
        return Some(None);
    }
    raw.parse().ok().map(Some)
}
