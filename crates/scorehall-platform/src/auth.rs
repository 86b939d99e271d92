//! Session credential verification.
//!
//! A request carries an RS256 JWT in the [`SESSION_COOKIE`] cookie. The token
//! names a subject, a role and exactly one audience (the tenant it was issued
//! for). [`ViewerResolver`] verifies it and checks it against the tenant the
//! request host routes to.

use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use parking_lot::RwLock;
use serde::Deserialize;
use scorehall_core::error::{Result, ScoreHallError};
use scorehall_core::types::{ADMIN_TENANT_NAME, Identity, Role, TenantRow};

use crate::registry::TenantRegistry;

/// Cookie carrying the session credential.
pub const SESSION_COOKIE: &str = "isuports_session";

/// JWT claims we care about. Everything is optional so that a missing claim
/// is reported as such rather than as a decode failure.
#[derive(Debug, Deserialize)]
struct Claims {
    #[serde(default)]
    sub: Option<String>,
    #[serde(default)]
    role: Option<String>,
    #[serde(default)]
    aud: Option<Audience>,
}

/// `aud` may be a single string or an array.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Audience {
    One(String),
    Many(Vec<String>),
}

impl Audience {
    fn into_vec(self) -> Vec<String> {
        match self {
            Audience::One(s) => vec![s],
            Audience::Many(v) => v,
        }
    }
}

/// Decoded credential. A pure function of the token string, so it is
/// cached until the next reset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenData {
    pub subject: String,
    pub role: Role,
    pub audience: String,
}

/// Verify signature and claim shape of a raw token.
pub fn verify_token(token: &str, key: &DecodingKey) -> Result<TokenData> {
    let mut validation = Validation::new(Algorithm::RS256);
    // Audience is checked against the routed tenant, not a fixed value.
    validation.validate_aud = false;
    validation.required_spec_claims.clear();

    let claims = decode::<Claims>(token, key, &validation)
        .map_err(|e| ScoreHallError::authentication(format!("token validation failed: {e}")))?
        .claims;

    let subject = claims
        .sub
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ScoreHallError::authentication("invalid token: subject is not found"))?;

    let raw_role = claims
        .role
        .ok_or_else(|| ScoreHallError::authentication("invalid token: role is not found"))?;
    let role = Role::from_claim(&raw_role).ok_or_else(|| {
        ScoreHallError::authentication(format!("invalid token: invalid role {raw_role}"))
    })?;

    let mut audience = claims.aud.map(Audience::into_vec).unwrap_or_default();
    if audience.len() != 1 {
        return Err(ScoreHallError::authentication(format!(
            "invalid token: expected one aud entry, got {}",
            audience.len()
        )));
    }

    Ok(TokenData { subject, role, audience: audience.remove(0) })
}

/// Process-lifetime caches for the verification key and decoded tokens.
#[derive(Default)]
pub struct CredentialCache {
    key: RwLock<Option<Arc<DecodingKey>>>,
    tokens: DashMap<String, TokenData>,
}

impl CredentialCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The verification key, read from `key_file` on first use.
    pub fn decoding_key(&self, key_file: &std::path::Path) -> Result<Arc<DecodingKey>> {
        if let Some(key) = self.key.read().as_ref() {
            return Ok(Arc::clone(key));
        }

        let mut slot = self.key.write();
        if let Some(key) = slot.as_ref() {
            return Ok(Arc::clone(key));
        }
        let pem = std::fs::read(key_file).map_err(|e| {
            ScoreHallError::Config(format!("read key file {}: {e}", key_file.display()))
        })?;
        let key = Arc::new(
            DecodingKey::from_rsa_pem(&pem)
                .map_err(|e| ScoreHallError::Config(format!("decode RSA public key: {e}")))?,
        );
        *slot = Some(Arc::clone(&key));
        tracing::debug!("loaded verification key from {}", key_file.display());
        Ok(key)
    }

    pub fn token(&self, raw: &str) -> Option<TokenData> {
        self.tokens.get(raw).map(|t| t.value().clone())
    }

    fn remember(&self, raw: &str, data: TokenData) {
        self.tokens.insert(raw.to_string(), data);
    }

    pub fn cached_tokens(&self) -> usize {
        self.tokens.len()
    }

    pub fn has_key(&self) -> bool {
        self.key.read().is_some()
    }

    /// Forget the key and every decoded token.
    pub fn reset(&self) {
        *self.key.write() = None;
        self.tokens.clear();
    }
}

/// Turns a (cookie, host) pair into an [`Identity`].
pub struct ViewerResolver {
    registry: Arc<TenantRegistry>,
    cache: Arc<CredentialCache>,
    key_file: PathBuf,
    base_hostname: String,
}

impl ViewerResolver {
    pub fn new(
        registry: Arc<TenantRegistry>,
        cache: Arc<CredentialCache>,
        key_file: impl Into<PathBuf>,
        base_hostname: impl Into<String>,
    ) -> Self {
        Self {
            registry,
            cache,
            key_file: key_file.into(),
            base_hostname: base_hostname.into(),
        }
    }

    /// Tenant name implied by a Host header value.
    pub fn tenant_name_from_host<'a>(&self, host: &'a str) -> &'a str {
        let host = host.split(':').next().unwrap_or(host);
        host.strip_suffix(self.base_hostname.as_str()).unwrap_or(host)
    }

    /// Tenant a request host routes to. `admin` is the pseudo-tenant.
    pub fn tenant_from_host(&self, host: &str) -> Result<TenantRow> {
        let name = self.tenant_name_from_host(host);
        if name == ADMIN_TENANT_NAME {
            return Ok(TenantRow::admin());
        }
        self.registry
            .tenant_by_name(name)?
            .ok_or_else(|| ScoreHallError::not_found(format!("tenant {name}")))
    }

    fn token_data(&self, raw: &str) -> Result<TokenData> {
        if let Some(data) = self.cache.token(raw) {
            return Ok(data);
        }
        let key = self.cache.decoding_key(&self.key_file)?;
        let data = verify_token(raw, &key)?;
        self.cache.remember(raw, data.clone());
        Ok(data)
    }

    pub fn resolve(&self, token: Option<&str>, host: &str) -> Result<Identity> {
        let raw = token
            .ok_or_else(|| ScoreHallError::authentication(format!("cookie {SESSION_COOKIE} is not found")))?;
        let data = self.token_data(raw)?;
        let tenant = self.tenant_from_host(host)?;

        if tenant.is_admin() {
            if data.role != Role::Admin {
                return Err(ScoreHallError::authentication("admin tenant requires admin role"));
            }
        } else if tenant.name != data.audience {
            // Blocks replaying one tenant's credential against another.
            return Err(ScoreHallError::authentication(format!(
                "token audience {} does not match tenant {}",
                data.audience, tenant.name
            )));
        }

        Ok(Identity {
            role: data.role,
            subject: data.subject,
            tenant_name: tenant.name,
            tenant_id: tenant.id,
        })
    }
}

/// Extract the session credential from a `Cookie` header value.
pub fn session_cookie(cookie_header: &str) -> Option<&str> {
    cookie_header
        .split(';')
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value.trim())
        .filter(|v| !v.is_empty())
}
