// crates/sqlgate-server/src/auth.rs
// ============================================================================
// Module: Identity and Authorization
// Description: Caller identification and per-source access policies.
// Purpose: Decide who is calling and which sources they may query.
// Dependencies: axum, sqlgate-config
// ============================================================================

//! ## Overview
//! An [`IdentityProvider`] turns request metadata into a [`Caller`]; a
//! [`SourceAuthorizer`] decides whether that caller may query a source. All
//! decisions are fail-closed: unreadable identity headers are errors, and
//! tagged nodes are denied unless a policy grants them a source explicitly.
//! Security posture: identity headers are trusted only because a front proxy
//! is required to set them; the gateway refuses non-loopback binds otherwise.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::HeaderMap;
use axum::http::HeaderName;
use sqlgate_config::AuthConfig;
use sqlgate_config::AuthPolicy;
use sqlgate_config::IdentityMode;

use crate::error::GatewayError;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Maximum accepted length of an identity header value.
const MAX_IDENTITY_HEADER_BYTES: usize = 8 * 1024;

/// Grant that covers every source.
pub const GRANT_ALL: &str = "*";

// ============================================================================
// SECTION: Request Info
// ============================================================================

/// Request metadata available to identity providers.
#[derive(Debug, Clone, Default)]
pub struct RequestInfo {
    /// Peer address when known.
    pub peer: Option<SocketAddr>,
    /// Request headers.
    pub headers: HeaderMap,
}

/// Identified caller.
///
/// # Invariants
/// - `grants` holds source names or [`GRANT_ALL`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Caller {
    /// User login name.
    pub login: String,
    /// Node name, when reported.
    pub node: Option<String>,
    /// Node tags; a tagged node acts for itself rather than a user.
    pub tags: Vec<String>,
    /// Sources granted to this caller.
    pub grants: BTreeSet<String>,
}

impl Caller {
    /// Creates an untagged caller for `login`.
    #[must_use]
    pub fn user(login: impl Into<String>) -> Self {
        Self {
            login: login.into(),
            ..Self::default()
        }
    }

    /// Returns the caller with `grant` added.
    #[must_use]
    pub fn with_grant(mut self, grant: impl Into<String>) -> Self {
        self.grants.insert(grant.into());
        self
    }

    /// Returns true when the caller is a tagged node.
    #[must_use]
    pub fn is_tagged(&self) -> bool {
        !self.tags.is_empty()
    }

    /// Returns the name recorded for this caller: the node name for tagged
    /// nodes, otherwise the login.
    #[must_use]
    pub fn name(&self) -> &str {
        match (&self.node, self.is_tagged()) {
            (Some(node), true) => node,
            _ => &self.login,
        }
    }
}

// ============================================================================
// SECTION: Identity
// ============================================================================

/// Resolves the caller of a request.
pub trait IdentityProvider: Send + Sync {
    /// Identifies the caller. `Ok(None)` means the caller is not logged in.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Identity`] when the lookup fails.
    fn identify(&self, request: &RequestInfo) -> Result<Option<Caller>, GatewayError>;
}

/// Reads the caller from headers set by a trusted front proxy.
#[derive(Debug, Clone)]
pub struct TrustedHeaderIdentity {
    /// Header carrying the login.
    user_header: HeaderName,
    /// Header carrying the node name.
    node_header: HeaderName,
    /// Header carrying comma-separated tags.
    tags_header: HeaderName,
    /// Grants keyed by caller name.
    grants: BTreeMap<String, BTreeSet<String>>,
}

impl TrustedHeaderIdentity {
    /// Builds the provider from auth configuration.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Config`] when a header name is invalid.
    pub fn from_config(config: &AuthConfig) -> Result<Self, GatewayError> {
        let grants = config
            .principals
            .iter()
            .map(|principal| (principal.login.clone(), principal.sources.iter().cloned().collect()))
            .collect();
        Ok(Self {
            user_header: header_name(&config.user_header)?,
            node_header: header_name(&config.node_header)?,
            tags_header: header_name(&config.tags_header)?,
            grants,
        })
    }

    /// Returns the trimmed value of `name`, or `None` when absent or empty.
    fn header(headers: &HeaderMap, name: &HeaderName) -> Result<Option<String>, GatewayError> {
        let Some(value) = headers.get(name) else {
            return Ok(None);
        };
        if value.len() > MAX_IDENTITY_HEADER_BYTES {
            return Err(GatewayError::Identity(format!("{name} header exceeds size limit")));
        }
        let text = value
            .to_str()
            .map_err(|_| GatewayError::Identity(format!("{name} header is not visible ascii")))?
            .trim();
        Ok((!text.is_empty()).then(|| text.to_string()))
    }
}

impl IdentityProvider for TrustedHeaderIdentity {
    fn identify(&self, request: &RequestInfo) -> Result<Option<Caller>, GatewayError> {
        let Some(login) = Self::header(&request.headers, &self.user_header)? else {
            return Ok(None);
        };
        let node = Self::header(&request.headers, &self.node_header)?;
        let tags = Self::header(&request.headers, &self.tags_header)?
            .map(|value| {
                value
                    .split(',')
                    .map(str::trim)
                    .filter(|tag| !tag.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        let mut caller = Caller {
            login,
            node,
            tags,
            grants: BTreeSet::new(),
        };
        if let Some(grants) = self.grants.get(caller.name()) {
            caller.grants.clone_from(grants);
        }
        Ok(Some(caller))
    }
}

/// Parses a configured header name.
fn header_name(value: &str) -> Result<HeaderName, GatewayError> {
    HeaderName::try_from(value.trim())
        .map_err(|_| GatewayError::Config(format!("invalid header name \"{value}\"")))
}

// ============================================================================
// SECTION: Authorization
// ============================================================================

/// Decides whether a caller may query a source.
pub trait SourceAuthorizer: Send + Sync {
    /// Authorizes `caller` for `source`.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Unauthorized`] when access is denied.
    fn authorize(&self, source: &str, caller: &Caller) -> Result<(), GatewayError>;
}

/// Allows every untagged caller.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultAuthorizer;

impl SourceAuthorizer for DefaultAuthorizer {
    fn authorize(&self, _source: &str, caller: &Caller) -> Result<(), GatewayError> {
        if caller.is_tagged() {
            return Err(GatewayError::Unauthorized("tagged node is not authorized".to_string()));
        }
        Ok(())
    }
}

/// Per-source login allow lists.
///
/// # Invariants
/// - Sources missing from the map are open to every untagged caller.
/// - A source mapped to an empty list is closed to everyone.
#[derive(Debug, Clone, Default)]
pub struct AccessMapAuthorizer {
    /// Allowed logins by source.
    access: BTreeMap<String, BTreeSet<String>>,
}

impl AccessMapAuthorizer {
    /// Creates the authorizer from source to login lists.
    #[must_use]
    pub fn new(access: &BTreeMap<String, Vec<String>>) -> Self {
        Self {
            access: access
                .iter()
                .map(|(source, logins)| (source.clone(), logins.iter().cloned().collect()))
                .collect(),
        }
    }
}

impl SourceAuthorizer for AccessMapAuthorizer {
    fn authorize(&self, source: &str, caller: &Caller) -> Result<(), GatewayError> {
        if caller.is_tagged() {
            return Err(GatewayError::Unauthorized("tagged node is not authorized".to_string()));
        }
        match self.access.get(source) {
            None => Ok(()),
            Some(logins) if logins.contains(&caller.login) => Ok(()),
            Some(_) => Err(GatewayError::Unauthorized(format!(
                "not authorized for access to \"{source}\""
            ))),
        }
    }
}

/// Requires an explicit grant for the source.
#[derive(Debug, Clone, Copy, Default)]
pub struct GrantAuthorizer;

impl SourceAuthorizer for GrantAuthorizer {
    fn authorize(&self, source: &str, caller: &Caller) -> Result<(), GatewayError> {
        if caller.grants.is_empty() {
            return Err(GatewayError::Unauthorized("not authorized for access to sqlgate".to_string()));
        }
        if caller.grants.contains(GRANT_ALL) || caller.grants.contains(source) {
            return Ok(());
        }
        Err(GatewayError::Unauthorized(format!("not authorized for access to \"{source}\"")))
    }
}

// ============================================================================
// SECTION: Construction
// ============================================================================

/// Builds the identity provider configured by `config`, if any.
///
/// # Errors
///
/// Returns [`GatewayError::Config`] when header names are invalid.
pub fn identity_from_config(
    config: &AuthConfig,
) -> Result<Option<Arc<dyn IdentityProvider>>, GatewayError> {
    match config.identity {
        IdentityMode::None => Ok(None),
        IdentityMode::TrustedHeader => Ok(Some(Arc::new(TrustedHeaderIdentity::from_config(config)?))),
    }
}

/// Builds the authorizer configured by `config`.
#[must_use]
pub fn authorizer_from_config(config: &AuthConfig) -> Arc<dyn SourceAuthorizer> {
    match config.policy {
        AuthPolicy::Default => Arc::new(DefaultAuthorizer),
        AuthPolicy::AccessMap => Arc::new(AccessMapAuthorizer::new(&config.access)),
        AuthPolicy::Grants => Arc::new(GrantAuthorizer),
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
