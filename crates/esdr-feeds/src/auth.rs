//! ESDR Access Policy
//!
//! Turns a presented credential into a principal and decides the capability
//! that principal holds against a feed. Read-oriented requests treat a bad
//! credential as no credential; write requests reject it outright.
//!
//! Capability rules:
//! - OAuth2 user token: READ_WRITE on owned feeds, READ on other public feeds
//! - Feed read-write key: READ_WRITE on its own feed only
//! - Feed read-only key: READ on its own feed only
//! - No credential: READ on public feeds
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use crate::directory::{hex, FeedDirectory};
use crate::types::Feed;
use chrono::{DateTime, Duration, Utc};
use esdr_common::{Capability, ClientId, EsdrError, FeedId, Result, SecurityConfig, UserId};
use parking_lot::RwLock;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

// =============================================================================
// Credentials and Principals
// =============================================================================

/// Which of a feed's two keys was presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum KeyKind {
    ReadWrite,
    ReadOnly,
}

/// Credential as presented with a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credential {
    Anonymous,
    /// OAuth2 bearer token.
    AccessToken(String),
    /// Feed API key, read-write or read-only.
    FeedApiKey(String),
}

impl Credential {
    pub fn is_anonymous(&self) -> bool {
        matches!(self, Credential::Anonymous)
    }
}

/// Authenticated identity behind a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Principal {
    Anonymous,
    User(UserId),
    FeedKey { feed_id: FeedId, kind: KeyKind },
}

impl Principal {
    /// Capability this principal holds against a feed.
    pub fn capability(&self, feed: &Feed) -> Capability {
        match self {
            Principal::User(user_id) if feed.is_owned_by(*user_id) => Capability::ReadWrite,
            Principal::User(_) | Principal::Anonymous => {
                if feed.is_public {
                    Capability::Read
                } else {
                    Capability::None
                }
            }
            Principal::FeedKey { feed_id, kind } => {
                if *feed_id != feed.id {
                    Capability::None
                } else {
                    match kind {
                        KeyKind::ReadWrite => Capability::ReadWrite,
                        KeyKind::ReadOnly => Capability::Read,
                    }
                }
            }
        }
    }

    /// Feeds this principal may discover through directory queries.
    pub fn visibility(&self) -> Visibility {
        match self {
            Principal::User(user_id) => Visibility::User(*user_id),
            _ => Visibility::Anonymous,
        }
    }

    pub fn user_id(&self) -> Option<UserId> {
        match self {
            Principal::User(user_id) => Some(*user_id),
            _ => None,
        }
    }
}

/// Which feeds a caller can see in directory queries: public feeds, plus the
/// caller's own private feeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Anonymous,
    User(UserId),
}

impl Visibility {
    pub fn can_see(&self, feed: &Feed) -> bool {
        match self {
            Visibility::Anonymous => feed.is_public,
            Visibility::User(user_id) => feed.is_public || feed.is_owned_by(*user_id),
        }
    }
}

/// How an endpoint treats a credential it cannot validate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestMode {
    /// Bad credentials degrade to anonymous.
    Read,
    /// Bad credentials are rejected.
    Write,
}

// =============================================================================
// Access Tokens
// =============================================================================

/// An issued OAuth2 access token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessToken {
    pub user_id: UserId,
    pub client_id: ClientId,
    pub access_token: String,
    pub created: DateTime<Utc>,
}

/// Issued access tokens. Tokens past their lifetime are dropped on lookup.
pub struct TokenTable {
    tokens: RwLock<HashMap<String, AccessToken>>,
    token_life: Duration,
}

impl TokenTable {
    pub fn new(config: &SecurityConfig) -> Self {
        Self {
            tokens: RwLock::new(HashMap::new()),
            token_life: Duration::seconds(config.token_life_secs.min(i64::MAX as u64) as i64),
        }
    }

    /// Issue a fresh token for a user and client, replacing any earlier
    /// token held by the same pair.
    pub fn issue(&self, user_id: UserId, client_id: ClientId) -> AccessToken {
        let token = AccessToken {
            user_id,
            client_id,
            access_token: generate_token(),
            created: Utc::now(),
        };
        self.insert(token.clone());
        token
    }

    /// Store a token issued elsewhere.
    pub fn insert(&self, token: AccessToken) {
        let mut tokens = self.tokens.write();
        tokens.retain(|_, t| !(t.user_id == token.user_id && t.client_id == token.client_id));
        tokens.insert(token.access_token.clone(), token);
    }

    /// The token's record if it exists and has not expired.
    pub fn validate(&self, access_token: &str) -> Option<AccessToken> {
        self.validate_at(access_token, Utc::now())
    }

    fn validate_at(&self, access_token: &str, now: DateTime<Utc>) -> Option<AccessToken> {
        let token = self.tokens.read().get(access_token).cloned()?;
        if now - token.created > self.token_life {
            tracing::warn!(user = %token.user_id, "access token expired");
            self.tokens.write().remove(access_token);
            return None;
        }
        Some(token)
    }

    pub fn revoke(&self, access_token: &str) -> bool {
        self.tokens.write().remove(access_token).is_some()
    }

    pub fn len(&self) -> usize {
        self.tokens.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Generate a random 256-bit token.
fn generate_token() -> String {
    let bytes: [u8; 32] = rand::thread_rng().gen();
    hex::encode(&bytes)
}

// =============================================================================
// Access Policy
// =============================================================================

/// Capability decisions for feed requests.
pub struct AccessPolicy {
    directory: Arc<FeedDirectory>,
    tokens: Arc<TokenTable>,
}

impl AccessPolicy {
    pub fn new(directory: Arc<FeedDirectory>, tokens: Arc<TokenTable>) -> Self {
        Self { directory, tokens }
    }

    /// Resolve a credential to a principal.
    pub fn authenticate(&self, credential: &Credential, mode: RequestMode) -> Result<Principal> {
        let principal = match credential {
            Credential::Anonymous => return Ok(Principal::Anonymous),
            Credential::AccessToken(token) => self
                .tokens
                .validate(token)
                .map(|t| Principal::User(t.user_id)),
            Credential::FeedApiKey(key) => self
                .directory
                .feed_by_key(key)
                .map(|(feed, kind)| Principal::FeedKey {
                    feed_id: feed.id,
                    kind,
                }),
        };

        match (principal, mode) {
            (Some(principal), _) => Ok(principal),
            (None, RequestMode::Read) => {
                tracing::warn!("unrecognized credential, continuing anonymously");
                Ok(Principal::Anonymous)
            }
            (None, RequestMode::Write) => Err(EsdrError::Authentication(
                "invalid or expired credential".to_string(),
            )),
        }
    }

    /// Authenticate, look the feed up, and require `required` on it.
    pub fn authorize(
        &self,
        feed_id: FeedId,
        credential: &Credential,
        mode: RequestMode,
        required: Capability,
    ) -> Result<Authorized> {
        let principal = self.authenticate(credential, mode)?;
        let feed = self.directory.feed(feed_id)?;
        let capability = principal.capability(&feed);
        check(&principal, capability, required, feed_id)?;
        Ok(Authorized {
            feed,
            principal,
            capability,
        })
    }

    /// Authorize an upload made with nothing but a feed's read-write key.
    pub fn authorize_feed_key(&self, credential: &Credential) -> Result<Authorized> {
        let key = match credential {
            Credential::FeedApiKey(key) => key,
            Credential::AccessToken(_) => {
                return Err(EsdrError::Authentication(
                    "this endpoint requires a feed API key".to_string(),
                ))
            }
            Credential::Anonymous => {
                return Err(EsdrError::Authentication("feed API key required".to_string()))
            }
        };
        let (feed, kind) = self
            .directory
            .feed_by_key(key)
            .ok_or_else(|| EsdrError::Authentication("unknown feed API key".to_string()))?;
        if kind != KeyKind::ReadWrite {
            return Err(EsdrError::Authorization(format!(
                "read-only key cannot upload to feed {}",
                feed.id
            )));
        }
        Ok(Authorized {
            principal: Principal::FeedKey {
                feed_id: feed.id,
                kind,
            },
            feed,
            capability: Capability::ReadWrite,
        })
    }
}

fn check(
    principal: &Principal,
    held: Capability,
    required: Capability,
    feed_id: FeedId,
) -> Result<()> {
    if held.allows(required) {
        return Ok(());
    }
    match principal {
        Principal::Anonymous => Err(EsdrError::Authentication(format!(
            "credentials required for feed {}",
            feed_id
        ))),
        _ => Err(EsdrError::Authorization(format!(
            "insufficient access to feed {}",
            feed_id
        ))),
    }
}

/// Outcome of a successful authorization.
#[derive(Debug, Clone)]
pub struct Authorized {
    pub feed: Feed,
    pub principal: Principal,
    pub capability: Capability,
}

// =============================================================================
// Tests
// =============================================================================
