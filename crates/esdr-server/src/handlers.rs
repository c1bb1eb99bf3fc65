//! ESDR Endpoint Handlers
//!
//! One function per exposed operation. Each handler takes the presented
//! credential, applies the endpoint's credential policy, and calls into the
//! datastore, directory, or multifeed composer.
//!
//! Read-oriented handlers (info, bounds, tiles, export, queries) treat an
//! unrecognized credential as no credential. Write handlers reject it.
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use crate::state::AppState;
use esdr_common::{Capability, EsdrError, FeedId, Result, UserId};
use esdr_feeds::{Credential, Feed, NewFeed, NewProduct, Principal, Product, RequestMode, Selector};
use esdr_multifeed::{Multifeed, MultifeedTile, NewMultifeed};
use esdr_timeseries::{CsvExport, FeedBounds, Tile, TimeRange, UploadRequest, UploadResult};
use serde::{Deserialize, Serialize};

// =============================================================================
// Error Response
// =============================================================================

/// Error body returned to API callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: String,
    pub status: u16,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

impl ErrorResponse {
    pub fn new(message: impl ToString, code: impl ToString, status: u16) -> Self {
        Self {
            code: code.to_string(),
            status,
            message: message.to_string(),
            field: None,
        }
    }
}

impl From<&EsdrError> for ErrorResponse {
    fn from(err: &EsdrError) -> Self {
        let message = if err.is_user_error() {
            err.to_string()
        } else {
            tracing::error!("internal failure: {}", err);
            "internal server error".to_string()
        };
        Self {
            field: err.field().map(str::to_string),
            ..Self::new(message, err.code(), err.status_code())
        }
    }
}

// =============================================================================
// Products and Feeds
// =============================================================================

/// Create a product. Requires a valid user token.
pub fn create_product(
    state: &AppState,
    credential: &Credential,
    new: NewProduct,
) -> Result<Product> {
    let user_id = require_user(state, credential)?;
    state.directory.create_product(new, user_id)
}

/// Create a feed owned by the caller. Requires a valid user token.
pub fn create_feed(state: &AppState, credential: &Credential, new: NewFeed) -> Result<Feed> {
    let user_id = require_user(state, credential)?;
    state.directory.create_feed(new, user_id)
}

/// Feed metadata as visible to the caller. Keys are shown only to callers
/// holding read-write access.
pub fn feed_info(state: &AppState, feed_id: FeedId, credential: &Credential) -> Result<Feed> {
    let authorized = state
        .policy
        .authorize(feed_id, credential, RequestMode::Read, Capability::Read)?;
    Ok(authorized.feed.view(authorized.capability))
}

/// Feeds matching a selector, restricted to what the caller can see.
pub fn query_feeds(state: &AppState, selector: &str, credential: &Credential) -> Result<Vec<Feed>> {
    let principal = state.policy.authenticate(credential, RequestMode::Read)?;
    let selector = Selector::parse(selector)?;
    let feeds = state.directory.query(&selector, &principal.visibility());
    Ok(present_feeds(&principal, feeds))
}

// =============================================================================
// Uploads
// =============================================================================

/// Upload rows to a feed. Requires read-write access.
pub fn upload(
    state: &AppState,
    feed_id: FeedId,
    credential: &Credential,
    request: &UploadRequest,
) -> Result<UploadResult> {
    state
        .policy
        .authorize(feed_id, credential, RequestMode::Write, Capability::ReadWrite)?;
    apply_upload(state, feed_id, request)
}

/// Upload identified by nothing but a feed's read-write API key.
pub fn upload_with_feed_key(
    state: &AppState,
    credential: &Credential,
    request: &UploadRequest,
) -> Result<(FeedId, UploadResult)> {
    let authorized = state.policy.authorize_feed_key(credential)?;
    let feed_id = authorized.feed.id;
    let result = apply_upload(state, feed_id, request)?;
    Ok((feed_id, result))
}

fn apply_upload(
    state: &AppState,
    feed_id: FeedId,
    request: &UploadRequest,
) -> Result<UploadResult> {
    let result = state.datastore.upload(feed_id, request)?;
    state
        .directory
        .record_upload(feed_id, &result.channel_bounds)?;
    tracing::info!(
        feed = %feed_id,
        rows = request.data.len(),
        "upload accepted"
    );
    Ok(result)
}

// =============================================================================
// Reads
// =============================================================================

/// Cumulative bounds of every channel of a feed.
pub fn channel_bounds(
    state: &AppState,
    feed_id: FeedId,
    credential: &Credential,
) -> Result<FeedBounds> {
    state
        .policy
        .authorize(feed_id, credential, RequestMode::Read, Capability::Read)?;
    Ok(state.datastore.channel_bounds(feed_id))
}

/// One tile of a feed channel. `level` and `offset` are taken as given in
/// the request path.
pub fn feed_tile(
    state: &AppState,
    feed_id: FeedId,
    channel: &str,
    level: &str,
    offset: &str,
    credential: &Credential,
) -> Result<Tile> {
    let authorized = state
        .policy
        .authorize(feed_id, credential, RequestMode::Read, Capability::Read)?;
    let address = state.datastore.geometry().parse_address(level, offset)?;
    if !authorized.feed.has_channel(channel) {
        return Err(EsdrError::NotFound(format!(
            "channel '{}' of feed {}",
            channel, feed_id
        )));
    }
    Ok(state.datastore.tile_or_empty(feed_id, channel, address))
}

/// CSV export of a feed's channels. Unparseable bounds are ignored.
pub fn export(
    state: &AppState,
    feed_id: FeedId,
    channels: &[String],
    from: Option<&str>,
    to: Option<&str>,
    credential: &Credential,
) -> Result<CsvExport> {
    let authorized = state
        .policy
        .authorize(feed_id, credential, RequestMode::Read, Capability::Read)?;
    let range = TimeRange::parse(from, to);
    state
        .datastore
        .export(feed_id, authorized.feed.user_id, channels, range)
}

// =============================================================================
// Multifeeds
// =============================================================================

/// Create a multifeed owned by the caller. Requires a valid user token.
pub fn create_multifeed(
    state: &AppState,
    credential: &Credential,
    new: NewMultifeed,
) -> Result<Multifeed> {
    let user_id = require_user(state, credential)?;
    state.multifeeds.create(new, user_id)
}

/// Multifeed metadata, by id or name.
pub fn get_multifeed(state: &AppState, id_or_name: &str) -> Result<Multifeed> {
    state.multifeeds.find(id_or_name)
}

/// The feeds behind a multifeed, presented exactly as a direct feed query
/// would present them to the same caller.
pub fn multifeed_feeds(
    state: &AppState,
    id_or_name: &str,
    credential: &Credential,
) -> Result<Vec<Feed>> {
    let principal = state.policy.authenticate(credential, RequestMode::Read)?;
    let multifeed = state.multifeeds.find(id_or_name)?;
    let feeds = state.composer.feeds(&multifeed, &principal.visibility())?;
    Ok(present_feeds(&principal, feeds))
}

/// Merged tile of every (feed, channel) pair a multifeed resolves to.
pub fn multifeed_tile(
    state: &AppState,
    id_or_name: &str,
    level: &str,
    offset: &str,
    credential: &Credential,
) -> Result<MultifeedTile> {
    let principal = state.policy.authenticate(credential, RequestMode::Read)?;
    let multifeed = state.multifeeds.find(id_or_name)?;
    let address = state.datastore.geometry().parse_address(level, offset)?;
    state
        .composer
        .tile(&multifeed, address, &principal.visibility())
}

// =============================================================================
// Helper Functions
// =============================================================================

fn require_user(state: &AppState, credential: &Credential) -> Result<UserId> {
    match state.policy.authenticate(credential, RequestMode::Write)? {
        Principal::User(user_id) => Ok(user_id),
        _ => Err(EsdrError::Authentication(
            "a user access token is required".to_string(),
        )),
    }
}

fn present_feeds(principal: &Principal, feeds: Vec<Feed>) -> Vec<Feed> {
    feeds
        .iter()
        .map(|feed| feed.view(principal.capability(feed)))
        .collect()
}

// =============================================================================
// Tests
// =============================================================================
