//! End-to-end integration tests for the ESDR server layer
//!
//! Exercises full flows across the directory, datastore, multifeed composer,
//! access policy, and snapshot persistence.

use esdr_common::{ClientId, DeviceId, EsdrConfig, EsdrError, FeedId, ProductId, TileConfig, UserId};
use esdr_feeds::{ChannelSpec, Credential, Feed, NewFeed, NewProduct};
use esdr_multifeed::{MultifeedClause, NewMultifeed};
use esdr_server::{handlers, AppState};
use esdr_timeseries::{UploadRequest, NO_DATA_SENTINEL};
use serde_json::{json, Value};
use std::path::Path;

const ANON: Credential = Credential::Anonymous;

/// Small tiles so a handful of samples spans several levels.
fn tile_config() -> TileConfig {
    TileConfig {
        points_per_tile: 4,
        base_bin_secs: 1.0,
        max_level: 8,
    }
}

fn state_at(dir: Option<&Path>) -> AppState {
    let mut config = EsdrConfig::development().with_data_dir(dir.map(Path::to_path_buf));
    config.tiles = tile_config();
    AppState::new(config).unwrap()
}

fn token(state: &AppState, user: u64) -> Credential {
    let issued = state.tokens.issue(UserId(user), ClientId(1));
    Credential::AccessToken(issued.access_token)
}

fn rows(value: Value) -> UploadRequest {
    serde_json::from_value(value).unwrap()
}

/// A public speck feed and a private one, both owned by user 1.
fn seed(state: &AppState) -> (Credential, Feed, Feed) {
    let owner = token(state, 1);
    let product = handlers::create_product(
        state,
        &owner,
        NewProduct::new("speck")
            .with_channel("pm25", ChannelSpec::new("PM 2.5", "ug/m3"))
            .with_channel("humidity", ChannelSpec::new("Humidity", "%")),
    )
    .unwrap();
    let public = handlers::create_feed(
        state,
        &owner,
        NewFeed::new("porch", DeviceId(1), product.id).public(true),
    )
    .unwrap();
    let private = handlers::create_feed(
        state,
        &owner,
        NewFeed::new("bedroom", DeviceId(2), product.id),
    )
    .unwrap();
    (owner, public, private)
}

#[test]
fn test_bounds_history_versus_imported() {
    let state = state_at(None);
    let (owner, feed, _) = seed(&state);

    handlers::upload(
        &state,
        feed.id,
        &owner,
        &rows(json!({"channel_names": ["pm25"], "data": [[1, 10.0], [2, 12.0], [3, 11.0]]})),
    )
    .unwrap();
    let second = handlers::upload(
        &state,
        feed.id,
        &owner,
        &rows(json!({"channel_names": ["pm25"], "data": [[0, 9.0], [5, 20.0]]})),
    )
    .unwrap();

    let imported = second.imported_bounds.get("pm25").unwrap();
    assert_eq!((imported.min_time_secs, imported.max_time_secs), (0.0, 5.0));
    assert_eq!((imported.min_value, imported.max_value), (Some(9.0), Some(20.0)));

    let cumulative = second.channel_bounds.get("pm25").unwrap();
    assert_eq!((cumulative.min_time_secs, cumulative.max_time_secs), (0.0, 5.0));
    assert_eq!(cumulative.min_value, Some(9.0));

    // a narrower third upload reports only itself as imported
    let third = handlers::upload(
        &state,
        feed.id,
        &owner,
        &rows(json!({"channel_names": ["pm25"], "data": [[2.5, 1.0]]})),
    )
    .unwrap();
    let imported = third.imported_bounds.get("pm25").unwrap();
    assert_eq!((imported.min_time_secs, imported.max_time_secs), (2.5, 2.5));
    let cumulative = third.channel_bounds.get("pm25").unwrap();
    assert_eq!((cumulative.min_time_secs, cumulative.max_time_secs), (0.0, 5.0));
    assert_eq!(cumulative.min_value, Some(1.0));
}

#[test]
fn test_empty_upload_yields_empty_bounds() {
    let state = state_at(None);
    let (owner, feed, _) = seed(&state);
    let result = handlers::upload(
        &state,
        feed.id,
        &owner,
        &rows(json!({"channel_names": [], "data": []})),
    )
    .unwrap();
    let body = serde_json::to_value(&result).unwrap();
    assert_eq!(body, json!({"channelBounds": {}, "importedBounds": {}}));
}

#[test]
fn test_parallel_uploads_keep_every_channel_on_feed() {
    let state = state_at(None);
    let (owner, feed, _) = seed(&state);
    let channels: Vec<String> = (0..8).map(|i| format!("ch{}", i)).collect();

    std::thread::scope(|scope| {
        for (i, channel) in channels.iter().enumerate() {
            let (state, owner, feed_id) = (&state, &owner, feed.id);
            scope.spawn(move || {
                for k in 0..16 {
                    let t = (k * 8 + i) as f64;
                    let body = json!({"channel_names": [channel], "data": [[t, k as f64]]});
                    handlers::upload(state, feed_id, owner, &rows(body)).unwrap();
                }
            });
        }
    });

    let info = handlers::feed_info(&state, feed.id, &owner).unwrap();
    for channel in &channels {
        let bounds = info.channel_bounds.get(channel).unwrap();
        assert_eq!(bounds.max_value, Some(15.0), "{}", channel);
    }
    assert_eq!(info.min_time_secs, Some(0.0));
    assert_eq!(info.max_time_secs, Some(127.0));
    assert_eq!(info.channel_bounds, handlers::channel_bounds(&state, feed.id, &owner).unwrap());
}

#[test]
fn test_invalid_row_leaves_feed_untouched() {
    let state = state_at(None);
    let (owner, feed, _) = seed(&state);
    let err = handlers::upload(
        &state,
        feed.id,
        &owner,
        &rows(json!({"channel_names": ["pm25"], "data": [[1, 10.0], ["later", 12.0]]})),
    )
    .unwrap_err();
    assert_eq!(err.field(), Some("data[1][0]"));

    let bounds = handlers::channel_bounds(&state, feed.id, &Credential::Anonymous).unwrap();
    assert!(bounds.is_empty());
    let tile = handlers::feed_tile(&state, feed.id, "pm25", "0", "0", &ANON).unwrap();
    assert!(tile.is_empty());
}

#[test]
fn test_tile_flow_through_feed_key_upload() {
    let state = state_at(None);
    let (_, feed, _) = seed(&state);
    let key = Credential::FeedApiKey(feed.api_key.clone());

    let (feed_id, _) = handlers::upload_with_feed_key(
        &state,
        &key,
        &rows(json!({"channel_names": ["pm25", "humidity"], "data": [
            [0.5, 2.0, 40],
            [1.5, 4.0, null],
            [2.5, 6.0, 42]
        ]})),
    )
    .unwrap();
    assert_eq!(feed_id, feed.id);

    // level 2 bins are 4s wide: one bin holds all three samples
    let tile = handlers::feed_tile(&state, feed.id, "pm25", "2", "0", &ANON).unwrap();
    let data = tile.data();
    assert_eq!(data.len(), 4);
    assert_eq!(data[0].3, 3);
    assert!((data[0].1 - 4.0).abs() < 1e-9);
    assert_eq!(data[1].1, NO_DATA_SENTINEL);

    let humidity =
        handlers::feed_tile(&state, feed.id, "humidity", "2", "0", &ANON).unwrap();
    assert_eq!(humidity.data()[0].3, 2);

    let body = serde_json::to_value(&tile).unwrap();
    assert_eq!(body["fields"], json!(["time", "mean", "stddev", "count"]));
    assert_eq!(body["level"], 2);
    assert_eq!(body["type"], "value");
}

#[test]
fn test_private_feed_reads_require_credentials() {
    let state = state_at(None);
    let (owner, _, private) = seed(&state);
    handlers::upload(
        &state,
        private.id,
        &owner,
        &rows(json!({"channel_names": ["pm25"], "data": [[1, 3.0]]})),
    )
    .unwrap();

    let anonymous = handlers::feed_tile(&state, private.id, "pm25", "0", "0", &ANON);
    assert!(matches!(anonymous, Err(EsdrError::Authentication(_))));

    let stranger = token(&state, 9);
    let pm25 = ["pm25".to_string()];
    let forbidden = handlers::export(&state, private.id, &pm25, None, None, &stranger);
    assert!(matches!(forbidden, Err(EsdrError::Authorization(_))));

    let read_only = Credential::FeedApiKey(private.api_key_read_only.clone());
    assert!(handlers::feed_tile(&state, private.id, "pm25", "0", "0", &read_only).is_ok());

    // a read-only key of another feed grants nothing here
    let garage = NewFeed::new("garage", DeviceId(3), ProductId(1));
    let other = handlers::create_feed(&state, &owner, garage).unwrap();
    let foreign = Credential::FeedApiKey(other.api_key_read_only.clone());
    let denied = handlers::channel_bounds(&state, private.id, &foreign);
    assert!(matches!(denied, Err(EsdrError::Authorization(_))));
}

#[test]
fn test_export_union_of_times() {
    let state = state_at(None);
    let (owner, feed, _) = seed(&state);
    handlers::upload(
        &state,
        feed.id,
        &owner,
        &rows(json!({"channel_names": ["pm25", "humidity"], "data": [
            [1, 5.0, null],
            [2, null, 40],
            [3, 7.0, 41]
        ]})),
    )
    .unwrap();

    let channels = vec!["pm25".to_string(), "humidity".to_string(), "pm25".to_string()];
    let csv = handlers::export(
        &state,
        feed.id,
        &channels,
        Some("3"),
        Some("1"),
        &Credential::Anonymous,
    )
    .unwrap()
    .to_csv_string()
    .unwrap();

    let lines: Vec<&str> = csv.lines().collect();
    assert_eq!(
        lines,
        vec![
            "EpochTime,1.feed_1.pm25,1.feed_1.humidity",
            "1,5,",
            "2,,40",
            "3,7,41",
        ]
    );

    let bounded =
        handlers::export(&state, feed.id, &channels, Some("2"), Some("junk"), &ANON).unwrap();
    assert_eq!(bounded.rows.len(), 2);
}

#[test]
fn test_multifeed_flow() {
    let state = state_at(None);
    let (owner, public, private) = seed(&state);
    for feed in [&public, &private] {
        handlers::upload(
            &state,
            feed.id,
            &owner,
            &rows(json!({"channel_names": ["pm25"], "data": [[1, 2.0], [2, 4.0]]})),
        )
        .unwrap();
    }

    let selector = "where=productId=1";
    let multifeed = handlers::create_multifeed(
        &state,
        &owner,
        NewMultifeed::new(vec![MultifeedClause::new(selector, ["pm25", "humidity"])]).named("pgh"),
    )
    .unwrap();

    // anonymous callers see the public feed only
    let anonymous = handlers::multifeed_feeds(&state, "pgh", &Credential::Anonymous).unwrap();
    assert_eq!(anonymous.len(), 1);
    assert_eq!(
        anonymous,
        handlers::query_feeds(&state, selector, &Credential::Anonymous).unwrap()
    );

    // the owner also sees the private one, keys included, same as a direct query
    let owned = handlers::multifeed_feeds(&state, &multifeed.id.to_string(), &owner).unwrap();
    assert_eq!(owned.len(), 2);
    assert_eq!(owned, handlers::query_feeds(&state, selector, &owner).unwrap());

    let tile = handlers::multifeed_tile(&state, "pgh", "1", "0", &owner).unwrap();
    assert_eq!(tile.series_count(), 4);
    let with_data = tile.series("pm25", public.id).unwrap();
    assert_eq!(with_data.data.iter().map(|p| p.3).sum::<u64>(), 2);
    let empty = tile.series("humidity", private.id).unwrap();
    assert!(empty.data.iter().all(|p| p.1 == NO_DATA_SENTINEL));

    let conflict = handlers::create_multifeed(
        &state,
        &token(&state, 2),
        NewMultifeed::new(vec![MultifeedClause::new(selector, ["pm25"])]).named("pgh"),
    )
    .unwrap_err();
    assert!(matches!(conflict, EsdrError::Conflict(ref m) if m.contains("pgh")));

    let missing = handlers::multifeed_tile(&state, "nope", "1", "0", &owner).unwrap_err();
    assert!(matches!(missing, EsdrError::NotFound(_)));
}

#[test]
fn test_state_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let (feed_id, api_key, before) = {
        let state = state_at(Some(dir.path()));
        let (owner, feed, _) = seed(&state);
        handlers::upload(
            &state,
            feed.id,
            &owner,
            &rows(json!({"channel_names": ["pm25", "note"], "data": [
                [1, 2.0, "calibrated"],
                [6, 8.0, null]
            ]})),
        )
        .unwrap();
        handlers::create_multifeed(
            &state,
            &owner,
            NewMultifeed::new(vec![MultifeedClause::new("where=id=1", ["pm25"])]).named("saved"),
        )
        .unwrap();
        state.save_to_disk().unwrap();
        let tile = handlers::feed_tile(&state, feed.id, "pm25", "3", "0", &ANON).unwrap();
        (feed.id, feed.api_key, tile)
    };

    let state = state_at(Some(dir.path()));
    let after = handlers::feed_tile(&state, feed_id, "pm25", "3", "0", &ANON).unwrap();
    assert_eq!(before, after);

    let bounds = handlers::channel_bounds(&state, feed_id, &Credential::Anonymous).unwrap();
    let note = bounds.get("note").unwrap();
    assert_eq!(note.min_value, None);
    assert_eq!(note.max_time_secs, 1.0);

    assert_eq!(handlers::get_multifeed(&state, "saved").unwrap().user_id, UserId(1));
    let key = Credential::FeedApiKey(api_key);
    let (uploaded_to, _) = handlers::upload_with_feed_key(
        &state,
        &key,
        &rows(json!({"channel_names": ["pm25"], "data": [[7, 1.0]]})),
    )
    .unwrap();
    assert_eq!(uploaded_to, FeedId(1));

    // ids continue after a restore
    let next = handlers::create_feed(
        &state,
        &token(&state, 1),
        NewFeed::new("attic", DeviceId(4), ProductId(1)),
    )
    .unwrap();
    assert_eq!(next.id, FeedId(3));
}
