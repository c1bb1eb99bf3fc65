//! ESDR Export Engine
//!
//! Raw, time-ordered, multi-channel CSV export. One row per distinct sample
//! time across the requested channels; a channel with no sample at that time
//! leaves its field empty.
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use crate::samples::SampleStore;
use crate::types::{ChannelKey, SampleValue, Timestamp};
use esdr_common::{EsdrError, FeedId, Result, UserId};
use std::collections::{BTreeMap, HashSet};
use std::io::Write;
use std::sync::Arc;

// =============================================================================
// Time Range
// =============================================================================

/// Inclusive export window. Unset sides are open.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TimeRange {
    pub from: Option<f64>,
    pub to: Option<f64>,
}

impl TimeRange {
    pub fn new(from: Option<f64>, to: Option<f64>) -> Self {
        let from = from.filter(|v| v.is_finite());
        let to = to.filter(|v| v.is_finite());
        match (from, to) {
            (Some(a), Some(b)) if a > b => Self {
                from: Some(b),
                to: Some(a),
            },
            _ => Self { from, to },
        }
    }

    /// Build from raw query parameters. A side that is not a number is unset.
    pub fn parse(from: Option<&str>, to: Option<&str>) -> Self {
        let number = |s: Option<&str>| s.and_then(|v| v.trim().parse::<f64>().ok());
        Self::new(number(from), number(to))
    }
}

/// Drop repeated channel names, keeping the first occurrence.
pub fn dedupe_channels<S: AsRef<str>>(channels: &[S]) -> Vec<String> {
    let mut seen = HashSet::new();
    channels
        .iter()
        .map(|c| c.as_ref())
        .filter(|c| seen.insert(*c))
        .map(str::to_string)
        .collect()
}

// =============================================================================
// CSV Export
// =============================================================================

/// A materialised export, ready to be written as CSV.
#[derive(Debug, Clone, PartialEq)]
pub struct CsvExport {
    pub header: Vec<String>,
    pub rows: Vec<ExportRow>,
}

/// One output row: a time and one optional value per channel column.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportRow {
    pub time: f64,
    pub values: Vec<Option<SampleValue>>,
}

impl CsvExport {
    /// Write header and rows as CSV.
    pub fn write_to<W: Write>(&self, out: &mut W) -> Result<()> {
        let header: Vec<String> = self.header.iter().map(|h| escape_csv_field(h)).collect();
        writeln!(out, "{}", header.join(","))?;
        for row in &self.rows {
            let mut fields = Vec::with_capacity(row.values.len() + 1);
            fields.push(row.time.to_string());
            for value in &row.values {
                fields.push(match value {
                    Some(v) => escape_csv_field(&v.to_string()),
                    None => String::new(),
                });
            }
            writeln!(out, "{}", fields.join(","))?;
        }
        Ok(())
    }

    pub fn to_csv_string(&self) -> Result<String> {
        let mut buf = Vec::new();
        self.write_to(&mut buf)?;
        String::from_utf8(buf).map_err(|e| EsdrError::Internal(e.to_string()))
    }
}

/// Quote a field containing a delimiter, quote, or line break.
fn escape_csv_field(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') || field.contains('\r') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

// =============================================================================
// Export Engine
// =============================================================================

/// Read path from the raw sample store to CSV.
pub struct ExportEngine {
    samples: Arc<SampleStore>,
}

impl ExportEngine {
    pub fn new(samples: Arc<SampleStore>) -> Self {
        Self { samples }
    }

    /// Export the named channels of a feed owned by `owner`.
    pub fn export<S: AsRef<str>>(
        &self,
        feed_id: FeedId,
        owner: UserId,
        channels: &[S],
        range: TimeRange,
    ) -> Result<CsvExport> {
        let channels = dedupe_channels(channels);
        if channels.is_empty() {
            return Err(EsdrError::validation("channels", "at least one channel is required"));
        }

        let mut header = Vec::with_capacity(channels.len() + 1);
        header.push("EpochTime".to_string());
        header.extend(
            channels
                .iter()
                .map(|c| format!("{}.feed_{}.{}", owner, feed_id, c)),
        );

        // union of sample times across channels
        let mut rows: BTreeMap<Timestamp, Vec<Option<SampleValue>>> = BTreeMap::new();
        for (column, channel) in channels.iter().enumerate() {
            let key = ChannelKey::new(feed_id, channel.as_str());
            for sample in self.samples.range(&key, range.from, range.to) {
                let row = rows
                    .entry(sample.time)
                    .or_insert_with(|| vec![None; channels.len()]);
                row[column] = Some(sample.value);
            }
        }

        tracing::debug!(
            feed = %feed_id,
            channels = channels.len(),
            rows = rows.len(),
            "export built"
        );

        Ok(CsvExport {
            header,
            rows: rows
                .into_iter()
                .map(|(time, values)| ExportRow {
                    time: time.secs(),
                    values,
                })
                .collect(),
        })
    }
}

// =============================================================================
// Tests
// =============================================================================
