//! # Status List Entity

use std::fmt::Display;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::bitstring::StatusSize;

/// What a set status cell means for credentials on the list.
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum StatusPurpose {
    /// A set cell permanently invalidates the credential.
    #[default]
    Revocation,

    /// A set cell temporarily invalidates the credential.
    Suspension,

    /// A set cell signals the holder should refresh the credential.
    Refresh,

    /// Cells carry arbitrary multi-bit messages.
    Message,
}

impl Display for StatusPurpose {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Revocation => "revocation",
            Self::Suspension => "suspension",
            Self::Refresh => "refresh",
            Self::Message => "message",
        };
        write!(f, "{s}")
    }
}

impl FromStr for StatusPurpose {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "revocation" => Ok(Self::Revocation),
            "suspension" => Ok(Self::Suspension),
            "refresh" => Ok(Self::Refresh),
            "message" => Ok(Self::Message),
            other => Err(format!("unknown status purpose: {other}")),
        }
    }
}

/// A persisted status list: one compressed bit buffer shared by up to
/// `total_entries` credentials of one issuer and purpose.
///
/// Indices are allocated sequentially and never released; `used_entries` is
/// monotonic. The engine is the sole writer of `encoded_list` and
/// `used_entries`, serialized through the `version` counter.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StatusList {
    /// List identifier.
    pub id: String,

    /// Owning issuer.
    pub issuer_id: String,

    /// Meaning of set cells.
    pub purpose: StatusPurpose,

    /// Cell width.
    pub status_size: StatusSize,

    /// Capacity in cells.
    pub total_entries: usize,

    /// Allocated cells; indices `0..used_entries` are taken.
    pub used_entries: usize,

    /// Multibase-encoded, GZIP-compressed bit buffer.
    pub encoded_list: String,

    /// Cache lifetime hint in milliseconds.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub ttl: Option<u64>,

    /// Creation instant.
    pub created_at: DateTime<Utc>,

    /// Last mutation instant.
    pub updated_at: DateTime<Utc>,

    /// Free-form annotations.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub metadata: Option<Map<String, Value>>,

    /// Monotonic counter for optimistic concurrency.
    #[serde(default)]
    pub version: u64,
}

impl StatusList {
    /// Whether the list can still allocate an index.
    #[must_use]
    pub const fn has_capacity(&self) -> bool {
        self.used_entries < self.total_entries
    }

    /// Unallocated cells remaining.
    #[must_use]
    pub const fn available_entries(&self) -> usize {
        self.total_entries - self.used_entries
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn purpose_wire_form() {
        assert_eq!(serde_json::to_value(StatusPurpose::Revocation).unwrap(), "revocation");
        assert_eq!("suspension".parse::<StatusPurpose>().unwrap(), StatusPurpose::Suspension);
        assert!("deprecation".parse::<StatusPurpose>().is_err());
    }
}
