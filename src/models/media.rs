//! Media library model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// An uploaded file in object storage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Media {
    pub id: i64,
    /// Object key of the original, e.g. `media/<uuid>/original.jpg`
    pub storage_key: String,
    pub filename: String,
    pub content_type: String,
    pub size_bytes: i64,
    pub width: Option<i32>,
    pub height: Option<i32>,
    pub alt_text: Option<String>,
    pub uploaded_by: Option<i64>,
    pub created_at: DateTime<Utc>,
}

/// A resized WebP rendition of an image
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MediaVariant {
    pub id: i64,
    pub media_id: i64,
    pub kind: VariantKind,
    pub storage_key: String,
    pub width: i32,
    pub height: i32,
    pub size_bytes: i64,
}

/// Named variant sizes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VariantKind {
    Thumb,
    Small,
    Medium,
    Large,
}

impl VariantKind {
    pub const ALL: [VariantKind; 4] = [
        VariantKind::Thumb,
        VariantKind::Small,
        VariantKind::Medium,
        VariantKind::Large,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            VariantKind::Thumb => "thumb",
            VariantKind::Small => "small",
            VariantKind::Medium => "medium",
            VariantKind::Large => "large",
        }
    }
}

impl fmt::Display for VariantKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VariantKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        VariantKind::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| anyhow::anyhow!("Invalid variant kind: {}", s))
    }
}

/// Media as returned by the API, with public URLs resolved
#[derive(Debug, Clone, Serialize)]
pub struct MediaWithUrls {
    #[serde(flatten)]
    pub media: Media,
    pub url: String,
    pub variants: Vec<VariantUrl>,
}

#[derive(Debug, Clone, Serialize)]
pub struct VariantUrl {
    pub kind: VariantKind,
    pub url: String,
    pub width: i32,
    pub height: i32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_variant_kind_roundtrip_names() {
        for kind in VariantKind::ALL {
            assert_eq!(VariantKind::from_str(kind.as_str()).unwrap(), kind);
        }
        assert!(VariantKind::from_str("huge").is_err());
    }
}
