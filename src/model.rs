//! Data models for the timeline archive.
//!
//! [`Record`], [`Media`] and [`Profile`] are the archived shapes. The
//! `Source*` types mirror the upstream JSON payloads closely enough to
//! deserialize them directly; everything the archive keeps is derived from
//! those through the conversions in this module.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Timestamp format used by the upstream API: "Wed Jan 08 12:00:00 +0000 2025".
pub const SOURCE_TIME_FORMAT: &str = "%a %b %d %H:%M:%S %z %Y";

/// Unix epoch, used whenever a timestamp cannot be parsed.
#[must_use]
pub const fn epoch_utc() -> DateTime<Utc> {
    DateTime::<Utc>::UNIX_EPOCH
}

/// Parse an upstream timestamp, degrading to the epoch on failure.
#[must_use]
pub fn parse_source_time(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_str(value.trim(), SOURCE_TIME_FORMAT)
        .map_or_else(|_| epoch_utc(), |dt| dt.with_timezone(&Utc))
}

/// Retweets per favorite; zero when there are no favorites.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn engagement_ratio(favorites: i64, retweets: i64) -> f64 {
    if favorites <= 0 {
        return 0.0;
    }
    retweets as f64 / favorites as f64
}

/// An archived timeline item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: i64,
    pub id_str: String,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
    pub favorites: i64,
    pub retweets: i64,
    pub ratio: f64,
    pub text: String,
    pub url: String,
    pub deleted: bool,
    #[serde(default)]
    pub media: Vec<Media>,
}

impl Record {
    /// Set both engagement counters and recompute the ratio.
    pub fn set_engagement(&mut self, favorites: i64, retweets: i64) {
        self.favorites = favorites;
        self.retweets = retweets;
        self.ratio = engagement_ratio(favorites, retweets);
    }
}

/// Media attached to a record (or a profile avatar).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Media {
    #[serde(rename = "type")]
    pub media_type: String,
    pub id_str: String,
    pub url: String,
    pub expanded_url: String,
    pub media_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_path: Option<String>,
}

/// The archived account profile. One per archive, keyed by handle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub handle: String,
    pub name: String,
    pub description: String,
    pub followers: i64,
    pub following: i64,
    pub item_count: i64,
    pub avatar: Media,
    pub url: String,
    pub location: String,
    pub verified: bool,
    pub link: String,
    pub updated: DateTime<Utc>,
}

/// Aggregate counts for the archive.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveStats {
    pub records_count: i64,
    pub active_count: i64,
    pub deleted_count: i64,
    pub first_created: Option<DateTime<Utc>>,
    pub last_created: Option<DateTime<Utc>>,
    pub profile_updated: Option<DateTime<Utc>>,
}

// =============================================================================
// Upstream payloads
// =============================================================================

/// A timeline item as returned by the upstream API.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourceItem {
    #[serde(default)]
    pub id: i64,
    #[serde(default)]
    pub id_str: String,
    #[serde(default)]
    pub created_at: String,
    #[serde(default, alias = "text")]
    pub full_text: String,
    #[serde(default)]
    pub favorite_count: i64,
    #[serde(default)]
    pub retweet_count: i64,
    #[serde(default)]
    pub entities: SourceEntities,
    #[serde(default)]
    pub extended_entities: Option<SourceEntities>,
}

impl SourceItem {
    /// The id in string form, falling back to the numeric id.
    #[must_use]
    pub fn id_string(&self) -> String {
        if self.id_str.is_empty() {
            self.id.to_string()
        } else {
            self.id_str.clone()
        }
    }

    /// Attached media, preferring the extended entity list when present.
    #[must_use]
    pub fn media(&self) -> Vec<Media> {
        let entities = self
            .extended_entities
            .as_ref()
            .filter(|e| !e.media.is_empty())
            .unwrap_or(&self.entities);
        entities.media.iter().map(Media::from).collect()
    }
}

/// Entity lists attached to an upstream item or profile field.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourceEntities {
    #[serde(default)]
    pub user_mentions: Vec<SourceMention>,
    #[serde(default)]
    pub urls: Vec<SourceUrl>,
    #[serde(default)]
    pub media: Vec<SourceMedia>,
}

/// A user mention entity.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourceMention {
    #[serde(default)]
    pub id_str: String,
    #[serde(default)]
    pub screen_name: String,
}

/// A link entity.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourceUrl {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub expanded_url: Option<String>,
    #[serde(default)]
    pub display_url: Option<String>,
}

/// A media entity.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourceMedia {
    #[serde(default)]
    pub id_str: String,
    #[serde(default, rename = "type")]
    pub media_type: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub expanded_url: String,
    #[serde(default)]
    pub media_url_https: String,
}

impl From<&SourceMedia> for Media {
    fn from(m: &SourceMedia) -> Self {
        Self {
            media_type: if m.media_type.is_empty() {
                "photo".to_string()
            } else {
                m.media_type.clone()
            },
            id_str: m.id_str.clone(),
            url: m.url.clone(),
            expanded_url: m.expanded_url.clone(),
            media_url: m.media_url_https.clone(),
            storage_path: None,
        }
    }
}

/// An account as returned by the upstream profile endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourceUser {
    #[serde(default)]
    pub id_str: String,
    #[serde(default)]
    pub screen_name: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub verified: bool,
    #[serde(default)]
    pub followers_count: i64,
    #[serde(default)]
    pub friends_count: i64,
    #[serde(default)]
    pub statuses_count: i64,
    #[serde(default)]
    pub profile_image_url_https: String,
    #[serde(default)]
    pub entities: SourceUserEntities,
}

/// Link entities for the profile description and url fields.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourceUserEntities {
    #[serde(default)]
    pub description: SourceEntities,
    #[serde(default)]
    pub url: SourceEntities,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn ratio_is_zero_without_favorites() {
        assert!(engagement_ratio(0, 0).abs() < f64::EPSILON);
        assert!(engagement_ratio(0, 12).abs() < f64::EPSILON);
    }

    #[test]
    fn ratio_divides_retweets_by_favorites() {
        for favorites in 1..40_i64 {
            for retweets in 0..40_i64 {
                #[allow(clippy::cast_precision_loss)]
                let expected = retweets as f64 / favorites as f64;
                assert!((engagement_ratio(favorites, retweets) - expected).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn parse_source_time_reads_upstream_format() {
        let parsed = parse_source_time("Wed Jan 08 12:00:00 +0000 2025");
        let expected = Utc.with_ymd_and_hms(2025, 1, 8, 12, 0, 0).single().unwrap();
        assert_eq!(parsed, expected);
    }

    #[test]
    fn parse_source_time_defaults_to_epoch() {
        assert_eq!(parse_source_time("yesterday-ish"), epoch_utc());
        assert_eq!(parse_source_time(""), epoch_utc());
    }

    #[test]
    fn source_item_deserializes_with_missing_entities() {
        let item: SourceItem =
            serde_json::from_str(r#"{"id": 5, "id_str": "5", "full_text": "hi"}"#).unwrap();
        assert_eq!(item.id, 5);
        assert!(item.entities.user_mentions.is_empty());
        assert!(item.media().is_empty());
    }

    #[test]
    fn media_serializes_type_field_name() {
        let media = Media {
            media_type: "photo".to_string(),
            id_str: "9".to_string(),
            url: "https://t.co/x".to_string(),
            expanded_url: "https://x.com/a/status/1/photo/1".to_string(),
            media_url: "https://pbs.twimg.com/media/x.jpg".to_string(),
            storage_path: None,
        };
        let json = serde_json::to_value(&media).unwrap();
        assert_eq!(json["type"], "photo");
        assert!(json.get("storage_path").is_none());
    }

    #[test]
    fn extended_media_preferred() {
        let mut item = SourceItem::default();
        item.entities.media.push(SourceMedia {
            id_str: "1".to_string(),
            ..SourceMedia::default()
        });
        item.extended_entities = Some(SourceEntities {
            media: vec![
                SourceMedia {
                    id_str: "1".to_string(),
                    media_type: "photo".to_string(),
                    ..SourceMedia::default()
                },
                SourceMedia {
                    id_str: "2".to_string(),
                    media_type: "photo".to_string(),
                    ..SourceMedia::default()
                },
            ],
            ..SourceEntities::default()
        });
        assert_eq!(item.media().len(), 2);
    }
}
