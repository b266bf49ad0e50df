//! Campaign model
//!
//! A campaign is a landing-page promotion with one or more A/B variants.
//! Views and conversions are counted per variant.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Campaign {
    pub id: i64,
    pub name: String,
    pub slug: String,
    pub headline: String,
    pub description: Option<String>,
    pub active: bool,
    pub starts_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Campaign {
    /// Active flag set and `now` inside the optional `starts_at..ends_at` window
    pub fn is_running(&self, now: DateTime<Utc>) -> bool {
        self.active
            && self.starts_at.map_or(true, |start| now >= start)
            && self.ends_at.map_or(true, |end| now < end)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CampaignVariant {
    pub id: i64,
    pub campaign_id: i64,
    pub name: String,
    pub headline: String,
    pub body: Option<String>,
    /// Relative share of traffic
    pub weight: i32,
    pub views: i64,
    pub conversions: i64,
    pub created_at: DateTime<Utc>,
}

impl CampaignVariant {
    /// Conversions per view, 0.0 before the first view
    pub fn conversion_rate(&self) -> f64 {
        if self.views == 0 {
            0.0
        } else {
            self.conversions as f64 / self.views as f64
        }
    }
}

/// Campaign together with its variants
#[derive(Debug, Clone, Serialize)]
pub struct CampaignWithVariants {
    #[serde(flatten)]
    pub campaign: Campaign,
    pub variants: Vec<CampaignVariant>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateCampaignInput {
    pub name: String,
    #[serde(default)]
    pub slug: Option<String>,
    pub headline: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub active: bool,
    #[serde(default)]
    pub starts_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub ends_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateCampaignInput {
    pub name: Option<String>,
    pub slug: Option<String>,
    pub headline: Option<String>,
    pub description: Option<String>,
    pub active: Option<bool>,
    pub starts_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateVariantInput {
    pub name: String,
    pub headline: String,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default = "default_weight")]
    pub weight: i32,
}

fn default_weight() -> i32 {
    1
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn campaign(active: bool, starts: Option<i64>, ends: Option<i64>) -> Campaign {
        let now = Utc::now();
        Campaign {
            id: 1,
            name: "Vår".into(),
            slug: "var".into(),
            headline: "Vårkampanj".into(),
            description: None,
            active,
            starts_at: starts.map(|d| now + Duration::days(d)),
            ends_at: ends.map(|d| now + Duration::days(d)),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_is_running_window() {
        let now = Utc::now();
        assert!(campaign(true, None, None).is_running(now));
        assert!(campaign(true, Some(-1), Some(1)).is_running(now));
        assert!(!campaign(true, Some(1), None).is_running(now));
        assert!(!campaign(true, None, Some(-1)).is_running(now));
        assert!(!campaign(false, None, None).is_running(now));
    }

    #[test]
    fn test_conversion_rate() {
        let mut variant = CampaignVariant {
            id: 1,
            campaign_id: 1,
            name: "A".into(),
            headline: "A".into(),
            body: None,
            weight: 1,
            views: 0,
            conversions: 0,
            created_at: Utc::now(),
        };
        assert_eq!(variant.conversion_rate(), 0.0);
        variant.views = 200;
        variant.conversions = 10;
        assert!((variant.conversion_rate() - 0.05).abs() < f64::EPSILON);
    }
}
