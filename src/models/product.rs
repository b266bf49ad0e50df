//! Product model
//!
//! Prices are stored as integer öre (1 SEK = 100 öre).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Product {
    pub id: i64,
    pub name: String,
    pub slug: String,
    pub description: String,
    /// Price in öre
    pub price_ore: i64,
    pub currency: String,
    pub stock: i64,
    pub active: bool,
    pub image_media_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    /// Whether `quantity` units can be ordered right now
    pub fn can_fulfil(&self, quantity: i64) -> bool {
        self.active && quantity > 0 && self.stock >= quantity
    }

    /// Price formatted as kronor, e.g. `"1 249,50 kr"`
    pub fn display_price(&self) -> String {
        format_sek(self.price_ore)
    }
}

/// Format an öre amount the Swedish way
pub fn format_sek(ore: i64) -> String {
    let sign = if ore < 0 { "-" } else { "" };
    let ore = ore.unsigned_abs();
    let kronor = (ore / 100).to_string();
    let mut grouped = String::new();
    for (i, ch) in kronor.chars().enumerate() {
        if i > 0 && (kronor.len() - i) % 3 == 0 {
            grouped.push(' ');
        }
        grouped.push(ch);
    }
    format!("{}{},{:02} kr", sign, grouped, ore % 100)
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateProductInput {
    pub name: String,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub description: String,
    pub price_ore: i64,
    #[serde(default)]
    pub stock: i64,
    #[serde(default = "default_true")]
    pub active: bool,
    #[serde(default)]
    pub image_media_id: Option<i64>,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateProductInput {
    pub name: Option<String>,
    pub slug: Option<String>,
    pub description: Option<String>,
    pub price_ore: Option<i64>,
    pub stock: Option<i64>,
    pub active: Option<bool>,
    pub image_media_id: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_sek() {
        assert_eq!(format_sek(0), "0,00 kr");
        assert_eq!(format_sek(4950), "49,50 kr");
        assert_eq!(format_sek(124_950), "1 249,50 kr");
        assert_eq!(format_sek(100_000_000), "1 000 000,00 kr");
        assert_eq!(format_sek(-250), "-2,50 kr");
    }

    #[test]
    fn test_can_fulfil() {
        let product = Product {
            id: 1,
            name: "Kaffe".into(),
            slug: "kaffe".into(),
            description: String::new(),
            price_ore: 4900,
            currency: "SEK".into(),
            stock: 3,
            active: true,
            image_media_id: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert!(product.can_fulfil(3));
        assert!(!product.can_fulfil(4));
        assert!(!product.can_fulfil(0));
        assert!(!Product { active: false, ..product }.can_fulfil(1));
    }
}
