use chrono::{Duration, NaiveDate, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;

/// Per-city delivery pricing: base shipping cost in FCFA and estimated
/// transit time in days.
#[derive(Debug, Clone, Deserialize)]
pub struct CityRate {
    pub city: String,
    pub base_cost: Decimal,
    pub delivery_days: i64,
}

/// City shipping table. Defaults cover the ten serviced Gabonese cities and can
/// be replaced wholesale from a JSON file (`SHIPPING_TABLE_PATH`) so rates and
/// coverage change without a deploy.
#[derive(Debug, Clone, Deserialize)]
pub struct ShippingTable {
    pub rates: Vec<CityRate>,
    pub default_cost: Decimal,
    pub default_delivery_days: i64,
}

impl Default for ShippingTable {
    fn default() -> Self {
        let rates = [
            ("Libreville", dec!(2000), 2),
            ("Port-Gentil", dec!(5000), 4),
            ("Franceville", dec!(7000), 5),
            ("Oyem", dec!(6000), 5),
            ("Moanda", dec!(7000), 5),
            ("Mouila", dec!(5000), 4),
            ("Lambaréné", dec!(4000), 3),
            ("Tchibanga", dec!(6000), 5),
            ("Koulamoutou", dec!(6000), 5),
            ("Makokou", dec!(7000), 6),
        ]
        .into_iter()
        .map(|(city, base_cost, delivery_days)| CityRate {
            city: city.to_string(),
            base_cost,
            delivery_days,
        })
        .collect();

        Self {
            rates,
            default_cost: dec!(5000),
            default_delivery_days: 5,
        }
    }
}

impl ShippingTable {
    /// Load from a JSON file, falling back to the built-in Gabon table when no
    /// path is configured.
    pub fn load(path: Option<&str>) -> anyhow::Result<Self> {
        match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path)?;
                let table: ShippingTable = serde_json::from_str(&raw)?;
                Ok(table)
            }
            None => Ok(Self::default()),
        }
    }

    fn rate(&self, city: &str) -> Option<&CityRate> {
        self.rates.iter().find(|rate| rate.city == city)
    }

    /// Whether checkout accepts this destination city.
    pub fn is_serviced(&self, city: &str) -> bool {
        self.rate(city).is_some()
    }

    /// Cities accepted at checkout, for validation messages.
    pub fn serviced_cities(&self) -> Vec<&str> {
        self.rates.iter().map(|rate| rate.city.as_str()).collect()
    }

    /// Base shipping cost for a city; unlisted cities fall back to the default.
    pub fn base_cost(&self, city: &str) -> Decimal {
        self.rate(city)
            .map(|rate| rate.base_cost)
            .unwrap_or(self.default_cost)
    }

    pub fn delivery_days(&self, city: &str) -> i64 {
        self.rate(city)
            .map(|rate| rate.delivery_days)
            .unwrap_or(self.default_delivery_days)
    }

    /// Estimated delivery date if the order shipped today.
    pub fn estimated_delivery(&self, city: &str) -> NaiveDate {
        Utc::now().date_naive() + Duration::days(self.delivery_days(city))
    }
}
