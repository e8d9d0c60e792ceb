use std::fmt;

use serde::{Deserialize, Serialize};

pub const TOGGLES_KEY: &str = "ekb_toggles_v1";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PriceScope {
    Commodity,
    Distribution,
    FeedIn,
}

impl PriceScope {
    pub const ALL: [PriceScope; 3] = [
        PriceScope::Commodity,
        PriceScope::Distribution,
        PriceScope::FeedIn,
    ];

    pub fn label(self) -> &'static str {
        match self {
            PriceScope::Commodity => "Commodity",
            PriceScope::Distribution => "Distribution",
            PriceScope::FeedIn => "Feed-in",
        }
    }
}

impl fmt::Display for PriceScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PricingMode {
    #[serde(rename = "uniform")]
    Uniform,
    #[serde(rename = "per-object")]
    PerObject,
}

impl PricingMode {
    pub fn label(self) -> &'static str {
        match self {
            PricingMode::Uniform => "Uniform",
            PricingMode::PerObject => "Per object",
        }
    }
}

impl Default for PricingMode {
    fn default() -> Self {
        PricingMode::Uniform
    }
}

impl fmt::Display for PricingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToggleState {
    #[serde(
        rename = "commodityMode",
        default,
        deserialize_with = "mode_or_default"
    )]
    pub commodity: PricingMode,
    #[serde(
        rename = "distributionMode",
        default,
        deserialize_with = "mode_or_default"
    )]
    pub distribution: PricingMode,
    #[serde(rename = "feedinMode", default, deserialize_with = "mode_or_default")]
    pub feedin: PricingMode,
}

impl ToggleState {
    pub fn mode(&self, scope: PriceScope) -> PricingMode {
        match scope {
            PriceScope::Commodity => self.commodity,
            PriceScope::Distribution => self.distribution,
            PriceScope::FeedIn => self.feedin,
        }
    }

    pub fn mode_mut(&mut self, scope: PriceScope) -> &mut PricingMode {
        match scope {
            PriceScope::Commodity => &mut self.commodity,
            PriceScope::Distribution => &mut self.distribution,
            PriceScope::FeedIn => &mut self.feedin,
        }
    }
}

fn mode_or_default<'de, D>(deserializer: D) -> Result<PricingMode, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).unwrap_or_default())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DistTariffMode {
    #[serde(rename = "unit")]
    UnitPrice,
    #[serde(rename = "tariff")]
    Tariff,
}

impl DistTariffMode {
    pub const ALL: [DistTariffMode; 2] = [DistTariffMode::UnitPrice, DistTariffMode::Tariff];

    pub fn label(self) -> &'static str {
        match self {
            DistTariffMode::UnitPrice => "Unit price",
            DistTariffMode::Tariff => "By tariff",
        }
    }
}

impl Default for DistTariffMode {
    fn default() -> Self {
        DistTariffMode::UnitPrice
    }
}

impl fmt::Display for DistTariffMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeteringObject {
    pub name: String,
    #[serde(rename = "annualCons")]
    pub annual_cons_kwh: Option<f64>,
    #[serde(rename = "annualGen")]
    pub annual_gen_kwh: Option<f64>,
    #[serde(rename = "priceComm")]
    pub price_commodity: Option<f64>,
    #[serde(rename = "distMode", default)]
    pub dist_mode: DistTariffMode,
    #[serde(rename = "priceDist")]
    pub price_distribution: Option<f64>,
    pub tariff: Option<String>,
    #[serde(rename = "priceFeedin")]
    pub price_feed_in: Option<f64>,
    #[serde(rename = "fveKwP")]
    pub pv_kwp: Option<f64>,
    #[serde(rename = "kgjKwe")]
    pub chp_kwe: Option<f64>,
    #[serde(rename = "batKwh")]
    pub battery_kwh: Option<f64>,
    #[serde(rename = "tuvM3")]
    pub hot_water_m3: Option<f64>,
    #[serde(rename = "hasSeriesCons", default)]
    pub has_series_cons: bool,
    #[serde(rename = "hasSeriesGen", default)]
    pub has_series_gen: bool,
}

impl MeteringObject {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            annual_cons_kwh: None,
            annual_gen_kwh: None,
            price_commodity: None,
            dist_mode: DistTariffMode::UnitPrice,
            price_distribution: None,
            tariff: None,
            price_feed_in: None,
            pv_kwp: None,
            chp_kwe: None,
            battery_kwh: None,
            hot_water_m3: None,
            has_series_cons: false,
            has_series_gen: false,
        }
    }

    pub fn price_for(&self, scope: PriceScope) -> Option<f64> {
        match scope {
            PriceScope::Commodity => self.price_commodity,
            PriceScope::Distribution => self.price_distribution,
            PriceScope::FeedIn => self.price_feed_in,
        }
    }

    pub fn set_price_for(&mut self, scope: PriceScope, price: Option<f64>) {
        match scope {
            PriceScope::Commodity => self.price_commodity = price,
            PriceScope::Distribution => self.price_distribution = price,
            PriceScope::FeedIn => self.price_feed_in = price,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toggle_state_roundtrip() {
        let state = ToggleState {
            commodity: PricingMode::Uniform,
            distribution: PricingMode::PerObject,
            feedin: PricingMode::Uniform,
        };

        let json = serde_json::to_string(&state).expect("serialize toggles");
        assert!(json.contains("\"commodityMode\":\"uniform\""));
        assert!(json.contains("\"distributionMode\":\"per-object\""));
        assert!(json.contains("\"feedinMode\":\"uniform\""));

        let decoded: ToggleState = serde_json::from_str(&json).expect("deserialize toggles");
        assert_eq!(decoded, state);
    }

    #[test]
    fn toggle_state_defaults_missing_and_invalid_fields() {
        let decoded: ToggleState =
            serde_json::from_str(r#"{"distributionMode":"per-object"}"#).expect("partial object");
        assert_eq!(decoded.commodity, PricingMode::Uniform);
        assert_eq!(decoded.distribution, PricingMode::PerObject);
        assert_eq!(decoded.feedin, PricingMode::Uniform);

        let decoded: ToggleState =
            serde_json::from_str(r#"{"commodityMode":"banana","feedinMode":42}"#)
                .expect("invalid values");
        assert_eq!(decoded.commodity, PricingMode::Uniform);
        assert_eq!(decoded.feedin, PricingMode::Uniform);
    }

    #[test]
    fn toggle_state_ignores_unknown_fields() {
        let decoded: ToggleState = serde_json::from_str(
            r#"{"commodityMode":"per-object","theme":"dark","schema":7}"#,
        )
        .expect("unknown fields");
        assert_eq!(decoded.commodity, PricingMode::PerObject);
        assert_eq!(decoded.distribution, PricingMode::Uniform);
    }

    #[test]
    fn metering_object_roundtrip_uses_wire_names() {
        let mut object = MeteringObject::new("Bytovka A");
        object.annual_cons_kwh = Some(12000.0);
        object.price_commodity = Some(2350.0);
        object.dist_mode = DistTariffMode::Tariff;
        object.tariff = Some("D57d".to_string());
        object.pv_kwp = Some(9.8);
        object.has_series_cons = true;

        let json = serde_json::to_string(&object).expect("serialize object");
        assert!(json.contains("\"annualCons\":12000.0"));
        assert!(json.contains("\"priceComm\":2350.0"));
        assert!(json.contains("\"distMode\":\"tariff\""));
        assert!(json.contains("\"fveKwP\":9.8"));
        assert!(json.contains("\"hasSeriesCons\":true"));

        let decoded: MeteringObject = serde_json::from_str(&json).expect("deserialize object");
        assert_eq!(decoded, object);
    }
}
