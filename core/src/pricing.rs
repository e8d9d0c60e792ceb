use serde_json::Value;

use crate::model::{MeteringObject, PriceScope, PricingMode, ToggleState, TOGGLES_KEY};
use crate::store::LocalStore;
use crate::targets;

pub const UNIFORM_PLACEHOLDER: &str = "– (uniform)";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScopeVisibility {
    pub shared_input_enabled: bool,
    pub per_object_inputs_enabled: bool,
    pub shows_uniform_placeholder: bool,
}

pub fn visibility_for(mode: PricingMode) -> ScopeVisibility {
    match mode {
        PricingMode::Uniform => ScopeVisibility {
            shared_input_enabled: true,
            per_object_inputs_enabled: false,
            shows_uniform_placeholder: true,
        },
        PricingMode::PerObject => ScopeVisibility {
            shared_input_enabled: false,
            per_object_inputs_enabled: true,
            shows_uniform_placeholder: false,
        },
    }
}

pub fn price_cell(mode: PricingMode, price: Option<f64>) -> String {
    match price {
        Some(value) => format!("{value}"),
        None if mode == PricingMode::Uniform => UNIFORM_PLACEHOLDER.to_string(),
        None => String::new(),
    }
}

pub fn distribution_cell(object: &MeteringObject, mode: PricingMode) -> String {
    match object.dist_mode {
        crate::model::DistTariffMode::Tariff => match object.tariff.as_deref() {
            Some(tariff) if !tariff.trim().is_empty() => format!("by tariff ({tariff})"),
            _ => "by tariff".to_string(),
        },
        crate::model::DistTariffMode::UnitPrice => price_cell(mode, object.price_distribution),
    }
}

#[derive(Debug)]
pub struct PricingModeController {
    state: ToggleState,
}

impl PricingModeController {
    pub fn initialize(store: &mut LocalStore) -> Self {
        let state = load_state(store);
        tracing::debug!(
            target: targets::PRICING,
            "Pricing modes loaded: commodity={}, distribution={}, feedin={}",
            state.commodity,
            state.distribution,
            state.feedin
        );
        Self { state }
    }

    pub fn state(&self) -> ToggleState {
        self.state
    }

    pub fn mode(&self, scope: PriceScope) -> PricingMode {
        self.state.mode(scope)
    }

    pub fn visibility(&self, scope: PriceScope) -> ScopeVisibility {
        visibility_for(self.state.mode(scope))
    }

    pub fn set_mode(&mut self, store: &mut LocalStore, scope: PriceScope, mode: PricingMode) {
        let slot = self.state.mode_mut(scope);
        let changed = *slot != mode;
        *slot = mode;
        persist(store, &self.state);
        if changed {
            tracing::info!(target: targets::PRICING, "{} mode set to {}", scope, mode);
        }
    }

    pub fn propagate_shared_price(
        &self,
        scope: PriceScope,
        price: Option<f64>,
        objects: &mut [MeteringObject],
    ) {
        if self.state.mode(scope) != PricingMode::Uniform {
            return;
        }
        for object in objects {
            object.set_price_for(scope, price);
        }
    }
}

fn load_state(store: &mut LocalStore) -> ToggleState {
    let Some(raw) = store.get(TOGGLES_KEY).map(str::to_string) else {
        return ToggleState::default();
    };

    let mut value = match serde_json::from_str::<Value>(&raw) {
        Ok(value) => value,
        Err(error) => {
            tracing::warn!(
                target: targets::PRICING,
                "Stored pricing modes unreadable, using defaults: {error}"
            );
            return ToggleState::default();
        }
    };

    let migrated = migrate_legacy_key(&mut value);
    let state = serde_json::from_value(value).unwrap_or_default();
    if migrated {
        tracing::info!(target: targets::PRICING, "Migrated legacy pricingMode key");
        persist(store, &state);
    }

    state
}

fn migrate_legacy_key(value: &mut Value) -> bool {
    let Some(map) = value.as_object_mut() else {
        return false;
    };
    if map.contains_key("commodityMode") {
        return false;
    }
    let Some(mode) = map.remove("pricingMode") else {
        return false;
    };
    map.insert("commodityMode".to_string(), mode);
    true
}

fn persist(store: &mut LocalStore, state: &ToggleState) {
    match serde_json::to_string(state) {
        Ok(contents) => {
            if let Err(error) = store.set(TOGGLES_KEY, contents) {
                tracing::warn!(
                    target: targets::STORAGE,
                    "Pricing mode save failed: {}",
                    error.technical_detail()
                );
            }
        }
        Err(error) => {
            tracing::warn!(target: targets::STORAGE, "Pricing mode encode failed: {error}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::DistTariffMode;

    fn objects() -> Vec<MeteringObject> {
        vec![
            MeteringObject::new("Bytovka A"),
            MeteringObject::new("Skola"),
            MeteringObject::new("Obecni urad"),
        ]
    }

    #[test]
    fn fresh_store_starts_all_uniform() {
        let mut store = LocalStore::in_memory();
        let controller = PricingModeController::initialize(&mut store);

        for scope in PriceScope::ALL {
            assert_eq!(controller.mode(scope), PricingMode::Uniform);
            let visibility = controller.visibility(scope);
            assert!(visibility.shared_input_enabled);
            assert!(!visibility.per_object_inputs_enabled);
            assert!(visibility.shows_uniform_placeholder);
        }
    }

    #[test]
    fn scopes_toggle_independently() {
        let mut store = LocalStore::in_memory();
        let mut controller = PricingModeController::initialize(&mut store);

        controller.set_mode(&mut store, PriceScope::Distribution, PricingMode::PerObject);

        assert_eq!(controller.mode(PriceScope::Commodity), PricingMode::Uniform);
        assert_eq!(
            controller.mode(PriceScope::Distribution),
            PricingMode::PerObject
        );
        assert_eq!(controller.mode(PriceScope::FeedIn), PricingMode::Uniform);

        let raw = store.get(TOGGLES_KEY).expect("persisted toggles");
        let value: Value = serde_json::from_str(raw).expect("valid json");
        assert_eq!(value["commodityMode"], "uniform");
        assert_eq!(value["distributionMode"], "per-object");
        assert_eq!(value["feedinMode"], "uniform");
    }

    #[test]
    fn shared_price_propagates_only_while_uniform() {
        let mut store = LocalStore::in_memory();
        let mut controller = PricingModeController::initialize(&mut store);
        let mut objects = objects();

        controller.propagate_shared_price(PriceScope::Commodity, Some(2350.0), &mut objects);
        for object in &objects {
            assert_eq!(object.price_commodity, Some(2350.0));
            assert_eq!(object.price_distribution, None);
        }

        controller.set_mode(&mut store, PriceScope::Commodity, PricingMode::PerObject);
        controller.propagate_shared_price(PriceScope::Commodity, Some(9999.0), &mut objects);
        for object in &objects {
            assert_eq!(object.price_commodity, Some(2350.0));
        }
    }

    #[test]
    fn clearing_shared_price_propagates_none() {
        let mut store = LocalStore::in_memory();
        let controller = PricingModeController::initialize(&mut store);
        let mut objects = objects();

        controller.propagate_shared_price(PriceScope::FeedIn, Some(1200.0), &mut objects);
        controller.propagate_shared_price(PriceScope::FeedIn, None, &mut objects);
        for object in &objects {
            assert_eq!(object.price_feed_in, None);
        }
    }

    #[test]
    fn corrupt_stored_value_degrades_to_defaults() {
        let mut store = LocalStore::in_memory();
        store.set(TOGGLES_KEY, "{not-json").expect("seed corrupt value");

        let mut controller = PricingModeController::initialize(&mut store);
        for scope in PriceScope::ALL {
            assert_eq!(controller.mode(scope), PricingMode::Uniform);
        }

        controller.set_mode(&mut store, PriceScope::FeedIn, PricingMode::PerObject);
        let raw = store.get(TOGGLES_KEY).expect("persisted toggles");
        let decoded: ToggleState = serde_json::from_str(raw).expect("clean json after set");
        assert_eq!(decoded.feedin, PricingMode::PerObject);
    }

    #[test]
    fn non_object_stored_value_degrades_to_defaults() {
        let mut store = LocalStore::in_memory();
        store.set(TOGGLES_KEY, "\"per-object\"").expect("seed scalar");

        let controller = PricingModeController::initialize(&mut store);
        assert_eq!(controller.state(), ToggleState::default());
    }

    #[test]
    fn state_survives_reinitialization() {
        let mut store = LocalStore::in_memory();

        {
            let mut controller = PricingModeController::initialize(&mut store);
            controller.set_mode(&mut store, PriceScope::Commodity, PricingMode::PerObject);
            controller.set_mode(&mut store, PriceScope::FeedIn, PricingMode::PerObject);
        }

        let controller = PricingModeController::initialize(&mut store);
        assert_eq!(
            controller.mode(PriceScope::Commodity),
            PricingMode::PerObject
        );
        assert_eq!(
            controller.mode(PriceScope::Distribution),
            PricingMode::Uniform
        );
        assert_eq!(controller.mode(PriceScope::FeedIn), PricingMode::PerObject);
    }

    #[test]
    fn legacy_pricing_mode_key_migrates_and_rewrites() {
        let mut store = LocalStore::in_memory();
        store
            .set(TOGGLES_KEY, r#"{"pricingMode":"per-object"}"#)
            .expect("seed legacy value");

        let controller = PricingModeController::initialize(&mut store);
        assert_eq!(
            controller.mode(PriceScope::Commodity),
            PricingMode::PerObject
        );

        let raw = store.get(TOGGLES_KEY).expect("rewritten toggles");
        let value: Value = serde_json::from_str(raw).expect("valid json");
        assert_eq!(value["commodityMode"], "per-object");
        assert!(value.get("pricingMode").is_none());
    }

    #[test]
    fn migration_skipped_when_commodity_mode_present() {
        let mut store = LocalStore::in_memory();
        store
            .set(
                TOGGLES_KEY,
                r#"{"pricingMode":"per-object","commodityMode":"uniform"}"#,
            )
            .expect("seed mixed value");

        let controller = PricingModeController::initialize(&mut store);
        assert_eq!(controller.mode(PriceScope::Commodity), PricingMode::Uniform);
    }

    #[test]
    fn setting_current_mode_again_keeps_state_and_persists() {
        let mut store = LocalStore::in_memory();
        let mut controller = PricingModeController::initialize(&mut store);

        controller.set_mode(&mut store, PriceScope::Commodity, PricingMode::Uniform);
        assert_eq!(controller.mode(PriceScope::Commodity), PricingMode::Uniform);

        let raw = store.get(TOGGLES_KEY).expect("persisted toggles");
        let decoded: ToggleState = serde_json::from_str(raw).expect("valid json");
        assert_eq!(decoded, controller.state());
    }

    #[test]
    fn visibility_derivation_is_idempotent() {
        for mode in [PricingMode::Uniform, PricingMode::PerObject] {
            assert_eq!(visibility_for(mode), visibility_for(mode));
        }

        let uniform = visibility_for(PricingMode::Uniform);
        let per_object = visibility_for(PricingMode::PerObject);
        assert!(uniform.shared_input_enabled && !per_object.shared_input_enabled);
        assert!(!uniform.per_object_inputs_enabled && per_object.per_object_inputs_enabled);
    }

    #[test]
    fn price_cell_shows_placeholder_only_while_uniform() {
        assert_eq!(price_cell(PricingMode::Uniform, None), UNIFORM_PLACEHOLDER);
        assert_eq!(price_cell(PricingMode::PerObject, None), "");
        assert_eq!(price_cell(PricingMode::Uniform, Some(2200.0)), "2200");
        assert_eq!(price_cell(PricingMode::PerObject, Some(1800.5)), "1800.5");
    }

    #[test]
    fn distribution_cell_reports_tariff_branch() {
        let mut object = MeteringObject::new("Bytovka A");
        object.dist_mode = DistTariffMode::Tariff;
        assert_eq!(
            distribution_cell(&object, PricingMode::PerObject),
            "by tariff"
        );

        object.tariff = Some("D57d".to_string());
        assert_eq!(
            distribution_cell(&object, PricingMode::PerObject),
            "by tariff (D57d)"
        );

        object.dist_mode = DistTariffMode::UnitPrice;
        assert_eq!(
            distribution_cell(&object, PricingMode::Uniform),
            UNIFORM_PLACEHOLDER
        );
    }
}
