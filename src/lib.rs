// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Server Survival Simulation Core ("Survival Engine")

pub mod types;
pub mod config;
pub mod adapter;
pub mod mix;
pub mod arena;
pub mod topology;
pub mod routing;
pub mod node;
pub mod traffic;
pub mod intervention;
pub mod ledger;
pub mod clock;
pub mod events;
pub mod persistence;
pub mod simulation;

pub use types::*;
pub use config::SimConfig;
pub use events::{dispatch, SimEvent};
pub use simulation::{CommandError, Simulation};

use wasm_bindgen::prelude::*;

// ─── WASM Interface ──────────────────────────────────────────────────────────

fn js_err(err: impl std::fmt::Display) -> JsValue {
    JsValue::from_str(&err.to_string())
}

fn to_js<T: serde::Serialize>(value: &T) -> JsValue {
    serde_wasm_bindgen::to_value(value).unwrap_or(JsValue::NULL)
}

/// `"internet"` for the ingress, otherwise `svc_<n>` or a bare number.
fn parse_endpoint(raw: &str) -> Result<Endpoint, JsValue> {
    if raw == persistence::INGRESS_ID {
        return Ok(Endpoint::Ingress);
    }
    parse_node_id(raw).map(Endpoint::Node)
}

fn parse_node_id(raw: &str) -> Result<NodeId, JsValue> {
    raw.strip_prefix("svc_")
        .unwrap_or(raw)
        .parse::<u32>()
        .map(NodeId)
        .map_err(|_| js_err(format!("bad service id {raw}")))
}

fn parse_kind(raw: &str) -> Result<NodeKind, JsValue> {
    NodeKind::from_short_name(raw).ok_or_else(|| js_err(format!("unknown service type {raw}")))
}

fn parse_traffic(raw: &str) -> Result<TrafficType, JsValue> {
    TrafficType::from_name(raw).ok_or_else(|| js_err(format!("unknown traffic type {raw}")))
}

fn mode_for(sandbox: bool) -> GameMode {
    if sandbox {
        GameMode::Sandbox
    } else {
        GameMode::Survival
    }
}

#[wasm_bindgen]
impl Simulation {
    #[wasm_bindgen(constructor)]
    pub fn new(sandbox: bool, seed: u32) -> Self {
        #[cfg(target_arch = "wasm32")]
        std::panic::set_hook(Box::new(console_error_panic_hook::hook));

        Simulation::with_config(SimConfig::default(), mode_for(sandbox), u64::from(seed))
    }

    /// Build from a JSON config; missing sections use the defaults.
    #[wasm_bindgen(js_name = withConfig)]
    pub fn with_config_js(config_json: &str, sandbox: bool, seed: u32) -> Result<Simulation, JsValue> {
        let config = SimConfig::from_json(config_json).map_err(js_err)?;
        Ok(Simulation::with_config(config, mode_for(sandbox), u64::from(seed)))
    }

    pub fn tick(&mut self, dt: f64) -> JsValue {
        let result = self.tick_core(dt);
        to_js(&result)
    }

    /// Run N frames without returning results (fast batch mode)
    pub fn run_batch(&mut self, frames: u32, dt: f64) {
        self.run_frames(frames, dt);
    }

    #[wasm_bindgen(js_name = snapshot)]
    pub fn snapshot_js(&self) -> JsValue {
        to_js(&self.snapshot())
    }

    #[wasm_bindgen(js_name = placeNode)]
    pub fn place_node_js(&mut self, kind: &str, x: f64, y: f64, z: f64) -> Result<u32, JsValue> {
        let kind = parse_kind(kind)?;
        self.place_node(kind, Position::new(x, y, z)).map(|id| id.0).map_err(js_err)
    }

    #[wasm_bindgen(js_name = connect)]
    pub fn connect_js(&mut self, from: &str, to: &str) -> Result<(), JsValue> {
        let from = parse_endpoint(from)?;
        let to = parse_endpoint(to)?;
        self.connect(from, to).map(|_| ()).map_err(js_err)
    }

    #[wasm_bindgen(js_name = deleteNode)]
    pub fn delete_node_js(&mut self, id: u32) -> Result<f64, JsValue> {
        self.delete_node(NodeId(id)).map_err(js_err)
    }

    #[wasm_bindgen(js_name = deleteConnection)]
    pub fn delete_connection_js(&mut self, from: &str, to: &str) -> Result<(), JsValue> {
        let from = parse_endpoint(from)?;
        let to = parse_node_id(to)?;
        self.delete_connection(from, to).map_err(js_err)
    }

    #[wasm_bindgen(js_name = upgradeNode)]
    pub fn upgrade_node_js(&mut self, id: u32) -> Result<u8, JsValue> {
        self.upgrade_node(NodeId(id)).map_err(js_err)
    }

    #[wasm_bindgen(js_name = repairNode)]
    pub fn repair_node_js(&mut self, id: u32) -> Result<f64, JsValue> {
        self.repair_node(NodeId(id)).map_err(js_err)
    }

    #[wasm_bindgen(js_name = moveNode)]
    pub fn move_node_js(&mut self, id: u32, x: f64, y: f64, z: f64) -> Result<(), JsValue> {
        self.move_node(NodeId(id), Position::new(x, y, z)).map_err(js_err)
    }

    #[wasm_bindgen(js_name = setTrafficMix)]
    pub fn set_traffic_mix_js(&mut self, traffic_type: &str, fraction: f64) -> Result<(), JsValue> {
        let traffic_type = parse_traffic(traffic_type)?;
        self.set_traffic_mix(traffic_type, fraction);
        Ok(())
    }

    #[wasm_bindgen(js_name = setTargetRPS)]
    pub fn set_target_rps_js(&mut self, rps: f64) {
        self.set_target_rps(rps);
    }

    #[wasm_bindgen(js_name = spawnBurst)]
    pub fn spawn_burst_js(&mut self, traffic_type: &str, count: u32) -> Result<(), JsValue> {
        let traffic_type = parse_traffic(traffic_type)?;
        self.spawn_burst(traffic_type, count);
        Ok(())
    }

    #[wasm_bindgen(js_name = setBurstCount)]
    pub fn set_burst_count_js(&mut self, count: u32) {
        self.set_burst_count(count);
    }

    #[wasm_bindgen(js_name = setTimeScale)]
    pub fn set_time_scale_js(&mut self, scale: f64) {
        self.set_time_scale(scale);
    }

    #[wasm_bindgen(js_name = setUpkeepEnabled)]
    pub fn set_upkeep_enabled_js(&mut self, enabled: bool) {
        self.set_upkeep_enabled(enabled);
    }

    #[wasm_bindgen(js_name = setSandboxBudget)]
    pub fn set_sandbox_budget_js(&mut self, amount: f64) {
        self.set_sandbox_budget(amount);
    }

    #[wasm_bindgen(js_name = isRunning)]
    pub fn is_running_js(&self) -> bool {
        self.is_running()
    }

    /// Reset simulation to a fresh session
    #[wasm_bindgen(js_name = reset)]
    pub fn reset_js(&mut self, sandbox: bool) {
        self.reset(mode_for(sandbox));
    }

    #[wasm_bindgen(js_name = save)]
    pub fn save_js(&self) -> Result<String, JsValue> {
        self.save_json().map_err(js_err)
    }

    /// Load a save blob. A failed load leaves the current game as it was.
    #[wasm_bindgen(js_name = load)]
    pub fn load_js(&mut self, blob: &str) -> Result<(), JsValue> {
        self.load_json(blob).map_err(js_err)
    }
}
