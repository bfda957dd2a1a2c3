//! In-memory light switchboard.
//!
//! Exposes `get_lights` and `change_state`. The light list lives behind a
//! mutex owned by the plugin; each capability closure holds a clone of the
//! same `Arc`, so state changes are visible across calls.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::KernelPlugin;
use crate::capabilities::{Capability, ParameterSpec, ReturnSpec, ValueType};

/// One light and its on/off state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Light {
    pub id: i64,
    pub name: String,
    pub is_on: bool,
}

impl Light {
    pub fn new(id: i64, name: impl Into<String>, is_on: bool) -> Self {
        Self {
            id,
            name: name.into(),
            is_on,
        }
    }
}

/// Plugin exposing the light list under the `Lights` namespace.
#[derive(Debug, Clone)]
pub struct LightsPlugin {
    lights: Arc<Mutex<Vec<Light>>>,
}

impl Default for LightsPlugin {
    fn default() -> Self {
        Self::with_lights(vec![
            Light::new(1, "Table Lamp", false),
            Light::new(2, "Porch light", false),
            Light::new(3, "Chandelier", true),
        ])
    }
}

impl LightsPlugin {
    pub const NAMESPACE: &'static str = "Lights";

    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_lights(lights: Vec<Light>) -> Self {
        Self {
            lights: Arc::new(Mutex::new(lights)),
        }
    }

    /// Copy of the current light list.
    pub fn lights(&self) -> Vec<Light> {
        self.lights.lock().clone()
    }

    /// Set one light's state. Returns the updated record, or `None` if no
    /// light has that id.
    pub fn change_state(&self, id: i64, is_on: bool) -> Option<Light> {
        let mut lights = self.lights.lock();
        let light = lights.iter_mut().find(|l| l.id == id)?;
        light.is_on = is_on;
        Some(light.clone())
    }
}

impl KernelPlugin for LightsPlugin {
    fn namespace(&self) -> &str {
        Self::NAMESPACE
    }

    fn capabilities(&self) -> Vec<Capability> {
        let reader = self.clone();
        let writer = self.clone();

        vec![
            Capability::builder(Self::NAMESPACE, "get_lights")
                .description("Gets a list of lights and their current state")
                .returns(ReturnSpec::of(ValueType::Array))
                .handler(move |_| Ok(serde_json::to_value(reader.lights())?)),
            Capability::builder(Self::NAMESPACE, "change_state")
                .description("Changes the state of the light")
                .param(
                    ParameterSpec::required("id", ValueType::Integer)
                        .with_description("The id of the light to change"),
                )
                .param(
                    ParameterSpec::required("is_on", ValueType::Boolean)
                        .with_description("Whether the light should be on"),
                )
                .returns(ReturnSpec::nullable(ValueType::Object))
                .handler(move |args| {
                    let id = args["id"].as_i64().ok_or("id must be an integer")?;
                    let is_on = args["is_on"].as_bool().ok_or("is_on must be a boolean")?;
                    match writer.change_state(id, is_on) {
                        Some(light) => Ok(serde_json::to_value(light)?),
                        None => {
                            log::debug!("change_state: no light with id {}", id);
                            Ok(Value::Null)
                        }
                    }
                }),
        ]
    }
}
