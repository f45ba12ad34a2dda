//! Telemetry sample types and value coercion.
//!
//! The realtime database stores whatever the firmware wrote, so every field
//! is read as raw JSON and coerced here. A value that is not a usable number
//! becomes a null point instead of dropping the sample, which keeps the
//! chart series aligned.

use serde::Deserialize;
use serde_json::Value;

use crate::control::LightMode;

/// One point for the chart: optional timestamp plus the two plotted values.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TelemetrySample {
    /// Epoch milliseconds; `None` means "use the arrival time".
    pub timestamp: Option<i64>,
    pub value_a: Option<f64>,
    pub value_b: Option<f64>,
}

/// Coerce a JSON value to a finite number.
///
/// Numbers and numeric strings are accepted; null, booleans, containers,
/// empty strings and anything non-finite are not.
pub fn coerce_number(value: Option<&Value>) -> Option<f64> {
    let number = match value? {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                return None;
            }
            trimmed.parse::<f64>().ok()?
        }
        _ => return None,
    };
    number.is_finite().then_some(number)
}

/// Coerce a JSON value to a positive epoch-millisecond timestamp.
pub fn coerce_timestamp(value: Option<&Value>) -> Option<i64> {
    let ms = coerce_number(value)?.trunc();
    if ms > 0.0 && ms <= i64::MAX as f64 { Some(ms as i64) } else { None }
}

/// State object the device bridge writes to `/nodes/<node-id>`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct NodeSnapshot {
    pub ts_ms: Option<Value>,
    pub ts: Option<Value>,
    pub lux: Option<Value>,
    pub bri: Option<Value>,
    pub wifi_rssi: Option<Value>,
    pub rssi: Option<Value>,
    pub mode: Option<Value>,
    pub power: Option<Value>,
    pub preset: Option<Value>,
}

/// Human-readable device state for the status table.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NodeStatus {
    pub lux: Option<String>,
    pub wifi_rssi: Option<String>,
    pub lora_rssi: Option<String>,
    pub mode: Option<String>,
    pub active_mode: Option<LightMode>,
    pub power: bool,
    pub preset: Option<String>,
    pub timestamp: Option<String>,
}

impl NodeSnapshot {
    /// Build a snapshot from a JSON object. Anything else is not a snapshot.
    pub fn from_value(value: &Value) -> Option<Self> {
        if !value.is_object() {
            return None;
        }
        serde_json::from_value(value.clone()).ok()
    }

    /// Chart sample: `ts_ms`, falling back to `ts`; lux and brightness.
    pub fn sample(&self) -> TelemetrySample {
        let ts = present(&self.ts_ms).or(present(&self.ts));
        TelemetrySample {
            timestamp: coerce_timestamp(ts),
            value_a: coerce_number(self.lux.as_ref()),
            value_b: coerce_number(self.bri.as_ref()),
        }
    }

    pub fn status(&self) -> NodeStatus {
        NodeStatus {
            lux: present(&self.lux).map(display_value),
            wifi_rssi: present(&self.wifi_rssi).or(present(&self.rssi)).map(display_value),
            lora_rssi: present(&self.rssi).map(display_value),
            mode: present(&self.mode).map(display_value),
            active_mode: present(&self.mode).and_then(|m| display_value(m).parse().ok()),
            power: present(&self.power).is_some_and(is_truthy),
            preset: present(&self.preset).map(display_value),
            timestamp: present(&self.ts_ms).map(display_value),
        }
    }
}

/// The field's value unless it is absent or JSON null.
fn present(field: &Option<Value>) -> Option<&Value> {
    field.as_ref().filter(|v| !v.is_null())
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}
