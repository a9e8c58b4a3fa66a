use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::error::Result;
use crate::gatt::PeripheralAddress;
use crate::message::status_message::StatusMessage;

/// One poll's worth of device state, flattened for logging.
///
/// Booleans are stored as `0`/`1`. Fields the device did not report are absent,
/// never zero.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reading {
    pub timestamp: DateTime<Utc>,
    pub device_mac: String,
    #[serde(flatten)]
    pub fields: BTreeMap<String, Value>,
}

/// Switches and inputs are numbered 0 and 1 on every supported device.
const CHANNELS: [u8; 2] = [0, 1];

impl Reading {
    pub fn from_status(address: &PeripheralAddress, timestamp: DateTime<Utc>, status: &StatusMessage) -> Self {
        let mut fields = BTreeMap::new();
        let mut put = |name: String, value: Option<Value>| {
            if let Some(value) = value {
                fields.insert(name, value);
            }
        };

        put("voltmeter_100".into(), status.number("voltmeter:100", "voltage"));

        for n in CHANNELS {
            let switch = format!("switch:{n}");
            put(format!("switch_{n}_output"), status.flag(&switch, "output").map(bit));
            put(format!("switch_{n}_power"), status.number(&switch, "apower"));
            put(format!("switch_{n}_voltage"), status.number(&switch, "voltage"));
            put(format!("switch_{n}_current"), status.number(&switch, "current"));
        }

        for n in CHANNELS {
            let input = format!("input:{n}");
            put(format!("input_{n}_state"), status.flag(&input, "state").map(bit));
            put(format!("input_{n}_voltage"), status.number(&input, "voltage"));
        }

        put("device_temp_c".into(), status.number("temperature:0", "tC"));
        put("device_temp_f".into(), status.number("temperature:0", "tF"));

        for field in ["uptime", "ram_size", "ram_free", "fs_size", "fs_free"] {
            put(field.into(), status.number("sys", field));
        }

        put("wifi_connected".into(), status.has_value("wifi", "sta_ip").map(bit));
        put("wifi_rssi".into(), status.number("wifi", "rssi"));
        put("wifi_ssid".into(), status.string("wifi", "ssid").map(Value::String));

        put("ble_enabled".into(), status.flag("ble", "enable").map(bit));

        Self { timestamp, device_mac: address.to_string(), fields }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Compact single-line JSON, without the trailing newline.
    pub fn to_json_line(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// A human readable one-liner of the most interesting fields.
    pub fn summary(&self) -> String {
        let show = |name: &str, unit: &str| {
            self.get(name)
                .map_or_else(|| "N/A".to_owned(), |v| format!("{v}{unit}"))
        };
        let switch = |name: &str| match self.get(name).and_then(Value::as_u64) {
            Some(1) => "ON",
            _ => "OFF",
        };
        format!(
            "voltage {}, switch0 {}, switch1 {}, temp {}",
            show("voltmeter_100", "V"),
            switch("switch_0_output"),
            switch("switch_1_output"),
            show("device_temp_c", "°C"),
        )
    }
}

fn bit(on: bool) -> Value {
    Value::from(u8::from(on))
}
