//! ==============================================================================
//! decoder.rs - controller status line decoder
//! ==============================================================================
//!
//! purpose:
//!     turns the controller's reply to `STATUS` into a `SystemSnapshot`.
//!
//! grammar (whole string, anchored both ends):
//!
//! ```text
//! <STATUS:A:{a_cur}:{a_ideal}:{a_pump}:B:{b_cur}:{b_ideal}:{b_pump}:{temp}:{hum}:{rain}>
//!
//! a_cur, a_ideal, b_cur, b_ideal   non-negative integer literals
//! a_pump, b_pump, rain             exactly `0` or `1`
//! temp, hum                        integer or decimal literal (`24`, `24.5`)
//!
//! example: <STATUS:A:45:60:1:B:52:70:0:24.5:55.0:0>
//! ```
//!
//! relationships:
//!     - used by: monitor.rs (after each link exchange)
//!     - used by: link.rs (MockLink formats replies with `to_wire`)
//!
//! ==============================================================================

use regex::{Captures, Regex};
use std::sync::OnceLock;

use crate::domain::{EnvironmentReading, FarmReading, SystemSnapshot};

/// command written to the link before every status read
pub const STATUS_REQUEST: &[u8] = b"STATUS";

const STATUS_PATTERN: &str = concat!(
    r"^<STATUS",
    r":A:(?P<a_cur>\d+):(?P<a_ideal>\d+):(?P<a_pump>[01])",
    r":B:(?P<b_cur>\d+):(?P<b_ideal>\d+):(?P<b_pump>[01])",
    r":(?P<temp>\d+(?:\.\d+)?):(?P<hum>\d+(?:\.\d+)?):(?P<rain>[01])",
    r">$",
);

static STATUS_REGEX: OnceLock<Regex> = OnceLock::new();

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("malformed status message: {raw:?}")]
    MalformedMessage { raw: String },
}

/// stateless status decoder; cheap to construct and share
#[derive(Clone, Copy)]
pub struct StatusDecoder {
    pattern: &'static Regex,
}

impl Default for StatusDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusDecoder {
    pub fn new() -> Self {
        let pattern = STATUS_REGEX
            .get_or_init(|| Regex::new(STATUS_PATTERN).expect("status grammar must compile"));
        Self { pattern }
    }

    /// decode one status message
    ///
    /// either every field parses and a complete snapshot comes back, or the
    /// raw text is handed back inside `MalformedMessage`. no field is ever
    /// guessed or defaulted.
    pub fn decode(&self, raw: &str) -> Result<SystemSnapshot, DecodeError> {
        let malformed = || DecodeError::MalformedMessage { raw: raw.to_string() };

        let caps = self.pattern.captures(raw).ok_or_else(malformed)?;

        let farm = |cur: &str, ideal: &str, pump: &str| -> Option<FarmReading> {
            Some(FarmReading {
                current_moisture: integer(&caps, cur)?,
                ideal_moisture: integer(&caps, ideal)?,
                pump_active: flag(&caps, pump)?,
            })
        };

        let snapshot = (|| {
            Some(SystemSnapshot {
                farm_a: farm("a_cur", "a_ideal", "a_pump")?,
                farm_b: farm("b_cur", "b_ideal", "b_pump")?,
                environment: EnvironmentReading {
                    temperature_celsius: decimal(&caps, "temp")?,
                    humidity_percent: decimal(&caps, "hum")?,
                    is_raining: flag(&caps, "rain")?,
                },
            })
        })();

        snapshot.ok_or_else(malformed)
    }
}

fn integer(caps: &Captures<'_>, name: &str) -> Option<u32> {
    caps.name(name)?.as_str().parse().ok()
}

fn decimal(caps: &Captures<'_>, name: &str) -> Option<f64> {
    // an absurdly long digit run parses to infinity rather than failing
    caps.name(name)?
        .as_str()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
}

fn flag(caps: &Captures<'_>, name: &str) -> Option<bool> {
    match caps.name(name)?.as_str() {
        "0" => Some(false),
        "1" => Some(true),
        _ => None,
    }
}

impl SystemSnapshot {
    /// format the snapshot the way the controller sends it
    pub fn to_wire(&self) -> String {
        let bit = |b: bool| if b { 1 } else { 0 };
        format!(
            "<STATUS:A:{}:{}:{}:B:{}:{}:{}:{:.1}:{:.1}:{}>",
            self.farm_a.current_moisture,
            self.farm_a.ideal_moisture,
            bit(self.farm_a.pump_active),
            self.farm_b.current_moisture,
            self.farm_b.ideal_moisture,
            bit(self.farm_b.pump_active),
            self.environment.temperature_celsius,
            self.environment.humidity_percent,
            bit(self.environment.is_raining),
        )
    }
}
