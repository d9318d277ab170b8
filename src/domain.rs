use serde::{Deserialize, Serialize};

use crate::config::FarmConfig;

/// one independently monitored irrigation zone
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Farm {
    A,
    B,
}

impl Farm {
    pub const ALL: [Farm; 2] = [Farm::A, Farm::B];

    pub fn label(self) -> &'static str {
        match self {
            Farm::A => "Farm A",
            Farm::B => "Farm B",
        }
    }
}

/// moisture and pump state of one farm
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FarmReading {
    /// soil moisture in percent as reported by the controller
    /// (expected 0-100, not enforced)
    pub current_moisture: u32,
    /// configured set-point in percent
    pub ideal_moisture: u32,
    pub pump_active: bool,
}

impl FarmReading {
    /// ideal minus current; negative when the soil is wetter than the set-point
    pub fn moisture_deficit(&self) -> i64 {
        i64::from(self.ideal_moisture) - i64::from(self.current_moisture)
    }
}

/// greenhouse environment readings
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentReading {
    pub temperature_celsius: f64,
    pub humidity_percent: f64,
    pub is_raining: bool,
}

/// one atomically decoded set of farm and environment readings
///
/// snapshots are never edited in place: each decode produces a new one
/// that supersedes the previous value wholesale.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemSnapshot {
    pub farm_a: FarmReading,
    pub farm_b: FarmReading,
    pub environment: EnvironmentReading,
}

impl SystemSnapshot {
    /// what the dashboard shows before the first successful decode
    pub fn initial(farms: &FarmConfig) -> Self {
        let idle = |ideal| FarmReading {
            current_moisture: 0,
            ideal_moisture: ideal,
            pump_active: false,
        };
        Self {
            farm_a: idle(farms.ideal_moisture_a),
            farm_b: idle(farms.ideal_moisture_b),
            environment: EnvironmentReading {
                temperature_celsius: 0.0,
                humidity_percent: 0.0,
                is_raining: false,
            },
        }
    }

    pub fn farm(&self, farm: Farm) -> &FarmReading {
        match farm {
            Farm::A => &self.farm_a,
            Farm::B => &self.farm_b,
        }
    }
}
