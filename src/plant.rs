//! plant / pump schedule configuration uploaded to the controller

use serde::{Deserialize, Serialize};

/// shortest allowed pump delay or run time, in minutes
pub const MIN_SCHEDULE_MINUTES: u32 = 10;
/// longest allowed pump delay or run time (two days), in minutes
pub const MAX_SCHEDULE_MINUTES: u32 = 2880;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlantConfigError {
    #[error("Configured time is not correct. Please enter a time between 10 minutes and 2 days.")]
    ScheduleOutOfRange { start_delay: u32, duration: u32 },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PumpSchedule {
    /// minutes before the pump starts
    pub start_delay: u32,
    /// minutes the pump runs
    pub duration: u32,
}

impl Default for PumpSchedule {
    fn default() -> Self {
        Self { start_delay: 30, duration: 2 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PlantConfig {
    pub name: String,
    pub location: String,
    pub row_number: String,
    pub pump_schedule: PumpSchedule,
}

impl PlantConfig {
    pub fn validate(&self) -> Result<(), PlantConfigError> {
        let range = MIN_SCHEDULE_MINUTES..=MAX_SCHEDULE_MINUTES;
        let PumpSchedule { start_delay, duration } = self.pump_schedule;
        if range.contains(&start_delay) && range.contains(&duration) {
            Ok(())
        } else {
            Err(PlantConfigError::ScheduleOutOfRange { start_delay, duration })
        }
    }

    /// bytes written to the controller: the config as compact json
    pub fn to_payload(&self) -> Vec<u8> {
        // a struct of strings and integers cannot fail to serialize
        serde_json::to_vec(self).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plant(start_delay: u32, duration: u32) -> PlantConfig {
        PlantConfig {
            name: "Tomatoes".into(),
            location: "Addis Abeba".into(),
            row_number: "row 1".into(),
            pump_schedule: PumpSchedule { start_delay, duration },
        }
    }

    #[test]
    fn schedule_bounds_are_inclusive() {
        assert!(plant(10, 10).validate().is_ok());
        assert!(plant(2880, 2880).validate().is_ok());
        assert!(plant(9, 30).validate().is_err());
        assert!(plant(30, 2881).validate().is_err());
    }

    #[test]
    fn form_defaults_need_adjusting() {
        // the stock two minute duration is below the allowed minimum
        let err = PlantConfig::default().validate().unwrap_err();
        assert_eq!(err, PlantConfigError::ScheduleOutOfRange { start_delay: 30, duration: 2 });
        assert!(err.to_string().starts_with("Configured time is not correct"));
    }

    #[test]
    fn payload_is_camel_case_json() {
        let json: serde_json::Value = serde_json::from_slice(&plant(30, 15).to_payload()).unwrap();
        assert_eq!(json["rowNumber"], "row 1");
        assert_eq!(json["pumpSchedule"]["startDelay"], 30);
        assert_eq!(json["pumpSchedule"]["duration"], 15);
    }
}
