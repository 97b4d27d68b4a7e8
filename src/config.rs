//! Run configuration, loaded once and never mutated afterwards.

use std::fs;
use std::path::Path;

use log::info;
use serde::{Deserialize, Serialize};

use crate::control::pd::{AxisGains, DerivativeSource, PdConfig};
use crate::control::ControllerConfig;
use crate::driver::DriverConfig;
use crate::dynamics::AttitudeState;
use crate::error::{Result, WhirlybirdError};
use crate::mixer::{MixerConfig, MixingMode};
use crate::params::PlantParameters;
use crate::sim::SimulationConfig;

/// Complete description of one rig and how it is controlled.
///
/// Every section except `controller` may be omitted from a file and takes its default.
/// The default is the three-axis PD setup with PWM mixing.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WhirlybirdConfig {
    #[serde(default)]
    pub plant: PlantParameters,
    #[serde(default)]
    pub initial_state: AttitudeState,
    #[serde(default)]
    pub mixer: MixerConfig,
    pub controller: ControllerConfig,
    #[serde(default)]
    pub driver: DriverConfig,
    #[serde(default)]
    pub simulation: SimulationConfig,
}

impl Default for WhirlybirdConfig {
    fn default() -> Self {
        Self {
            plant: PlantParameters::default(),
            initial_state: AttitudeState::default(),
            mixer: MixerConfig {
                mode: MixingMode::Pwm,
                max_duty: 0.6,
                saturation_bound: Some(1.0),
            },
            controller: ControllerConfig::Pd(PdConfig {
                sigma: 0.05,
                windup_rate_threshold: 0.05,
                derivative: DerivativeSource::Filtered,
                pitch: AxisGains {
                    kp: 0.4669496226928106,
                    kd: 0.9003637724831373,
                    ki: 0.1,
                    limit: None,
                },
                yaw: Some(AxisGains {
                    kp: 0.08982188895327586,
                    kd: 0.17319293315445278,
                    ki: 0.01,
                    limit: None,
                }),
                roll: Some(AxisGains {
                    kp: 0.2527555555555556,
                    kd: 0.04873586666666667,
                    ki: 0.0,
                    limit: None,
                }),
            }),
            driver: DriverConfig::default(),
            simulation: SimulationConfig::default(),
        }
    }
}

impl WhirlybirdConfig {
    /// Reads and validates a JSON configuration file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)?;
        let config = Self::from_json_str(&text)?;
        info!("loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks every section; gain shapes included, so nothing is discovered mid-run.
    pub fn validate(&self) -> Result<()> {
        self.plant.validate()?;
        if !self.initial_state.is_finite() {
            return Err(WhirlybirdError::invalid(
                "initial_state",
                "all components must be finite",
            ));
        }
        self.mixer.validate()?;
        self.controller.validate()?;
        self.simulation.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn shipped(name: &str) -> WhirlybirdConfig {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("config").join(name);
        WhirlybirdConfig::load(&path).unwrap()
    }

    #[test]
    fn test_default_is_valid() {
        assert!(WhirlybirdConfig::default().validate().is_ok());
    }

    #[test]
    fn test_shipped_configs_load() {
        assert!(matches!(shipped("pd.json").controller, ControllerConfig::Pd(_)));
        assert!(matches!(shipped("pd_pitch.json").controller, ControllerConfig::Pd(_)));
        assert!(matches!(
            shipped("state_feedback.json").controller,
            ControllerConfig::StateFeedback(_)
        ));
        assert!(matches!(
            shipped("observer.json").controller,
            ControllerConfig::ObserverStateFeedback(_)
        ));
    }

    #[test]
    fn test_shipped_pd_matches_default() {
        let config = shipped("pd.json");
        let default = WhirlybirdConfig::default();
        assert_eq!(config.mixer, default.mixer);

        match (&config.controller, &default.controller) {
            (ControllerConfig::Pd(file), ControllerConfig::Pd(built_in)) => {
                assert!(file.yaw.is_some() && file.roll.is_some());
                assert_relative_eq!(file.pitch.kp, built_in.pitch.kp, epsilon = 1e-12);
                assert_relative_eq!(file.pitch.kd, built_in.pitch.kd, epsilon = 1e-12);
                assert_eq!(file.pitch.ki, built_in.pitch.ki);
            }
            _ => panic!("pd.json should hold a PD controller"),
        }
    }

    #[test]
    fn test_minimal_file_fills_defaults() {
        let config = WhirlybirdConfig::from_json_str(
            r#"{ "controller": { "type": "pd", "sigma": 0.05, "pitch": { "kp": 1.0, "kd": 1.0 } } }"#,
        )
        .unwrap();

        assert_eq!(config.plant, PlantParameters::default());
        assert_eq!(config.driver.max_consecutive_misses, 5);
        assert_eq!(config.mixer, MixerConfig::default());
    }

    #[test]
    fn test_ragged_gains_rejected_at_load() {
        let text = r#"{
            "controller": {
                "type": "observer_state_feedback",
                "gains": {
                    "force_equilibrium": 5.2,
                    "lateral": {
                        "k": [1, 2, 3, 4], "ki": -0.1,
                        "a": [[0, 0, 1, 0], [0, 0, 0, 1], [0, 0, 0], [1, 0, 0, 0]],
                        "b": [0, 0, 1, 0],
                        "c": [[0, 1, 0, 0], [1, 0, 0, 0]],
                        "l": [[0, 1], [1, 0], [0, 1], [1, 0]]
                    },
                    "longitudinal": {
                        "k": [5, 6], "ki": -0.2,
                        "a": [[0, 1], [0, 0]], "b": [0, 1], "c": [[1, 0]], "l": [[1], [1]]
                    }
                }
            }
        }"#;

        assert!(matches!(
            WhirlybirdConfig::from_json_str(text),
            Err(WhirlybirdError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn test_malformed_json_is_reported() {
        assert!(matches!(
            WhirlybirdConfig::from_json_str("{ not json"),
            Err(WhirlybirdError::Json(_))
        ));
    }

    #[test]
    fn test_bad_plant_value_is_rejected() {
        let mut config = WhirlybirdConfig::default();
        config.plant.d = -1.0;
        assert!(matches!(
            config.validate(),
            Err(WhirlybirdError::InvalidConfig { .. })
        ));
    }
}
