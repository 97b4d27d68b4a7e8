use serde::{Deserialize, Serialize};

use crate::control::Reference;
use crate::error::{Result, WhirlybirdError};

/// Time-varying pitch/yaw command used in place of the slider input.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReferenceSignal {
    /// Fixed attitude for the whole run.
    Constant { pitch: f64, yaw: f64 },
    /// Square wave about an offset: `offset + amplitude` for the first half of each period,
    /// `offset − amplitude` for the second.
    Square {
        pitch_amplitude: f64,
        yaw_amplitude: f64,
        period: f64,
        #[serde(default)]
        pitch_offset: f64,
        #[serde(default)]
        yaw_offset: f64,
    },
}

impl Default for ReferenceSignal {
    fn default() -> Self {
        ReferenceSignal::Constant {
            pitch: 0.0,
            yaw: 0.0,
        }
    }
}

impl ReferenceSignal {
    /// Evaluates the signal at time `t` (s).
    pub fn at(&self, t: f64) -> Reference {
        match *self {
            ReferenceSignal::Constant { pitch, yaw } => Reference { pitch, yaw },
            ReferenceSignal::Square {
                pitch_amplitude,
                yaw_amplitude,
                period,
                pitch_offset,
                yaw_offset,
            } => {
                let sign = if t.rem_euclid(period) < period / 2.0 {
                    1.0
                } else {
                    -1.0
                };
                Reference {
                    pitch: pitch_offset + sign * pitch_amplitude,
                    yaw: yaw_offset + sign * yaw_amplitude,
                }
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        let values = match self {
            ReferenceSignal::Constant { pitch, yaw } => vec![*pitch, *yaw],
            ReferenceSignal::Square {
                pitch_amplitude,
                yaw_amplitude,
                period,
                pitch_offset,
                yaw_offset,
            } => {
                if !(*period > 0.0) {
                    return Err(WhirlybirdError::invalid(
                        "simulation.reference.period",
                        "must be > 0",
                    ));
                }
                vec![
                    *pitch_amplitude,
                    *yaw_amplitude,
                    *period,
                    *pitch_offset,
                    *yaw_offset,
                ]
            }
        };

        if values.iter().all(|v| v.is_finite()) {
            Ok(())
        } else {
            Err(WhirlybirdError::invalid(
                "simulation.reference",
                "values must be finite",
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_square_wave_alternates() {
        let signal = ReferenceSignal::Square {
            pitch_amplitude: 0.1,
            yaw_amplitude: 0.2,
            period: 10.0,
            pitch_offset: 0.05,
            yaw_offset: 0.0,
        };

        assert_eq!(signal.at(0.0), Reference { pitch: 0.05 + 0.1, yaw: 0.2 });
        assert_eq!(signal.at(4.9), Reference { pitch: 0.05 + 0.1, yaw: 0.2 });
        assert_eq!(signal.at(5.0).yaw, -0.2);
        assert_eq!(signal.at(12.0).yaw, 0.2);
    }

    #[test]
    fn test_constant_ignores_time() {
        let signal = ReferenceSignal::Constant { pitch: 0.1, yaw: -0.3 };
        assert_eq!(signal.at(0.0), signal.at(100.0));
    }

    #[test]
    fn test_zero_period_is_rejected() {
        let signal = ReferenceSignal::Square {
            pitch_amplitude: 0.1,
            yaw_amplitude: 0.1,
            period: 0.0,
            pitch_offset: 0.0,
            yaw_offset: 0.0,
        };
        assert!(signal.validate().is_err());
        assert!(ReferenceSignal::default().validate().is_ok());
    }
}
