use std::f64::consts::PI;

use whirlybird::control::pd::{AxisGains, DerivativeSource, PdConfig};
use whirlybird::control::{ControlStrategy, ControllerConfig, Measurement, Reference};
use whirlybird::driver::{ControlLoopDriver, DriverConfig};
use whirlybird::dynamics::{AttitudeState, DynamicsIntegrator};
use whirlybird::mixer::{ForceMixer, MixerConfig, MixingMode};
use whirlybird::params::PlantParameters;

// Pitch-only PD levelling the boom from -15 degrees
fn main() -> whirlybird::Result<()> {
    let params = PlantParameters::default();
    let mut state = AttitudeState {
        pitch: -15.0 * PI / 180.0,
        ..Default::default()
    };

    let controller = ControllerConfig::Pd(PdConfig {
        sigma: 0.05,
        windup_rate_threshold: 0.05,
        derivative: DerivativeSource::Measured,
        pitch: AxisGains {
            kp: 2.605,
            kd: 3.473,
            ki: 0.0,
            limit: Some(1.0),
        },
        yaw: None,
        roll: None,
    });
    let mixer = MixerConfig {
        mode: MixingMode::Thrust,
        max_duty: 1.0,
        saturation_bound: None,
    };

    let mut driver = ControlLoopDriver::new(
        ControlStrategy::from_config(&controller, &params, &state)?,
        ForceMixer::new(&params, &mixer),
        DriverConfig::default(),
    );
    let mut plant = DynamicsIntegrator::new(params, state);

    let simulation_span = 6.0;
    let mut current_time = 0.0;
    while current_time < simulation_span {
        let measurement = Measurement::from_state(&state, true);
        let out = driver.tick(&Reference::default(), Some(&measurement))?;

        plant.propagate(driver.mixer().thrusts(&out.command))?;
        state = plant.full_state();
        current_time += params.sample_period;

        println!(
            "{:.2} {:.5} {:.5} {:.4}",
            current_time,
            state.pitch * 180.0 / PI,
            state.pitch_rate,
            out.force_torque.force
        );
    }

    Ok(())
}
