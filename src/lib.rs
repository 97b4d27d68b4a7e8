//! Simulation and attitude control of a three-axis gimballed rotor rig ("whirlybird").
//!
//! The rig is a boom on a roll/pitch/yaw gimbal, driven by two rotors whose summed thrust
//! lifts it and whose differential thrust rolls it. This crate provides
//!
//! * the nonlinear equations of motion and a fixed-step RK4 integrator ([`dynamics`]),
//! * force/torque to rotor allocation with saturation ([`mixer`]),
//! * PD, state-feedback and observer-based state-feedback controllers ([`control`]),
//! * a fixed-rate control loop driver ([`driver`]) and a closed-loop simulation ([`sim`]).
//!
//! ```no_run
//! use std::sync::atomic::AtomicBool;
//! use whirlybird::{Simulation, WhirlybirdConfig};
//!
//! let config = WhirlybirdConfig::load("config/pd.json")?;
//! let mut sim = Simulation::new(&config)?;
//! sim.run_for_duration(&AtomicBool::new(false))?;
//! println!("final pitch: {:.4} rad", sim.state().pitch);
//! # Ok::<(), whirlybird::WhirlybirdError>(())
//! ```

pub mod config;
pub mod control;
pub mod driver;
pub mod dynamics;
pub mod error;
pub mod gains;
pub mod mixer;
pub mod params;
pub mod reference;
pub mod sim;
pub mod telemetry;

pub use config::WhirlybirdConfig;
pub use control::{AttitudeController, ControlStrategy, ControllerConfig, Measurement, Reference};
pub use driver::{ControlLoopDriver, DriverConfig, DriverState, TickOutput};
pub use dynamics::{simulate_span, AttitudeState, DynamicsIntegrator, RotorThrust};
pub use error::{Result, WhirlybirdError};
pub use mixer::{ActuatorCommand, ForceMixer, ForceTorque, MixerConfig, MixingMode};
pub use params::PlantParameters;
pub use sim::Simulation;
