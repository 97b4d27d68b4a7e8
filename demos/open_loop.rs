use whirlybird::dynamics::{simulate_span, AttitudeState, DynamicsIntegrator};
use whirlybird::mixer::ForceTorque;
use whirlybird::params::PlantParameters;

// Open-loop flight: slightly more than trim force and a small roll torque
fn main() {
    let params = PlantParameters::default();

    let initial_state = AttitudeState {
        pitch: -0.1, // Boom starts a little below level
        ..Default::default()
    };

    let input = ForceTorque::new(
        params.equilibrium_force(0.0) + 0.05,
        0.001, // Small roll torque
    );
    let thrust = input.open_loop_thrust(params.d);

    let mut plant = DynamicsIntegrator::new(params, initial_state);
    let steps = (2.0 / params.sample_period).round() as usize;
    for _ in 0..steps {
        if let Err(e) = plant.propagate(thrust) {
            println!("Propagation failed: {}", e);
            return;
        }
    }

    let final_state = plant.full_state();
    println!("Final state (RK4, Ts = {} s):", params.sample_period);
    println!(
        "Attitude: ({:.4}, {:.4}, {:.4})",
        final_state.roll, final_state.pitch, final_state.yaw
    );
    println!(
        "Rates: ({:.4}, {:.4}, {:.4})",
        final_state.roll_rate, final_state.pitch_rate, final_state.yaw_rate
    );

    match simulate_span(initial_state, params, thrust, (0.0, 2.0), 1e-9) {
        Ok(reference) => println!(
            "Adaptive solver attitude: ({:.4}, {:.4}, {:.4})",
            reference.roll, reference.pitch, reference.yaw
        ),
        Err(e) => println!("Adaptive integration failed: {}", e),
    }
}
