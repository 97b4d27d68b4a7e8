//! Discrete building blocks shared by the controllers.

/// Band-limited ("dirty") derivative from the backward difference of a signal.
///
/// Discretizes s / (σs + 1) with the Tustin rule:
///
/// d[k] = a1 d[k−1] + a2 (y[k] − y[k−1]),  a1 = (2σ − Ts)/(2σ + Ts),  a2 = 2/(2σ + Ts)
#[derive(Clone, Debug)]
pub struct DirtyDerivative {
    a1: f64,
    a2: f64,
    value: f64,
    previous: f64,
}

impl DirtyDerivative {
    /// # Arguments
    ///
    /// * `sigma` - Filter time constant σ (s)
    /// * `ts` - Sample period (s)
    /// * `initial` - Signal value assumed before the first sample
    pub fn new(sigma: f64, ts: f64, initial: f64) -> Self {
        Self {
            a1: (2.0 * sigma - ts) / (2.0 * sigma + ts),
            a2: 2.0 / (2.0 * sigma + ts),
            value: 0.0,
            previous: initial,
        }
    }

    pub fn update(&mut self, sample: f64) -> f64 {
        self.value = self.a1 * self.value + self.a2 * (sample - self.previous);
        self.previous = sample;
        self.value
    }

    pub fn value(&self) -> f64 {
        self.value
    }
}

/// Trapezoidal integral of a tracking error.
#[derive(Clone, Debug)]
pub struct TrapezoidalIntegrator {
    ts: f64,
    value: f64,
    previous_error: f64,
}

impl TrapezoidalIntegrator {
    pub fn new(ts: f64) -> Self {
        Self {
            ts,
            value: 0.0,
            previous_error: 0.0,
        }
    }

    /// Records `error` and, if `accumulate` is set, adds Ts/2 (e[k] + e[k−1]).
    ///
    /// The delayed error always advances, so a skipped tick does not leave a stale sample
    /// behind for the next accumulation.
    pub fn update(&mut self, error: f64, accumulate: bool) -> f64 {
        if accumulate {
            self.value += self.ts / 2.0 * (error + self.previous_error);
        }
        self.previous_error = error;
        self.value
    }

    pub fn value(&self) -> f64 {
        self.value
    }
}
