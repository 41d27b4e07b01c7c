use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::models::TelemetrySample;

/// Produces one reading per invocation. Infallible.
pub trait TelemetrySource {
    fn sample(&mut self) -> TelemetrySample;
}

/// Stand-in for a physical sensor: uniform tenths of a degree in
/// [20.0, 35.0), the range a bench thermometer would plausibly report.
pub struct FakeTemperatureSensor {
    rng: StdRng,
}

impl FakeTemperatureSensor {
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Default for FakeTemperatureSensor {
    fn default() -> Self {
        Self::new()
    }
}

impl TelemetrySource for FakeTemperatureSensor {
    fn sample(&mut self) -> TelemetrySample {
        let tenths = self.rng.gen_range(200..350);
        TelemetrySample {
            temperature: f64::from(tenths) / 10.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn samples_stay_in_range_at_tenth_resolution() {
        let mut sensor = FakeTemperatureSensor::seeded(42);
        for _ in 0..1_000 {
            let sample = sensor.sample();
            assert!(
                (20.0..35.0).contains(&sample.temperature),
                "out of range: {}",
                sample.temperature
            );
            let tenths = sample.temperature * 10.0;
            assert!((tenths - tenths.round()).abs() < 1e-9);
        }
    }

    #[test]
    fn seeded_sensors_reproduce_the_same_series() {
        let mut a = FakeTemperatureSensor::seeded(7);
        let mut b = FakeTemperatureSensor::seeded(7);
        for _ in 0..10 {
            assert_eq!(a.sample(), b.sample());
        }
    }
}
