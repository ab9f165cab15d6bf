//! Temperature sources the reading tool forwards to

use crate::error::ToolError;
use log::debug;
use rand::Rng;

/// Synchronous source of temperature readings
///
/// Implementations must tolerate concurrent calls since overlapping cycles
/// may read at the same time.
#[cfg_attr(test, mockall::automock)]
pub trait SensorSource: Send + Sync {
    fn read(&self) -> Result<f64, ToolError>;
}

/// Simulated probe returning a uniform reading in `[min, max)`
#[derive(Debug, Clone)]
pub struct SimulatedSensor {
    min: f64,
    max: f64,
}

impl Default for SimulatedSensor {
    fn default() -> Self {
        Self::new(60.0, 90.0)
    }
}

impl SimulatedSensor {
    /// Create a simulated sensor; `min` must be below `max`
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }
}

impl SensorSource for SimulatedSensor {
    fn read(&self) -> Result<f64, ToolError> {
        if !self.min.is_finite() || !self.max.is_finite() || self.min >= self.max {
            return Err(ToolError::SensorFailed(format!(
                "invalid simulation range [{}, {})",
                self.min, self.max
            )));
        }
        let reading = rand::rng().random_range(self.min..self.max);
        debug!("Simulated sensor reading: {:.2}", reading);
        Ok(reading)
    }
}

/// Sensor that always reports the same value
#[derive(Debug, Clone, Copy)]
pub struct FixedSensor(pub f64);

impl SensorSource for FixedSensor {
    fn read(&self) -> Result<f64, ToolError> {
        Ok(self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simulated_sensor_stays_in_range() {
        let sensor = SimulatedSensor::default();
        for _ in 0..200 {
            let reading = sensor.read().unwrap();
            assert!((60.0..90.0).contains(&reading));
        }
    }

    #[test]
    fn test_simulated_sensor_rejects_empty_range() {
        let sensor = SimulatedSensor::new(80.0, 80.0);
        assert!(matches!(sensor.read(), Err(ToolError::SensorFailed(_))));
    }

    #[test]
    fn test_fixed_sensor() {
        assert_eq!(FixedSensor(80.0).read().unwrap(), 80.0);
    }
}
