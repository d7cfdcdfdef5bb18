//! Test data builders for creating test vehicles

use vehicle_rs::{AnyPart, Binding, Vehicle, VehicleConfig};

/// Configuration with short shutdown budgets so tests finish quickly
pub fn fast_config() -> VehicleConfig {
    VehicleConfig {
        shutdown_budget_ms: 200,
        worker_grace_ms: 200,
        stats_interval_ms: 50,
        ..Default::default()
    }
}

/// Builder for creating test Vehicles
pub struct VehicleBuilder {
    config: VehicleConfig,
    parts: Vec<(AnyPart, Binding)>,
    seeds: Vec<(String, vehicle_rs::Value)>,
}

impl VehicleBuilder {
    pub fn new() -> Self {
        Self {
            config: fast_config(),
            parts: Vec::new(),
            seeds: Vec::new(),
        }
    }

    pub fn config(mut self, config: VehicleConfig) -> Self {
        self.config = config;
        self
    }

    pub fn part(mut self, part: AnyPart, binding: Binding) -> Self {
        self.parts.push((part, binding));
        self
    }

    pub fn seed(mut self, key: &str, value: impl Into<vehicle_rs::Value>) -> Self {
        self.seeds.push((key.to_string(), value.into()));
        self
    }

    pub fn build(self) -> Vehicle {
        let mut vehicle = Vehicle::new(self.config);
        for (key, value) in self.seeds {
            vehicle.seed(key, value).unwrap();
        }
        for (part, binding) in self.parts {
            vehicle.register(part, binding).unwrap();
        }
        vehicle
    }
}

impl Default for VehicleBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::mock_helpers::TickSource;

    #[test]
    fn test_vehicle_builder() {
        let vehicle = VehicleBuilder::new()
            .seed("gate", true)
            .part(
                AnyPart::sync(TickSource::default()),
                Binding::new().named("source").outputs(["x"]),
            )
            .build();

        assert_eq!(vehicle.bindings().len(), 1);
        assert_eq!(vehicle.bindings()[0].label.name, "source");
        assert_eq!(vehicle.config().shutdown_budget_ms, 200);
    }
}
