//! Health reporting types

use std::time::SystemTime;

use serde::Serialize;

/// Health of a single component
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ComponentHealth {
    pub name: String,
    pub is_healthy: bool,
    pub message: Option<String>,
}

impl ComponentHealth {
    pub fn healthy<S: Into<String>>(name: S) -> Self {
        Self { name: name.into(), is_healthy: true, message: None }
    }

    pub fn unhealthy<S: Into<String>, M: Into<String>>(name: S, message: M) -> Self {
        Self { name: name.into(), is_healthy: false, message: Some(message.into()) }
    }

    /// Attach a detail message without changing the verdict
    #[must_use]
    pub fn with_message<M: Into<String>>(mut self, message: M) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// Aggregate health of a service made of several components
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    /// Overall health status
    pub is_healthy: bool,
    /// Individual component health checks
    pub components: Vec<ComponentHealth>,
    /// Timestamp of health check
    pub timestamp: SystemTime,
}

impl HealthReport {
    /// Create an empty, healthy report
    pub fn new() -> Self {
        Self { is_healthy: true, components: Vec::new(), timestamp: SystemTime::now() }
    }

    /// Add a component; any unhealthy component makes the report unhealthy
    #[must_use]
    pub fn with_component(mut self, component: ComponentHealth) -> Self {
        self.is_healthy &= component.is_healthy;
        self.components.push(component);
        self
    }

    /// Look up a component by name
    pub fn component(&self, name: &str) -> Option<&ComponentHealth> {
        self.components.iter().find(|c| c.name == name)
    }
}

impl Default for HealthReport {
    fn default() -> Self {
        Self::new()
    }
}
