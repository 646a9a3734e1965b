//! Control endpoint metadata for binding processors to external UI.
//!
//! Descriptors carry no runtime behavior. Their `default_value` mirrors the
//! owning processor's current state at the time they were produced.

/// How a UI should present an endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointKind {
    Slider,
    Numeric,
}

impl EndpointKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EndpointKind::Slider => "slider",
            EndpointKind::Numeric => "numeric",
        }
    }
}

/// Descriptive record for one bindable control
#[derive(Debug, Clone, PartialEq)]
pub struct EndpointDescriptor {
    pub id: &'static str,
    pub label: &'static str,
    pub kind: EndpointKind,
    pub minimum: f64,
    pub maximum: f64,
    pub default_value: f64,
    pub description: &'static str,
}

/// Endpoints exposed by the latency-compensated layer share the same shape
pub type ControlEndpoint = EndpointDescriptor;

impl EndpointDescriptor {
    /// Whether `value` lies inside the advertised range
    pub fn contains(&self, value: f64) -> bool {
        value >= self.minimum && value <= self.maximum
    }
}

/// Find an endpoint by id
pub fn find<'a>(endpoints: &'a [EndpointDescriptor], id: &str) -> Option<&'a EndpointDescriptor> {
    endpoints.iter().find(|e| e.id == id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_names() {
        assert_eq!(EndpointKind::Slider.as_str(), "slider");
        assert_eq!(EndpointKind::Numeric.as_str(), "numeric");
    }

    #[test]
    fn test_find_and_contains() {
        let endpoints = [EndpointDescriptor {
            id: "tempo",
            label: "Tempo",
            kind: EndpointKind::Slider,
            minimum: 0.5,
            maximum: 2.5,
            default_value: 1.0,
            description: "",
        }];

        let tempo = find(&endpoints, "tempo").unwrap();
        assert!(tempo.contains(1.0));
        assert!(!tempo.contains(3.0));
        assert!(find(&endpoints, "pitch").is_none());
    }
}
