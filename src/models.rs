use std::fmt;

#[derive(Debug, Clone)]
pub struct NetworkCredentials {
    pub network_name: String,
    pub shared_secret: String,
}

#[derive(Debug, Clone)]
pub struct BrokerEndpoint {
    pub host: String,
    pub port: u16,
}

impl fmt::Display for BrokerEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Link state as reported by a status poll. Polling has no side effects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
}

/// One temperature reading. Created each cycle, rendered, discarded.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TelemetrySample {
    pub temperature: f64,
}

impl TelemetrySample {
    /// Wire payload with exactly one fractional digit.
    pub fn to_payload(&self) -> String {
        format!("{{\"temperature\": {:.1}}}", self.temperature)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_keeps_one_fractional_digit() {
        let sample = TelemetrySample { temperature: 23.4 };
        assert_eq!(sample.to_payload(), "{\"temperature\": 23.4}");
    }

    #[test]
    fn whole_degrees_render_with_trailing_zero() {
        let sample = TelemetrySample { temperature: 25.0 };
        assert_eq!(sample.to_payload(), "{\"temperature\": 25.0}");
    }

    #[test]
    fn payload_is_valid_json() {
        let sample = TelemetrySample { temperature: 34.9 };
        let value: serde_json::Value = serde_json::from_str(&sample.to_payload()).unwrap();
        assert_eq!(value["temperature"].as_f64(), Some(34.9));
    }

    #[test]
    fn broker_endpoint_displays_host_and_port() {
        let endpoint = BrokerEndpoint {
            host: "192.168.73.79".to_string(),
            port: 1883,
        };
        assert_eq!(endpoint.to_string(), "192.168.73.79:1883");
    }
}
