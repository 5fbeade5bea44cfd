//! Finding the gauge among the serial ports attached to the host.

use log::{debug, warn};
use serialport::SerialPortType;

use crate::config::MatcherConfig;
use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Eq)]
/// A serial port that might be the gauge.
pub struct PortCandidate {
    /// System device path (e.g. "/dev/ttyACM0", "COM3")
    pub path: String,
    /// USB manufacturer string, if the OS reports one
    pub manufacturer: Option<String>,
    /// USB product description, if the OS reports one
    pub description: Option<String>,
}

impl PortCandidate {
    pub fn new(path: impl Into<String>) -> Self {
        PortCandidate {
            path: path.into(),
            manufacturer: None,
            description: None,
        }
    }

    pub fn with_manufacturer(mut self, manufacturer: impl Into<String>) -> Self {
        self.manufacturer = Some(manufacturer.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// One device-identification heuristic.
pub enum MatchRule {
    /// Manufacturer string contains the token (case-insensitive)
    Manufacturer(String),
    /// Description string contains the token (case-insensitive)
    Description(String),
    /// Device path contains the pattern
    PathContains(String),
}

impl MatchRule {
    pub fn matches(&self, candidate: &PortCandidate) -> bool {
        match self {
            MatchRule::Manufacturer(token) => contains_ignore_case(candidate.manufacturer.as_deref(), token),
            MatchRule::Description(token) => contains_ignore_case(candidate.description.as_deref(), token),
            MatchRule::PathContains(pattern) => candidate.path.contains(pattern.as_str()),
        }
    }
}

fn contains_ignore_case(haystack: Option<&str>, needle: &str) -> bool {
    haystack.is_some_and(|h| h.to_lowercase().contains(&needle.to_lowercase()))
}

/// Prioritized list of [`MatchRule`]s.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceMatcher {
    rules: Vec<MatchRule>,
}

impl DeviceMatcher {
    pub fn new(rules: Vec<MatchRule>) -> Self {
        DeviceMatcher { rules }
    }

    /// Manufacturer tokens first, then description tokens, then path patterns.
    pub fn from_config(config: &MatcherConfig) -> Self {
        let rules = config
            .manufacturer_tokens
            .iter()
            .map(|t| MatchRule::Manufacturer(t.clone()))
            .chain(config.description_tokens.iter().map(|t| MatchRule::Description(t.clone())))
            .chain(config.path_patterns.iter().map(|p| MatchRule::PathContains(p.clone())))
            .collect();
        DeviceMatcher { rules }
    }

    pub fn rules(&self) -> &[MatchRule] {
        &self.rules
    }

    /// Pick the best candidate: the highest-priority rule that matches any port wins,
    /// ties broken by enumeration order.
    pub fn select(&self, candidates: &[PortCandidate]) -> Option<PortCandidate> {
        self.rules.iter().find_map(|rule| {
            candidates
                .iter()
                .find(|c| rule.matches(c))
                .inspect(|c| debug!("Port {} matched {:?}", c.path, rule))
                .cloned()
        })
    }
}

/// Source of serial port listings.
pub trait PortEnumerator: Send + 'static {
    fn candidates(&self) -> Result<Vec<PortCandidate>>;
}

/// Enumerates the host's real serial ports.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemPorts;

impl PortEnumerator for SystemPorts {
    fn candidates(&self) -> Result<Vec<PortCandidate>> {
        let ports = serialport::available_ports()?;
        Ok(ports
            .into_iter()
            .map(|port| match port.port_type {
                SerialPortType::UsbPort(info) => PortCandidate {
                    path: port.port_name,
                    manufacturer: info.manufacturer,
                    description: info.product,
                },
                _ => PortCandidate::new(port.port_name),
            })
            .collect())
    }
}

/// Run one discovery attempt.
///
/// `None` means the gauge is not attached right now, which is routine. An
/// enumeration failure is logged and reported the same way.
pub fn discover<E: PortEnumerator + ?Sized>(
    enumerator: &E,
    matcher: &DeviceMatcher,
) -> Option<PortCandidate> {
    let candidates = match enumerator.candidates() {
        Ok(candidates) => candidates,
        Err(e) => {
            warn!("Failed to enumerate serial ports: {}", e);
            return None;
        }
    };
    let found = matcher.select(&candidates);
    if found.is_none() {
        debug!("No matching port among {} candidate(s)", candidates.len());
    }
    found
}
