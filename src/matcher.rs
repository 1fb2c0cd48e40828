use ipnet::IpNet;
use std::net::IpAddr;
use std::str::FromStr;

use crate::error::ConntopError;

/// A single `--match` value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchRule {
    /// Literal string prefix such as `128.252.`
    Prefix(String),
    /// CIDR network such as `128.252.0.0/16`
    Network(IpNet),
}

impl MatchRule {
    pub fn parse(value: &str) -> Result<Self, ConntopError> {
        let value = value.trim();
        if value.is_empty() {
            return Err(ConntopError::InvalidFilter {
                value: value.to_string(),
                reason: "empty filter".to_string(),
            });
        }

        if value.contains('/') {
            let network = IpNet::from_str(value).map_err(|e| ConntopError::InvalidFilter {
                value: value.to_string(),
                reason: e.to_string(),
            })?;
            Ok(MatchRule::Network(network))
        } else {
            Ok(MatchRule::Prefix(value.to_string()))
        }
    }

    pub fn matches(&self, address: &str) -> bool {
        match self {
            MatchRule::Prefix(prefix) => address.starts_with(prefix.as_str()),
            MatchRule::Network(network) => IpAddr::from_str(address)
                .map(|addr| network.contains(&addr))
                .unwrap_or(false),
        }
    }
}

/// Decides which addresses become keys in a tally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressMatcher {
    rules: Vec<MatchRule>,
}

impl AddressMatcher {
    pub fn new(rules: Vec<MatchRule>) -> Result<Self, ConntopError> {
        if rules.is_empty() {
            return Err(ConntopError::config(
                "at least one address filter (--match) is required",
            ));
        }
        Ok(Self { rules })
    }

    pub fn parse<S: AsRef<str>>(values: &[S]) -> Result<Self, ConntopError> {
        let rules = values
            .iter()
            .map(|value| MatchRule::parse(value.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(rules)
    }

    pub fn matches(&self, address: &str) -> bool {
        self.rules.iter().any(|rule| rule.matches(address))
    }

    pub fn rules(&self) -> &[MatchRule] {
        &self.rules
    }
}
