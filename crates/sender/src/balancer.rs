//! Address resolution with random pick
//!
//! A balancer wraps one DNS-style name (host:port). Resolution goes
//! through the system resolver on every pick so fleet changes are
//! observed without a restart; the random pick spreads producers
//! across the resolved set.

use std::net::SocketAddr;

use rand::Rng;
use tokio::net::lookup_host;

use crate::error::{Result, SenderError};

/// Resolves one upstream name to addresses
#[derive(Debug, Clone)]
pub struct Balancer {
    name: String,
}

impl Balancer {
    /// Create a balancer for `name` (host:port)
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    /// The name this balancer resolves
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Resolve to the current address set
    pub async fn resolve(&self) -> Result<Vec<SocketAddr>> {
        let addrs: Vec<SocketAddr> = lookup_host(&self.name)
            .await
            .map_err(|e| SenderError::Resolve {
                name: self.name.clone(),
                source: e,
            })?
            .collect();
        Ok(addrs)
    }

    /// Pick one address at random from the resolved set
    pub async fn pick(&self) -> Result<SocketAddr> {
        let addrs = self.resolve().await?;
        if addrs.is_empty() {
            return Err(SenderError::NoAddresses);
        }
        let index = rand::rng().random_range(0..addrs.len());
        Ok(addrs[index])
    }
}

/// The producer's balancer preference order: the zone-local name
/// first, the generic name as fallback
pub fn zone_balancers(zone: &str, upstream: &str) -> Vec<Balancer> {
    if zone.is_empty() {
        return vec![Balancer::new(upstream)];
    }
    vec![
        Balancer::new(format!("{zone}.{upstream}")),
        Balancer::new(upstream),
    ]
}

#[cfg(test)]
#[path = "balancer_test.rs"]
mod tests;
