//! Tests for the balancer

use super::*;

#[tokio::test]
async fn test_resolves_localhost() {
    let balancer = Balancer::new("localhost:8082");
    let addrs = balancer.resolve().await.unwrap();
    assert!(!addrs.is_empty());
    assert!(addrs.iter().all(|a| a.port() == 8082));
}

#[tokio::test]
async fn test_pick_returns_resolved_address() {
    let balancer = Balancer::new("127.0.0.1:9000");
    let addr = balancer.pick().await.unwrap();
    assert_eq!(addr.port(), 9000);
    assert!(addr.ip().is_loopback());
}

#[tokio::test]
async fn test_unresolvable_name_errors() {
    let balancer = Balancer::new("no-such-host.invalid:1");
    assert!(balancer.pick().await.is_err());
}

#[test]
fn test_zone_balancers_prefer_zone_local_name() {
    let balancers = zone_balancers("z1", "upstream.example:8082");
    assert_eq!(balancers.len(), 2);
    assert_eq!(balancers[0].name(), "z1.upstream.example:8082");
    assert_eq!(balancers[1].name(), "upstream.example:8082");
}

#[test]
fn test_empty_zone_uses_generic_name_only() {
    let balancers = zone_balancers("", "upstream.example:8082");
    assert_eq!(balancers.len(), 1);
    assert_eq!(balancers[0].name(), "upstream.example:8082");
}
