//! KULTA Traefik traffic router
//!
//! Shifts a requested percentage of traffic from a stable service to its
//! canary by patching the Traefik-served Ingress in front of them.

pub mod config;
pub mod controller;
pub mod crd;
