//! Host port allocation for one generation pass.
//!
//! The allocator starts with the well-known ports of common external systems
//! reserved, so a service never takes a port that infrastructure declared by
//! another service will publish.

use std::collections::BTreeMap;

use grund_common::constants::{MAX_PORT_PROBES, WELL_KNOWN_PORTS};
use grund_common::error::{GrundError, Result};

/// Outcome of [`PortAllocator::allocate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Allocation {
    /// Host port reserved for the owner.
    pub port: u16,
    /// Whether the port differs from the one requested.
    pub reassigned: bool,
}

/// Tracks which host ports are taken during a generation pass.
#[derive(Debug, Clone)]
pub struct PortAllocator {
    reserved: BTreeMap<u16, String>,
}

impl PortAllocator {
    /// Creates an allocator with the well-known ports reserved.
    #[must_use]
    pub fn new() -> Self {
        let reserved = WELL_KNOWN_PORTS
            .iter()
            .map(|(port, owner)| (*port, (*owner).to_owned()))
            .collect();
        Self { reserved }
    }

    /// Creates an allocator with nothing reserved.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            reserved: BTreeMap::new(),
        }
    }

    /// Marks a port as taken without probing.
    ///
    /// Returns the previous owner if the port was already taken.
    pub fn reserve(&mut self, owner: impl Into<String>, port: u16) -> Option<String> {
        self.reserved.insert(port, owner.into())
    }

    /// Returns the owner of a port, if taken.
    #[must_use]
    pub fn owner(&self, port: u16) -> Option<&str> {
        self.reserved.get(&port).map(String::as_str)
    }

    /// Reserves `desired` for `owner`, or the next free port above it.
    ///
    /// # Errors
    ///
    /// Returns [`GrundError::Config`] for port 0 and
    /// [`GrundError::PortsExhausted`] if no free port exists within
    /// [`MAX_PORT_PROBES`] candidates or before the end of the port range.
    pub fn allocate(&mut self, owner: &str, desired: u16) -> Result<Allocation> {
        if desired == 0 {
            return Err(GrundError::Config {
                message: format!("{owner} requests host port 0"),
            });
        }

        if !self.reserved.contains_key(&desired) {
            let _ = self.reserved.insert(desired, owner.to_owned());
            return Ok(Allocation {
                port: desired,
                reassigned: false,
            });
        }

        let mut probes = 0;
        let mut candidate = desired;
        while probes < MAX_PORT_PROBES {
            let Some(next) = candidate.checked_add(1) else {
                break;
            };
            candidate = next;
            probes += 1;
            if !self.reserved.contains_key(&candidate) {
                let _ = self.reserved.insert(candidate, owner.to_owned());
                tracing::debug!(owner, desired, port = candidate, "port reassigned");
                return Ok(Allocation {
                    port: candidate,
                    reassigned: true,
                });
            }
        }

        Err(GrundError::PortsExhausted {
            owner: owner.to_owned(),
            desired,
            probes,
        })
    }
}

impl Default for PortAllocator {
    fn default() -> Self {
        Self::new()
    }
}
