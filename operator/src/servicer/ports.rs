//! Projection of a workload's container ports onto a service port set.
use std::{collections::BTreeMap, fmt, str::FromStr};

use k8s_openapi::api::core::v1::{Container, ServicePort};

use crate::Error;

/// Transport protocol of a port.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Protocol {
    /// Platform default when a port leaves the protocol unset.
    #[default]
    Tcp,
    /// UDP
    Udp,
    /// SCTP
    Sctp,
}

impl Protocol {
    /// Canonical spelling used by the API.
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Tcp => "TCP",
            Protocol::Udp => "UDP",
            Protocol::Sctp => "SCTP",
        }
    }

    fn parse_optional(protocol: Option<&str>) -> Result<Self, String> {
        protocol.map_or(Ok(Protocol::default()), str::parse)
    }
}

impl FromStr for Protocol {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "TCP" => Ok(Protocol::Tcp),
            "UDP" => Ok(Protocol::Udp),
            "SCTP" => Ok(Protocol::Sctp),
            other => Err(format!("unsupported protocol {other:?}")),
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ports ordered by number, protocol and name.
///
/// A projection holds each port number once. Ports read back from a service are
/// kept as stored, so a duplicate or extra entry compares unequal.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PortSet(Vec<NamedPort>);

/// A single entry of a [`PortSet`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NamedPort {
    /// Port name, unique within the set.
    pub name: String,
    /// Port number
    pub port: i32,
    /// Protocol
    pub protocol: Protocol,
}

impl NamedPort {
    fn new(port: i32, protocol: Protocol) -> Self {
        Self {
            name: format!("{port}-{}", protocol.as_str().to_lowercase()),
            port,
            protocol,
        }
    }
}

impl PortSet {
    fn sorted(mut ports: Vec<NamedPort>) -> Self {
        ports.sort_by(|a, b| {
            (a.port, a.protocol, &a.name).cmp(&(b.port, b.protocol, &b.name))
        });
        Self(ports)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True when no container declares a port.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate the entries in port order.
    pub fn iter(&self) -> impl Iterator<Item = &NamedPort> {
        self.0.iter()
    }

    /// Normalise the ports of an existing service so it can be compared with a projection.
    ///
    /// Ports without a protocol are read as TCP, the same default the API server applies.
    pub fn from_service_ports(ports: &[ServicePort]) -> Self {
        Self::sorted(
            ports
                .iter()
                .map(|p| NamedPort {
                    name: p.name.clone().unwrap_or_default(),
                    port: p.port,
                    protocol: Protocol::parse_optional(p.protocol.as_deref()).unwrap_or_default(),
                })
                .collect(),
        )
    }

    /// Render the set as service ports, targeting the same container port.
    pub fn to_service_ports(&self) -> Vec<ServicePort> {
        self.iter()
            .map(|p| ServicePort {
                name: Some(p.name.clone()),
                port: p.port,
                protocol: Some(p.protocol.as_str().to_owned()),
                ..Default::default()
            })
            .collect()
    }
}

/// Project the ports declared by containers into a [`PortSet`].
///
/// Containers are visited in order. When two declarations share a port number
/// the one visited last decides the protocol.
pub fn project(workload: &str, containers: &[Container]) -> Result<PortSet, Error> {
    let mut ports = BTreeMap::new();
    for container in containers {
        for port in container.ports.iter().flatten() {
            let protocol = Protocol::parse_optional(port.protocol.as_deref()).map_err(|reason| {
                Error::malformed(
                    workload,
                    format!("container {} port {}: {reason}", container.name, port.container_port),
                )
            })?;
            ports.insert(port.container_port, NamedPort::new(port.container_port, protocol));
        }
    }
    Ok(PortSet(ports.into_values().collect()))
}
