#![allow(dead_code)]
//! Networking: mDNS discovery, store hosting, TCP connections
//!
//! This module provides:
//! - mDNS-SD discovery for finding store hosts on the local network
//! - TCP server hosting a shared store (default port 55433 with auto-increment)
//! - `RemoteStore`, a `Store` that talks to a host (manual connect via --connect IP:PORT)
//! - Length-prefixed JSON protocol for requests, responses and pushed feed changes

pub mod client;
pub mod peer;
pub mod protocol;
pub mod server;

pub use client::RemoteStore;
pub use protocol::Message;
pub use server::{Server, ServerEvent, StoreHost};

use mdns_sd::{ServiceDaemon, ServiceEvent, ServiceInfo};
use std::collections::HashMap;
use std::sync::mpsc;
use std::thread;

/// Service type for mDNS discovery
pub const SERVICE_TYPE: &str = "_wordgrid._tcp.local.";

/// Current protocol version
pub const PROTOCOL_VERSION: &str = "1";

/// Errors from the discovery daemon
#[derive(Debug, thiserror::Error)]
#[error("mdns: {context}: {source}")]
pub struct DiscoveryError {
    context: &'static str,
    #[source]
    source: mdns_sd::Error,
}

impl DiscoveryError {
    fn new(context: &'static str) -> impl FnOnce(mdns_sd::Error) -> Self {
        move |source| Self { context, source }
    }
}

/// A store host found on the network
#[derive(Debug, Clone)]
pub struct HostInfo {
    /// Unique instance name of the host
    pub instance: String,
    /// Human-readable label chosen by whoever runs the host
    pub label: String,
    /// Protocol version the host speaks
    pub version: String,
    /// Hostname of the host
    pub hostname: String,
    /// IP addresses, IPv4 first
    pub addresses: Vec<std::net::IpAddr>,
    /// Port the host is listening on
    pub port: u16,
}

impl HostInfo {
    /// "ip:port" of the preferred address
    pub fn connect_string(&self) -> Option<String> {
        self.addresses
            .first()
            .map(|addr| std::net::SocketAddr::new(*addr, self.port).to_string())
    }
}

/// Events from the service discovery system
#[derive(Debug)]
pub enum DiscoveryEvent {
    /// A host was discovered
    HostDiscovered(HostInfo),
    /// A host went offline
    HostLost(String), // instance
}

/// Service discovery manager for store hosts on the local network
pub struct ServiceDiscovery {
    daemon: ServiceDaemon,
    instance: String,
    registered: bool,
}

impl ServiceDiscovery {
    /// Create a new service discovery instance
    ///
    /// # Arguments
    /// * `instance` - Unique name for this process on the network
    pub fn new(instance: String) -> Result<Self, DiscoveryError> {
        let daemon = ServiceDaemon::new().map_err(DiscoveryError::new("failed to create daemon"))?;

        Ok(Self {
            daemon,
            instance,
            registered: false,
        })
    }

    /// Advertise a store host
    ///
    /// # Arguments
    /// * `label` - Display label for browsers
    /// * `port` - Port the host listens on
    pub fn advertise(&mut self, label: &str, port: u16) -> Result<(), DiscoveryError> {
        let properties: Vec<(&str, &str)> = vec![
            ("version", PROTOCOL_VERSION),
            ("label", label),
            ("instance", &self.instance),
        ];

        let hostname = format!("{}.local.", self.instance);

        let service_info = ServiceInfo::new(
            SERVICE_TYPE,
            &self.instance,
            &hostname,
            (),
            port,
            &properties[..],
        )
        .map_err(DiscoveryError::new("failed to create service info"))?
        .enable_addr_auto();

        self.daemon
            .register(service_info)
            .map_err(DiscoveryError::new("failed to register service"))?;

        self.registered = true;
        tracing::info!(instance = %self.instance, port, "advertising store host");
        Ok(())
    }

    /// Stop advertising on the network
    pub fn stop_advertising(&mut self) -> Result<(), DiscoveryError> {
        if self.registered {
            self.registered = false;
            let fullname = format!("{}.{}", self.instance, SERVICE_TYPE);
            self.daemon
                .unregister(&fullname)
                .map_err(DiscoveryError::new("failed to unregister service"))?;
        }
        Ok(())
    }

    /// Start browsing for store hosts
    ///
    /// Returns a receiver that will emit DiscoveryEvents as hosts are found/lost
    pub fn browse(&self) -> Result<mpsc::Receiver<DiscoveryEvent>, DiscoveryError> {
        let receiver = self
            .daemon
            .browse(SERVICE_TYPE)
            .map_err(DiscoveryError::new("failed to start browsing"))?;

        let (tx, rx) = mpsc::channel();
        let our_instance = self.instance.clone();

        thread::spawn(move || {
            while let Ok(event) = receiver.recv() {
                match event {
                    ServiceEvent::ServiceResolved(info) => {
                        let properties = info.get_properties();

                        let instance = properties
                            .get_property_val_str("instance")
                            .unwrap_or_default()
                            .to_string();

                        // Skip ourselves
                        if instance == our_instance {
                            continue;
                        }

                        let label = properties
                            .get_property_val_str("label")
                            .unwrap_or_default()
                            .to_string();

                        let version = properties
                            .get_property_val_str("version")
                            .unwrap_or(PROTOCOL_VERSION)
                            .to_string();

                        // IPv6 link-local addresses need a scope id that
                        // IpAddr doesn't carry, so prefer IPv4
                        let mut addresses: Vec<std::net::IpAddr> = info
                            .get_addresses()
                            .iter()
                            .map(|s| s.to_ip_addr())
                            .collect();
                        addresses.sort_by_key(|addr| match addr {
                            std::net::IpAddr::V4(_) => 0,
                            std::net::IpAddr::V6(_) => 1,
                        });

                        let host = HostInfo {
                            instance,
                            label,
                            version,
                            hostname: info.get_hostname().to_string(),
                            addresses,
                            port: info.get_port(),
                        };

                        let _ = tx.send(DiscoveryEvent::HostDiscovered(host));
                    }
                    ServiceEvent::ServiceRemoved(_, fullname) => {
                        if let Some(instance) = fullname.strip_suffix(&format!(".{}", SERVICE_TYPE)) {
                            let _ = tx.send(DiscoveryEvent::HostLost(instance.to_string()));
                        }
                    }
                    _ => {}
                }
            }
        });

        Ok(rx)
    }

    /// Stop browsing
    pub fn stop_browsing(&self) -> Result<(), DiscoveryError> {
        self.daemon
            .stop_browse(SERVICE_TYPE)
            .map_err(DiscoveryError::new("failed to stop browsing"))
    }

    /// Shutdown the discovery service
    pub fn shutdown(self) -> Result<(), DiscoveryError> {
        self.daemon
            .shutdown()
            .map_err(DiscoveryError::new("failed to shut down daemon"))?;
        Ok(())
    }
}

/// Tracks discovered hosts
#[derive(Debug, Default)]
pub struct HostTracker {
    hosts: HashMap<String, HostInfo>,
}

impl HostTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one discovery event
    pub fn apply(&mut self, event: DiscoveryEvent) {
        match event {
            DiscoveryEvent::HostDiscovered(host) => {
                self.hosts.insert(host.instance.clone(), host);
            }
            DiscoveryEvent::HostLost(instance) => {
                self.hosts.remove(&instance);
            }
        }
    }

    /// Known hosts sorted by label
    pub fn hosts(&self) -> Vec<&HostInfo> {
        let mut hosts: Vec<&HostInfo> = self.hosts.values().collect();
        hosts.sort_by(|a, b| a.label.cmp(&b.label).then(a.instance.cmp(&b.instance)));
        hosts
    }

    pub fn get(&self, instance: &str) -> Option<&HostInfo> {
        self.hosts.get(instance)
    }

    pub fn count(&self) -> usize {
        self.hosts.len()
    }
}
