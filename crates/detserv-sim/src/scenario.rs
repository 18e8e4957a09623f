//! TOML scenario description: the network, the admission configuration,
//! the flows and the order in which they are admitted and withdrawn.
//!
//! ```toml
//! [config]
//! burst_increase = "worst_case_burst_real_reservation"
//! [config.allocation]
//! kind = "tbm_static_delays"
//! delays = [0.00174, 0.0066, 0.01122]
//!
//! [[nodes]]
//! name = "h1"
//! kind = "host"
//!
//! [[links]]
//! from = "h1"
//! to = "s1"
//! rate = 125e6
//! buffers = [300000, 300000, 300000]
//!
//! [[flows]]
//! name = "video"
//! route = ["h1", "s1", "h2"]
//! rate = 40.25e6
//! burst = 186000
//! deadline = 0.01
//!
//! [[events]]
//! action = "admit"
//! flow = "video"
//! ```
//!
//! Without `[[events]]` every flow is admitted once, in file order.

use std::collections::HashMap;
use std::path::Path as FsPath;

use anyhow::{bail, Context};
use serde::Deserialize;

use detserv::{
    DetServ, DetServConfigInput, FlowRequest, LinkId, LinkSpec, NodeId, NodeKind, RequestEnvelope,
    TokenBucket,
};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Scenario {
    pub config: DetServConfigInput,
    pub nodes: Vec<NodeEntry>,
    pub links: Vec<LinkEntry>,
    pub flows: Vec<FlowEntry>,
    pub events: Vec<Event>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NodeEntry {
    pub name: String,
    #[serde(default)]
    pub kind: NodeKind,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LinkEntry {
    pub from: String,
    pub to: String,
    /// Bytes per second.
    pub rate: f64,
    /// Seconds.
    #[serde(default)]
    pub propagation_delay: f64,
    /// Bytes, one per priority queue, highest priority first.
    pub buffers: Vec<f64>,
    /// Also add the reverse link with the same parameters.
    #[serde(default)]
    pub duplex: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FlowEntry {
    pub name: String,
    /// Node names from source to destination.
    pub route: Vec<String>,
    pub rate: f64,
    pub burst: f64,
    pub deadline: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Admit,
    Withdraw,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Event {
    pub action: Action,
    pub flow: String,
}

/// A scenario's network, built and allocated.
#[derive(Debug)]
pub struct Network {
    pub dnm: DetServ,
    nodes: HashMap<String, NodeId>,
}

impl Network {
    pub fn node(&self, name: &str) -> anyhow::Result<NodeId> {
        self.nodes
            .get(name)
            .copied()
            .with_context(|| format!("unknown node {name:?}"))
    }

    /// Links along a route given as node names.
    pub fn route_links(&self, route: &[String]) -> anyhow::Result<Vec<LinkId>> {
        if route.len() < 2 {
            bail!("route {route:?} needs at least two nodes");
        }
        route
            .windows(2)
            .map(|pair| {
                let (from, to) = (self.node(&pair[0])?, self.node(&pair[1])?);
                self.dnm
                    .topology()
                    .link_between(from, to)
                    .map(|link| link.id)
                    .with_context(|| format!("no link from {:?} to {:?}", pair[0], pair[1]))
            })
            .collect()
    }
}

impl Scenario {
    pub fn from_toml_str(input: &str) -> anyhow::Result<Self> {
        toml::from_str(input).context("failed to parse scenario")
    }

    pub fn load(path: &FsPath) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Self::from_toml_str(&text).with_context(|| format!("in {}", path.display()))
    }

    /// Create the nodes and links; every link is allocated as it is added.
    pub fn build(&self) -> anyhow::Result<Network> {
        let config = self
            .config
            .clone()
            .resolve()
            .context("invalid [config]")?;
        let mut dnm = DetServ::new(config)?;

        let mut nodes = HashMap::with_capacity(self.nodes.len());
        for entry in &self.nodes {
            let id = dnm.add_node(entry.name.clone(), entry.kind);
            if nodes.insert(entry.name.clone(), id).is_some() {
                bail!("duplicate node {:?}", entry.name);
            }
        }
        let mut network = Network { dnm, nodes };

        for entry in &self.links {
            let (from, to) = (network.node(&entry.from)?, network.node(&entry.to)?);
            let spec = LinkSpec {
                rate: entry.rate,
                propagation_delay: entry.propagation_delay,
                buffer_sizes: entry.buffers.clone(),
            };
            let mut ends = vec![(from, to)];
            if entry.duplex {
                ends.push((to, from));
            }
            for (source, destination) in ends {
                network
                    .dnm
                    .add_link(source, destination, spec.clone())
                    .with_context(|| format!("link {} -> {}", entry.from, entry.to))?;
            }
        }

        tracing::info!(
            nodes = self.nodes.len(),
            links = network.dnm.topology().links().len(),
            flows = self.flows.len(),
            "network built"
        );
        Ok(network)
    }

    /// Events to play, defaulting to admitting every flow in order.
    pub fn events(&self) -> Vec<Event> {
        if !self.events.is_empty() {
            return self.events.clone();
        }
        self.flows
            .iter()
            .map(|flow| Event {
                action: Action::Admit,
                flow: flow.name.clone(),
            })
            .collect()
    }
}

impl FlowEntry {
    pub fn request(&self, id: u64) -> anyhow::Result<FlowRequest> {
        let tb = TokenBucket::new(self.rate, self.burst)
            .with_context(|| format!("flow {:?}", self.name))?;
        let envelope = RequestEnvelope::new(tb, self.deadline)
            .with_context(|| format!("flow {:?}", self.name))?;
        Ok(FlowRequest::new(id, envelope))
    }
}
