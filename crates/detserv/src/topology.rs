//! # Topology
//!
//! Nodes, directed links and the priority queues of each link's scheduler.
//! A link owns one output port; its queues are addressed by [`QueueId`],
//! priority 0 being the highest.

use std::collections::VecDeque;
use std::fmt;

use serde::Deserialize;

use crate::error::{ensure_non_negative, DnmError, Result};

// ─── Identifiers ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LinkId(pub usize);

/// One priority queue of a link's scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QueueId {
    pub link: LinkId,
    pub priority: usize,
}

impl QueueId {
    pub const fn new(link: LinkId, priority: usize) -> Self {
        Self { link, priority }
    }

    /// The next queue down in priority order on the same link.
    pub const fn lower(self) -> Self {
        Self::new(self.link, self.priority + 1)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

impl fmt::Display for LinkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "l{}", self.0)
    }
}

impl fmt::Display for QueueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/q{}", self.link, self.priority)
    }
}

// ─── Nodes and links ────────────────────────────────────────────────────────

/// Hosts originate traffic; their outbound links are never shaped by
/// input-link shaping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    #[default]
    Host,
    Switch,
}

#[derive(Debug, Clone)]
pub struct Node {
    pub id: NodeId,
    pub name: String,
    pub kind: NodeKind,
    incoming: Vec<LinkId>,
    outgoing: Vec<LinkId>,
}

impl Node {
    pub fn is_host(&self) -> bool {
        self.kind == NodeKind::Host
    }

    pub fn incoming(&self) -> &[LinkId] {
        &self.incoming
    }

    pub fn outgoing(&self) -> &[LinkId] {
        &self.outgoing
    }
}

/// Physical parameters of a link, as handed to [`Topology::add_link`].
#[derive(Debug, Clone, PartialEq)]
pub struct LinkSpec {
    /// Bytes per second.
    pub rate: f64,
    /// Seconds.
    pub propagation_delay: f64,
    /// Bytes, one entry per priority queue (highest priority first).
    pub buffer_sizes: Vec<f64>,
}

#[derive(Debug, Clone)]
pub struct Link {
    pub id: LinkId,
    pub source: NodeId,
    pub destination: NodeId,
    pub rate: f64,
    pub propagation_delay: f64,
    pub buffer_sizes: Vec<f64>,
}

impl Link {
    pub fn queue_count(&self) -> usize {
        self.buffer_sizes.len()
    }

    pub fn queue_ids(&self) -> impl Iterator<Item = QueueId> + '_ {
        (0..self.queue_count()).map(move |p| QueueId::new(self.id, p))
    }
}

// ─── Topology ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct Topology {
    nodes: Vec<Node>,
    links: Vec<Link>,
}

impl Topology {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, name: impl Into<String>, kind: NodeKind) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            id,
            name: name.into(),
            kind,
            incoming: Vec::new(),
            outgoing: Vec::new(),
        });
        id
    }

    pub fn add_link(&mut self, source: NodeId, destination: NodeId, spec: LinkSpec) -> Result<LinkId> {
        self.node(source)?;
        self.node(destination)?;
        let rate = ensure_non_negative("link rate", spec.rate)?;
        if rate == 0.0 {
            return Err(DnmError::InvalidValue {
                what: "link rate",
                value: rate,
            });
        }
        ensure_non_negative("propagation delay", spec.propagation_delay)?;
        if spec.buffer_sizes.is_empty() {
            return Err(DnmError::Config(format!(
                "link {source} -> {destination} has no queues"
            )));
        }
        for &size in &spec.buffer_sizes {
            ensure_non_negative("buffer size", size)?;
        }

        let id = LinkId(self.links.len());
        self.links.push(Link {
            id,
            source,
            destination,
            rate,
            propagation_delay: spec.propagation_delay,
            buffer_sizes: spec.buffer_sizes,
        });
        self.nodes[source.0].outgoing.push(id);
        self.nodes[destination.0].incoming.push(id);
        Ok(id)
    }

    /// Undo the most recent [`add_link`](Self::add_link).
    pub(crate) fn remove_last_link(&mut self) {
        if let Some(link) = self.links.pop() {
            self.nodes[link.source.0].outgoing.pop();
            self.nodes[link.destination.0].incoming.pop();
        }
    }

    pub fn node(&self, id: NodeId) -> Result<&Node> {
        self.nodes.get(id.0).ok_or(DnmError::UnknownNode(id))
    }

    pub fn link(&self, id: LinkId) -> Result<&Link> {
        self.links.get(id.0).ok_or(DnmError::UnknownLink(id))
    }

    pub fn node_by_name(&self, name: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.name == name)
    }

    /// First link from `source` to `destination`, if any.
    pub fn link_between(&self, source: NodeId, destination: NodeId) -> Option<&Link> {
        let node = self.nodes.get(source.0)?;
        node.outgoing
            .iter()
            .filter_map(|id| self.links.get(id.0))
            .find(|l| l.destination == destination)
    }

    /// Fewest links from `source` to `destination`, `None` if unreachable.
    pub fn hop_count(&self, source: NodeId, destination: NodeId) -> Option<usize> {
        let mut distance = vec![None; self.nodes.len()];
        *distance.get_mut(source.0)? = Some(0);
        let mut frontier = VecDeque::from([source]);
        while let Some(node) = frontier.pop_front() {
            let hops = distance[node.0]?;
            if node == destination {
                return Some(hops);
            }
            for link in &self.nodes[node.0].outgoing {
                let next = self.links[link.0].destination;
                if distance[next.0].is_none() {
                    distance[next.0] = Some(hops + 1);
                    frontier.push_back(next);
                }
            }
        }
        None
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn links(&self) -> &[Link] {
        &self.links
    }
}
