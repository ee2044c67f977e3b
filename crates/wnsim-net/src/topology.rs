//! Network topology: nodes and the links between them.

use std::collections::BTreeMap;

/// Node index.
pub type NodeId = usize;
/// Link index.
pub type LinkId = usize;
/// Neighbours of each node with the connecting links.
pub type NodeLinksMap = BTreeMap<NodeId, BTreeMap<NodeId, LinkId>>;

/// Kind of a link.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum LinkKind {
    /// Association between a station and an access point over the wireless channel.
    Wireless,
    /// Wired point-to-point link with given bandwidth (bits/s) and latency (s).
    Wired {
        /// Bandwidth in bits per second.
        bandwidth: f64,
        /// Latency in seconds.
        latency: f64,
    },
}

/// A bidirectional link between two nodes.
#[derive(Copy, Clone, Debug)]
pub struct Link {
    /// First endpoint.
    pub node1: NodeId,
    /// Second endpoint.
    pub node2: NodeId,
    /// Link kind.
    pub kind: LinkKind,
    /// Routing metric of the link.
    pub cost: f64,
}

impl Link {
    /// Returns the endpoint opposite to `node`.
    pub fn other(&self, node: NodeId) -> NodeId {
        if node == self.node1 {
            self.node2
        } else {
            self.node1
        }
    }
}

/// Graph of nodes connected by wireless associations and wired links.
#[derive(Default)]
pub struct Topology {
    node_names: Vec<String>,
    links: Vec<Link>,
    node_links_map: NodeLinksMap,
}

impl Topology {
    /// Creates an empty topology.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a node and returns its index.
    pub fn add_node(&mut self, name: &str) -> NodeId {
        let id = self.node_names.len();
        self.node_names.push(name.to_string());
        self.node_links_map.insert(id, BTreeMap::new());
        id
    }

    /// Connects two nodes with a link of unit cost.
    pub fn add_link(&mut self, node1: NodeId, node2: NodeId, kind: LinkKind) -> LinkId {
        self.add_link_with_cost(node1, node2, kind, 1.)
    }

    /// Connects two nodes with a link of given routing cost.
    pub fn add_link_with_cost(&mut self, node1: NodeId, node2: NodeId, kind: LinkKind, cost: f64) -> LinkId {
        assert!(node1 < self.node_count() && node2 < self.node_count(), "Unknown node");
        assert!(node1 != node2, "Self-loop link at node {}", node1);
        assert!(cost > 0., "Link cost must be > 0");
        let link_id = self.links.len();
        self.links.push(Link {
            node1,
            node2,
            kind,
            cost,
        });
        self.node_links_map.entry(node1).or_default().insert(node2, link_id);
        self.node_links_map.entry(node2).or_default().insert(node1, link_id);
        link_id
    }

    /// Returns the number of nodes.
    pub fn node_count(&self) -> usize {
        self.node_names.len()
    }

    /// Returns the name of the node.
    pub fn node_name(&self, node: NodeId) -> &str {
        &self.node_names[node]
    }

    /// Returns the link.
    pub fn link(&self, link_id: LinkId) -> &Link {
        &self.links[link_id]
    }

    /// Returns all links.
    pub fn links(&self) -> &[Link] {
        &self.links
    }

    /// Returns the link between two nodes if they are neighbours.
    pub fn link_between(&self, node1: NodeId, node2: NodeId) -> Option<LinkId> {
        self.node_links_map.get(&node1)?.get(&node2).copied()
    }

    /// Returns the neighbours of each node.
    pub fn node_links_map(&self) -> &NodeLinksMap {
        &self.node_links_map
    }
}
