//! Static routing.
//!
//! Routes are computed once at setup from the topology graph and stored in per-node tables which
//! map each reachable destination node to the next hop.

use std::collections::BTreeMap;

use crate::topology::{LinkId, NodeId, Topology};

const INVALID_NODE_ID: usize = usize::MAX;

/// Calculates the paths between pairs of nodes in a network.
pub trait RoutingAlgorithm {
    /// Performs initialization of the routing algorithm based on the provided network topology.
    fn init(&mut self, topology: &Topology);

    /// Returns the predecessor of `dst` on the path from `src`.
    ///
    /// Can be used only after calling [`Self::init`].
    fn parent(&self, src: NodeId, dst: NodeId) -> Option<NodeId>;

    /// Returns the links of the path from node `src` to node `dst`.
    fn get_path(&self, src: NodeId, dst: NodeId, topology: &Topology) -> Option<Vec<LinkId>> {
        let mut path = Vec::new();
        let mut cur_node = dst;
        while cur_node != src {
            let parent = self.parent(src, cur_node)?;
            path.push(topology.link_between(parent, cur_node)?);
            cur_node = parent;
        }
        path.reverse();
        Some(path)
    }
}

// Shortest Path (Floyd–Warshall) ----------------------------------------------------------------

/// Returns shortest paths (by link cost) computed using the Floyd–Warshall algorithm.
#[derive(Default)]
pub struct ShortestPathFloydWarshall {
    parent_path: Vec<Vec<NodeId>>,
}

impl RoutingAlgorithm for ShortestPathFloydWarshall {
    fn init(&mut self, topology: &Topology) {
        let node_count = topology.node_count();
        self.parent_path = vec![vec![INVALID_NODE_ID; node_count]; node_count];
        let mut current_paths = vec![vec![f64::INFINITY; node_count]; node_count];
        #[allow(clippy::needless_range_loop)]
        for node in 0..node_count {
            current_paths[node][node] = 0.0;
            self.parent_path[node][node] = node;
        }

        for (node1, neighbours) in topology.node_links_map() {
            for (node2, link_id) in neighbours {
                current_paths[*node1][*node2] = topology.link(*link_id).cost;
                self.parent_path[*node1][*node2] = *node1;
            }
        }

        for k in 0..node_count {
            for i in 0..node_count {
                for j in 0..node_count {
                    if current_paths[i][k] + current_paths[k][j] < current_paths[i][j] {
                        current_paths[i][j] = current_paths[i][k] + current_paths[k][j];
                        self.parent_path[i][j] = self.parent_path[k][j];
                    }
                }
            }
        }
    }

    fn parent(&self, src: NodeId, dst: NodeId) -> Option<NodeId> {
        match self.parent_path[src][dst] {
            INVALID_NODE_ID => None,
            parent => Some(parent),
        }
    }
}

// Shortest Path (Dijkstra) ----------------------------------------------------------------------

/// Returns shortest paths (by link cost) computed using the Dijkstra's algorithm.
#[derive(Default)]
pub struct ShortestPathDijkstra {
    parent_path: Vec<Vec<NodeId>>,
}

impl ShortestPathDijkstra {
    fn dijkstra_for_node(&mut self, node: NodeId, topology: &Topology) {
        let node_count = topology.node_count();
        let mut cost = vec![f64::INFINITY; node_count];
        let mut visited = vec![false; node_count];
        cost[node] = 0.0;
        self.parent_path[node][node] = node;
        for _ in 0..node_count {
            let mut relax_node = INVALID_NODE_ID;
            for next_node in 0..node_count {
                if !visited[next_node] && (relax_node == INVALID_NODE_ID || cost[next_node] < cost[relax_node]) {
                    relax_node = next_node;
                }
            }
            if relax_node == INVALID_NODE_ID || cost[relax_node] == f64::INFINITY {
                break;
            }
            visited[relax_node] = true;

            if let Some(neighbours) = topology.node_links_map().get(&relax_node) {
                for (node_to, link_id) in neighbours {
                    let candidate = cost[relax_node] + topology.link(*link_id).cost;
                    if candidate < cost[*node_to] {
                        cost[*node_to] = candidate;
                        self.parent_path[node][*node_to] = relax_node;
                    }
                }
            }
        }
    }
}

impl RoutingAlgorithm for ShortestPathDijkstra {
    fn init(&mut self, topology: &Topology) {
        let node_count = topology.node_count();
        self.parent_path = vec![vec![INVALID_NODE_ID; node_count]; node_count];
        for node in 0..node_count {
            self.dijkstra_for_node(node, topology);
        }
    }

    fn parent(&self, src: NodeId, dst: NodeId) -> Option<NodeId> {
        match self.parent_path[src][dst] {
            INVALID_NODE_ID => None,
            parent => Some(parent),
        }
    }
}

// Routing tables --------------------------------------------------------------------------------

/// Next hop towards a destination node.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Route {
    /// Neighbour to forward packets to.
    pub next_hop: NodeId,
    /// Link to the neighbour.
    pub link: LinkId,
    /// Number of hops to the destination.
    pub hops: usize,
}

/// Routing table of a node: destination node -> next hop.
pub type RoutingTable = BTreeMap<NodeId, Route>;

/// Computes the routing tables of all nodes.
///
/// Unreachable destinations are absent from the tables.
pub fn build_routing_tables(topology: &Topology, algorithm: &mut dyn RoutingAlgorithm) -> Vec<RoutingTable> {
    algorithm.init(topology);
    let mut tables = Vec::with_capacity(topology.node_count());
    for src in 0..topology.node_count() {
        let mut table = RoutingTable::new();
        for dst in 0..topology.node_count() {
            if src == dst {
                continue;
            }
            if let Some(path) = algorithm.get_path(src, dst, topology) {
                if let Some(&link) = path.first() {
                    table.insert(
                        dst,
                        Route {
                            next_hop: topology.link(link).other(src),
                            link,
                            hops: path.len(),
                        },
                    );
                }
            }
        }
        tables.push(table);
    }
    tables
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::topology::LinkKind;

    // Two access points joined by a wire, each with two stations.
    fn two_bss() -> Topology {
        let mut topology = Topology::new();
        let ap0 = topology.add_node("ap0");
        let ap1 = topology.add_node("ap1");
        for ap in [ap0, ap1] {
            for i in 0..2 {
                let sta = topology.add_node(&format!("ap{}-sta{}", ap, i));
                topology.add_link(sta, ap, LinkKind::Wireless);
            }
        }
        topology.add_link(
            ap0,
            ap1,
            LinkKind::Wired {
                bandwidth: 1e9,
                latency: 1e-4,
            },
        );
        topology
    }

    fn algorithms() -> Vec<Box<dyn RoutingAlgorithm>> {
        vec![
            Box::new(ShortestPathDijkstra::default()),
            Box::new(ShortestPathFloydWarshall::default()),
        ]
    }

    #[rstest]
    #[case(2, 3, 0, 2)]
    #[case(2, 4, 0, 3)]
    #[case(4, 2, 1, 3)]
    #[case(0, 5, 1, 2)]
    #[case(0, 2, 2, 1)]
    fn test_next_hops(#[case] src: NodeId, #[case] dst: NodeId, #[case] next_hop: NodeId, #[case] hops: usize) {
        let topology = two_bss();
        for mut algorithm in algorithms() {
            let tables = build_routing_tables(&topology, algorithm.as_mut());
            let route = tables[src][&dst];
            assert_eq!(route.next_hop, next_hop);
            assert_eq!(route.hops, hops);
            assert_eq!(topology.link(route.link).other(src), next_hop);
        }
    }

    #[test]
    fn test_paths_agree() {
        let topology = two_bss();
        let mut dijkstra = ShortestPathDijkstra::default();
        let mut floyd = ShortestPathFloydWarshall::default();
        dijkstra.init(&topology);
        floyd.init(&topology);
        for src in 0..topology.node_count() {
            for dst in 0..topology.node_count() {
                assert_eq!(
                    dijkstra.get_path(src, dst, &topology),
                    floyd.get_path(src, dst, &topology)
                );
            }
        }
        assert_eq!(dijkstra.get_path(3, 3, &topology), Some(vec![]));
    }

    #[test]
    fn test_costs_are_respected() {
        let mut topology = Topology::new();
        let a = topology.add_node("a");
        let b = topology.add_node("b");
        let c = topology.add_node("c");
        topology.add_link_with_cost(a, c, LinkKind::Wireless, 5.);
        topology.add_link(a, b, LinkKind::Wireless);
        topology.add_link(b, c, LinkKind::Wireless);
        for mut algorithm in algorithms() {
            let tables = build_routing_tables(&topology, algorithm.as_mut());
            assert_eq!(tables[a][&c].next_hop, b);
            assert_eq!(tables[a][&c].hops, 2);
        }
    }

    #[test]
    fn test_unreachable() {
        let mut topology = Topology::new();
        let a = topology.add_node("a");
        let b = topology.add_node("b");
        let c = topology.add_node("c");
        topology.add_link(a, b, LinkKind::Wireless);
        for mut algorithm in algorithms() {
            let tables = build_routing_tables(&topology, algorithm.as_mut());
            assert!(tables[a].get(&c).is_none());
            assert!(tables[c].is_empty());
            assert_eq!(tables[b][&a].next_hop, a);
        }
    }
}
