//! Sequential assignment of IPv4 addresses within a subnet.

use std::collections::BTreeMap;
use std::net::Ipv4Addr;

use thiserror::Error;

/// Error of address assignment.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressError {
    /// The subnet has no more free host addresses.
    #[error("subnet {network}/{prefix_len} has no free addresses")]
    Exhausted {
        /// Network address.
        network: Ipv4Addr,
        /// Prefix length.
        prefix_len: u8,
    },
    /// The address is already assigned.
    #[error("address {0} is already assigned")]
    Duplicate(Ipv4Addr),
    /// The address does not belong to the subnet or is its network/broadcast address.
    #[error("address {0} is not a host address of the subnet")]
    OutOfSubnet(Ipv4Addr),
    /// Bad subnet specification.
    #[error("invalid prefix length {0}")]
    InvalidPrefix(u8),
}

/// Assigns host addresses of a subnet to nodes in sequential order.
///
/// # Examples
///
/// ```rust
/// use std::net::Ipv4Addr;
/// use wnsim_net::address::AddressAllocator;
///
/// let mut allocator = AddressAllocator::new(Ipv4Addr::new(192, 168, 0, 0), 24).unwrap();
/// assert_eq!(allocator.assign_address(0).unwrap(), Ipv4Addr::new(192, 168, 0, 1));
/// assert_eq!(allocator.assign_address(1).unwrap(), Ipv4Addr::new(192, 168, 0, 2));
/// assert_eq!(allocator.node_of(Ipv4Addr::new(192, 168, 0, 2)), Some(1));
/// ```
pub struct AddressAllocator {
    network: u32,
    prefix_len: u8,
    next_host: u32,
    assigned: BTreeMap<Ipv4Addr, usize>,
}

impl AddressAllocator {
    /// Creates allocator for the subnet `network/prefix_len`. Host bits of `network` are ignored.
    pub fn new(network: Ipv4Addr, prefix_len: u8) -> Result<Self, AddressError> {
        // /31 and /32 subnets have no host addresses
        if prefix_len > 30 {
            return Err(AddressError::InvalidPrefix(prefix_len));
        }
        Ok(Self {
            network: u32::from(network) & Self::mask(prefix_len),
            prefix_len,
            next_host: 1,
            assigned: BTreeMap::new(),
        })
    }

    fn mask(prefix_len: u8) -> u32 {
        if prefix_len == 0 {
            0
        } else {
            u32::MAX << (32 - prefix_len)
        }
    }

    fn host_count(&self) -> u32 {
        ((1u64 << (32 - self.prefix_len)) - 2) as u32
    }

    /// Returns the network address of the subnet.
    pub fn network(&self) -> Ipv4Addr {
        Ipv4Addr::from(self.network)
    }

    /// Returns the prefix length of the subnet.
    pub fn prefix_len(&self) -> u8 {
        self.prefix_len
    }

    /// Checks whether the address is a host address of the subnet.
    pub fn contains(&self, addr: Ipv4Addr) -> bool {
        let value = u32::from(addr);
        let host = value & !Self::mask(self.prefix_len);
        value & Self::mask(self.prefix_len) == self.network && host != 0 && host <= self.host_count()
    }

    /// Assigns the next free address of the subnet to the node.
    pub fn assign_address(&mut self, node: usize) -> Result<Ipv4Addr, AddressError> {
        while self.next_host <= self.host_count() {
            let addr = Ipv4Addr::from(self.network + self.next_host);
            self.next_host += 1;
            if !self.assigned.contains_key(&addr) {
                self.assigned.insert(addr, node);
                return Ok(addr);
            }
        }
        Err(AddressError::Exhausted {
            network: self.network(),
            prefix_len: self.prefix_len,
        })
    }

    /// Assigns the given address to the node.
    pub fn assign_fixed(&mut self, node: usize, addr: Ipv4Addr) -> Result<(), AddressError> {
        if !self.contains(addr) {
            return Err(AddressError::OutOfSubnet(addr));
        }
        if self.assigned.contains_key(&addr) {
            return Err(AddressError::Duplicate(addr));
        }
        self.assigned.insert(addr, node);
        Ok(())
    }

    /// Returns the node owning the address.
    pub fn node_of(&self, addr: Ipv4Addr) -> Option<usize> {
        self.assigned.get(&addr).copied()
    }

    /// Returns the number of assigned addresses.
    pub fn assigned_count(&self) -> usize {
        self.assigned.len()
    }
}
