//! Interface and endpoint routing tables
//!
//! Maps interface numbers to the class driver that claimed them, and
//! endpoints to the interface that claimed them. Unclaimed slots route to
//! the stub driver.

use crate::{
    class::ClassId,
    error::{Error, Result},
};
use alloc::vec::Vec;
use usb_device::{endpoint::EndpointAddress, UsbDirection};

/// The owner of an interface slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Binding {
    /// Nobody claimed this slot.
    #[default]
    Stub,
    /// A registered class driver.
    Class(ClassId),
}

/// Produces an index into the endpoint table
fn index(ep_addr: EndpointAddress) -> usize {
    (ep_addr.index() * 2) + (UsbDirection::In == ep_addr.direction()) as usize
}

/// Produces an endpoint address from an endpoint table index
fn address(index: usize) -> EndpointAddress {
    let direction = if index % 2 == 1 {
        UsbDirection::In
    } else {
        UsbDirection::Out
    };
    EndpointAddress::from_parts(index / 2, direction)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
struct InterfaceSlot {
    binding: Binding,
    alternate_setting: u8,
}

/// Interface and endpoint ownership.
///
/// A slot is never claimed by two owners. Releasing a slot requires the
/// same owner that claimed it.
#[derive(Debug, Default)]
pub struct RoutingTable {
    interfaces: Vec<InterfaceSlot>,
    /// Interface number that owns each endpoint; see [`index`].
    endpoints: Vec<Option<u8>>,
}

impl RoutingTable {
    /// Allocate a table for `max_interfaces` interfaces and `max_endpoints`
    /// endpoint numbers.
    pub fn new(max_interfaces: usize, max_endpoints: usize) -> Result<Self> {
        let mut interfaces = Vec::new();
        interfaces
            .try_reserve_exact(max_interfaces)
            .map_err(|_| Error::OutOfMemory)?;
        interfaces.resize(max_interfaces, InterfaceSlot::default());

        let mut endpoints = Vec::new();
        endpoints
            .try_reserve_exact(max_endpoints * 2)
            .map_err(|_| Error::OutOfMemory)?;
        endpoints.resize(max_endpoints * 2, None);

        Ok(RoutingTable {
            interfaces,
            endpoints,
        })
    }

    /// Claim `iface` for `owner`.
    pub fn register_interface(&mut self, iface: u8, owner: ClassId) -> Result<()> {
        let slot = self
            .interfaces
            .get_mut(iface as usize)
            .ok_or(Error::InvalidParams)?;
        if slot.binding != Binding::Stub {
            warn!("IFACE{} ALREADY CLAIMED", iface);
            return Err(Error::AlreadyConfigured);
        }
        *slot = InterfaceSlot {
            binding: Binding::Class(owner),
            alternate_setting: 0,
        };
        debug!("IFACE{} CLAIMED BY CLASS{}", iface, owner.index());
        Ok(())
    }

    /// Release `iface`, which must be owned by `owner`.
    ///
    /// The interface must have released its endpoints first.
    pub fn unregister_interface(&mut self, iface: u8, owner: ClassId) -> Result<()> {
        let slot = self
            .interfaces
            .get(iface as usize)
            .ok_or(Error::InvalidParams)?;
        if slot.binding != Binding::Class(owner) {
            warn!("IFACE{} NOT OWNED BY CLASS{}", iface, owner.index());
            return Err(Error::AccessDenied);
        }
        if self.endpoints.iter().any(|ep| *ep == Some(iface)) {
            return Err(Error::AlreadyConfigured);
        }
        self.interfaces[iface as usize] = InterfaceSlot::default();
        debug!("IFACE{} RELEASED", iface);
        Ok(())
    }

    /// Claim `ep` for `iface`, which must be owned by `owner`.
    ///
    /// Endpoint 0 belongs to the control engine and can't be claimed.
    pub fn register_endpoint(
        &mut self,
        ep: EndpointAddress,
        iface: u8,
        owner: ClassId,
    ) -> Result<()> {
        if ep.index() == 0 || index(ep) >= self.endpoints.len() {
            return Err(Error::InvalidParams);
        }
        if self.interface(iface) != Binding::Class(owner) {
            return Err(Error::AccessDenied);
        }
        let slot = &mut self.endpoints[index(ep)];
        if slot.is_some() {
            warn!("EP{} {:?} ALREADY CLAIMED", ep.index(), ep.direction());
            return Err(Error::AlreadyConfigured);
        }
        *slot = Some(iface);
        debug!("EP{} {:?} CLAIMED BY IFACE{}", ep.index(), ep.direction(), iface);
        Ok(())
    }

    /// Release `ep`, which must be claimed by `iface`, owned by `owner`.
    pub fn unregister_endpoint(
        &mut self,
        ep: EndpointAddress,
        iface: u8,
        owner: ClassId,
    ) -> Result<()> {
        if ep.index() == 0 || index(ep) >= self.endpoints.len() {
            return Err(Error::InvalidParams);
        }
        let slot = index(ep);
        match self.endpoints[slot] {
            None => Err(Error::NotConfigured),
            Some(claimed) if claimed != iface || self.interface(iface) != Binding::Class(owner) => {
                Err(Error::AccessDenied)
            }
            Some(_) => {
                self.endpoints[slot] = None;
                debug!("EP{} {:?} RELEASED", ep.index(), ep.direction());
                Ok(())
            }
        }
    }

    /// The owner of `iface`; out-of-range interfaces route to the stub.
    pub fn interface(&self, iface: u8) -> Binding {
        self.interfaces
            .get(iface as usize)
            .map(|slot| slot.binding)
            .unwrap_or_default()
    }

    /// The interface that claimed `ep`.
    pub fn endpoint(&self, ep: EndpointAddress) -> Option<u8> {
        self.endpoints.get(index(ep)).copied().flatten()
    }

    /// Current alternate setting of `iface`.
    pub fn alternate_setting(&self, iface: u8) -> Option<u8> {
        self.interfaces
            .get(iface as usize)
            .map(|slot| slot.alternate_setting)
    }

    /// Record the alternate setting of a claimed interface.
    pub fn set_alternate_setting(&mut self, iface: u8, alternate_setting: u8) -> Result<()> {
        let slot = self
            .interfaces
            .get_mut(iface as usize)
            .ok_or(Error::InvalidParams)?;
        if slot.binding == Binding::Stub {
            return Err(Error::NotConfigured);
        }
        slot.alternate_setting = alternate_setting;
        Ok(())
    }

    /// Claimed interfaces and their owners, in interface order.
    pub fn claimed_interfaces(&self) -> impl Iterator<Item = (u8, ClassId)> + '_ {
        self.interfaces
            .iter()
            .enumerate()
            .filter_map(|(iface, slot)| match slot.binding {
                Binding::Class(id) => Some((iface as u8, id)),
                Binding::Stub => None,
            })
    }

    /// Claimed endpoints and their interfaces.
    pub fn claimed_endpoints(&self) -> impl Iterator<Item = (EndpointAddress, u8)> + '_ {
        self.endpoints
            .iter()
            .enumerate()
            .filter_map(|(idx, iface)| iface.map(|iface| (address(idx), iface)))
    }

    /// Release everything.
    pub fn clear(&mut self) {
        self.interfaces.fill(InterfaceSlot::default());
        self.endpoints.fill(None);
    }
}
