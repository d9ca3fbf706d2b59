//! Process-wide gateway registry
//!
//! At most one open gateway exists per (hostname, port, path). Opening an
//! address that is already registered hands back the existing gateway.

use crate::config::GatewayAddress;
use crate::gateway::Gateway;
use crate::Result;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::collections::HashMap;
use tracing::debug;

static GATEWAYS: Lazy<Mutex<HashMap<GatewayAddress, Gateway>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

/// Return the gateway registered for `address`, creating it if absent
pub(crate) fn get_or_create(
    address: &GatewayAddress,
    create: impl FnOnce() -> Result<Gateway>,
) -> Result<Gateway> {
    let mut gateways = GATEWAYS.lock();
    if let Some(existing) = gateways.get(address) {
        debug!(address = %address, "Reusing registered gateway");
        return Ok(existing.clone());
    }
    let gateway = create()?;
    gateways.insert(address.clone(), gateway.clone());
    Ok(gateway)
}

/// Drop the entry for `address` if it still refers to `gateway`
pub(crate) fn remove(address: &GatewayAddress, gateway: &Gateway) {
    let mut gateways = GATEWAYS.lock();
    if gateways
        .get(address)
        .is_some_and(|registered| Gateway::ptr_eq(registered, gateway))
    {
        gateways.remove(address);
        debug!(address = %address, "Gateway unregistered");
    }
}

/// Whether a gateway is currently registered for `address`
pub fn is_registered(address: &GatewayAddress) -> bool {
    GATEWAYS.lock().contains_key(address)
}
