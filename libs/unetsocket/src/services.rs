//! Well-known service names advertised by network nodes

pub const NODE_INFO: &str = "org.arl.unet.Services.NODE_INFO";
pub const ADDRESS_RESOLUTION: &str = "org.arl.unet.Services.ADDRESS_RESOLUTION";
pub const DATAGRAM: &str = "org.arl.unet.Services.DATAGRAM";
pub const PHYSICAL: &str = "org.arl.unet.Services.PHYSICAL";
pub const RANGING: &str = "org.arl.unet.Services.RANGING";
pub const BASEBAND: &str = "org.arl.unet.Services.BASEBAND";
pub const LINK: &str = "org.arl.unet.Services.LINK";
pub const MAC: &str = "org.arl.unet.Services.MAC";
pub const ROUTING: &str = "org.arl.unet.Services.ROUTING";
pub const ROUTE_MAINTENANCE: &str = "org.arl.unet.Services.ROUTE_MAINTENANCE";
pub const TRANSPORT: &str = "org.arl.unet.Services.TRANSPORT";
pub const REMOTE: &str = "org.arl.unet.Services.REMOTE";
pub const STATE_MANAGER: &str = "org.arl.unet.Services.STATE_MANAGER";
pub const DEVICE_INFO: &str = "org.arl.unet.Services.DEVICE_INFO";
pub const DOA: &str = "org.arl.unet.Services.DOA";
pub const SCHEDULER: &str = "org.arl.unet.Services.SCHEDULER";
pub const SHELL: &str = "org.arl.fjage.shell.Services.SHELL";

/// Services tried, in order, to find an agent that can carry a datagram
pub const DATAGRAM_PROVIDERS: [&str; 5] = [TRANSPORT, ROUTING, LINK, PHYSICAL, DATAGRAM];
