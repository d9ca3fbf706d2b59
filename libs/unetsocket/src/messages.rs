//! Message classes used by network nodes.
//!
//! Every class is declared in the gateway's class registry on first use of
//! [`register_all`], so received messages resolve to typed classes and
//! subclass checks such as `RxFrameNtf` being a `DatagramNtf` hold.

use gateway::{Message, MessageClass};
use once_cell::sync::Lazy;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

const UNET: &str = "org.arl.unet.";
const NET: &str = "org.arl.unet.net.";
const PHY: &str = "org.arl.unet.phy.";
const ADDR: &str = "org.arl.unet.addr.";
const BB: &str = "org.arl.unet.bb.";
const LINK: &str = "org.arl.unet.link.";
const LOCALIZATION: &str = "org.arl.unet.localization.";
const MAC: &str = "org.arl.unet.mac.";
const REMOTE: &str = "org.arl.unet.remote.";
const SCHEDULER: &str = "org.arl.unet.scheduler.";
const STATE: &str = "org.arl.unet.state.";

fn declare(package: &str, name: &str) -> Arc<MessageClass> {
    MessageClass::declare(&format!("{}{}", package, name))
}

fn declare_child(package: &str, name: &str, parent: &Arc<MessageClass>) -> Arc<MessageClass> {
    MessageClass::declare_with_parent(&format!("{}{}", package, name), parent)
}

pub static DATAGRAM_REQ: Lazy<Arc<MessageClass>> = Lazy::new(|| declare(UNET, "DatagramReq"));
pub static DATAGRAM_NTF: Lazy<Arc<MessageClass>> = Lazy::new(|| declare(UNET, "DatagramNtf"));
pub static RX_FRAME_NTF: Lazy<Arc<MessageClass>> =
    Lazy::new(|| declare_child(PHY, "RxFrameNtf", &DATAGRAM_NTF));
pub static TX_FRAME_REQ: Lazy<Arc<MessageClass>> =
    Lazy::new(|| declare_child(PHY, "TxFrameReq", &DATAGRAM_REQ));
pub static BASEBAND_SIGNAL: Lazy<Arc<MessageClass>> =
    Lazy::new(|| declare(BB, "BasebandSignal"));
pub static RX_BASEBAND_SIGNAL_NTF: Lazy<Arc<MessageClass>> =
    Lazy::new(|| declare_child(BB, "RxBasebandSignalNtf", &BASEBAND_SIGNAL));
pub static TX_BASEBAND_SIGNAL_REQ: Lazy<Arc<MessageClass>> =
    Lazy::new(|| declare_child(BB, "TxBasebandSignalReq", &BASEBAND_SIGNAL));
pub static ADDRESS_RESOLUTION_REQ: Lazy<Arc<MessageClass>> =
    Lazy::new(|| declare(ADDR, "AddressResolutionReq"));

/// Classes without a parent, grouped by package
const PLAIN_CLASSES: &[(&str, &[&str])] = &[
    (
        UNET,
        &[
            "TestReportNtf",
            "AbnormalTerminationNtf",
            "CapabilityListRsp",
            "CapabilityReq",
            "ClearReq",
            "DatagramCancelReq",
            "DatagramDeliveryNtf",
            "DatagramFailureNtf",
            "DatagramProgressNtf",
            "ParamChangeNtf",
            "RefuseRsp",
            "FailureNtf",
        ],
    ),
    (
        NET,
        &[
            "DatagramTraceReq",
            "RouteDiscoveryReq",
            "RouteTraceReq",
            "RouteDiscoveryNtf",
            "RouteTraceNtf",
        ],
    ),
    (
        PHY,
        &[
            "FecDecodeReq",
            "RxJanusFrameNtf",
            "TxJanusFrameReq",
            "BadFrameNtf",
            "BadRangeNtf",
            "ClearSyncReq",
            "CollisionNtf",
            "RxFrameStartNtf",
            "SyncInfoReq",
            "SyncInfoRsp",
            "TxFrameNtf",
            "TxFrameStartNtf",
            "TxRawFrameReq",
        ],
    ),
    (
        ADDR,
        &["AddressAllocReq", "AddressAllocRsp", "AddressResolutionRsp"],
    ),
    (BB, &["RecordBasebandSignalReq"]),
    (LINK, &["LinkStatusNtf"]),
    (
        LOCALIZATION,
        &["RangeNtf", "RangeReq", "BeaconReq", "RespondReq", "InterrogationNtf"],
    ),
    (
        MAC,
        &[
            "ReservationAcceptReq",
            "ReservationCancelReq",
            "ReservationReq",
            "ReservationRsp",
            "ReservationStatusNtf",
            "RxAckNtf",
            "TxAckReq",
        ],
    ),
    (
        REMOTE,
        &[
            "RemoteExecReq",
            "RemoteFailureNtf",
            "RemoteFileGetReq",
            "RemoteFileNtf",
            "RemoteFilePutReq",
            "RemoteSuccessNtf",
            "RemoteTextNtf",
            "RemoteTextReq",
        ],
    ),
    (
        SCHEDULER,
        &[
            "AddScheduledSleepReq",
            "GetSleepScheduleReq",
            "RemoveScheduledSleepReq",
            "SleepScheduleRsp",
            "WakeFromSleepNtf",
        ],
    ),
    (STATE, &["ClearStateReq", "SaveStateReq"]),
];

static REGISTERED: Lazy<usize> = Lazy::new(|| {
    let mut count = 0;
    for class in [
        &DATAGRAM_REQ,
        &DATAGRAM_NTF,
        &RX_FRAME_NTF,
        &TX_FRAME_REQ,
        &BASEBAND_SIGNAL,
        &RX_BASEBAND_SIGNAL_NTF,
        &TX_BASEBAND_SIGNAL_REQ,
        &ADDRESS_RESOLUTION_REQ,
    ] {
        Lazy::force(class);
        count += 1;
    }
    for (package, names) in PLAIN_CLASSES {
        for name in *names {
            declare(package, name);
            count += 1;
        }
    }
    debug!(count, "Registered network message classes");
    count
});

/// Declare every network message class; later calls do nothing
pub fn register_all() {
    Lazy::force(&REGISTERED);
}

/// Look up a network message class by short or qualified name
pub fn lookup(name: &str) -> Option<Arc<MessageClass>> {
    register_all();
    MessageClass::lookup(name)
}

/// Payload of a datagram-shaped message as raw bytes.
///
/// Accepts signed or unsigned element values; anything outside a byte
/// yields `None`.
pub fn datagram_bytes(msg: &Message) -> Option<Vec<u8>> {
    match msg.get("data")? {
        Value::Array(items) => items
            .iter()
            .map(|v| {
                let n = v.as_i64()?;
                match n {
                    -128..=-1 => Some(n as i8 as u8),
                    0..=255 => Some(n as u8),
                    _ => None,
                }
            })
            .collect(),
        _ => None,
    }
}

/// Byte payload as the signed values a container expects
pub fn datagram_value(data: &[u8]) -> Value {
    Value::Array(data.iter().map(|b| Value::from(*b as i8)).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_frame_classes_extend_datagrams() {
        register_all();
        assert!(RX_FRAME_NTF.is_subclass_of(&DATAGRAM_NTF));
        assert!(TX_FRAME_REQ.is_subclass_of(&DATAGRAM_REQ));
        assert!(RX_BASEBAND_SIGNAL_NTF.is_subclass_of(&BASEBAND_SIGNAL));
        assert!(!DATAGRAM_NTF.is_subclass_of(&RX_FRAME_NTF));
    }

    #[test]
    fn test_lookup_by_short_and_qualified_name() {
        let by_short = lookup("RangeReq").unwrap();
        assert_eq!(by_short.name(), "org.arl.unet.localization.RangeReq");
        let by_name = lookup("org.arl.unet.remote.RemoteTextReq").unwrap();
        assert_eq!(by_name.short_name(), "RemoteTextReq");
        assert!(lookup("NoSuchReq").is_none());
    }

    #[test]
    fn test_received_message_is_instance_of_parent() {
        register_all();
        let msg = Message::of_class("org.arl.unet.phy.RxFrameNtf");
        assert!(msg.is_instance_of(&DATAGRAM_NTF));
    }

    #[test]
    fn test_datagram_bytes() {
        let msg = Message::new().with("data", json!([7, -1, 200]));
        assert_eq!(datagram_bytes(&msg), Some(vec![7, 255, 200]));

        let bad = Message::new().with("data", json!([1, 300]));
        assert_eq!(datagram_bytes(&bad), None);
        assert_eq!(datagram_bytes(&Message::new()), None);
    }

    #[test]
    fn test_datagram_value_is_signed() {
        assert_eq!(datagram_value(&[1, 255]), json!([1, -1]));
    }
}
