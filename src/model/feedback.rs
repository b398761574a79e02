//! Feedback sensors — occupancy detectors whose state the control bus
//! reports asynchronously (spec §3 "Feedback").

use serde::{Deserialize, Serialize};

use crate::general::AddressType;
use crate::ids::FeedbackId;

/// A stable hardware address: a device and a contact on that device,
/// the way the teacher's `Address<Ix>` keys a single bus address —
/// generalized here into the (device, contact) pair the spec calls
/// for.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct HardwareAddress<DeviceAddr: AddressType = crate::general::DefaultAddressType> {
    pub device: DeviceAddr,
    pub contact: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Feedback<DeviceAddr: AddressType = crate::general::DefaultAddressType> {
    pub id: FeedbackId,
    pub address: HardwareAddress<DeviceAddr>,
    #[serde(default)]
    pub detected: bool,
}

impl<DeviceAddr: AddressType> Feedback<DeviceAddr> {
    pub fn new(id: FeedbackId, address: HardwareAddress<DeviceAddr>) -> Self {
        Feedback {
            id,
            address,
            detected: false,
        }
    }
}
