//! Device discovery result types.
//!
//! Enumeration of attached USB devices happens outside the bridge; the
//! core only consumes its result as a mapping from port name to a
//! descriptor. The vendor/product ID tables for the supported printer
//! family live here so callers can label what the enumerator found.

use std::collections::HashMap;

/// Identity of one attached printer, as produced by the external
/// enumeration step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceDescriptor {
    pub vendor_id: u16,
    pub vendor_name: &'static str,
    pub device_id: u16,
}

/// Port name -> device descriptor, the shape the connection layer consumes.
pub type DeviceMap = HashMap<String, DeviceDescriptor>;

const VENDORS: &[(u16, &str)] = &[
    (0x0315, "PowerSpec"),
    (0x2a89, "Dremel"),
    (0x2b71, "FlashForge"),
];

/// Vendor name for a known vendor ID.
pub fn vendor_name(vendor_id: u16) -> Option<&'static str> {
    VENDORS
        .iter()
        .find(|(id, _)| *id == vendor_id)
        .map(|(_, name)| *name)
}

/// Model name for a known (vendor, product) pair.
pub fn model_name(vendor_id: u16, device_id: u16) -> Option<&'static str> {
    let model = match (vendor_id, device_id) {
        (0x0315, 0x0001) => "Ultra 3DPrinter (C)",
        (0x2a89, 0x8889) => "Dremel IdeaBuilder 3D20",
        (0x2a89, 0x888d) => "Dremel IdeaBuilder 3D45",
        (0x2b71, 0x0001) => "Dreamer",
        (0x2b71, 0x0002) => "Finder v1",
        (0x2b71, 0x0004) => "Guider II",
        (0x2b71, 0x0005) => "Inventor",
        (0x2b71, 0x0007) => "Finder v2",
        (0x2b71, 0x0009) => "Guider IIs",
        (0x2b71, 0x000a) => "Dreamer NX",
        (0x2b71, 0x00e7) => "Creator Max",
        (0x2b71, 0x00ee) => "Finder v2.12",
        (0x2b71, 0x00f6) => "PowerSpec Ultra 3DPrinter (B)",
        (0x2b71, 0x00ff) => "PowerSpec Ultra 3DPrinter (A)",
        _ => return None,
    };
    Some(model)
}

/// Build a descriptor for a (vendor, product) pair if the vendor is one of
/// the supported families.
pub fn describe(vendor_id: u16, device_id: u16) -> Option<DeviceDescriptor> {
    vendor_name(vendor_id).map(|vendor_name| DeviceDescriptor {
        vendor_id,
        vendor_name,
        device_id,
    })
}
