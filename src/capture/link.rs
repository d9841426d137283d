// src/capture/link.rs
//
// Link-layer encapsulators. Each one maps a recovered frame's link payload
// (direction byte + payload) onto the byte layout a pcap link type expects.
// Adding a link type means adding an implementation here and a `LinkType`
// variant; the deframer and the encoder are untouched.
//
// Link type registry: https://www.tcpdump.org/linktypes.html

use serde::{Deserialize, Serialize};

// =============================================================================
// Link type identifiers
// =============================================================================

pub const LINKTYPE_ETHERNET: u32 = 1;
pub const LINKTYPE_USER0: u32 = 147;
pub const LINKTYPE_BLUETOOTH_HCI_H4: u32 = 187;
pub const LINKTYPE_BLUETOOTH_HCI_H4_WITH_PHDR: u32 = 201;

// =============================================================================
// Trait
// =============================================================================

/// Maps a raw link payload to the layout of one pcap link type.
pub trait LinkLayer: Send {
    /// pcap link-type id written into the global header
    fn link_type_id(&self) -> u32;

    /// Transform a link payload (direction byte first) into record bytes
    fn transform(&self, raw_payload: &[u8]) -> Vec<u8>;
}

/// Ethernet: the first byte is a type tag, the rest is the Ethernet frame.
pub struct Ethernet;

impl LinkLayer for Ethernet {
    fn link_type_id(&self) -> u32 {
        LINKTYPE_ETHERNET
    }

    fn transform(&self, raw_payload: &[u8]) -> Vec<u8> {
        raw_payload.get(1..).unwrap_or_default().to_vec()
    }
}

/// Bluetooth HCI H4 with a 4-byte pseudo-header carrying the direction.
///
/// Source flag 0 means host to controller, which the pseudo-header marks
/// with the low bit set; any other flag value is controller to host (0).
pub struct BluetoothHciH4WithPhdr;

impl LinkLayer for BluetoothHciH4WithPhdr {
    fn link_type_id(&self) -> u32 {
        LINKTYPE_BLUETOOTH_HCI_H4_WITH_PHDR
    }

    fn transform(&self, raw_payload: &[u8]) -> Vec<u8> {
        let (flag, rest) = match raw_payload.split_first() {
            Some((&flag, rest)) => (flag, rest),
            None => (0, &[][..]),
        };
        let direction: u32 = if flag != 0 { 0 } else { 1 };

        let mut out = Vec::with_capacity(4 + rest.len());
        out.extend_from_slice(&direction.to_be_bytes());
        out.extend_from_slice(rest);
        out
    }
}

/// Bluetooth HCI H4 without direction information
pub struct BluetoothHciH4;

impl LinkLayer for BluetoothHciH4 {
    fn link_type_id(&self) -> u32 {
        LINKTYPE_BLUETOOTH_HCI_H4
    }

    fn transform(&self, raw_payload: &[u8]) -> Vec<u8> {
        raw_payload.get(1..).unwrap_or_default().to_vec()
    }
}

/// Pass-through for protocols without a registered link type. The direction
/// byte is kept so a dissector can still tell the sides apart.
pub struct User0;

impl LinkLayer for User0 {
    fn link_type_id(&self) -> u32 {
        LINKTYPE_USER0
    }

    fn transform(&self, raw_payload: &[u8]) -> Vec<u8> {
        raw_payload.to_vec()
    }
}

// =============================================================================
// Selection
// =============================================================================

/// Encapsulation selected in settings / on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkType {
    Ethernet,
    BluetoothHciH4WithPhdr,
    BluetoothHciH4,
    User0,
}

impl Default for LinkType {
    fn default() -> Self {
        LinkType::BluetoothHciH4WithPhdr
    }
}

impl LinkType {
    pub fn encapsulator(&self) -> Box<dyn LinkLayer> {
        match self {
            LinkType::Ethernet => Box::new(Ethernet),
            LinkType::BluetoothHciH4WithPhdr => Box::new(BluetoothHciH4WithPhdr),
            LinkType::BluetoothHciH4 => Box::new(BluetoothHciH4),
            LinkType::User0 => Box::new(User0),
        }
    }

    /// Parse from a settings/CLI string ("ethernet", "bluetooth_hci_h4_with_phdr", ...)
    pub fn from_str(s: &str) -> Result<Self, String> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "ethernet" | "eth" => Ok(LinkType::Ethernet),
            "bluetooth_hci_h4_with_phdr" | "hci_phdr" => Ok(LinkType::BluetoothHciH4WithPhdr),
            "bluetooth_hci_h4" | "hci" => Ok(LinkType::BluetoothHciH4),
            "user0" | "raw" => Ok(LinkType::User0),
            _ => Err(format!("Unknown link type: {}", s)),
        }
    }
}
