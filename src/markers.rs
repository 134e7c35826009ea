//! Annotation descriptors the scanner recognizes, and the defaults they imply.

use crate::ident::NamespacedName;

/// Qualifier of a listener or event that does not name one.
pub const DEFAULT_QUALIFIER: &str = "common_events_default";

pub const DEFAULT_PHASE_NAMESPACE: &str = "common_events";
pub const DEFAULT_PHASE_PATH: &str = "default";

pub const SCAN_ANNOTATION: &str = "Lcom/kneelawk/commonevents/api/Scan;";
pub const SCAN_SIDE_ELEMENT: &str = "side";
pub const SIDE_BOTH: &str = "BOTH";
pub const SIDE_CLIENT: &str = "CLIENT";
pub const SIDE_SERVER: &str = "SERVER";

pub const LISTEN_ANNOTATION: &str = "Lcom/kneelawk/commonevents/api/Listen;";
pub const LISTEN_VALUE_ELEMENT: &str = "value";
pub const LISTEN_QUALIFIER_ELEMENT: &str = "qualifier";
pub const LISTEN_PHASE_ELEMENT: &str = "phase";

pub const BUS_EVENT_ANNOTATION: &str = "Lcom/kneelawk/commonevents/api/BusEvent;";
pub const BUS_EVENT_VALUE_ELEMENT: &str = "value";

pub fn default_phase() -> NamespacedName {
    NamespacedName::new(DEFAULT_PHASE_NAMESPACE, DEFAULT_PHASE_PATH)
        .unwrap_or_else(|_| unreachable!("default phase name is valid"))
}

/// The annotation descriptors a scan looks for. Defaults to the constants
/// above; hosts that relocate the annotation package override them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Markers {
    pub scan: String,
    pub listen: String,
    pub bus_event: String,
}

impl Default for Markers {
    fn default() -> Self {
        Self {
            scan: SCAN_ANNOTATION.to_string(),
            listen: LISTEN_ANNOTATION.to_string(),
            bus_event: BUS_EVENT_ANNOTATION.to_string(),
        }
    }
}

/// Which physical side the scan is running on.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Client,
    Server,
}

impl Side {
    pub fn is_client(self) -> bool {
        self == Side::Client
    }

    /// Whether a `side` value from the scan marker admits this side.
    ///
    /// `BOTH` admits either side, `CLIENT` only the client, and any other
    /// value only the server.
    pub fn admits(self, marker_value: &str) -> bool {
        marker_value == SIDE_BOTH || (marker_value == SIDE_CLIENT) == self.is_client()
    }
}
