//! The local-socket IPC data contract between a privileged daemon and its
//! unprivileged per-session clients (spec.md §6). Transport (the actual
//! socket, framing, peer-credential auth) is an explicit Non-goal; this
//! module only defines the message shapes so a transport can be bolted on
//! without renegotiating the protocol.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Protocol version negotiated on connect.
pub const PROTOCOL_VERSION: u32 = 1;

/// One IPC message, tagged by kind (spec.md §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Message {
    /// Sent by the client immediately after connecting.
    Handshake {
        /// The protocol version the client speaks.
        protocol_version: u32,
    },
    /// Begins a session for a given tty, authenticated via peer credentials
    /// (the credential check itself is a transport concern).
    BeginSession {
        /// The controlling tty path, e.g. `/dev/tty2`.
        tty: String,
    },
    /// Describes the active window, the window under the pointer, and
    /// pointer positions — whatever the compositor glue can supply.
    EnvironmentState {
        /// Opaque JSON payload; shape is compositor-specific.
        payload: serde_json::Value,
    },
    /// Requests the daemon reload its configuration from `path`, or from
    /// its already-configured source if `path` is `None`.
    LoadConfig {
        /// Optional override path.
        path: Option<String>,
    },
    /// Starts stroke recording mode (spec.md §4.8); the daemon replies with
    /// another `RecordStroke` carrying the base64-encoded result once
    /// recording ends.
    RecordStroke {
        /// Present on the daemon's reply; absent on the client's request.
        stroke_base64: Option<String>,
    },
    /// Suspends or resumes the event pipeline (mirrors the emergency
    /// release, but operator-initiated).
    Suspend {
        /// `true` to suspend, `false` to resume.
        suspended: bool,
    },
    /// Requests the current value of every variable the daemon tracks.
    VariableList {
        /// Present on the daemon's reply.
        variables: Option<BTreeMap<String, serde_json::Value>>,
    },
    /// Requests the list of currently tracked devices.
    DeviceList {
        /// Present on the daemon's reply.
        devices: Option<Vec<DeviceSummary>>,
    },
    /// Asks the daemon to spawn a process on the client's behalf (used by
    /// `Action::Command` when running inside a sandboxed daemon that cannot
    /// fork directly).
    StartProcess {
        /// The command line to run.
        command: String,
    },
}

/// A device entry in a `DeviceList` reply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceSummary {
    /// Human-readable name.
    pub name: String,
    /// System path, e.g. `/dev/input/event3`.
    pub system_path: String,
    /// Device class, as a lowercase string (`"keyboard"`, `"mouse"`,
    /// `"touchpad"`, `"touchscreen"`).
    pub device_type: String,
    /// Whether the daemon currently holds an exclusive grab on it.
    pub grabbed: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handshake_round_trips_through_json() {
        let message = Message::Handshake { protocol_version: PROTOCOL_VERSION };
        let encoded = serde_json::to_string(&message).unwrap();
        let decoded: Message = serde_json::from_str(&encoded).unwrap();
        match decoded {
            Message::Handshake { protocol_version } => assert_eq!(protocol_version, PROTOCOL_VERSION),
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn device_list_request_has_no_devices() {
        let message = Message::DeviceList { devices: None };
        let encoded = serde_json::to_string(&message).unwrap();
        assert!(encoded.contains("\"device_list\""));
    }
}
