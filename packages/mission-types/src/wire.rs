use serde::{Deserialize, Serialize};

use crate::coordinate::Coordinate;
use crate::deployment::ModuleDeployment;
use crate::drone_data::DroneData;
use crate::error::CodecError;
use crate::signal_config::SignalServerConfig;

/// Per-vehicle route as returned by the planner: parallel lon/lat arrays,
/// matching the wire shape of the original `PlannerResponse`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannerResponse {
    pub lon: Vec<f64>,
    pub lat: Vec<f64>,
}

impl PlannerResponse {
    pub fn from_path(path: &[Coordinate]) -> Self {
        Self {
            lon: path.iter().map(|c| c.lon).collect(),
            lat: path.iter().map(|c| c.lat).collect(),
        }
    }

    pub fn to_path(&self) -> Vec<Coordinate> {
        self.lon
            .iter()
            .zip(self.lat.iter())
            .map(|(&lon, &lat)| Coordinate { lat, lon })
            .collect()
    }
}

/// The tagged union carried by every framed message (§6.1, §6.2). Every
/// link direction uses a subset of these tags; decoders that see a tag not
/// valid for their link still decode it — rejecting out-of-place tags is a
/// higher-layer concern (state handlers warn and discard).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "tag")]
pub enum Message {
    Status {
        type_status: String,
    },
    ConfigMission {
        planner_config: SignalServerConfig,
        info_planner: ModuleDeployment,
        info_drone: ModuleDeployment,
        drone_sim: DroneData,
    },
    Command {
        command: String,
    },
    PlannerMessage {
        signal_server_config: SignalServerConfig,
        drone_data: DroneData,
    },
    PlannerResponseList {
        items: Vec<PlannerResponse>,
    },
    DroneCommandString {
        type_command: String,
        command: Coordinate,
    },
}

/// Encode `msg` as `len:u32 big-endian || json payload`.
pub fn encode(msg: &Message) -> Result<Vec<u8>, CodecError> {
    let payload =
        serde_json::to_vec(msg).map_err(|e| CodecError::Malformed(e.to_string()))?;
    if payload.len() > u32::MAX as usize {
        return Err(CodecError::PayloadTooLarge(payload.len()));
    }
    let mut framed = Vec::with_capacity(4 + payload.len());
    framed.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    framed.extend_from_slice(&payload);
    Ok(framed)
}

/// Decode a single payload (length prefix already stripped by the session
/// server's two-stage read). Unparseable payloads surface `UNKNOWN` to the
/// caller rather than propagating a hard error, matching §4.1's policy that
/// the link itself is never torn down on a bad payload.
pub fn decode_payload(payload: &[u8]) -> Result<Message, CodecError> {
    serde_json::from_slice(payload)
        .map_err(|e| CodecError::Malformed(format!("{e} (payload: {} bytes)", payload.len())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn framing_round_trip() {
        let msg = Message::Status {
            type_status: "WAITING_INFO".into(),
        };
        let framed = encode(&msg).unwrap();
        let len = u32::from_be_bytes(framed[0..4].try_into().unwrap()) as usize;
        assert_eq!(len, framed.len() - 4);
        let decoded = decode_payload(&framed[4..]).unwrap();
        match decoded {
            Message::Status { type_status } => assert_eq!(type_status, "WAITING_INFO"),
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn unparseable_payload_is_malformed_not_panic() {
        let garbage = b"not json at all";
        assert!(decode_payload(garbage).is_err());
    }

    #[test]
    fn planner_response_path_round_trip() {
        let path = vec![Coordinate::new(45.0, 9.0), Coordinate::new(45.1, 9.1)];
        let resp = PlannerResponse::from_path(&path);
        let back = resp.to_path();
        assert_eq!(path, back);
    }
}
