use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Periodic fairness broadcast.
/// A subset of the sender's neighbor record: its clock at send time, the
/// airtime share it claims, and the share it offers itself.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ControlMessage {
    #[serde(default)]
    pub t: f64,
    pub claim: f64,
    pub offer: f64,
}

impl ControlMessage {
    pub fn as_bytes(&self) -> Vec<u8> {
        // a struct of three f64s always serializes
        serde_json::to_vec(self).unwrap_or_default()
    }

    pub fn from_slice(buf: &[u8]) -> Result<Self> {
        // radios may pad the payload
        let end = buf
            .iter()
            .rposition(|&b| b != 0)
            .map(|i| i + 1)
            .unwrap_or(0);
        let msg: ControlMessage = serde_json::from_slice(&buf[..end])
            .map_err(|e| Error::MalformedMessage(e.to_string()))?;

        if !msg.claim.is_finite() || msg.claim < 0.0 {
            return Err(Error::MalformedMessage(format!("claim {}", msg.claim)));
        }

        if !msg.offer.is_finite() || msg.offer < 0.0 {
            return Err(Error::MalformedMessage(format!("offer {}", msg.offer)));
        }

        Ok(msg)
    }
}
