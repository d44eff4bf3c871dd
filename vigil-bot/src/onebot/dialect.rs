//! The two wire shapes a OneBot HTTP endpoint may speak.
//!
//! A unified endpoint (URL ending in `/`) takes the whole `{action, params}`
//! envelope. A per-action endpoint takes `params` alone at `<endpoint>/<action>`.
use super::envelope::DispatchEnvelope;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Unified,
    PerAction,
}

impl Dialect {
    pub fn for_endpoint(endpoint: &str) -> Self {
        if endpoint.ends_with('/') {
            Dialect::Unified
        } else {
            Dialect::PerAction
        }
    }

    pub fn encode(
        self,
        endpoint: &str,
        envelope: &DispatchEnvelope,
    ) -> Result<WireRequest, serde_json::Error> {
        match self {
            Dialect::Unified => encode_unified(endpoint, envelope),
            Dialect::PerAction => encode_per_action(endpoint, envelope),
        }
    }
}

/// A fully resolved POST: absolute URL and JSON body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireRequest {
    pub url: String,
    pub body: Vec<u8>,
}

pub fn encode_unified(endpoint: &str, envelope: &DispatchEnvelope) -> Result<WireRequest, serde_json::Error> {
    Ok(WireRequest {
        url: endpoint.to_string(),
        body: serde_json::to_vec(envelope)?,
    })
}

pub fn encode_per_action(
    endpoint: &str,
    envelope: &DispatchEnvelope,
) -> Result<WireRequest, serde_json::Error> {
    Ok(WireRequest {
        url: format!("{endpoint}/{}", envelope.action),
        body: serde_json::to_vec(&envelope.params)?,
    })
}
