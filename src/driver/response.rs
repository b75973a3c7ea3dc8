//! JSON envelopes written to stdout for the autoscaling controller

use super::node::{Node, NodeState};
use crate::vcd::error::VcdResult;
use serde::Serialize;

pub const PROTOCOL_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize)]
pub struct Envelope<T> {
    pub version: u32,
    pub code: u16,
    pub nodes: Vec<T>,
}

impl<T> Envelope<T> {
    fn new(code: u16, nodes: Vec<T>) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            code,
            nodes,
        }
    }
}

/// Node reported back after a destroy request
#[derive(Debug, Clone, Serialize)]
pub struct DestroyedNode {
    pub created: u64,
    pub uniq_id: Option<String>,
    pub status: NodeState,
    /// Sent as a string; the controller expects `"80"`
    pub complete: String,
}

/// One response, serialized as `{"<Variant>": envelope}`
#[derive(Debug, Clone, Serialize)]
pub enum Response {
    NodeStatusResponse(Envelope<Node>),
    CreateNodeResponse(Envelope<Node>),
    DestroyNodeResponse(Envelope<DestroyedNode>),
}

impl Response {
    pub fn status(nodes: Vec<Node>) -> Self {
        Self::NodeStatusResponse(Envelope::new(200, nodes))
    }

    pub fn created(node: Node) -> Self {
        Self::CreateNodeResponse(Envelope::new(202, vec![node]))
    }

    /// `uniq_id` is `None` when the requested node could not be found
    pub fn destroyed(uniq_id: Option<String>) -> Self {
        Self::DestroyNodeResponse(Envelope::new(
            202,
            vec![DestroyedNode {
                created: 0,
                uniq_id,
                status: NodeState::Destroyed,
                complete: "80".to_string(),
            }],
        ))
    }

    pub fn to_json(&self) -> VcdResult<String> {
        Ok(serde_json::to_string(self)?)
    }
}
