use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::hash::SnapshotId;
use crate::types::Op;

/// how a snapshot is built: an op applied to its input snapshots
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipe {
    pub op: Op,
    /// input snapshots (empty only for the root, 1 for linear ops, 2+ for merges)
    pub inputs: Vec<SnapshotId>,
    /// free-form label of whatever produced the recipe
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub tag: String,
}

impl Recipe {
    pub fn new(op: Op, inputs: Vec<SnapshotId>, tag: impl Into<String>) -> Self {
        Self {
            op,
            inputs,
            tag: tag.into(),
        }
    }

    /// a single op applied to one input
    pub fn linear(input: SnapshotId, op: Op, tag: impl Into<String>) -> Self {
        Self::new(op, vec![input], tag)
    }

    /// union of several inputs
    pub fn merge(inputs: Vec<SnapshotId>, tag: impl Into<String>) -> Self {
        Self::new(Op::Merge, inputs, tag)
    }

    /// exactly one input and a linear op
    pub fn is_linear(&self) -> bool {
        self.op.is_linear() && self.inputs.len() == 1
    }

    /// the sole input of a linear recipe
    pub fn input(&self) -> Option<SnapshotId> {
        match self.inputs.as_slice() {
            [input] => Some(*input),
            _ => None,
        }
    }

    /// canonical CBOR encoding
    pub fn to_cbor(&self) -> Result<Vec<u8>> {
        let mut bytes = Vec::new();
        ciborium::into_writer(self, &mut bytes)?;
        Ok(bytes)
    }

    /// content address of the snapshot this recipe produces
    pub fn output_id(&self) -> Result<SnapshotId> {
        Ok(SnapshotId::digest(&self.to_cbor()?))
    }
}
