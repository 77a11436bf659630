//! Block handles and typed port references.

use std::fmt;

/// Handle to a block inside a [`FlowGraph`](super::FlowGraph).
///
/// Handles are dense indices assigned in insertion order and are only
/// meaningful for the graph that issued them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(pub(crate) u32);

impl BlockId {
    /// Index into the graph's block storage.
    pub fn index(self) -> usize {
        self.0 as usize
    }

    /// Reference to this block's output port `port`.
    pub fn output(self, port: usize) -> OutputPort {
        OutputPort { block: self, port }
    }

    /// Reference to this block's input port `port`.
    pub fn input(self, port: usize) -> InputPort {
        InputPort { block: self, port }
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlockId({})", self.0)
    }
}

/// An output port of a block (the producing end of an edge).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OutputPort {
    /// Owning block.
    pub block: BlockId,
    /// Port index within the block's outputs.
    pub port: usize,
}

/// An input port of a block (the consuming end of an edge).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InputPort {
    /// Owning block.
    pub block: BlockId,
    /// Port index within the block's inputs.
    pub port: usize,
}

impl fmt::Display for OutputPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.out[{}]", self.block.0, self.port)
    }
}

impl fmt::Display for InputPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.in[{}]", self.block.0, self.port)
    }
}
