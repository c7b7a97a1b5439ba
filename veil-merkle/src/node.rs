use crate::hash::Bytes32;

/// Head node of the list of perfect subtrees, linked back towards the
/// largest subtree.
#[derive(Debug, Clone)]
pub(crate) struct Node {
    next: Option<Box<Node>>,
    height: u32,
    data: Bytes32,
}

impl Node {
    pub fn new(next: Option<Box<Node>>, height: u32, data: Bytes32) -> Self {
        Self { next, height, data }
    }

    pub fn next_height(&self) -> Option<u32> {
        self.next.as_ref().map(|next| next.height)
    }

    pub fn take_next(&mut self) -> Option<Box<Node>> {
        self.next.take()
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn data(&self) -> &Bytes32 {
        &self.data
    }
}
