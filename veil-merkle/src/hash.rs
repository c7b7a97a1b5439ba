use digest::Digest;
use sha2::Sha256;

/// Width of a tree digest.
pub type Bytes32 = [u8; 32];

#[repr(u8)]
enum Prefix {
    Leaf = 0x00,
    Node = 0x01,
}

// Merkle tree hash of an empty list
// MTH({}) = Hash()
/// Root of the empty tree.
pub fn empty_sum() -> Bytes32 {
    Sha256::new().finalize().into()
}

// Merkle tree hash of a list with one entry
// MTH({d(0)}) = Hash(0x00 || d(0))
/// Digest of a leaf.
pub fn leaf_sum(data: &[u8]) -> Bytes32 {
    let mut hash = Sha256::new();
    hash.update([Prefix::Leaf as u8]);
    hash.update(data);
    hash.finalize().into()
}

// Merkle tree hash of an n-element list D[n]
// MTH(D[n]) = Hash(0x01 || MTH(D[0:k]) || MTH(D[k:n]))
/// Digest of an interior node.
pub fn node_sum(lhs: &Bytes32, rhs: &Bytes32) -> Bytes32 {
    let mut hash = Sha256::new();
    hash.update([Prefix::Node as u8]);
    hash.update(lhs);
    hash.update(rhs);
    hash.finalize().into()
}
