use ripemd::Ripemd160;
use sha2::{Digest, Sha256};

/// Double SHA-256, the hash used for every consensus-critical digest on this
/// chain (block hashes, txids, selection hashes, kernel proofs, checksums).
pub fn sha256d(data: &[u8]) -> [u8; 32] {
    let h1 = Sha256::digest(data);
    let h2 = Sha256::digest(h1);
    let mut out = [0u8; 32];
    out.copy_from_slice(&h2);
    out
}

/// RIPEMD160(SHA256(data)), the key-id hash for P2PKH scripts.
pub fn hash160(data: &[u8]) -> [u8; 20] {
    let sha = Sha256::digest(data);
    let rip = Ripemd160::digest(sha);
    let mut out = [0u8; 20];
    out.copy_from_slice(&rip);
    out
}
