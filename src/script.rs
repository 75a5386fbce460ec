//! Output-script pattern solving, limited to the two standard forms the
//! kernel has to recognize (pay-to-pubkey and pay-to-pubkey-hash).

use crate::util::hash160;

pub type KeyId = [u8; 20];

const OP_DUP: u8 = 0x76;
const OP_HASH160: u8 = 0xa9;
const OP_EQUALVERIFY: u8 = 0x88;
const OP_CHECKSIG: u8 = 0xac;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptType {
    PubKey,
    PubKeyHash,
    NonStandard,
}

/// Classify a script-pubkey against the standard templates.
pub fn solve(script: &[u8]) -> ScriptType {
    // <33|65-byte pubkey push> OP_CHECKSIG
    if (script.len() == 35 && script[0] == 33 && script[34] == OP_CHECKSIG)
        || (script.len() == 67 && script[0] == 65 && script[66] == OP_CHECKSIG)
    {
        return ScriptType::PubKey;
    }
    // OP_DUP OP_HASH160 <20-byte hash> OP_EQUALVERIFY OP_CHECKSIG
    if script.len() == 25
        && script[0] == OP_DUP
        && script[1] == OP_HASH160
        && script[2] == 20
        && script[23] == OP_EQUALVERIFY
        && script[24] == OP_CHECKSIG
    {
        return ScriptType::PubKeyHash;
    }
    ScriptType::NonStandard
}

/// Extract the key-id a standard script pays to. Non-standard scripts yield
/// the zero key-id rather than `None`: `check_kernel_script` compares two of
/// these for equality, and on the reference chain two unsolvable scripts
/// therefore compare EQUAL and the check passes. Kept as-is for consensus
/// compatibility.
pub fn extract_key_id(script: &[u8]) -> KeyId {
    match solve(script) {
        ScriptType::PubKeyHash => {
            let mut id = [0u8; 20];
            id.copy_from_slice(&script[3..23]);
            id
        }
        ScriptType::PubKey => {
            let pubkey_len = script[0] as usize;
            hash160(&script[1..1 + pubkey_len])
        }
        ScriptType::NonStandard => [0u8; 20],
    }
}

/// Standard P2PKH script paying the given key-id.
pub fn script_for_key_id(key_id: &KeyId) -> Vec<u8> {
    let mut script = Vec::with_capacity(25);
    script.push(OP_DUP);
    script.push(OP_HASH160);
    script.push(20);
    script.extend_from_slice(key_id);
    script.push(OP_EQUALVERIFY);
    script.push(OP_CHECKSIG);
    script
}
