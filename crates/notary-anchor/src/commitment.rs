//! Commitment output format.
//!
//! The anchoring transaction's first output is a zero-value `OP_RETURN`
//! carrying `ANCHOR_TAG || key_mr`: the 8-byte protocol tag followed by the
//! 32-byte key Merkle root of the anchored directory block. Auditors recover
//! the anchored block from this payload alone.

use bitcoin::blockdata::opcodes;
use bitcoin::blockdata::script::{Builder, Instruction, PushBytesBuf, Script, ScriptBuf};

use notary_core::Hash256;

use crate::error::AnchorError;

/// Protocol tag prefixed to every commitment payload.
pub const ANCHOR_TAG: [u8; 8] = *b"Factom!!";

/// Tag plus one 32-byte hash.
pub const COMMITMENT_SIZE: usize = ANCHOR_TAG.len() + 32;

/// Build `OP_RETURN <ANCHOR_TAG || commitment>`.
pub fn build_commitment_script(commitment: &Hash256) -> Result<ScriptBuf, AnchorError> {
    let mut data = Vec::with_capacity(COMMITMENT_SIZE);
    data.extend_from_slice(&ANCHOR_TAG);
    data.extend_from_slice(commitment.as_bytes());

    let push =
        PushBytesBuf::try_from(data).map_err(|e| AnchorError::Commitment(e.to_string()))?;
    Ok(Builder::new()
        .push_opcode(opcodes::all::OP_RETURN)
        .push_slice(push)
        .into_script())
}

/// Recover the committed hash from a commitment output script.
pub fn parse_commitment(script: &Script) -> Result<Hash256, AnchorError> {
    let mut instructions = script.instructions();

    match instructions.next() {
        Some(Ok(Instruction::Op(op))) if op == opcodes::all::OP_RETURN => {}
        _ => return Err(AnchorError::Commitment("not an OP_RETURN script".into())),
    }
    let data = match instructions.next() {
        Some(Ok(Instruction::PushBytes(bytes))) => bytes.as_bytes(),
        _ => return Err(AnchorError::Commitment("missing data push".into())),
    };
    if instructions.next().is_some() {
        return Err(AnchorError::Commitment("trailing script data".into()));
    }
    if data.len() != COMMITMENT_SIZE {
        return Err(AnchorError::Commitment(format!(
            "payload is {} bytes, expected {COMMITMENT_SIZE}",
            data.len()
        )));
    }
    if data[..ANCHOR_TAG.len()] != ANCHOR_TAG {
        return Err(AnchorError::Commitment("unknown protocol tag".into()));
    }
    Hash256::from_slice(&data[ANCHOR_TAG.len()..]).map_err(|e| AnchorError::Commitment(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn script_layout_is_op_return_tag_hash() {
        let hash = Hash256([0x5A; 32]);
        let script = build_commitment_script(&hash).unwrap();
        let bytes = script.as_bytes();

        assert_eq!(bytes[0], opcodes::all::OP_RETURN.to_u8());
        assert_eq!(bytes[1] as usize, COMMITMENT_SIZE);
        assert_eq!(&bytes[2..10], b"Factom!!");
        assert_eq!(&bytes[10..], hash.as_bytes());
        assert!(script.is_op_return());
    }

    #[test]
    fn parse_recovers_hash() {
        let hash = Hash256([0x11; 32]);
        let script = build_commitment_script(&hash).unwrap();
        assert_eq!(parse_commitment(&script).unwrap(), hash);
    }

    #[test]
    fn parse_rejects_foreign_tag() {
        let mut data = b"Moloch!!".to_vec();
        data.extend_from_slice(&[0u8; 32]);
        let script = Builder::new()
            .push_opcode(opcodes::all::OP_RETURN)
            .push_slice(PushBytesBuf::try_from(data).unwrap())
            .into_script();
        assert!(matches!(parse_commitment(&script), Err(AnchorError::Commitment(_))));
    }

    #[test]
    fn parse_rejects_non_op_return() {
        let push = PushBytesBuf::try_from(vec![1u8; COMMITMENT_SIZE]).unwrap();
        let script = Builder::new().push_slice(push).into_script();
        assert!(parse_commitment(&script).is_err());
    }

    #[test]
    fn parse_rejects_short_payload() {
        let script = Builder::new()
            .push_opcode(opcodes::all::OP_RETURN)
            .push_slice(PushBytesBuf::try_from(ANCHOR_TAG.to_vec()).unwrap())
            .into_script();
        assert!(parse_commitment(&script).is_err());
    }
}
