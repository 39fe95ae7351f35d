use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use bitcoin::psbt::Psbt;

use crate::PsbtResult;

pub fn psbt_to_hex(psbt: &Psbt) -> String {
    hex::encode(psbt.serialize())
}

pub fn psbt_to_base64(psbt: &Psbt) -> String {
    STANDARD.encode(psbt.serialize())
}

/// Decodes a hex encoded PSBT, such as the one produced by [`psbt_to_hex`].
pub fn decode_psbt_hex(encoded: &str) -> PsbtResult<Psbt> {
    let bytes = hex::decode(encoded.trim())?;
    Ok(Psbt::deserialize(&bytes)?)
}

/// Decodes a base64 encoded PSBT, such as the one produced by [`psbt_to_base64`].
pub fn decode_psbt_base64(encoded: &str) -> PsbtResult<Psbt> {
    let bytes = STANDARD.decode(encoded.trim())?;
    Ok(Psbt::deserialize(&bytes)?)
}
