use super::*;

/// Sapling transaction header: version 4 with the overwinter bit set.
pub(crate) const SAPLING_TX_VERSION: u32 = 0x8000_0004;
pub(crate) const SAPLING_VERSION_GROUP_ID: u32 = 0x892f_2085;

/// Builds the serialized coinbase transaction for a template, redirecting the
/// miner reward to the pool.
///
/// The transaction is Sapling-framed: version group id, expiry height, value
/// balance and the three empty shielded vectors follow the transparent part.
/// Its single input spends the null outpoint with a scriptSig of the BIP34
/// height push followed by the ASCII decimal height.
pub(crate) fn build_coinbase(template: &RpcTemplate, pool_script: &[u8]) -> Result<Vec<u8>> {
    ensure!(
        !template.vouts.is_empty(),
        "template has no decoded coinbase outputs"
    );

    let mut tx = Vec::with_capacity(256);

    tx.extend_from_slice(&SAPLING_TX_VERSION.to_le_bytes());
    tx.extend_from_slice(&SAPLING_VERSION_GROUP_ID.to_le_bytes());

    // one input, spending the null prevout
    tx.extend_from_slice(&var_int(1));
    tx.extend_from_slice(&[0u8; 32]);
    tx.extend_from_slice(&0xffff_ffffu32.to_le_bytes());

    let script_sig = coinbase_script_sig(template.height);
    tx.extend_from_slice(&var_int(script_sig.len() as u64));
    tx.extend_from_slice(&script_sig);

    tx.extend_from_slice(&0xffff_ffffu32.to_le_bytes());

    // the first output that survives the zero-value filter is the miner
    // reward and gets the pool's script
    let outputs = template
        .vouts
        .iter()
        .filter(|vout| vout.value_zat != 0)
        .enumerate()
        .map(|(emitted, vout)| {
            let script = if emitted == 0 {
                pool_script.to_vec()
            } else {
                output_script(vout)?
            };
            Ok((vout.value_zat, script))
        })
        .collect::<Result<Vec<(u64, Vec<u8>)>>>()?;

    ensure!(!outputs.is_empty(), "coinbase has no spendable outputs");

    tx.extend_from_slice(&var_int(outputs.len() as u64));

    for (value, script) in outputs {
        tx.extend_from_slice(&value.to_le_bytes());
        tx.extend_from_slice(&var_int(script.len() as u64));
        tx.extend_from_slice(&script);
    }

    // lock time and expiry height
    tx.extend_from_slice(&0u32.to_le_bytes());
    tx.extend_from_slice(&0u32.to_le_bytes());

    // value balance and the empty shielded spend/output/joinsplit vectors
    tx.extend_from_slice(&0u64.to_le_bytes());
    tx.extend_from_slice(&var_int(0));
    tx.extend_from_slice(&var_int(0));
    tx.extend_from_slice(&var_int(0));

    Ok(tx)
}

/// BIP34 height push: one byte giving the width of `height << 1` in minimal
/// form, the height itself as little-endian bytes of that width, then a
/// trailing zero. The ASCII decimal height rides behind it.
fn coinbase_script_sig(height: u32) -> Vec<u8> {
    let mut script = serialize_height(height);
    script.extend_from_slice(height.to_string().as_bytes());
    script
}

fn serialize_height(height: u32) -> Vec<u8> {
    let mut len = 0;
    let mut shifted = u64::from(height) << 1;
    while shifted > 0 {
        len += 1;
        shifted >>= 8;
    }
    let len = len.max(1);

    let mut out = vec![len as u8];
    out.extend_from_slice(&u64::from(height).to_le_bytes()[..len]);
    out.push(0x00);
    out
}

/// Compiles the script for a daemon-provided output past the first.
fn output_script(vout: &Vout) -> Result<Vec<u8>> {
    match vout.script_pub_key.kind.as_str() {
        // the daemon script already is <pubkey> OP_CHECKSIG
        "pubkey" => {
            let hex_script = vout
                .script_pub_key
                .hex
                .as_ref()
                .context("pubkey output has no script hex")?;
            hex::decode(hex_script).context("pubkey output script is not valid hex")
        }
        // pubkeyhash, nulldata, and anything else pay to the listed address
        _ => {
            let address = vout
                .script_pub_key
                .addresses
                .first()
                .context("output has no address to pay to")?;
            coin::pay_to_address_script(address)
        }
    }
}
