use super::*;

pub(crate) fn sha256d_hash(data: &[u8]) -> [u8; 32] {
    sha256d::Hash::hash(data).to_byte_array()
}

pub(crate) fn reverse_bytes(bytes: &[u8]) -> Vec<u8> {
    bytes.iter().rev().copied().collect()
}

pub(crate) fn reverse_hex(s: &str) -> Result<String, InternalError> {
    let bytes = hex::decode(s).map_err(|source| InternalError::HexParse { source })?;
    Ok(hex::encode(reverse_bytes(&bytes)))
}

/// Bitcoin-convention variable-length integer.
pub(crate) fn var_int(n: u64) -> Vec<u8> {
    bitcoin::consensus::serialize(&VarInt(n))
}

pub(crate) fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before unix epoch")
        .as_millis() as u64
}

pub(crate) fn unix_time() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before unix epoch")
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256d_empty_input() {
        assert_eq!(
            hex::encode(sha256d_hash(b"")),
            "5df6e0e2761359d30a8275058e299fcc0381534545f55cf43e41983f5d4c9456"
        );
    }

    #[test]
    fn reverse_hex_is_an_involution() {
        for s in ["", "00", "0102", "deadbeef", "0f0f0f0f0f0f0f0f"] {
            assert_eq!(reverse_hex(&reverse_hex(s).unwrap()).unwrap(), s);
        }
    }

    #[test]
    fn reverse_hex_reverses_bytes() {
        assert_eq!(reverse_hex("0102ff").unwrap(), "ff0201");
    }

    #[test]
    fn reverse_hex_rejects_odd_length() {
        assert!(reverse_hex("abc").is_err());
    }

    #[track_caller]
    fn case_var_int(n: u64, len: usize) {
        let encoded = var_int(n);
        assert_eq!(encoded.len(), len, "length for {n}");

        let decoded: VarInt = bitcoin::consensus::deserialize(&encoded).unwrap();
        assert_eq!(decoded.0, n, "roundtrip for {n}");
    }

    #[test]
    fn var_int_widths() {
        case_var_int(0, 1);
        case_var_int(0xfc, 1);
        case_var_int(0xfd, 3);
        case_var_int(0xffff, 3);
        case_var_int(0x10000, 5);
        case_var_int(0xffff_ffff, 5);
        case_var_int(0x1_0000_0000, 9);
        case_var_int(u64::MAX, 9);
    }

    #[test]
    fn var_int_prefixes() {
        assert_eq!(var_int(0xfd)[0], 0xfd);
        assert_eq!(var_int(0x10000)[0], 0xfe);
        assert_eq!(var_int(0x1_0000_0000)[0], 0xff);
    }
}
