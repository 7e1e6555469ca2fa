use super::*;

/// The full 32-byte Equihash nonce: the server's extranonce1 prefix followed
/// by the miner's extranonce2.
#[derive(Debug, Clone, Copy, PartialEq, Eq, DeserializeFromStr, SerializeDisplay)]
pub struct Nonce([u8; 32]);

impl Nonce {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl FromStr for Nonce {
    type Err = InternalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != NONCE_SIZE * 2 {
            return Err(InternalError::InvalidLength {
                expected: NONCE_SIZE * 2,
                actual: s.len(),
            });
        }

        let bytes = hex::decode(s).map_err(|source| InternalError::HexParse { source })?;

        Ok(Nonce(bytes.try_into().expect("decoded 32 bytes")))
    }
}

impl Display for Nonce {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl From<[u8; 32]> for Nonce {
    fn from(bytes: [u8; 32]) -> Nonce {
        Nonce(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip() {
        let hex_nonce = "00".repeat(31) + "01";
        let nonce = hex_nonce.parse::<Nonce>().unwrap();
        assert_eq!(nonce.to_string(), hex_nonce);
        assert_eq!(nonce.as_bytes()[31], 1);
    }

    #[test]
    fn rejects_wrong_width() {
        assert!(matches!(
            "00".repeat(31).parse::<Nonce>(),
            Err(InternalError::InvalidLength { .. })
        ));
        assert!(matches!(
            "00".repeat(33).parse::<Nonce>(),
            Err(InternalError::InvalidLength { .. })
        ));
    }

    #[test]
    fn rejects_non_hex() {
        assert!("zz".repeat(32).parse::<Nonce>().is_err());
    }
}
