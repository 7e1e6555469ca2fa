use super::*;

/// Block time as it travels in `mining.notify` and `mining.submit`: eight hex
/// chars encoding the little-endian u32.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, DeserializeFromStr, SerializeDisplay)]
pub struct Ntime(u32);

impl FromStr for Ntime {
    type Err = InternalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != 8 {
            return Err(InternalError::InvalidLength {
                expected: 8,
                actual: s.len(),
            });
        }

        let bytes = hex::decode(s).map_err(|source| InternalError::HexParse { source })?;

        Ok(Ntime(u32::from_le_bytes(
            bytes.try_into().expect("decoded 4 bytes"),
        )))
    }
}

impl Display for Ntime {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0.to_le_bytes()))
    }
}

impl From<u32> for Ntime {
    fn from(n: u32) -> Ntime {
        Ntime(n)
    }
}

impl From<Ntime> for u32 {
    fn from(n: Ntime) -> u32 {
        n.0
    }
}

impl Ntime {
    pub fn to_le_bytes(self) -> [u8; 4] {
        self.0.to_le_bytes()
    }
}
