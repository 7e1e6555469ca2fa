use super::*;

/// An Equihash 200/9 solution as submitted: the compact-size length prefix
/// (`fd4005`) followed by 1344 solution bytes.
#[derive(Debug, Clone, PartialEq, Eq, DeserializeFromStr, SerializeDisplay)]
pub struct Solution(Vec<u8>);

impl Solution {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl FromStr for Solution {
    type Err = InternalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != SOLUTION_HEX_SIZE {
            return Err(InternalError::InvalidLength {
                expected: SOLUTION_HEX_SIZE,
                actual: s.len(),
            });
        }

        let bytes = hex::decode(s).map_err(|source| InternalError::HexParse { source })?;

        Ok(Solution(bytes))
    }
}

impl Display for Solution {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(&self.0))
    }
}
