use super::*;

/// `mining.set_target` params: one 64-hex-char big-endian share target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetTarget(pub String);

impl From<U256> for SetTarget {
    fn from(target: U256) -> Self {
        SetTarget(target_to_hex(target))
    }
}

impl Serialize for SetTarget {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut seq = serializer.serialize_seq(Some(1))?;
        seq.serialize_element(&self.0)?;
        seq.end()
    }
}

impl<'de> Deserialize<'de> for SetTarget {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let (target,): (String,) = Deserialize::deserialize(deserializer)?;
        Ok(SetTarget(target))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_u256_pads_to_64_chars() {
        let set_target = SetTarget::from(U256::from(0xffu64));
        assert_eq!(set_target.0.len(), 64);
        assert!(set_target.0.ends_with("ff"));
        assert!(set_target.0.starts_with("00"));
    }

    #[test]
    fn serialize_shape() {
        let set_target = SetTarget("00".repeat(32));
        assert_eq!(
            serde_json::to_value(&set_target).unwrap(),
            json!(["00".repeat(32)])
        );
    }

    #[test]
    fn roundtrip() {
        let set_target = SetTarget::from(difficulty::ZCASH.diff1);
        let serialized = serde_json::to_string(&set_target).unwrap();
        assert_eq!(
            serde_json::from_str::<SetTarget>(&serialized).unwrap(),
            set_target
        );
    }

    #[test]
    fn rejects_bad_arity() {
        assert!(serde_json::from_str::<SetTarget>("[]").is_err());
        assert!(serde_json::from_str::<SetTarget>(r#"["a","b"]"#).is_err());
    }
}
