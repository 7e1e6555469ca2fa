use super::*;

/// `mining.notify` params for the 140-byte Equihash header:
/// `[job_id, version, prevhash, merkle_root, reserved, ntime, bits, clean_jobs]`.
/// All hex fields are preformatted in the byte order the header wants.
#[derive(Debug, PartialEq, Clone)]
pub struct Notify {
    pub job_id: JobId,
    pub version: String,
    pub prev_hash: String,
    pub merkle_root: String,
    pub hash_reserved: String,
    pub ntime: String,
    pub bits: String,
    pub clean_jobs: bool,
}

impl Serialize for Notify {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut seq = serializer.serialize_seq(Some(8))?;
        seq.serialize_element(&self.job_id)?;
        seq.serialize_element(&self.version)?;
        seq.serialize_element(&self.prev_hash)?;
        seq.serialize_element(&self.merkle_root)?;
        seq.serialize_element(&self.hash_reserved)?;
        seq.serialize_element(&self.ntime)?;
        seq.serialize_element(&self.bits)?;
        seq.serialize_element(&self.clean_jobs)?;
        seq.end()
    }
}

impl<'de> Deserialize<'de> for Notify {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let (job_id, version, prev_hash, merkle_root, hash_reserved, ntime, bits, clean_jobs) =
            <(JobId, String, String, String, String, String, String, bool)>::deserialize(
                deserializer,
            )?;

        Ok(Notify {
            job_id,
            version,
            prev_hash,
            merkle_root,
            hash_reserved,
            ntime,
            bits,
            clean_jobs,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Notify {
        Notify {
            job_id: JobId::from(0xcccdu64),
            version: "04000000".into(),
            prev_hash: "11".repeat(32),
            merkle_root: "22".repeat(32),
            hash_reserved: "00".repeat(32),
            ntime: "00aa615c".into(),
            bits: "8f071e20".into(),
            clean_jobs: true,
        }
    }

    #[test]
    fn serialize_shape() {
        assert_eq!(
            serde_json::to_value(sample()).unwrap(),
            json!([
                "cccd",
                "04000000",
                "11".repeat(32),
                "22".repeat(32),
                "00".repeat(32),
                "00aa615c",
                "8f071e20",
                true
            ])
        );
    }

    #[test]
    fn roundtrip() {
        let serialized = serde_json::to_string(&sample()).unwrap();
        assert_eq!(serde_json::from_str::<Notify>(&serialized).unwrap(), sample());
    }

    #[test]
    fn clean_jobs_is_last_element() {
        let value = serde_json::to_value(sample()).unwrap();
        assert_eq!(value.as_array().unwrap().len(), 8);
        assert_eq!(value.as_array().unwrap()[7], json!(true));
    }
}
