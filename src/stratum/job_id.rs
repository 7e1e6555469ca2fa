use super::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq, DeserializeFromStr, SerializeDisplay, Hash)]
#[repr(transparent)]
pub struct JobId(u64);

impl FromStr for JobId {
    type Err = InternalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let id = u64::from_str_radix(s, 16).map_err(|e| InternalError::Parse {
            message: format!("invalid job id hex string '{}': {}", s, e),
        })?;
        Ok(JobId(id))
    }
}

impl Display for JobId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{:x}", self.0)
    }
}

impl From<JobId> for u64 {
    fn from(id: JobId) -> u64 {
        id.0
    }
}

impl From<u64> for JobId {
    fn from(id: u64) -> JobId {
        JobId(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip() {
        assert_eq!(JobId::from(0xcccdu64).to_string(), "cccd");
        assert_eq!("cccd".parse::<JobId>().unwrap(), JobId::from(0xcccd));
        assert_eq!(
            "ffffffffff".parse::<JobId>().unwrap(),
            JobId::from(0xff_ffff_ffffu64)
        );
    }

    #[test]
    fn rejects_bad_input() {
        assert!("".parse::<JobId>().is_err());
        assert!("0x1".parse::<JobId>().is_err());
        assert!("g".parse::<JobId>().is_err());
        assert!("10000000000000000".parse::<JobId>().is_err());
    }

    #[test]
    fn serde_as_hex_string() {
        let id = JobId::from(0xcccdu64);
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"cccd\"");
        assert_eq!(serde_json::from_str::<JobId>("\"cccd\"").unwrap(), id);
    }
}
