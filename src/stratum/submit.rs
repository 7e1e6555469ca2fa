use super::*;

/// `mining.submit` params: `[worker, job_id, ntime, extranonce2, solution]`.
///
/// Everything stays raw here; the job manager validates field by field so
/// rejects carry the right wire code.
#[derive(Debug, PartialEq, Clone)]
pub struct Submit {
    pub worker: String,
    pub job_id: String,
    pub ntime: String,
    pub extranonce2: String,
    pub solution: String,
}

impl Serialize for Submit {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut seq = serializer.serialize_seq(Some(5))?;
        seq.serialize_element(&self.worker)?;
        seq.serialize_element(&self.job_id)?;
        seq.serialize_element(&self.ntime)?;
        seq.serialize_element(&self.extranonce2)?;
        seq.serialize_element(&self.solution)?;
        seq.end()
    }
}

impl<'de> Deserialize<'de> for Submit {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let (worker, job_id, ntime, extranonce2, solution) =
            <(String, String, String, String, String)>::deserialize(deserializer)?;

        Ok(Submit {
            worker,
            job_id,
            ntime,
            extranonce2,
            solution,
        })
    }
}
