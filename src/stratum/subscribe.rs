use super::*;

/// `mining.subscribe` params. Miners send anywhere from zero to two
/// elements; both the user agent and a resumed session id are optional and
/// the session id is ignored.
#[derive(Debug, Default, PartialEq)]
pub struct Subscribe {
    pub user_agent: Option<String>,
    pub session_id: Option<String>,
}

impl Serialize for Subscribe {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut fields = vec![];
        if let Some(user_agent) = &self.user_agent {
            fields.push(user_agent);
            if let Some(session_id) = &self.session_id {
                fields.push(session_id);
            }
        }

        let mut seq = serializer.serialize_seq(Some(fields.len()))?;
        for field in fields {
            seq.serialize_element(field)?;
        }
        seq.end()
    }
}

impl<'de> Deserialize<'de> for Subscribe {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let fields = Vec::<Option<String>>::deserialize(deserializer)?;

        if fields.len() > 2 {
            return Err(de::Error::custom(format!(
                "mining.subscribe takes at most 2 params, got {}",
                fields.len()
            )));
        }

        let mut fields = fields.into_iter();

        Ok(Subscribe {
            user_agent: fields.next().flatten(),
            session_id: fields.next().flatten(),
        })
    }
}
