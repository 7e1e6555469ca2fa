use super::*;

#[derive(Debug, PartialEq)]
pub struct Authorize {
    pub username: String,
    pub password: Option<String>,
}

impl Serialize for Authorize {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let len = if self.password.is_some() { 2 } else { 1 };
        let mut seq = serializer.serialize_seq(Some(len))?;
        seq.serialize_element(&self.username)?;
        if let Some(pass) = &self.password {
            seq.serialize_element(pass)?;
        }
        seq.end()
    }
}

impl<'de> Deserialize<'de> for Authorize {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            One((String,)),
            Two((String, Option<String>)),
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::One((username,)) => Authorize {
                username,
                password: None,
            },
            Raw::Two((username, password)) => Authorize { username, password },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn with_password() {
        assert_eq!(
            serde_json::from_str::<Authorize>(r#"["RAddress.rig1","x"]"#).unwrap(),
            Authorize {
                username: "RAddress.rig1".into(),
                password: Some("x".into()),
            }
        );
    }

    #[test]
    fn without_password() {
        assert_eq!(
            serde_json::from_str::<Authorize>(r#"["RAddress.rig1"]"#).unwrap(),
            Authorize {
                username: "RAddress.rig1".into(),
                password: None,
            }
        );
    }

    #[test]
    fn serialize_shape() {
        assert_eq!(
            serde_json::to_value(Authorize {
                username: "u".into(),
                password: Some("p".into()),
            })
            .unwrap(),
            json!(["u", "p"])
        );

        assert_eq!(
            serde_json::to_value(Authorize {
                username: "u".into(),
                password: None,
            })
            .unwrap(),
            json!(["u"])
        );
    }

    #[test]
    fn rejects_bad_arity() {
        assert!(serde_json::from_str::<Authorize>("[]").is_err());
        assert!(serde_json::from_str::<Authorize>(r#"["a","b","c"]"#).is_err());
    }
}
