use super::*;

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Hash, Clone)]
#[serde(untagged)]
pub enum Id {
    Null,
    Number(u64),
    String(String),
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(untagged)]
pub enum Message {
    Request {
        id: Id,
        method: String,
        params: Value,
    },
    Response {
        id: Id,
        result: Option<Value>,
        error: Option<Value>,
    },
    Notification {
        method: String,
        params: Value,
    },
}

impl Message {
    pub fn response(id: Id, result: Value) -> Self {
        Message::Response {
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn error(id: Id, error: StratumError) -> Self {
        Message::Response {
            id,
            result: None,
            error: Some(json!(error)),
        }
    }

    pub fn notification(method: &str, params: Value) -> Self {
        Message::Notification {
            method: method.into(),
            params,
        }
    }
}

/// Stratum sends notifications with `id: null`, which the plain JSON-RPC
/// grammar does not allow. Classify by hand so both shapes parse.
impl<'de> Deserialize<'de> for Message {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;

        let has_method = value.get("method").is_some();

        let is_notification = has_method
            && (value.get("id") == Some(&Value::Null) || value.get("id").is_none());

        let is_response = value.get("result").is_some() || value.get("error").is_some();

        if is_response {
            #[derive(Deserialize)]
            struct Resp {
                id: Id,
                result: Option<Value>,
                error: Option<Value>,
            }

            let r: Resp = serde_json::from_value(value).map_err(de::Error::custom)?;

            Ok(Message::Response {
                id: r.id,
                result: r.result,
                error: r.error,
            })
        } else if is_notification {
            let method = value
                .get("method")
                .and_then(Value::as_str)
                .ok_or_else(|| de::Error::missing_field("method"))?
                .to_string();

            let params = value
                .get("params")
                .cloned()
                .ok_or_else(|| de::Error::missing_field("params"))?;

            Ok(Message::Notification { method, params })
        } else if has_method {
            #[derive(Deserialize)]
            struct Req {
                id: Id,
                method: String,
                params: Value,
            }

            let r: Req = serde_json::from_value(value).map_err(de::Error::custom)?;

            Ok(Message::Request {
                id: r.id,
                method: r.method,
                params: r.params,
            })
        } else {
            Err(de::Error::custom("unknown message format"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[track_caller]
    fn case(s: &str, expected: Message) {
        let actual = serde_json::from_str::<Message>(s).unwrap();
        assert_eq!(actual, expected, "deserialize Message from str");

        let serialized = serde_json::to_string(&actual).unwrap();
        let round_trip = serde_json::from_str::<Message>(&serialized).unwrap();
        assert_eq!(round_trip, expected, "roundtrip");
    }

    #[test]
    fn subscribe_request() {
        case(
            r#"{"id":1,"method":"mining.subscribe","params":[]}"#,
            Message::Request {
                id: Id::Number(1),
                method: "mining.subscribe".into(),
                params: json!([]),
            },
        );
    }

    #[test]
    fn submit_request() {
        case(
            r#"{"id":4,"method":"mining.submit","params":["RADDR.worker","cccd","5c61aa00","00000000000000000000000000000000000000000000000000000001","fd400500"]}"#,
            Message::Request {
                id: Id::Number(4),
                method: "mining.submit".into(),
                params: json!([
                    "RADDR.worker",
                    "cccd",
                    "5c61aa00",
                    "00000000000000000000000000000000000000000000000000000001",
                    "fd400500"
                ]),
            },
        );
    }

    #[test]
    fn notification_with_and_without_null_id() {
        case(
            r#"{"method":"mining.notify","params":[]}"#,
            Message::Notification {
                method: "mining.notify".into(),
                params: json!([]),
            },
        );

        assert_eq!(
            serde_json::from_str::<Message>(r#"{"method":"mining.notify","params":[],"id":null}"#)
                .unwrap(),
            Message::Notification {
                method: "mining.notify".into(),
                params: json!([]),
            }
        );
    }

    #[test]
    fn response_with_error_triple() {
        assert_eq!(
            serde_json::to_value(Message::error(Id::Number(4), StratumError::DuplicateShare))
                .unwrap(),
            json!({"id": 4, "result": null, "error": [22, "duplicate share", null]})
        );
    }

    #[test]
    fn affirmative_submit_response() {
        assert_eq!(
            serde_json::to_value(Message::response(Id::Number(4), json!(true))).unwrap(),
            json!({"id": 4, "result": true, "error": null})
        );
    }

    #[test]
    fn string_and_null_ids() {
        case(
            r#"{"id":"abc","method":"mining.authorize","params":["user","pass"]}"#,
            Message::Request {
                id: Id::String("abc".into()),
                method: "mining.authorize".into(),
                params: json!(["user", "pass"]),
            },
        );
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(serde_json::from_str::<Message>(r#"{"foo":"bar"}"#).is_err());
        assert!(serde_json::from_str::<Message>("[1,2,3]").is_err());
    }
}
