use {super::*, snafu::Snafu};

/// RPC error code komodod returns from `getblocktemplate` while the chain is
/// still syncing.
pub(crate) const RPC_IN_WARMUP: i64 = -10;

#[derive(Debug, Clone, Snafu)]
pub(crate) enum DaemonError {
    #[snafu(display("offline: {message}"))]
    Offline { message: String },

    #[snafu(display("Unauthorized RPC access - invalid RPC username or password"))]
    Unauthorized,

    #[snafu(display("request error: {message}"))]
    Request { message: String },

    #[snafu(display("rpc error {code}: {message}"))]
    Rpc { code: i64, message: String },

    #[snafu(display("malformed rpc response: {message}"))]
    Malformed { message: String },
}

impl DaemonError {
    pub(crate) fn rpc_code(&self) -> Option<i64> {
        match self {
            DaemonError::Rpc { code, .. } => Some(*code),
            _ => None,
        }
    }
}

#[derive(Debug)]
pub(crate) struct DaemonReply {
    pub(crate) instance: usize,
    pub(crate) result: Result<Value, DaemonError>,
}

/// JSON-RPC client for an ordered fleet of coin daemons. Single calls fan out
/// to every instance in parallel; batches go to the first instance only.
pub(crate) struct DaemonClient {
    instances: Vec<DaemonSettings>,
    http: reqwest::Client,
}

impl DaemonClient {
    pub(crate) fn new(instances: Vec<DaemonSettings>) -> Self {
        Self {
            instances,
            http: reqwest::Client::new(),
        }
    }

    /// Startup probe: every instance must answer `getinfo`.
    pub(crate) async fn init(&self) -> Result {
        let replies = self.cmd("getinfo", json!([])).await;

        let offline = replies
            .iter()
            .filter_map(|reply| {
                reply
                    .result
                    .as_ref()
                    .err()
                    .map(|err| format!("daemon {}: {}", reply.instance, err))
            })
            .collect::<Vec<String>>();

        ensure!(
            offline.is_empty(),
            "not all daemons are online: {}",
            offline.join("; ")
        );

        info!("All {} daemon(s) online", self.instances.len());

        Ok(())
    }

    /// Dispatches the same call to every instance in parallel and returns one
    /// reply per instance, in instance order.
    pub(crate) async fn cmd(&self, method: &str, params: Value) -> Vec<DaemonReply> {
        join_all(self.instances.iter().enumerate().map(|(index, instance)| {
            let params = params.clone();
            async move {
                let body = json!({
                    "method": method,
                    "params": params,
                    "id": rpc_id(index as u64),
                });

                DaemonReply {
                    instance: index,
                    result: self.call(instance, &body).await.and_then(parse_reply),
                }
            }
        }))
        .await
    }

    /// Fans out and keeps the first successful reply; the first error if none
    /// succeed.
    pub(crate) async fn cmd_any(&self, method: &str, params: Value) -> Result<Value, DaemonError> {
        let mut first_error = None;

        for reply in self.cmd(method, params).await {
            match reply.result {
                Ok(value) => return Ok(value),
                Err(err) => first_error.get_or_insert(err),
            };
        }

        Err(first_error.unwrap_or(DaemonError::Malformed {
            message: "no daemon instances configured".into(),
        }))
    }

    /// One JSON-RPC batch request to the first instance; results come back in
    /// call order.
    pub(crate) async fn batch_cmd(
        &self,
        calls: &[(&str, Value)],
    ) -> Result<Vec<Result<Value, DaemonError>>, DaemonError> {
        let instance = self.instances.first().ok_or(DaemonError::Malformed {
            message: "no daemon instances configured".into(),
        })?;

        let base_id = rpc_id(0);

        let body = Value::Array(
            calls
                .iter()
                .enumerate()
                .map(|(i, (method, params))| {
                    json!({
                        "method": method,
                        "params": params,
                        "id": base_id + i as u64,
                    })
                })
                .collect(),
        );

        let replies = self.call(instance, &body).await?;

        let replies = replies.as_array().ok_or_else(|| DaemonError::Malformed {
            message: "batch response is not an array".into(),
        })?;

        let mut by_id = replies
            .iter()
            .filter_map(|reply| {
                reply
                    .get("id")
                    .and_then(Value::as_u64)
                    .map(|id| (id, reply.clone()))
            })
            .collect::<HashMap<u64, Value>>();

        Ok((0..calls.len())
            .map(|i| {
                by_id
                    .remove(&(base_id + i as u64))
                    .ok_or_else(|| DaemonError::Malformed {
                        message: format!("batch response missing id {}", base_id + i as u64),
                    })
                    .and_then(parse_reply)
            })
            .collect())
    }

    async fn call(&self, instance: &DaemonSettings, body: &Value) -> Result<Value, DaemonError> {
        let url = format!("http://{}:{}/", instance.host, instance.port);

        let response = self
            .http
            .post(url)
            .basic_auth(&instance.user, Some(&instance.password))
            .json(body)
            .send()
            .await
            .map_err(|err| {
                if err.is_connect() {
                    DaemonError::Offline {
                        message: err.to_string(),
                    }
                } else {
                    DaemonError::Request {
                        message: err.to_string(),
                    }
                }
            })?;

        if response.status() == reqwest::StatusCode::UNAUTHORIZED {
            warn!("Unauthorized RPC access - invalid RPC username or password");
            return Err(DaemonError::Unauthorized);
        }

        let text = response.text().await.map_err(|err| DaemonError::Request {
            message: err.to_string(),
        })?;

        serde_json::from_str(&patch_non_finite(&text)).map_err(|err| DaemonError::Malformed {
            message: format!("{err}: {}", text.chars().take(256).collect::<String>()),
        })
    }
}

/// Daemons occasionally emit non-finite floats as `-nan`, which is not JSON.
fn patch_non_finite(text: &str) -> String {
    if text.contains(":-nan") {
        text.replace(":-nan", ":0")
    } else {
        text.to_string()
    }
}

/// Unwraps a JSON-RPC envelope into its `result`, surfacing `error` objects.
fn parse_reply(reply: Value) -> Result<Value, DaemonError> {
    if let Some(error) = reply.get("error").filter(|error| !error.is_null()) {
        return Err(DaemonError::Rpc {
            code: error.get("code").and_then(Value::as_i64).unwrap_or_default(),
            message: error
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown rpc error")
                .to_string(),
        });
    }

    reply
        .get("result")
        .cloned()
        .ok_or_else(|| DaemonError::Malformed {
            message: "reply has neither result nor error".into(),
        })
}

fn rpc_id(index: u64) -> u64 {
    now_millis() + rand::rng().random_range(0..10) + index
}
