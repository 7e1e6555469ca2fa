use super::*;

/// Per-socket stratum state machine: framing, subscribe/authorize/submit,
/// and target/job delivery. Job updates arrive over the manager's watch
/// channel; accepted shares go out through the share channel.
pub(crate) struct Connection<R, W> {
    settings: Arc<Settings>,
    jobs: Arc<JobManager>,
    vardiff: Option<Arc<VarDiff>>,
    vardiff_tracker: Option<VarDiffTracker>,
    share_tx: mpsc::Sender<ShareOutcome>,
    socket_addr: SocketAddr,
    local_port: u16,
    port_diff: f64,
    reader: FramedRead<R, LinesCodec>,
    writer: FramedWrite<W, LinesCodec>,
    job_receiver: watch::Receiver<Option<JobUpdate>>,
    cancel_token: CancellationToken,
    subscription_id: String,
    extranonce1: Option<String>,
    authorized: bool,
    worker: Option<Username>,
    difficulty: Option<f64>,
    previous_difficulty: Option<f64>,
    pending_difficulty: Option<f64>,
    last_activity: Instant,
}

impl<R, W> Connection<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        settings: Arc<Settings>,
        jobs: Arc<JobManager>,
        vardiff: Option<Arc<VarDiff>>,
        share_tx: mpsc::Sender<ShareOutcome>,
        socket_addr: SocketAddr,
        local_port: u16,
        port_diff: f64,
        subscription_id: String,
        reader: R,
        writer: W,
        cancel_token: CancellationToken,
    ) -> Self {
        let job_receiver = jobs.subscribe();
        let vardiff_tracker = vardiff.as_ref().map(|vardiff| vardiff.tracker());

        Self {
            settings,
            jobs,
            vardiff,
            vardiff_tracker,
            share_tx,
            socket_addr,
            local_port,
            port_diff,
            reader: FramedRead::new(reader, LinesCodec::new_with_max_length(MAX_MESSAGE_SIZE)),
            writer: FramedWrite::new(writer, LinesCodec::new()),
            job_receiver,
            cancel_token,
            subscription_id,
            extranonce1: None,
            authorized: false,
            worker: None,
            difficulty: None,
            previous_difficulty: None,
            pending_difficulty: None,
            last_activity: Instant::now(),
        }
    }

    pub(crate) async fn serve(&mut self) -> Result {
        let cancel_token = self.cancel_token.clone();
        let mut job_receiver = self.job_receiver.clone();

        loop {
            tokio::select! {
                _ = cancel_token.cancelled() => {
                    info!("Disconnecting {}", self.socket_addr);
                    break;
                }
                line = self.reader.next() => {
                    match line {
                        None => {
                            debug!("Connection {} closed by peer", self.socket_addr);
                            break;
                        }
                        Some(Err(LinesCodecError::MaxLineLengthExceeded)) => {
                            warn!(
                                "Flooding socket {} exceeded {MAX_MESSAGE_SIZE} bytes without a newline",
                                self.socket_addr
                            );
                            break;
                        }
                        Some(Err(err)) => {
                            debug!("Read error from {}: {err}", self.socket_addr);
                            break;
                        }
                        Some(Ok(line)) => {
                            self.last_activity = Instant::now();

                            let message = match serde_json::from_str::<Message>(&line) {
                                Ok(message) => message,
                                Err(err) => {
                                    if self.settings.tcp_proxy_protocol && line.starts_with("PROXY") {
                                        debug!("Ignoring PROXY preface from {}", self.socket_addr);
                                        continue;
                                    }

                                    warn!(
                                        "Malformed message from {}: {err}; line={line:?}",
                                        self.socket_addr
                                    );
                                    break;
                                }
                            };

                            let Message::Request { id, method, params } = message else {
                                debug!("Ignoring non-request from {}", self.socket_addr);
                                continue;
                            };

                            self.handle_request(id, &method, params).await?;
                        }
                    }
                }
                changed = job_receiver.changed() => {
                    if changed.is_err() {
                        warn!("Job channel closed, dropping {}", self.socket_addr);
                        break;
                    }

                    let update = job_receiver.borrow_and_update().clone();

                    if !self.authorized {
                        continue;
                    }

                    if self.last_activity.elapsed() > self.settings.connection_timeout() {
                        info!(
                            "Closing {} (worker {:?}) after {}s of inactivity",
                            self.socket_addr,
                            self.worker.as_ref().map(Username::to_string),
                            self.last_activity.elapsed().as_secs()
                        );
                        break;
                    }

                    if let Some(update) = update {
                        self.send_mining_job(&update).await?;
                    }
                }
            }
        }

        Ok(())
    }

    async fn handle_request(&mut self, id: Id, method: &str, params: Value) -> Result {
        match method {
            "mining.subscribe" => {
                // params are informational only; tolerate anything
                if let Err(err) = serde_json::from_value::<Subscribe>(params) {
                    debug!("Odd subscribe params from {}: {err}", self.socket_addr);
                }

                let extranonce1 = self.jobs.next_extranonce1();
                debug!(
                    "SUBSCRIBE {} as {} extranonce1 {extranonce1} (miner nonce space {} bytes)",
                    self.socket_addr,
                    self.subscription_id,
                    self.jobs.extranonce2_size(),
                );

                self.extranonce1 = Some(extranonce1.clone());

                self.send(Message::response(id, json!([Value::Null, extranonce1])))
                    .await
            }
            "mining.authorize" => {
                let authorize = serde_json::from_value::<Authorize>(params)
                    .context("failed to deserialize mining.authorize")?;

                let worker = authorize
                    .username
                    .parse::<Username>()
                    .expect("username parsing is infallible");

                debug!("AUTHORIZE {} from {}", worker, self.socket_addr);

                self.worker = Some(worker);
                self.authorized = true;

                self.send(Message::response(id, json!(true))).await?;

                let difficulty = if self.settings.min_diff_adjust {
                    self.port_diff
                } else {
                    self.jobs
                        .current_job()
                        .map_or(self.port_diff, |job| job.difficulty)
                };

                self.send_difficulty(difficulty).await?;

                if let Some(update) = self.jobs.current_update() {
                    self.send_notify(update.job.notify(update.clean_jobs)).await?;
                }

                Ok(())
            }
            "mining.submit" => {
                if !self.authorized {
                    return self.send(Message::error(id, StratumError::UnauthorizedWorker)).await;
                }

                let Some(extranonce1) = self.extranonce1.clone() else {
                    return self.send(Message::error(id, StratumError::NotSubscribed)).await;
                };

                let submit = serde_json::from_value::<Submit>(params)
                    .context("failed to deserialize mining.submit")?;

                self.submit(extranonce1, submit).await?;

                // rejects past the guards above stay server side: some miners
                // drop the connection on a reject, and losing the miner costs
                // more than losing the share
                self.send(Message::response(id, json!(true))).await
            }
            "mining.get_transactions" => {
                self.send(Message::Response {
                    id,
                    result: Some(json!([])),
                    error: Some(json!(true)),
                })
                .await
            }
            "mining.extranonce.subscribe" => {
                self.send(Message::error(id, StratumError::NotSupported)).await
            }
            method => {
                warn!("Unknown stratum method {method} from {}", self.socket_addr);
                Ok(())
            }
        }
    }

    async fn submit(&mut self, extranonce1: String, submit: Submit) -> Result {
        let worker = submit
            .worker
            .parse::<Username>()
            .expect("username parsing is infallible");

        let submission = Submission {
            job_id: submit.job_id,
            extranonce1,
            extranonce2: submit.extranonce2,
            ntime: submit.ntime,
            solution: submit.solution,
            difficulty: self.difficulty.unwrap_or(self.port_diff),
            previous_difficulty: self.previous_difficulty,
            ip: self.socket_addr.ip().to_string(),
            port: self.local_port,
            worker,
        };

        match self.jobs.process_share(&submission) {
            Ok(outcome) => {
                if self.settings.print_shares {
                    info!(
                        "Share from {} diff {:.8}/{} at height {}",
                        submission.worker, outcome.share_diff, outcome.difficulty, outcome.height
                    );
                }

                if self.share_tx.send(outcome).await.is_err() {
                    warn!("Share channel closed, dropping share");
                }
            }
            Err(err) => {
                if self.settings.print_shares {
                    info!(
                        "Rejected share from {} at {}: [{}] {err}",
                        submission.worker,
                        self.socket_addr,
                        err.code()
                    );
                }
            }
        }

        self.record_vardiff_submit().await
    }

    async fn record_vardiff_submit(&mut self) -> Result {
        let (Some(vardiff), Some(tracker)) = (&self.vardiff, &mut self.vardiff_tracker) else {
            return Ok(());
        };

        let difficulty = self.difficulty.unwrap_or(self.port_diff);

        if let Some(new_difficulty) = vardiff.record_submit(tracker, difficulty, Instant::now()) {
            if (new_difficulty - difficulty).abs() > f64::EPSILON {
                if self.settings.print_var_diff_adjust {
                    info!(
                        "Vardiff retarget {} {difficulty} -> {new_difficulty}",
                        self.socket_addr
                    );
                }

                self.pending_difficulty = Some(new_difficulty);
            }
        }

        Ok(())
    }

    /// Applies a difficulty transition; no-op when unchanged or the client
    /// has not authorized yet.
    async fn send_difficulty(&mut self, difficulty: f64) -> Result {
        if !self.authorized || self.difficulty == Some(difficulty) {
            return Ok(());
        }

        if let Some(previous) = self.difficulty {
            self.previous_difficulty = Some(previous);
        }
        self.difficulty = Some(difficulty);

        self.send_target().await
    }

    /// `mining.set_target` with the client's current difficulty scaled into
    /// target space.
    async fn send_target(&mut self) -> Result {
        let Some(difficulty) = self.difficulty else {
            return Ok(());
        };

        let set_target = SetTarget::from(target_for_difficulty(difficulty));

        self.send(Message::notification("mining.set_target", json!(set_target)))
            .await
    }

    /// Job delivery: a pending retarget is consumed first so the target
    /// always precedes the notify that depends on it; otherwise the current
    /// target is re-sent for miners that missed it.
    async fn send_mining_job(&mut self, update: &JobUpdate) -> Result {
        if let Some(pending) = self.pending_difficulty.take() {
            self.send_difficulty(pending).await?;
        } else {
            self.send_target().await?;
        }

        self.send_notify(update.job.notify(update.clean_jobs)).await
    }

    async fn send_notify(&mut self, notify: Notify) -> Result {
        self.send(Message::notification("mining.notify", json!(notify)))
            .await
    }

    async fn send(&mut self, message: Message) -> Result {
        let frame = serde_json::to_string(&message)?;
        self.writer.send(frame).await?;
        Ok(())
    }
}
