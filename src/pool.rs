use super::*;

const SYNC_POLL_DELAY: Duration = Duration::from_secs(5);

/// Wires the daemon fan-out, job manager, stratum server, vardiff
/// controllers, and the optional P2P fast path into one running pool.
pub(crate) struct Pool {
    settings: Arc<Settings>,
}

impl Pool {
    pub(crate) fn new(settings: Arc<Settings>) -> Result<Self> {
        Ok(Self { settings })
    }

    pub(crate) async fn run(self, cancel_token: CancellationToken) -> Result {
        let settings = self.settings;

        // one vardiff controller per port that configured it
        let vardiffs = settings
            .ports
            .iter()
            .filter_map(|(port, port_settings)| {
                port_settings
                    .var_diff
                    .map(|options| (*port, Arc::new(VarDiff::new(options))))
            })
            .collect::<HashMap<u16, Arc<VarDiff>>>();

        // the local block-recording hook
        let ledger = Ledger::new(Path::new("logs"), &settings.coin.symbol);

        let daemon = Arc::new(DaemonClient::new(settings.daemons.clone()));
        daemon.init().await.context("daemon startup probe failed")?;

        let facts = detect_coin_data(&settings, &daemon).await?;

        info!(
            "{} ({}) {} network, difficulty {}, {} peer connections",
            settings.coin.name,
            settings.coin.symbol,
            facts.reward,
            facts.network_difficulty,
            facts.connections,
        );

        let jobs = Arc::new(JobManager::new(settings.clone(), facts.pool_script.clone()));

        let running = Running {
            settings: settings.clone(),
            daemon,
            jobs: jobs.clone(),
            vardiffs: vardiffs.clone(),
            ledger,
        };

        // block until the chain is synced, then install the first template
        let template = running.wait_for_sync(&cancel_token).await?;
        running.install_template(template)?;
        let mut last_work = Instant::now();

        let (share_tx, mut share_rx) = mpsc::channel(512);
        let (block_notify_tx, mut block_notify_rx) = mpsc::channel(64);

        if let Some(p2p) = settings.p2p() {
            let peer = Peer::new(
                settings.coin.magic(facts.testnet)?,
                p2p,
                facts.protocol_version,
                block_notify_tx.clone(),
            );
            tokio::spawn(peer.run(cancel_token.child_token()));
        }

        let server = Arc::new(StratumServer::new(
            settings.clone(),
            jobs,
            vardiffs,
            share_tx,
        ));
        let server_handle = tokio::spawn(server.run(cancel_token.child_token()));

        let poll_period = settings.block_refresh_interval();
        let mut poll = {
            let period = poll_period.unwrap_or(Duration::from_secs(3600));
            let mut ticker = interval_at(tokio::time::Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            ticker
        };

        loop {
            tokio::select! {
                _ = cancel_token.cancelled() => break,
                Some(outcome) = share_rx.recv() => {
                    match running.handle_share(outcome).await {
                        Ok(true) => last_work = Instant::now(),
                        Ok(false) => {}
                        Err(err) => error!("Share handling failed: {err:#}"),
                    }
                }
                Some(hash) = block_notify_rx.recv() => {
                    if running.handle_block_notify(&hash, "p2p").await {
                        last_work = Instant::now();
                    }
                }
                _ = poll.tick() => {
                    if poll_period.is_some() && running.refresh_template().await {
                        last_work = Instant::now();
                    }
                }
                _ = sleep(settings.job_rebroadcast_timeout().saturating_sub(last_work.elapsed())) => {
                    debug!(
                        "No new work for {}s, rebroadcasting",
                        settings.job_rebroadcast_timeout().as_secs()
                    );
                    running.rebroadcast().await;
                    last_work = Instant::now();
                }
            }
        }

        let _ = server_handle.await;

        Ok(())
    }
}

struct Running {
    settings: Arc<Settings>,
    daemon: Arc<DaemonClient>,
    jobs: Arc<JobManager>,
    vardiffs: HashMap<u16, Arc<VarDiff>>,
    ledger: Ledger,
}

impl Running {
    /// Folds a template into the job manager; on a new block the network
    /// difficulty cascades into every vardiff controller.
    fn install_template(&self, template: RpcTemplate) -> Result<bool> {
        let new_block = self.jobs.process_template(template)?;

        if new_block {
            if let Some(job) = self.jobs.current_job() {
                for vardiff in self.vardiffs.values() {
                    vardiff.set_network_difficulty(job.difficulty);
                }

                if self.settings.print_nethash {
                    info!("Network difficulty is now {}", job.difficulty);
                }
            }
        }

        Ok(new_block)
    }

    async fn try_fetch_template(&self) -> Result<RpcTemplate, DaemonError> {
        let value = self
            .daemon
            .cmd_any(
                "getblocktemplate",
                json!([{"capabilities": ["coinbasetxn", "workid", "coinbase/append"]}]),
            )
            .await?;

        let mut template =
            serde_json::from_value::<RpcTemplate>(value).map_err(|err| DaemonError::Malformed {
                message: format!("block template: {err}"),
            })?;

        let decoded = self
            .daemon
            .cmd_any(
                "decoderawtransaction",
                json!([template.coinbasetxn.data]),
            )
            .await?;

        template
            .attach_vouts(&decoded)
            .map_err(|err| DaemonError::Malformed {
                message: format!("coinbase outputs: {err}"),
            })?;

        Ok(template)
    }

    /// Fetch with one immediate retry when the daemon handed back a template
    /// with missing or malformed fields.
    async fn fetch_template(&self) -> Result<RpcTemplate> {
        match self.try_fetch_template().await {
            Ok(template) => Ok(template),
            Err(DaemonError::Malformed { message }) => {
                warn!("Template was malformed ({message}), refetching");
                Ok(self.try_fetch_template().await?)
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn refresh_template(&self) -> bool {
        match self.fetch_template().await {
            Ok(template) => match self.install_template(template) {
                Ok(_) => true,
                Err(err) => {
                    error!("Failed to process block template: {err:#}");
                    false
                }
            },
            Err(err) => {
                error!("Failed to fetch block template: {err:#}");
                false
            }
        }
    }

    /// The rebroadcast-timeout path: same block means a forced
    /// `update_current_job`, anything else goes through the normal decision
    /// tree.
    async fn rebroadcast(&self) {
        let template = match self.fetch_template().await {
            Ok(template) => template,
            Err(err) => {
                error!("Failed to fetch block template: {err:#}");
                return;
            }
        };

        let same_block = self.jobs.current_job().is_some_and(|job| {
            job.template.previous_block_hash == template.previous_block_hash
        });

        let result = if same_block {
            self.jobs.update_current_job(template)
        } else {
            self.install_template(template).map(|_| ())
        };

        if let Err(err) = result {
            error!("Failed to rebroadcast work: {err:#}");
        }
    }

    /// Polls `getblocktemplate` until the daemon stops answering with the
    /// warming-up error, reporting download progress every five seconds.
    async fn wait_for_sync(&self, cancel_token: &CancellationToken) -> Result<RpcTemplate> {
        loop {
            match self.try_fetch_template().await {
                Ok(template) => return Ok(template),
                Err(err) if err.rpc_code() == Some(daemon::RPC_IN_WARMUP) => {
                    self.report_sync_progress().await;
                }
                Err(DaemonError::Malformed { message }) => {
                    warn!("Template was malformed during sync wait: {message}");
                }
                Err(err) => return Err(err).context("getblocktemplate failed"),
            }

            tokio::select! {
                _ = cancel_token.cancelled() => bail!("shutdown requested while waiting for sync"),
                _ = sleep(SYNC_POLL_DELAY) => {}
            }
        }
    }

    async fn report_sync_progress(&self) {
        let info = self.daemon.cmd_any("getinfo", json!([])).await;
        let peers = self.daemon.cmd_any("getpeerinfo", json!([])).await;

        match (info, peers) {
            (Ok(info), Ok(peers)) => {
                let blocks = info.get("blocks").and_then(Value::as_u64).unwrap_or(0);

                match sync_progress(blocks, &peers) {
                    Some(percent) => {
                        info!("Waiting for daemon to sync: {percent:.2}% at block {blocks}")
                    }
                    None => info!("Waiting for daemon to sync: block {blocks}, no peers yet"),
                }
            }
            _ => warn!("Waiting for daemon to sync, progress unavailable"),
        }
    }

    /// A share arrived. Block candidates go to every daemon; acceptance is
    /// verified via `getblock` after a grace delay, recorded in the ledger,
    /// and answered with an immediate re-template. Returns whether new work
    /// was broadcast.
    async fn handle_share(&self, outcome: ShareOutcome) -> Result<bool> {
        if self.settings.print_high_shares && !outcome.is_block() {
            let ratio = outcome.share_diff / outcome.block_diff;
            if ratio > 0.5 {
                info!(
                    "High share {} from {}: {:.2}% of block difficulty",
                    outcome.block_hash_invalid.as_deref().unwrap_or_default(),
                    outcome.worker,
                    ratio * 100.0
                );
            }
        }

        let Some(block_hex) = outcome.block_hex.clone() else {
            return Ok(false);
        };

        let block_hash = outcome
            .block_hash
            .clone()
            .expect("block shares carry a hash");

        info!(
            "Candidate block {block_hash} at height {} found by {} ({})",
            outcome.height, outcome.worker, outcome.ip
        );

        if !self.submit_block(&block_hex).await {
            return Ok(false);
        }

        sleep(BLOCK_CHECK_DELAY).await;

        match self.check_block_accepted(&block_hash).await {
            Some(tx_hash) => {
                info!(
                    "Block {block_hash} accepted at height {}, reward {} via tx {tx_hash}",
                    outcome.height, outcome.block_reward
                );

                if let Err(err) = self
                    .ledger
                    .record(outcome.height, &outcome.worker.to_string())
                {
                    error!("Failed to record block in ledger: {err:#}");
                }
            }
            None => warn!("Block {block_hash} was not accepted by the network"),
        }

        Ok(self.refresh_template().await)
    }

    /// Broadcasts `submitblock`, aborting on the first instance that
    /// complains. Returns whether every instance took the block.
    async fn submit_block(&self, block_hex: &str) -> bool {
        for reply in self.daemon.cmd("submitblock", json!([block_hex])).await {
            match reply.result {
                Ok(value) => match classify_submit_reply(&value) {
                    SubmitVerdict::Accepted => {
                        info!("Daemon instance {} accepted the block", reply.instance);
                    }
                    SubmitVerdict::Rejected(reason) => {
                        error!(
                            "Daemon instance {} rejected the block: {reason}",
                            reply.instance
                        );
                        return false;
                    }
                    SubmitVerdict::Unexpected(raw) => {
                        error!(
                            "Daemon instance {} responded with something it shouldn't: {raw}",
                            reply.instance
                        );
                        return false;
                    }
                },
                Err(err) => {
                    error!("submitblock failed on instance {}: {err}", reply.instance);
                    return false;
                }
            }
        }

        true
    }

    /// Post-submit acceptance check: `getblock` must know the hash. Yields
    /// the coinbase txid on success.
    async fn check_block_accepted(&self, block_hash: &str) -> Option<String> {
        match self
            .daemon
            .cmd_any("getblock", json!([lookup_hash(block_hash)]))
            .await
        {
            Ok(block) => block
                .get("tx")
                .and_then(Value::as_array)
                .and_then(|txs| txs.first())
                .and_then(Value::as_str)
                .map(str::to_string),
            Err(err) => {
                warn!("getblock after submit failed: {err}");
                None
            }
        }
    }

    /// A block hash arrived over the fast path. If it is not already the
    /// parent of our current work, re-template after a short settling delay.
    async fn handle_block_notify(&self, hash: &str, source: &str) -> bool {
        let reversed = reverse_hex(hash).unwrap_or_else(|_| hash.to_string());

        if self
            .jobs
            .current_job()
            .is_some_and(|job| job.template.previous_block_hash == reversed)
        {
            return false;
        }

        info!("Block {reversed} announced via {source}, fetching new work");

        sleep(BLOCK_CHECK_DELAY).await;

        self.refresh_template().await
    }
}

async fn detect_coin_data(settings: &Settings, daemon: &DaemonClient) -> Result<CoinFacts> {
    let mut replies = daemon
        .batch_cmd(&[
            ("validateaddress", json!([settings.address])),
            ("getdifficulty", json!([])),
            ("getinfo", json!([])),
            ("getmininginfo", json!([])),
        ])
        .await
        .context("coin data probe failed")?;

    ensure!(replies.len() == 4, "coin data probe returned {} replies", replies.len());

    let mut take = |name: &str| {
        replies
            .remove(0)
            .with_context(|| format!("{name} failed during coin data probe"))
    };

    let validate = take("validateaddress")?;
    let difficulty = take("getdifficulty")?;
    let getinfo = take("getinfo")?;
    let mininginfo = take("getmininginfo")?;

    ensure!(
        validate.get("isvalid").and_then(Value::as_bool) == Some(true),
        "daemon reports pool address {} as invalid",
        settings.address
    );

    let network_difficulty = difficulty
        .as_f64()
        .or_else(|| mininginfo.get("difficulty").and_then(Value::as_f64))
        .unwrap_or(0.0);

    let pool_script = match &settings.pubkey {
        Some(pubkey) => coin::pay_to_pubkey_script(pubkey)?,
        None => coin::pay_to_address_script(&settings.address)?,
    };

    Ok(CoinFacts {
        reward: reward_kind(&getinfo),
        testnet: getinfo
            .get("testnet")
            .and_then(Value::as_bool)
            .unwrap_or(false),
        protocol_version: getinfo
            .get("protocolversion")
            .and_then(Value::as_u64)
            .unwrap_or(170_002) as u32,
        pool_script,
        network_difficulty,
        connections: getinfo
            .get("connections")
            .and_then(Value::as_u64)
            .unwrap_or(0),
    })
}

fn reward_kind(getinfo: &Value) -> RewardKind {
    match getinfo.get("staked") {
        Some(Value::Bool(true)) => RewardKind::Pos,
        Some(Value::Number(n)) if n.as_f64().unwrap_or(0.0) > 0.0 => RewardKind::Pos,
        _ => RewardKind::Pow,
    }
}

enum SubmitVerdict {
    Accepted,
    Rejected(String),
    Unexpected(String),
}

fn classify_submit_reply(reply: &Value) -> SubmitVerdict {
    match reply {
        Value::Null => SubmitVerdict::Accepted,
        Value::String(reason) => match reason.as_str() {
            "duplicate" => SubmitVerdict::Rejected(
                "duplicate - the node already has a valid copy of this block".into(),
            ),
            "duplicate-invalid" => SubmitVerdict::Rejected(
                "duplicate-invalid - the node already has this block, but it is invalid".into(),
            ),
            "duplicate-inconclusive" => SubmitVerdict::Rejected(
                "duplicate-inconclusive - the node already has this block but has not validated it"
                    .into(),
            ),
            "inconclusive" => SubmitVerdict::Rejected(
                "inconclusive - the node has not validated the block, it may not be on the active chain"
                    .into(),
            ),
            "rejected" => SubmitVerdict::Rejected("rejected - the block was rejected as invalid".into()),
            other => SubmitVerdict::Unexpected(other.into()),
        },
        other => SubmitVerdict::Unexpected(other.to_string()),
    }
}

/// Hashes that come back in little-endian order show a run of zero bytes at
/// the end instead of the leading zeros a displayed block hash has.
fn lookup_hash(block_hash: &str) -> String {
    if block_hash.ends_with("0000") {
        reverse_hex(block_hash).unwrap_or_else(|_| block_hash.to_string())
    } else {
        block_hash.to_string()
    }
}

fn sync_progress(blocks: u64, peers: &Value) -> Option<f64> {
    let best = peers
        .as_array()?
        .iter()
        .filter_map(|peer| peer.get("startingheight").and_then(Value::as_i64))
        .max()?;

    if best <= 0 {
        return None;
    }

    Some((blocks as f64 / best as f64 * 100.0).min(100.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_reply_is_accepted() {
        assert!(matches!(
            classify_submit_reply(&Value::Null),
            SubmitVerdict::Accepted
        ));
    }

    #[test]
    fn known_rejections_have_messages() {
        for reason in [
            "duplicate",
            "duplicate-invalid",
            "duplicate-inconclusive",
            "inconclusive",
            "rejected",
        ] {
            match classify_submit_reply(&json!(reason)) {
                SubmitVerdict::Rejected(message) => {
                    assert!(message.starts_with(reason), "message for {reason}")
                }
                _ => panic!("{reason} should be a rejection"),
            }
        }
    }

    #[test]
    fn anything_else_is_unexpected() {
        assert!(matches!(
            classify_submit_reply(&json!("weird")),
            SubmitVerdict::Unexpected(_)
        ));
        assert!(matches!(
            classify_submit_reply(&json!(42)),
            SubmitVerdict::Unexpected(_)
        ));
    }

    #[test]
    fn lookup_hash_reverses_little_endian_artifacts() {
        let display = format!("0000{}", "ab".repeat(30));
        assert_eq!(lookup_hash(&display), display, "display order passes through");

        let little_endian = format!("{}0000", "ab".repeat(30));
        assert_eq!(
            lookup_hash(&little_endian),
            format!("0000{}", "ab".repeat(30))
        );
    }

    #[test]
    fn sync_progress_uses_best_peer_height() {
        let peers = json!([
            {"startingheight": 1000},
            {"startingheight": 4000},
            {"startingheight": -1},
        ]);

        assert_eq!(sync_progress(1000, &peers), Some(25.0));
        assert_eq!(sync_progress(8000, &peers), Some(100.0), "clamped");
    }

    #[test]
    fn sync_progress_without_peers() {
        assert_eq!(sync_progress(10, &json!([])), None);
        assert_eq!(sync_progress(10, &json!([{"startingheight": 0}])), None);
        assert_eq!(sync_progress(10, &json!(null)), None);
    }

    #[test]
    fn reward_kind_from_staked_field() {
        assert_eq!(reward_kind(&json!({"staked": true})), RewardKind::Pos);
        assert_eq!(reward_kind(&json!({"staked": 1.5})), RewardKind::Pos);
        assert_eq!(reward_kind(&json!({"staked": false})), RewardKind::Pow);
        assert_eq!(reward_kind(&json!({"staked": 0})), RewardKind::Pow);
        assert_eq!(reward_kind(&json!({})), RewardKind::Pow);
    }
}
