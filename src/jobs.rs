use super::*;

/// A miner's `mining.submit`, resolved against the client's state.
#[derive(Debug, Clone)]
pub(crate) struct Submission {
    pub(crate) job_id: String,
    pub(crate) extranonce1: String,
    pub(crate) extranonce2: String,
    pub(crate) ntime: String,
    pub(crate) solution: String,
    pub(crate) difficulty: f64,
    pub(crate) previous_difficulty: Option<f64>,
    pub(crate) ip: String,
    pub(crate) port: u16,
    pub(crate) worker: Username,
}

/// What became of an accepted share. `block_hex` is the side channel the
/// orchestrator submits downstream; the miner only ever sees `result: true`.
#[derive(Debug, Clone)]
pub(crate) struct ShareOutcome {
    pub(crate) worker: Username,
    pub(crate) ip: String,
    pub(crate) port: u16,
    pub(crate) height: u32,
    pub(crate) block_reward: u64,
    pub(crate) difficulty: f64,
    pub(crate) share_diff: f64,
    pub(crate) block_diff: f64,
    pub(crate) block_hash: Option<String>,
    pub(crate) block_hash_invalid: Option<String>,
    pub(crate) block_hex: Option<String>,
}

impl ShareOutcome {
    pub(crate) fn is_block(&self) -> bool {
        self.block_hex.is_some()
    }
}

#[derive(Default)]
struct State {
    current: Option<Arc<Job>>,
    valid: HashMap<JobId, Arc<Job>>,
}

/// Owns the template lifecycle: which jobs are still valid, the extranonce
/// and job-id counters, and share validation. Job updates go out over a
/// watch channel every connection subscribes to.
pub(crate) struct JobManager {
    settings: Arc<Settings>,
    pool_script: Vec<u8>,
    extranonce_counter: ExtraNonceCounter,
    job_counter: JobCounter,
    state: Mutex<State>,
    update_tx: watch::Sender<Option<JobUpdate>>,
}

impl JobManager {
    pub(crate) fn new(settings: Arc<Settings>, pool_script: Vec<u8>) -> Self {
        let (update_tx, _) = watch::channel(None);

        Self {
            settings,
            pool_script,
            extranonce_counter: ExtraNonceCounter::new(),
            job_counter: JobCounter::new(),
            state: Mutex::new(State::default()),
            update_tx,
        }
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<Option<JobUpdate>> {
        self.update_tx.subscribe()
    }

    pub(crate) fn next_extranonce1(&self) -> String {
        self.extranonce_counter.next()
    }

    pub(crate) fn extranonce2_size(&self) -> usize {
        NONCE_SIZE - self.extranonce_counter.size()
    }

    pub(crate) fn current_job(&self) -> Option<Arc<Job>> {
        self.state.lock().expect("job state lock poisoned").current.clone()
    }

    pub(crate) fn current_update(&self) -> Option<JobUpdate> {
        self.update_tx.borrow().clone()
    }

    /// Folds a fresh template into the job state. Returns whether a new block
    /// was processed, which is what cascades network difficulty into vardiff.
    pub(crate) fn process_template(&self, template: RpcTemplate) -> Result<bool> {
        let mut state = self.state.lock().expect("job state lock poisoned");

        let Some(current) = state.current.clone() else {
            return self.install_new_block(&mut state, template);
        };

        if template.previous_block_hash != current.template.previous_block_hash
            && template.height < current.template.height
        {
            debug!(
                "Ignoring stale template for height {} behind {}",
                template.height, current.template.height
            );
            return Ok(false);
        }

        if template.height == current.template.height && template.target != current.template.target
        {
            let old_difficulty = current.difficulty;
            let job = self.install_update(&mut state, template)?;

            if self.settings.print_current_diff {
                info!(
                    "Difficulty changed from {old_difficulty} to {} at height {}",
                    job.difficulty, job.template.height
                );
            }

            return Ok(false);
        }

        if template.height != current.template.height {
            return self.install_new_block(&mut state, template);
        }

        self.install_update(&mut state, template)?;

        Ok(false)
    }

    /// Re-templates the same block under a fresh job id, typically to force a
    /// rebroadcast after `jobRebroadcastTimeout` went by without new work.
    pub(crate) fn update_current_job(&self, template: RpcTemplate) -> Result {
        let mut state = self.state.lock().expect("job state lock poisoned");
        self.install_update(&mut state, template)?;
        Ok(())
    }

    fn install_new_block(&self, state: &mut State, template: RpcTemplate) -> Result<bool> {
        let job = Arc::new(Job::new(
            self.job_counter.next(),
            template,
            &self.pool_script,
        )?);

        state.valid.clear();
        state.valid.insert(job.job_id, job.clone());
        state.current = Some(job.clone());

        if self.settings.print_new_work {
            let fees = job.template.transactions.iter().map(|tx| tx.fee).sum::<i64>();
            info!(
                "New work at height {} diff {} merkle {} ({} txs, {} fees)",
                job.template.height,
                job.difficulty,
                job.merkle_root,
                job.template.transactions.len(),
                fees,
            );
        }

        self.update_tx.send_replace(Some(JobUpdate {
            job,
            clean_jobs: true,
        }));

        Ok(true)
    }

    fn install_update(&self, state: &mut State, template: RpcTemplate) -> Result<Arc<Job>> {
        let job = Arc::new(Job::new(
            self.job_counter.next(),
            template,
            &self.pool_script,
        )?);

        state.valid.insert(job.job_id, job.clone());
        state.current = Some(job.clone());

        self.update_tx.send_replace(Some(JobUpdate {
            job: job.clone(),
            clean_jobs: false,
        }));

        Ok(job)
    }

    /// The submit validation ladder. Fails with the first applicable wire
    /// error; success yields the share event payload, with the serialized
    /// block attached when the hash meets the network target.
    pub(crate) fn process_share(
        &self,
        submission: &Submission,
    ) -> Result<ShareOutcome, StratumError> {
        let submit_time = unix_time();

        let job = submission
            .job_id
            .parse::<JobId>()
            .ok()
            .and_then(|job_id| {
                self.state
                    .lock()
                    .expect("job state lock poisoned")
                    .valid
                    .get(&job_id)
                    .cloned()
            })
            .ok_or(StratumError::JobNotFound)?;

        if submission.ntime.len() != 8 {
            return Err(StratumError::IncorrectNtimeSize);
        }

        let ntime = submission
            .ntime
            .parse::<Ntime>()
            .map_err(|_| StratumError::InvalidNtime)?;

        let ntime_value = u64::from(u32::from(ntime));
        if ntime_value < u64::from(job.template.curtime)
            || ntime_value > submit_time + NTIME_FORWARD_SLACK
        {
            return Err(StratumError::NtimeOutOfRange);
        }

        let nonce_hex = format!("{}{}", submission.extranonce1, submission.extranonce2);
        if nonce_hex.len() != NONCE_SIZE * 2 {
            return Err(StratumError::IncorrectNonceSize);
        }

        let nonce = nonce_hex
            .parse::<Nonce>()
            .map_err(|_| StratumError::IncorrectNonceSize)?;

        if submission.solution.len() != SOLUTION_HEX_SIZE {
            return Err(StratumError::IncorrectSolutionSize);
        }

        let solution = submission
            .solution
            .parse::<Solution>()
            .map_err(|_| StratumError::IncorrectSolutionSize)?;

        let header = job.serialize_header(ntime, &nonce);
        let header_hex = hex::encode(header);

        if !job.register_submit(&header_hex, &submission.solution) {
            return Err(StratumError::DuplicateShare);
        }

        let mut preimage = header.to_vec();
        preimage.extend_from_slice(solution.as_bytes());
        let header_hash = sha256d_hash(&preimage);

        let share_diff = share_difficulty(&header_hash);

        let mut outcome = ShareOutcome {
            worker: submission.worker.clone(),
            ip: submission.ip.clone(),
            port: submission.port,
            height: job.template.height,
            block_reward: job.template.coinbasetxn.coinbase_value,
            difficulty: submission.difficulty,
            share_diff,
            block_diff: job.difficulty,
            block_hash: None,
            block_hash_invalid: None,
            block_hex: None,
        };

        if U256::from_little_endian(&header_hash) <= job.target {
            outcome.block_hex = Some(hex::encode(job.serialize_block(&header, &solution)));
            outcome.block_hash = Some(hex::encode(reverse_bytes(&header_hash)));

            debug!(
                "Hash {} meets target {} (coinbase {})",
                outcome.block_hash.as_deref().unwrap_or_default(),
                target_to_hex(job.target),
                hex::encode(job.gen_tx_hash),
            );

            return Ok(outcome);
        }

        outcome.block_hash_invalid = Some(hex::encode(reverse_bytes(&header_hash)));

        if share_diff / submission.difficulty < 0.99 {
            // a vardiff retarget may have just lowered the client's target
            match submission.previous_difficulty {
                Some(previous) if share_diff >= previous => outcome.difficulty = previous,
                _ => {
                    return Err(StratumError::LowDifficultyShare {
                        difficulty: share_diff,
                    })
                }
            }
        }

        Ok(outcome)
    }
}
