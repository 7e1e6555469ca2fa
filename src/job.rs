use super::*;

/// Everything broadcast alongside a job: the job itself and whether miners
/// should drop work in progress.
#[derive(Clone, Debug)]
pub(crate) struct JobUpdate {
    pub(crate) job: Arc<Job>,
    pub(crate) clean_jobs: bool,
}

/// A block template annotated with a job id and every derived binary
/// artifact share validation needs: the coinbase, the merkle root, the
/// byte-reversed header fields, and the 256-bit target.
#[derive(Debug)]
pub(crate) struct Job {
    pub(crate) job_id: JobId,
    pub(crate) template: RpcTemplate,
    pub(crate) gen_tx: Vec<u8>,
    pub(crate) gen_tx_hash: [u8; 32],
    pub(crate) merkle_root: String,
    pub(crate) merkle_root_reversed: [u8; 32],
    pub(crate) prev_hash_reversed: [u8; 32],
    pub(crate) hash_reserved: [u8; 32],
    pub(crate) bits_reversed: [u8; 4],
    pub(crate) target: U256,
    pub(crate) difficulty: f64,
    tx_data: Vec<Vec<u8>>,
    notify: Notify,
    submits: Mutex<HashSet<String>>,
}

impl Job {
    pub(crate) fn new(job_id: JobId, template: RpcTemplate, pool_script: &[u8]) -> Result<Self> {
        let gen_tx = coinbase::build_coinbase(&template, pool_script)?;

        let gen_tx_hash_reversed = sha256d_hash(&gen_tx);
        let mut gen_tx_hash = gen_tx_hash_reversed;
        gen_tx_hash.reverse();

        // leaves in canonical byte order: transaction hashes arrive in
        // display order and flip here
        let mut leaves = vec![gen_tx_hash_reversed];
        let mut tx_data = Vec::with_capacity(template.transactions.len());

        for tx in &template.transactions {
            leaves.push(hash32_reversed(&tx.hash)?);
            tx_data.push(hex::decode(&tx.data).context("transaction data is not valid hex")?);
        }

        let merkle_root_reversed = merkle::merkle_root(leaves);
        let merkle_root = hex::encode(reverse_bytes(&merkle_root_reversed));

        let prev_hash_reversed = hash32_reversed(&template.previous_block_hash)?;
        let hash_reserved = hash32_reversed(&template.final_sapling_root_hash)?;

        let bits_reversed: [u8; 4] = reverse_bytes(
            &hex::decode(&template.bits).context("template bits is not valid hex")?,
        )
        .try_into()
        .map_err(|_| anyhow!("template bits must be 4 bytes"))?;

        let target = if template.target.is_empty() {
            difficulty::target_from_compact(
                u32::from_str_radix(&template.bits, 16).context("template bits is not hex")?,
            )
        } else {
            U256::from_big_endian(
                hex::decode(&template.target)
                    .context("template target is not valid hex")?
                    .as_slice(),
            )
        };

        let difficulty = difficulty_for_target(target);

        let notify = Notify {
            job_id,
            version: hex::encode(template.version.to_le_bytes()),
            prev_hash: hex::encode(prev_hash_reversed),
            merkle_root: hex::encode(merkle_root_reversed),
            hash_reserved: hex::encode(hash_reserved),
            ntime: hex::encode(template.curtime.to_le_bytes()),
            bits: hex::encode(bits_reversed),
            clean_jobs: false,
        };

        Ok(Self {
            job_id,
            template,
            gen_tx,
            gen_tx_hash,
            merkle_root,
            merkle_root_reversed,
            prev_hash_reversed,
            hash_reserved,
            bits_reversed,
            target,
            difficulty,
            tx_data,
            notify,
            submits: Mutex::new(HashSet::new()),
        })
    }

    /// The cached `mining.notify` params with the clean-jobs flag applied.
    pub(crate) fn notify(&self, clean_jobs: bool) -> Notify {
        Notify {
            clean_jobs,
            ..self.notify.clone()
        }
    }

    /// The 140-byte Equihash block header.
    pub(crate) fn serialize_header(&self, ntime: Ntime, nonce: &Nonce) -> [u8; 140] {
        let mut header = [0u8; 140];

        header[0..4].copy_from_slice(&self.template.version.to_le_bytes());
        header[4..36].copy_from_slice(&self.prev_hash_reversed);
        header[36..68].copy_from_slice(&self.merkle_root_reversed);
        header[68..100].copy_from_slice(&self.hash_reserved);
        header[100..104].copy_from_slice(&ntime.to_le_bytes());
        header[104..108].copy_from_slice(&self.bits_reversed);
        header[108..140].copy_from_slice(nonce.as_bytes());

        header
    }

    /// `header ‖ solution ‖ varint(tx count) ‖ coinbase ‖ transactions…`;
    /// the solution keeps the compact-size prefix it was submitted with.
    pub(crate) fn serialize_block(&self, header: &[u8; 140], solution: &Solution) -> Vec<u8> {
        let mut block = Vec::with_capacity(
            140 + solution.as_bytes().len()
                + 9
                + self.gen_tx.len()
                + self.tx_data.iter().map(Vec::len).sum::<usize>(),
        );

        block.extend_from_slice(header);
        block.extend_from_slice(solution.as_bytes());
        block.extend_from_slice(&var_int(1 + self.tx_data.len() as u64));
        block.extend_from_slice(&self.gen_tx);

        for data in &self.tx_data {
            block.extend_from_slice(data);
        }

        block
    }

    /// Records a submission, returning whether it was new. At most one
    /// acceptance per `header ‖ solution` pair.
    pub(crate) fn register_submit(&self, header_hex: &str, solution_hex: &str) -> bool {
        let submission = format!("{header_hex}{solution_hex}").to_lowercase();

        self.submits
            .lock()
            .expect("submit set lock poisoned")
            .insert(submission)
    }
}

fn hash32_reversed(display_hex: &str) -> Result<[u8; 32]> {
    let mut bytes: [u8; 32] = hex::decode(display_hex)
        .context("hash is not valid hex")?
        .try_into()
        .map_err(|_| anyhow!("hash must be 32 bytes"))?;

    bytes.reverse();

    Ok(bytes)
}
