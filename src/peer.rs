use {
    super::*,
    tokio::io::{AsyncReadExt, AsyncWriteExt},
};

const HEADER_SIZE: usize = 24;
const MAX_PAYLOAD_SIZE: usize = 4 * 1024 * 1024;
const INV_BLOCK: u32 = 2;
const NODE_NETWORK: u64 = 1;
const RECONNECT_DELAY: Duration = Duration::from_secs(10);

/// Minimal Bitcoin-wire participant: one outbound connection, a
/// version/verack handshake, `ping` kept alive, and block `inv` entries
/// surfaced as hex hashes on the notify channel.
pub(crate) struct Peer {
    magic: [u8; 4],
    host: String,
    port: u16,
    protocol_version: u32,
    disable_transactions: bool,
    block_tx: mpsc::Sender<String>,
}

impl Peer {
    pub(crate) fn new(
        magic: [u8; 4],
        p2p: &P2pSettings,
        protocol_version: u32,
        block_tx: mpsc::Sender<String>,
    ) -> Self {
        Self {
            magic,
            host: p2p.host.clone(),
            port: p2p.port,
            protocol_version,
            disable_transactions: p2p.disable_transactions,
            block_tx,
        }
    }

    pub(crate) async fn run(self, cancel_token: CancellationToken) {
        let mut ever_handshaken = false;

        while !cancel_token.is_cancelled() {
            match self.session(&cancel_token).await {
                Ok(true) => {
                    ever_handshaken = true;
                    info!("P2P peer {}:{} went away, reconnecting", self.host, self.port);
                }
                Ok(false) if ever_handshaken => {
                    warn!("P2P peer {}:{} dropped us mid-handshake", self.host, self.port);
                }
                Ok(false) => {
                    error!(
                        "Connection rejected by p2p peer {}:{} before verack",
                        self.host, self.port
                    );
                    return;
                }
                Err(err) if ever_handshaken => {
                    warn!("P2P connection error: {err:#}");
                }
                Err(err) => {
                    error!("P2P connection failed: {err:#}");
                    return;
                }
            }

            tokio::select! {
                _ = cancel_token.cancelled() => break,
                _ = sleep(RECONNECT_DELAY) => {}
            }
        }
    }

    /// One connection lifetime. Returns whether the handshake completed.
    async fn session(&self, cancel_token: &CancellationToken) -> Result<bool> {
        let mut stream = TcpStream::connect((self.host.as_str(), self.port))
            .await
            .with_context(|| format!("p2p connect to {}:{} failed", self.host, self.port))?;

        debug!("P2P connected to {}:{}", self.host, self.port);

        let nonce = rand::rng().random::<u64>();
        let version = version_payload(self.protocol_version, nonce, self.disable_transactions);
        stream.write_all(&frame(&self.magic, "version", &version)).await?;

        let mut framer = Framer::new(self.magic);
        let mut verack = false;
        let mut buf = [0u8; 4096];

        loop {
            let n = tokio::select! {
                _ = cancel_token.cancelled() => return Ok(verack),
                n = stream.read(&mut buf) => n?,
            };

            if n == 0 {
                return Ok(verack);
            }

            for (command, payload) in framer.push(&buf[..n]) {
                match command.as_str() {
                    "version" => {
                        stream.write_all(&frame(&self.magic, "verack", &[])).await?;
                    }
                    "verack" => {
                        info!("P2P handshake with {}:{} complete", self.host, self.port);
                        verack = true;
                    }
                    "ping" => {
                        stream.write_all(&frame(&self.magic, "pong", &payload)).await?;
                    }
                    "inv" => {
                        for hash in block_hashes_from_inv(&payload)? {
                            debug!("P2P inv block {hash}");
                            if self.block_tx.send(hash).await.is_err() {
                                return Ok(verack);
                            }
                        }
                    }
                    command => {
                        debug!("Ignoring p2p message {command} ({} bytes)", payload.len());
                    }
                }
            }
        }
    }
}

/// Reassembles `magic ‖ command ‖ length ‖ checksum ‖ payload` frames from a
/// byte stream. A magic mismatch shifts one byte at a time until it locks on
/// again; a checksum mismatch throws the whole buffer away.
pub(crate) struct Framer {
    magic: [u8; 4],
    buffer: Vec<u8>,
}

impl Framer {
    pub(crate) fn new(magic: [u8; 4]) -> Self {
        Self {
            magic,
            buffer: Vec::new(),
        }
    }

    pub(crate) fn push(&mut self, bytes: &[u8]) -> Vec<(String, Vec<u8>)> {
        self.buffer.extend_from_slice(bytes);

        let mut messages = Vec::new();

        loop {
            if self.buffer.len() < HEADER_SIZE {
                break;
            }

            if self.buffer[..4] != self.magic {
                self.buffer.remove(0);
                continue;
            }

            let length = u32::from_le_bytes(
                self.buffer[16..20].try_into().expect("slice is 4 bytes"),
            ) as usize;

            if length > MAX_PAYLOAD_SIZE {
                warn!("Oversized p2p frame of {length} bytes, resyncing");
                self.buffer.clear();
                break;
            }

            if self.buffer.len() < HEADER_SIZE + length {
                break;
            }

            let payload = self.buffer[HEADER_SIZE..HEADER_SIZE + length].to_vec();

            if sha256d_hash(&payload)[..4] != self.buffer[20..24] {
                warn!("P2P checksum mismatch, resyncing");
                self.buffer.clear();
                break;
            }

            let command = String::from_utf8_lossy(&self.buffer[4..16])
                .trim_end_matches('\0')
                .to_string();

            self.buffer.drain(..HEADER_SIZE + length);
            messages.push((command, payload));
        }

        messages
    }
}

pub(crate) fn frame(magic: &[u8; 4], command: &str, payload: &[u8]) -> Vec<u8> {
    let mut message = Vec::with_capacity(HEADER_SIZE + payload.len());

    message.extend_from_slice(magic);

    let mut name = [0u8; 12];
    name[..command.len()].copy_from_slice(command.as_bytes());
    message.extend_from_slice(&name);

    message.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    message.extend_from_slice(&sha256d_hash(payload)[..4]);
    message.extend_from_slice(payload);

    message
}

fn version_payload(protocol_version: u32, nonce: u64, disable_transactions: bool) -> Vec<u8> {
    let mut payload = Vec::with_capacity(122);

    payload.extend_from_slice(&protocol_version.to_le_bytes());
    payload.extend_from_slice(&NODE_NETWORK.to_le_bytes());
    payload.extend_from_slice(&(unix_time() as i64).to_le_bytes());

    // two zeroed netaddrs: services + ip + port each
    payload.extend_from_slice(&[0u8; 26]);
    payload.extend_from_slice(&[0u8; 26]);

    payload.extend_from_slice(&nonce.to_le_bytes());

    payload.extend_from_slice(&var_int(USER_AGENT.len() as u64));
    payload.extend_from_slice(USER_AGENT.as_bytes());

    // block start height
    payload.extend_from_slice(&0u32.to_le_bytes());

    if disable_transactions {
        payload.push(0);
    }

    payload
}

fn block_hashes_from_inv(payload: &[u8]) -> Result<Vec<String>> {
    let (count, consumed): (VarInt, usize) =
        bitcoin::consensus::deserialize_partial(payload).context("bad inv count")?;

    let mut hashes = Vec::new();
    let mut offset = consumed;

    for _ in 0..count.0 {
        ensure!(payload.len() >= offset + 36, "truncated inv entry");

        let kind = u32::from_le_bytes(
            payload[offset..offset + 4]
                .try_into()
                .expect("slice is 4 bytes"),
        );

        if kind == INV_BLOCK {
            hashes.push(hex::encode(&payload[offset + 4..offset + 36]));
        }

        offset += 36;
    }

    Ok(hashes)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAGIC: [u8; 4] = [0xf9, 0xee, 0xe4, 0x8d];

    #[test]
    fn frame_layout() {
        let message = frame(&MAGIC, "ping", &[1, 2, 3, 4]);

        assert_eq!(&message[..4], &MAGIC);
        assert_eq!(&message[4..16], b"ping\0\0\0\0\0\0\0\0");
        assert_eq!(&message[16..20], &4u32.to_le_bytes());
        assert_eq!(&message[20..24], &sha256d_hash(&[1, 2, 3, 4])[..4]);
        assert_eq!(&message[24..], &[1, 2, 3, 4]);
    }

    #[test]
    fn framer_roundtrip() {
        let mut framer = Framer::new(MAGIC);

        let messages = framer.push(&frame(&MAGIC, "verack", &[]));

        assert_eq!(messages, vec![("verack".to_string(), Vec::new())]);
    }

    #[test]
    fn framer_handles_partial_and_batched_input() {
        let mut framer = Framer::new(MAGIC);

        let mut bytes = frame(&MAGIC, "ping", &[9, 9]);
        bytes.extend_from_slice(&frame(&MAGIC, "pong", &[8, 8]));

        assert!(framer.push(&bytes[..10]).is_empty());
        let messages = framer.push(&bytes[10..]);

        assert_eq!(
            messages,
            vec![
                ("ping".to_string(), vec![9, 9]),
                ("pong".to_string(), vec![8, 8]),
            ]
        );
    }

    #[test]
    fn framer_resyncs_past_garbage() {
        let mut framer = Framer::new(MAGIC);

        let mut bytes = vec![0x00, 0x01, 0x02];
        bytes.extend_from_slice(&frame(&MAGIC, "verack", &[]));

        assert_eq!(
            framer.push(&bytes),
            vec![("verack".to_string(), Vec::new())]
        );
    }

    #[test]
    fn framer_discards_buffer_on_checksum_mismatch() {
        let mut framer = Framer::new(MAGIC);

        let mut corrupted = frame(&MAGIC, "ping", &[1, 2, 3, 4]);
        corrupted[20] ^= 0xff;
        corrupted.extend_from_slice(&frame(&MAGIC, "pong", &[5]));

        assert!(framer.push(&corrupted).is_empty());

        // a later clean frame still parses
        assert_eq!(
            framer.push(&frame(&MAGIC, "verack", &[])),
            vec![("verack".to_string(), Vec::new())]
        );
    }

    #[test]
    fn version_payload_layout() {
        let payload = version_payload(170_002, 0x1122334455667788, true);

        assert_eq!(&payload[..4], &170_002u32.to_le_bytes());
        assert_eq!(&payload[4..12], &NODE_NETWORK.to_le_bytes());
        assert_eq!(&payload[20..72], &[0u8; 52], "zeroed netaddrs");
        assert_eq!(&payload[72..80], &0x1122334455667788u64.to_le_bytes());
        assert_eq!(payload[80] as usize, USER_AGENT.len());
        assert_eq!(&payload[81..81 + USER_AGENT.len()], USER_AGENT.as_bytes());
        assert_eq!(
            &payload[81 + USER_AGENT.len()..85 + USER_AGENT.len()],
            &0u32.to_le_bytes()
        );
        assert_eq!(payload.last(), Some(&0), "no-relay byte present");

        let without_relay = version_payload(170_002, 1, false);
        assert_eq!(without_relay.len(), payload.len() - 1);
    }

    #[test]
    fn inv_yields_only_block_hashes() {
        let mut payload = var_int(2);

        payload.extend_from_slice(&1u32.to_le_bytes());
        payload.extend_from_slice(&[0xaa; 32]);

        payload.extend_from_slice(&INV_BLOCK.to_le_bytes());
        payload.extend_from_slice(&[0xbb; 32]);

        assert_eq!(
            block_hashes_from_inv(&payload).unwrap(),
            vec!["bb".repeat(32)]
        );
    }

    #[test]
    fn truncated_inv_errors() {
        let mut payload = var_int(1);
        payload.extend_from_slice(&INV_BLOCK.to_le_bytes());
        payload.extend_from_slice(&[0xbb; 16]);

        assert!(block_hashes_from_inv(&payload).is_err());
    }
}
