use super::*;

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CoinSettings {
    pub(crate) name: String,
    pub(crate) symbol: String,
    pub(crate) peer_magic: String,
    #[serde(default)]
    pub(crate) peer_magic_testnet: Option<String>,
}

impl CoinSettings {
    pub(crate) fn magic(&self, testnet: bool) -> Result<[u8; 4]> {
        let magic = if testnet {
            self.peer_magic_testnet.as_deref().unwrap_or(&self.peer_magic)
        } else {
            &self.peer_magic
        };

        let bytes = hex::decode(magic).context("peer magic is not valid hex")?;

        bytes
            .as_slice()
            .try_into()
            .map_err(|_| anyhow!("peer magic must be 4 bytes, got {}", bytes.len()))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum RewardKind {
    Pow,
    Pos,
}

impl Display for RewardKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            RewardKind::Pow => write!(f, "POW"),
            RewardKind::Pos => write!(f, "POS"),
        }
    }
}

/// Facts established by probing the daemons at startup, flowing forward into
/// template construction and the P2P handshake.
#[derive(Clone, Debug)]
pub(crate) struct CoinFacts {
    pub(crate) reward: RewardKind,
    pub(crate) testnet: bool,
    pub(crate) protocol_version: u32,
    pub(crate) pool_script: Vec<u8>,
    pub(crate) network_difficulty: f64,
    pub(crate) connections: u64,
}

/// Extracts the 20 byte payload from a base58 address. Komodo transparent
/// addresses decode to 25 bytes, Zcash-style two-byte-version addresses to 26.
pub(crate) fn address_hash(address: &str) -> Result<[u8; 20]> {
    let decoded = base58::decode(address).context("address is not valid base58")?;

    ensure!(
        decoded.len() == 25 || decoded.len() == 26,
        "address must decode to 25 or 26 bytes, got {}",
        decoded.len()
    );

    Ok(decoded[decoded.len() - 24..decoded.len() - 4]
        .try_into()
        .expect("slice is 20 bytes"))
}

pub(crate) fn pay_to_address_script(address: &str) -> Result<Vec<u8>> {
    let hash = address_hash(address)?;

    Ok(Builder::new()
        .push_opcode(OP_DUP)
        .push_opcode(OP_HASH160)
        .push_slice(hash)
        .push_opcode(OP_EQUALVERIFY)
        .push_opcode(OP_CHECKSIG)
        .into_script()
        .into_bytes())
}

pub(crate) fn pay_to_pubkey_script(pubkey: &str) -> Result<Vec<u8>> {
    let bytes = hex::decode(pubkey).context("pubkey is not valid hex")?;

    let key: [u8; 33] = bytes
        .as_slice()
        .try_into()
        .map_err(|_| anyhow!("pubkey must be a 33 byte compressed key, got {}", bytes.len()))?;

    Ok(Builder::new()
        .push_slice(key)
        .push_opcode(OP_CHECKSIG)
        .into_script()
        .into_bytes())
}
