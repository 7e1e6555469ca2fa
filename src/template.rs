use super::*;

/// A `getblocktemplate` reply, plus the coinbase outputs decoded out of
/// `coinbasetxn.data` via `decoderawtransaction`.
#[derive(Clone, Debug, Deserialize)]
pub(crate) struct RpcTemplate {
    #[serde(rename = "previousblockhash")]
    pub(crate) previous_block_hash: String,
    #[serde(rename = "finalsaplingroothash")]
    pub(crate) final_sapling_root_hash: String,
    pub(crate) bits: String,
    pub(crate) curtime: u32,
    pub(crate) height: u32,
    pub(crate) version: u32,
    #[serde(default)]
    pub(crate) target: String,
    #[serde(default)]
    pub(crate) transactions: Vec<RpcTransaction>,
    pub(crate) coinbasetxn: CoinbaseTxn,
    #[serde(skip)]
    pub(crate) vouts: Vec<Vout>,
}

#[derive(Clone, Debug, Deserialize)]
pub(crate) struct RpcTransaction {
    pub(crate) data: String,
    pub(crate) hash: String,
    #[serde(default)]
    pub(crate) fee: i64,
}

#[derive(Clone, Debug, Deserialize)]
pub(crate) struct CoinbaseTxn {
    #[serde(rename = "coinbasevalue")]
    pub(crate) coinbase_value: u64,
    pub(crate) data: String,
}

#[derive(Clone, Debug, Deserialize)]
pub(crate) struct Vout {
    #[serde(rename = "valueZat", default)]
    pub(crate) value_zat: u64,
    #[serde(rename = "scriptPubKey")]
    pub(crate) script_pub_key: ScriptPubKey,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub(crate) struct ScriptPubKey {
    #[serde(rename = "type", default)]
    pub(crate) kind: String,
    #[serde(default)]
    pub(crate) addresses: Vec<String>,
    #[serde(default)]
    pub(crate) hex: Option<String>,
}

impl RpcTemplate {
    /// Attaches the outputs from a `decoderawtransaction` reply for the
    /// template's `coinbasetxn.data`.
    pub(crate) fn attach_vouts(&mut self, decoded: &Value) -> Result {
        let vouts = decoded
            .get("vout")
            .context("decoded coinbase transaction has no vout array")?;

        self.vouts = serde_json::from_value(vouts.clone())
            .context("failed to parse decoded coinbase outputs")?;

        ensure!(
            !self.vouts.is_empty(),
            "decoded coinbase transaction has no outputs"
        );

        Ok(())
    }
}
