use super::*;

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Settings {
    pub(crate) coin: CoinSettings,
    pub(crate) address: String,
    #[serde(default)]
    pub(crate) pubkey: Option<String>,
    pub(crate) daemons: Vec<DaemonSettings>,
    pub(crate) ports: BTreeMap<u16, PortSettings>,
    #[serde(default)]
    pub(crate) p2p: Option<P2pSettings>,
    #[serde(default = "defaults::block_refresh_interval")]
    pub(crate) block_refresh_interval: i64,
    #[serde(default = "defaults::job_rebroadcast_timeout")]
    pub(crate) job_rebroadcast_timeout: u64,
    #[serde(default = "defaults::connection_timeout")]
    pub(crate) connection_timeout: u64,
    #[serde(default, deserialize_with = "boolish")]
    pub(crate) min_diff_adjust: bool,
    #[serde(default)]
    pub(crate) print_shares: bool,
    #[serde(default)]
    pub(crate) print_high_shares: bool,
    #[serde(default)]
    pub(crate) print_current_diff: bool,
    #[serde(default)]
    pub(crate) print_new_work: bool,
    #[serde(default)]
    pub(crate) print_nethash: bool,
    #[serde(default)]
    pub(crate) print_var_diff_adjust: bool,
    #[serde(default)]
    pub(crate) tcp_proxy_protocol: bool,
}

#[derive(Clone, Debug, Deserialize)]
pub(crate) struct DaemonSettings {
    pub(crate) host: String,
    pub(crate) port: u16,
    pub(crate) user: String,
    pub(crate) password: String,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PortSettings {
    pub(crate) diff: f64,
    #[serde(default)]
    pub(crate) var_diff: Option<VarDiffSettings>,
}

#[derive(Clone, Copy, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct VarDiffSettings {
    pub(crate) target_time: f64,
    pub(crate) retarget_time: f64,
    pub(crate) variance_percent: f64,
    pub(crate) min_diff: f64,
    pub(crate) max_diff: f64,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct P2pSettings {
    #[serde(default)]
    pub(crate) enabled: bool,
    pub(crate) host: String,
    pub(crate) port: u16,
    #[serde(default)]
    pub(crate) disable_transactions: bool,
}

mod defaults {
    pub(super) fn block_refresh_interval() -> i64 {
        60
    }

    pub(super) fn job_rebroadcast_timeout() -> u64 {
        55
    }

    pub(super) fn connection_timeout() -> u64 {
        600
    }
}

/// Older configs carry booleans as strings, so accept both.
fn boolish<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Wire {
        Bool(bool),
        String(String),
    }

    Ok(match Wire::deserialize(deserializer)? {
        Wire::Bool(value) => value,
        Wire::String(value) => matches!(value.to_lowercase().as_str(), "true" | "1" | "yes"),
    })
}

impl Settings {
    pub(crate) fn load(path: &Path) -> Result<Self> {
        let document = fs::read_to_string(path)
            .with_context(|| format!("failed to read config from {}", path.display()))?;

        let settings = serde_json::from_str::<Settings>(&document)
            .with_context(|| format!("failed to parse config from {}", path.display()))?;

        settings.validate()?;

        Ok(settings)
    }

    fn validate(&self) -> Result {
        ensure!(!self.daemons.is_empty(), "config needs at least one daemon");
        ensure!(!self.ports.is_empty(), "config needs at least one port");

        coin::address_hash(&self.address)
            .with_context(|| format!("invalid pool address {}", self.address))?;

        if let Some(pubkey) = &self.pubkey {
            ensure!(
                pubkey.len() == 66 && hex::decode(pubkey).is_ok(),
                "pubkey must be a 66 character hex encoded compressed public key"
            );
        }

        Ok(())
    }

    /// Template polling cadence; `None` when polling is disabled.
    pub(crate) fn block_refresh_interval(&self) -> Option<Duration> {
        (self.block_refresh_interval > 0)
            .then(|| Duration::from_secs(self.block_refresh_interval as u64))
    }

    pub(crate) fn job_rebroadcast_timeout(&self) -> Duration {
        Duration::from_secs(self.job_rebroadcast_timeout)
    }

    pub(crate) fn connection_timeout(&self) -> Duration {
        Duration::from_secs(self.connection_timeout)
    }

    pub(crate) fn p2p(&self) -> Option<&P2pSettings> {
        self.p2p.as_ref().filter(|p2p| p2p.enabled)
    }
}


#[cfg(test)]
mod tests {
    use {super::*, test_support::*};

    #[test]
    fn parses_full_document() {
        let settings = sample_settings();

        assert_eq!(settings.coin.symbol, "KMD");
        assert_eq!(settings.daemons.len(), 1);
        assert_eq!(settings.ports.len(), 1);
        assert_eq!(
            settings.block_refresh_interval(),
            Some(Duration::from_secs(29))
        );
        assert_eq!(settings.job_rebroadcast_timeout(), Duration::from_secs(55));
        assert_eq!(settings.connection_timeout(), Duration::from_secs(600));
        assert!(settings.min_diff_adjust);
        assert!(settings.print_shares);
        assert!(!settings.print_new_work);
        assert!(!settings.tcp_proxy_protocol);

        let port = settings.ports.get(&3857).unwrap();
        assert_eq!(port.diff, 0.1);
        assert_eq!(port.var_diff.unwrap().target_time, 15.0);
    }

    #[test]
    fn boolish_accepts_strings_and_bools() {
        for (value, expected) in [
            (r#""true""#, true),
            (r#""1""#, true),
            (r#""yes""#, true),
            (r#""false""#, false),
            (r#""0""#, false),
            ("true", true),
            ("false", false),
        ] {
            let document = sample_config().replace(r#""true""#, value);
            let settings = serde_json::from_str::<Settings>(&document).unwrap();
            assert_eq!(settings.min_diff_adjust, expected, "minDiffAdjust {value}");
        }
    }

    #[test]
    fn zero_refresh_interval_disables_polling() {
        let document = sample_config().replace(r#""blockRefreshInterval": 29"#, r#""blockRefreshInterval": 0"#);
        let settings = serde_json::from_str::<Settings>(&document).unwrap();
        assert_eq!(settings.block_refresh_interval(), None);
    }

    #[test]
    fn p2p_requires_enabled_flag() {
        let settings = sample_settings();
        assert!(settings.p2p().is_some());

        let document = sample_config().replace(r#""enabled": true"#, r#""enabled": false"#);
        let settings = serde_json::from_str::<Settings>(&document).unwrap();
        assert!(settings.p2p().is_none());
    }

    #[test]
    fn validate_rejects_empty_daemons() {
        let document = sample_config().replace(
            r#"[{"host": "127.0.0.1", "port": 7771, "user": "user", "password": "pass"}]"#,
            "[]",
        );
        let settings = serde_json::from_str::<Settings>(&document).unwrap();
        assert!(settings.validate().is_err());
    }

    #[test]
    fn validate_rejects_bad_address() {
        let mut settings = sample_settings();
        settings.address = "not-an-address-0OIl".into();
        assert!(settings.validate().is_err());
    }

    #[test]
    fn validate_rejects_bad_pubkey() {
        let mut settings = sample_settings();
        settings.pubkey = Some("02abcd".into());
        assert!(settings.validate().is_err());
    }
}
