use super::*;

/// Append-only record of blocks the pool found, at
/// `logs/<SYMBOL>_blocks.json`. Created with `[]` on demand; rewrites land
/// via a temp file rename so dashboard readers never see a torn write.
pub(crate) struct Ledger {
    path: PathBuf,
}

impl Ledger {
    pub(crate) fn new(directory: &Path, symbol: &str) -> Self {
        Self {
            path: directory.join(format!("{symbol}_blocks.json")),
        }
    }

    pub(crate) fn record(&self, height: u32, finder: &str) -> Result {
        let mut entries = self.read()?;

        entries.push(json!({
            "block": height,
            "finder": finder,
            "date": now_millis(),
        }));

        let serialized = serde_json::to_string_pretty(&entries)?;

        let temp = self.path.with_extension("json.tmp");
        fs::write(&temp, serialized)
            .with_context(|| format!("failed to write {}", temp.display()))?;
        fs::rename(&temp, &self.path)
            .with_context(|| format!("failed to move ledger into {}", self.path.display()))?;

        Ok(())
    }

    fn read(&self) -> Result<Vec<Value>> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }

        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let raw = fs::read_to_string(&self.path)
            .with_context(|| format!("failed to read {}", self.path.display()))?;

        serde_json::from_str(&raw)
            .with_context(|| format!("ledger {} is not a JSON array", self.path.display()))
    }
}
