use super::*;

#[derive(Debug, Parser)]
#[command(version, about = "Solo stratum mining pool for Equihash chains")]
pub(crate) struct Arguments {
    #[arg(
        long,
        default_value = "config.json",
        help = "Load pool configuration from <CONFIG>."
    )]
    pub(crate) config: PathBuf,
}

impl Arguments {
    pub(crate) async fn run(self, cancel_token: CancellationToken) -> Result {
        let settings = Arc::new(Settings::load(&self.config)?);
        pool::Pool::new(settings)?.run(cancel_token).await
    }
}
