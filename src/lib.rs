use {
    anyhow::{anyhow, bail, ensure, Context, Error},
    arguments::Arguments,
    bitcoin::{
        base58,
        consensus::encode::VarInt,
        hashes::{sha256d, Hash},
        opcodes::all::{OP_CHECKSIG, OP_DUP, OP_EQUALVERIFY, OP_HASH160},
        script::Builder,
    },
    clap::Parser,
    coin::{CoinFacts, CoinSettings, RewardKind},
    connection::Connection,
    counters::{ExtraNonceCounter, JobCounter, SubscriptionCounter},
    daemon::{DaemonClient, DaemonError},
    difficulty::{difficulty_for_target, share_difficulty, target_for_difficulty, target_to_hex},
    futures::{future::join_all, SinkExt, StreamExt},
    job::{Job, JobUpdate},
    jobs::{JobManager, ShareOutcome, Submission},
    ledger::Ledger,
    peer::Peer,
    primitive_types::{U256, U512},
    rand::Rng,
    serde::{
        de::{self, Deserializer},
        ser::{SerializeSeq, Serializer},
        Deserialize, Serialize,
    },
    serde_json::{json, Value},
    serde_with::{DeserializeFromStr, SerializeDisplay},
    server::StratumServer,
    settings::{DaemonSettings, P2pSettings, PortSettings, Settings, VarDiffSettings},
    socket2::SockRef,
    std::{
        collections::{BTreeMap, HashMap, HashSet},
        env,
        fmt::{self, Display, Formatter},
        fs, io,
        net::SocketAddr,
        path::{Path, PathBuf},
        process,
        str::FromStr,
        sync::{
            atomic::{AtomicU32, AtomicU64, AtomicUsize, Ordering},
            Arc, LazyLock, Mutex, RwLock,
        },
        time::{Duration, Instant, SystemTime, UNIX_EPOCH},
    },
    stratum::{
        Authorize, Id, InternalError, JobId, Message, Nonce, Notify, Ntime, SetTarget, Solution,
        StratumError, Submit, Subscribe, Username,
    },
    template::{RpcTemplate, Vout},
    tokio::{
        io::{AsyncRead, AsyncWrite},
        net::{TcpListener, TcpStream},
        runtime::Runtime,
        sync::{mpsc, watch},
        task::JoinHandle,
        time::{interval_at, sleep, MissedTickBehavior},
    },
    tokio_util::{
        codec::{FramedRead, FramedWrite, LinesCodec, LinesCodecError},
        sync::CancellationToken,
    },
    tracing::{debug, error, info, warn},
    tracing_appender::non_blocking,
    tracing_subscriber::EnvFilter,
    util::{now_millis, reverse_bytes, reverse_hex, sha256d_hash, unix_time, var_int},
    vardiff::{VarDiff, VarDiffTracker},
};

mod arguments;
mod coin;
mod coinbase;
mod connection;
mod counters;
mod daemon;
mod difficulty;
mod job;
mod jobs;
mod ledger;
mod merkle;
mod peer;
mod pool;
mod server;
mod settings;
mod signal;
pub mod stratum;
mod template;
mod util;
mod vardiff;

pub const USER_AGENT: &str = "komodo-solomining";

/// Server-assigned extranonce prefix, in bytes. The remaining 28 bytes of the
/// 32-byte Equihash nonce belong to the miner.
pub const EXTRANONCE1_SIZE: usize = 4;
pub const NONCE_SIZE: usize = 32;

/// Equihash 200/9: three length-prefix bytes plus 1344 solution bytes, as hex.
pub const SOLUTION_HEX_SIZE: usize = 2694;

/// A connection exceeding this much buffered input without a newline is flooding.
pub const MAX_MESSAGE_SIZE: usize = 10 * 1024;

/// How far into the future a submitted ntime may run, in seconds.
const NTIME_FORWARD_SLACK: u64 = 7200;

/// Wait between `submitblock` and the `getblock` acceptance check.
const BLOCK_CHECK_DELAY: Duration = Duration::from_millis(500);

type Result<T = (), E = Error> = std::result::Result<T, E>;

pub fn main() {
    let (writer, _guard) = non_blocking(io::stderr());
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(writer)
        .init();

    let args = Arguments::parse();

    Runtime::new()
        .expect("Failed to create tokio runtime")
        .block_on(async {
            let cancel_token = signal::setup_signal_handler();

            match args.run(cancel_token).await {
                Err(err) => {
                    error!("error: {err:#}");

                    if env::var_os("RUST_BACKTRACE")
                        .map(|val| val == "1")
                        .unwrap_or_default()
                    {
                        error!("{}", err.backtrace());
                    }
                    process::exit(1);
                }
                Ok(_) => {
                    process::exit(0);
                }
            }
        });
}
