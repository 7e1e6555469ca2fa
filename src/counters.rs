use super::*;

/// Hands out the 4-byte server side of the Equihash nonce. The seed's low
/// five bits are cleared so concurrent pool instances land in disjoint
/// subspaces; the counter never repeats a value before restart.
pub(crate) struct ExtraNonceCounter {
    counter: AtomicU32,
}

impl ExtraNonceCounter {
    pub(crate) fn new() -> Self {
        Self {
            counter: AtomicU32::new(rand::rng().random::<u32>().wrapping_shl(5)),
        }
    }

    pub(crate) fn next(&self) -> String {
        format!("{:08x}", self.counter.fetch_add(1, Ordering::Relaxed))
    }

    pub(crate) fn size(&self) -> usize {
        EXTRANONCE1_SIZE
    }
}

const JOB_COUNTER_START: u64 = 0x0000_cccc;
const JOB_COUNTER_MAX: u64 = 0xff_ffff_ffff;

pub(crate) struct JobCounter {
    counter: AtomicU64,
}

impl JobCounter {
    pub(crate) fn new() -> Self {
        Self {
            counter: AtomicU64::new(JOB_COUNTER_START),
        }
    }

    pub(crate) fn next(&self) -> JobId {
        let previous = self
            .counter
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |counter| {
                Some(if counter >= JOB_COUNTER_MAX {
                    1
                } else {
                    counter + 1
                })
            })
            .expect("fetch_update closure always returns Some");

        JobId::from(if previous >= JOB_COUNTER_MAX {
            1
        } else {
            previous + 1
        })
    }
}

pub(crate) struct SubscriptionCounter {
    counter: AtomicU64,
}

const SUBSCRIPTION_ID_PREFIX: &str = "deadbeefcafebabe";

impl SubscriptionCounter {
    pub(crate) fn new() -> Self {
        Self {
            counter: AtomicU64::new(0),
        }
    }

    pub(crate) fn next(&self) -> String {
        let count = self.counter.fetch_add(1, Ordering::Relaxed);
        format!("{SUBSCRIPTION_ID_PREFIX}{}", hex::encode(count.to_le_bytes()))
    }
}
