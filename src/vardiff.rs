use super::*;

/// Fixed-capacity buffer of the most recent inter-submit intervals.
#[derive(Debug, Clone)]
pub(crate) struct RingBuffer {
    max_size: usize,
    data: Vec<f64>,
    cursor: usize,
}

impl RingBuffer {
    fn new(max_size: usize) -> Self {
        Self {
            max_size: max_size.max(1),
            data: Vec::with_capacity(max_size.max(1)),
            cursor: 0,
        }
    }

    fn append(&mut self, value: f64) {
        if self.data.len() < self.max_size {
            self.data.push(value);
        } else {
            self.data[self.cursor] = value;
            self.cursor = (self.cursor + 1) % self.max_size;
        }
    }

    fn avg(&self) -> f64 {
        if self.data.is_empty() {
            return 0.0;
        }
        self.data.iter().sum::<f64>() / self.data.len() as f64
    }

    fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    fn clear(&mut self) {
        self.data.clear();
        self.cursor = 0;
    }
}

/// Per-client retarget state; the shared per-port parameters live on
/// [`VarDiff`].
#[derive(Debug, Clone)]
pub(crate) struct VarDiffTracker {
    buffer: RingBuffer,
    last_ts: Option<Instant>,
    last_rtc: Option<Instant>,
}

/// Adapts each miner's difficulty so its submission cadence approaches the
/// configured `targetTime`. One instance per listening port; network
/// difficulty is refreshed whenever a new block is processed.
#[derive(Debug)]
pub(crate) struct VarDiff {
    options: VarDiffSettings,
    buffer_size: usize,
    t_min: f64,
    t_max: f64,
    network_difficulty: RwLock<Option<f64>>,
}

impl VarDiff {
    pub(crate) fn new(options: VarDiffSettings) -> Self {
        let variance = options.target_time * options.variance_percent / 100.0;

        Self {
            buffer_size: (4.0 * options.retarget_time / options.target_time) as usize,
            t_min: options.target_time - variance,
            t_max: options.target_time + variance,
            network_difficulty: RwLock::new(None),
            options,
        }
    }

    pub(crate) fn tracker(&self) -> VarDiffTracker {
        VarDiffTracker {
            buffer: RingBuffer::new(self.buffer_size),
            last_ts: None,
            last_rtc: None,
        }
    }

    pub(crate) fn set_network_difficulty(&self, difficulty: f64) {
        *self
            .network_difficulty
            .write()
            .expect("network difficulty lock poisoned") = Some(difficulty);
    }

    /// Records one submission, returning the client's new difficulty when a
    /// retarget fires. The caller stages it as the pending difficulty to
    /// apply before the next `mining.notify`.
    pub(crate) fn record_submit(
        &self,
        tracker: &mut VarDiffTracker,
        difficulty: f64,
        now: Instant,
    ) -> Option<f64> {
        let Some(last_ts) = tracker.last_ts else {
            tracker.last_rtc = Some(now - Duration::from_secs_f64(self.options.retarget_time / 2.0));
            tracker.last_ts = Some(now);
            return None;
        };

        tracker.buffer.append(now.duration_since(last_ts).as_secs_f64());
        tracker.last_ts = Some(now);

        let last_rtc = tracker.last_rtc.expect("seeded with last_ts");
        if now.duration_since(last_rtc).as_secs_f64() < self.options.retarget_time
            && !tracker.buffer.is_empty()
        {
            return None;
        }

        tracker.last_rtc = Some(now);

        let avg = tracker.buffer.avg();

        let factor = if avg > self.t_max && difficulty > self.options.min_diff {
            (self.options.min_diff / difficulty).max(0.5)
        } else if avg < self.t_min {
            let ceiling = self
                .network_difficulty
                .read()
                .expect("network difficulty lock poisoned")
                .map_or(self.options.max_diff, |network| {
                    network.min(self.options.max_diff)
                });

            (ceiling / difficulty).min(2.0)
        } else {
            return None;
        };

        tracker.buffer.clear();

        Some(difficulty * factor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    fn options() -> VarDiffSettings {
        VarDiffSettings {
            target_time: 30.0,
            retarget_time: 60.0,
            variance_percent: 30.0,
            min_diff: 1.0,
            max_diff: 1e6,
        }
    }

    /// Feeds `count` submits at fixed spacing and returns the first retarget.
    fn feed(
        vardiff: &VarDiff,
        tracker: &mut VarDiffTracker,
        difficulty: f64,
        interval: Duration,
        count: usize,
    ) -> Option<f64> {
        let start = Instant::now();

        for i in 0..count {
            if let Some(new_diff) =
                vardiff.record_submit(tracker, difficulty, start + interval * i as u32)
            {
                return Some(new_diff);
            }
        }

        None
    }

    #[test]
    fn ring_buffer_averages_and_wraps() {
        let mut buffer = RingBuffer::new(3);
        assert!(buffer.is_empty());
        assert_eq!(buffer.avg(), 0.0);

        buffer.append(1.0);
        buffer.append(2.0);
        buffer.append(3.0);
        assert_eq!(buffer.avg(), 2.0);

        // overwrites the oldest entry
        buffer.append(7.0);
        assert_eq!(buffer.avg(), 4.0);

        buffer.clear();
        assert!(buffer.is_empty());
    }

    #[test]
    fn buffer_size_follows_window_ratio() {
        // 4 * retarget / target = 4 * 60 / 30
        assert_eq!(VarDiff::new(options()).buffer_size, 8);
    }

    #[test]
    fn thresholds_from_variance_percent() {
        let vardiff = VarDiff::new(options());
        assert_eq!(vardiff.t_min, 21.0);
        assert_eq!(vardiff.t_max, 39.0);
    }

    #[test]
    fn first_submit_only_seeds() {
        let vardiff = VarDiff::new(options());
        let mut tracker = vardiff.tracker();

        assert!(vardiff
            .record_submit(&mut tracker, 8.0, Instant::now())
            .is_none());
        assert!(tracker.last_ts.is_some());
        assert!(tracker.buffer.is_empty());
    }

    #[test]
    fn fast_shares_double_difficulty() {
        let vardiff = VarDiff::new(options());
        vardiff.set_network_difficulty(1e6);
        let mut tracker = vardiff.tracker();

        let new_diff = feed(&vardiff, &mut tracker, 8.0, secs(10), 8);

        assert_eq!(new_diff, Some(16.0));
        assert!(tracker.buffer.is_empty(), "buffer cleared on retarget");
    }

    #[test]
    fn slow_shares_halve_difficulty() {
        let vardiff = VarDiff::new(options());
        vardiff.set_network_difficulty(1e6);
        let mut tracker = vardiff.tracker();

        let new_diff = feed(&vardiff, &mut tracker, 8.0, secs(100), 4);

        assert_eq!(new_diff, Some(4.0));
    }

    #[test]
    fn decrease_never_goes_below_min_diff() {
        let vardiff = VarDiff::new(options());
        vardiff.set_network_difficulty(1e6);
        let mut tracker = vardiff.tracker();

        let new_diff = feed(&vardiff, &mut tracker, 1.5, secs(100), 4).unwrap();

        assert!((new_diff - 1.0).abs() < 1e-9, "clamped to min_diff, got {new_diff}");
    }

    #[test]
    fn at_min_diff_no_decrease_fires() {
        let vardiff = VarDiff::new(options());
        let mut tracker = vardiff.tracker();

        assert_eq!(feed(&vardiff, &mut tracker, 1.0, secs(100), 8), None);
    }

    #[test]
    fn increase_caps_at_max_diff() {
        let mut opts = options();
        opts.max_diff = 100.0;
        let vardiff = VarDiff::new(opts);
        vardiff.set_network_difficulty(1e6);
        let mut tracker = vardiff.tracker();

        let new_diff = feed(&vardiff, &mut tracker, 80.0, secs(10), 8);

        assert_eq!(new_diff, Some(100.0));
    }

    #[test]
    fn increase_caps_at_network_difficulty() {
        let vardiff = VarDiff::new(options());
        vardiff.set_network_difficulty(50.0);
        let mut tracker = vardiff.tracker();

        let new_diff = feed(&vardiff, &mut tracker, 40.0, secs(10), 8);

        assert_eq!(new_diff, Some(50.0));
    }

    #[test]
    fn unseeded_network_difficulty_leaves_only_max_cap() {
        let mut opts = options();
        opts.max_diff = 90.0;
        let vardiff = VarDiff::new(opts);
        let mut tracker = vardiff.tracker();

        let new_diff = feed(&vardiff, &mut tracker, 60.0, secs(10), 8);

        assert_eq!(new_diff, Some(90.0));
    }

    #[test]
    fn within_variance_band_no_retarget() {
        let vardiff = VarDiff::new(options());
        vardiff.set_network_difficulty(1e6);
        let mut tracker = vardiff.tracker();

        assert_eq!(feed(&vardiff, &mut tracker, 8.0, secs(30), 12), None);
    }

    #[test]
    fn no_retarget_inside_window() {
        let vardiff = VarDiff::new(options());
        vardiff.set_network_difficulty(1e6);
        let mut tracker = vardiff.tracker();

        let start = Instant::now();
        assert!(vardiff.record_submit(&mut tracker, 8.0, start).is_none());
        // window seeds at start - 30s; these stay inside the 60s retarget gate
        assert!(vardiff
            .record_submit(&mut tracker, 8.0, start + secs(10))
            .is_none());
        assert!(vardiff
            .record_submit(&mut tracker, 8.0, start + secs(20))
            .is_none());
    }
}
