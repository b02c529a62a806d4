use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// How close the process is to its configured memory ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum MemoryPressureTier {
    Normal,
    Warn,
    Critical,
    Emergency,
}

/// Trips at three rising thresholds as resident memory approaches a
/// configured ceiling, giving the coordinator a chance to shed caches or
/// pause enumeration before the OS OOM-kills the process.
///
/// Reads `/proc/self/statm` directly rather than pulling in a
/// process-inspection crate — it's one `read_to_string` and a field split,
/// and the format is stable across the kernel versions this runs on.
pub struct MemoryGuard {
    limit_bytes: u64,
    warn_pct: f64,
    critical_pct: f64,
    emergency_pct: f64,
    page_size: u64,
    /// Tracks whether `emergencyPct` has already fired, so the event is
    /// edge-triggered: it emits once on crossing into `Emergency` and stays
    /// quiet until usage falls back below `warnPct`.
    emergency_latched: AtomicBool,
}

impl MemoryGuard {
    /// `limit_bytes` is the 100% reference the percentages below are taken
    /// against (e.g. a cgroup memory limit, or an operator-configured cap).
    pub fn new(limit_bytes: u64, warn_pct: f64, critical_pct: f64, emergency_pct: f64) -> Self {
        Self {
            limit_bytes,
            warn_pct,
            critical_pct,
            emergency_pct,
            page_size: page_size_bytes(),
            emergency_latched: AtomicBool::new(false),
        }
    }

    /// Current resident set size in bytes, or `None` if unavailable
    /// (non-Linux, or `/proc` unreadable).
    pub fn resident_bytes(&self) -> Option<u64> {
        resident_pages()?.checked_mul(self.page_size)
    }

    fn usage_pct(&self) -> Option<f64> {
        if self.limit_bytes == 0 {
            return None;
        }
        self.resident_bytes()
            .map(|rss| (rss as f64 / self.limit_bytes as f64) * 100.0)
    }

    /// Current pressure tier. Fails closed to `Normal` when RSS can't be
    /// measured, since refusing to index because memory can't be read is
    /// worse than proceeding.
    pub fn tier(&self) -> MemoryPressureTier {
        let Some(pct) = self.usage_pct() else {
            return MemoryPressureTier::Normal;
        };
        if pct >= self.emergency_pct {
            MemoryPressureTier::Emergency
        } else if pct >= self.critical_pct {
            MemoryPressureTier::Critical
        } else if pct >= self.warn_pct {
            MemoryPressureTier::Warn
        } else {
            MemoryPressureTier::Normal
        }
    }

    /// Whether a fresh `memoryPressure` event should fire this sample.
    /// Edge-triggered on `Emergency`: returns `true` at most once per
    /// excursion above `emergencyPct`, resetting once usage drops back
    /// below `warnPct`.
    pub fn poll_emergency(&self) -> bool {
        let tier = self.tier();
        if tier == MemoryPressureTier::Emergency {
            !self.emergency_latched.swap(true, Ordering::SeqCst)
        } else {
            if tier == MemoryPressureTier::Normal {
                self.emergency_latched.store(false, Ordering::SeqCst);
            }
            false
        }
    }
}

#[cfg(target_os = "linux")]
fn resident_pages() -> Option<u64> {
    let statm = std::fs::read_to_string("/proc/self/statm").ok()?;
    statm.split_whitespace().nth(1)?.parse().ok()
}

#[cfg(not(target_os = "linux"))]
fn resident_pages() -> Option<u64> {
    None
}

/// Page size `/proc/self/statm`'s RSS field is expressed in. 4 KiB on every
/// architecture this runs on (x86_64, aarch64); revisit if that changes.
fn page_size_bytes() -> u64 {
    4096
}

/// Rolling-window error-rate tripwire: once `threshold` errors land within
/// `window`, [`ErrorThreshold::tripped`] (and its spec-facing alias
/// [`ErrorThreshold::should_use_fallback`]) reports true until old entries
/// age out or [`ErrorThreshold::reset`] is called.
pub struct ErrorThreshold {
    window: Duration,
    threshold: usize,
    timestamps: VecDeque<Instant>,
}

impl ErrorThreshold {
    pub fn new(threshold: usize, window: Duration) -> Self {
        Self {
            window,
            threshold,
            timestamps: VecDeque::new(),
        }
    }

    pub fn record_error(&mut self) {
        self.timestamps.push_back(Instant::now());
        self.evict_expired();
    }

    pub fn tripped(&mut self) -> bool {
        self.evict_expired();
        self.timestamps.len() >= self.threshold
    }

    /// Alias for [`Self::tripped`] under the name callers degrade on:
    /// Chunker skips its primary strategy, LanguageDetector accepts
    /// lower-confidence results, and SearchCoordinator shrinks `k`.
    pub fn should_use_fallback(&mut self) -> bool {
        self.tripped()
    }

    pub fn reset(&mut self) {
        self.timestamps.clear();
    }

    fn evict_expired(&mut self) {
        let cutoff = Instant::now().checked_sub(self.window);
        while let Some(&front) = self.timestamps.front() {
            if cutoff.is_some_and(|c| front < c) {
                self.timestamps.pop_front();
            } else {
                break;
            }
        }
    }
}

/// A registered response to resource pressure — e.g. drop the embedding
/// cache, shrink batch size, or flush and close idle project handles.
pub trait CleanupStrategy: Send + Sync {
    fn name(&self) -> &str;
    /// Whether this strategy is safe to run under light (`warnPct`)
    /// pressure. Non-evictable strategies only run on heavy cleanup.
    fn evictable(&self) -> bool {
        false
    }
    /// Attempt cleanup; return `true` if it freed meaningful resources.
    fn cleanup(&self) -> bool;
}

#[derive(Default)]
pub struct CleanupRegistry {
    strategies: Vec<Box<dyn CleanupStrategy>>,
}

impl CleanupRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, strategy: Box<dyn CleanupStrategy>) {
        self.strategies.push(strategy);
    }

    /// Light cleanup: only strategies flagged `evictable`, in registration
    /// order, stopping at the first that frees something.
    pub fn run_light(&self) -> Option<&str> {
        self.run_matching(|s| s.evictable())
    }

    /// Heavy cleanup: every registered strategy, evictable or not.
    pub fn run_heavy(&self) -> Option<&str> {
        self.run_matching(|_| true)
    }

    fn run_matching(&self, filter: impl Fn(&dyn CleanupStrategy) -> bool) -> Option<&str> {
        for strategy in &self.strategies {
            if filter(strategy.as_ref()) && strategy.cleanup() {
                return Some(strategy.name());
            }
        }
        None
    }
}

/// Umbrella resource-pressure tripwire combining [`MemoryGuard`],
/// [`ErrorThreshold`], and a [`CleanupRegistry`] — the single object
/// `IndexCoordinator` (and, through it, the Chunker/LanguageDetector/
/// SearchCoordinator degradation points) consult to decide whether to
/// shed work.
pub struct ResourceGuard {
    memory: MemoryGuard,
    errors: Mutex<ErrorThreshold>,
    cleanup: CleanupRegistry,
}

impl ResourceGuard {
    pub fn new(memory: MemoryGuard, errors: ErrorThreshold, cleanup: CleanupRegistry) -> Self {
        Self {
            memory,
            errors: Mutex::new(errors),
            cleanup,
        }
    }

    pub fn register_cleanup(&mut self, strategy: Box<dyn CleanupStrategy>) {
        self.cleanup.register(strategy);
    }

    /// Sample current memory pressure, running light/heavy cleanup as the
    /// tier demands, and return the tier so the caller can additionally
    /// pause enumeration or shrink its worker pool on `Emergency`.
    pub fn check_memory(&self) -> MemoryPressureTier {
        let tier = self.memory.tier();
        match tier {
            MemoryPressureTier::Warn => {
                self.cleanup.run_light();
            }
            MemoryPressureTier::Critical | MemoryPressureTier::Emergency => {
                self.cleanup.run_heavy();
            }
            MemoryPressureTier::Normal => {}
        }
        tier
    }

    /// Whether an `Emergency`-tier `memoryPressure` event should fire this
    /// check. See [`MemoryGuard::poll_emergency`].
    pub fn poll_memory_pressure_event(&self) -> bool {
        self.memory.poll_emergency()
    }

    pub fn record_error(&self) {
        self.errors.lock().expect("error threshold lock poisoned").record_error();
    }

    /// Whether callers should degrade: skip primary strategies and accept
    /// lower-quality fallbacks rather than failing the operation outright.
    pub fn should_use_fallback(&self) -> bool {
        self.errors.lock().expect("error threshold lock poisoned").should_use_fallback()
    }

    pub fn reset_errors(&self) {
        self.errors.lock().expect("error threshold lock poisoned").reset();
    }
}
