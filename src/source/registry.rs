use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use log::{debug, info};

use crate::config::Config;

use super::{Source, SourceKind};

/// How often the sweeper walks the pools.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(3);

/// Per-protocol pools of sources, keyed by the normalized stream URL
/// `[vhost][/app]/stream`.
pub struct SourceRegistry {
    pools: Mutex<HashMap<SourceKind, HashMap<String, Arc<Source>>>>,
    cleanup_delays: HashMap<SourceKind, Duration>,
}

impl std::fmt::Debug for SourceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceRegistry").finish()
    }
}

impl SourceRegistry {
    pub fn new(config: &Config) -> Arc<Self> {
        let mut cleanup_delays = HashMap::new();
        cleanup_delays.insert(SourceKind::Rtmp, Duration::from_secs(3));
        cleanup_delays.insert(SourceKind::Rtc, Duration::from_secs(3));
        cleanup_delays.insert(
            SourceKind::Srt,
            Duration::from_secs_f64(config.source.srt_cleanup),
        );
        cleanup_delays.insert(
            SourceKind::Rtsp,
            Duration::from_secs_f64(config.source.rtsp_cleanup),
        );
        if config.dash.enabled {
            // DASH keeps its RTMP sources around through the dispose
            // window.
            cleanup_delays.insert(SourceKind::Rtmp, config.dash.cleanup_delay());
        }

        Arc::new(Self {
            pools: Mutex::new(HashMap::new()),
            cleanup_delays,
        })
    }

    /// Atomically return the existing source for `url` or create it.
    pub fn fetch_or_create(&self, kind: SourceKind, url: &str) -> (Arc<Source>, bool) {
        let mut pools = self.pools.lock().unwrap();
        let pool = pools.entry(kind).or_default();
        if let Some(source) = pool.get(url) {
            return (source.clone(), false);
        }
        let source = Source::new(kind, url);
        pool.insert(url.to_owned(), source.clone());
        info!("create {kind:?} source {url}");
        (source, true)
    }

    pub fn fetch(&self, kind: SourceKind, url: &str) -> Option<Arc<Source>> {
        let pools = self.pools.lock().unwrap();
        pools.get(&kind)?.get(url).cloned()
    }

    pub fn len(&self) -> usize {
        let pools = self.pools.lock().unwrap();
        pools.values().map(|p| p.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// One sweep pass: drop every source that is dead per its protocol's
    /// cleanup delay.
    pub fn sweep(&self, now: Instant) {
        let mut pools = self.pools.lock().unwrap();
        for (kind, pool) in pools.iter_mut() {
            let delay = self
                .cleanup_delays
                .get(kind)
                .copied()
                .unwrap_or(SWEEP_INTERVAL);
            pool.retain(|url, source| {
                let dead = source.stream_is_dead(delay, now);
                if dead {
                    debug!("reap {kind:?} source {url}");
                }
                !dead
            });
        }
    }

    /// Run the periodic sweeper until the registry is dropped.
    pub fn spawn_sweeper(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let registry = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
            loop {
                ticker.tick().await;
                match registry.upgrade() {
                    Some(registry) => registry.sweep(Instant::now()),
                    None => break,
                }
            }
        })
    }
}
