//! Process resource monitoring.
//!
//! Samples RSS and CPU at a configurable cadence, keeps a bounded
//! history, and raises soft-pressure signals: crossing the soft
//! threshold sheds internal buffers, crossing the hard threshold (or
//! 90% CPU) invokes the registered callback. The monitor never applies
//! back-pressure itself; callers consult its snapshots.

use crate::cache::epoch_millis;
use crate::core::config::MonitorConfig;
use aide_types::prelude::ResourceSnapshot;
use futures::future::BoxFuture;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use sysinfo::{Pid, System};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

const HIGH_CPU_PERCENT: f32 = 90.0;
const TRIMMED_HISTORY_LEN: usize = 10;

pub type MonitorCallback = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

pub struct ResourceMonitor {
    config: MonitorConfig,
    pid: Pid,
    system: Mutex<System>,
    history: Mutex<VecDeque<ResourceSnapshot>>,
    active_tasks: Arc<AtomicU64>,
    on_high_memory: Mutex<Option<MonitorCallback>>,
    on_high_cpu: Mutex<Option<MonitorCallback>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl ResourceMonitor {
    /// `active_tasks` is the shared in-flight request gauge owned by the
    /// core metrics.
    pub fn new(config: MonitorConfig, active_tasks: Arc<AtomicU64>) -> Arc<Self> {
        let pid = sysinfo::get_current_pid().unwrap_or(Pid::from_u32(0));
        Arc::new(ResourceMonitor {
            config,
            pid,
            system: Mutex::new(System::new()),
            history: Mutex::new(VecDeque::new()),
            active_tasks,
            on_high_memory: Mutex::new(None),
            on_high_cpu: Mutex::new(None),
            worker: Mutex::new(None),
        })
    }

    pub fn on_high_memory(&self, callback: MonitorCallback) {
        *self.on_high_memory.lock().expect("monitor lock poisoned") = Some(callback);
    }

    pub fn on_high_cpu(&self, callback: MonitorCallback) {
        *self.on_high_cpu.lock().expect("monitor lock poisoned") = Some(callback);
    }

    /// Take a fresh sample, record it, and apply threshold actions.
    pub async fn sample(&self) -> ResourceSnapshot {
        let snapshot = self.read_process();
        self.record(snapshot);
        self.check_thresholds(&snapshot).await;
        snapshot
    }

    /// Most recent sample, or a fresh one when none has been taken yet.
    pub fn current(&self) -> ResourceSnapshot {
        let recorded = {
            let history = self.history.lock().expect("monitor lock poisoned");
            history.back().copied()
        };
        match recorded {
            Some(snapshot) => snapshot,
            None => {
                let snapshot = self.read_process();
                self.record(snapshot);
                snapshot
            }
        }
    }

    pub fn history(&self) -> Vec<ResourceSnapshot> {
        self.history
            .lock()
            .expect("monitor lock poisoned")
            .iter()
            .copied()
            .collect()
    }

    /// Begin periodic sampling in the background.
    pub fn start(self: &Arc<Self>) {
        let monitor = Arc::clone(self);
        let interval = Duration::from_secs(self.config.sample_interval_secs.max(1));
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                monitor.sample().await;
            }
        });
        let mut worker = self.worker.lock().expect("monitor lock poisoned");
        if let Some(previous) = worker.replace(handle) {
            previous.abort();
        }
    }

    pub fn stop(&self) {
        if let Some(handle) = self.worker.lock().expect("monitor lock poisoned").take() {
            handle.abort();
        }
    }

    fn read_process(&self) -> ResourceSnapshot {
        let mut system = self.system.lock().expect("monitor lock poisoned");
        system.refresh_process(self.pid);
        let (rss_mb, cpu_percent) = match system.process(self.pid) {
            Some(process) => (
                process.memory() as f64 / (1024.0 * 1024.0),
                process.cpu_usage(),
            ),
            None => (0.0, 0.0),
        };
        ResourceSnapshot {
            timestamp_ms: epoch_millis(),
            rss_mb,
            cpu_percent,
            active_tasks: self.active_tasks.load(Ordering::Relaxed) as usize,
        }
    }

    fn record(&self, snapshot: ResourceSnapshot) {
        let mut history = self.history.lock().expect("monitor lock poisoned");
        history.push_back(snapshot);
        while history.len() > self.config.history_size.max(1) {
            history.pop_front();
        }
    }

    async fn check_thresholds(&self, snapshot: &ResourceSnapshot) {
        if snapshot.rss_mb > self.config.gc_threshold_mb as f64 {
            debug!(rss_mb = snapshot.rss_mb, "Soft memory threshold crossed; trimming");
            self.trim_memory();
        }
        if snapshot.rss_mb > self.config.max_memory_mb as f64 {
            warn!(rss_mb = snapshot.rss_mb, "Hard memory threshold crossed");
            let callback = self
                .on_high_memory
                .lock()
                .expect("monitor lock poisoned")
                .clone();
            if let Some(callback) = callback {
                callback().await;
            }
        }
        if snapshot.cpu_percent > HIGH_CPU_PERCENT {
            warn!(cpu_percent = snapshot.cpu_percent, "CPU threshold crossed");
            let callback = self
                .on_high_cpu
                .lock()
                .expect("monitor lock poisoned")
                .clone();
            if let Some(callback) = callback {
                callback().await;
            }
        }
    }

    /// Soft-pressure response: shed the sample history down to a stub.
    fn trim_memory(&self) {
        let mut history = self.history.lock().expect("monitor lock poisoned");
        while history.len() > TRIMMED_HISTORY_LEN {
            history.pop_front();
        }
    }
}

impl Drop for ResourceMonitor {
    fn drop(&mut self) {
        if let Some(handle) = self.worker.lock().expect("monitor lock poisoned").take() {
            handle.abort();
        }
    }
}
