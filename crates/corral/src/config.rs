use clap::Args;
use corral_runtime::WorkerConfig;
use corral_scheduler::SchedulerSettings;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Settings for one scheduler process, loaded from YAML and overridden by flags
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Orchestrator API base URL
    pub api_url: String,
    /// Workloads whose `schedulerName` matches are picked up
    pub scheduler_name: String,
    /// Seconds between cluster cache refreshes
    pub refresh_interval_secs: u64,
    /// Seconds between scans for pending workloads
    pub feed_interval_secs: u64,
    /// Seconds to wait for the first cache sync before giving up
    pub sync_timeout_secs: u64,
    pub scheduler: SchedulerSettings,
    pub worker: WorkerConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: "http://127.0.0.1:6443".to_string(),
            scheduler_name: "corral-scheduler".to_string(),
            refresh_interval_secs: 5,
            feed_interval_secs: 2,
            sync_timeout_secs: 30,
            scheduler: SchedulerSettings::default(),
            worker: WorkerConfig::default(),
        }
    }
}

/// Command line overrides; each flag can also come from the environment
#[derive(Debug, Clone, Default, Args)]
pub struct Overrides {
    /// Path to a YAML configuration file
    #[arg(long, env = "CORRAL_CONFIG")]
    pub config: Option<PathBuf>,
    /// Orchestrator API base URL
    #[arg(long, env = "CORRAL_API_URL")]
    pub api_url: Option<String>,
    /// Scheduler name workloads must request
    #[arg(long, env = "CORRAL_SCHEDULER_NAME")]
    pub scheduler_name: Option<String>,
    /// Queue schedule requests are consumed from
    #[arg(long, env = "RECEIVE_QUEUE")]
    pub receive_queue: Option<String>,
    /// Queue of the backoff relay
    #[arg(long, env = "RETRY_QUEUE")]
    pub retry_queue: Option<String>,
    /// Host name reported on events
    #[arg(long, env = "HOSTNAME")]
    pub hostname: Option<String>,
    /// Backoff in seconds at which a workload is given up on
    #[arg(long, env = "MAX_BACKOFF")]
    pub max_backoff: Option<u64>,
    /// Percentage of nodes to find in large clusters
    #[arg(long, env = "SAMPLING_PERCENTAGE")]
    pub sampling_percentage: Option<u32>,
    /// Seed for shuffling and tie-breaks
    #[arg(long)]
    pub seed: Option<u64>,
    /// Never evict workloads to make room
    #[arg(long)]
    pub disable_preemption: bool,
}

impl Config {
    /// Load `path` if given, otherwise start from defaults
    pub fn load(path: Option<&Path>) -> miette::Result<Self> {
        match path {
            Some(path) => Ok(corral_core::from_yaml_file(path)?),
            None => Ok(Self::default()),
        }
    }

    pub fn apply(&mut self, overrides: &Overrides) {
        if let Some(url) = &overrides.api_url {
            self.api_url = url.clone();
        }
        if let Some(name) = &overrides.scheduler_name {
            self.scheduler_name = name.clone();
        }
        if let Some(queue) = &overrides.receive_queue {
            self.worker.receive_queue = queue.clone();
        }
        if let Some(queue) = &overrides.retry_queue {
            self.worker.backoff_queue = queue.clone();
        }
        if let Some(hostname) = &overrides.hostname {
            self.worker.hostname = hostname.clone();
        }
        if let Some(max) = overrides.max_backoff {
            self.worker.max_backoff = max;
        }
        if let Some(pct) = overrides.sampling_percentage {
            self.scheduler.sampling_percentage = pct;
        }
        if overrides.seed.is_some() {
            self.scheduler.seed = overrides.seed;
        }
        if overrides.disable_preemption {
            self.scheduler.disable_preemption = true;
        }
    }

    pub fn validate(&self) -> miette::Result<()> {
        let pct = self.scheduler.sampling_percentage;
        if !(1..=100).contains(&pct) {
            miette::bail!("sampling_percentage must be between 1 and 100, got {}", pct);
        }
        if self.worker.receive_queue == self.worker.backoff_queue {
            miette::bail!(
                "receive and backoff queues must differ, both are '{}'",
                self.worker.receive_queue
            );
        }
        if self.worker.max_backoff == 0 {
            miette::bail!("max_backoff must be at least 1 second");
        }
        Ok(())
    }

    /// Resolve the configuration from an optional file plus overrides
    pub fn resolve(overrides: &Overrides) -> miette::Result<Self> {
        let mut config = Self::load(overrides.config.as_deref())?;
        config.apply(overrides);
        config.validate()?;
        Ok(config)
    }
}
