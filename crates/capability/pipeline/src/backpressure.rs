//! 内存背压：双阈值滞回，超过上限丢弃入站数据，回落到下限以下恢复。

use crate::error::PipelineError;
use domain::{BackpressureEvent, BackpressureLevel, Notification, Notifier};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System};
use tracing::{info, warn};

/// 背压参数。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackpressureConfig {
    pub sample_interval: Duration,
    pub drop_threshold_pct: f64,
    pub restart_threshold_pct: f64,
}

impl Default for BackpressureConfig {
    fn default() -> Self {
        Self {
            sample_interval: Duration::from_secs(20),
            drop_threshold_pct: 45.0,
            restart_threshold_pct: 44.0,
        }
    }
}

impl BackpressureConfig {
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.sample_interval.is_zero() {
            return Err(PipelineError::Config("sample_interval must be > 0".to_string()));
        }
        if !(self.drop_threshold_pct > 0.0 && self.drop_threshold_pct <= 100.0) {
            return Err(PipelineError::Config(format!(
                "drop_threshold_pct {} (expected 0 - 100)",
                self.drop_threshold_pct
            )));
        }
        if !(self.restart_threshold_pct > 0.0
            && self.restart_threshold_pct < self.drop_threshold_pct)
        {
            return Err(PipelineError::Config(format!(
                "restart_threshold_pct {} must be below drop_threshold_pct {}",
                self.restart_threshold_pct, self.drop_threshold_pct
            )));
        }
        Ok(())
    }
}

/// 内存利用率采样（百分比）。
pub trait MemorySampler: Send + Sync {
    fn utilization_percent(&self) -> Result<f64, PipelineError>;
}

/// 基于 sysinfo 的采样：本进程常驻内存 / 系统总内存。
pub struct SysinfoSampler {
    system: Mutex<System>,
    pid: Pid,
}

impl SysinfoSampler {
    pub fn new() -> Self {
        Self {
            system: Mutex::new(System::new()),
            pid: Pid::from_u32(std::process::id()),
        }
    }
}

impl Default for SysinfoSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl MemorySampler for SysinfoSampler {
    fn utilization_percent(&self) -> Result<f64, PipelineError> {
        let mut system = self.system.lock().unwrap_or_else(PoisonError::into_inner);
        system.refresh_memory();
        system.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[self.pid]),
            true,
            ProcessRefreshKind::new().with_memory(),
        );
        let total = system.total_memory();
        if total == 0 {
            return Err(PipelineError::Sample("total memory unavailable".to_string()));
        }
        let resident = system
            .process(self.pid)
            .map(|process| process.memory())
            .ok_or_else(|| PipelineError::Sample(format!("process {} not found", self.pid)))?;
        Ok(resident as f64 / total as f64 * 100.0)
    }
}

struct MonitorInner {
    config: Mutex<BackpressureConfig>,
    dropping: AtomicBool,
    /// f64 位模式，NaN 表示尚未采样
    last_utilization: AtomicU64,
    notifier: Arc<dyn Notifier>,
}

/// 背压状态机：accepting / dropping。
#[derive(Clone)]
pub struct BackpressureMonitor {
    inner: Arc<MonitorInner>,
}

impl BackpressureMonitor {
    pub fn new(
        config: BackpressureConfig,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self, PipelineError> {
        config.validate()?;
        let inner = MonitorInner {
            config: Mutex::new(config),
            dropping: AtomicBool::new(false),
            last_utilization: AtomicU64::new(f64::NAN.to_bits()),
            notifier,
        };
        Ok(Self {
            inner: Arc::new(inner),
        })
    }

    pub fn config(&self) -> BackpressureConfig {
        *self
            .inner
            .config
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn update_config(&self, config: BackpressureConfig) -> Result<(), PipelineError> {
        config.validate()?;
        *self
            .inner
            .config
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = config;
        Ok(())
    }

    /// 入站热路径读取。
    pub fn is_dropping(&self) -> bool {
        self.inner.dropping.load(Ordering::Acquire)
    }

    pub fn last_utilization(&self) -> Option<f64> {
        let value = f64::from_bits(self.inner.last_utilization.load(Ordering::Relaxed));
        (!value.is_nan()).then_some(value)
    }

    /// 输入一次采样；发生状态迁移时通知并返回事件。
    pub fn observe(&self, utilization_percent: f64) -> Option<BackpressureEvent> {
        self.inner
            .last_utilization
            .store(utilization_percent.to_bits(), Ordering::Relaxed);
        let config = self.config();
        let level = if utilization_percent >= config.drop_threshold_pct
            && self
                .inner
                .dropping
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
        {
            BackpressureLevel::DropEngaged
        } else if utilization_percent < config.restart_threshold_pct
            && self
                .inner
                .dropping
                .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
        {
            BackpressureLevel::DropReleased
        } else {
            return None;
        };

        match level {
            BackpressureLevel::DropEngaged => warn!(
                target: "edge.pipeline",
                utilization_percent = utilization_percent,
                threshold = config.drop_threshold_pct,
                "backpressure_drop_engaged"
            ),
            BackpressureLevel::DropReleased => info!(
                target: "edge.pipeline",
                utilization_percent = utilization_percent,
                threshold = config.restart_threshold_pct,
                "backpressure_drop_released"
            ),
        }
        let event = BackpressureEvent {
            level,
            utilization_percent,
        };
        self.inner
            .notifier
            .notify(Notification::Backpressure(event.clone()));
        Some(event)
    }

    /// 启动周期采样任务。
    pub fn spawn(&self, sampler: Arc<dyn MemorySampler>) -> tokio::task::JoinHandle<()> {
        let monitor = self.clone();
        tokio::spawn(async move {
            loop {
                match sampler.utilization_percent() {
                    Ok(utilization) => {
                        monitor.observe(utilization);
                    }
                    Err(err) => {
                        warn!(target: "edge.pipeline", error = %err, "memory_sample_failed");
                    }
                }
                tokio::time::sleep(monitor.config().sample_interval).await;
            }
        })
    }
}
