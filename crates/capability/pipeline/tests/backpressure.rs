use domain::{BackpressureLevel, Notification, Notifier};
use edge_pipeline::{
    BackpressureConfig, BackpressureMonitor, MemorySampler, PipelineError, SysinfoSampler,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Default)]
struct RecordingNotifier {
    levels: Mutex<Vec<(BackpressureLevel, f64)>>,
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notification: Notification) {
        if let Notification::Backpressure(event) = notification {
            self.levels
                .lock()
                .expect("levels")
                .push((event.level, event.utilization_percent));
        }
    }
}

struct ScriptedSampler {
    readings: Mutex<Vec<f64>>,
}

impl MemorySampler for ScriptedSampler {
    fn utilization_percent(&self) -> Result<f64, PipelineError> {
        let mut readings = self.readings.lock().expect("readings");
        if readings.is_empty() {
            return Err(PipelineError::Sample("exhausted".to_string()));
        }
        Ok(readings.remove(0))
    }
}

fn monitor() -> (BackpressureMonitor, Arc<RecordingNotifier>) {
    let notifier = Arc::new(RecordingNotifier::default());
    let monitor = BackpressureMonitor::new(BackpressureConfig::default(), notifier.clone())
        .expect("monitor");
    (monitor, notifier)
}

#[test]
fn hysteresis_emits_one_event_per_transition() {
    let (monitor, notifier) = monitor();
    let mut events = Vec::new();
    for utilization in [40.0, 46.0, 45.0, 44.0, 43.0] {
        if let Some(event) = monitor.observe(utilization) {
            events.push((event.level, utilization));
        }
    }
    assert_eq!(
        events,
        vec![
            (BackpressureLevel::DropEngaged, 46.0),
            (BackpressureLevel::DropReleased, 43.0),
        ]
    );
    assert_eq!(*notifier.levels.lock().expect("levels"), events);
    assert!(!monitor.is_dropping());
    assert_eq!(monitor.last_utilization(), Some(43.0));
}

#[test]
fn stays_dropping_between_thresholds() {
    let (monitor, notifier) = monitor();
    assert!(monitor.last_utilization().is_none());
    monitor.observe(45.0);
    assert!(monitor.is_dropping());
    monitor.observe(90.0);
    monitor.observe(44.5);
    assert!(monitor.is_dropping());
    assert_eq!(notifier.levels.lock().expect("levels").len(), 1);
}

#[test]
fn rejects_inverted_thresholds() {
    let config = BackpressureConfig {
        drop_threshold_pct: 40.0,
        restart_threshold_pct: 40.0,
        ..BackpressureConfig::default()
    };
    let result = BackpressureMonitor::new(config, Arc::new(RecordingNotifier::default()));
    assert!(matches!(result, Err(PipelineError::Config(_))));

    let (monitor, _) = monitor();
    assert!(monitor.update_config(config).is_err());
    assert_eq!(monitor.config(), BackpressureConfig::default());
}

#[tokio::test]
async fn sampling_task_drives_state() {
    let notifier = Arc::new(RecordingNotifier::default());
    let config = BackpressureConfig {
        sample_interval: Duration::from_millis(5),
        ..BackpressureConfig::default()
    };
    let monitor = BackpressureMonitor::new(config, notifier.clone()).expect("monitor");
    let sampler = Arc::new(ScriptedSampler {
        readings: Mutex::new(vec![50.0, 30.0]),
    });
    let handle = monitor.spawn(sampler);
    tokio::time::sleep(Duration::from_millis(100)).await;
    handle.abort();

    let levels: Vec<BackpressureLevel> = notifier
        .levels
        .lock()
        .expect("levels")
        .iter()
        .map(|(level, _)| *level)
        .collect();
    assert_eq!(
        levels,
        vec![BackpressureLevel::DropEngaged, BackpressureLevel::DropReleased]
    );
}

#[test]
fn sysinfo_sampler_reports_a_percentage() {
    let sampler = SysinfoSampler::new();
    let utilization = sampler.utilization_percent().expect("sample");
    assert!((0.0..=100.0).contains(&utilization));
}
