use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, error, info, warn};

/// Exit code reported when the user stops a launch.
pub const CANCELLED_EXIT_CODE: i32 = -1;

/// Exit code reported when the backend returns no process.
pub const FAILED_TO_START_EXIT_CODE: i32 = 1;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

/// Everything a launch attempt reports to its caller.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum LaunchEvent {
    Log {
        level: LogLevel,
        message: String,
    },
    Progress {
        task: String,
        total: u64,
        percent: f64,
    },
    ProcessStarted {
        pid: Option<u32>,
    },
    Exit {
        code: i32,
    },
    LaunchError {
        summary: String,
        advice: String,
    },
}

impl LaunchEvent {
    pub fn is_exit(&self) -> bool {
        matches!(self, LaunchEvent::Exit { .. })
    }
}

/// Ordered event channel for one launch attempt. Only the first `exit` is delivered.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: UnboundedSender<LaunchEvent>,
    exited: Arc<AtomicBool>,
}

impl EventSink {
    pub fn new(tx: UnboundedSender<LaunchEvent>) -> Self {
        Self {
            tx,
            exited: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn log(&self, level: LogLevel, message: impl Into<String>) {
        let message = message.into();
        match level {
            LogLevel::Debug => debug!("{}", message),
            LogLevel::Info => info!("{}", message),
            LogLevel::Warn => warn!("{}", message),
            LogLevel::Error => error!("{}", message),
        }
        self.send(LaunchEvent::Log { level, message });
    }

    pub fn info(&self, message: impl Into<String>) {
        self.log(LogLevel::Info, message);
    }

    pub fn warn(&self, message: impl Into<String>) {
        self.log(LogLevel::Warn, message);
    }

    pub fn debug(&self, message: impl Into<String>) {
        self.log(LogLevel::Debug, message);
    }

    /// Upstream percentages are not trusted to stay within 0..=100.
    pub fn progress(&self, task: impl Into<String>, total: u64, percent: f64) {
        let percent = if percent.is_nan() {
            0.0
        } else {
            percent.clamp(0.0, 100.0)
        };
        self.send(LaunchEvent::Progress {
            task: task.into(),
            total,
            percent,
        });
    }

    pub fn process_started(&self, pid: Option<u32>) {
        info!("Game process started (pid {:?})", pid);
        self.send(LaunchEvent::ProcessStarted { pid });
    }

    pub fn launch_error(&self, summary: impl Into<String>, advice: impl Into<String>) {
        let summary = summary.into();
        error!("Launch failed: {}", summary);
        self.send(LaunchEvent::LaunchError {
            summary,
            advice: advice.into(),
        });
    }

    /// Returns false when an exit was already reported.
    pub fn exit(&self, code: i32) -> bool {
        if self.exited.swap(true, Ordering::SeqCst) {
            debug!("Suppressed duplicate exit {}", code);
            return false;
        }
        info!("Launch attempt finished with exit code {}", code);
        self.send(LaunchEvent::Exit { code });
        true
    }

    fn send(&self, event: LaunchEvent) {
        // receiver gone means nobody is listening any more
        let _ = self.tx.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[test]
    fn progress_is_clamped() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let sink = EventSink::new(tx);
        sink.progress("assets", 10, 150.0);
        sink.progress("assets", 10, -3.0);

        let percents: Vec<f64> = std::iter::from_fn(|| rx.try_recv().ok())
            .map(|event| match event {
                LaunchEvent::Progress { percent, .. } => percent,
                other => panic!("unexpected {other:?}"),
            })
            .collect();
        assert_eq!(percents, vec![100.0, 0.0]);
    }

    #[test]
    fn only_first_exit_is_delivered() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let sink = EventSink::new(tx);
        assert!(sink.exit(CANCELLED_EXIT_CODE));
        assert!(!sink.clone().exit(0));

        assert_eq!(rx.try_recv().unwrap(), LaunchEvent::Exit { code: -1 });
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn events_serialize_with_type_tag() {
        let json = serde_json::to_value(LaunchEvent::LaunchError {
            summary: "s".into(),
            advice: "a".into(),
        })
        .unwrap();
        assert_eq!(json["type"], "launchError");

        let json = serde_json::to_value(LaunchEvent::ProcessStarted { pid: Some(7) }).unwrap();
        assert_eq!(json["type"], "processStarted");
        assert_eq!(json["pid"], 7);
    }
}
