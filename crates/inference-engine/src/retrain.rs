//! External retraining trigger

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::process::Command;
use tracing::{error, info, warn};

/// Command that retrains the model and rewrites the artifact files
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrainConfig {
    pub command: Option<String>,
    pub args: Vec<String>,
    pub working_dir: Option<PathBuf>,
}

/// Answer to a retraining request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum RetrainOutcome {
    /// Job launched; completion is picked up by a later reload
    Accepted,
    Rejected { reason: String },
}

/// Launches at most one retraining job at a time
#[derive(Debug, Clone)]
pub struct RetrainTrigger {
    config: RetrainConfig,
    running: Arc<AtomicBool>,
}

impl RetrainTrigger {
    pub fn new(config: RetrainConfig) -> Self {
        Self {
            config,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Start the job in the background. Must be called inside a tokio runtime.
    pub fn trigger(&self) -> RetrainOutcome {
        let Some(program) = self.config.command.as_deref() else {
            return RetrainOutcome::Rejected {
                reason: "no retraining command configured".to_string(),
            };
        };

        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return RetrainOutcome::Rejected {
                reason: "retraining already in progress".to_string(),
            };
        }

        let mut command = Command::new(program);
        command.args(&self.config.args).kill_on_drop(false);
        if let Some(dir) = &self.config.working_dir {
            command.current_dir(dir);
        }

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                self.running.store(false, Ordering::Release);
                error!("Failed to start retraining command {}: {}", program, e);
                return RetrainOutcome::Rejected {
                    reason: format!("failed to start {}: {}", program, e),
                };
            }
        };

        info!("Model retraining started: {} (pid {:?})", program, child.id());
        let running = self.running.clone();
        let program = program.to_string();
        tokio::spawn(async move {
            match child.wait().await {
                Ok(status) if status.success() => {
                    info!("Model retraining finished; reload to activate the new artifact")
                }
                Ok(status) => warn!("Retraining command {} exited with {}", program, status),
                Err(e) => error!("Failed waiting for retraining command {}: {}", program, e),
            }
            running.store(false, Ordering::Release);
        });

        RetrainOutcome::Accepted
    }

    /// Whether a job is currently running
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    async fn wait_idle(trigger: &RetrainTrigger) {
        for _ in 0..200 {
            if !trigger.is_running() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("retraining did not finish");
    }

    #[tokio::test]
    async fn test_rejects_without_command() {
        let trigger = RetrainTrigger::new(RetrainConfig::default());
        assert!(matches!(trigger.trigger(), RetrainOutcome::Rejected { .. }));
        assert!(!trigger.is_running());
    }

    #[tokio::test]
    async fn test_single_job_at_a_time() {
        let trigger = RetrainTrigger::new(RetrainConfig {
            command: Some("sleep".to_string()),
            args: vec!["0.2".to_string()],
            working_dir: None,
        });

        assert_eq!(trigger.trigger(), RetrainOutcome::Accepted);
        assert!(trigger.is_running());
        match trigger.trigger() {
            RetrainOutcome::Rejected { reason } => assert!(reason.contains("in progress")),
            other => panic!("expected rejection, got {:?}", other),
        }

        wait_idle(&trigger).await;
        assert_eq!(trigger.trigger(), RetrainOutcome::Accepted);
        wait_idle(&trigger).await;
    }

    #[tokio::test]
    async fn test_spawn_failure_resets_flag() {
        let trigger = RetrainTrigger::new(RetrainConfig {
            command: Some("/nonexistent/retrain-model".to_string()),
            ..Default::default()
        });
        assert!(matches!(trigger.trigger(), RetrainOutcome::Rejected { .. }));
        assert!(!trigger.is_running());
    }

    #[test]
    fn test_outcome_serialization() {
        let json = serde_json::to_value(RetrainOutcome::Rejected {
            reason: "busy".to_string(),
        })
        .unwrap();
        assert_eq!(json["status"], "rejected");
        assert_eq!(json["reason"], "busy");
    }
}
