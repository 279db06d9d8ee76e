//! Scan coordination.
//!
//! A scan gives the game some idea of what is around the robot. The result is
//! advisory: it grounds the reasoner's suggestions but never decides a round.

use crate::error::GameError;
use crate::gateway::RobotGateway;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use tracing::{info, warn};

/// How the robot looks around. Fixed for the lifetime of the process.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScanMode {
    /// A single capture of the current field of view.
    #[default]
    #[serde(rename = "static")]
    Static,
    /// A full turn on the spot, capturing as it goes.
    #[serde(rename = "360")]
    Rotate360,
}

impl fmt::Display for ScanMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScanMode::Static => f.write_str("static"),
            ScanMode::Rotate360 => f.write_str("360"),
        }
    }
}

impl FromStr for ScanMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "static" => Ok(ScanMode::Static),
            "360" | "rotate360" | "rotate-360" => Ok(ScanMode::Rotate360),
            other => Err(format!("'{}' is not a scan mode (expected 'static' or '360')", other)),
        }
    }
}

/// What a scan saw. Opaque to the state machine apart from its labels, which
/// are handed to the reasoner as context.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScanDescriptor {
    pub mode: ScanMode,
    /// Object labels reported by the robot's vision pipeline.
    #[serde(default)]
    pub objects: Vec<String>,
    /// Number of frames that went into the result.
    #[serde(default)]
    pub frames: u32,
}

impl ScanDescriptor {
    /// One-line description used inside reasoner prompts.
    pub fn summary(&self) -> String {
        if self.objects.is_empty() {
            format!("{} scan, nothing recognized", self.mode)
        } else {
            format!("{} scan saw: {}", self.mode, self.objects.join(", "))
        }
    }
}

/// Requests scans from the gateway with a deadline.
#[derive(Debug, Clone)]
pub struct ScanCoordinator {
    timeout: Duration,
}

impl ScanCoordinator {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Performs one scan in `mode`.
    ///
    /// A scan that does not finish within the timeout fails with
    /// [`GameError::ScanFailed`], as does any gateway error.
    pub async fn perform_scan<G>(
        &self,
        gateway: &mut G,
        mode: ScanMode,
    ) -> Result<ScanDescriptor, GameError>
    where
        G: RobotGateway + ?Sized,
    {
        info!(%mode, "Requesting scan");
        match tokio::time::timeout(self.timeout, gateway.scan(mode)).await {
            Ok(Ok(descriptor)) => {
                info!(%mode, objects = descriptor.objects.len(), "Scan complete");
                Ok(descriptor)
            }
            Ok(Err(e)) => {
                warn!(%mode, error = %e, "Scan failed");
                Err(match e {
                    GameError::ScanFailed(_) => e,
                    other => GameError::ScanFailed(other.to_string()),
                })
            }
            Err(_) => {
                warn!(%mode, timeout = ?self.timeout, "Scan timed out");
                Err(GameError::ScanFailed(format!(
                    "no result within {:?}",
                    self.timeout
                )))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::MockRobotGateway;

    #[test]
    fn test_scan_mode_parsing() {
        assert_eq!("static".parse::<ScanMode>(), Ok(ScanMode::Static));
        assert_eq!("360".parse::<ScanMode>(), Ok(ScanMode::Rotate360));
        assert_eq!(" Static ".parse::<ScanMode>(), Ok(ScanMode::Static));
        assert!("sideways".parse::<ScanMode>().is_err());
        assert_eq!(ScanMode::default(), ScanMode::Static);
    }

    #[test]
    fn test_scan_mode_serde_names() {
        assert_eq!(serde_json::to_string(&ScanMode::Rotate360).unwrap(), "\"360\"");
        let mode: ScanMode = serde_json::from_str("\"static\"").unwrap();
        assert_eq!(mode, ScanMode::Static);
    }

    #[test]
    fn test_summary() {
        let empty = ScanDescriptor {
            mode: ScanMode::Static,
            objects: vec![],
            frames: 1,
        };
        assert_eq!(empty.summary(), "static scan, nothing recognized");

        let full = ScanDescriptor {
            mode: ScanMode::Rotate360,
            objects: vec!["chair".into(), "lamp".into()],
            frames: 8,
        };
        assert_eq!(full.summary(), "360 scan saw: chair, lamp");
    }

    #[tokio::test]
    async fn test_perform_scan_passes_mode_through() {
        let mut gateway = MockRobotGateway::new();
        gateway
            .expect_scan()
            .withf(|mode| *mode == ScanMode::Rotate360)
            .times(1)
            .returning(|mode| {
                Ok(ScanDescriptor {
                    mode,
                    objects: vec!["plant".into()],
                    frames: 8,
                })
            });

        let coordinator = ScanCoordinator::new(Duration::from_secs(1));
        let descriptor = coordinator
            .perform_scan(&mut gateway, ScanMode::Rotate360)
            .await
            .unwrap();
        assert_eq!(descriptor.objects, vec!["plant".to_string()]);
    }

    #[tokio::test]
    async fn test_gateway_errors_become_scan_failed() {
        let mut gateway = MockRobotGateway::new();
        gateway
            .expect_scan()
            .returning(|_| Err(GameError::SpeechOutputFailed("socket closed".into())));

        let coordinator = ScanCoordinator::new(Duration::from_secs(1));
        let err = coordinator
            .perform_scan(&mut gateway, ScanMode::Static)
            .await
            .unwrap_err();
        assert!(matches!(err, GameError::ScanFailed(_)));
    }
}
