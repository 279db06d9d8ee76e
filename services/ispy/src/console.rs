//! A terminal stand-in for the robot.
//!
//! Speech is printed, answers are typed, and scans report a fixed scene. Handy
//! for playing without hardware and for trying out prompt changes.

use async_trait::async_trait;
use ispy_core::{GameError, Posture, RobotGateway, ScanDescriptor, ScanMode};
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader, Lines};
use tracing::info;

/// Objects the console robot "sees" when asked to scan.
pub const DEFAULT_SCENE: &[&str] = &["chair", "table", "window", "green plant", "desk lamp"];

pub struct ConsoleGateway<R, W> {
    input: Lines<R>,
    output: W,
    scene: Vec<String>,
}

impl ConsoleGateway<BufReader<tokio::io::Stdin>, tokio::io::Stdout> {
    /// A gateway on the process's stdin and stdout.
    pub fn stdio(scene: &[&str]) -> Self {
        Self::new(BufReader::new(tokio::io::stdin()), tokio::io::stdout(), scene)
    }
}

impl<R, W> ConsoleGateway<R, W>
where
    R: AsyncBufRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(input: R, output: W, scene: &[&str]) -> Self {
        Self {
            input: input.lines(),
            output,
            scene: scene.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn into_output(self) -> W {
        self.output
    }

    async fn write(&mut self, text: &str) -> std::io::Result<()> {
        self.output.write_all(text.as_bytes()).await?;
        self.output.flush().await
    }
}

#[async_trait]
impl<R, W> RobotGateway for ConsoleGateway<R, W>
where
    R: AsyncBufRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    async fn speak(&mut self, text: &str) -> Result<(), GameError> {
        self.write(&format!("robot> {}\n", text))
            .await
            .map_err(|e| GameError::SpeechOutputFailed(e.to_string()))
    }

    async fn listen(&mut self, timeout: Duration) -> Result<String, GameError> {
        self.write("you> ")
            .await
            .map_err(|e| GameError::SpeechInputFailed(e.to_string()))?;
        match tokio::time::timeout(timeout, self.input.next_line()).await {
            Ok(Ok(Some(line))) => Ok(line.trim().to_string()),
            Ok(Ok(None)) => Err(GameError::SpeechInputFailed("input closed".to_string())),
            Ok(Err(e)) => Err(GameError::SpeechInputFailed(e.to_string())),
            Err(_) => {
                self.write("\n")
                    .await
                    .map_err(|e| GameError::SpeechInputFailed(e.to_string()))?;
                Ok(String::new())
            }
        }
    }

    async fn scan(&mut self, mode: ScanMode) -> Result<ScanDescriptor, GameError> {
        self.write(&format!("[scanning: {}]\n", mode))
            .await
            .map_err(|e| GameError::ScanFailed(e.to_string()))?;
        let frames = match mode {
            ScanMode::Static => 1,
            ScanMode::Rotate360 => 8,
        };
        Ok(ScanDescriptor {
            mode,
            objects: self.scene.clone(),
            frames,
        })
    }

    async fn posture(&mut self, posture: Posture) -> Result<(), GameError> {
        info!(?posture, "Posture change");
        self.write(&format!("[{:?}]\n", posture).to_lowercase())
            .await
            .map_err(|e| GameError::PostureFailed(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn console(input: &'static str) -> ConsoleGateway<&'static [u8], Vec<u8>> {
        ConsoleGateway::new(input.as_bytes(), Vec::new(), DEFAULT_SCENE)
    }

    #[tokio::test]
    async fn test_speak_and_listen() {
        let mut gateway = console("  yes please \nred\n");
        gateway.speak("Do you want to play?").await.unwrap();
        let heard = gateway.listen(Duration::from_secs(1)).await.unwrap();
        assert_eq!(heard, "yes please");
        assert_eq!(gateway.listen(Duration::from_secs(1)).await.unwrap(), "red");

        let output = String::from_utf8(gateway.into_output()).unwrap();
        assert!(output.starts_with("robot> Do you want to play?\nyou> "));
    }

    #[tokio::test]
    async fn test_closed_input_is_an_input_failure() {
        let mut gateway = console("");
        let err = gateway.listen(Duration::from_secs(1)).await.unwrap_err();
        assert!(matches!(err, GameError::SpeechInputFailed(_)));
    }

    #[tokio::test]
    async fn test_scan_reports_scene() {
        let mut gateway = console("");
        let descriptor = gateway.scan(ScanMode::Rotate360).await.unwrap();
        assert_eq!(descriptor.mode, ScanMode::Rotate360);
        assert_eq!(descriptor.frames, 8);
        assert!(descriptor.objects.contains(&"window".to_string()));
    }
}
