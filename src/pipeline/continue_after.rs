//! Continue-after directive and the wait that ends the observation window

use super::completion::CompletionSignal;
use crate::config::ConfigError;
use std::fmt;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{debug, info};

/// How the caller wants to signal that observation is over
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContinueAfter {
    /// A line on the interactive input
    Enter,
    /// An external signal (SIGUSR1 from the command-line front end)
    Signal,
    /// A fixed delay
    Timeout(Duration),
    /// The HTTP probe finishing its command list
    Probe,
}

impl ContinueAfter {
    /// Parses a mode name; `timeout` is only used by the `timeout` mode.
    pub fn parse(mode: &str, timeout: Duration) -> Result<Self, ConfigError> {
        match mode.trim().to_lowercase().as_str() {
            "enter" => Ok(ContinueAfter::Enter),
            "signal" => Ok(ContinueAfter::Signal),
            "timeout" => Ok(ContinueAfter::Timeout(timeout)),
            "probe" => Ok(ContinueAfter::Probe),
            _ => Err(ConfigError::UnknownContinueAfterMode(mode.to_string())),
        }
    }

    /// Requesting HTTP probing replaces whatever mode was configured.
    pub fn resolve(self, http_probe: bool) -> Self {
        if http_probe {
            ContinueAfter::Probe
        } else {
            self
        }
    }

    pub fn mode_name(&self) -> &'static str {
        match self {
            ContinueAfter::Enter => "enter",
            ContinueAfter::Signal => "signal",
            ContinueAfter::Timeout(_) => "timeout",
            ContinueAfter::Probe => "probe",
        }
    }
}

impl fmt::Display for ContinueAfter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContinueAfter::Timeout(d) => write!(f, "timeout({}s)", d.as_secs()),
            other => f.write_str(other.mode_name()),
        }
    }
}

/// A continue-after directive with its waiting mechanism in place
#[derive(Debug)]
pub enum ArmedWait {
    Enter,
    Signal(CompletionSignal),
    Timeout(Duration),
    Probe(CompletionSignal),
}

impl ArmedWait {
    pub fn mode_name(&self) -> &'static str {
        match self {
            ArmedWait::Enter => "enter",
            ArmedWait::Signal(_) => "signal",
            ArmedWait::Timeout(_) => "timeout",
            ArmedWait::Probe(_) => "probe",
        }
    }

    /// Blocks until the armed mechanism releases. Never fails.
    ///
    /// `input` is only read in `Enter` mode. A line, an empty line, end of input
    /// and a read error all release the wait.
    pub async fn wait<R>(self, input: &mut R)
    where
        R: AsyncBufRead + Unpin + ?Sized,
    {
        match self {
            ArmedWait::Enter => {
                eprintln!("slimbox: press <enter> when you are done using the container...");
                let mut line = String::new();
                if let Err(e) = input.read_line(&mut line).await {
                    debug!("Input read failed, continuing: {}", e);
                }
            }
            ArmedWait::Signal(signal) => {
                eprintln!("slimbox: send SIGUSR1 when you are done using the container...");
                signal.wait().await;
                info!("Got continue signal");
            }
            ArmedWait::Timeout(duration) => {
                eprintln!(
                    "slimbox: waiting for the target container ({} seconds)...",
                    duration.as_secs()
                );
                tokio::time::sleep(duration).await;
                info!("Done waiting for the target container");
            }
            ArmedWait::Probe(signal) => {
                eprintln!("slimbox: waiting for the HTTP probe to finish...");
                let fired = signal.wait().await;
                debug!(fired, "HTTP probe completion received");
                info!("HTTP probe is done");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::completion::completion;
    use std::io::Cursor;
    use tokio::io::{AsyncWriteExt, BufReader};
    use yare::parameterized;

    #[parameterized(
        enter = { "enter", ContinueAfter::Enter },
        signal = { "signal", ContinueAfter::Signal },
        timeout = { "timeout", ContinueAfter::Timeout(Duration::from_secs(7)) },
        probe = { "probe", ContinueAfter::Probe },
        mixed_case = { "Timeout", ContinueAfter::Timeout(Duration::from_secs(7)) },
    )]
    fn test_parse_modes(mode: &str, expected: ContinueAfter) {
        assert_eq!(
            ContinueAfter::parse(mode, Duration::from_secs(7)).unwrap(),
            expected
        );
    }

    #[test]
    fn test_parse_rejects_unknown_mode() {
        let err = ContinueAfter::parse("forever", Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownContinueAfterMode(ref m) if m == "forever"));
    }

    #[test]
    fn test_http_probe_overrides_mode() {
        for mode in [
            ContinueAfter::Enter,
            ContinueAfter::Signal,
            ContinueAfter::Timeout(Duration::from_secs(30)),
            ContinueAfter::Probe,
        ] {
            assert_eq!(mode.resolve(true), ContinueAfter::Probe);
            assert_eq!(mode.resolve(false), mode);
        }
    }

    #[test]
    fn test_display() {
        assert_eq!(ContinueAfter::Enter.to_string(), "enter");
        assert_eq!(
            ContinueAfter::Timeout(Duration::from_secs(5)).to_string(),
            "timeout(5s)"
        );
    }

    #[tokio::test]
    async fn test_enter_releases_on_empty_line() {
        let mut input = Cursor::new(b"\n".to_vec());
        ArmedWait::Enter.wait(&mut input).await;
    }

    #[tokio::test]
    async fn test_enter_releases_on_eof() {
        let mut input = Cursor::new(Vec::new());
        ArmedWait::Enter.wait(&mut input).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_enter_blocks_until_input() {
        let (reader, mut writer) = tokio::io::duplex(64);
        let start = tokio::time::Instant::now();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(2)).await;
            writer.write_all(b"done\n").await.unwrap();
            // keep the writer open so release comes from the line, not EOF
            tokio::time::sleep(Duration::from_secs(60)).await;
        });

        let mut input = BufReader::new(reader);
        ArmedWait::Enter.wait(&mut input).await;
        assert!(start.elapsed() >= Duration::from_secs(2));
        assert!(start.elapsed() < Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_waits_full_duration() {
        let start = tokio::time::Instant::now();
        let mut input = Cursor::new(Vec::new());
        ArmedWait::Timeout(Duration::from_secs(5))
            .wait(&mut input)
            .await;
        assert!(start.elapsed() >= Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_signal_waits_for_completion() {
        let (completion, signal) = completion();
        let start = tokio::time::Instant::now();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(4)).await;
            completion.fire();
        });

        let mut input = Cursor::new(b"\n".to_vec());
        ArmedWait::Signal(signal).wait(&mut input).await;
        assert!(start.elapsed() >= Duration::from_secs(4));
        // input is untouched outside enter mode
        assert_eq!(input.position(), 0);
    }
}
