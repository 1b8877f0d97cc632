//! Collector daemon loop: start the collector, drain it on a timer, shut
//! down on Ctrl-C.

use std::fs::OpenOptions;
use std::future::Future;
use std::io::{self, LineWriter, Write};

use pipetrace_collector::{Messages, RelayCollector};
use pipetrace_protocol::MessageFrame;
use tokio::time::MissedTickBehavior;

use crate::config::{Config, OutputFormat};

/// Runs the collector until Ctrl-C.
pub async fn run(config: Config) -> anyhow::Result<()> {
    run_until(config, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to listen for Ctrl-C: {e}");
        }
    })
    .await
}

/// Runs the collector until `shutdown` resolves, then drains what is left.
pub async fn run_until(config: Config, shutdown: impl Future<Output = ()>) -> anyhow::Result<()> {
    let mut out = open_output(&config)?;
    let collector = RelayCollector::start(config.collector.clone())?;
    let messages = collector.messages();

    tracing::info!(
        endpoint = %collector.endpoint(),
        poll_interval_ms = config.poll_interval_ms,
        "collector ready"
    );

    let mut ticker = tokio::time::interval(config.poll_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                tracing::info!("shutdown requested");
                break;
            }
            _ = ticker.tick() => {
                drain_to(&messages, &mut out, config.format)?;
            }
        }
    }

    let frames = collector.frames_received();
    let invalid = collector.invalid_frames();
    collector.dispose().await;
    drain_to(&messages, &mut out, config.format)?;
    out.flush()?;

    tracing::info!(frames, invalid, "collector stopped");
    Ok(())
}

fn open_output(config: &Config) -> anyhow::Result<Box<dyn Write + Send>> {
    match &config.output {
        Some(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            tracing::info!(path = %path.display(), "writing frames to file");
            Ok(Box::new(LineWriter::new(file)))
        }
        None => Ok(Box::new(io::stdout())),
    }
}

fn drain_to(messages: &Messages, out: &mut dyn Write, format: OutputFormat) -> anyhow::Result<()> {
    let frames = messages.drain();
    if !frames.is_empty() {
        write_frames(&frames, out, format)?;
        out.flush()?;
    }
    Ok(())
}

/// Writes one line per frame.
pub fn write_frames<W: Write + ?Sized>(
    frames: &[MessageFrame],
    out: &mut W,
    format: OutputFormat,
) -> anyhow::Result<()> {
    for frame in frames {
        match format {
            OutputFormat::Text => writeln!(out, "{frame}")?,
            OutputFormat::Json => {
                serde_json::to_writer(&mut *out, frame)?;
                out.write_all(b"\n")?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use pipetrace_collector::Severity;
    use pipetrace_protocol::{MAX_FRAME_SIZE, wire};
    use pipetrace_transport::{EndpointName, connect};

    use super::*;

    #[test]
    fn text_lines() {
        let frames = vec![
            MessageFrame::new(Severity::Error, "svc", "boom"),
            MessageFrame::new(Severity::Verbose, "svc", "detail"),
        ];
        let mut out = Vec::new();
        write_frames(&frames, &mut out, OutputFormat::Text).unwrap();

        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines, vec![frames[0].to_string(), frames[1].to_string()]);
    }

    #[test]
    fn json_lines() {
        let frames = vec![MessageFrame::new(Severity::Warning, "svc", "careful")];
        let mut out = Vec::new();
        write_frames(&frames, &mut out, OutputFormat::Json).unwrap();

        let text = String::from_utf8(out).unwrap();
        let parsed: MessageFrame = serde_json::from_str(text.trim_end()).unwrap();
        assert_eq!(parsed, frames[0]);
        assert!(text.ends_with('\n'));
    }

    #[tokio::test]
    async fn writes_received_frames_to_output_file() {
        let tmp = tempfile::tempdir().unwrap();
        let output = tmp.path().join("trace.log");
        let endpoint =
            EndpointName::new(format!("pipetrace-daemon-{}", uuid::Uuid::new_v4())).unwrap();

        let mut config = Config {
            poll_interval_ms: 10,
            output: Some(output.clone()),
            ..Config::default()
        };
        config.collector.endpoint = endpoint.clone();
        config.collector.max_concurrent_connections = 2;

        let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
        let daemon = tokio::spawn(run_until(config, async {
            let _ = stop_rx.await;
        }));

        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        let mut client = loop {
            match connect(&endpoint, Duration::from_millis(200)).await {
                Ok(client) => break client,
                Err(e) => {
                    assert!(tokio::time::Instant::now() < deadline, "{e}");
                    tokio::time::sleep(Duration::from_millis(20)).await;
                }
            }
        };
        for message in ["one", "two"] {
            let frame = MessageFrame::new(Severity::Information, "svc", message);
            wire::send(&mut client, &frame, MAX_FRAME_SIZE).await.unwrap();
        }

        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        loop {
            let text = std::fs::read_to_string(&output).unwrap_or_default();
            if text.lines().count() == 2 {
                assert!(text.contains("Information svc: one"));
                assert!(text.contains("Information svc: two"));
                break;
            }
            assert!(tokio::time::Instant::now() < deadline, "got {text:?}");
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        stop_tx.send(()).unwrap();
        daemon.await.unwrap().unwrap();
    }
}
