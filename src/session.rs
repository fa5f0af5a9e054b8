//! Swipe session: one line in, one attendance attempt out.
//! Failures never leave `handle_line`; they are sorted into invalid swipes
//! and everything else, shown to the operator, and logged.

use anyhow::{Context, Result};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{info, warn};

use crate::attendance::Recorder;
use crate::sidelog::SideLog;
use crate::status::{Status, StatusSink};
use crate::store::RecordStore;
use crate::swipe::{self, InvalidSwipe};

const INVALID_SWIPE_NOTICE: &str = "Invalid swipe, please try again";
const UNKNOWN_ERROR_NOTICE: &str = "An unknown error occurred, please try again.";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    Recorded,
    InvalidSwipe,
    Failed,
}

pub struct Session<S, K> {
    recorder: Recorder<S>,
    event_id: String,
    side_log: SideLog,
    sink: K,
    status: Status,
}

impl<S: RecordStore, K: StatusSink> Session<S, K> {
    pub fn new(recorder: Recorder<S>, event_id: &str, side_log: SideLog, sink: K) -> Self {
        Self {
            recorder,
            event_id: event_id.to_string(),
            side_log,
            sink,
            status: Status::default(),
        }
    }

    pub fn status(&self) -> Status {
        self.status
    }

    fn transition(&mut self, next: Status) {
        self.status = next;
        self.sink.show(&self.status);
    }

    /// Reads swipes until the input closes.
    pub async fn run<R: AsyncBufRead + Unpin>(&mut self, mut input: R) -> Result<()> {
        self.sink.show(&self.status);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            let read = input
                .read_until(b'\n', &mut buf)
                .await
                .context("Failed to read swipe input")?;
            if read == 0 {
                break;
            }
            // A garbled read is a bad swipe, not the end of input
            let line = String::from_utf8_lossy(trim_line_ending(&buf)).into_owned();
            self.handle_line(&line).await;
        }
        info!(swipes = self.status.swipes, "input closed");
        Ok(())
    }

    pub async fn handle_line(&mut self, line: &str) -> Outcome {
        match self.process(line).await {
            Ok(()) => {
                self.transition(self.status.finish());
                Outcome::Recorded
            }
            Err(e) if e.downcast_ref::<InvalidSwipe>().is_some() => {
                // Kept for forensics even though it never reached the store
                self.side_log.record_scan(line);
                self.sink.notify(INVALID_SWIPE_NOTICE);
                Outcome::InvalidSwipe
            }
            Err(e) => {
                warn!(error = %format!("{e:#}"), "swipe failed");
                self.side_log.record_error(&format!("{e:#}"));
                // Redraw first so the notice stays on screen under the status
                self.transition(self.status.finish());
                self.sink.notify(UNKNOWN_ERROR_NOTICE);
                Outcome::Failed
            }
        }
    }

    async fn process(&mut self, line: &str) -> Result<()> {
        let record = swipe::parse(line)?;

        self.transition(self.status.begin_swipe());
        self.side_log.record_scan(&record.net_id);

        self.recorder
            .record_attendance(&self.event_id, &record.net_id)
            .await
    }
}

fn trim_line_ending(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}
