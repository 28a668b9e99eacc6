use std::io::{self, Write};
use std::time::Duration;
use tokio::time::sleep;

pub const RECONNECT_PREFIX: &str = "Attempt to connect to the server";

/// Console progress indicator shown while something is being retried.
///
/// One cycle prints the prefix, then a dot after each of three ticks, waits a
/// fourth tick and returns the cursor to the start of the line.
#[derive(Debug, Clone)]
pub struct WaitingIndicator {
    prefix: String,
    tick: Duration,
    visible: bool,
}

impl WaitingIndicator {
    pub fn new(prefix: impl Into<String>, tick: Duration) -> Self {
        Self {
            prefix: prefix.into(),
            tick,
            visible: true,
        }
    }

    /// Same timing, nothing printed.
    pub fn hidden(tick: Duration) -> Self {
        Self {
            prefix: String::new(),
            tick,
            visible: false,
        }
    }

    pub fn tick(&self) -> Duration {
        self.tick
    }

    pub fn cycle_duration(&self) -> Duration {
        self.tick * 4
    }

    /// Runs one cycle on stdout.
    pub async fn cycle(&self) {
        if self.visible {
            // A broken stdout must not stop the retry loop.
            let _ = self.cycle_to(&mut io::stdout()).await;
        } else {
            sleep(self.cycle_duration()).await;
        }
    }

    pub async fn cycle_to<W: Write>(&self, out: &mut W) -> io::Result<()> {
        write!(out, "{}", self.prefix)?;
        out.flush()?;
        for _ in 0..3 {
            sleep(self.tick).await;
            write!(out, ".")?;
            out.flush()?;
        }
        sleep(self.tick).await;
        write!(out, "\r")?;
        out.flush()
    }
}
