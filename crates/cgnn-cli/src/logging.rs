use anyhow::{anyhow, Context, Result};
use std::fs::File;
use std::io::{self, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing_subscriber::{filter::LevelFilter, fmt, fmt::MakeWriter, prelude::*};

/// Log file of the current run.
///
/// The subscriber is global, while every run writes `train.log` into its own
/// directory, so the file layer writes through this handle and each run
/// re-points it with [`RunLog::attach`].
#[derive(Clone, Default)]
pub struct RunLog {
    file: Arc<Mutex<Option<File>>>,
}

impl RunLog {
    pub fn attach(&self, path: &Path) -> Result<()> {
        let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
        let mut current = self
            .file
            .lock()
            .map_err(|_| anyhow!("run log lock poisoned"))?;
        *current = Some(file);
        Ok(())
    }
}

impl Write for RunLog {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self.file.lock() {
            Ok(mut guard) => match guard.as_mut() {
                Some(file) => file.write(buf),
                None => Ok(buf.len()),
            },
            Err(_) => Ok(buf.len()),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.file.lock() {
            Ok(mut guard) => guard.as_mut().map_or(Ok(()), |file| file.flush()),
            Err(_) => Ok(()),
        }
    }
}

impl<'a> MakeWriter<'a> for RunLog {
    type Writer = RunLog;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

fn level_filter(verbosity: u8, quiet: bool) -> LevelFilter {
    if quiet {
        LevelFilter::OFF
    } else {
        match verbosity {
            0 => LevelFilter::WARN,
            1 => LevelFilter::INFO,
            2 => LevelFilter::DEBUG,
            _ => LevelFilter::TRACE,
        }
    }
}

/// Installs a compact stderr layer at the requested verbosity and a plain file
/// layer that records at least `INFO` into the current run's log.
pub fn setup_logging(verbosity: u8, quiet: bool) -> Result<RunLog> {
    let run_log = RunLog::default();
    let stderr_layer = fmt::layer()
        .with_writer(io::stderr)
        .with_ansi(true)
        .with_target(false)
        .compact()
        .with_filter(level_filter(verbosity, quiet));
    let file_layer = fmt::layer()
        .with_writer(run_log.clone())
        .with_ansi(false)
        .with_target(true)
        .with_filter(level_filter(verbosity.max(1), false));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| anyhow!("cannot install logger: {e}"))?;
    Ok(run_log)
}
