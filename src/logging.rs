use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};

use tracing_subscriber::{fmt, EnvFilter};

/// Initialize logging to stdout and, when given and openable, a log file.
///
/// The filter comes from `RUST_LOG` and defaults to `info`.
pub fn init_logging(log_file: Option<&Path>) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let file = log_file.and_then(|path| match OpenOptions::new().create(true).append(true).open(path) {
        Ok(file) => Some(Arc::new(Mutex::new(file))),
        Err(e) => {
            eprintln!("could not open log file {}: {}", path.display(), e);
            None
        }
    });

    fmt()
        .with_env_filter(filter)
        .with_ansi(false)
        .with_writer(move || TeeWriter {
            stdout: io::stdout(),
            file: file.clone(),
        })
        .init();
}

/// Writer that duplicates all output to the log file.
struct TeeWriter {
    stdout: io::Stdout,
    file: Option<Arc<Mutex<File>>>,
}

impl Write for TeeWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.stdout.write(buf)?;
        if let Some(file) = &self.file {
            if let Ok(mut file) = file.lock() {
                let _ = file.write_all(&buf[..n]);
            }
        }
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        if let Some(file) = &self.file {
            if let Ok(mut file) = file.lock() {
                file.flush()?;
            }
        }
        self.stdout.flush()
    }
}
