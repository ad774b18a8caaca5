// src/job/capture.rs

//! Output capture for a direct-mode editor.
//!
//! stdout and stderr are drained line by line (so the child never blocks on
//! a full pipe), echoed at debug level and appended to a per-run capture
//! file next to the session log. Some editor builds only print the script's
//! completion message to stdout, so the capture file doubles as a fallback
//! log for verification.

use std::path::{Path, PathBuf};

use tokio::fs::{self, File};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::process::Child;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy)]
enum Stream {
    Stdout,
    Stderr,
}

impl Stream {
    fn label(self) -> &'static str {
        match self {
            Stream::Stdout => "stdout",
            Stream::Stderr => "stderr",
        }
    }
}

/// Take the child's piped stdout/stderr and start draining them.
///
/// The returned handle completes once both streams reach EOF and the
/// capture file is flushed. Returns `None` when neither stream was piped.
pub fn spawn_output_capture(
    job: &str,
    child: &mut Child,
    capture_path: PathBuf,
) -> Option<JoinHandle<()>> {
    let stdout = child.stdout.take();
    let stderr = child.stderr.take();
    if stdout.is_none() && stderr.is_none() {
        return None;
    }

    let (tx, rx) = mpsc::channel::<String>(256);

    if let Some(stdout) = stdout {
        spawn_reader(job.to_string(), Stream::Stdout, stdout, tx.clone());
    }
    if let Some(stderr) = stderr {
        spawn_reader(job.to_string(), Stream::Stderr, stderr, tx.clone());
    }
    drop(tx);

    Some(tokio::spawn(write_capture(job.to_string(), capture_path, rx)))
}

fn spawn_reader<R>(job: String, stream: Stream, reader: R, tx: mpsc::Sender<String>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            debug!(job = %job, stream = stream.label(), "{}", line);
            if tx.send(line).await.is_err() {
                break;
            }
        }
    });
}

async fn write_capture(job: String, path: PathBuf, mut rx: mpsc::Receiver<String>) {
    let mut file = match open_capture(&path).await {
        Ok(file) => Some(file),
        Err(err) => {
            warn!(job = %job, path = %path.display(), error = %err, "cannot create capture file; output only logged");
            None
        }
    };

    while let Some(line) = rx.recv().await {
        let Some(f) = file.as_mut() else {
            continue;
        };
        let write = async {
            f.write_all(line.as_bytes()).await?;
            f.write_all(b"\n").await
        };
        if let Err(err) = write.await {
            warn!(job = %job, error = %err, "writing capture file failed; dropping further output");
            file = None;
        }
    }

    if let Some(mut f) = file {
        if let Err(err) = f.flush().await {
            warn!(job = %job, error = %err, "flushing capture file failed");
        }
    }
}

async fn open_capture(path: &Path) -> std::io::Result<File> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }
    File::create(path).await
}
