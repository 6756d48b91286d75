//! Helper to handle backend stdout/stderr output
//!
//! The backend's installer and server are chatty; piping their output keeps
//! the child from blocking on a full pipe, and re-emitting each line through
//! tracing keeps a single log stream for the worker.

use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Child;

use shared::{ProcessId, process_info, process_warn};

/// Pipe stdout/stderr so they can be consumed; stdin is closed
pub fn configure_child_stdio(cmd: &mut tokio::process::Command) {
    cmd.stdout(Stdio::piped()).stderr(Stdio::piped()).stdin(Stdio::null());
}

/// Spawn tasks that forward each output line as a tracing event
pub fn spawn_output_consumers(child: &mut Child) {
    if let Some(stdout) = child.stdout.take() {
        tokio::spawn(forward_lines(stdout, "stdout"));
    }

    if let Some(stderr) = child.stderr.take() {
        tokio::spawn(forward_lines(stderr, "stderr"));
    }
}

/// Forward output line by line until EOF.
///
/// Bytes that are not valid UTF-8 are replaced rather than ending the
/// stream; dropping the reader would close the pipe under the backend.
async fn forward_lines<R>(stream: R, name: &'static str)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(stream);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf);
                let line = line.trim_end();
                if !line.trim().is_empty() {
                    process_info!(ProcessId::Backend, stream = name, "{}", line);
                }
            }
            Err(e) => {
                process_warn!(ProcessId::Backend, stream = name, "Output stream closed: {}", e);
                break;
            }
        }
    }
}
