// Copyright (c) Asymptotic Labs
// SPDX-License-Identifier: Apache-2.0

//! Child-process execution with a hard wall-clock kill.
//!
//! Processes are spawned into their own process group so that a timeout
//! takes the whole tree down, not just the immediate child.

use std::io::Result;
use std::process::{Command, Output, Stdio};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

/// Runs `args[0]` with the remaining arguments, capturing stdout/stderr.
pub fn run(args: &[String]) -> Result<Output> {
    Command::new(&args[0]).args(&args[1..]).output()
}

/// Like [`run`], but feeds `stdin` to the child and kills the child's
/// process group if it has not exited within `timeout`.
#[cfg(unix)]
pub fn run_with_timeout(args: &[String], stdin: Stdio, timeout: Duration) -> Result<Output> {
    use nix::sys::signal::{self, Signal};
    use nix::unistd::Pid;
    use std::os::unix::process::CommandExt;

    let child = Command::new(&args[0])
        .args(&args[1..])
        .process_group(0)
        .stdin(stdin)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()?;

    let pid = child.id() as i32;

    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let result = child.wait_with_output();
        let _ = tx.send(result);
    });

    match rx.recv_timeout(timeout) {
        Ok(result) => result,
        Err(_) => {
            let _ = signal::killpg(Pid::from_raw(pid), Signal::SIGKILL);
            Err(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                "process timed out",
            ))
        }
    }
}

#[cfg(windows)]
pub fn run_with_timeout(args: &[String], stdin: Stdio, timeout: Duration) -> Result<Output> {
    use std::os::windows::process::CommandExt;

    const CREATE_NEW_PROCESS_GROUP: u32 = 0x00000200;

    let child = Command::new(&args[0])
        .args(&args[1..])
        .creation_flags(CREATE_NEW_PROCESS_GROUP)
        .stdin(stdin)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()?;

    let pid = child.id();

    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let result = child.wait_with_output();
        let _ = tx.send(result);
    });

    match rx.recv_timeout(timeout) {
        Ok(result) => result,
        Err(_) => {
            let _ = Command::new("taskkill")
                .args(["/F", "/T", "/PID", &pid.to_string()])
                .output();
            Err(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                "process timed out",
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_captures_output() {
        let output = run(&["echo".to_string(), "hello".to_string()]).unwrap();
        assert!(output.status.success());
        assert_eq!(output.stdout, b"hello\n");
    }

    #[cfg(unix)]
    #[test]
    fn test_timeout_kills_slow_process() {
        let err = run_with_timeout(
            &["sleep".to_string(), "30".to_string()],
            Stdio::null(),
            Duration::from_millis(200),
        )
        .unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::TimedOut);
    }
}
