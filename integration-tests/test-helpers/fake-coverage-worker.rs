// Copyright (c) The covgen Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! A fake coverage worker for testing the controller.
//!
//! Speaks the real result protocol, but instead of running tests it reports whatever its script
//! says. The script path is the only argument.

use color_eyre::{
    Result,
    eyre::{WrapErr, eyre},
};
use covgen_runner::{
    protocol::encode_message,
    worker::{AGENT_ENV, CLASS_PATH_ENV, WorkerConnection},
};
use integration_tests::worker_script::{Behavior, ReceivedRun, ResultOrder, WorkerScript};
use std::{
    io::Write,
    net::Shutdown,
    process::{self, Command, Stdio},
    thread,
    time::Duration,
};

fn main() -> Result<()> {
    color_eyre::install()?;

    let script_path = std::env::args()
        .nth(1)
        .ok_or_else(|| eyre!("usage: fake-coverage-worker <script.json>"))?;
    let script = std::fs::read_to_string(&script_path)
        .wrap_err_with(|| format!("failed to read script at {script_path}"))?;
    let script: WorkerScript = serde_json::from_str(&script).wrap_err("failed to parse script")?;

    if let Some(pid_file) = &script.pid_file {
        std::fs::write(pid_file, process::id().to_string()).wrap_err("failed to write pid")?;
    }
    if let Some(orphan_pid_file) = &script.orphan_pid_file {
        let orphan = Command::new("sleep")
            .arg("300")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .wrap_err("failed to spawn orphan")?;
        std::fs::write(orphan_pid_file, orphan.id().to_string())
            .wrap_err("failed to write orphan pid")?;
    }
    for line in &script.stderr_lines {
        eprintln!("{line}");
    }

    if script.behavior == Behavior::NeverConnect {
        thread::sleep(Duration::from_secs(600));
        return Ok(());
    }

    let mut conn = WorkerConnection::from_env()?;
    let arguments = conn.receive_arguments()?;
    println!("received {} tests", arguments.tests.len());

    if let Some(received_file) = &script.received_file {
        let received = ReceivedRun {
            arguments: arguments.clone(),
            class_path: std::env::var(CLASS_PATH_ENV).ok(),
            agent: std::env::var(AGENT_ENV).ok(),
        };
        std::fs::write(received_file, serde_json::to_string(&received)?)?;
    }

    let mut tests = arguments.tests;
    if script.order == ResultOrder::Reversed {
        tests.reverse();
    }

    let last = tests.len().saturating_sub(1);
    for (index, test) in tests.iter().enumerate() {
        match script.behavior {
            Behavior::CrashAfter { results, exit_code } if index == results => {
                eprintln!("fake worker crashing after {results} results");
                process::exit(exit_code);
            }
            Behavior::StallAfter { results } if index == results => {
                eprintln!("fake worker stalling after {results} results");
                thread::sleep(Duration::from_secs(600));
                return Ok(());
            }
            Behavior::CorruptFrame { corruption } if index == last => {
                let mut stream = conn.into_inner();
                stream.write_all(&corruption.frame_bytes())?;
                stream.flush()?;
                stream.shutdown(Shutdown::Both)?;
                return Ok(());
            }
            _ => {}
        }

        let result = script.result_for(test);
        if script.behavior == Behavior::TruncateFinal && index == last {
            let frame = encode_message(&result)?;
            let mut stream = conn.into_inner();
            stream.write_all(&frame[..frame.len() / 2])?;
            stream.flush()?;
            return Ok(());
        }
        conn.send_result(&result)?;
    }
    conn.finish()?;

    match script.behavior {
        Behavior::ExitCode { code } => process::exit(code),
        Behavior::HangAfterClose => {
            thread::sleep(Duration::from_secs(600));
            Ok(())
        }
        _ => Ok(()),
    }
}
