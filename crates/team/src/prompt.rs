// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::io::{self, BufRead, Write};

use crate::credential::device_code::DeviceCodePrompt;

/// Reads the device code from the terminal.
#[derive(Debug, Clone, Copy, Default)]
pub struct StdinPrompt;

impl DeviceCodePrompt for StdinPrompt {
    async fn prompt_device_code(&self) -> anyhow::Result<Option<String>> {
        let answer = tokio::task::spawn_blocking(|| {
            let stdin = io::stdin();
            let stdout = io::stdout();
            read_answer("Enter code: ", &mut stdin.lock(), &mut stdout.lock())
        })
        .await??;
        Ok(answer)
    }
}

/// Print `label` and read one line. `None` on end of input.
pub fn read_answer(
    label: &str,
    input: &mut impl BufRead,
    output: &mut impl Write,
) -> io::Result<Option<String>> {
    write!(output, "{label}")?;
    output.flush()?;

    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        return Ok(None);
    }
    Ok(Some(line.trim_end_matches(['\r', '\n']).to_owned()))
}
