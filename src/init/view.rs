// SPDX-License-Identifier: Apache-2.0

use std::io::{self, BufRead, Write};

use super::BoxError;
use super::args::ViewArgs;
use crate::viewer::{Flow, Key, ViewerState};

pub fn run_view(args: ViewArgs) -> Result<(), BoxError> {
    let state = ViewerState::load(&args.file_path)?;
    let stdout = io::stdout();
    let mut out = stdout.lock();

    if args.interactive {
        let stdin = io::stdin();
        run_interactive(state, stdin.lock(), &mut out, args.limit)?;
    } else {
        out.write_all(state.render(args.limit).as_bytes())?;
    }
    out.flush()?;
    Ok(())
}

/// Redraw after every recognised key read from `input`, one key per line.
/// Ends on quit or end of input.
pub fn run_interactive<R, W>(
    mut state: ViewerState,
    input: R,
    out: &mut W,
    limit: usize,
) -> io::Result<ViewerState>
where
    R: BufRead,
    W: Write,
{
    out.write_all(state.render(limit).as_bytes())?;

    for line in input.lines() {
        let Some(key) = Key::parse(&line?) else {
            continue;
        };
        if state.handle_key(key) == Flow::Quit {
            break;
        }
        writeln!(out)?;
        out.write_all(state.render(limit).as_bytes())?;
    }

    Ok(state)
}
