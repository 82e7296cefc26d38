//-
// Copyright (c) 2020, Jason Lingle
//
// This file is part of Mhstore.
//
// Mhstore is free software: you can  redistribute it and/or modify it under the
// terms of  the GNU General Public  License as published by  the Free Software
// Foundation, either version  3 of the License, or (at  your option) any later
// version.
//
// Mhstore is distributed  in the hope that  it will be useful,  but WITHOUT ANY
// WARRANTY; without  even the implied  warranty of MERCHANTABILITY  or FITNESS
// FOR  A PARTICULAR  PURPOSE.  See the  GNU General  Public  License for  more
// details.
//
// You should have received a copy of the GNU General Public License along with
// Mhstore. If not, see <http://www.gnu.org/licenses/>.

//! Control headers on queued and draft messages.
//!
//! Messages waiting in the queue (and drafts saved for later sending) start
//! with a block of short `KEY:value` lines that tell the sender which account,
//! server and recipients to use. They precede the real RFC 2822 header and
//! must not leak into copies of the message placed anywhere else.

use std::collections::HashSet;
use std::io::{self, BufRead, Write};

use lazy_static::lazy_static;

lazy_static! {
    static ref CONTROL_KEYS: HashSet<&'static [u8]> = {
        let keys: [&'static [u8]; 22] = [
            b"AF", b"NF", b"PS", b"SRH", b"SFN", b"DSR", b"MID", b"CFG",
            b"PT", b"S", b"RQ", b"SSV", b"NSV", b"SSH", b"R", b"NG", b"MAID",
            b"NAID", b"SCF", b"RMID", b"FMID", b"RRCPT",
        ];
        keys.iter().copied().collect()
    };
}

/// Whether `line` is a control header line.
pub fn is_control_line(line: &[u8]) -> bool {
    line.iter()
        .position(|&b| b == b':')
        .map_or(false, |colon| CONTROL_KEYS.contains(&line[..colon]))
}

/// Copy `src` to `dst`, dropping the leading block of control header lines.
///
/// Everything from the first line that is not a control header onwards is
/// copied verbatim.
pub fn copy_without_control_headers(
    mut src: impl BufRead,
    mut dst: impl Write,
) -> io::Result<()> {
    let mut line = Vec::new();
    loop {
        line.clear();
        if 0 == src.read_until(b'\n', &mut line)? {
            return Ok(());
        }

        if !is_control_line(&line) {
            dst.write_all(&line)?;
            break;
        }
    }

    io::copy(&mut src, &mut dst)?;
    Ok(())
}
