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

use std::fmt;

/// Text included at the start of every log statement about a mailbox, and
/// optionally one of its folders.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogPrefix {
    mailbox: String,
    folder: Option<String>,
}

impl LogPrefix {
    pub fn new(mailbox: String) -> Self {
        Self {
            mailbox: sanitise(mailbox),
            folder: None,
        }
    }

    /// Derive the prefix for statements about the folder at `path`.
    pub fn for_folder(&self, path: &str) -> Self {
        Self {
            mailbox: self.mailbox.clone(),
            folder: Some(sanitise(path.to_owned())),
        }
    }
}

impl fmt::Display for LogPrefix {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.mailbox)?;
        if let Some(ref folder) = self.folder {
            write!(f, "[{}]", folder)?;
        }
        Ok(())
    }
}

fn sanitise(mut s: String) -> String {
    s.retain(|c| !c.is_control());
    if let Some((truncate_len, _)) = s.char_indices().nth(64) {
        s.truncate(truncate_len);
    }

    s
}
