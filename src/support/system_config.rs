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

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// The configuration for a mailbox managed by mhstore.
///
/// This is stored in a file named `mhstore.toml`, by default in the current
/// directory.
#[derive(Clone, Debug, Deserialize, Serialize, Default)]
pub struct SystemConfig {
    /// Where the mailbox lives and how its files are named.
    #[serde(default)]
    pub mailbox: MailboxConfig,

    /// Where log output goes when not running interactively.
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct MailboxConfig {
    /// The mailbox root directory, holding `inbox`, `outbox`, `queue`,
    /// `draft`, `trash` and any user folders.
    pub root: PathBuf,

    /// The name of the mailbox, used to prefix log messages.
    pub name: String,

    /// The WHATWG label of the charset used for directory names on disk.
    ///
    /// Folder names are always handled as UTF-8 internally; they are
    /// converted to and from this charset whenever they touch the file
    /// system.
    pub locale_charset: String,

    /// If set, the permission bits applied to every message file added to
    /// the mailbox, e.g. `0o640` for a mailbox shared with a group.
    ///
    /// Added messages are then always copied, never hard-linked.
    ///
    /// Bookkeeping files next to the messages get the same bits plus group
    /// and other write wherever group or other read is granted.
    pub file_mode: Option<u32>,
}

impl Default for MailboxConfig {
    fn default() -> Self {
        MailboxConfig {
            root: PathBuf::from("Mail"),
            name: "Mail".to_owned(),
            locale_charset: "utf-8".to_owned(),
            file_mode: None,
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Path to a log4rs configuration file.
    ///
    /// If unset, or if the process is attached to a terminal, log messages
    /// are simply written to standard error.
    pub config: Option<PathBuf>,
}
