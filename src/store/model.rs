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

//! Types shared by the folder driver and the message cache.

use std::fmt;
use std::num::NonZeroU32;
use std::str::FromStr;

use bitflags::bitflags;

/// Identifies a message within a single folder.
///
/// The number is also the name of the file holding the message. Numbers
/// start at 1 and are handed out in increasing order; a number is never
/// reassigned within a session even if the message holding it is removed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MsgNum(pub NonZeroU32);

impl MsgNum {
    pub fn of(num: u32) -> Option<Self> {
        NonZeroU32::new(num).map(MsgNum)
    }

    #[cfg(test)]
    pub fn u(num: u32) -> Self {
        MsgNum::of(num).unwrap()
    }

    pub fn get(self) -> u32 {
        self.0.get()
    }

    /// Interpret a file name as a message number.
    ///
    /// Only names consisting entirely of ASCII digits qualify. Names that
    /// overflow or denote 0 are not message files either.
    pub fn from_file_name(name: &[u8]) -> Option<Self> {
        if name.is_empty() || !name.iter().all(u8::is_ascii_digit) {
            return None;
        }

        std::str::from_utf8(name)
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
            .and_then(MsgNum::of)
    }
}

impl fmt::Display for MsgNum {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for MsgNum {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<NonZeroU32>().map(MsgNum)
    }
}

bitflags! {
    /// Message state that persists indefinitely, stored in the mark file.
    pub struct PermFlags: u32 {
        const NEW = 1 << 0;
        const UNREAD = 1 << 1;
        const MARKED = 1 << 2;
        const DELETED = 1 << 3;
        const REPLIED = 1 << 4;
    }
}

bitflags! {
    /// Message state tied to the current session or to the folder the
    /// message sits in.
    ///
    /// Only the bits in `TmpFlags::CACHED` survive a round trip through the
    /// header cache; the rest are derived again when the folder is opened.
    pub struct TmpFlags: u32 {
        const QUEUED = 1 << 0;
        const DRAFT = 1 << 1;
        const FORWARDED = 1 << 2;
        const MOVE = 1 << 3;
        const COPY = 1 << 4;
        const MIME = 1 << 5;
        const CACHED = Self::FORWARDED.bits | Self::MIME.bits;
    }
}

impl Default for PermFlags {
    fn default() -> Self {
        PermFlags::empty()
    }
}

impl Default for TmpFlags {
    fn default() -> Self {
        TmpFlags::empty()
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MsgFlags {
    pub perm: PermFlags,
    pub tmp: TmpFlags,
}

impl MsgFlags {
    pub fn new(perm: PermFlags, tmp: TmpFlags) -> Self {
        MsgFlags { perm, tmp }
    }

    /// Whether the message is an outgoing message still carrying its queue
    /// or draft control headers.
    pub fn has_control_headers(&self) -> bool {
        self.tmp.intersects(TmpFlags::QUEUED | TmpFlags::DRAFT)
    }
}

/// The role a folder plays in its mailbox.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SpecialFolder {
    Inbox,
    Outbox,
    Draft,
    Queue,
    Trash,
}

impl SpecialFolder {
    pub const ALL: [SpecialFolder; 5] = [
        SpecialFolder::Inbox,
        SpecialFolder::Outbox,
        SpecialFolder::Queue,
        SpecialFolder::Draft,
        SpecialFolder::Trash,
    ];

    /// The conventional directory name of this folder under the mailbox root.
    pub fn dir_name(self) -> &'static str {
        match self {
            SpecialFolder::Inbox => "inbox",
            SpecialFolder::Outbox => "outbox",
            SpecialFolder::Draft => "draft",
            SpecialFolder::Queue => "queue",
            SpecialFolder::Trash => "trash",
        }
    }

    pub fn for_dir_name(name: &str) -> Option<Self> {
        SpecialFolder::ALL
            .iter()
            .copied()
            .find(|s| s.dir_name() == name)
    }
}

/// Parsed header data and state of a single message.
///
/// Instances shared between the cache and its callers are wrapped in `Arc`
/// and never mutated in place; to change one, clone it, modify the clone, and
/// hand it back to the cache with `MsgCache::update()`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MsgInfo {
    pub num: Option<MsgNum>,
    /// The path of the folder holding the message, relative to the mailbox
    /// root. This is a plain name, not a reference keeping the folder alive.
    pub folder: Option<String>,

    pub size: u64,
    /// Modification time of the message file, in seconds since the epoch.
    pub mtime: i64,
    /// The `Date` header as seconds since the epoch, or 0 if unparsable.
    pub date_t: i64,
    pub flags: MsgFlags,

    pub fromname: String,
    pub date: String,
    pub from: String,
    pub to: String,
    pub cc: String,
    pub newsgroups: String,
    pub subject: String,
    pub msgid: String,
    pub inreplyto: String,
    pub references: String,
}
