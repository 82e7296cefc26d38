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

//! The per-folder message cache.
//!
//! Parsing the header of every message each time a folder is opened is slow,
//! so the parsed data is kept in two binary files inside the folder
//! directory. Both are rewritten in full whenever the cache is saved.
//!
//! # Header cache (`.mh_cache`)
//!
//! - u32: `CACHE_VERSION`
//! - Records to end of file, each consisting of:
//!   - u32: message number
//!   - u64: file size
//!   - i64: file mtime
//!   - i64: parsed `Date` header
//!   - u32: temporary flags (only `TmpFlags::CACHED` bits are meaningful)
//!   - ten strings, in order: from-name, date, from, to, cc, newsgroups,
//!     subject, message-id, in-reply-to, references
//!
//! A string is a u32 byte length followed by exactly that many bytes of
//! UTF-8, with no terminator.
//!
//! # Mark file (`.mh_mark`)
//!
//! - u32: `MARK_VERSION`
//! - Pairs to end of file of u32 message number, u32 permanent flags.
//!
//! The mark file is separate so that flag changes (which are frequent) never
//! require rewriting header data (which is large).
//!
//! All integers are native-endian and native-width: these files never leave
//! the machine that wrote them, and a foreign file simply fails the version
//! check.
//!
//! # Damage
//!
//! A header cache with the wrong version is ignored outright. A record cut
//! short, or carrying an implausible string length, ends loading at that
//! point; everything before it is kept. A mark file with the wrong version is
//! ignored without affecting the header data.

use std::collections::HashMap;
use std::fs;
use std::io::{self, Read, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;
use std::sync::Arc;

use byteorder::{NativeEndian, ReadBytesExt, WriteBytesExt};
use log::{info, warn};

use super::folder::FolderItem;
use super::model::{MsgInfo, MsgNum, PermFlags, SpecialFolder, TmpFlags};
use crate::support::error::Error;
use crate::support::file_ops::{self, ReadUninterruptibly};
use crate::support::log_prefix::LogPrefix;

pub const CACHE_VERSION: u32 = 0x0022;
pub const MARK_VERSION: u32 = 2;

/// Strings longer than this are taken as a sign of corruption.
const MAX_STRING_LEN: u32 = 1 << 20;

/// An in-memory map from message number to shared message data.
///
/// Entries are handed out as `Arc`s; the cache is one holder among possibly
/// many, and dropping the cache only releases its own references.
pub struct MsgCache {
    log_prefix: LogPrefix,
    entries: HashMap<MsgNum, Arc<MsgInfo>>,
}

impl MsgCache {
    pub fn new(log_prefix: LogPrefix) -> Self {
        MsgCache {
            log_prefix,
            entries: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Insert a copy of `msginfo` under its own message number.
    ///
    /// Records without a number cannot be cached and are ignored.
    pub fn add(&mut self, msginfo: &MsgInfo) {
        match msginfo.num {
            Some(num) => {
                self.entries.insert(num, Arc::new(msginfo.clone()));
            }
            None => warn!(
                "{} Refusing to cache message without a number",
                self.log_prefix
            ),
        }
    }

    /// Drop the entry for `num`, if there is one.
    pub fn remove(&mut self, num: MsgNum) {
        self.entries.remove(&num);
    }

    /// Replace the cached entry for a message with a copy of `msginfo`.
    ///
    /// The entry evicted is the one under `msginfo.num`, i.e. the number
    /// stored in the *new* record. If the caller changed the number before
    /// calling this, the entry under the old number stays behind; use
    /// `remove()` on the old number in that case.
    pub fn update(&mut self, msginfo: &MsgInfo) {
        if let Some(num) = msginfo.num {
            self.remove(num);
        }
        self.add(msginfo);
    }

    pub fn get(&self, num: MsgNum) -> Option<Arc<MsgInfo>> {
        self.entries.get(&num).cloned()
    }

    /// Return every entry, ordered by message number.
    pub fn get_all(&self) -> Vec<Arc<MsgInfo>> {
        let mut all = self.entries.values().cloned().collect::<Vec<_>>();
        all.sort_by_key(|m| m.num);
        all
    }

    pub fn get_by_message_id(&self, msgid: &str) -> Option<Arc<MsgInfo>> {
        self.entries
            .values()
            .find(|m| m.msgid == msgid)
            .cloned()
    }

    /// Return the numbers of all cached messages, in ascending order.
    pub fn num_list(&self) -> Vec<MsgNum> {
        let mut nums = self.entries.keys().copied().collect::<Vec<_>>();
        nums.sort_unstable();
        nums
    }

    pub fn last_num(&self) -> Option<MsgNum> {
        self.entries.keys().copied().max()
    }

    /// Load the cache of `item` from `cache_path` and `mark_path`.
    ///
    /// This never fails; any problem with the files results in less (or no)
    /// data being loaded, which the caller makes up for by parsing the
    /// message files themselves.
    pub fn read(
        log_prefix: LogPrefix,
        cache_path: &Path,
        mark_path: &Path,
        item: &FolderItem,
    ) -> Self {
        let mut loaded = HashMap::new();

        match fs::File::open(cache_path) {
            Ok(f) => read_headers(
                &log_prefix,
                io::BufReader::new(f),
                item,
                &mut loaded,
            ),
            Err(e) if io::ErrorKind::NotFound == e.kind() => (),
            Err(e) => warn!(
                "{} Failed to open {}, ignoring cache: {}",
                log_prefix,
                cache_path.display(),
                e
            ),
        }

        if !loaded.is_empty() {
            match fs::File::open(mark_path) {
                Ok(f) => {
                    read_marks(&log_prefix, io::BufReader::new(f), &mut loaded)
                }
                Err(e) if io::ErrorKind::NotFound == e.kind() => (),
                Err(e) => warn!(
                    "{} Failed to open {}, ignoring marks: {}",
                    log_prefix,
                    mark_path.display(),
                    e
                ),
            }
        }

        info!(
            "{} Loaded {} cached message(s)",
            log_prefix,
            loaded.len()
        );

        MsgCache {
            log_prefix,
            entries: loaded
                .into_iter()
                .map(|(num, info)| (num, Arc::new(info)))
                .collect(),
        }
    }

    /// Write the whole cache out to `cache_path` and `mark_path`.
    ///
    /// Both files are truncated and rewritten in place. If `mode` is given,
    /// it is applied to both files.
    pub fn write(
        &self,
        cache_path: &Path,
        mark_path: &Path,
        mode: Option<u32>,
    ) -> Result<(), Error> {
        let mut cache_out = io::BufWriter::new(create_truncate(cache_path)?);
        let mut mark_out = io::BufWriter::new(create_truncate(mark_path)?);

        cache_out.write_u32::<NativeEndian>(CACHE_VERSION)?;
        mark_out.write_u32::<NativeEndian>(MARK_VERSION)?;

        for msginfo in self.get_all() {
            write_header_record(&mut cache_out, &msginfo)?;
            write_mark_record(&mut mark_out, &msginfo)?;
        }

        cache_out.flush()?;
        mark_out.flush()?;

        if let Some(mode) = mode {
            file_ops::chmod(cache_path, mode)?;
            file_ops::chmod(mark_path, mode)?;
        }

        info!(
            "{} Wrote {} message(s) to {}",
            self.log_prefix,
            self.entries.len(),
            cache_path.display()
        );
        Ok(())
    }
}

fn create_truncate(path: &Path) -> io::Result<fs::File> {
    fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)
}

fn read_headers(
    log_prefix: &LogPrefix,
    mut reader: impl Read,
    item: &FolderItem,
    dst: &mut HashMap<MsgNum, MsgInfo>,
) {
    match reader.read_u32::<NativeEndian>() {
        Ok(CACHE_VERSION) => (),
        Ok(version) => {
            info!(
                "{} Cache version {:#x} is not {:#x}, discarding it",
                log_prefix, version, CACHE_VERSION
            );
            return;
        }
        Err(e) => {
            warn!("{} Can't read cache version: {}", log_prefix, e);
            return;
        }
    }

    loop {
        match read_header_record(&mut reader) {
            Ok(Some(mut msginfo)) => {
                msginfo.folder = Some(item.path.clone());
                msginfo.flags.tmp |= folder_tmp_flags(item);
                if let Some(num) = msginfo.num {
                    dst.insert(num, msginfo);
                }
            }
            Ok(None) => break,
            Err(e) => {
                warn!(
                    "{} Cache is damaged after {} record(s): {}",
                    log_prefix,
                    dst.len(),
                    e
                );
                break;
            }
        }
    }
}

fn read_marks(
    log_prefix: &LogPrefix,
    mut reader: impl Read,
    dst: &mut HashMap<MsgNum, MsgInfo>,
) {
    match reader.read_u32::<NativeEndian>() {
        Ok(MARK_VERSION) => (),
        Ok(version) => {
            info!(
                "{} Mark file version {} is not {}, discarding it",
                log_prefix, version, MARK_VERSION
            );
            return;
        }
        Err(e) => {
            warn!("{} Can't read mark file version: {}", log_prefix, e);
            return;
        }
    }

    loop {
        match read_mark_record(&mut reader) {
            Ok(Some((num, perm))) => {
                if let Some(msginfo) = dst.get_mut(&num) {
                    msginfo.flags.perm = perm;
                }
            }
            Ok(None) => break,
            Err(e) => {
                warn!("{} Mark file is damaged: {}", log_prefix, e);
                break;
            }
        }
    }
}

/// Temporary flags implied by the folder a message sits in.
pub(super) fn folder_tmp_flags(item: &FolderItem) -> TmpFlags {
    match item.stype {
        Some(SpecialFolder::Queue) => TmpFlags::QUEUED,
        Some(SpecialFolder::Draft) => TmpFlags::DRAFT,
        _ => TmpFlags::empty(),
    }
}

/// Read the leading message number of a record.
///
/// Returns `None` on a clean end of file, i.e. no bytes at all.
fn read_record_num(mut reader: impl Read) -> io::Result<Option<MsgNum>> {
    let mut buf = [0u8; 4];
    match reader.read_uninteruptibly(&mut buf)? {
        0 => return Ok(None),
        4 => (),
        _ => {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "Truncated message number",
            ))
        }
    }

    MsgNum::of(u32::from_ne_bytes(buf)).map(Some).ok_or_else(|| {
        io::Error::new(io::ErrorKind::InvalidData, "Message number 0")
    })
}

fn read_header_record(mut reader: impl Read) -> io::Result<Option<MsgInfo>> {
    let num = match read_record_num(&mut reader)? {
        None => return Ok(None),
        Some(num) => num,
    };

    let mut msginfo = MsgInfo {
        num: Some(num),
        ..MsgInfo::default()
    };
    msginfo.size = reader.read_u64::<NativeEndian>()?;
    msginfo.mtime = reader.read_i64::<NativeEndian>()?;
    msginfo.date_t = reader.read_i64::<NativeEndian>()?;
    msginfo.flags.tmp = TmpFlags::from_bits_truncate(
        reader.read_u32::<NativeEndian>()?,
    ) & TmpFlags::CACHED;

    for field in string_fields_mut(&mut msginfo).iter_mut() {
        **field = read_string(&mut reader)?;
    }

    Ok(Some(msginfo))
}

fn write_header_record(
    mut writer: impl Write,
    msginfo: &MsgInfo,
) -> io::Result<()> {
    writer.write_u32::<NativeEndian>(record_num(msginfo)?)?;
    writer.write_u64::<NativeEndian>(msginfo.size)?;
    writer.write_i64::<NativeEndian>(msginfo.mtime)?;
    writer.write_i64::<NativeEndian>(msginfo.date_t)?;
    writer.write_u32::<NativeEndian>(
        (msginfo.flags.tmp & TmpFlags::CACHED).bits(),
    )?;

    for field in &string_fields(msginfo) {
        write_string(&mut writer, field)?;
    }

    Ok(())
}

fn read_mark_record(
    mut reader: impl Read,
) -> io::Result<Option<(MsgNum, PermFlags)>> {
    let num = match read_record_num(&mut reader)? {
        None => return Ok(None),
        Some(num) => num,
    };

    let perm = PermFlags::from_bits_truncate(reader.read_u32::<NativeEndian>()?);
    Ok(Some((num, perm)))
}

fn write_mark_record(
    mut writer: impl Write,
    msginfo: &MsgInfo,
) -> io::Result<()> {
    writer.write_u32::<NativeEndian>(record_num(msginfo)?)?;
    writer.write_u32::<NativeEndian>(msginfo.flags.perm.bits())?;
    Ok(())
}

fn record_num(msginfo: &MsgInfo) -> io::Result<u32> {
    msginfo.num.map(MsgNum::get).ok_or_else(|| {
        io::Error::new(io::ErrorKind::InvalidInput, "Message without number")
    })
}

fn string_fields(msginfo: &MsgInfo) -> [&str; 10] {
    [
        msginfo.fromname.as_str(),
        msginfo.date.as_str(),
        msginfo.from.as_str(),
        msginfo.to.as_str(),
        msginfo.cc.as_str(),
        msginfo.newsgroups.as_str(),
        msginfo.subject.as_str(),
        msginfo.msgid.as_str(),
        msginfo.inreplyto.as_str(),
        msginfo.references.as_str(),
    ]
}

fn string_fields_mut(msginfo: &mut MsgInfo) -> [&mut String; 10] {
    [
        &mut msginfo.fromname,
        &mut msginfo.date,
        &mut msginfo.from,
        &mut msginfo.to,
        &mut msginfo.cc,
        &mut msginfo.newsgroups,
        &mut msginfo.subject,
        &mut msginfo.msgid,
        &mut msginfo.inreplyto,
        &mut msginfo.references,
    ]
}

fn read_string(mut reader: impl Read) -> io::Result<String> {
    let len = reader.read_u32::<NativeEndian>()?;
    if len > MAX_STRING_LEN {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("Implausible string length {}", len),
        ));
    }

    let mut buf = vec![0u8; len as usize];
    reader.read_exact(&mut buf)?;
    Ok(String::from_utf8(buf)
        .unwrap_or_else(|e| String::from_utf8_lossy(e.as_bytes()).into_owned()))
}

/// Write `s`, clipped to `MAX_STRING_LEN` bytes at a character boundary.
///
/// A header that long is legal in a message, but is never worth caching in
/// full.
fn write_string(mut writer: impl Write, s: &str) -> io::Result<()> {
    let mut len = s.len().min(MAX_STRING_LEN as usize);
    while !s.is_char_boundary(len) {
        len -= 1;
    }

    writer.write_u32::<NativeEndian>(len as u32)?;
    writer.write_all(s[..len].as_bytes())
}
