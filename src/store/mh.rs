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

//! The MH folder driver.
//!
//! # Layout
//!
//! Every folder is a directory under the mailbox root, and sub-folders are
//! sub-directories. Each message is a regular file directly inside its
//! folder's directory, named by the decimal message number and nothing else.
//! Any other file (`.mh_sequences`, the cache files, editor backups, ...) is
//! not a message and is left alone by every operation here. Directories whose
//! names start with `.` are not folders.
//!
//! # Numbering
//!
//! New messages are placed at `last_num + 1`. Placement never replaces an
//! existing file: hard links and exclusive creation both fail if the name is
//! taken, in which case the number is bumped and the next one is tried. This
//! makes it safe for several processes to deliver into the same folder, and
//! makes stale `last_num` values (or holes) harmless.
//!
//! Within a session, a folder's `last_num` only ever grows, so a number freed
//! by removing the newest message is not handed out again until the folder
//! is scanned afresh.

use std::collections::HashSet;
use std::convert::TryFrom;
use std::fs;
use std::io;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::{DirBuilderExt, MetadataExt, OpenOptionsExt};
use std::path::{Path, PathBuf};

use log::{info, warn};

use super::control_headers::copy_without_control_headers;
use super::driver::{FolderDriver, MsgSource};
use super::folder::{Folder, FolderItem};
use super::header::{HeaderParser, Rfc2822Parser};
use super::model::{MsgFlags, MsgInfo, MsgNum, PermFlags, SpecialFolder};
use super::msg_cache::{folder_tmp_flags, MsgCache};
use crate::support::charset::PathCharset;
use crate::support::error::Error;
use crate::support::file_ops::{
    self, ErrorTransforms, IgnoreKinds, Placement,
};
use crate::support::log_prefix::LogPrefix;
use crate::support::safe_name::is_safe_name;

pub const CACHE_FILE: &str = ".mh_cache";
pub const MARK_FILE: &str = ".mh_mark";
pub const SEQUENCES_FILE: &str = ".mh_sequences";

const DIR_MODE: u32 = 0o700;

/// `FolderDriver` for MH-style directories on the local file system.
pub struct MhDriver {
    log_prefix: LogPrefix,
    root: PathBuf,
    charset: PathCharset,
    parser: Box<dyn HeaderParser + Send + Sync>,
}

impl MhDriver {
    pub fn new(
        log_prefix: LogPrefix,
        root: PathBuf,
        charset: PathCharset,
    ) -> Self {
        MhDriver {
            log_prefix,
            root,
            charset,
            parser: Box::new(Rfc2822Parser),
        }
    }

    /// Use `parser` instead of the built-in header parser.
    pub fn with_parser(
        mut self,
        parser: impl HeaderParser + Send + Sync + 'static,
    ) -> Self {
        self.parser = Box::new(parser);
        self
    }

    pub fn log_prefix(&self) -> &LogPrefix {
        &self.log_prefix
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The directory backing the folder at `path`.
    pub fn folder_dir(&self, path: &str) -> PathBuf {
        if path.is_empty() {
            self.root.clone()
        } else {
            self.root.join(self.charset.to_fs(path))
        }
    }

    fn msg_path(&self, folder_path: &str, num: MsgNum) -> PathBuf {
        self.folder_dir(folder_path).join(num.to_string())
    }

    /// The header cache and mark file of `item`.
    pub fn cache_paths(&self, item: &FolderItem) -> (PathBuf, PathBuf) {
        let dir = self.folder_dir(&item.path);
        (dir.join(CACHE_FILE), dir.join(MARK_FILE))
    }

    /// List the message files directly inside `dir`, in no particular order.
    fn msg_files(&self, dir: &Path) -> Result<Vec<MsgNum>, Error> {
        let mut nums = Vec::new();
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            if let Some(num) =
                MsgNum::from_file_name(entry.file_name().as_bytes())
            {
                if entry.file_type()?.is_file() {
                    nums.push(num);
                }
            }
        }
        Ok(nums)
    }

    /// Find a free number in `dest` and hand its path to `place`, which must
    /// create the file there exclusively.
    ///
    /// `place` failing with `AlreadyExists` moves on to the next number.
    fn place_new(
        &self,
        dest: &mut FolderItem,
        mut place: impl FnMut(&Path) -> io::Result<()>,
    ) -> Result<(MsgNum, PathBuf), Error> {
        let dir = self.folder_dir(&dest.path);
        fs::DirBuilder::new()
            .recursive(true)
            .mode(DIR_MODE)
            .create(&dir)?;

        if dest.last_num < 0 {
            self.get_last_num(dest)?;
        }

        loop {
            let num = u32::try_from(dest.last_num + 1)
                .ok()
                .and_then(MsgNum::of)
                .ok_or(Error::MailboxFull)?;
            let path = dir.join(num.to_string());

            match place(&path) {
                Ok(()) => {
                    dest.see_num(num.get());
                    return Ok((num, path));
                }
                Err(e) if io::ErrorKind::AlreadyExists == e.kind() => {
                    dest.see_num(num.get());
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Place `source` into `dest`.
    ///
    /// With a file mode configured for `dest`, the data is always copied: a
    /// hard link shares its permissions with the source.
    fn add_one(
        &self,
        dest: &mut FolderItem,
        source: &MsgSource,
    ) -> Result<(MsgNum, PathBuf), Error> {
        let mode = dest.file_mode;
        let mut placement = Placement::Linked;
        let (num, path) = self.place_new(dest, |path| {
            placement = match mode {
                Some(_) => {
                    file_ops::copy_noclobber(&source.path, path, |r, w| {
                        io::copy(r, w).map(|_| ())
                    })?;
                    Placement::Copied
                }
                None => file_ops::link_or_copy(&source.path, path)?,
            };
            Ok(())
        })?;

        if let Some(mode) = mode {
            self.apply_file_mode(dest, &path, mode)?;
        }

        info!(
            "{} {} {} as {}/{}",
            self.log_prefix,
            match placement {
                Placement::Linked => "Linked",
                Placement::Copied => "Copied",
            },
            source.path.display(),
            dest.path,
            num
        );
        Ok((num, path))
    }

    /// Give the new message at `path` the configured `mode`, and open up the
    /// folder's sequences file to match.
    fn apply_file_mode(
        &self,
        dest: &FolderItem,
        path: &Path,
        mode: u32,
    ) -> Result<(), Error> {
        file_ops::chmod(path, mode)?;
        file_ops::chmod(
            self.folder_dir(&dest.path).join(SEQUENCES_FILE),
            file_ops::bookkeeping_mode(mode),
        )
        .ignore_not_found()?;
        Ok(())
    }

    /// Parse the message file at `path` as message `num` of `item`.
    fn parse_msg(
        &self,
        item: &FolderItem,
        path: &Path,
        num: MsgNum,
        mut flags: MsgFlags,
    ) -> Result<MsgInfo, Error> {
        flags.tmp |= folder_tmp_flags(item);
        let mut msginfo = self.parser.parse(path, flags)?;
        msginfo.num = Some(num);
        msginfo.folder = Some(item.path.clone());
        Ok(msginfo)
    }

    fn source_of<'a>(
        &self,
        msg: &'a MsgInfo,
    ) -> Result<(&'a str, MsgNum), Error> {
        match (msg.folder.as_deref(), msg.num) {
            (Some(folder), Some(num)) => Ok((folder, num)),
            _ => Err(Error::NxMessage),
        }
    }

    /// Bring `item` and its descendants in line with the directory tree.
    ///
    /// Top-level directories named like special folders are collected into
    /// `specials`. A sub-folder that can't be read is logged and left as it
    /// is; only failing to read `item`'s own directory is an error.
    fn scan_dir(
        &self,
        item: &mut FolderItem,
        specials: &mut Vec<(SpecialFolder, String)>,
    ) -> Result<(), Error> {
        let dir = self.folder_dir(&item.path);
        let mut total = 0;
        let mut subdirs = Vec::new();

        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            let raw_name = entry.file_name();
            if raw_name.as_bytes().starts_with(b".") {
                continue;
            }

            let file_type = entry.file_type()?;
            if file_type.is_dir() {
                subdirs.push(self.charset.from_fs(&raw_name).into_owned());
            } else if file_type.is_file()
                && MsgNum::from_file_name(raw_name.as_bytes()).is_some()
            {
                total += 1;
            }
        }

        if !item.cache_loaded {
            item.total = total;
        }

        for name in subdirs {
            let path = item.child_path(&name);
            let ix = match item.children.iter().position(|c| c.path == path) {
                Some(ix) => ix,
                None => {
                    let child = item.new_child(&name);
                    item.children.push(child);
                    item.children.len() - 1
                }
            };

            if item.is_root() {
                if let Some(special) = SpecialFolder::for_dir_name(&name) {
                    specials.push((special, path.clone()));
                }
            }

            if let Err(e) = self.scan_dir(&mut item.children[ix], specials) {
                warn!(
                    "{} Can't scan folder '{}', skipping it: {}",
                    self.log_prefix, path, e
                );
            }
        }

        item.children.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(())
    }

    /// Drop every descendant of `item` whose directory no longer exists.
    fn prune_missing(&self, item: &mut FolderItem) {
        for child in &mut item.children {
            self.prune_missing(child);
        }

        item.children.retain(|child| {
            let exists = self.folder_dir(&child.path).is_dir();
            if !exists {
                info!(
                    "{} Folder '{}' disappeared, forgetting it",
                    self.log_prefix, child.path
                );
            }
            exists
        });
    }

    fn create_sequences_file(
        &self,
        dir: &Path,
        mode: Option<u32>,
    ) -> Result<(), Error> {
        let path = dir.join(SEQUENCES_FILE);
        fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .mode(0o600)
            .open(&path)
            .map(|_| ())
            .ignore_already_exists()?;
        if let Some(mode) = mode {
            file_ops::chmod(&path, mode)?;
        }
        Ok(())
    }
}

impl FolderDriver for MhDriver {
    fn scan_tree(&self, folder: &mut Folder) -> Result<(), Error> {
        let mut found = Vec::new();
        self.scan_dir(&mut folder.root, &mut found)?;
        self.prune_missing(&mut folder.root);
        folder.forget_missing_specials();

        for (special, path) in found {
            if folder.special(special).is_some() {
                continue;
            }
            if let Some(item) = folder.item_mut(&path) {
                item.stype = Some(special);
                folder.set_special(special, path);
            }
        }

        info!(
            "{} Scanned {} folder(s) of '{}'",
            self.log_prefix,
            folder.root.walk().len() - 1,
            folder.name()
        );
        Ok(())
    }

    fn create_tree(&self, folder: &mut Folder) -> Result<(), Error> {
        for special in &SpecialFolder::ALL {
            let dir = self.folder_dir(special.dir_name());
            if !dir.is_dir() {
                fs::DirBuilder::new()
                    .recursive(true)
                    .mode(DIR_MODE)
                    .create(&dir)?;
                self.create_sequences_file(
                    &dir,
                    folder.root.bookkeeping_mode(),
                )?;
                info!("{} Created {}", self.log_prefix, special.dir_name());
            }
        }

        self.scan_tree(folder)
    }

    fn create_folder(
        &self,
        folder: &mut Folder,
        parent_path: &str,
        name: &str,
    ) -> Result<String, Error> {
        if !is_safe_name(name) {
            return Err(Error::UnsafeName);
        }

        let parent = folder.item_mut(parent_path).ok_or(Error::NxFolder)?;
        let child = parent.new_child(name);
        if parent.children.iter().any(|c| c.path == child.path) {
            return Err(Error::FolderExists);
        }

        let dir = self.folder_dir(&child.path);
        fs::DirBuilder::new()
            .mode(DIR_MODE)
            .create(&dir)
            .on_exists(Error::FolderExists)
            .on_not_found(Error::NxFolder)?;
        self.create_sequences_file(&dir, child.bookkeeping_mode())?;

        info!("{} Created folder '{}'", self.log_prefix, child.path);
        let path = child.path.clone();
        parent.children.push(child);
        parent.children.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(path)
    }

    fn remove_folder(
        &self,
        folder: &mut Folder,
        path: &str,
    ) -> Result<(), Error> {
        if path.is_empty() {
            return Err(Error::BadOperationOnRoot);
        }
        if folder.item(path).is_none() {
            return Err(Error::NxFolder);
        }

        fs::remove_dir_all(self.folder_dir(path)).ignore_not_found()?;
        folder.root.take(path);
        folder.forget_missing_specials();

        info!("{} Removed folder '{}'", self.log_prefix, path);
        Ok(())
    }

    fn rename_folder(
        &self,
        folder: &mut Folder,
        path: &str,
        new_name: &str,
    ) -> Result<String, Error> {
        if path.is_empty() {
            return Err(Error::BadOperationOnRoot);
        }
        if !is_safe_name(new_name) {
            return Err(Error::UnsafeName);
        }
        if folder.item(path).is_none() {
            return Err(Error::NxFolder);
        }

        let parent_path = path.rfind('/').map_or("", |ix| &path[..ix]);
        let new_path = if parent_path.is_empty() {
            new_name.to_owned()
        } else {
            format!("{}/{}", parent_path, new_name)
        };
        if new_path == path {
            return Ok(new_path);
        }

        let new_dir = self.folder_dir(&new_path);
        // rename(2) silently replaces an empty directory
        if folder.item(&new_path).is_some()
            || fs::symlink_metadata(&new_dir).is_ok()
        {
            return Err(Error::FolderExists);
        }

        fs::rename(self.folder_dir(path), &new_dir)
            .on_exists(Error::FolderExists)
            .on_not_found(Error::NxFolder)?;

        let item = folder.item_mut(path).ok_or(Error::NxFolder)?;
        item.name = new_name.to_owned();
        item.rewrite_paths(path, &new_path);
        folder.rewrite_specials(path, &new_path);
        if let Some(parent) = folder.item_mut(parent_path) {
            parent.children.sort_by(|a, b| a.name.cmp(&b.name));
        }

        info!(
            "{} Renamed folder '{}' to '{}'",
            self.log_prefix, path, new_path
        );
        Ok(new_path)
    }

    fn get_last_num(&self, item: &mut FolderItem) -> Result<(), Error> {
        let nums = self.msg_files(&self.folder_dir(&item.path))?;
        if let Some(max) = nums.into_iter().max() {
            item.see_num(max.get());
        } else if item.last_num < 0 {
            item.last_num = 0;
        }
        Ok(())
    }

    fn get_num_list(
        &self,
        item: &FolderItem,
    ) -> Result<HashSet<MsgNum>, Error> {
        Ok(self
            .msg_files(&self.folder_dir(&item.path))?
            .into_iter()
            .collect())
    }

    fn fetch_msg(
        &self,
        item: &FolderItem,
        num: MsgNum,
    ) -> Result<Option<PathBuf>, Error> {
        let path = self.msg_path(&item.path, num);
        match fs::metadata(&path) {
            Ok(md) if md.is_file() => Ok(Some(path)),
            Ok(_) => Ok(None),
            Err(e) if io::ErrorKind::NotFound == e.kind() => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn get_msginfo(
        &self,
        item: &FolderItem,
        num: MsgNum,
    ) -> Result<Option<MsgInfo>, Error> {
        let path = match self.fetch_msg(item, num)? {
            Some(path) => path,
            None => return Ok(None),
        };

        let flags = MsgFlags::new(
            PermFlags::NEW | PermFlags::UNREAD,
            Default::default(),
        );
        self.parse_msg(item, &path, num, flags).map(Some)
    }

    fn add_msgs(
        &self,
        dest: &mut FolderItem,
        sources: &[MsgSource],
        mut cache: Option<&mut MsgCache>,
    ) -> Result<Vec<MsgNum>, Error> {
        let mut added = Vec::with_capacity(sources.len());

        for source in sources {
            let (num, path) = match self.add_one(dest, source) {
                Ok(placed) => placed,
                Err(e) if added.is_empty() => return Err(e),
                Err(e) => {
                    warn!(
                        "{} Failed to add {} after {} message(s): {}",
                        self.log_prefix,
                        source.path.display(),
                        added.len(),
                        e
                    );
                    return Err(Error::PartialAdd {
                        added,
                        source: Box::new(e),
                    });
                }
            };
            added.push(num);

            if let Some(cache) = cache.as_mut() {
                match self.parse_msg(dest, &path, num, source.flags) {
                    Ok(msginfo) => cache.add(&msginfo),
                    Err(e) => warn!(
                        "{} Can't parse new message {}/{}: {}",
                        self.log_prefix, dest.path, num, e
                    ),
                }
            }
        }

        Ok(added)
    }

    fn copy_msg(
        &self,
        dest: &mut FolderItem,
        msg: &MsgInfo,
    ) -> Result<MsgNum, Error> {
        let (src_folder, src_num) = self.source_of(msg)?;
        if src_folder == dest.path {
            return Err(Error::CopyToSelf);
        }

        let src_path = self.msg_path(src_folder, src_num);
        let strip = msg.flags.has_control_headers()
            && !matches!(
                dest.stype,
                Some(SpecialFolder::Queue) | Some(SpecialFolder::Draft)
            );

        let (num, path) = self
            .place_new(dest, |path| {
                if strip {
                    file_ops::copy_noclobber(&src_path, path, |r, w| {
                        copy_without_control_headers(r, w)
                    })
                } else {
                    file_ops::copy_noclobber(&src_path, path, |r, w| {
                        io::copy(r, w).map(|_| ())
                    })
                }
            })
            .on_not_found(Error::NxMessage)?;

        if let Some(mode) = dest.file_mode {
            self.apply_file_mode(dest, &path, mode)?;
        }

        info!(
            "{} Copied {}/{} to {}/{}{}",
            self.log_prefix,
            src_folder,
            src_num,
            dest.path,
            num,
            if strip { " without control headers" } else { "" }
        );
        Ok(num)
    }

    fn move_msg(
        &self,
        dest: &mut FolderItem,
        msg: &MsgInfo,
    ) -> Result<MsgNum, Error> {
        let num = self.copy_msg(dest, msg)?;
        let (src_folder, src_num) = self.source_of(msg)?;
        fs::remove_file(self.msg_path(src_folder, src_num))
            .ignore_not_found()?;
        Ok(num)
    }

    fn remove_msg(&self, item: &FolderItem, num: MsgNum) -> Result<(), Error> {
        fs::remove_file(self.msg_path(&item.path, num))
            .on_not_found(Error::NxMessage)?;
        info!("{} Removed {}/{}", self.log_prefix, item.path, num);
        Ok(())
    }

    fn remove_all_msgs(&self, item: &FolderItem) -> Result<(), Error> {
        let dir = self.folder_dir(&item.path);
        let nums = self.msg_files(&dir)?;
        for &num in &nums {
            fs::remove_file(dir.join(num.to_string())).ignore_not_found()?;
        }

        info!(
            "{} Removed {} message(s) from '{}'",
            self.log_prefix,
            nums.len(),
            item.path
        );
        Ok(())
    }

    fn is_msg_changed(&self, msg: &MsgInfo) -> Result<bool, Error> {
        let (folder, num) = self.source_of(msg)?;
        match fs::metadata(self.msg_path(folder, num)) {
            Ok(md) => Ok(md.len() != msg.size || md.mtime() != msg.mtime),
            Err(e) if io::ErrorKind::NotFound == e.kind() => Ok(true),
            Err(e) => Err(e.into()),
        }
    }

    fn get_msg_list(
        &self,
        item: &mut FolderItem,
        use_cache: bool,
    ) -> Result<MsgCache, Error> {
        let cache_prefix = self.log_prefix.for_folder(&item.path);
        let mut cache = if use_cache {
            let (cache_path, mark_path) = self.cache_paths(item);
            MsgCache::read(cache_prefix, &cache_path, &mark_path, item)
        } else {
            MsgCache::new(cache_prefix)
        };

        let present = self.get_num_list(item)?;

        let mut stale = 0;
        for num in cache.num_list() {
            let changed = match cache.get(num) {
                Some(msginfo) => {
                    !present.contains(&num) || self.is_msg_changed(&msginfo)?
                }
                None => false,
            };
            if changed {
                cache.remove(num);
                stale += 1;
            }
        }

        let mut nums = present.into_iter().collect::<Vec<_>>();
        nums.sort_unstable();

        let mut parsed = 0;
        for &num in &nums {
            if cache.get(num).is_some() {
                continue;
            }

            match self.get_msginfo(item, num) {
                Ok(Some(msginfo)) => {
                    cache.add(&msginfo);
                    parsed += 1;
                }
                // Removed since listing the directory
                Ok(None) => (),
                Err(e) => warn!(
                    "{} Can't parse {}/{}: {}",
                    self.log_prefix, item.path, num, e
                ),
            }
        }

        match nums.last() {
            Some(last) => item.see_num(last.get()),
            None if item.last_num < 0 => item.last_num = 0,
            None => (),
        }
        item.cache_loaded = true;
        item.total = cache.len();

        info!(
            "{} '{}': {} message(s), {} dropped from cache, {} parsed",
            self.log_prefix,
            item.path,
            cache.len(),
            stale,
            parsed
        );
        Ok(cache)
    }

    fn write_cache(
        &self,
        item: &FolderItem,
        cache: &MsgCache,
    ) -> Result<(), Error> {
        let (cache_path, mark_path) = self.cache_paths(item);
        cache.write(&cache_path, &mark_path, item.bookkeeping_mode())
    }
}

#[cfg(test)]
mod test {
    use std::ffi::OsStr;
    use std::os::unix::fs::PermissionsExt;

    use tempfile::TempDir;

    use super::*;
    use crate::store::model::TmpFlags;

    struct Setup {
        root: TempDir,
        driver: MhDriver,
        folder: Folder,
    }

    fn set_up() -> Setup {
        crate::init_test_log();

        let root = TempDir::new().unwrap();
        let driver = MhDriver::new(
            LogPrefix::new("test".to_owned()),
            root.path().to_owned(),
            PathCharset::utf8(),
        );
        let mut folder = Folder::new("Mail".to_owned());
        driver.create_tree(&mut folder).unwrap();
        Setup {
            root,
            driver,
            folder,
        }
    }

    impl Setup {
        fn dir(&self, path: &str) -> PathBuf {
            self.root.path().join(path)
        }

        fn item(&self, special: SpecialFolder) -> FolderItem {
            self.folder.special_item(special).unwrap().clone()
        }

        fn source(&self, name: &str, content: &str) -> MsgSource {
            let path = self.root.path().join(name);
            fs::write(&path, content).unwrap();
            MsgSource {
                path,
                flags: MsgFlags::new(PermFlags::NEW, TmpFlags::empty()),
            }
        }

        fn msginfo(&self, item: &FolderItem, num: u32) -> MsgInfo {
            self.driver
                .get_msginfo(item, MsgNum::u(num))
                .unwrap()
                .unwrap()
        }
    }

    fn nums(list: &[u32]) -> HashSet<MsgNum> {
        list.iter().copied().map(MsgNum::u).collect()
    }

    const QUEUED_MSG: &str = "S:me@example.com\n\
                              SSV:smtp.example.com\n\
                              R:<you@example.com>\n\
                              From: me@example.com\n\
                              To: you@example.com\n\
                              Subject: Outgoing\n\
                              \n\
                              Hello\n";

    const PLAIN_MSG: &str = "From: me@example.com\n\
                             To: you@example.com\n\
                             Subject: Outgoing\n\
                             \n\
                             Hello\n";

    #[test]
    fn add_and_remove_scenario() {
        let setup = set_up();
        let mut inbox = setup.item(SpecialFolder::Inbox);
        for (name, size) in &[("1", 10), ("2", 20), ("3", 30)] {
            fs::write(setup.dir("inbox").join(name), vec![b'x'; *size])
                .unwrap();
        }

        setup.driver.get_last_num(&mut inbox).unwrap();
        assert_eq!(3, inbox.last_num);

        let src = setup.source("tmpfileA", PLAIN_MSG);
        let added = setup
            .driver
            .add_msgs(&mut inbox, &[src.clone()], None)
            .unwrap();
        assert_eq!(vec![MsgNum::u(4)], added);
        assert_eq!(4, inbox.last_num);
        assert_eq!(
            PLAIN_MSG.as_bytes(),
            &fs::read(setup.dir("inbox/4")).unwrap()[..]
        );
        // The source stays where it was
        assert!(src.path.is_file());

        setup.driver.remove_msg(&inbox, MsgNum::u(2)).unwrap();
        assert_eq!(
            None,
            setup.driver.fetch_msg(&inbox, MsgNum::u(2)).unwrap()
        );
        assert_eq!(nums(&[1, 3, 4]), setup.driver.get_num_list(&inbox).unwrap());
        assert_matches!(
            Err(Error::NxMessage),
            setup.driver.remove_msg(&inbox, MsgNum::u(2))
        );
    }

    #[test]
    fn add_skips_taken_numbers() {
        let setup = set_up();
        let mut inbox = setup.item(SpecialFolder::Inbox);
        fs::write(setup.dir("inbox/1"), "one").unwrap();
        setup.driver.get_last_num(&mut inbox).unwrap();

        // Another process delivers behind our back
        fs::write(setup.dir("inbox/2"), "two").unwrap();
        fs::write(setup.dir("inbox/3"), "three").unwrap();

        let src = setup.source("new", PLAIN_MSG);
        let added = setup.driver.add_msgs(&mut inbox, &[src], None).unwrap();
        assert_eq!(vec![MsgNum::u(4)], added);
        assert_eq!(b"three", &fs::read(setup.dir("inbox/3")).unwrap()[..]);
        assert_eq!(4, inbox.last_num);
    }

    #[test]
    fn numbers_are_not_reused_in_session() {
        let setup = set_up();
        let mut inbox = setup.item(SpecialFolder::Inbox);
        let src = setup.source("new", PLAIN_MSG);

        let added = setup
            .driver
            .add_msgs(&mut inbox, &[src.clone(), src.clone()], None)
            .unwrap();
        assert_eq!(vec![MsgNum::u(1), MsgNum::u(2)], added);

        setup.driver.remove_msg(&inbox, MsgNum::u(2)).unwrap();
        let added = setup.driver.add_msgs(&mut inbox, &[src], None).unwrap();
        assert_eq!(vec![MsgNum::u(3)], added);

        // A fresh scan only sees what is on disk
        let mut fresh = setup.item(SpecialFolder::Inbox);
        setup.driver.get_last_num(&mut fresh).unwrap();
        assert_eq!(3, fresh.last_num);
    }

    #[test]
    fn add_creates_missing_directories() {
        let setup = set_up();
        let mut item = FolderItem::new(
            "deep".to_owned(),
            "archive/2020/deep".to_owned(),
        );
        let src = setup.source("new", PLAIN_MSG);
        let added = setup.driver.add_msgs(&mut item, &[src], None).unwrap();
        assert_eq!(vec![MsgNum::u(1)], added);
        assert!(setup.dir("archive/2020/deep/1").is_file());
    }

    #[test]
    fn add_reports_partial_success() {
        let setup = set_up();
        let mut inbox = setup.item(SpecialFolder::Inbox);
        let good = setup.source("good", PLAIN_MSG);
        let bad = MsgSource {
            path: setup.dir("nx"),
            flags: MsgFlags::default(),
        };

        match setup
            .driver
            .add_msgs(&mut inbox, &[good.clone(), bad.clone(), good], None)
        {
            Err(Error::PartialAdd { added, source }) => {
                assert_eq!(vec![MsgNum::u(1)], added);
                assert_matches!(Error::Io(_), *source);
            }
            r => panic!("Unexpected result: {:?}", r),
        }
        assert_eq!(nums(&[1]), setup.driver.get_num_list(&inbox).unwrap());

        assert_matches!(
            Err(Error::Io(_)),
            setup.driver.add_msgs(&mut inbox, &[bad], None)
        );
    }

    #[test]
    fn add_fills_cache() {
        let setup = set_up();
        let mut queue = setup.item(SpecialFolder::Queue);
        let mut cache = MsgCache::new(LogPrefix::new("test".to_owned()));
        let mut src = setup.source("new", QUEUED_MSG);
        src.flags = MsgFlags::new(PermFlags::MARKED, TmpFlags::FORWARDED);

        let added = setup
            .driver
            .add_msgs(&mut queue, &[src], Some(&mut cache))
            .unwrap();
        let cached = cache.get(added[0]).unwrap();
        assert_eq!("Outgoing", cached.subject);
        assert_eq!(Some("queue".to_owned()), cached.folder);
        assert_eq!(PermFlags::MARKED, cached.flags.perm);
        assert_eq!(TmpFlags::FORWARDED | TmpFlags::QUEUED, cached.flags.tmp);
    }

    #[test]
    fn fetch_and_parse() {
        let setup = set_up();
        let draft = setup.item(SpecialFolder::Draft);
        fs::write(setup.dir("draft/7"), QUEUED_MSG).unwrap();
        fs::create_dir(setup.dir("draft/8")).unwrap();

        assert_eq!(
            Some(setup.dir("draft/7")),
            setup.driver.fetch_msg(&draft, MsgNum::u(7)).unwrap()
        );
        assert_eq!(None, setup.driver.fetch_msg(&draft, MsgNum::u(8)).unwrap());
        assert_eq!(None, setup.driver.get_msginfo(&draft, MsgNum::u(9)).unwrap());

        let msginfo = setup.msginfo(&draft, 7);
        assert_eq!(Some(MsgNum::u(7)), msginfo.num);
        assert_eq!(Some("draft".to_owned()), msginfo.folder);
        assert_eq!(PermFlags::NEW | PermFlags::UNREAD, msginfo.flags.perm);
        assert_eq!(TmpFlags::DRAFT, msginfo.flags.tmp);
        assert_eq!(QUEUED_MSG.len() as u64, msginfo.size);

        // Directories named like messages are not messages
        assert_eq!(nums(&[7]), setup.driver.get_num_list(&draft).unwrap());
    }

    #[test]
    fn copy_strips_control_headers_only_outside_queue_and_draft() {
        let setup = set_up();
        let queue = setup.item(SpecialFolder::Queue);
        let mut inbox = setup.item(SpecialFolder::Inbox);
        let mut draft = setup.item(SpecialFolder::Draft);
        let mut queue_dest = queue.clone();

        fs::write(setup.dir("queue/1"), QUEUED_MSG).unwrap();
        let msg = setup.msginfo(&queue, 1);
        assert!(msg.flags.has_control_headers());

        let num = setup.driver.copy_msg(&mut inbox, &msg).unwrap();
        assert_eq!(MsgNum::u(1), num);
        assert_eq!(
            PLAIN_MSG,
            fs::read_to_string(setup.dir("inbox/1")).unwrap()
        );

        let num = setup.driver.copy_msg(&mut draft, &msg).unwrap();
        assert_eq!(
            QUEUED_MSG,
            fs::read_to_string(setup.dir("draft").join(num.to_string()))
                .unwrap()
        );

        assert_matches!(
            Err(Error::CopyToSelf),
            setup.driver.copy_msg(&mut queue_dest, &msg)
        );
        assert_eq!(nums(&[1]), setup.driver.get_num_list(&queue).unwrap());
        // The source is never modified
        assert_eq!(
            QUEUED_MSG,
            fs::read_to_string(setup.dir("queue/1")).unwrap()
        );
    }

    #[test]
    fn copy_of_ordinary_message_is_verbatim() {
        let setup = set_up();
        let inbox = setup.item(SpecialFolder::Inbox);
        let mut trash = setup.item(SpecialFolder::Trash);
        fs::write(setup.dir("inbox/1"), QUEUED_MSG).unwrap();

        // In the inbox, the control-looking lines carry no special meaning
        let msg = setup.msginfo(&inbox, 1);
        setup.driver.copy_msg(&mut trash, &msg).unwrap();
        assert_eq!(
            QUEUED_MSG,
            fs::read_to_string(setup.dir("trash/1")).unwrap()
        );

        let mut gone = msg.clone();
        gone.num = Some(MsgNum::u(99));
        assert_matches!(
            Err(Error::NxMessage),
            setup.driver.copy_msg(&mut trash, &gone)
        );
    }

    #[test]
    fn copy_applies_file_mode() {
        let setup = set_up();
        let inbox = setup.item(SpecialFolder::Inbox);
        let mut trash = setup.item(SpecialFolder::Trash);
        trash.file_mode = Some(0o640);
        fs::write(setup.dir("inbox/1"), PLAIN_MSG).unwrap();

        let msg = setup.msginfo(&inbox, 1);
        setup.driver.copy_msg(&mut trash, &msg).unwrap();

        let mode = |p: PathBuf| {
            fs::metadata(p).unwrap().permissions().mode() & 0o777
        };
        assert_eq!(0o640, mode(setup.dir("trash/1")));
        assert_eq!(0o660, mode(setup.dir("trash").join(SEQUENCES_FILE)));
    }

    #[test]
    fn add_applies_file_mode() {
        let setup = set_up();
        let mut inbox = setup.item(SpecialFolder::Inbox);
        inbox.file_mode = Some(0o640);
        let src = setup.source("new", PLAIN_MSG);
        file_ops::chmod(&src.path, 0o600).unwrap();

        setup
            .driver
            .add_msgs(&mut inbox, &[src.clone()], None)
            .unwrap();

        let mode = |p: &Path| {
            fs::metadata(p).unwrap().permissions().mode() & 0o777
        };
        assert_eq!(0o640, mode(&setup.dir("inbox/1")));
        assert_eq!(0o660, mode(&setup.dir("inbox").join(SEQUENCES_FILE)));
        // The message got its own inode, so the source is untouched
        assert_eq!(0o600, mode(&src.path));
        assert_eq!(1, fs::metadata(&src.path).unwrap().nlink());

        // Without a mode, the message is simply linked
        let mut trash = setup.item(SpecialFolder::Trash);
        setup
            .driver
            .add_msgs(&mut trash, &[src.clone()], None)
            .unwrap();
        assert_eq!(2, fs::metadata(&src.path).unwrap().nlink());
    }

    #[test]
    fn move_removes_source() {
        let setup = set_up();
        let inbox = setup.item(SpecialFolder::Inbox);
        let mut trash = setup.item(SpecialFolder::Trash);
        fs::write(setup.dir("inbox/5"), PLAIN_MSG).unwrap();

        let msg = setup.msginfo(&inbox, 5);
        let num = setup.driver.move_msg(&mut trash, &msg).unwrap();
        assert_eq!(MsgNum::u(1), num);
        assert!(setup.driver.get_num_list(&inbox).unwrap().is_empty());
        assert_eq!(
            PLAIN_MSG,
            fs::read_to_string(setup.dir("trash/1")).unwrap()
        );
    }

    #[test]
    fn remove_all_leaves_other_files() {
        let setup = set_up();
        let inbox = setup.item(SpecialFolder::Inbox);
        for name in &["1", "2", "10", "notes", "1.bak"] {
            fs::write(setup.dir("inbox").join(name), "x").unwrap();
        }

        setup.driver.remove_all_msgs(&inbox).unwrap();
        assert!(setup.driver.get_num_list(&inbox).unwrap().is_empty());
        assert!(setup.dir("inbox/notes").is_file());
        assert!(setup.dir("inbox/1.bak").is_file());
        assert!(setup.dir("inbox").join(SEQUENCES_FILE).is_file());
    }

    #[test]
    fn detect_changed_messages() {
        let setup = set_up();
        let inbox = setup.item(SpecialFolder::Inbox);
        fs::write(setup.dir("inbox/1"), PLAIN_MSG).unwrap();

        let msg = setup.msginfo(&inbox, 1);
        assert!(!setup.driver.is_msg_changed(&msg).unwrap());

        fs::write(setup.dir("inbox/1"), "From: x\n\nlonger body\n").unwrap();
        assert!(setup.driver.is_msg_changed(&msg).unwrap());

        fs::remove_file(setup.dir("inbox/1")).unwrap();
        assert!(setup.driver.is_msg_changed(&msg).unwrap());
    }

    #[test]
    fn scan_tree_builds_tree_and_specials() {
        let mut setup = set_up();
        fs::create_dir_all(setup.dir("work/projects")).unwrap();
        fs::create_dir_all(setup.dir(".hidden/inner")).unwrap();
        fs::create_dir_all(setup.dir("work/inbox")).unwrap();
        fs::write(setup.dir("work/1"), "x").unwrap();
        fs::write(setup.dir("work/2"), "x").unwrap();
        fs::write(setup.dir("work/README"), "x").unwrap();

        setup.driver.scan_tree(&mut setup.folder).unwrap();
        assert_eq!(
            vec![
                "",
                "draft",
                "inbox",
                "outbox",
                "queue",
                "trash",
                "work",
                "work/inbox",
                "work/projects",
            ],
            setup.folder.paths()
        );
        assert_eq!(Some("inbox"), setup.folder.special(SpecialFolder::Inbox));
        assert_eq!(Some("queue"), setup.folder.special(SpecialFolder::Queue));
        assert_eq!(None, setup.folder.item("work/inbox").unwrap().stype);
        assert_eq!(
            Some(SpecialFolder::Trash),
            setup.folder.item("trash").unwrap().stype
        );
        assert_eq!(2, setup.folder.item("work").unwrap().total);

        let before = setup.folder.clone();
        setup.driver.scan_tree(&mut setup.folder).unwrap();
        assert_eq!(before, setup.folder);
    }

    #[test]
    fn scan_tree_finds_specials_of_fresh_folder() {
        let setup = set_up();
        fs::remove_dir_all(setup.dir("outbox")).unwrap();
        fs::create_dir_all(setup.dir("work/trash")).unwrap();

        let mut folder = Folder::new("Mail".to_owned());
        assert_eq!(None, folder.special(SpecialFolder::Inbox));
        setup.driver.scan_tree(&mut folder).unwrap();

        assert_eq!(Some("inbox"), folder.special(SpecialFolder::Inbox));
        assert_eq!(Some("draft"), folder.special(SpecialFolder::Draft));
        assert_eq!(Some("trash"), folder.special(SpecialFolder::Trash));
        assert_eq!(None, folder.special(SpecialFolder::Outbox));
        assert_eq!(
            Some(SpecialFolder::Queue),
            folder.item("queue").unwrap().stype
        );
        assert_eq!(None, folder.item("work/trash").unwrap().stype);
    }

    #[test]
    fn scan_tree_skips_unreadable_folders() {
        // Permission bits don't restrict root
        if nix::unistd::geteuid().is_root() {
            return;
        }

        let mut setup = set_up();
        fs::create_dir_all(setup.dir("locked/inner")).unwrap();
        fs::create_dir_all(setup.dir("open/inner")).unwrap();
        file_ops::chmod(&setup.dir("locked"), 0o000).unwrap();

        let result = setup.driver.scan_tree(&mut setup.folder);
        file_ops::chmod(&setup.dir("locked"), 0o700).unwrap();
        result.unwrap();

        assert!(setup.folder.item("locked").is_some());
        assert!(setup.folder.item("locked/inner").is_none());
        assert!(setup.folder.item("open/inner").is_some());
    }

    #[test]
    fn scan_tree_prunes_vanished_folders() {
        let mut setup = set_up();
        fs::create_dir_all(setup.dir("work/projects/old")).unwrap();
        setup.driver.scan_tree(&mut setup.folder).unwrap();
        assert!(setup.folder.item("work/projects/old").is_some());

        fs::remove_dir_all(setup.dir("work/projects")).unwrap();
        fs::remove_dir_all(setup.dir("outbox")).unwrap();
        setup.driver.scan_tree(&mut setup.folder).unwrap();

        assert!(setup.folder.item("work").is_some());
        assert!(setup.folder.item("work/projects").is_none());
        assert!(setup.folder.item("outbox").is_none());
        assert_eq!(None, setup.folder.special(SpecialFolder::Outbox));
    }

    #[test]
    fn scan_tree_handles_undecodable_names() {
        let mut setup = set_up();
        let raw = setup.root.path().join(OsStr::from_bytes(b"caf\xe9"));
        fs::create_dir_all(raw.join("sub")).unwrap();
        fs::write(raw.join("1"), PLAIN_MSG).unwrap();

        setup.driver.scan_tree(&mut setup.folder).unwrap();
        let path = "caf\u{F7E9}";
        assert!(setup.folder.item("caf\u{F7E9}/sub").is_some());

        let mut item = setup.folder.item(path).unwrap().clone();
        assert_eq!(1, item.total);
        let cache = setup.driver.get_msg_list(&mut item, true).unwrap();
        assert_eq!("Outgoing", cache.get(MsgNum::u(1)).unwrap().subject);
        setup.driver.write_cache(&item, &cache).unwrap();
        assert!(raw.join(CACHE_FILE).is_file());

        // The directory is found again, so nothing gets pruned
        let before = setup.folder.clone();
        setup.driver.scan_tree(&mut setup.folder).unwrap();
        assert_eq!(before, setup.folder);
    }

    #[test]
    fn scan_keeps_cached_totals() {
        let mut setup = set_up();
        fs::write(setup.dir("inbox/1"), PLAIN_MSG).unwrap();
        {
            let inbox =
                setup.folder.special_item_mut(SpecialFolder::Inbox).unwrap();
            setup.driver.get_msg_list(inbox, false).unwrap();
            inbox.total = 42;
        }

        setup.driver.scan_tree(&mut setup.folder).unwrap();
        assert_eq!(42, setup.item(SpecialFolder::Inbox).total);
    }

    #[test]
    fn create_tree_is_idempotent() {
        let mut setup = set_up();
        fs::write(setup.dir("inbox/1"), PLAIN_MSG).unwrap();
        let before = setup.folder.clone();
        setup.driver.create_tree(&mut setup.folder).unwrap();
        assert_eq!(before.paths(), setup.folder.paths());
        assert!(setup.dir("inbox/1").is_file());
        for special in &SpecialFolder::ALL {
            assert!(setup.dir(special.dir_name()).is_dir());
        }
    }

    #[test]
    fn create_folders() {
        let mut setup = set_up();
        let path = setup
            .driver
            .create_folder(&mut setup.folder, "", "work")
            .unwrap();
        assert_eq!("work", path);
        let path = setup
            .driver
            .create_folder(&mut setup.folder, "work", "projects")
            .unwrap();
        assert_eq!("work/projects", path);
        assert!(setup.dir("work/projects").join(SEQUENCES_FILE).is_file());
        assert!(setup.folder.item("work/projects").is_some());

        assert_matches!(
            Err(Error::FolderExists),
            setup.driver.create_folder(&mut setup.folder, "work", "projects")
        );
        fs::create_dir(setup.dir("work/sneaky")).unwrap();
        assert_matches!(
            Err(Error::FolderExists),
            setup.driver.create_folder(&mut setup.folder, "work", "sneaky")
        );
        assert_matches!(
            Err(Error::NxFolder),
            setup.driver.create_folder(&mut setup.folder, "nx", "x")
        );
        for bad in &["", ".hidden", "a/b", "123"] {
            assert_matches!(
                Err(Error::UnsafeName),
                setup.driver.create_folder(&mut setup.folder, "", bad)
            );
        }

        let before = setup.folder.clone();
        setup.driver.scan_tree(&mut setup.folder).unwrap();
        assert!(setup.folder.item("work/sneaky").is_some());
        assert_eq!(
            before.item("work/projects"),
            setup.folder.item("work/projects")
        );
    }

    #[test]
    fn rename_rewrites_subtree() {
        let mut setup = set_up();
        fs::create_dir_all(setup.dir("work/projects/mhstore")).unwrap();
        fs::create_dir_all(setup.dir("work-old")).unwrap();
        setup.driver.scan_tree(&mut setup.folder).unwrap();

        let new_path = setup
            .driver
            .rename_folder(&mut setup.folder, "work", "play")
            .unwrap();
        assert_eq!("play", new_path);
        assert!(setup.dir("play/projects/mhstore").is_dir());
        assert!(!setup.dir("work").exists());

        let item = setup.folder.item("play").unwrap();
        assert_eq!("play", item.name);
        assert!(setup.folder.item("play/projects/mhstore").is_some());
        assert!(setup.folder.item("work/projects").is_none());
        assert!(setup.folder.item("work-old").is_some());

        // The in-memory tree matches what a scan finds
        let renamed = setup.folder.clone();
        setup.driver.scan_tree(&mut setup.folder).unwrap();
        assert_eq!(renamed, setup.folder);

        assert_matches!(
            Err(Error::FolderExists),
            setup
                .driver
                .rename_folder(&mut setup.folder, "play", "work-old")
        );
        assert_matches!(
            Err(Error::NxFolder),
            setup.driver.rename_folder(&mut setup.folder, "nx", "y")
        );
        assert_matches!(
            Err(Error::BadOperationOnRoot),
            setup.driver.rename_folder(&mut setup.folder, "", "y")
        );
    }

    #[test]
    fn rename_special_folder_moves_shortcut() {
        let mut setup = set_up();
        setup
            .driver
            .rename_folder(&mut setup.folder, "draft", "drafts")
            .unwrap();
        assert_eq!(Some("drafts"), setup.folder.special(SpecialFolder::Draft));
        assert_eq!(
            Some(SpecialFolder::Draft),
            setup.folder.item("drafts").unwrap().stype
        );
    }

    #[test]
    fn remove_folders() {
        let mut setup = set_up();
        fs::create_dir_all(setup.dir("work/projects")).unwrap();
        fs::write(setup.dir("work/projects/1"), PLAIN_MSG).unwrap();
        setup.driver.scan_tree(&mut setup.folder).unwrap();

        setup
            .driver
            .remove_folder(&mut setup.folder, "work")
            .unwrap();
        assert!(!setup.dir("work").exists());
        assert!(setup.folder.item("work").is_none());
        assert!(setup.folder.item("work/projects").is_none());

        setup
            .driver
            .remove_folder(&mut setup.folder, "trash")
            .unwrap();
        assert_eq!(None, setup.folder.special(SpecialFolder::Trash));

        assert_matches!(
            Err(Error::NxFolder),
            setup.driver.remove_folder(&mut setup.folder, "work")
        );
        assert_matches!(
            Err(Error::BadOperationOnRoot),
            setup.driver.remove_folder(&mut setup.folder, "")
        );
    }

    #[test]
    fn msg_list_reconciles_cache() {
        let setup = set_up();
        let mut inbox = setup.item(SpecialFolder::Inbox);
        for num in 1..=3 {
            fs::write(
                setup.dir("inbox").join(num.to_string()),
                format!("Subject: msg {}\n\nbody\n", num),
            )
            .unwrap();
        }

        let mut cache = setup.driver.get_msg_list(&mut inbox, true).unwrap();
        assert_eq!(3, cache.len());
        assert_eq!(3, inbox.last_num);
        assert!(inbox.cache_loaded);

        // Mark one message read before saving
        let mut changed = (*cache.get(MsgNum::u(1)).unwrap()).clone();
        changed.flags.perm = PermFlags::empty();
        cache.update(&changed);
        setup.driver.write_cache(&inbox, &cache).unwrap();
        drop(cache);

        // Outside changes: 2 rewritten, 3 removed, 4 added
        fs::write(
            setup.dir("inbox/2"),
            "Subject: rewritten message\n\nnew body\n",
        )
        .unwrap();
        fs::remove_file(setup.dir("inbox/3")).unwrap();
        fs::write(setup.dir("inbox/4"), "Subject: msg 4\n\nbody\n").unwrap();

        let mut inbox = setup.item(SpecialFolder::Inbox);
        let cache = setup.driver.get_msg_list(&mut inbox, true).unwrap();
        assert_eq!(
            vec![MsgNum::u(1), MsgNum::u(2), MsgNum::u(4)],
            cache.num_list()
        );
        assert_eq!(
            PermFlags::empty(),
            cache.get(MsgNum::u(1)).unwrap().flags.perm
        );
        assert_eq!(
            "rewritten message",
            cache.get(MsgNum::u(2)).unwrap().subject
        );
        assert_eq!(
            PermFlags::NEW | PermFlags::UNREAD,
            cache.get(MsgNum::u(4)).unwrap().flags.perm
        );
        assert_eq!(4, inbox.last_num);
        assert_eq!(3, inbox.total);

        // Without the cache, flags are back to their defaults
        let cache = setup.driver.get_msg_list(&mut inbox, false).unwrap();
        assert_eq!(
            PermFlags::NEW | PermFlags::UNREAD,
            cache.get(MsgNum::u(1)).unwrap().flags.perm
        );
    }

    #[test]
    fn write_cache_uses_bookkeeping_mode() {
        let setup = set_up();
        let mut inbox = setup.item(SpecialFolder::Inbox);
        inbox.file_mode = Some(0o644);
        fs::write(setup.dir("inbox/1"), PLAIN_MSG).unwrap();

        let cache = setup.driver.get_msg_list(&mut inbox, true).unwrap();
        setup.driver.write_cache(&inbox, &cache).unwrap();

        let (cache_path, mark_path) = setup.driver.cache_paths(&inbox);
        for path in &[cache_path, mark_path] {
            assert_eq!(
                0o666,
                fs::metadata(path).unwrap().permissions().mode() & 0o777
            );
        }
    }

    struct FixedParser;

    impl HeaderParser for FixedParser {
        fn parse(&self, _: &Path, flags: MsgFlags) -> Result<MsgInfo, Error> {
            Ok(MsgInfo {
                num: Some(MsgNum::u(999)),
                folder: Some("elsewhere".to_owned()),
                subject: "Parsed elsewhere".to_owned(),
                flags,
                ..MsgInfo::default()
            })
        }
    }

    #[test]
    fn parser_results_are_stamped_with_location() {
        crate::init_test_log();
        let root = TempDir::new().unwrap();
        let driver = MhDriver::new(
            LogPrefix::new("test".to_owned()),
            root.path().to_owned(),
            PathCharset::utf8(),
        )
        .with_parser(FixedParser);
        let mut folder = Folder::new("Mail".to_owned());
        driver.create_tree(&mut folder).unwrap();
        let mut queue =
            folder.special_item(SpecialFolder::Queue).unwrap().clone();
        fs::write(root.path().join("queue/3"), PLAIN_MSG).unwrap();

        let msginfo =
            driver.get_msginfo(&queue, MsgNum::u(3)).unwrap().unwrap();
        assert_eq!(Some(MsgNum::u(3)), msginfo.num);
        assert_eq!(Some("queue".to_owned()), msginfo.folder);
        assert_eq!("Parsed elsewhere", msginfo.subject);
        assert_eq!(TmpFlags::QUEUED, msginfo.flags.tmp);

        let cache = driver.get_msg_list(&mut queue, false).unwrap();
        assert_eq!(vec![MsgNum::u(3)], cache.num_list());
        assert!(cache.get(MsgNum::u(999)).is_none());
    }

    #[test]
    fn locale_charset_names() {
        crate::init_test_log();
        let root = TempDir::new().unwrap();
        let driver = MhDriver::new(
            LogPrefix::new("test".to_owned()),
            root.path().to_owned(),
            PathCharset::for_label("iso-8859-1").unwrap(),
        );
        let mut folder = Folder::new("Mail".to_owned());

        driver.create_folder(&mut folder, "", "café").unwrap();
        let on_disk = fs::read_dir(root.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().as_bytes().to_owned())
            .collect::<Vec<_>>();
        assert_eq!(vec![b"caf\xe9".to_vec()], on_disk);

        let mut rescanned = Folder::new("Mail".to_owned());
        driver.scan_tree(&mut rescanned).unwrap();
        assert_eq!(vec!["", "café"], rescanned.paths());
    }
}
