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

//! The operations a mailbox backend provides.
//!
//! Everything above the storage layer talks to folders through
//! `FolderDriver`; `MhDriver` is the implementation for local MH-style
//! directories.

use std::collections::HashSet;
use std::path::PathBuf;

use super::folder::{Folder, FolderItem};
use super::model::{MsgFlags, MsgInfo, MsgNum};
use super::msg_cache::MsgCache;
use crate::support::error::Error;

/// A message file to be added to a folder, with the flags it should carry.
#[derive(Clone, Debug)]
pub struct MsgSource {
    pub path: PathBuf,
    pub flags: MsgFlags,
}

pub trait FolderDriver {
    /// Scan the whole directory tree under the mailbox root, bringing
    /// `folder` in line with it.
    ///
    /// New directories get new items, items whose directory has vanished are
    /// pruned, and the conventional top-level folders are wired up as the
    /// special folders of the mailbox.
    fn scan_tree(&self, folder: &mut Folder) -> Result<(), Error>;

    /// Create the conventional top-level folders if they do not exist yet.
    fn create_tree(&self, folder: &mut Folder) -> Result<(), Error>;

    /// Create a new folder called `name` under the item at `parent_path`,
    /// returning the path of the new item.
    fn create_folder(
        &self,
        folder: &mut Folder,
        parent_path: &str,
        name: &str,
    ) -> Result<String, Error>;

    /// Remove the folder at `path`, its messages, and all its descendants.
    fn remove_folder(&self, folder: &mut Folder, path: &str)
        -> Result<(), Error>;

    /// Give the folder at `path` the new last component `new_name`,
    /// returning its new path.
    fn rename_folder(
        &self,
        folder: &mut Folder,
        path: &str,
        new_name: &str,
    ) -> Result<String, Error>;

    /// Determine the highest message number present in `item`, and raise
    /// `item.last_num` to it.
    fn get_last_num(&self, item: &mut FolderItem) -> Result<(), Error>;

    /// Return the numbers of every message present in `item`.
    fn get_num_list(&self, item: &FolderItem)
        -> Result<HashSet<MsgNum>, Error>;

    /// Return the path of message `num` in `item`, or `None` if there is no
    /// such message.
    fn fetch_msg(
        &self,
        item: &FolderItem,
        num: MsgNum,
    ) -> Result<Option<PathBuf>, Error>;

    /// Parse message `num` in `item`, or return `None` if there is no such
    /// message.
    fn get_msginfo(
        &self,
        item: &FolderItem,
        num: MsgNum,
    ) -> Result<Option<MsgInfo>, Error>;

    /// Place the given files into `dest` under fresh message numbers.
    ///
    /// If `cache` is given, each added message is parsed and entered into it
    /// with the flags of its source.
    ///
    /// Messages are added in order, stopping at the first failure. Messages
    /// added before that stay in place; if there are any, the error is
    /// `Error::PartialAdd`, listing their numbers.
    fn add_msgs(
        &self,
        dest: &mut FolderItem,
        sources: &[MsgSource],
        cache: Option<&mut MsgCache>,
    ) -> Result<Vec<MsgNum>, Error>;

    /// Copy `msg` into `dest` under a fresh message number.
    fn copy_msg(
        &self,
        dest: &mut FolderItem,
        msg: &MsgInfo,
    ) -> Result<MsgNum, Error>;

    /// Copy `msg` into `dest` under a fresh message number, then remove it
    /// from its original folder.
    fn move_msg(
        &self,
        dest: &mut FolderItem,
        msg: &MsgInfo,
    ) -> Result<MsgNum, Error>;

    fn remove_msg(&self, item: &FolderItem, num: MsgNum) -> Result<(), Error>;

    /// Remove every message of `item`, leaving other files alone.
    fn remove_all_msgs(&self, item: &FolderItem) -> Result<(), Error>;

    /// Whether the file behind `msg` no longer matches the size and mtime
    /// recorded in it.
    fn is_msg_changed(&self, msg: &MsgInfo) -> Result<bool, Error>;

    /// Load the message list of `item`, using and reconciling its cache
    /// files if `use_cache` is set.
    fn get_msg_list(
        &self,
        item: &mut FolderItem,
        use_cache: bool,
    ) -> Result<MsgCache, Error>;

    /// Persist `cache` as the cache of `item`.
    fn write_cache(
        &self,
        item: &FolderItem,
        cache: &MsgCache,
    ) -> Result<(), Error>;
}
