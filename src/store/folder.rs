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

//! The in-memory folder tree of a mailbox.
//!
//! A `Folder` owns the whole tree. Each `FolderItem` stores its path relative
//! to the mailbox root as a string rather than deriving it from its ancestors,
//! so renaming a folder means rewriting the paths of its entire subtree.

use std::collections::HashMap;

use super::model::SpecialFolder;
use crate::support::file_ops;

/// One folder (directory) of the mailbox.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FolderItem {
    /// The last component of `path`, or the mailbox name for the root item.
    pub name: String,
    /// Path relative to the mailbox root, with `/` separators. Empty for the
    /// root item.
    pub path: String,
    pub stype: Option<SpecialFolder>,
    /// The highest message number assigned in this folder during this
    /// session, or negative if not yet known.
    ///
    /// Once known, this never decreases for the lifetime of the item.
    pub last_num: i64,
    /// Number of messages in the folder. This is exact once the message
    /// cache has been reconciled (`cache_loaded`), and an approximation from
    /// the last tree scan otherwise.
    pub total: usize,
    pub cache_loaded: bool,
    /// Permission bits for new message files, if configured.
    pub file_mode: Option<u32>,
    pub children: Vec<FolderItem>,
}

impl FolderItem {
    pub fn new(name: String, path: String) -> Self {
        FolderItem {
            name,
            path,
            stype: None,
            last_num: -1,
            total: 0,
            cache_loaded: false,
            file_mode: None,
            children: Vec::new(),
        }
    }

    pub fn is_root(&self) -> bool {
        self.path.is_empty()
    }

    /// The path a child of this item called `name` would have.
    pub fn child_path(&self, name: &str) -> String {
        if self.is_root() {
            name.to_owned()
        } else {
            format!("{}/{}", self.path, name)
        }
    }

    /// Create a child item inheriting this item's file mode, without
    /// attaching it.
    pub fn new_child(&self, name: &str) -> FolderItem {
        let mut child = FolderItem::new(name.to_owned(), self.child_path(name));
        child.file_mode = self.file_mode;
        child
    }

    /// Permission bits for bookkeeping files (caches, sequences) in this
    /// folder, if a file mode is configured.
    pub fn bookkeeping_mode(&self) -> Option<u32> {
        self.file_mode.map(file_ops::bookkeeping_mode)
    }

    /// Raise `last_num` to at least `num`.
    pub fn see_num(&mut self, num: u32) {
        if i64::from(num) > self.last_num {
            self.last_num = num.into();
        }
    }

    fn contains_path(&self, path: &str) -> bool {
        self.is_root()
            || path == self.path
            || (path.starts_with(&self.path)
                && path[self.path.len()..].starts_with('/'))
    }

    /// Find the item in this subtree with the given path.
    pub fn find(&self, path: &str) -> Option<&FolderItem> {
        let mut item = self;
        loop {
            if item.path == path {
                return Some(item);
            }
            item = item.children.iter().find(|c| c.contains_path(path))?;
        }
    }

    /// Find the item in this subtree with the given path.
    pub fn find_mut(&mut self, path: &str) -> Option<&mut FolderItem> {
        if self.path == path {
            return Some(self);
        }
        self.children
            .iter_mut()
            .find(|c| c.contains_path(path))
            .and_then(|c| c.find_mut(path))
    }

    /// Detach the descendant with the given path, returning it.
    pub fn take(&mut self, path: &str) -> Option<FolderItem> {
        if let Some(ix) = self.children.iter().position(|c| c.path == path) {
            return Some(self.children.remove(ix));
        }
        self.children
            .iter_mut()
            .find(|c| c.contains_path(path))
            .and_then(|c| c.take(path))
    }

    /// Return every item in this subtree in pre-order, this item first.
    pub fn walk(&self) -> Vec<&FolderItem> {
        let mut out = Vec::new();
        let mut stack = vec![self];
        while let Some(item) = stack.pop() {
            out.push(item);
            stack.extend(item.children.iter().rev());
        }
        out
    }

    /// Rewrite the path of this item and every descendant whose path begins
    /// with `old_prefix` to begin with `new_prefix` instead.
    pub fn rewrite_paths(&mut self, old_prefix: &str, new_prefix: &str) {
        let mut stack = vec![self];
        while let Some(item) = stack.pop() {
            if let Some(rest) = strip_path_prefix(&item.path, old_prefix) {
                item.path = format!("{}{}", new_prefix, rest);
            }
            stack.extend(item.children.iter_mut());
        }
    }
}

/// If `path` is `prefix` or lies beneath it, return the remainder (empty or
/// starting with `/`).
pub(super) fn strip_path_prefix<'a>(
    path: &'a str,
    prefix: &str,
) -> Option<&'a str> {
    if path.starts_with(prefix) {
        let rest = &path[prefix.len()..];
        if rest.is_empty() || rest.starts_with('/') {
            return Some(rest);
        }
    }
    None
}

/// A whole mailbox: the folder tree plus shortcuts to its special folders.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Folder {
    pub root: FolderItem,
    specials: HashMap<SpecialFolder, String>,
}

impl Folder {
    pub fn new(name: String) -> Self {
        Folder {
            root: FolderItem::new(name, String::new()),
            specials: HashMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.root.name
    }

    /// Return the path of the folder wired up as `special`, if any.
    pub fn special(&self, special: SpecialFolder) -> Option<&str> {
        self.specials.get(&special).map(String::as_str)
    }

    pub fn special_item(&self, special: SpecialFolder) -> Option<&FolderItem> {
        self.special(special).and_then(|p| self.root.find(p))
    }

    pub fn special_item_mut(
        &mut self,
        special: SpecialFolder,
    ) -> Option<&mut FolderItem> {
        let path = self.specials.get(&special)?;
        self.root.find_mut(path)
    }

    pub fn item(&self, path: &str) -> Option<&FolderItem> {
        self.root.find(path)
    }

    pub fn item_mut(&mut self, path: &str) -> Option<&mut FolderItem> {
        self.root.find_mut(path)
    }

    /// Return the paths of every item in the tree, in pre-order.
    pub fn paths(&self) -> Vec<&str> {
        self.root
            .walk()
            .into_iter()
            .map(|item| item.path.as_str())
            .collect()
    }

    pub(super) fn set_special(&mut self, special: SpecialFolder, path: String) {
        self.specials.insert(special, path);
    }

    /// Drop shortcuts that no longer point into the tree.
    pub(super) fn forget_missing_specials(&mut self) {
        let root = &self.root;
        self.specials.retain(|_, path| root.find(path).is_some());
    }

    /// Rewrite shortcuts under `old_prefix` to live under `new_prefix`.
    pub(super) fn rewrite_specials(&mut self, old_prefix: &str, new_prefix: &str) {
        for path in self.specials.values_mut() {
            if let Some(rest) = strip_path_prefix(path, old_prefix) {
                *path = format!("{}{}", new_prefix, rest);
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn sample_tree() -> FolderItem {
        let mut root = FolderItem::new("Mail".to_owned(), String::new());
        let mut work = root.new_child("work");
        let mut projects = work.new_child("projects");
        projects.children.push(projects.new_child("mhstore"));
        work.children.push(projects);
        work.children.push(work.new_child("projects-old"));
        root.children.push(root.new_child("inbox"));
        root.children.push(work);
        root
    }

    #[test]
    fn find_items() {
        let root = sample_tree();
        assert_eq!("", root.find("").unwrap().path);
        assert_eq!("inbox", root.find("inbox").unwrap().path);
        assert_eq!(
            "work/projects/mhstore",
            root.find("work/projects/mhstore").unwrap().path
        );
        assert_eq!(
            "work/projects-old",
            root.find("work/projects-old").unwrap().path
        );
        assert!(root.find("work/proj").is_none());
        assert!(root.find("nx").is_none());
    }

    #[test]
    fn walk_is_preorder() {
        let root = sample_tree();
        let paths = root.walk().into_iter().map(|i| &i.path[..]).collect::<Vec<_>>();
        assert_eq!(
            vec![
                "",
                "inbox",
                "work",
                "work/projects",
                "work/projects/mhstore",
                "work/projects-old",
            ],
            paths
        );
    }

    #[test]
    fn rewrite_subtree_paths() {
        let mut root = sample_tree();
        root.find_mut("work/projects")
            .unwrap()
            .rewrite_paths("work/projects", "work/current");

        assert!(root.find("work/current").is_some());
        assert!(root.find("work/current/mhstore").is_some());
        // A sibling sharing a textual prefix is untouched
        assert!(root.find("work/projects-old").is_some());
        assert!(root.find("work/projects").is_none());
    }

    #[test]
    fn take_detaches_subtree() {
        let mut root = sample_tree();
        let taken = root.take("work/projects").unwrap();
        assert_eq!(1, taken.children.len());
        assert!(root.find("work/projects/mhstore").is_none());
        assert!(root.find("work/projects-old").is_some());
        assert!(root.take("work/projects").is_none());
    }

    #[test]
    fn see_num_is_monotonic() {
        let mut item = FolderItem::new("inbox".to_owned(), "inbox".to_owned());
        assert_eq!(-1, item.last_num);
        item.see_num(5);
        assert_eq!(5, item.last_num);
        item.see_num(3);
        assert_eq!(5, item.last_num);
    }

    #[test]
    fn children_inherit_file_mode() {
        let mut root = FolderItem::new("Mail".to_owned(), String::new());
        root.file_mode = Some(0o640);
        let child = root.new_child("inbox");
        assert_eq!(Some(0o640), child.file_mode);
        assert_eq!(Some(0o660), child.bookkeeping_mode());
    }

    #[test]
    fn specials_follow_renames() {
        let mut folder = Folder::new("Mail".to_owned());
        folder.root = sample_tree();
        folder.set_special(SpecialFolder::Draft, "work/projects".to_owned());
        folder.rewrite_specials("work", "play");
        assert_eq!(Some("play/projects"), folder.special(SpecialFolder::Draft));
        folder.forget_missing_specials();
        assert_eq!(None, folder.special(SpecialFolder::Draft));
    }
}
