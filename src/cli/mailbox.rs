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

use std::fs;
use std::io;
use std::os::unix::fs::DirBuilderExt;

use chrono::{Local, TimeZone};

use super::main::{
    combine_flags, AddSubcommand, Command, FlagSubcommand, LsSubcommand,
    RmSubcommand, TransferSubcommand,
};
use crate::store::driver::{FolderDriver, MsgSource};
use crate::store::folder::Folder;
use crate::store::mh::MhDriver;
use crate::store::model::{MsgFlags, MsgInfo, PermFlags, TmpFlags};
use crate::store::msg_cache::MsgCache;
use crate::support::charset::PathCharset;
use crate::support::error::Error;
use crate::support::log_prefix::LogPrefix;
use crate::support::sysexits::*;
use crate::support::system_config::SystemConfig;

pub(super) fn run(system_config: SystemConfig, command: Command) {
    let mailbox = system_config.mailbox;
    let charset = PathCharset::for_label(&mailbox.locale_charset)
        .unwrap_or_else(|| {
            die!(EX_CONFIG, "Unknown charset '{}'", mailbox.locale_charset)
        });

    let driver = MhDriver::new(
        LogPrefix::new(mailbox.name.clone()),
        mailbox.root,
        charset,
    );
    let mut folder = Folder::new(mailbox.name);
    folder.root.file_mode = mailbox.file_mode;

    let result = if let Command::Init = command {
        init(&driver, &mut folder)
    } else {
        if !driver.root().is_dir() {
            die!(
                EX_NOINPUT,
                "'{}' is not a mailbox; run `mhstore init` to create it",
                driver.root().display()
            );
        }

        driver
            .scan_tree(&mut folder)
            .and_then(|()| dispatch(&driver, &mut folder, command))
    };

    if let Err(e) = result {
        die!(exit_code(&e), "{}", e);
    }
}

fn dispatch(
    driver: &MhDriver,
    folder: &mut Folder,
    command: Command,
) -> Result<(), Error> {
    match command {
        Command::Init => init(driver, folder),
        Command::Scan => {
            scan(folder);
            Ok(())
        }
        Command::Ls(cmd) => ls(driver, folder, cmd),
        Command::Add(cmd) => add(driver, folder, cmd),
        Command::Cp(cmd) => transfer(driver, folder, cmd, false),
        Command::Mv(cmd) => transfer(driver, folder, cmd, true),
        Command::Rm(cmd) => rm(driver, folder, cmd),
        Command::Flag(cmd) => flag(driver, folder, cmd),
        Command::Mkdir(cmd) => {
            let (parent, name) = split_folder_path(&cmd.folder);
            let path = driver.create_folder(folder, parent, name)?;
            println!("Created {}", path);
            Ok(())
        }
        Command::Rename(cmd) => {
            let path =
                driver.rename_folder(folder, &cmd.folder, &cmd.new_name)?;
            println!("Renamed {} to {}", cmd.folder, path);
            Ok(())
        }
        Command::Rmdir(cmd) => {
            driver.remove_folder(folder, &cmd.folder)?;
            println!("Removed {}", cmd.folder);
            Ok(())
        }
        Command::RebuildCache(cmd) => {
            let item = folder.item_mut(&cmd.folder).ok_or(Error::NxFolder)?;
            let cache = driver.get_msg_list(item, false)?;
            driver.write_cache(item, &cache)?;
            println!("Cached {} message(s) in {}", cache.len(), item.path);
            Ok(())
        }
        Command::DumpCache(cmd) => {
            let item = folder.item(&cmd.folder).ok_or(Error::NxFolder)?;
            let (cache_path, mark_path) = driver.cache_paths(item);
            let cache = MsgCache::read(
                driver.log_prefix().for_folder(&item.path),
                &cache_path,
                &mark_path,
                item,
            );
            for msg in cache.get_all() {
                dump_msg(&msg);
            }
            Ok(())
        }
    }
}

fn init(driver: &MhDriver, folder: &mut Folder) -> Result<(), Error> {
    fs::DirBuilder::new()
        .recursive(true)
        .mode(0o700)
        .create(driver.root())?;
    driver.create_tree(folder)?;
    println!("Mailbox ready at {}", driver.root().display());
    Ok(())
}

fn scan(folder: &Folder) {
    for item in folder.root.walk().into_iter().skip(1) {
        let depth = item.path.matches('/').count();
        println!(
            "{:indent$}{:<width$} {:>6}{}",
            "",
            item.name,
            item.total,
            match item.stype {
                Some(special) => format!("  ({:?})", special),
                None => String::new(),
            },
            indent = depth * 2,
            width = 30usize.saturating_sub(depth * 2),
        );
    }
}

fn ls(
    driver: &MhDriver,
    folder: &mut Folder,
    cmd: LsSubcommand,
) -> Result<(), Error> {
    let item = folder.item_mut(&cmd.folder).ok_or(Error::NxFolder)?;
    let cache = driver.get_msg_list(item, !cmd.no_cache)?;
    driver.write_cache(item, &cache)?;

    for msg in cache.get_all() {
        println!("{}", summary_line(&msg));
    }
    Ok(())
}

fn add(
    driver: &MhDriver,
    folder: &mut Folder,
    cmd: AddSubcommand,
) -> Result<(), Error> {
    let perm = if cmd.flag.is_empty() {
        PermFlags::NEW | PermFlags::UNREAD
    } else {
        combine_flags(&cmd.flag)
    };
    let flags = MsgFlags::new(perm, TmpFlags::empty());

    let item = folder.item_mut(&cmd.folder).ok_or(Error::NxFolder)?;

    // Keeps standard input spooled until the message is in place
    let mut spooled = Vec::new();
    let mut sources = Vec::with_capacity(cmd.inputs.len());
    for input in cmd.inputs {
        let path = if "-" == input.as_os_str() {
            let mut spool = tempfile::NamedTempFile::new_in(driver.root())?;
            io::copy(&mut io::stdin().lock(), &mut spool)?;
            let path = spool.path().to_owned();
            spooled.push(spool);
            path
        } else {
            input
        };
        sources.push(MsgSource { path, flags });
    }

    let mut cache = driver.get_msg_list(item, true)?;
    let result = driver.add_msgs(item, &sources, Some(&mut cache));
    driver.write_cache(item, &cache)?;

    for num in result? {
        println!("{}/{}", item.path, num);
    }
    Ok(())
}

fn transfer(
    driver: &MhDriver,
    folder: &mut Folder,
    cmd: TransferSubcommand,
    remove_source: bool,
) -> Result<(), Error> {
    let mut src_cache = driver.get_msg_list(
        folder.item_mut(&cmd.src).ok_or(Error::NxFolder)?,
        true,
    )?;
    let msg = src_cache.get(cmd.num).ok_or(Error::NxMessage)?;

    let dest = folder.item_mut(&cmd.dest).ok_or(Error::NxFolder)?;
    let mut dest_cache = driver.get_msg_list(dest, true)?;
    let num = if remove_source {
        driver.move_msg(dest, &msg)?
    } else {
        driver.copy_msg(dest, &msg)?
    };

    // The copy is a new file, but it is still the same message as far as
    // the user is concerned
    if let Some(mut copied) = driver.get_msginfo(dest, num)? {
        copied.flags.perm = msg.flags.perm;
        copied.flags.tmp |= msg.flags.tmp & TmpFlags::FORWARDED;
        dest_cache.update(&copied);
    }
    driver.write_cache(dest, &dest_cache)?;
    println!("{}/{}", dest.path, num);

    if remove_source {
        src_cache.remove(cmd.num);
        let src = folder.item(&cmd.src).ok_or(Error::NxFolder)?;
        driver.write_cache(src, &src_cache)?;
    }
    Ok(())
}

fn rm(
    driver: &MhDriver,
    folder: &mut Folder,
    cmd: RmSubcommand,
) -> Result<(), Error> {
    let item = folder.item_mut(&cmd.folder).ok_or(Error::NxFolder)?;
    let mut cache = driver.get_msg_list(item, true)?;

    if cmd.all {
        driver.remove_all_msgs(item)?;
        for num in cache.num_list() {
            cache.remove(num);
        }
    } else {
        for &num in &cmd.nums {
            driver.remove_msg(item, num)?;
            cache.remove(num);
        }
    }

    driver.write_cache(item, &cache)
}

fn flag(
    driver: &MhDriver,
    folder: &mut Folder,
    cmd: FlagSubcommand,
) -> Result<(), Error> {
    let item = folder.item_mut(&cmd.folder).ok_or(Error::NxFolder)?;
    let mut cache = driver.get_msg_list(item, true)?;
    let msg = cache.get(cmd.num).ok_or(Error::NxMessage)?;

    let mut changed = MsgInfo::clone(&msg);
    changed.flags.perm.insert(combine_flags(&cmd.set));
    changed.flags.perm.remove(combine_flags(&cmd.clear));
    cache.update(&changed);
    driver.write_cache(item, &cache)?;

    println!("{}", summary_line(&changed));
    Ok(())
}

/// Split a folder path into the path of its parent and its own name.
fn split_folder_path(path: &str) -> (&str, &str) {
    match path.rfind('/') {
        Some(ix) => (&path[..ix], &path[ix + 1..]),
        None => ("", path),
    }
}

fn flag_letters(perm: PermFlags) -> String {
    [
        (PermFlags::NEW, 'N'),
        (PermFlags::UNREAD, 'U'),
        (PermFlags::MARKED, 'M'),
        (PermFlags::DELETED, 'D'),
        (PermFlags::REPLIED, 'R'),
    ]
    .iter()
    .map(|&(flag, letter)| if perm.contains(flag) { letter } else { '-' })
    .collect()
}

fn format_date(date_t: i64) -> String {
    if 0 == date_t {
        return String::new();
    }

    Local
        .timestamp_opt(date_t, 0)
        .single()
        .map(|date| date.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_default()
}

fn summary_line(msg: &MsgInfo) -> String {
    format!(
        "{:>6} {} {:<16} {:<24.24} {}",
        msg.num.map(|n| n.to_string()).unwrap_or_default(),
        flag_letters(msg.flags.perm),
        format_date(msg.date_t),
        msg.fromname,
        msg.subject
    )
}

fn dump_msg(msg: &MsgInfo) {
    println!(
        "[{}]\n\
         size = {}\n\
         mtime = {}\n\
         date_t = {}\n\
         perm = {:?}\n\
         tmp = {:?}\n\
         fromname = {:?}\n\
         date = {:?}\n\
         from = {:?}\n\
         to = {:?}\n\
         cc = {:?}\n\
         newsgroups = {:?}\n\
         subject = {:?}\n\
         msgid = {:?}\n\
         inreplyto = {:?}\n\
         references = {:?}\n",
        msg.num.map(|n| n.to_string()).unwrap_or_default(),
        msg.size,
        msg.mtime,
        msg.date_t,
        msg.flags.perm,
        msg.flags.tmp,
        msg.fromname,
        msg.date,
        msg.from,
        msg.to,
        msg.cc,
        msg.newsgroups,
        msg.subject,
        msg.msgid,
        msg.inreplyto,
        msg.references
    );
}

fn exit_code(error: &Error) -> Sysexit {
    match *error {
        Error::NxFolder | Error::NxMessage => EX_NOINPUT,
        Error::UnsafeName | Error::CopyToSelf | Error::BadOperationOnRoot => {
            EX_USAGE
        }
        Error::FolderExists | Error::MailboxFull => EX_CANTCREAT,
        Error::Toml(_) => EX_CONFIG,
        Error::PartialAdd { ref source, .. } => exit_code(source),
        Error::Io(_) | Error::Nix(_) => EX_IOERR,
    }
}
