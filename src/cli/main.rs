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
use std::path::{Path, PathBuf};
use std::str::FromStr;

use structopt::StructOpt;

use crate::store::model::{MsgNum, PermFlags};
use crate::support::error::Error;
use crate::support::sysexits::*;
use crate::support::system_config::SystemConfig;

#[derive(StructOpt)]
#[structopt(max_term_width = 80)]
pub(super) struct Options {
    /// Path to the configuration file [default: ./mhstore.toml if it
    /// exists]
    #[structopt(long, short, parse(from_os_str))]
    pub(super) config: Option<PathBuf>,

    /// Operate on this mailbox root instead of the configured one.
    #[structopt(long, short, parse(from_os_str))]
    pub(super) mailbox: Option<PathBuf>,

    /// Log what is being done to standard error.
    #[structopt(long, short)]
    pub(super) verbose: bool,

    #[structopt(subcommand)]
    pub(super) command: Command,
}

#[derive(StructOpt)]
pub(super) enum Command {
    /// Create the mailbox root and its standard folders.
    ///
    /// Folders which already exist are left alone, so this is safe to run on
    /// an existing mailbox.
    Init,
    /// Show the folder tree with approximate message counts.
    Scan,
    /// List the messages in a folder.
    ///
    /// The folder's message cache is brought up to date and saved as a side
    /// effect.
    Ls(LsSubcommand),
    /// Add message files to a folder.
    Add(AddSubcommand),
    /// Copy a message into another folder.
    Cp(TransferSubcommand),
    /// Move a message into another folder.
    Mv(TransferSubcommand),
    /// Remove messages from a folder.
    Rm(RmSubcommand),
    /// Set or clear flags on a message.
    Flag(FlagSubcommand),
    /// Create a folder.
    Mkdir(FolderArg),
    /// Give a folder a new name, keeping it under the same parent.
    Rename(RenameSubcommand),
    /// Remove a folder, including all its messages and sub-folders.
    Rmdir(FolderArg),
    /// Discard a folder's message cache and build it afresh from the message
    /// files.
    RebuildCache(FolderArg),
    /// Print the raw contents of a folder's message cache.
    ///
    /// Unlike `ls`, this does not check the cache against the message files.
    DumpCache(FolderArg),
}

#[derive(StructOpt)]
pub(super) struct FolderArg {
    /// The folder path relative to the mailbox root, e.g. "inbox" or
    /// "work/projects".
    pub(super) folder: String,
}

#[derive(StructOpt)]
pub(super) struct LsSubcommand {
    /// Ignore the cache and parse every message.
    #[structopt(long)]
    pub(super) no_cache: bool,

    pub(super) folder: String,
}

#[derive(StructOpt)]
pub(super) struct AddSubcommand {
    /// Add this flag (new, unread, marked, deleted, replied) to the added
    /// message(s). Can be passed multiple times. If not given, messages are
    /// added as new and unread.
    #[structopt(short, long, number_of_values(1))]
    pub(super) flag: Vec<FlagArg>,

    pub(super) folder: String,

    /// The files to add. "-" reads one message from standard input.
    #[structopt(parse(from_os_str), default_value = "-")]
    pub(super) inputs: Vec<PathBuf>,
}

#[derive(StructOpt)]
pub(super) struct TransferSubcommand {
    pub(super) src: String,
    pub(super) num: MsgNum,
    pub(super) dest: String,
}

#[derive(StructOpt)]
pub(super) struct RmSubcommand {
    /// Remove every message in the folder.
    #[structopt(long, conflicts_with = "nums")]
    pub(super) all: bool,

    pub(super) folder: String,

    #[structopt(required_unless = "all")]
    pub(super) nums: Vec<MsgNum>,
}

#[derive(StructOpt)]
pub(super) struct FlagSubcommand {
    /// Flag to set. Can be passed multiple times.
    #[structopt(long, number_of_values(1))]
    pub(super) set: Vec<FlagArg>,

    /// Flag to clear. Can be passed multiple times.
    #[structopt(long, number_of_values(1))]
    pub(super) clear: Vec<FlagArg>,

    pub(super) folder: String,
    pub(super) num: MsgNum,
}

#[derive(StructOpt)]
pub(super) struct RenameSubcommand {
    pub(super) folder: String,
    pub(super) new_name: String,
}

/// A permanent flag named on the command line.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(super) struct FlagArg(pub(super) PermFlags);

impl FromStr for FlagArg {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, String> {
        match &s.to_ascii_lowercase()[..] {
            "new" => Ok(FlagArg(PermFlags::NEW)),
            "unread" => Ok(FlagArg(PermFlags::UNREAD)),
            "marked" => Ok(FlagArg(PermFlags::MARKED)),
            "deleted" => Ok(FlagArg(PermFlags::DELETED)),
            "replied" => Ok(FlagArg(PermFlags::REPLIED)),
            _ => Err(format!("Unknown flag: {}", s)),
        }
    }
}

pub(super) fn combine_flags(flags: &[FlagArg]) -> PermFlags {
    flags
        .iter()
        .fold(PermFlags::empty(), |accum, flag| accum | flag.0)
}

pub fn main() {
    // Clap exits with status 1 instead of EX_USAGE if we use the more concise
    // API
    let opts = Options::from_clap(&match Options::clap().get_matches_safe() {
        Ok(matches) => matches,
        Err(
            e @ clap::Error {
                kind: clap::ErrorKind::HelpDisplayed,
                ..
            },
        )
        | Err(
            e @ clap::Error {
                kind: clap::ErrorKind::VersionDisplayed,
                ..
            },
        ) => {
            println!("{}", e.message);
            return;
        }
        Err(e) => {
            eprintln!("{}", e.message);
            EX_USAGE.exit()
        }
    });

    let mut system_config = load_config(opts.config.as_deref());
    if let Some(mailbox) = opts.mailbox.clone() {
        system_config.mailbox.root = mailbox;
    }

    init_logging(&system_config, opts.verbose);

    super::mailbox::run(system_config, opts.command);
}

fn load_config(explicit: Option<&Path>) -> SystemConfig {
    let path = match explicit {
        Some(path) => path.to_owned(),
        None => {
            let default = PathBuf::from("mhstore.toml");
            if !default.is_file() {
                return SystemConfig::default();
            }
            default
        }
    };

    match read_config(&path) {
        Ok(config) => config,
        Err(Error::Io(e)) => {
            die!(EX_CONFIG, "Error reading '{}': {}", path.display(), e)
        }
        Err(e) => die!(
            EX_CONFIG,
            "Error in config file at '{}': {}",
            path.display(),
            e
        ),
    }
}

fn read_config(path: &Path) -> Result<SystemConfig, Error> {
    let system_config_toml = fs::read(path)?;
    Ok(toml::from_slice(&system_config_toml)?)
}

fn init_logging(system_config: &SystemConfig, verbose: bool) {
    let level = if verbose {
        log::LevelFilter::Info
    } else {
        log::LevelFilter::Warn
    };

    match system_config.logging.config {
        Some(ref log_config_file) if Ok(true) != nix::unistd::isatty(2) => {
            if let Err(e) = log4rs::init_file(
                log_config_file,
                log4rs::file::Deserializers::new(),
            ) {
                die!(
                    EX_CONFIG,
                    "Failed to initialise logging from '{}': {}",
                    log_config_file.display(),
                    e
                );
            }
        }
        // Running interactively or not configured; just write to stderr.
        _ => crate::init_simple_log(level),
    }
}
