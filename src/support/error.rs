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

use std::io;

use thiserror::Error;

use crate::store::model::MsgNum;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Unsafe folder name")]
    UnsafeName,
    #[error("No such folder")]
    NxFolder,
    #[error("Folder already exists")]
    FolderExists,
    #[error("No such message")]
    NxMessage,
    #[error("Message is already in the destination folder")]
    CopyToSelf,
    #[error("Folder is full")]
    MailboxFull,
    #[error("Operation not allowed on the mailbox root")]
    BadOperationOnRoot,
    #[error("Added {count} message(s) before failing: {source}", count = .added.len())]
    PartialAdd {
        added: Vec<MsgNum>,
        #[source]
        source: Box<Error>,
    },
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Nix(#[from] nix::Error),
    #[error(transparent)]
    Toml(#[from] toml::de::Error),
}
