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

//! Miscellaneous functions for working with files.

use std::fs;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
use std::path::Path;

use log::warn;

use crate::support::error::Error;

pub fn chmod(path: impl AsRef<Path>, mode: u32) -> io::Result<()> {
    fs::set_permissions(path, fs::Permissions::from_mode(mode))
}

/// Derive the permission mask for bookkeeping files living next to messages
/// whose mode is `mode`.
///
/// Group and other write permission is added wherever the corresponding read
/// permission is present, so that every user who can read a shared folder can
/// also refresh its bookkeeping.
pub fn bookkeeping_mode(mode: u32) -> u32 {
    let mut mode = mode;
    if 0 != mode & 0o040 {
        mode |= 0o020;
    }
    if 0 != mode & 0o004 {
        mode |= 0o002;
    }
    mode
}

/// How `link_or_copy` ended up placing the file.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Placement {
    Linked,
    Copied,
}

/// Make `src` available at `dst` without ever replacing anything at `dst`.
///
/// A hard link is attempted first. If linking fails for any reason other than
/// `dst` already existing (e.g. `EXDEV`, or a file system without hard links),
/// the data is copied instead.
///
/// Fails with `AlreadyExists` if `dst` is taken.
pub fn link_or_copy(
    src: impl AsRef<Path>,
    dst: impl AsRef<Path>,
) -> io::Result<Placement> {
    let src = src.as_ref();
    let dst = dst.as_ref();

    match fs::hard_link(src, dst) {
        Ok(()) => Ok(Placement::Linked),
        Err(e) if io::ErrorKind::AlreadyExists == e.kind() => Err(e),
        Err(e) if io::ErrorKind::NotFound == e.kind() && !src.exists() => {
            Err(e)
        }
        Err(e) => {
            warn!(
                "Can't link {} to {} ({}), copying instead",
                src.display(),
                dst.display(),
                e
            );
            copy_noclobber(src, dst, |r, w| io::copy(r, w).map(|_| ()))?;
            Ok(Placement::Copied)
        }
    }
}

/// Copy `src` to a new file `dst`, passing the data through `transfer`.
///
/// `dst` is created exclusively, so this fails with `AlreadyExists` if
/// something is already there. If `transfer` or any later step fails, the
/// partially written `dst` is removed again.
pub fn copy_noclobber(
    src: impl AsRef<Path>,
    dst: impl AsRef<Path>,
    transfer: impl FnOnce(
        &mut BufReader<fs::File>,
        &mut BufWriter<fs::File>,
    ) -> io::Result<()>,
) -> io::Result<()> {
    let dst = dst.as_ref();
    let mut reader = BufReader::new(fs::File::open(src)?);
    let out = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .mode(0o600)
        .open(dst)?;

    let result = (|| -> io::Result<()> {
        let mut writer = BufWriter::new(out);
        transfer(&mut reader, &mut writer)?;
        writer.flush()?;
        Ok(())
    })();

    if result.is_err() {
        let _ = fs::remove_file(dst);
    }
    result
}

pub trait ReadUninterruptibly: Read {
    fn read_uninteruptibly(&mut self, dst: &mut [u8]) -> io::Result<usize>;
}

impl<R: Read> ReadUninterruptibly for R {
    /// Read bytes into `dst` until `dst` is full or EOF is reached.
    ///
    /// `Interrupted` errors are ignored and retried. Other errors are
    /// propagated.
    fn read_uninteruptibly(&mut self, mut dst: &mut [u8]) -> io::Result<usize> {
        let mut total = 0;
        while 0 != dst.len() {
            match self.read(dst) {
                Ok(0) => break,
                Ok(n) => {
                    total += n;
                    dst = &mut dst[n..];
                }
                Err(e) if io::ErrorKind::Interrupted == e.kind() => continue,
                Err(e) => return Err(e),
            }
        }

        Ok(total)
    }
}

pub trait IgnoreKinds {
    fn ignore_already_exists(self) -> Self;
    fn ignore_not_found(self) -> Self;
}

impl<R: Default> IgnoreKinds for Result<R, io::Error> {
    fn ignore_already_exists(self) -> Self {
        match self {
            Ok(r) => Ok(r),
            Err(e) if io::ErrorKind::AlreadyExists == e.kind() => {
                Ok(R::default())
            }
            Err(e) => Err(e),
        }
    }

    fn ignore_not_found(self) -> Self {
        match self {
            Ok(r) => Ok(r),
            Err(e) if io::ErrorKind::NotFound == e.kind() => Ok(R::default()),
            Err(e) => Err(e),
        }
    }
}

pub trait ErrorTransforms {
    type Coerced;
    fn on_exists(self, error: Error) -> Self::Coerced;
    fn on_not_found(self, error: Error) -> Self::Coerced;
}

impl<R, E: Into<Error>> ErrorTransforms for Result<R, E> {
    type Coerced = Result<R, Error>;

    fn on_exists(self, error: Error) -> Result<R, Error> {
        match self.map_err(|e| e.into()) {
            Err(Error::Io(e)) if io::ErrorKind::AlreadyExists == e.kind() => {
                Err(error)
            }
            Err(Error::Nix(nix::Error::Sys(nix::errno::Errno::EEXIST))) => {
                Err(error)
            }
            s => s,
        }
    }

    fn on_not_found(self, error: Error) -> Result<R, Error> {
        match self.map_err(|e| e.into()) {
            Err(Error::Io(e)) if io::ErrorKind::NotFound == e.kind() => {
                Err(error)
            }
            Err(Error::Nix(nix::Error::Sys(nix::errno::Errno::ENOENT))) => {
                Err(error)
            }
            s => s,
        }
    }
}
