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

//! Conversion of folder path text between the display charset and the charset
//! the file system uses for names.
//!
//! Folder paths are carried around as `String`s (the display charset is always
//! UTF-8), while the directories themselves are named in the locale charset.
//! Conversion failures are never fatal: the text is passed through with its
//! original bytes instead.
//!
//! A name on disk which is not valid in the locale charset still has to be
//! representable as display text, and has to map back to exactly the same
//! bytes. Such a name is carried with each non-ASCII byte replaced by a
//! private-use character `U+F700 + byte`; `to_fs` turns those characters
//! back into the raw bytes.

use std::borrow::Cow;
use std::ffi::{OsStr, OsString};
use std::fmt;
use std::os::unix::ffi::{OsStrExt, OsStringExt};

use encoding_rs::{Encoding, UTF_8};

#[derive(Clone, Copy)]
pub struct PathCharset {
    locale: &'static Encoding,
}

impl Default for PathCharset {
    fn default() -> Self {
        PathCharset::utf8()
    }
}

impl fmt::Debug for PathCharset {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "PathCharset({})", self.locale.name())
    }
}

impl PathCharset {
    /// A charset pair where no conversion is needed.
    pub fn utf8() -> Self {
        PathCharset { locale: UTF_8 }
    }

    /// Look up the locale charset by its WHATWG label.
    ///
    /// Returns `None` if the label is unknown.
    pub fn for_label(label: &str) -> Option<Self> {
        Encoding::for_label_no_replacement(label.as_bytes())
            .map(|locale| PathCharset { locale })
    }

    /// Convert display text into a name suitable for the file system.
    pub fn to_fs<'a>(&self, name: &'a str) -> Cow<'a, OsStr> {
        if name.chars().any(|c| raw_byte(c).is_some()) {
            return Cow::Owned(OsString::from_vec(self.encode_escaped(name)));
        }

        match self.encode(name) {
            Cow::Borrowed(b) => Cow::Borrowed(OsStr::from_bytes(b)),
            Cow::Owned(b) => Cow::Owned(OsString::from_vec(b)),
        }
    }

    /// Convert a name read from the file system into display text.
    pub fn from_fs<'a>(&self, name: &'a OsStr) -> Cow<'a, str> {
        let bytes = name.as_bytes();
        self.locale
            .decode_without_bom_handling_and_without_replacement(bytes)
            .unwrap_or_else(|| Cow::Owned(escape_raw(bytes)))
    }

    fn encode<'a>(&self, text: &'a str) -> Cow<'a, [u8]> {
        if UTF_8 == self.locale {
            return Cow::Borrowed(text.as_bytes());
        }

        let (encoded, _, had_errors) = self.locale.encode(text);
        if had_errors {
            Cow::Borrowed(text.as_bytes())
        } else {
            encoded
        }
    }

    /// Encode `path` component by component, restoring the raw bytes of any
    /// component that carries escapes.
    fn encode_escaped(&self, path: &str) -> Vec<u8> {
        let mut out = Vec::with_capacity(path.len());
        for (ix, component) in path.split('/').enumerate() {
            if ix > 0 {
                out.push(b'/');
            }

            if component.chars().any(|c| raw_byte(c).is_some()) {
                let mut buf = [0u8; 4];
                for c in component.chars() {
                    match raw_byte(c) {
                        Some(b) => out.push(b),
                        None => out.extend_from_slice(
                            &self.encode(c.encode_utf8(&mut buf)),
                        ),
                    }
                }
            } else {
                out.extend_from_slice(&self.encode(component));
            }
        }
        out
    }
}

const RAW_BYTE_BASE: u32 = 0xF700;

fn raw_byte(c: char) -> Option<u8> {
    let c = u32::from(c);
    if c >= RAW_BYTE_BASE + 0x80 && c <= RAW_BYTE_BASE + 0xFF {
        Some((c - RAW_BYTE_BASE) as u8)
    } else {
        None
    }
}

fn escape_raw(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|&b| {
            if b.is_ascii() {
                char::from(b)
            } else {
                std::char::from_u32(RAW_BYTE_BASE + u32::from(b))
                    .unwrap_or(std::char::REPLACEMENT_CHARACTER)
            }
        })
        .collect()
}
