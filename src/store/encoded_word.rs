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

//! RFC 2047 "encoded words", as found in subjects and display names.

use std::str;

use encoding_rs::Encoding;
use nom::{
    bytes::complete::{is_not, tag, take_while},
    character::complete::char,
    sequence::{delimited, terminated, tuple},
    IResult,
};

// =?charset?encoding?text?=
fn encoded_word(i: &[u8]) -> IResult<&[u8], (&[u8], &[u8], &[u8])> {
    delimited(
        tag("=?"),
        tuple((
            terminated(is_not("?"), char('?')),
            terminated(is_not("?"), char('?')),
            take_while(|b| b'?' != b),
        )),
        tag("?="),
    )(i)
}

/// Test if `word` (in its entirety) is an encoded word, and decode it if so.
///
/// Returns `None` if it is not an encoded word, or if it names a charset or
/// transfer encoding we don't know, or its content is malformed. The
/// distinction from "returned unchanged" matters to callers, since white
/// space between two adjacent encoded words is dropped.
pub fn ew_decode(word: &str) -> Option<String> {
    let (rest, (charset, xfer, text)) = encoded_word(word.as_bytes()).ok()?;
    if !rest.is_empty() {
        return None;
    }

    let content = match xfer {
        [b'q'] | [b'Q'] => q_decode(text),
        [b'b'] | [b'B'] => base64::decode(text).ok()?,
        _ => return None,
    };

    // RFC 2231 allows a language tag after the charset, e.g. "utf-8*en"
    let charset = charset.split(|&b| b'*' == b).next().unwrap_or(charset);
    let encoding = Encoding::for_label_no_replacement(charset)?;
    Some(encoding.decode_with_bom_removal(&content).0.into_owned())
}

/// The "Q" encoding: quoted-printable, plus `_` standing for a space.
///
/// Malformed escapes pass through untouched.
fn q_decode(text: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(text.len());
    let mut ix = 0;
    while ix < text.len() {
        match text[ix] {
            b'_' => out.push(b' '),
            b'=' => {
                let escaped = text
                    .get(ix + 1..ix + 3)
                    .filter(|hex| hex.iter().all(u8::is_ascii_hexdigit))
                    .and_then(|hex| str::from_utf8(hex).ok())
                    .and_then(|hex| u8::from_str_radix(hex, 16).ok());
                if let Some(b) = escaped {
                    out.push(b);
                    ix += 3;
                    continue;
                }
                out.push(b'=');
            }
            b => out.push(b),
        }
        ix += 1;
    }
    out
}

/// Decode every encoded word in a piece of unstructured header text.
///
/// White space between two encoded words is removed; everything else is kept
/// as is.
pub fn decode_unstructured(text: &str) -> String {
    let is_space = |c: char| ' ' == c || '\t' == c;

    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    let mut after_encoded = false;

    while !rest.is_empty() {
        let word_start = rest.len() - rest.trim_start_matches(is_space).len();
        let space = &rest[..word_start];
        rest = &rest[word_start..];

        let word_len = rest.find(is_space).unwrap_or(rest.len());
        let word = &rest[..word_len];
        rest = &rest[word_len..];

        match ew_decode(word) {
            Some(decoded) => {
                if !after_encoded {
                    out.push_str(space);
                }
                out.push_str(&decoded);
                after_encoded = true;
            }
            None => {
                out.push_str(space);
                out.push_str(word);
                after_encoded = false;
            }
        }
    }

    out
}
