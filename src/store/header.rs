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

//! Turning a message file into a `MsgInfo`.
//!
//! The store itself only needs the handful of headers kept in the header
//! cache, so the default parser just reads the header block, unfolds it, and
//! picks those out. Applications with a full MIME parser can plug it in
//! through `HeaderParser`.

use std::borrow::Cow;
use std::fmt;
use std::fs;
use std::io::{self, BufRead};
use std::os::unix::fs::MetadataExt;
use std::path::Path;

use chrono::DateTime;
use nom::{
    branch::alt,
    bytes::complete::{is_a, is_not, take, take_until, take_while, take_while1},
    character::complete::char,
    combinator::{map, opt, rest},
    multi::{fold_many0, many0, many0_count, separated_nonempty_list},
    sequence::{delimited, pair, preceded, separated_pair, terminated},
    IResult,
};

use super::encoded_word::{decode_unstructured, ew_decode};
use super::model::{MsgFlags, MsgInfo, TmpFlags};
use crate::support::error::Error;

/// Parses a raw message file into a header record.
///
/// The parser cannot know the message number or the folder; the caller
/// stamps those onto the returned record.
pub trait HeaderParser {
    fn parse(&self, path: &Path, flags: MsgFlags) -> Result<MsgInfo, Error>;
}

/// A `HeaderParser` that understands the RFC 2822 header block.
#[derive(Clone, Copy, Debug, Default)]
pub struct Rfc2822Parser;

impl HeaderParser for Rfc2822Parser {
    fn parse(&self, path: &Path, flags: MsgFlags) -> Result<MsgInfo, Error> {
        let file = fs::File::open(path)?;
        let md = file.metadata()?;

        let mut info = MsgInfo {
            size: md.len(),
            mtime: md.mtime(),
            flags,
            ..MsgInfo::default()
        };

        for (name, value) in read_header_block(io::BufReader::new(file))? {
            apply_header(&mut info, &name, value);
        }

        Ok(info)
    }
}

// RFC 2822 2.2 header field. Obsolete syntax allows white space before the
// colon.
fn field(i: &[u8]) -> IResult<&[u8], (&[u8], &[u8])> {
    separated_pair(
        take_while1(|b: u8| b > b' ' && b < 127 && b != b':'),
        pair(take_while(|b: u8| b' ' == b || b'\t' == b), char(':')),
        rest,
    )(i)
}

/// Read the unfolded header fields at the start of `reader`, stopping at the
/// first empty line.
///
/// Field names are returned in lower case. Lines that are not fields are
/// skipped.
fn read_header_block(
    mut reader: impl BufRead,
) -> io::Result<Vec<(String, String)>> {
    let mut headers: Vec<(String, String)> = Vec::new();
    let mut line = Vec::new();

    loop {
        line.clear();
        if 0 == reader.read_until(b'\n', &mut line)? {
            break;
        }

        while line.last().map_or(false, |&b| b == b'\n' || b == b'\r') {
            line.pop();
        }

        if line.is_empty() {
            break;
        }

        if b' ' == line[0] || b'\t' == line[0] {
            if let Some((_, value)) = headers.last_mut() {
                value.push(' ');
                value.push_str(String::from_utf8_lossy(&line).trim());
            }
            continue;
        }

        if let Ok((_, (name, value))) = field(&line) {
            headers.push((
                String::from_utf8_lossy(name).to_ascii_lowercase(),
                String::from_utf8_lossy(value).trim().to_owned(),
            ));
        }
    }

    Ok(headers)
}

fn apply_header(info: &mut MsgInfo, name: &str, value: String) {
    match name {
        "from" if info.from.is_empty() => {
            info.fromname = from_name(&value);
            info.from = decode_unstructured(&value);
        }
        "date" if info.date.is_empty() => {
            info.date_t = DateTime::parse_from_rfc2822(&value)
                .map(|d| d.timestamp())
                .unwrap_or(0);
            info.date = value;
        }
        "to" => append_list(&mut info.to, decode_unstructured(&value)),
        "cc" => append_list(&mut info.cc, decode_unstructured(&value)),
        "newsgroups" => append_list(&mut info.newsgroups, value),
        "subject" if info.subject.is_empty() => {
            info.subject = decode_unstructured(&value)
        }
        "message-id" if info.msgid.is_empty() => {
            info.msgid = match msg_id(value.as_bytes()) {
                Ok((_, id)) => String::from_utf8_lossy(id).into_owned(),
                Err(_) => value,
            };
        }
        "in-reply-to" if info.inreplyto.is_empty() => {
            if let Ok((_, id)) = first_msg_id(value.as_bytes()) {
                info.inreplyto = String::from_utf8_lossy(id).into_owned();
            }
        }
        "references" if info.references.is_empty() => info.references = value,
        "mime-version" => info.flags.tmp |= TmpFlags::MIME,
        "content-type"
            if value.to_ascii_lowercase().starts_with("multipart/") =>
        {
            info.flags.tmp |= TmpFlags::MIME
        }
        _ => (),
    }
}

fn append_list(dst: &mut String, value: String) {
    if dst.is_empty() {
        *dst = value;
    } else {
        dst.push_str(", ");
        dst.push_str(&value);
    }
}

/// The part of a `From` header worth showing in a message list: the decoded
/// display name of the first mailbox if there is one, otherwise its address.
fn from_name(from: &str) -> String {
    match mailbox(from.as_bytes()) {
        Ok((_, (Some(name), _))) if name.iter().any(|w| !w.is_empty()) => {
            phrase_text(&name)
        }
        Ok((_, (_, addr))) => addr.to_string(),
        Err(_) => decode_unstructured(from),
    }
}

/// Join the words of a phrase into display text, decoding encoded words.
fn phrase_text(words: &[Cow<[u8]>]) -> String {
    let mut out = String::new();
    let mut after_encoded = false;

    for word in words {
        let text = String::from_utf8_lossy(word);
        let (text, encoded) = match ew_decode(&text) {
            Some(decoded) => (Cow::Owned(decoded), true),
            None => (text, false),
        };

        if !out.is_empty() && "." != text && !(encoded && after_encoded) {
            out.push(' ');
        }
        out.push_str(&text);
        after_encoded = encoded;
    }

    out
}

struct AddrSpec<'a> {
    local: Vec<Cow<'a, [u8]>>,
    domain: Vec<Cow<'a, [u8]>>,
}

impl fmt::Display for AddrSpec<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let join = |parts: &[Cow<[u8]>]| {
            parts
                .iter()
                .map(|p| String::from_utf8_lossy(p))
                .collect::<Vec<_>>()
                .join(".")
        };
        write!(f, "{}@{}", join(&self.local[..]), join(&self.domain[..]))
    }
}

// RFC 2822 3.2.2 quoted-pair, 8-bit clean
fn quoted_pair(i: &[u8]) -> IResult<&[u8], &[u8]> {
    preceded(char('\\'), take(1usize))(i)
}

// RFC 2822 3.2.3 folding white space. The header is already unfolded, so
// this only ever sees plain spaces and tabs.
fn fws(i: &[u8]) -> IResult<&[u8], &[u8]> {
    map(is_a(" \t\r\n"), |_| &b" "[..])(i)
}

// RFC 2822 3.2.3 comment, which nests
fn comment(i: &[u8]) -> IResult<&[u8], ()> {
    map(
        delimited(
            char('('),
            many0_count(alt((
                map(is_not("()\\ \t\r\n"), |_| ()),
                map(quoted_pair, |_| ()),
                map(fws, |_| ()),
                comment,
            ))),
            char(')'),
        ),
        |_| (),
    )(i)
}

// RFC 2822 3.2.3 comments or folding white space, possibly none at all
fn cfws(i: &[u8]) -> IResult<&[u8], ()> {
    map(many0_count(alt((map(fws, |_| ()), comment))), |_| ())(i)
}

// RFC 2822 3.2.4 atom text, with RFC 6532's non-ASCII characters
fn atext(i: &[u8]) -> IResult<&[u8], &[u8]> {
    take_while1(|b: u8| {
        b.is_ascii_alphanumeric()
            || b >= 0x80
            || b"!#$%&'*+-/=?^_`{|}~".contains(&b)
    })(i)
}

fn atom(i: &[u8]) -> IResult<&[u8], &[u8]> {
    delimited(cfws, atext, cfws)(i)
}

// RFC 2822 3.2.5 quoted string, with folding white space collapsed
fn quoted_string(i: &[u8]) -> IResult<&[u8], Vec<u8>> {
    delimited(
        pair(cfws, char('"')),
        fold_many0(
            alt((is_not(" \t\r\n\\\""), quoted_pair, fws)),
            Vec::new(),
            |mut acc: Vec<u8>, item| {
                acc.extend_from_slice(item);
                acc
            },
        ),
        pair(char('"'), cfws),
    )(i)
}

fn word(i: &[u8]) -> IResult<&[u8], Cow<[u8]>> {
    alt((map(atom, Cow::Borrowed), map(quoted_string, Cow::Owned)))(i)
}

// RFC 2822 3.2.6 phrase, plus the obsolete syntax allowing unquoted '.'
fn phrase(i: &[u8]) -> IResult<&[u8], Vec<Cow<[u8]>>> {
    map(
        pair(
            word,
            many0(alt((
                word,
                terminated(map(char('.'), |_| Cow::Borrowed(&b"."[..])), cfws),
            ))),
        ),
        |(head, mut tail)| {
            tail.insert(0, head);
            tail
        },
    )(i)
}

// RFC 2822 3.4.1 domain literal, brackets included
fn domain_literal(i: &[u8]) -> IResult<&[u8], Vec<u8>> {
    map(
        delimited(
            pair(cfws, char('[')),
            fold_many0(
                alt((is_not("[]\\ \t\r\n"), quoted_pair, fws)),
                vec![b'['],
                |mut acc: Vec<u8>, item| {
                    acc.extend_from_slice(item);
                    acc
                },
            ),
            pair(char(']'), cfws),
        ),
        |mut literal| {
            literal.push(b']');
            literal
        },
    )(i)
}

fn domain(i: &[u8]) -> IResult<&[u8], Vec<Cow<[u8]>>> {
    alt((
        separated_nonempty_list(char('.'), map(atom, Cow::Borrowed)),
        map(domain_literal, |l| vec![Cow::Owned(l)]),
    ))(i)
}

// RFC 2822 3.4.1 addr-spec, with the obsolete local part syntax
fn addr_spec(i: &[u8]) -> IResult<&[u8], AddrSpec> {
    map(
        separated_pair(
            separated_nonempty_list(char('.'), word),
            char('@'),
            domain,
        ),
        |(local, domain)| AddrSpec { local, domain },
    )(i)
}

fn angle_addr(i: &[u8]) -> IResult<&[u8], AddrSpec> {
    delimited(pair(cfws, char('<')), addr_spec, pair(char('>'), cfws))(i)
}

// RFC 2822 3.4 mailbox: a display name and angle address, or a bare address
fn mailbox(i: &[u8]) -> IResult<&[u8], (Option<Vec<Cow<[u8]>>>, AddrSpec)> {
    alt((
        pair(opt(phrase), angle_addr),
        map(addr_spec, |addr| (None, addr)),
    ))(i)
}

// RFC 2822 3.6.4 msg-id, returning what is between the angle brackets
fn msg_id(i: &[u8]) -> IResult<&[u8], &[u8]> {
    delimited(
        pair(cfws, char('<')),
        is_not("<> \t\r\n"),
        pair(char('>'), cfws),
    )(i)
}

// In-Reply-To is often preceded by free text from old agents
fn first_msg_id(i: &[u8]) -> IResult<&[u8], &[u8]> {
    preceded(take_until("<"), msg_id)(i)
}

#[cfg(test)]
mod test {
    use tempfile::TempDir;

    use super::*;
    use crate::store::model::PermFlags;

    const SAMPLE: &str = "From: \"Jane Doe\" <jane@example.com>\r\n\
                          To: bob@example.com,\r\n\
                          \tcarol@example.com\r\n\
                          Cc: dave@example.com\r\n\
                          Subject: Quarterly\r\n \
                          report\r\n\
                          Date: Tue, 1 Jul 2003 10:52:37 +0200\r\n\
                          Message-ID: <1234@example.com>\r\n\
                          In-Reply-To: <1000@example.com> (Bob's message)\r\n\
                          References: <999@example.com> <1000@example.com>\r\n\
                          MIME-Version: 1.0\r\n\
                          \r\n\
                          Subject: not a header\r\n";

    #[test]
    fn parse_sample_message() {
        let tmpdir = TempDir::new().unwrap();
        let path = tmpdir.path().join("1");
        fs::write(&path, SAMPLE).unwrap();

        let flags = MsgFlags::new(PermFlags::NEW, TmpFlags::empty());
        let info = Rfc2822Parser.parse(&path, flags).unwrap();

        assert_eq!(None, info.num);
        assert_eq!(SAMPLE.len() as u64, info.size);
        assert_eq!("Jane Doe", info.fromname);
        assert_eq!("\"Jane Doe\" <jane@example.com>", info.from);
        assert_eq!("bob@example.com, carol@example.com", info.to);
        assert_eq!("dave@example.com", info.cc);
        assert_eq!("Quarterly report", info.subject);
        assert_eq!(1057049557, info.date_t);
        assert_eq!("1234@example.com", info.msgid);
        assert_eq!("1000@example.com", info.inreplyto);
        assert_eq!("<999@example.com> <1000@example.com>", info.references);
        assert_eq!(PermFlags::NEW, info.flags.perm);
        assert_eq!(TmpFlags::MIME, info.flags.tmp);
    }

    #[test]
    fn parse_headerless_and_odd_messages() {
        let tmpdir = TempDir::new().unwrap();
        let path = tmpdir.path().join("1");
        fs::write(&path, "").unwrap();
        let info = Rfc2822Parser.parse(&path, MsgFlags::default()).unwrap();
        assert_eq!(0, info.size);
        assert_eq!("", info.subject);

        fs::write(&path, "From: <x@example.com>\nDate: garbage\n\nbody\n")
            .unwrap();
        let info = Rfc2822Parser.parse(&path, MsgFlags::default()).unwrap();
        assert_eq!("x@example.com", info.fromname);
        assert_eq!("garbage", info.date);
        assert_eq!(0, info.date_t);
    }

    #[test]
    fn decode_encoded_words() {
        let tmpdir = TempDir::new().unwrap();
        let path = tmpdir.path().join("1");
        fs::write(
            &path,
            "From: =?utf-8?b?SsO8cmdlbg==?= =?utf-8?q?_M=C3=BCller?=\n \
             <jm@example.de>\n\
             To: =?iso-8859-1?q?Andr=E9?= <andre@example.fr>\n\
             Subject: =?UTF-8?Q?Gr=C3=BC=C3=9Fe?= aus Berlin\n\
             \n",
        )
        .unwrap();

        let info = Rfc2822Parser.parse(&path, MsgFlags::default()).unwrap();
        assert_eq!("Jürgen Müller", info.fromname);
        assert_eq!("Jürgen Müller <jm@example.de>", info.from);
        assert_eq!("André <andre@example.fr>", info.to);
        assert_eq!("Grüße aus Berlin", info.subject);
    }

    #[test]
    fn from_names() {
        assert_eq!("Jane Doe", from_name("\"Jane Doe\" <jane@example.com>"));
        assert_eq!("John Q. Public", from_name("John Q. Public <jqp@x.org>"));
        assert_eq!(
            "Pete",
            from_name(
                "Pete(A wonderful \\) chap) <pete(his account)@silly.test>"
            )
        );
        assert_eq!("jane@example.com", from_name("jane@example.com"));
        assert_eq!(
            "jane@example.com",
            from_name("jane@example.com (Jane Doe)")
        );
        assert_eq!("jdoe@[10.0.0.1]", from_name("\"\" <jdoe@[10.0.0.1]>"));
        assert_eq!("undisclosed", from_name("undisclosed"));
    }

    #[test]
    fn message_ids() {
        assert_eq!(
            b"1234@example.com",
            msg_id(b" <1234@example.com> (x)").unwrap().1
        );
        assert!(msg_id(b"1234@example.com").is_err());
        assert_eq!(
            b"a@b",
            first_msg_id(b"Your message of Monday <a@b>").unwrap().1
        );
        assert!(first_msg_id(b"no id here").is_err());
    }

    #[test]
    fn parse_nx_message() {
        let tmpdir = TempDir::new().unwrap();
        assert_matches!(
            Err(Error::Io(_)),
            Rfc2822Parser.parse(&tmpdir.path().join("1"), MsgFlags::default())
        );
    }
}
