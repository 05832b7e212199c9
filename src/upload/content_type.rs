// storageto - Rust client for the storage.to file sharing service
// Copyright 2025 The storageto Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Content type detection for local files

use std::io::SeekFrom;
use std::path::Path;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeek, AsyncSeekExt};

/// Number of leading bytes inspected when the extension is unknown.
pub const SNIFF_LEN: usize = 512;

pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";
const TEXT_PLAIN_UTF8: &str = "text/plain; charset=utf-8";

const EXTENSION_TYPES: &[(&str, &str)] = &[
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("png", "image/png"),
    ("gif", "image/gif"),
    ("webp", "image/webp"),
    ("svg", "image/svg+xml"),
    ("pdf", "application/pdf"),
    ("zip", "application/zip"),
    ("tar", "application/x-tar"),
    ("gz", "application/gzip"),
    ("tgz", "application/gzip"),
    ("bz2", "application/x-bzip2"),
    ("xz", "application/x-xz"),
    ("7z", "application/x-7z-compressed"),
    ("rar", "application/vnd.rar"),
    ("mp4", "video/mp4"),
    ("webm", "video/webm"),
    ("mov", "video/quicktime"),
    ("avi", "video/x-msvideo"),
    ("mkv", "video/x-matroska"),
    ("mp3", "audio/mpeg"),
    ("wav", "audio/wav"),
    ("ogg", "audio/ogg"),
    ("flac", "audio/flac"),
    ("txt", "text/plain"),
    ("md", "text/markdown"),
    ("json", "application/json"),
    ("xml", "application/xml"),
    ("html", "text/html"),
    ("css", "text/css"),
    ("js", "application/javascript"),
    ("ts", "application/typescript"),
    ("go", "text/x-go"),
    ("py", "text/x-python"),
    ("rb", "text/x-ruby"),
    ("rs", "text/x-rust"),
    ("c", "text/x-c"),
    ("cpp", "text/x-c++"),
    ("h", "text/x-c"),
    ("hpp", "text/x-c++"),
    ("java", "text/x-java"),
    ("php", "text/x-php"),
    ("sh", "application/x-sh"),
    ("sql", "application/sql"),
    ("yml", "application/x-yaml"),
    ("yaml", "application/x-yaml"),
    ("toml", "application/toml"),
];

/// Looks up the media type for a path by its (case-insensitive) extension.
pub fn content_type_from_extension(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    EXTENSION_TYPES
        .iter()
        .find(|(e, _)| *e == ext)
        .map(|(_, mime)| *mime)
}

/// Determines the media type of a file: extension first, then content.
pub fn detect_content_type(path: &Path, head: &[u8]) -> String {
    match content_type_from_extension(path) {
        Some(mime) => mime.to_string(),
        None => sniff_content_type(head).to_string(),
    }
}

/// Reads up to [`SNIFF_LEN`] bytes from the start of `reader` and rewinds it.
pub async fn read_head<R>(reader: &mut R) -> std::io::Result<Vec<u8>>
where
    R: AsyncRead + AsyncSeek + Unpin,
{
    let mut head = Vec::with_capacity(SNIFF_LEN);
    AsyncReadExt::take(&mut *reader, SNIFF_LEN as u64)
        .read_to_end(&mut head)
        .await?;
    reader.seek(SeekFrom::Start(0)).await?;
    Ok(head)
}

enum Signature {
    Exact(&'static [u8]),
    /// Bytes compared after applying the mask, for patterns with wildcards.
    Masked {
        pattern: &'static [u8],
        mask: &'static [u8],
    },
    /// Case-insensitive HTML tag that must be followed by a space or '>'.
    HtmlTag(&'static [u8]),
    Mp4,
}

impl Signature {
    fn matches(&self, data: &[u8]) -> bool {
        match self {
            Signature::Exact(prefix) => data.starts_with(prefix),
            Signature::Masked { pattern, mask } => {
                data.len() >= pattern.len()
                    && pattern
                        .iter()
                        .zip(mask.iter())
                        .zip(data.iter())
                        .all(|((p, m), d)| d & m == *p)
            }
            Signature::HtmlTag(tag) => {
                let data = skip_whitespace(data);
                if data.len() < tag.len() + 1 {
                    return false;
                }
                let same = data
                    .iter()
                    .zip(tag.iter())
                    .all(|(d, t)| d.to_ascii_uppercase() == *t);
                same && matches!(data[tag.len()], b' ' | b'>')
            }
            Signature::Mp4 => is_mp4(data),
        }
    }
}

fn skip_whitespace(data: &[u8]) -> &[u8] {
    let start = data
        .iter()
        .position(|b| !matches!(b, b'\t' | b'\n' | b'\x0c' | b'\r' | b' '))
        .unwrap_or(data.len());
    &data[start..]
}

fn is_mp4(data: &[u8]) -> bool {
    if data.len() < 12 {
        return false;
    }
    let box_size = u32::from_be_bytes([data[0], data[1], data[2], data[3]]) as usize;
    if data.len() < box_size || box_size % 4 != 0 || box_size < 12 {
        return false;
    }
    if &data[4..8] != b"ftyp" {
        return false;
    }
    (8..box_size)
        .step_by(4)
        .filter(|&i| i != 12)
        .any(|i| data.get(i..i + 3) == Some(&b"mp4"[..]))
}

const SIGNATURES: &[(Signature, &str)] = &[
    (Signature::HtmlTag(b"<!DOCTYPE HTML"), "text/html; charset=utf-8"),
    (Signature::HtmlTag(b"<HTML"), "text/html; charset=utf-8"),
    (Signature::HtmlTag(b"<HEAD"), "text/html; charset=utf-8"),
    (Signature::HtmlTag(b"<SCRIPT"), "text/html; charset=utf-8"),
    (Signature::HtmlTag(b"<IFRAME"), "text/html; charset=utf-8"),
    (Signature::HtmlTag(b"<H1"), "text/html; charset=utf-8"),
    (Signature::HtmlTag(b"<DIV"), "text/html; charset=utf-8"),
    (Signature::HtmlTag(b"<FONT"), "text/html; charset=utf-8"),
    (Signature::HtmlTag(b"<TABLE"), "text/html; charset=utf-8"),
    (Signature::HtmlTag(b"<A"), "text/html; charset=utf-8"),
    (Signature::HtmlTag(b"<STYLE"), "text/html; charset=utf-8"),
    (Signature::HtmlTag(b"<TITLE"), "text/html; charset=utf-8"),
    (Signature::HtmlTag(b"<B"), "text/html; charset=utf-8"),
    (Signature::HtmlTag(b"<BODY"), "text/html; charset=utf-8"),
    (Signature::HtmlTag(b"<BR"), "text/html; charset=utf-8"),
    (Signature::HtmlTag(b"<P"), "text/html; charset=utf-8"),
    (Signature::HtmlTag(b"<!--"), "text/html; charset=utf-8"),
    (Signature::Exact(b"<?xml"), "text/xml; charset=utf-8"),
    (Signature::Exact(b"%PDF-"), "application/pdf"),
    (Signature::Exact(b"%!PS-Adobe-"), "application/postscript"),
    (Signature::Exact(b"\xFE\xFF"), "text/plain; charset=utf-16be"),
    (Signature::Exact(b"\xFF\xFE"), "text/plain; charset=utf-16le"),
    (Signature::Exact(b"\xEF\xBB\xBF"), TEXT_PLAIN_UTF8),
    (Signature::Exact(b"\x00\x00\x01\x00"), "image/x-icon"),
    (Signature::Exact(b"\x00\x00\x02\x00"), "image/x-icon"),
    (Signature::Exact(b"BM"), "image/bmp"),
    (Signature::Exact(b"GIF87a"), "image/gif"),
    (Signature::Exact(b"GIF89a"), "image/gif"),
    (
        Signature::Masked {
            pattern: b"RIFF\x00\x00\x00\x00WEBPVP",
            mask: b"\xFF\xFF\xFF\xFF\x00\x00\x00\x00\xFF\xFF\xFF\xFF\xFF\xFF",
        },
        "image/webp",
    ),
    (Signature::Exact(b"\x89PNG\x0D\x0A\x1A\x0A"), "image/png"),
    (Signature::Exact(b"\xFF\xD8\xFF"), "image/jpeg"),
    (
        Signature::Masked {
            pattern: b"FORM\x00\x00\x00\x00AIFF",
            mask: b"\xFF\xFF\xFF\xFF\x00\x00\x00\x00\xFF\xFF\xFF\xFF",
        },
        "audio/aiff",
    ),
    (Signature::Exact(b"ID3"), "audio/mpeg"),
    (Signature::Exact(b"OggS\x00"), "application/ogg"),
    (Signature::Exact(b"MThd\x00\x00\x00\x06"), "audio/midi"),
    (
        Signature::Masked {
            pattern: b"RIFF\x00\x00\x00\x00AVI ",
            mask: b"\xFF\xFF\xFF\xFF\x00\x00\x00\x00\xFF\xFF\xFF\xFF",
        },
        "video/avi",
    ),
    (
        Signature::Masked {
            pattern: b"RIFF\x00\x00\x00\x00WAVE",
            mask: b"\xFF\xFF\xFF\xFF\x00\x00\x00\x00\xFF\xFF\xFF\xFF",
        },
        "audio/wave",
    ),
    (Signature::Mp4, "video/mp4"),
    (Signature::Exact(b"\x1A\x45\xDF\xA3"), "video/webm"),
    (Signature::Exact(b"wOFF"), "font/woff"),
    (Signature::Exact(b"wOF2"), "font/woff2"),
    (Signature::Exact(b"\x1F\x8B\x08"), "application/x-gzip"),
    (Signature::Exact(b"PK\x03\x04"), "application/zip"),
    (Signature::Exact(b"Rar!\x1A\x07\x00"), "application/x-rar-compressed"),
    (Signature::Exact(b"Rar!\x1A\x07\x01\x00"), "application/x-rar-compressed"),
    (Signature::Exact(b"\x00\x61\x73\x6D"), "application/wasm"),
];

/// Classifies content by magic numbers in its leading bytes.
///
/// Falls back to UTF-8 text when no binary control bytes are present and to
/// `application/octet-stream` otherwise.
pub fn sniff_content_type(data: &[u8]) -> &'static str {
    let data = &data[..data.len().min(SNIFF_LEN)];
    if let Some((_, mime)) = SIGNATURES.iter().find(|(sig, _)| sig.matches(data)) {
        return mime;
    }
    let binary = data
        .iter()
        .any(|b| matches!(b, 0x00..=0x08 | 0x0B | 0x0E..=0x1A | 0x1C..=0x1F));
    if binary {
        DEFAULT_CONTENT_TYPE
    } else {
        TEXT_PLAIN_UTF8
    }
}
