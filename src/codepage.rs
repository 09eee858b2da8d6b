use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

use encoding_rs::Encoding;

use crate::error::GcisError;

/// High half (0x80..=0xFF) of IBM code page 437. The low half is ASCII.
const CP437_HIGH: [char; 128] = [
    '\u{00C7}', '\u{00FC}', '\u{00E9}', '\u{00E2}', '\u{00E4}', '\u{00E0}', '\u{00E5}', '\u{00E7}',
    '\u{00EA}', '\u{00EB}', '\u{00E8}', '\u{00EF}', '\u{00EE}', '\u{00EC}', '\u{00C4}', '\u{00C5}',
    '\u{00C9}', '\u{00E6}', '\u{00C6}', '\u{00F4}', '\u{00F6}', '\u{00F2}', '\u{00FB}', '\u{00F9}',
    '\u{00FF}', '\u{00D6}', '\u{00DC}', '\u{00A2}', '\u{00A3}', '\u{00A5}', '\u{20A7}', '\u{0192}',
    '\u{00E1}', '\u{00ED}', '\u{00F3}', '\u{00FA}', '\u{00F1}', '\u{00D1}', '\u{00AA}', '\u{00BA}',
    '\u{00BF}', '\u{2310}', '\u{00AC}', '\u{00BD}', '\u{00BC}', '\u{00A1}', '\u{00AB}', '\u{00BB}',
    '\u{2591}', '\u{2592}', '\u{2593}', '\u{2502}', '\u{2524}', '\u{2561}', '\u{2562}', '\u{2556}',
    '\u{2555}', '\u{2563}', '\u{2551}', '\u{2557}', '\u{255D}', '\u{255C}', '\u{255B}', '\u{2510}',
    '\u{2514}', '\u{2534}', '\u{252C}', '\u{251C}', '\u{2500}', '\u{253C}', '\u{255E}', '\u{255F}',
    '\u{255A}', '\u{2554}', '\u{2569}', '\u{2566}', '\u{2560}', '\u{2550}', '\u{256C}', '\u{2567}',
    '\u{2568}', '\u{2564}', '\u{2565}', '\u{2559}', '\u{2558}', '\u{2552}', '\u{2553}', '\u{256B}',
    '\u{256A}', '\u{2518}', '\u{250C}', '\u{2588}', '\u{2584}', '\u{258C}', '\u{2590}', '\u{2580}',
    '\u{03B1}', '\u{00DF}', '\u{0393}', '\u{03C0}', '\u{03A3}', '\u{03C3}', '\u{00B5}', '\u{03C4}',
    '\u{03A6}', '\u{0398}', '\u{03A9}', '\u{03B4}', '\u{221E}', '\u{03C6}', '\u{03B5}', '\u{2229}',
    '\u{2261}', '\u{00B1}', '\u{2265}', '\u{2264}', '\u{2320}', '\u{2321}', '\u{00F7}', '\u{2248}',
    '\u{00B0}', '\u{2219}', '\u{00B7}', '\u{221A}', '\u{207F}', '\u{00B2}', '\u{25A0}', '\u{00A0}',
];

/// A single-byte or multi-byte text encoding used for archive entry names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Codepage {
    Cp437,
    Whatwg(&'static Encoding),
}

impl Codepage {
    pub fn name(&self) -> &'static str {
        match self {
            Codepage::Cp437 => "cp437",
            Codepage::Whatwg(encoding) => encoding.name(),
        }
    }

    /// Encodes `text`, returning `None` when a character has no mapping.
    pub fn encode(&self, text: &str) -> Option<Vec<u8>> {
        match self {
            Codepage::Cp437 => text.chars().map(cp437_byte).collect(),
            Codepage::Whatwg(encoding) => {
                let (bytes, _, had_errors) = encoding.encode(text);
                (!had_errors).then(|| bytes.into_owned())
            }
        }
    }

    /// Decodes `bytes`; unmappable sequences become U+FFFD.
    pub fn decode<'a>(&self, bytes: &'a [u8]) -> Cow<'a, str> {
        match self {
            Codepage::Cp437 => Cow::Owned(
                bytes
                    .iter()
                    .map(|&byte| {
                        if byte < 0x80 {
                            byte as char
                        } else {
                            CP437_HIGH[(byte - 0x80) as usize]
                        }
                    })
                    .collect(),
            ),
            Codepage::Whatwg(encoding) => encoding.decode_without_bom_handling(bytes).0,
        }
    }
}

fn cp437_byte(ch: char) -> Option<u8> {
    if ch.is_ascii() {
        return Some(ch as u8);
    }
    CP437_HIGH
        .iter()
        .position(|&candidate| candidate == ch)
        .map(|index| 0x80 + index as u8)
}

impl fmt::Display for Codepage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for Codepage {
    type Err = GcisError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let label = value.trim().to_ascii_lowercase();
        match label.as_str() {
            "cp437" | "ibm437" | "437" | "cspc8codepage437" => Ok(Codepage::Cp437),
            _ => Encoding::for_label(label.as_bytes())
                .map(Codepage::Whatwg)
                .ok_or_else(|| GcisError::InvalidEncoding(value.to_string())),
        }
    }
}

/// Strategy for turning an archive entry name, as decoded by the zip reader,
/// into the name the file is written under.
pub trait NameRepair: Send + Sync {
    fn repair<'a>(&self, name: &'a str) -> Cow<'a, str>;
}

/// Keeps entry names as the archive reader decoded them.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeepName;

impl NameRepair for KeepName {
    fn repair<'a>(&self, name: &'a str) -> Cow<'a, str> {
        Cow::Borrowed(name)
    }
}

/// Reverses a mis-decoding: the name is encoded back under `source` and the
/// resulting bytes are decoded under `target`.
///
/// This is a heuristic. When the archive did not actually suffer the assumed
/// mis-decoding the result is garbled, and nothing detects that.
#[derive(Debug, Clone, Copy)]
pub struct Reencode {
    pub source: Codepage,
    pub target: Codepage,
}

impl Default for Reencode {
    fn default() -> Self {
        Self {
            source: Codepage::Cp437,
            target: Codepage::Whatwg(encoding_rs::BIG5),
        }
    }
}

impl NameRepair for Reencode {
    fn repair<'a>(&self, name: &'a str) -> Cow<'a, str> {
        if name.is_ascii() {
            return Cow::Borrowed(name);
        }
        match self.source.encode(name) {
            Some(bytes) => Cow::Owned(self.target.decode(&bytes).into_owned()),
            None => {
                tracing::debug!(name, source = %self.source, "entry name not encodable, kept as is");
                Cow::Borrowed(name)
            }
        }
    }
}
