//! Symbol codec for cloud variable payloads
//!
//! Cloud variables only carry decimal digits, so text is transmitted as a
//! stream of two-digit groups: each character becomes its index in the
//! [`Charset`] plus 10, and every string is closed by the terminator `00`.
//! Any group below 10 ends the current string, which lets a single variable
//! value carry several consecutive strings (a packet name followed by its
//! value, for instance).

use std::collections::HashMap;
use std::iter::FusedIterator;
use std::sync::Arc;

use thiserror::Error;

use crate::error::{CloudLinkError, Result};

/// Symbol set used by the platform's cloud projects.
pub const DEFAULT_CHARSET: &str =
    "abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ`~1234567890! @#$%^&*()_-.\";:'?><,/";

/// Group marking the end of one encoded string.
pub const TERMINATOR: &str = "00";

/// Added to every symbol index so that all codes are two digits wide.
const CODE_OFFSET: u8 = 10;

/// Largest alphabet that still fits in two-digit codes (10..=99).
pub const MAX_SYMBOLS: usize = 90;

/// Errors raised while encoding or decoding cloud payloads.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("character {ch:?} at position {position} is not in the cloud charset")]
    UnsupportedCharacter { ch: char, position: usize },

    #[error("invalid encoded group {group:?} at offset {offset}")]
    InvalidGroup { group: String, offset: usize },

    #[error("encoded packet is {len} characters, limit is {limit}")]
    PacketTooLarge { len: usize, limit: usize },
}

/// Immutable, ordered alphabet shared by encoder and decoder.
///
/// Cloning is cheap; clones share the same tables.
#[derive(Debug, Clone)]
pub struct Charset {
    symbols: Arc<[char]>,
    index: Arc<HashMap<char, u8>>,
}

impl Charset {
    /// Build a charset from an ordered list of symbols.
    ///
    /// Fails if the alphabet is empty, has more than [`MAX_SYMBOLS`] symbols,
    /// or lists a symbol twice.
    pub fn new(symbols: &str) -> Result<Self> {
        let symbols: Vec<char> = symbols.chars().collect();
        if symbols.is_empty() {
            return Err(CloudLinkError::ConfigurationError(
                "charset must contain at least one symbol".to_string(),
            ));
        }
        if symbols.len() > MAX_SYMBOLS {
            return Err(CloudLinkError::ConfigurationError(format!(
                "charset has {} symbols, at most {} fit in two-digit codes",
                symbols.len(),
                MAX_SYMBOLS
            )));
        }

        let mut index = HashMap::with_capacity(symbols.len());
        for (i, &ch) in symbols.iter().enumerate() {
            if index.insert(ch, i as u8).is_some() {
                return Err(CloudLinkError::ConfigurationError(format!(
                    "charset lists {:?} more than once",
                    ch
                )));
            }
        }

        Ok(Self {
            symbols: symbols.into(),
            index: Arc::new(index),
        })
    }

    /// Number of symbols in the alphabet.
    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    /// Zero-based position of `ch`, if it belongs to the alphabet.
    pub fn index_of(&self, ch: char) -> Option<u8> {
        self.index.get(&ch).copied()
    }

    /// Symbol at zero-based position `index`.
    pub fn symbol(&self, index: usize) -> Option<char> {
        self.symbols.get(index).copied()
    }

    pub fn contains(&self, ch: char) -> bool {
        self.index.contains_key(&ch)
    }
}

impl Default for Charset {
    fn default() -> Self {
        let symbols: Vec<char> = DEFAULT_CHARSET.chars().collect();
        let index = symbols
            .iter()
            .enumerate()
            .map(|(i, &ch)| (ch, i as u8))
            .collect();
        Self {
            symbols: symbols.into(),
            index: Arc::new(index),
        }
    }
}

/// Encoder/decoder bound to one [`Charset`].
///
/// # Example
///
/// ```rust
/// use cloud_link::Codec;
///
/// let codec = Codec::default();
/// let encoded = codec.encode("hi").unwrap();
/// assert_eq!(encoded, "171800");
///
/// let decoded: Vec<String> = codec.decode(&encoded).collect::<Result<_, _>>().unwrap();
/// assert_eq!(decoded, vec!["hi".to_string()]);
/// ```
#[derive(Debug, Clone, Default)]
pub struct Codec {
    charset: Charset,
}

impl Codec {
    pub fn new(charset: Charset) -> Self {
        Self { charset }
    }

    pub fn charset(&self) -> &Charset {
        &self.charset
    }

    /// Encode one string, terminator included.
    pub fn encode(&self, input: &str) -> std::result::Result<String, CodecError> {
        let mut out = String::with_capacity(input.len() * 2 + TERMINATOR.len());
        for (position, ch) in input.chars().enumerate() {
            let index = self
                .charset
                .index_of(ch)
                .ok_or(CodecError::UnsupportedCharacter { ch, position })?;
            let code = index + CODE_OFFSET;
            out.push(char::from(b'0' + code / 10));
            out.push(char::from(b'0' + code % 10));
        }
        out.push_str(TERMINATOR);
        Ok(out)
    }

    /// Encode several strings back to back into one stream.
    pub fn encode_all<'s>(
        &self,
        parts: impl IntoIterator<Item = &'s str>,
    ) -> std::result::Result<String, CodecError> {
        let mut out = String::new();
        for part in parts {
            out.push_str(&self.encode(part)?);
        }
        Ok(out)
    }

    /// Lazily decode a stream into its terminator-delimited strings.
    ///
    /// An unterminated tail is not yielded, and a trailing odd digit is
    /// ignored. The first malformed group yields an error and ends the
    /// sequence.
    pub fn decode<'a>(&'a self, input: &'a str) -> Decode<'a> {
        Decode {
            charset: &self.charset,
            bytes: input.as_bytes(),
            pos: 0,
            current: String::new(),
            done: false,
        }
    }
}

/// Iterator returned by [`Codec::decode`].
#[derive(Debug)]
pub struct Decode<'a> {
    charset: &'a Charset,
    bytes: &'a [u8],
    pos: usize,
    current: String,
    done: bool,
}

impl<'a> Decode<'a> {
    fn invalid(&mut self, offset: usize) -> Option<std::result::Result<String, CodecError>> {
        self.done = true;
        let group = String::from_utf8_lossy(&self.bytes[offset..offset + 2]).into_owned();
        Some(Err(CodecError::InvalidGroup { group, offset }))
    }
}

impl<'a> Iterator for Decode<'a> {
    type Item = std::result::Result<String, CodecError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        while self.pos + 2 <= self.bytes.len() {
            let offset = self.pos;
            let (hi, lo) = (self.bytes[offset], self.bytes[offset + 1]);
            self.pos += 2;

            if !hi.is_ascii_digit() || !lo.is_ascii_digit() {
                return self.invalid(offset);
            }

            let code = (hi - b'0') * 10 + (lo - b'0');
            if code < CODE_OFFSET {
                return Some(Ok(std::mem::take(&mut self.current)));
            }

            match self.charset.symbol(usize::from(code - CODE_OFFSET)) {
                Some(ch) => self.current.push(ch),
                None => return self.invalid(offset),
            }
        }

        self.done = true;
        None
    }
}

impl FusedIterator for Decode<'_> {}
