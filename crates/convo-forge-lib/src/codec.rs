//! Text codecs applied to message bodies.
//!
//! Ingestion stores emoji as `:shortcode:` text ([`Demojize`]) so that turn
//! tables stay plain ASCII-friendly; pair derivation turns the shortcodes back
//! into emoji ([`Emojize`]). Both directions use the gemoji shortcode table, so
//! `Emojize(Demojize(s)) == s` for every emoji that has a shortcode.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};

/// Longest emoji sequence (in chars) tried at a single position.
const MAX_EMOJI_CHARS: usize = 12;

static SHORTCODE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r":([a-z0-9_+\-]+):").expect("static shortcode regex"));

/// A pure `&str -> String` transformation of message text.
pub trait TextCodec: Send + Sync {
    fn normalize(&self, text: &str) -> String;
}

/// Replace emoji with `:shortcode:` tokens.
#[derive(Debug, Clone, Copy, Default)]
pub struct Demojize;

/// Replace `:shortcode:` tokens with emoji. Unknown shortcodes are left as-is.
#[derive(Debug, Clone, Copy, Default)]
pub struct Emojize;

/// Identity codec.
#[derive(Debug, Clone, Copy, Default)]
pub struct Verbatim;

impl TextCodec for Demojize {
    fn normalize(&self, text: &str) -> String {
        if text.is_ascii() {
            return text.to_string();
        }

        let bounds: Vec<usize> = text
            .char_indices()
            .map(|(i, _)| i)
            .chain(std::iter::once(text.len()))
            .collect();
        let chars = bounds.len() - 1;

        let mut out = String::with_capacity(text.len());
        let mut i = 0;
        while i < chars {
            let longest = (chars - i).min(MAX_EMOJI_CHARS);
            let hit = (1..=longest).rev().find_map(|len| {
                let slice = &text[bounds[i]..bounds[i + len]];
                emojis::get(slice)
                    .and_then(|e| e.shortcode())
                    .map(|code| (len, code))
            });
            match hit {
                Some((len, code)) => {
                    out.push(':');
                    out.push_str(code);
                    out.push(':');
                    i += len;
                }
                None => {
                    out.push_str(&text[bounds[i]..bounds[i + 1]]);
                    i += 1;
                }
            }
        }
        out
    }
}

impl TextCodec for Emojize {
    fn normalize(&self, text: &str) -> String {
        if !text.contains(':') {
            return text.to_string();
        }
        SHORTCODE_RE
            .replace_all(text, |caps: &Captures| match emojis::get_by_shortcode(&caps[1]) {
                Some(e) => e.as_str().to_string(),
                None => caps[0].to_string(),
            })
            .into_owned()
    }
}

impl TextCodec for Verbatim {
    fn normalize(&self, text: &str) -> String {
        text.to_string()
    }
}

/// Serializable codec selector used by configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CodecKind {
    Demojize,
    Emojize,
    Verbatim,
}

impl CodecKind {
    pub fn codec(self) -> &'static dyn TextCodec {
        match self {
            CodecKind::Demojize => &Demojize,
            CodecKind::Emojize => &Emojize,
            CodecKind::Verbatim => &Verbatim,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CodecKind::Demojize => "demojize",
            CodecKind::Emojize => "emojize",
            CodecKind::Verbatim => "verbatim",
        }
    }
}
