//! Zero-width padding used to slip past the server's duplicate-message filter.

use rand::seq::SliceRandom;
use rand::Rng;

/// Characters the game client renders as nothing.
pub const INVISIBLE_CHARACTERS: [char; 5] = [
    '\u{200B}', // zero width space
    '\u{200C}', // zero width non-joiner
    '\u{200D}', // zero width joiner
    '\u{2060}', // word joiner
    '\u{2063}', // invisible separator
];

/// Zero-width character used by the chat-filter workaround.
pub const FILTER_BREAKER: char = '\u{200B}';

/// Whether `c` is one of the padding characters.
pub fn is_invisible(c: char) -> bool {
    INVISIBLE_CHARACTERS.contains(&c) || c == '\u{FEFF}'
}

/// Remove every invisible character from `text`.
pub fn strip_invisible(text: &str) -> String {
    text.chars().filter(|c| !is_invisible(*c)).collect()
}

/// How padding is applied to a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaddingMode {
    /// Padding appended after the text.
    Append,
    /// Padding scattered at random positions through the text.
    Interleave,
}

/// Produces pseudo-random invisible padding.
#[derive(Debug, Default, Clone, Copy)]
pub struct InvisibleCharacterCodec;

impl InvisibleCharacterCodec {
    pub fn new() -> Self {
        Self
    }

    /// One random invisible character.
    pub fn random_char(&self) -> char {
        INVISIBLE_CHARACTERS
            .choose(&mut rand::thread_rng())
            .copied()
            .unwrap_or(FILTER_BREAKER)
    }

    /// `count` random invisible characters.
    pub fn random_string(&self, count: usize) -> String {
        (0..count).map(|_| self.random_char()).collect()
    }

    /// Fill `text` up to exactly `budget` characters.
    ///
    /// Text that already fills the budget is truncated and left unpadded.
    pub fn pad(&self, text: &str, budget: usize, mode: PaddingMode) -> String {
        let len = text.chars().count();
        if len >= budget {
            return text.chars().take(budget).collect();
        }

        let missing = budget - len;
        match mode {
            PaddingMode::Append => {
                let mut padded = String::with_capacity(text.len() + missing * 3);
                padded.push_str(text);
                padded.push_str(&self.random_string(missing));
                padded
            }
            PaddingMode::Interleave => self.interleave(text, missing),
        }
    }

    /// Insert `count` invisible characters at random positions.
    fn interleave(&self, text: &str, count: usize) -> String {
        let mut chars: Vec<char> = text.chars().collect();
        let mut rng = rand::thread_rng();
        for _ in 0..count {
            let position = rng.gen_range(0..=chars.len());
            chars.insert(position, self.random_char());
        }
        chars.into_iter().collect()
    }
}
