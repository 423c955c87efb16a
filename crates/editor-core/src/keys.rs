use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Key {
    Char(char),
    Enter,
    Escape,
    Tab,
    Backspace,
    Up,
    Down,
    Left,
    Right,
}

/// `primary` is the platform command key: Ctrl, or Cmd on macOS ("Mod").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Modifiers {
    pub primary: bool,
    pub shift: bool,
    pub alt: bool,
}

impl Modifiers {
    pub fn is_empty(self) -> bool {
        !(self.primary || self.shift || self.alt)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KeyStroke {
    pub key: Key,
    #[serde(default)]
    pub modifiers: Modifiers,
}

impl KeyStroke {
    pub fn new(key: Key) -> Self {
        Self {
            key,
            modifiers: Modifiers::default(),
        }
    }

    pub fn primary(mut self) -> Self {
        self.modifiers.primary = true;
        self
    }

    pub fn shift(mut self) -> Self {
        self.modifiers.shift = true;
        self
    }

    pub fn alt(mut self) -> Self {
        self.modifiers.alt = true;
        self
    }

    /// Character key compared case-insensitively, so Mod-Shift-Z matches `'z'`.
    pub(crate) fn is_char(&self, c: char) -> bool {
        matches!(self.key, Key::Char(k) if k.eq_ignore_ascii_case(&c))
    }
}

impl From<Key> for KeyStroke {
    fn from(key: Key) -> Self {
        Self::new(key)
    }
}
