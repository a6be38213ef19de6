//! Logical keys and status-byte decoding.

use heapless::Vec;

use crate::defs::{KEYCODE_MASK, UPDOWN_EVENT_BIT};

/// Largest key map the 3-bit keycode field can address.
pub const MAX_KEYS: usize = 8;

/// A logical touch key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Menu,
    Enter,
    Back,
    End,
    Home,
    Search,
}

impl Key {
    /// The Linux input key code for this key.
    pub fn code(self) -> u16 {
        match self {
            Key::Menu => 139,
            Key::Enter => 28,
            Key::Back => 158,
            Key::End => 107,
            Key::Home => 102,
            Key::Search => 217,
        }
    }
}

/// A decoded press or release.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyEvent {
    pub key: Key,
    pub pressed: bool,
}

/// Ordered mapping from keycode index to [`Key`].
///
/// Index 0 is reserved: the controller reports it when no key changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyMap {
    keys: Vec<Key, { MAX_KEYS - 1 }>,
}

impl KeyMap {
    /// Builds a map whose index 1 is `keys[0]`, index 2 is `keys[1]`, and so on.
    ///
    /// Keys beyond what the keycode field can address are ignored.
    pub fn new(keys: &[Key]) -> Self {
        let mut map = Vec::new();
        for key in keys.iter().take(MAX_KEYS - 1) {
            let _ = map.push(*key);
        }
        Self { keys: map }
    }

    /// Menu and Back, the two-key layout.
    pub fn two_key() -> Self {
        Self::new(&[Key::Menu, Key::Back])
    }

    /// Menu, Enter, Back and End, the four-key layout.
    pub fn four_key() -> Self {
        Self::new(&[Key::Menu, Key::Enter, Key::Back, Key::End])
    }

    /// Length including the reserved index 0.
    pub fn len(&self) -> usize {
        self.keys.len() + 1
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Looks up a keycode index. Index 0 and indices past the end yield `None`.
    pub fn get(&self, index: u8) -> Option<Key> {
        let index = index as usize;
        if index == 0 {
            return None;
        }
        self.keys.get(index - 1).copied()
    }

    /// Every mapped key, in keycode order.
    pub fn keys(&self) -> impl Iterator<Item = Key> + '_ {
        self.keys.iter().copied()
    }

    /// Decodes byte 0 of the status frame.
    ///
    /// Returns the raw keycode index as the error when it is out of range.
    pub fn decode(&self, status: u8) -> Result<KeyEvent, u8> {
        let index = status & KEYCODE_MASK;
        let pressed = (status & UPDOWN_EVENT_BIT) == 0;
        match self.get(index) {
            Some(key) => Ok(KeyEvent { key, pressed }),
            None => Err(index),
        }
    }
}

impl Default for KeyMap {
    fn default() -> Self {
        Self::two_key()
    }
}
