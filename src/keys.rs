//! Canonical key vocabulary plus the per-surface tables that translate it to
//! native key names.

use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Modifier {
    Ctrl,
    Shift,
    Alt,
    Meta,
}

impl FromStr for Modifier {
    type Err = KeyParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ctrl" | "control" => Ok(Modifier::Ctrl),
            "shift" => Ok(Modifier::Shift),
            "alt" | "option" | "opt" => Ok(Modifier::Alt),
            "cmd" | "command" | "meta" | "super" | "win" => Ok(Modifier::Meta),
            _ => Err(KeyParseError::UnknownModifier(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Key {
    Enter,
    Tab,
    Escape,
    Backspace,
    Delete,
    Space,
    Up,
    Down,
    Left,
    Right,
    Home,
    End,
    PageUp,
    PageDown,
    Insert,
    F(u8),
    Char(char),
}

impl FromStr for Key {
    type Err = KeyParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut chars = s.chars();
        if let (Some(c), None) = (chars.next(), chars.next()) {
            return Ok(if c == ' ' { Key::Space } else { Key::Char(c) });
        }

        let key = match s.to_ascii_lowercase().replace(['-', '_'], "").as_str() {
            "enter" | "return" | "kpenter" => Key::Enter,
            "tab" => Key::Tab,
            "esc" | "escape" => Key::Escape,
            "backspace" => Key::Backspace,
            "delete" | "del" => Key::Delete,
            "space" => Key::Space,
            "up" | "arrowup" => Key::Up,
            "down" | "arrowdown" => Key::Down,
            "left" | "arrowleft" => Key::Left,
            "right" | "arrowright" => Key::Right,
            "home" => Key::Home,
            "end" => Key::End,
            "pageup" | "prior" => Key::PageUp,
            "pagedown" | "next" => Key::PageDown,
            "insert" => Key::Insert,
            other => match other.strip_prefix('f').and_then(|n| n.parse::<u8>().ok()) {
                Some(n) if (1..=24).contains(&n) => Key::F(n),
                _ => return Err(KeyParseError::UnknownKey(s.to_string())),
            },
        };
        Ok(key)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyParseError {
    #[error("empty key combination")]
    Empty,
    #[error("unknown modifier '{0}'")]
    UnknownModifier(String),
    #[error("unknown key '{0}'")]
    UnknownKey(String),
}

/// A main key with zero or more held modifiers, e.g. `ctrl+shift+t`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyCombo {
    pub modifiers: Vec<Modifier>,
    pub key: Key,
}

impl KeyCombo {
    pub fn single(key: Key) -> Self {
        Self {
            modifiers: Vec::new(),
            key,
        }
    }
}

impl FromStr for KeyCombo {
    type Err = KeyParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(KeyParseError::Empty);
        }
        // A literal "+" key, alone or as the last element ("ctrl++").
        let (mods, main) = match s.strip_suffix("++") {
            Some(rest) => (Some(rest), "+"),
            None if s == "+" => (None, "+"),
            None => match s.rsplit_once('+') {
                Some((rest, main)) => (Some(rest), main),
                None => (None, s),
            },
        };
        let modifiers = match mods {
            Some(m) => m
                .split('+')
                .map(|p| p.trim().parse())
                .collect::<Result<Vec<Modifier>, _>>()?,
            None => Vec::new(),
        };
        Ok(Self {
            modifiers,
            key: main.trim().parse()?,
        })
    }
}

impl fmt::Display for KeyCombo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for m in &self.modifiers {
            write!(f, "{:?}+", m)?;
        }
        write!(f, "{:?}", self.key)
    }
}

/// One step of a key action: a recognized combo, or a raw name passed to the
/// surface as-is when the combo could not be understood.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyInput {
    Combo(KeyCombo),
    Raw(String),
}

/// Parses a key action argument. Whitespace separates consecutive presses
/// (`"ctrl+a Delete"`). Unrecognized combos degrade to a single raw keypress
/// of their last segment instead of failing.
pub fn parse_key_sequence(input: &str) -> Vec<KeyInput> {
    input
        .split_whitespace()
        .map(|part| match part.parse::<KeyCombo>() {
            Ok(combo) => KeyInput::Combo(combo),
            Err(e) => {
                let fallback = part.rsplit('+').find(|s| !s.is_empty()).unwrap_or(part);
                warn!(
                    "Unrecognized key combo '{}' ({}); falling back to a single press of '{}'",
                    part, e, fallback
                );
                KeyInput::Raw(fallback.to_string())
            }
        })
        .collect()
}

/// Translation from the canonical vocabulary to one backend's key names.
pub trait KeyTable {
    fn key(&self, key: Key) -> String;
    fn modifier(&self, modifier: Modifier) -> &'static str;
}

/// DOM `KeyboardEvent.key` names, as understood by the DevTools protocol.
pub struct DomKeys;

impl KeyTable for DomKeys {
    fn key(&self, key: Key) -> String {
        match key {
            Key::Enter => "Enter".into(),
            Key::Tab => "Tab".into(),
            Key::Escape => "Escape".into(),
            Key::Backspace => "Backspace".into(),
            Key::Delete => "Delete".into(),
            Key::Space => " ".into(),
            Key::Up => "ArrowUp".into(),
            Key::Down => "ArrowDown".into(),
            Key::Left => "ArrowLeft".into(),
            Key::Right => "ArrowRight".into(),
            Key::Home => "Home".into(),
            Key::End => "End".into(),
            Key::PageUp => "PageUp".into(),
            Key::PageDown => "PageDown".into(),
            Key::Insert => "Insert".into(),
            Key::F(n) => format!("F{}", n),
            Key::Char(c) => c.to_string(),
        }
    }

    fn modifier(&self, modifier: Modifier) -> &'static str {
        match modifier {
            Modifier::Ctrl => "Control",
            Modifier::Shift => "Shift",
            Modifier::Alt => "Alt",
            Modifier::Meta => "Meta",
        }
    }
}

/// X11 keysym names used by xdotool.
pub struct XdotoolKeys;

impl KeyTable for XdotoolKeys {
    fn key(&self, key: Key) -> String {
        match key {
            Key::Enter => "Return".into(),
            Key::Tab => "Tab".into(),
            Key::Escape => "Escape".into(),
            Key::Backspace => "BackSpace".into(),
            Key::Delete => "Delete".into(),
            Key::Space => "space".into(),
            Key::Up => "Up".into(),
            Key::Down => "Down".into(),
            Key::Left => "Left".into(),
            Key::Right => "Right".into(),
            Key::Home => "Home".into(),
            Key::End => "End".into(),
            Key::PageUp => "Prior".into(),
            Key::PageDown => "Next".into(),
            Key::Insert => "Insert".into(),
            Key::F(n) => format!("F{}", n),
            Key::Char('+') => "plus".into(),
            Key::Char(c) => c.to_string(),
        }
    }

    fn modifier(&self, modifier: Modifier) -> &'static str {
        match modifier {
            Modifier::Ctrl => "ctrl",
            Modifier::Shift => "shift",
            Modifier::Alt => "alt",
            Modifier::Meta => "super",
        }
    }
}

/// cliclick key names (macOS). Printable characters are typed with `t:` instead.
pub struct CliclickKeys;

impl KeyTable for CliclickKeys {
    fn key(&self, key: Key) -> String {
        match key {
            Key::Enter => "return".into(),
            Key::Tab => "tab".into(),
            Key::Escape => "esc".into(),
            Key::Backspace => "delete".into(),
            Key::Delete => "fwd-delete".into(),
            Key::Space => "space".into(),
            Key::Up => "arrow-up".into(),
            Key::Down => "arrow-down".into(),
            Key::Left => "arrow-left".into(),
            Key::Right => "arrow-right".into(),
            Key::Home => "home".into(),
            Key::End => "end".into(),
            Key::PageUp => "page-up".into(),
            Key::PageDown => "page-down".into(),
            Key::Insert => "help".into(),
            Key::F(n) => format!("f{}", n),
            Key::Char(c) => c.to_string(),
        }
    }

    fn modifier(&self, modifier: Modifier) -> &'static str {
        match modifier {
            Modifier::Ctrl => "ctrl",
            Modifier::Shift => "shift",
            Modifier::Alt => "alt",
            Modifier::Meta => "cmd",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_single_keys_and_aliases() {
        assert_eq!("Return".parse::<Key>().unwrap(), Key::Enter);
        assert_eq!("page_down".parse::<Key>().unwrap(), Key::PageDown);
        assert_eq!("ArrowLeft".parse::<Key>().unwrap(), Key::Left);
        assert_eq!("F5".parse::<Key>().unwrap(), Key::F(5));
        assert_eq!("a".parse::<Key>().unwrap(), Key::Char('a'));
        assert!("F99".parse::<Key>().is_err());
    }

    #[test]
    fn parses_modifier_combos() {
        let combo: KeyCombo = "cmd+shift+t".parse().unwrap();
        assert_eq!(combo.modifiers, vec![Modifier::Meta, Modifier::Shift]);
        assert_eq!(combo.key, Key::Char('t'));

        let plus: KeyCombo = "ctrl++".parse().unwrap();
        assert_eq!(plus.modifiers, vec![Modifier::Ctrl]);
        assert_eq!(plus.key, Key::Char('+'));
    }

    #[test]
    fn unknown_combo_falls_back_to_raw_press() {
        let seq = parse_key_sequence("hyper+Launch1");
        assert_eq!(seq, vec![KeyInput::Raw("Launch1".to_string())]);
    }

    #[test]
    fn whitespace_separates_presses() {
        let seq = parse_key_sequence("ctrl+a Delete");
        assert_eq!(seq.len(), 2);
        assert_eq!(
            seq[1],
            KeyInput::Combo(KeyCombo::single(Key::Delete))
        );
    }

    #[test]
    fn tables_translate_canonical_names() {
        assert_eq!(DomKeys.key(Key::Enter), "Enter");
        assert_eq!(XdotoolKeys.key(Key::Enter), "Return");
        assert_eq!(CliclickKeys.key(Key::Enter), "return");
        assert_eq!(XdotoolKeys.modifier(Modifier::Meta), "super");
        assert_eq!(CliclickKeys.modifier(Modifier::Meta), "cmd");
    }
}
