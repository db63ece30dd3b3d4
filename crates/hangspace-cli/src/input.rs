//! Line-oriented input.
//!
//! The CLI reads whole lines from stdin and replays them as the key presses
//! the App understands. A line starting with `?` searches users; anything
//! else goes to the composer (messages and `/commands`).

use hangspace_app::KeyInput;

/// Prefix that routes a line to the search box.
pub const SEARCH_PREFIX: char = '?';

/// Key presses for one input line.
///
/// `search_len` is the length of the search box contents, which a search
/// line replaces.
pub fn line_to_keys(line: &str, search_len: usize) -> Vec<KeyInput> {
    let line = line.trim_end_matches(['\r', '\n']);
    if line.trim().is_empty() {
        return Vec::new();
    }

    match line.strip_prefix(SEARCH_PREFIX) {
        Some(query) => {
            let mut keys = vec![KeyInput::Tab];
            keys.extend(std::iter::repeat_n(KeyInput::Backspace, search_len));
            keys.extend(query.trim().chars().map(KeyInput::Char));
            keys.push(KeyInput::Enter);
            keys.push(KeyInput::Tab);
            keys
        },
        None => {
            let mut keys: Vec<KeyInput> = line.chars().map(KeyInput::Char).collect();
            keys.push(KeyInput::Enter);
            keys
        },
    }
}
