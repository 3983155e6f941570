//! Key bindings: normal and vim-style.

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

use crate::game::Action;

/// What a key press asks the app to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Game(Action),
    Pause,
    Restart,
    Quit,
    None,
}

impl Command {
    /// Held keys repeat for these.
    pub fn repeats(self) -> bool {
        matches!(
            self,
            Self::Game(Action::MoveLeft | Action::MoveRight | Action::SoftDrop)
        )
    }
}

/// Map key event to a command. Supports both normal (arrows) and vim (hjkl) keys.
pub fn key_to_command(key: KeyEvent) -> Command {
    let KeyEvent { code, modifiers, .. } = key;
    if modifiers == KeyModifiers::CONTROL && code == KeyCode::Char('c') {
        return Command::Quit;
    }
    if !(modifiers.is_empty() || modifiers == KeyModifiers::SHIFT) {
        return Command::None;
    }
    match code {
        KeyCode::Char('q') | KeyCode::Esc => Command::Quit,
        KeyCode::Char('p') | KeyCode::Char(' ') => Command::Pause,
        KeyCode::Char('r') | KeyCode::Char('R') => Command::Restart,
        KeyCode::Left | KeyCode::Char('h') => Command::Game(Action::MoveLeft),
        KeyCode::Right | KeyCode::Char('l') => Command::Game(Action::MoveRight),
        KeyCode::Up | KeyCode::Char('k') | KeyCode::Char('i') => Command::Game(Action::Rotate),
        KeyCode::Down | KeyCode::Char('j') => Command::Game(Action::SoftDrop),
        _ => Command::None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn press(code: KeyCode) -> Command {
        key_to_command(KeyEvent::new(code, KeyModifiers::NONE))
    }

    #[test]
    fn arrows_and_vim_keys_agree() {
        assert_eq!(press(KeyCode::Left), press(KeyCode::Char('h')));
        assert_eq!(press(KeyCode::Right), press(KeyCode::Char('l')));
        assert_eq!(press(KeyCode::Up), Command::Game(Action::Rotate));
        assert_eq!(press(KeyCode::Char('j')), Command::Game(Action::SoftDrop));
    }

    #[test]
    fn control_keys_are_ignored_except_ctrl_c() {
        let ctrl = |c| key_to_command(KeyEvent::new(KeyCode::Char(c), KeyModifiers::CONTROL));
        assert_eq!(ctrl('h'), Command::None);
        assert_eq!(ctrl('c'), Command::Quit);
    }

    #[test]
    fn only_movement_repeats() {
        assert!(press(KeyCode::Left).repeats());
        assert!(!press(KeyCode::Up).repeats());
        assert!(!press(KeyCode::Char('p')).repeats());
    }
}
