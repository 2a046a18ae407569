//! Keyboard state machine for the selection screen.
//!
//! Two modes: Typing, where printable keys belong to the query, and
//! Navigating, entered with the arrow keys, where Space toggles the
//! highlighted track and is swallowed instead of landing in the query.
//! Enter toggles the highlighted track from either mode as long as a
//! query is showing results.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavigatorMode {
    Typing,
    Navigating,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyInput {
    ArrowUp,
    ArrowDown,
    Char(char),
    Escape,
    Enter,
}

/// What the caller should do with the key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavAction {
    None,
    /// Append the character to the query text.
    AppendChar(char),
    /// Toggle selection of the result at this index.
    Toggle(usize),
}

pub struct SearchNavigator {
    mode: NavigatorMode,
    highlight: usize,
}

impl Default for SearchNavigator {
    fn default() -> Self {
        Self::new()
    }
}

impl SearchNavigator {
    pub fn new() -> Self {
        Self {
            mode: NavigatorMode::Typing,
            highlight: 0,
        }
    }

    pub fn mode(&self) -> NavigatorMode {
        self.mode
    }

    pub fn highlight(&self) -> usize {
        self.highlight
    }

    fn clamp(&mut self, result_count: usize) {
        if result_count == 0 {
            self.highlight = 0;
        } else if self.highlight >= result_count {
            self.highlight = result_count - 1;
        }
    }

    /// Process one key against the current result list.
    pub fn handle(&mut self, key: KeyInput, result_count: usize, query_empty: bool) -> NavAction {
        self.clamp(result_count);
        match key {
            KeyInput::ArrowDown => {
                self.mode = NavigatorMode::Navigating;
                if result_count > 0 && self.highlight + 1 < result_count {
                    self.highlight += 1;
                }
                NavAction::None
            }
            KeyInput::ArrowUp => {
                self.mode = NavigatorMode::Navigating;
                self.highlight = self.highlight.saturating_sub(1);
                NavAction::None
            }
            KeyInput::Char(' ') if self.mode == NavigatorMode::Navigating => {
                if result_count > 0 {
                    NavAction::Toggle(self.highlight)
                } else {
                    NavAction::None
                }
            }
            KeyInput::Char(c) => {
                self.mode = NavigatorMode::Typing;
                self.highlight = 0;
                NavAction::AppendChar(c)
            }
            KeyInput::Escape => {
                self.mode = NavigatorMode::Typing;
                self.highlight = 0;
                NavAction::None
            }
            KeyInput::Enter => {
                if !query_empty && result_count > 0 {
                    NavAction::Toggle(self.highlight)
                } else {
                    NavAction::None
                }
            }
        }
    }
}
