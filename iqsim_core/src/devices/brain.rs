//! Brain unit: text screen and system timer.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

use iqsim_common::consts::BRAIN_SCREEN_ROWS;

use super::units::Unit;
use crate::notify::Notifier;

#[derive(Debug)]
struct ScreenState {
    row: usize,
    col: usize,
    lines: Vec<String>,
}

impl ScreenState {
    fn blank() -> Self {
        Self {
            row: 1,
            col: 1,
            lines: vec![String::new(); BRAIN_SCREEN_ROWS],
        }
    }
}

/// Handle to the brain's text screen. Rows and columns are 1-based.
#[derive(Debug, Clone)]
pub struct BrainScreen {
    state: Arc<Mutex<ScreenState>>,
    notifier: Arc<Notifier>,
}

impl BrainScreen {
    fn new(notifier: Arc<Notifier>) -> Self {
        Self {
            state: Arc::new(Mutex::new(ScreenState::blank())),
            notifier,
        }
    }

    /// Write `text` to the cursor row, replacing its contents.
    ///
    /// Rows past the bottom of the screen are dropped from the display but
    /// still logged and published.
    pub fn print(&self, text: &str) {
        {
            let mut state = self.state.lock();
            let row = state.row;
            if let Some(line) = row.checked_sub(1).and_then(|i| state.lines.get_mut(i)) {
                *line = text.to_string();
            }
        }
        info!(target: "iqsim::brain", "{text}");
        self.notifier.publish_brain(text);
    }

    /// Blank the screen and home the cursor.
    pub fn clear_screen(&self) {
        *self.state.lock() = ScreenState::blank();
    }

    /// Move the cursor.
    pub fn set_cursor(&self, row: usize, col: usize) {
        let mut state = self.state.lock();
        state.row = row;
        state.col = col;
    }

    /// Move the cursor down one row.
    pub fn next_row(&self) {
        self.state.lock().row += 1;
    }

    /// Current (row, column).
    pub fn cursor(&self) -> (usize, usize) {
        let state = self.state.lock();
        (state.row, state.col)
    }

    /// Contents of a 1-based row.
    pub fn line(&self, row: usize) -> Option<String> {
        let state = self.state.lock();
        row.checked_sub(1).and_then(|i| state.lines.get(i).cloned())
    }
}

/// Handle to the brain's timer.
#[derive(Debug, Clone)]
pub struct BrainTimer {
    start: Arc<Mutex<Instant>>,
}

impl BrainTimer {
    fn new() -> Self {
        Self {
            start: Arc::new(Mutex::new(Instant::now())),
        }
    }

    /// Milliseconds since creation or the last `clear`.
    pub fn system(&self) -> f64 {
        self.start.lock().elapsed().as_secs_f64() * 1000.0
    }

    /// Elapsed time in seconds or milliseconds.
    pub fn time(&self, unit: Unit) -> f64 {
        match unit {
            Unit::Seconds => self.system() / 1000.0,
            _ => self.system(),
        }
    }

    /// Restart the timer.
    pub fn clear(&self) {
        *self.start.lock() = Instant::now();
    }
}

/// Handle to the brain singleton.
#[derive(Debug, Clone)]
pub struct Brain {
    screen: BrainScreen,
    timer: BrainTimer,
}

impl Brain {
    /// Blank screen, fresh timer.
    pub fn new(notifier: Arc<Notifier>) -> Self {
        Self {
            screen: BrainScreen::new(notifier),
            timer: BrainTimer::new(),
        }
    }

    /// Screen handle.
    pub fn screen(&self) -> BrainScreen {
        self.screen.clone()
    }

    /// Timer handle.
    pub fn timer(&self) -> BrainTimer {
        self.timer.clone()
    }

    /// `true` if both handles point at the same brain.
    pub fn same_as(&self, other: &Brain) -> bool {
        Arc::ptr_eq(&self.screen.state, &other.screen.state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_print_writes_cursor_row() {
        let brain = Brain::new(Arc::new(Notifier::new()));
        let screen = brain.screen();
        screen.print("hello");
        screen.next_row();
        screen.print("world");
        assert_eq!(screen.line(1).as_deref(), Some("hello"));
        assert_eq!(screen.line(2).as_deref(), Some("world"));
        assert_eq!(screen.cursor(), (2, 1));
    }

    #[test]
    fn test_print_past_bottom_is_dropped() {
        let screen = Brain::new(Arc::new(Notifier::new())).screen();
        screen.set_cursor(BRAIN_SCREEN_ROWS + 1, 1);
        screen.print("lost");
        assert!((1..=BRAIN_SCREEN_ROWS).all(|r| screen.line(r).as_deref() == Some("")));
        assert_eq!(screen.line(0), None);
    }

    #[test]
    fn test_clear_screen_homes_cursor() {
        let screen = Brain::new(Arc::new(Notifier::new())).screen();
        screen.set_cursor(4, 7);
        screen.print("x");
        screen.clear_screen();
        assert_eq!(screen.cursor(), (1, 1));
        assert_eq!(screen.line(4).as_deref(), Some(""));
    }

    #[test]
    fn test_print_notifies_brain_subscribers() {
        let notifier = Arc::new(Notifier::new());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        notifier.subscribe_brain(Arc::new(move |t: &str| sink.lock().push(t.to_string())));

        Brain::new(notifier).screen().print("score 3");
        assert_eq!(*seen.lock(), vec!["score 3".to_string()]);
    }

    #[test]
    fn test_timer_clear() {
        let timer = Brain::new(Arc::new(Notifier::new())).timer();
        thread::sleep(Duration::from_millis(20));
        assert!(timer.system() >= 20.0);
        timer.clear();
        assert!(timer.time(Unit::Seconds) < 0.02);
    }
}
