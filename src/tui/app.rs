//! Debugger application state and logic.

use std::cell::Cell;
use std::path::PathBuf;
use std::rc::Rc;
use std::time::Instant;

use crate::asm::csv;
use crate::asm::disasm::disassemble_range;
use crate::cpu::{Cpu, Pacer, RunHandle, Tick, MEMORY_SIZE};

/// Debugger application state.
pub struct DebuggerApp {
    /// The CPU being debugged.
    pub cpu: Cpu,
    /// Active run session and its pacing.
    run: Option<(RunHandle, Pacer)>,
    /// Should we quit?
    pub should_quit: bool,
    /// Memory cell the editor points at.
    pub selected: usize,
    /// Hex text typed for the selected cell.
    pub edit: String,
    /// Host-side message (file saved, edit rejected), shown under the
    /// CPU status.
    pub notice: Option<String>,
    /// Where `w` saves memory.
    save_path: PathBuf,
    /// Set by the CPU change hook.
    dirty: Rc<Cell<bool>>,
}

impl DebuggerApp {
    /// Create a new debugger around a loaded CPU.
    pub fn new(mut cpu: Cpu, save_path: PathBuf) -> Self {
        let dirty = Rc::new(Cell::new(true));
        let flag = Rc::clone(&dirty);
        cpu.set_on_change(move |_| flag.set(true));

        Self {
            cpu,
            run: None,
            should_quit: false,
            selected: 0,
            edit: String::new(),
            notice: Some("Ready. Press 's' to step, 'r' to run, 'q' to quit.".into()),
            save_path,
            dirty,
        }
    }

    /// Whether the screen needs redrawing; clears the flag.
    pub fn take_dirty(&self) -> bool {
        self.dirty.replace(false)
    }

    fn touch(&self) {
        self.dirty.set(true);
    }

    /// Step one instruction.
    pub fn step(&mut self) {
        self.halt();
        self.notice = None;
        // Outcome is mirrored into the CPU status line.
        let _ = self.cpu.step();
    }

    /// Start continuous execution; the first cycle is due at `now`.
    pub fn run(&mut self, fast: bool, now: Instant) {
        self.notice = None;
        let handle = self.cpu.start_running(fast);
        let period = self.cpu.period().unwrap_or_default();
        self.run = Some((handle, Pacer::new(period, now)));
    }

    /// Stop continuous execution.
    pub fn halt(&mut self) {
        self.run = None;
        self.cpu.halt();
    }

    /// Whether a run session is active.
    pub fn is_running(&self) -> bool {
        self.run.is_some()
    }

    /// Time until the next scheduled cycle, if running.
    pub fn time_until_due(&self, now: Instant) -> Option<std::time::Duration> {
        self.run.as_ref().map(|(_, pacer)| pacer.time_until_due(now))
    }

    /// Run one iteration of continuous execution.
    pub fn tick(&mut self, now: Instant) {
        let Some((handle, pacer)) = self.run.as_mut() else {
            return;
        };
        if !pacer.poll(now) {
            return;
        }
        match self.cpu.run_cycle(handle) {
            Tick::Stepped => {}
            Tick::Stopped | Tick::Cancelled => self.run = None,
        }
    }

    /// Reset CPU registers; memory stays.
    pub fn reset(&mut self) {
        self.run = None;
        self.notice = Some("Reset. Ready.".into());
        self.cpu.reset();
    }

    /// Move the editor selection, clamped to memory.
    pub fn select(&mut self, delta: isize) {
        let target = self.selected as isize + delta;
        self.selected = target.clamp(0, MEMORY_SIZE as isize - 1) as usize;
        self.edit.clear();
        self.touch();
    }

    /// Append a typed character to the edit buffer.
    pub fn type_char(&mut self, c: char) {
        if self.edit.len() < 2 {
            self.edit.push(c.to_ascii_uppercase());
            self.touch();
        }
    }

    pub fn backspace(&mut self) {
        self.edit.pop();
        self.touch();
    }

    pub fn cancel_edit(&mut self) {
        self.edit.clear();
        self.touch();
    }

    /// Write the edit buffer into the selected cell and move to the next
    /// one. The last cell keeps the selection.
    pub fn commit_edit(&mut self) {
        let text = std::mem::take(&mut self.edit);
        if self.cpu.edit_cell(self.selected, &text) {
            self.notice = None;
            if self.selected < MEMORY_SIZE - 1 {
                self.selected += 1;
            }
        } else {
            self.notice = Some(format!("Not a hex byte: {:?}", text));
        }
        self.touch();
    }

    /// Delete the selected cell.
    pub fn shift_up(&mut self) {
        self.cpu.shift_up(self.selected);
    }

    /// Insert a zero cell at the selection.
    pub fn shift_down(&mut self) {
        self.cpu.shift_down(self.selected);
    }

    /// Save memory to the configured path.
    pub fn save(&mut self) {
        self.notice = Some(match csv::save_file(&self.save_path, self.cpu.mem()) {
            Ok(()) => format!("Saved memory to {}", self.save_path.display()),
            Err(e) => format!("Save failed: {}", e),
        });
        self.touch();
    }

    /// Get disassembly starting a little before the current PC.
    pub fn get_disassembly(&self, lines: usize) -> Vec<(usize, String, bool)> {
        let pc = self.cpu.regs().pc_address();
        let start = pc.map_or(0, |pc| pc.saturating_sub(lines / 2));

        disassemble_range(self.cpu.mem(), start, MEMORY_SIZE)
            .into_iter()
            .take(lines)
            .map(|(addr, text, _)| (addr, text, Some(addr) == pc))
            .collect()
    }
}

/// Turns the global logger off until dropped.
///
/// Log lines written while the alternate screen is up would land in the
/// middle of the debugger's frame.
pub struct MutedLogs {
    previous: log::LevelFilter,
}

impl MutedLogs {
    pub fn new() -> Self {
        let previous = log::max_level();
        log::set_max_level(log::LevelFilter::Off);
        Self { previous }
    }
}

impl Default for MutedLogs {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for MutedLogs {
    fn drop(&mut self) {
        log::set_max_level(self.previous);
    }
}

/// Run the debugger on a CPU with a loaded program.
pub fn run_debugger(cpu: Cpu, save_path: PathBuf) -> std::io::Result<()> {
    use crossterm::{
        event::{self, Event, KeyCode, KeyEventKind},
        terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
        ExecutableCommand,
    };
    use ratatui::prelude::*;
    use std::io::stdout;
    use std::time::Duration;

    // Setup terminal
    enable_raw_mode()?;
    stdout().execute(EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;
    let muted = MutedLogs::new();

    let mut app = DebuggerApp::new(cpu, save_path);

    // Main loop
    loop {
        if app.take_dirty() {
            terminal.draw(|frame| {
                super::ui::draw(frame, &app);
            })?;
        }

        // Wait for input, but no longer than the next scheduled cycle
        let timeout = app
            .time_until_due(Instant::now())
            .unwrap_or(Duration::from_millis(50));

        if event::poll(timeout)? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    match key.code {
                        KeyCode::Char('q') => app.should_quit = true,
                        KeyCode::Char('s') => app.step(),
                        KeyCode::Char('r') => app.run(false, Instant::now()),
                        KeyCode::Char('g') => app.run(true, Instant::now()),
                        KeyCode::Char('p') => app.halt(),
                        KeyCode::Char('x') => app.reset(),
                        KeyCode::Char('w') => app.save(),
                        KeyCode::Char('u') => app.shift_up(),
                        KeyCode::Char('n') => app.shift_down(),
                        KeyCode::Char(c) if c.is_ascii_hexdigit() => app.type_char(c),
                        KeyCode::Enter => app.commit_edit(),
                        KeyCode::Backspace => app.backspace(),
                        KeyCode::Esc => app.cancel_edit(),
                        KeyCode::Left => app.select(-1),
                        KeyCode::Right => app.select(1),
                        KeyCode::Up => app.select(-16),
                        KeyCode::Down => app.select(16),
                        _ => {}
                    }
                }
            }
        }

        // Tick for continuous running
        app.tick(Instant::now());

        if app.should_quit {
            break;
        }
    }

    app.halt();
    drop(muted);

    // Restore terminal
    disable_raw_mode()?;
    stdout().execute(LeaveAlternateScreen)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu::{Cadence, RunMode};
    use std::time::Duration;

    fn app_with(program: &[u8]) -> DebuggerApp {
        let mut cpu = Cpu::with_cadence(Cadence {
            slow: Duration::from_millis(100),
            fast: Duration::ZERO,
        });
        cpu.load_program(0, program).unwrap();
        DebuggerApp::new(cpu, PathBuf::from("memory.csv"))
    }

    #[test]
    fn test_edit_advances_and_stops_at_end() {
        let mut app = app_with(&[]);
        app.type_char('a');
        app.type_char('b');
        app.type_char('c');
        assert_eq!(app.edit, "AB");
        app.commit_edit();
        assert_eq!(app.cpu.mem().read(0), 0xAB);
        assert_eq!(app.selected, 1);

        app.select(1000);
        assert_eq!(app.selected, MEMORY_SIZE - 1);
        app.type_char('7');
        app.commit_edit();
        assert_eq!(app.cpu.mem().read(MEMORY_SIZE - 1), 0x07);
        assert_eq!(app.selected, MEMORY_SIZE - 1);
    }

    #[test]
    fn test_empty_edit_zeroes_cell() {
        let mut app = app_with(&[0x15]);
        app.commit_edit();
        assert_eq!(app.cpu.mem().read(0), 0);
    }

    #[test]
    fn test_slow_run_is_paced() {
        // LDI 1; INC; INC; HLT
        let mut app = app_with(&[0x11, 0x07, 0x07, 0x00]);
        let start = Instant::now();
        app.run(false, start);

        app.tick(start + Duration::from_millis(1));
        assert_eq!(app.cpu.regs().acc.get(), 1);

        // Not due yet
        app.tick(start + Duration::from_millis(2));
        assert_eq!(app.cpu.cycles(), 1);

        app.tick(start + Duration::from_secs(1));
        assert_eq!(app.cpu.regs().acc.get(), 2);
    }

    #[test]
    fn test_fast_run_stops_at_halt() {
        let mut app = app_with(&[0x11, 0x07, 0x00]);
        let now = Instant::now();
        app.run(true, now);
        for _ in 0..10 {
            app.tick(now);
        }
        assert!(!app.is_running());
        assert!(app.cpu.is_halted());
        assert_eq!(app.cpu.regs().acc.get(), 2);
    }

    #[test]
    fn test_halt_stops_ticks() {
        let mut app = app_with(&[0x50, 0x00]);
        app.run(true, Instant::now());
        app.halt();
        let cycles = app.cpu.cycles();
        app.tick(Instant::now() + Duration::from_secs(1));
        assert_eq!(app.cpu.cycles(), cycles);
        assert_eq!(app.cpu.run_mode(), RunMode::Stopped);
    }

    #[test]
    fn test_hook_marks_dirty() {
        let mut app = app_with(&[0x01]);
        app.take_dirty();
        assert!(!app.take_dirty());
        app.step();
        assert!(app.take_dirty());
    }

    #[test]
    fn test_muted_logs_restores_level() {
        log::set_max_level(log::LevelFilter::Debug);
        {
            let _muted = MutedLogs::new();
            assert_eq!(log::max_level(), log::LevelFilter::Off);
        }
        assert_eq!(log::max_level(), log::LevelFilter::Debug);
    }

    #[test]
    fn test_disassembly_marks_pc() {
        let mut app = app_with(&[0x11, 0x20, 0x10, 0x00]);
        app.step();
        let lines = app.get_disassembly(4);
        assert_eq!(lines[0], (0, "LDI 1".to_string(), false));
        assert_eq!(lines[1], (1, "LDA 0x10".to_string(), true));
    }
}
