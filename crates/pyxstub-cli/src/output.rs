//! Colored terminal output for the CLI.
//!
//! Uses `termcolor`; respects `NO_COLOR` and the `--color` flag.

use std::io::Write;
use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};

/// Resolve `ColorChoice` from the CLI flag and environment.
///
/// Priority: `NO_COLOR` env > `--color` flag > auto-detect TTY.
pub fn resolve_color_choice(flag: Option<&str>) -> ColorChoice {
    if std::env::var_os("NO_COLOR").is_some() {
        return ColorChoice::Never;
    }
    match flag {
        Some("always") => ColorChoice::Always,
        Some("never") => ColorChoice::Never,
        _ => ColorChoice::Auto,
    }
}

pub struct StyledOutput {
    stdout: StandardStream,
    stderr: StandardStream,
}

impl StyledOutput {
    pub fn new(choice: ColorChoice) -> Self {
        Self {
            stdout: StandardStream::stdout(choice),
            stderr: StandardStream::stderr(choice),
        }
    }

    /// Stream diagnostics are rendered to.
    pub fn diagnostics(&mut self) -> &mut StandardStream {
        &mut self.stderr
    }

    fn write_styled(&mut self, text: &str, color: Option<Color>, bold: bool) {
        let mut spec = ColorSpec::new();
        spec.set_fg(color).set_bold(bold);
        let _ = self.stdout.set_color(&spec);
        let _ = write!(self.stdout, "{}", text);
        let _ = self.stdout.reset();
    }

    /// Green bold text.
    pub fn success(&mut self, text: &str) {
        self.write_styled(text, Some(Color::Green), true);
    }

    /// Red bold text.
    pub fn error(&mut self, text: &str) {
        self.write_styled(text, Some(Color::Red), true);
    }

    /// Yellow bold text.
    pub fn warning(&mut self, text: &str) {
        self.write_styled(text, Some(Color::Yellow), true);
    }

    pub fn dim(&mut self, text: &str) {
        self.write_styled(text, Some(Color::White), false);
    }

    pub fn plain(&mut self, text: &str) {
        let _ = write!(self.stdout, "{}", text);
    }

    pub fn newline(&mut self) {
        let _ = writeln!(self.stdout);
    }

    pub fn flush(&mut self) {
        let _ = self.stdout.flush();
        let _ = self.stderr.flush();
    }

    fn badge(&mut self, text: &str, background: Color) {
        let mut spec = ColorSpec::new();
        spec.set_bg(Some(background))
            .set_fg(Some(Color::White))
            .set_bold(true);
        let _ = self.stdout.set_color(&spec);
        let _ = write!(self.stdout, "{}", text);
        let _ = self.stdout.reset();
    }

    /// "  OK  " badge (green background).
    pub fn ok_badge(&mut self) {
        self.badge("  OK  ", Color::Green);
    }

    /// " FAIL " badge (red background).
    pub fn fail_badge(&mut self) {
        self.badge(" FAIL ", Color::Red);
    }
}
