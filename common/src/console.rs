//! Single-character serial console commands.

use core::fmt::{self, Write};

use crate::drivers::st7735::Orientation;
use crate::pattern::{Page, TestPattern};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DisplayCommand {
    Page(Page),
    NextColor,
    Rotate,
}

impl DisplayCommand {
    pub fn parse(byte: u8) -> Option<Self> {
        match byte {
            b'1'..=b'5' => Page::from_index(byte - b'1').map(Self::Page),
            b'c' => Some(Self::NextColor),
            b'r' => Some(Self::Rotate),
            _ => None,
        }
    }
}

/// State behind the display console.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DisplayControl {
    pattern: TestPattern,
    orientation: Orientation,
}

impl Default for DisplayControl {
    fn default() -> Self {
        Self::new()
    }
}

impl DisplayControl {
    pub const fn new() -> Self {
        Self {
            pattern: TestPattern::new(Page::Solid, 0, 0),
            orientation: Orientation::Normal,
        }
    }

    pub fn pattern(&self) -> TestPattern {
        self.pattern
    }

    pub fn orientation(&self) -> Orientation {
        self.orientation
    }

    /// Applies `command`. Every command asks for a redraw; the orientation is
    /// returned when it changed.
    pub fn handle(&mut self, command: DisplayCommand) -> Option<Orientation> {
        match command {
            DisplayCommand::Page(page) => {
                if page == self.pattern.page {
                    self.pattern.style = self.pattern.style.wrapping_add(1);
                } else {
                    self.pattern.page = page;
                    self.pattern.style = 0;
                }
                None
            }
            DisplayCommand::NextColor => {
                self.pattern.color = self.pattern.color.wrapping_add(1);
                None
            }
            DisplayCommand::Rotate => {
                self.orientation = self.orientation.next();
                Some(self.orientation)
            }
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SensorCommand {
    /// Enable or disable one channel (zero based).
    Toggle(usize),
    Automatic,
    Help,
    TimeTriggered,
    Reset,
    Sample,
}

impl SensorCommand {
    /// `toggles` is the number of channels selectable with `1`..`9`; zero
    /// disables the digits.
    pub fn parse(byte: u8, toggles: usize) -> Option<Self> {
        match byte {
            b'1'..=b'9' if usize::from(byte - b'1') < toggles => {
                Some(Self::Toggle(usize::from(byte - b'1')))
            }
            b'a' => Some(Self::Automatic),
            b'h' => Some(Self::Help),
            b'm' => Some(Self::TimeTriggered),
            b'r' => Some(Self::Reset),
            b's' | b' ' => Some(Self::Sample),
            _ => None,
        }
    }
}

/// What the program has to do after a [`SensorCommand`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SensorAction {
    Toggled { channel: usize, enabled: bool },
    /// Start streaming the enabled channels.
    Start,
    /// Stop every channel.
    Stop,
    StartTimer,
    StopTimer,
    Help,
    /// Reset the enabled channels.
    Reset,
    /// Read the enabled channels once.
    Sample,
    Ignored,
}

/// Mode flags of a sensor console with `N` channels.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SensorControl<const N: usize> {
    enabled: [bool; N],
    automatic: bool,
    timed: bool,
}

impl<const N: usize> Default for SensorControl<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> SensorControl<N> {
    /// All channels enabled, both modes off.
    pub const fn new() -> Self {
        Self { enabled: [true; N], automatic: false, timed: false }
    }

    pub fn is_enabled(&self, channel: usize) -> bool {
        self.enabled.get(channel).copied().unwrap_or(false)
    }

    pub fn enabled_channels(&self) -> impl Iterator<Item = usize> + '_ {
        self.enabled.iter().enumerate().filter(|(_, on)| **on).map(|(channel, _)| channel)
    }

    pub fn is_automatic(&self) -> bool {
        self.automatic
    }

    pub fn is_timed(&self) -> bool {
        self.timed
    }

    pub fn handle(&mut self, command: SensorCommand) -> SensorAction {
        match command {
            SensorCommand::Toggle(channel) => match self.enabled.get_mut(channel) {
                Some(enabled) => {
                    *enabled = !*enabled;
                    SensorAction::Toggled { channel, enabled: *enabled }
                }
                None => SensorAction::Ignored,
            },
            SensorCommand::Automatic => {
                self.automatic = !self.automatic;
                if self.automatic {
                    SensorAction::Start
                } else {
                    SensorAction::Stop
                }
            }
            SensorCommand::Help => SensorAction::Help,
            SensorCommand::TimeTriggered => {
                self.timed = !self.timed;
                if self.timed {
                    SensorAction::StartTimer
                } else {
                    SensorAction::StopTimer
                }
            }
            SensorCommand::Reset => SensorAction::Reset,
            SensorCommand::Sample => {
                self.automatic = false;
                SensorAction::Sample
            }
        }
    }
}

/// Writes the shortcut list. `channels` names the toggleable channels in
/// digit order.
pub fn write_help<W: Write>(out: &mut W, channels: &[&str], reset: bool) -> fmt::Result {
    out.write_str("Shortcuts:\r\n")?;
    for (index, name) in channels.iter().enumerate() {
        write!(out, "\t{}: toggle {}\r\n", index + 1, name)?;
    }
    out.write_str("\ta: automatic mode\r\n")?;
    out.write_str("\th: show this help message\r\n")?;
    out.write_str("\tm: time-triggered mode\r\n")?;
    if reset {
        out.write_str("\tr: reset sensor\r\n")?;
    }
    out.write_str("\ts: read sample\r\n")
}

/// Echoes a mode change. Actions that produce their own output (help,
/// samples, resets) write nothing.
/// Starts a reading line with `label: `. Signed values written after it keep
/// their sign column, so positive readings print as `T:  21.500`.
pub fn write_label<W: Write>(out: &mut W, label: impl fmt::Display) -> fmt::Result {
    write!(out, "{}: ", label)
}

pub fn write_status<W: Write>(out: &mut W, action: SensorAction, channels: &[&str]) -> fmt::Result {
    let on_off = |on: bool| if on { "on" } else { "off" };
    match action {
        SensorAction::Toggled { channel, enabled } => {
            let name = channels.get(channel).copied().unwrap_or("channel");
            write!(out, "{}: {}\r\n", name, on_off(enabled))
        }
        SensorAction::Start | SensorAction::Stop => {
            write!(out, "automatic mode: {}\r\n", on_off(action == SensorAction::Start))
        }
        SensorAction::StartTimer | SensorAction::StopTimer => {
            write!(out, "time-triggered mode: {}\r\n", on_off(action == SensorAction::StartTimer))
        }
        SensorAction::Help | SensorAction::Reset | SensorAction::Sample | SensorAction::Ignored => Ok(()),
    }
}
