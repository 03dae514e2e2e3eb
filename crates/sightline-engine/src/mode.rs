//! **ModeController**: the assistant's finite state machine.
//!
//! `handle` is a pure transition function: it updates the current [`Mode`] and returns
//! the reconfiguration the coordinator must carry out, as an ordered list of
//! [`Action`]s. Nothing here touches speech, pipelines or timers directly, so every
//! `(mode, event)` pair can be checked in isolation.

use crate::config::{HapticsConfig, ListenConfig};
use crate::model::{Language, Mode, PipelineId};
use crate::phrases::Phrase;
use tracing::info;

/// A parsed voice command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Navigate,
    Read,
    Identify,
    Home,
    Emergency,
    Stop,
    Language(Language),
    Unrecognized(String),
}

impl Command {
    /// Match a transcript against the command vocabulary.
    ///
    /// Matching is by whole word, case-insensitive, and the first command in
    /// vocabulary order wins when a transcript names several.
    pub fn parse(transcript: &str) -> Command {
        let lowered = transcript.to_lowercase();
        let words: Vec<&str> = lowered
            .split(|c: char| c.is_whitespace() || (c.is_ascii_punctuation() && c != '\''))
            .filter(|w| !w.is_empty())
            .collect();
        let has = |candidates: &[&str]| words.iter().any(|w| candidates.contains(w));

        if has(&["navigate"]) {
            Command::Navigate
        } else if has(&["read"]) {
            Command::Read
        } else if has(&["identify"]) {
            Command::Identify
        } else if has(&["home"]) {
            Command::Home
        } else if has(&["sos", "emergency", "help"]) {
            Command::Emergency
        } else if has(&["stop"]) {
            Command::Stop
        } else if let Some(language) = words.iter().find_map(|w| Language::from_spoken_name(w)) {
            Command::Language(language)
        } else {
            Command::Unrecognized(transcript.trim().to_string())
        }
    }
}

/// What caused an Emergency entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerSource {
    Voice,
    Shake,
    Button,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModeEvent {
    /// End of host initialization. Only the first one has any effect.
    Startup,
    Voice(Command),
    EmergencyTrigger(TriggerSource),
    /// Explicit stop of the alarm (voice "stop" or the SOS button while active).
    StopEmergency,
}

/// One reconfiguration step, executed by the coordinator in order.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    StopAllSpeech,
    UnbindPipeline,
    BindPipeline(PipelineId),
    StartAlarm,
    StopAlarm,
    /// Speak with `Flush` priority in the active language.
    Announce(Phrase),
    SetLanguage(Language),
    RefreshModeDisplay,
    Haptic { millis: u64 },
    ScheduleListen { delay_ms: u64 },
    RequestTerminate { delay_ms: u64 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub from: Mode,
    pub to: Mode,
    pub actions: Vec<Action>,
}

impl Transition {
    pub fn is_noop(&self) -> bool {
        self.from == self.to && self.actions.is_empty()
    }
}

pub struct ModeController {
    mode: Mode,
    emergency_source: Option<TriggerSource>,
    started: bool,
    listen: ListenConfig,
    haptics: HapticsConfig,
}

impl ModeController {
    pub fn new(listen: ListenConfig, haptics: HapticsConfig) -> Self {
        Self {
            mode: Mode::Home,
            emergency_source: None,
            started: false,
            listen,
            haptics,
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn handle(&mut self, event: ModeEvent) -> Transition {
        let from = self.mode;
        let actions = match event {
            ModeEvent::Startup => self.startup(),
            ModeEvent::EmergencyTrigger(source) => self.enter_emergency(source),
            ModeEvent::StopEmergency => self.exit_emergency(),
            ModeEvent::Voice(command) if from == Mode::Emergency => match command {
                Command::Stop => self.exit_emergency(),
                Command::Emergency => self.enter_emergency(TriggerSource::Voice),
                other => {
                    info!(command = ?other, "command ignored during emergency");
                    Vec::new()
                }
            },
            ModeEvent::Voice(command) => {
                let mut actions = vec![Action::Haptic {
                    millis: self.haptics.command_pulse_ms,
                }];
                actions.extend(self.command(command));
                actions
            }
        };

        let transition = Transition {
            from,
            to: self.mode,
            actions,
        };
        if transition.from != transition.to {
            info!(from = %transition.from, to = %transition.to, "mode transition");
        }
        transition
    }

    fn startup(&mut self) -> Vec<Action> {
        if self.started {
            return Vec::new();
        }
        self.started = true;
        vec![
            Action::RefreshModeDisplay,
            Action::Announce(Phrase::Welcome),
            Action::ScheduleListen {
                delay_ms: self.listen.after_welcome_ms,
            },
        ]
    }

    fn command(&mut self, command: Command) -> Vec<Action> {
        let listen_again = Action::ScheduleListen {
            delay_ms: self.listen.after_command_ms,
        };
        match command {
            Command::Navigate => self.enter_recognition(Mode::Navigation),
            Command::Read => self.enter_recognition(Mode::TextRecognition),
            Command::Identify => self.enter_recognition(Mode::ObjectDetection),
            Command::Home => {
                self.mode = Mode::Home;
                vec![
                    Action::StopAllSpeech,
                    Action::UnbindPipeline,
                    Action::Announce(Phrase::ReturnedHome),
                    Action::RefreshModeDisplay,
                    listen_again,
                ]
            }
            Command::Emergency => self.enter_emergency(TriggerSource::Voice),
            Command::Stop => vec![
                Action::Announce(Phrase::StoppingApplication),
                Action::RequestTerminate {
                    delay_ms: self.listen.terminate_grace_ms,
                },
            ],
            Command::Language(language) => vec![
                Action::SetLanguage(language),
                Action::Announce(Phrase::LanguageChanged),
                Action::RefreshModeDisplay,
                listen_again,
            ],
            Command::Unrecognized(_) => vec![Action::Announce(Phrase::DidNotUnderstand), listen_again],
        }
    }

    fn enter_recognition(&mut self, mode: Mode) -> Vec<Action> {
        self.mode = mode;
        let mut actions = vec![Action::StopAllSpeech, Action::UnbindPipeline];
        if let Some(pipeline) = mode.pipeline() {
            actions.push(Action::BindPipeline(pipeline));
        }
        actions.extend([
            Action::Announce(Phrase::ModeStarted(mode)),
            Action::RefreshModeDisplay,
            Action::ScheduleListen {
                delay_ms: self.listen.after_command_ms,
            },
        ]);
        actions
    }

    fn enter_emergency(&mut self, source: TriggerSource) -> Vec<Action> {
        if self.mode == Mode::Emergency {
            if self.emergency_source == Some(source) {
                return Vec::new();
            }
            self.emergency_source = Some(source);
            return vec![Action::Announce(Phrase::EmergencyActivated)];
        }

        self.mode = Mode::Emergency;
        self.emergency_source = Some(source);
        vec![
            Action::StopAllSpeech,
            Action::UnbindPipeline,
            Action::StartAlarm,
            Action::Announce(Phrase::EmergencyActivated),
            Action::RefreshModeDisplay,
        ]
    }

    fn exit_emergency(&mut self) -> Vec<Action> {
        if self.mode != Mode::Emergency {
            return Vec::new();
        }
        self.mode = Mode::Home;
        self.emergency_source = None;
        vec![
            Action::StopAlarm,
            Action::Announce(Phrase::EmergencyDeactivated),
            Action::RefreshModeDisplay,
            Action::ScheduleListen {
                delay_ms: self.listen.after_emergency_ms,
            },
        ]
    }
}
