//! Player lifecycle state machine.
//!
//! One tagged state per mounted player and a single transition function.
//! The machine is pure: it never sleeps or talks to a decoder, it returns the
//! commands the caller must carry out. Timing inputs arrive already
//! debounced.

use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerState {
    Idle,
    Loading { attempt: u32 },
    /// Source resolved and accepted by the decode backend
    Ready,
    Playing,
    Paused,
    Buffering { resume_scheduled: bool },
    Error { attempts: u32, retry_scheduled: bool },
}

impl PlayerState {
    pub fn is_playing(&self) -> bool {
        matches!(self, PlayerState::Playing)
    }

    /// Terminal error: retries exhausted, waiting for an explicit retry.
    pub fn is_failed(&self) -> bool {
        matches!(
            self,
            PlayerState::Error {
                retry_scheduled: false,
                ..
            }
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayerInput {
    /// Player mounted for an entry
    Mount,
    /// The mounted entry changed identity
    EntryChanged,
    /// Local file resolved and the backend reports it playable
    SourceReady,
    LoadFailed { reason: String, retryable: bool },
    RetryElapsed,
    /// Debounced visibility
    Visibility(bool),
    /// Single tap, after the double-tap window elapsed
    Toggle,
    BufferingStarted,
    BufferingCleared,
    ResumeElapsed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayerCommand {
    Resolve,
    Play,
    Pause,
    ScheduleRetry(Duration),
    ScheduleResume(Duration),
    CancelResume,
    Fail { attempts: u32, reason: String },
}

/// Timing and retry limits of the lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaybackPolicy {
    pub max_retries: u32,
    pub retry_backoff: Duration,
    /// Quiet period after buffering clears before resuming
    pub stable_buffer_delay: Duration,
    /// Minimum time between a play attempt and a resume after buffering
    pub min_buffer_duration: Duration,
}

impl Default for PlaybackPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_backoff: Duration::from_millis(1000),
            stable_buffer_delay: Duration::from_millis(500),
            min_buffer_duration: Duration::from_millis(2000),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PlayerMachine {
    state: PlayerState,
    user_paused: bool,
    visible: bool,
    retries: u32,
    last_play_attempt: Option<Instant>,
    policy: PlaybackPolicy,
}

impl PlayerMachine {
    pub fn new(policy: PlaybackPolicy) -> Self {
        Self {
            state: PlayerState::Idle,
            user_paused: false,
            visible: false,
            retries: 0,
            last_play_attempt: None,
            policy,
        }
    }

    pub fn state(&self) -> PlayerState {
        self.state
    }

    pub fn user_paused(&self) -> bool {
        self.user_paused
    }

    pub fn visible(&self) -> bool {
        self.visible
    }

    pub fn retries(&self) -> u32 {
        self.retries
    }

    /// Restores a user pause remembered from an earlier mount.
    pub fn restore_user_paused(&mut self, user_paused: bool) {
        self.user_paused = user_paused;
    }

    pub fn apply(&mut self, input: PlayerInput, now: Instant) -> Vec<PlayerCommand> {
        let mut cmds = Vec::new();

        match input {
            PlayerInput::Mount => self.begin_load(&mut cmds),
            PlayerInput::EntryChanged => {
                self.user_paused = false;
                self.begin_load(&mut cmds);
            }
            PlayerInput::SourceReady => {
                if let PlayerState::Loading { .. } = self.state {
                    self.state = PlayerState::Ready;
                    self.try_autoplay(now, &mut cmds);
                }
            }
            PlayerInput::LoadFailed { reason, retryable } => {
                if let PlayerState::Loading { attempt } = self.state {
                    if retryable && self.retries < self.policy.max_retries {
                        self.retries += 1;
                        self.state = PlayerState::Error {
                            attempts: attempt,
                            retry_scheduled: true,
                        };
                        cmds.push(PlayerCommand::ScheduleRetry(self.policy.retry_backoff));
                    } else {
                        self.state = PlayerState::Error {
                            attempts: attempt,
                            retry_scheduled: false,
                        };
                        cmds.push(PlayerCommand::Fail {
                            attempts: attempt,
                            reason,
                        });
                    }
                }
            }
            PlayerInput::RetryElapsed => {
                if let PlayerState::Error {
                    attempts,
                    retry_scheduled: true,
                } = self.state
                {
                    self.state = PlayerState::Loading {
                        attempt: attempts + 1,
                    };
                    cmds.push(PlayerCommand::Resolve);
                }
            }
            PlayerInput::Visibility(visible) => {
                self.visible = visible;
                if visible {
                    if matches!(self.state, PlayerState::Ready | PlayerState::Paused) {
                        self.try_autoplay(now, &mut cmds);
                    }
                } else {
                    match self.state {
                        PlayerState::Playing => {
                            self.state = PlayerState::Paused;
                            cmds.push(PlayerCommand::Pause);
                        }
                        PlayerState::Buffering { resume_scheduled } => {
                            // The decoder is already paused while buffering.
                            self.state = PlayerState::Paused;
                            if resume_scheduled {
                                cmds.push(PlayerCommand::CancelResume);
                            }
                        }
                        _ => {}
                    }
                }
            }
            PlayerInput::Toggle => self.toggle(now, &mut cmds),
            PlayerInput::BufferingStarted => match self.state {
                PlayerState::Playing => {
                    self.state = PlayerState::Buffering {
                        resume_scheduled: false,
                    };
                    cmds.push(PlayerCommand::Pause);
                }
                PlayerState::Buffering {
                    resume_scheduled: true,
                } => {
                    self.state = PlayerState::Buffering {
                        resume_scheduled: false,
                    };
                    cmds.push(PlayerCommand::CancelResume);
                }
                _ => {}
            },
            PlayerInput::BufferingCleared => {
                if let PlayerState::Buffering {
                    resume_scheduled: false,
                } = self.state
                {
                    self.state = PlayerState::Buffering {
                        resume_scheduled: true,
                    };
                    cmds.push(PlayerCommand::ScheduleResume(self.resume_delay(now)));
                }
            }
            PlayerInput::ResumeElapsed => {
                if let PlayerState::Buffering {
                    resume_scheduled: true,
                } = self.state
                {
                    self.state = PlayerState::Paused;
                    self.try_autoplay(now, &mut cmds);
                }
            }
        }

        cmds
    }

    fn begin_load(&mut self, cmds: &mut Vec<PlayerCommand>) {
        match self.state {
            PlayerState::Playing => cmds.push(PlayerCommand::Pause),
            PlayerState::Buffering {
                resume_scheduled: true,
            } => cmds.push(PlayerCommand::CancelResume),
            _ => {}
        }
        self.retries = 0;
        self.last_play_attempt = None;
        self.state = PlayerState::Loading { attempt: 1 };
        cmds.push(PlayerCommand::Resolve);
    }

    /// The only way into `Playing`.
    fn try_autoplay(&mut self, now: Instant, cmds: &mut Vec<PlayerCommand>) {
        if self.visible && !self.user_paused {
            self.state = PlayerState::Playing;
            self.last_play_attempt = Some(now);
            cmds.push(PlayerCommand::Play);
        }
    }

    fn toggle(&mut self, now: Instant, cmds: &mut Vec<PlayerCommand>) {
        match self.state {
            PlayerState::Playing => {
                self.user_paused = true;
                self.state = PlayerState::Paused;
                cmds.push(PlayerCommand::Pause);
            }
            PlayerState::Buffering { resume_scheduled } => {
                self.user_paused = true;
                self.state = PlayerState::Paused;
                if resume_scheduled {
                    cmds.push(PlayerCommand::CancelResume);
                }
            }
            PlayerState::Ready | PlayerState::Paused => {
                if self.user_paused {
                    self.user_paused = false;
                    self.try_autoplay(now, cmds);
                } else {
                    self.user_paused = true;
                }
            }
            PlayerState::Error {
                retry_scheduled: false,
                ..
            } => self.begin_load(cmds),
            PlayerState::Idle | PlayerState::Loading { .. } | PlayerState::Error { .. } => {
                self.user_paused = !self.user_paused;
            }
        }
    }

    fn resume_delay(&self, now: Instant) -> Duration {
        let gate = match self.last_play_attempt {
            Some(at) => self
                .policy
                .min_buffer_duration
                .saturating_sub(now.saturating_duration_since(at)),
            None => Duration::ZERO,
        };
        gate.max(self.policy.stable_buffer_delay)
    }
}
