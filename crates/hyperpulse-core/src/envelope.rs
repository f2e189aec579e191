//! ADSR Envelope Generator
//!
//! Smooths discrete triggers into a continuous value. Every transition is a
//! function of the caller-supplied `now` (seconds); there is no internal clock.

use crate::clamp01;
use serde::{Deserialize, Serialize};

/// Envelope phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvelopePhase {
    /// Not running, value is 0
    Idle,
    /// Rising from the start value to the target
    Attack,
    /// Falling from the target to target * sustain
    Decay,
    /// Holding at target * sustain
    Sustain,
    /// Falling to 0
    Release,
}

/// ADSR timing and mapper trigger levels
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvelopeConfig {
    /// Attack time in milliseconds
    pub attack_ms: f64,
    /// Decay time in milliseconds
    pub decay_ms: f64,
    /// Sustain level relative to the target (0.0 - 1.0)
    pub sustain_level: f32,
    /// Release time in milliseconds
    pub release_ms: f64,
    /// Input level whose rising crossing triggers the envelope
    pub trigger_threshold: f32,
    /// Input level below which the envelope is released
    pub release_threshold: f32,
}

impl Default for EnvelopeConfig {
    fn default() -> Self {
        Self {
            attack_ms: 20.0,
            decay_ms: 120.0,
            sustain_level: 0.7,
            release_ms: 300.0,
            trigger_threshold: 0.5,
            release_threshold: 0.3,
        }
    }
}

impl EnvelopeConfig {
    /// Percussive preset: instant attack, quick fall-off
    pub fn percussive() -> Self {
        Self {
            attack_ms: 0.0,
            decay_ms: 80.0,
            sustain_level: 0.4,
            release_ms: 200.0,
            ..Default::default()
        }
    }
}

fn ms_to_secs(ms: f64) -> f64 {
    if ms.is_finite() {
        ms.max(0.0) / 1000.0
    } else {
        0.0
    }
}

fn lerp(from: f32, to: f32, t: f64) -> f32 {
    from + (to - from) * t.clamp(0.0, 1.0) as f32
}

/// ADSR state machine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvelopeGenerator {
    config: EnvelopeConfig,
    phase: EnvelopePhase,
    /// Value after the last update
    current: f32,
    /// Peak the envelope rises to
    target: f32,
    /// Time the current phase began
    phase_start: f64,
    /// Value the current phase interpolates from
    start_value: f32,
}

impl EnvelopeGenerator {
    /// Create an idle envelope
    pub fn new(config: EnvelopeConfig) -> Self {
        Self {
            config,
            phase: EnvelopePhase::Idle,
            current: 0.0,
            target: 0.0,
            phase_start: 0.0,
            start_value: 0.0,
        }
    }

    /// Get the configuration
    pub fn config(&self) -> &EnvelopeConfig {
        &self.config
    }

    /// Current phase
    pub fn phase(&self) -> EnvelopePhase {
        self.phase
    }

    /// Value after the last update
    pub fn value(&self) -> f32 {
        self.current
    }

    /// Current target
    pub fn target(&self) -> f32 {
        self.target
    }

    /// Whether the envelope is doing anything
    pub fn is_active(&self) -> bool {
        self.phase != EnvelopePhase::Idle
    }

    fn sustain_value(&self) -> f32 {
        self.target * clamp01(self.config.sustain_level)
    }

    fn enter(&mut self, phase: EnvelopePhase, at: f64, from: f32) {
        self.phase = phase;
        self.phase_start = at;
        self.start_value = from;
    }

    /// Start (or restart) the envelope toward `target`
    pub fn trigger(&mut self, target: f32, now: f64) {
        self.target = clamp01(target);

        if ms_to_secs(self.config.attack_ms) > 0.0 {
            self.enter(EnvelopePhase::Attack, now, self.current);
        } else if ms_to_secs(self.config.decay_ms) > 0.0 {
            self.current = self.target;
            self.enter(EnvelopePhase::Decay, now, self.target);
        } else {
            self.current = self.sustain_value();
            self.enter(EnvelopePhase::Sustain, now, self.current);
        }
    }

    /// Advance to `now` and return the value in [0, 1]
    ///
    /// When `now` has moved past several phase boundaries since the last
    /// call, each completed phase is carried over at its exact end time.
    pub fn update(&mut self, now: f64) -> f32 {
        loop {
            let elapsed = (now - self.phase_start).max(0.0);
            match self.phase {
                EnvelopePhase::Idle => {
                    self.current = 0.0;
                    break;
                }
                EnvelopePhase::Attack => {
                    let duration = ms_to_secs(self.config.attack_ms);
                    if duration > 0.0 && elapsed < duration {
                        self.current = lerp(self.start_value, self.target, elapsed / duration);
                        break;
                    }
                    self.current = self.target;
                    let end = self.phase_start + duration;
                    self.enter(EnvelopePhase::Decay, end, self.target);
                }
                EnvelopePhase::Decay => {
                    let duration = ms_to_secs(self.config.decay_ms);
                    let sustain = self.sustain_value();
                    if duration > 0.0 && elapsed < duration {
                        self.current = lerp(self.target, sustain, elapsed / duration);
                        break;
                    }
                    self.current = sustain;
                    let end = self.phase_start + duration;
                    self.enter(EnvelopePhase::Sustain, end, sustain);
                }
                EnvelopePhase::Sustain => {
                    self.current = self.sustain_value();
                    break;
                }
                EnvelopePhase::Release => {
                    let duration = ms_to_secs(self.config.release_ms);
                    if duration > 0.0 && elapsed < duration {
                        self.current = lerp(self.start_value, 0.0, elapsed / duration);
                        break;
                    }
                    self.current = 0.0;
                    let end = self.phase_start + duration;
                    self.enter(EnvelopePhase::Idle, end, 0.0);
                }
            }
        }
        self.current = clamp01(self.current);
        self.current
    }

    /// Move into release from any non-idle phase
    pub fn release_phase(&mut self, now: f64) {
        if self.phase == EnvelopePhase::Idle {
            return;
        }
        // Settle the value the release starts from
        let from = self.update(now);
        if self.phase == EnvelopePhase::Idle {
            return;
        }

        if ms_to_secs(self.config.release_ms) > 0.0 {
            self.enter(EnvelopePhase::Release, now, from);
        } else {
            self.current = 0.0;
            self.enter(EnvelopePhase::Idle, now, 0.0);
        }
    }

    /// Return to idle immediately
    pub fn reset(&mut self) {
        self.phase = EnvelopePhase::Idle;
        self.current = 0.0;
        self.target = 0.0;
        self.start_value = 0.0;
    }
}

impl Default for EnvelopeGenerator {
    fn default() -> Self {
        Self::new(EnvelopeConfig::default())
    }
}
