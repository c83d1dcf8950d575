#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Timed, sequential spawn orchestration with level completion tracking.
//!
//! Waves are processed strictly in order. Each wave waits its start delay,
//! announces itself, then walks its spawn groups one spawn per scheduling
//! step, waiting the group interval after every spawn. A step due exactly at
//! the end of a tick runs at the start of the next one. Once every wave has
//! been dequeued the level completes as soon as the last active unit has left
//! the simulation. Units spawned outside the schedule are reported through
//! [`WaveScheduler::notify_spawned`] and gate completion the same way.

use std::collections::{HashSet, VecDeque};

use tower_defense_core::{ArchetypeId, PathId, StartWavesError, UnitId, WaveEvent};

/// Homogeneous batch of spawns within a wave.
#[derive(Clone, Debug, PartialEq)]
pub struct SpawnGroup {
    /// Unit archetype to spawn.
    pub archetype: ArchetypeId,
    /// Number of units to spawn.
    pub count: u32,
    /// Seconds waited after each spawn.
    pub interval: f32,
    /// Path the units follow; the default path when absent.
    pub path: Option<PathId>,
}

impl SpawnGroup {
    /// Creates a group, clamping a negative interval to zero.
    #[must_use]
    pub fn new(archetype: ArchetypeId, count: u32, interval: f32, path: Option<PathId>) -> Self {
        Self {
            archetype,
            count,
            interval: non_negative(interval),
            path,
        }
    }
}

/// Ordered spawn groups preceded by a start delay.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Wave {
    /// Identifier of the wave.
    pub id: String,
    /// Seconds waited before the wave starts.
    pub start_delay: f32,
    /// Groups spawned in order.
    pub groups: Vec<SpawnGroup>,
}

impl Wave {
    /// Creates a wave, clamping a negative start delay to zero.
    #[must_use]
    pub fn new(id: impl Into<String>, start_delay: f32, groups: Vec<SpawnGroup>) -> Self {
        Self {
            id: id.into(),
            start_delay: non_negative(start_delay),
            groups,
        }
    }
}

/// Snapshot of scheduler progress.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WaveProgress {
    /// Whether waves are being processed.
    pub running: bool,
    /// Index of the wave currently being processed.
    pub current_wave: Option<u32>,
    /// Number of configured waves.
    pub total_waves: usize,
    /// Waves still waiting in the queue.
    pub queued_waves: usize,
    /// Whether the final wave has been dequeued.
    pub all_spawns_issued: bool,
    /// Active units that must despawn before the level can complete.
    pub tracked_units: usize,
    /// Whether the level completion signal has fired.
    pub level_completed: bool,
}

#[derive(Clone, Debug)]
struct ActiveWave {
    index: u32,
    wave: Wave,
    started: bool,
    group: usize,
    spawned_in_group: u32,
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum Step {
    Wait(f32),
    Yield,
    Done,
}

/// FIFO wave processor.
#[derive(Debug, Default)]
pub struct WaveScheduler {
    waves: Vec<Wave>,
    queue: VecDeque<(u32, Wave)>,
    current: Option<ActiveWave>,
    running: bool,
    wait: f32,
    all_spawns_issued: bool,
    level_completed: bool,
    tracked: HashSet<UnitId>,
    events: Vec<WaveEvent>,
}

impl WaveScheduler {
    /// Creates a scheduler for the provided waves.
    #[must_use]
    pub fn new(waves: Vec<Wave>) -> Self {
        Self {
            waves,
            ..Self::default()
        }
    }

    /// Begins processing every configured wave from the first.
    pub fn start_waves(&mut self) -> Result<(), StartWavesError> {
        if self.waves.is_empty() {
            return Err(StartWavesError::NotConfigured);
        }
        if self.running {
            return Err(StartWavesError::AlreadyRunning);
        }

        self.queue = self
            .waves
            .iter()
            .cloned()
            .enumerate()
            .map(|(index, wave)| (index as u32, wave))
            .collect();
        self.current = None;
        self.running = true;
        self.wait = 0.0;
        self.all_spawns_issued = false;
        self.level_completed = false;
        tracing::info!(waves = self.waves.len(), "waves started");
        Ok(())
    }

    /// Halts progression and discards pending waves. Returns `false` when
    /// waves were not running.
    pub fn stop_waves(&mut self) -> bool {
        if !self.running {
            return false;
        }

        self.queue.clear();
        self.current = None;
        self.running = false;
        self.wait = 0.0;
        tracing::info!("waves stopped");
        true
    }

    /// Advances the schedule by `dt` seconds, invoking `spawn` for every
    /// spawn that falls due.
    ///
    /// `spawn` returns the spawned unit, or `None` when the spawn was
    /// rejected; rejected spawns still consume their scheduling step.
    ///
    /// A spawn with a zero interval ends the tick: the remainder of `dt` is
    /// dropped and the next step runs at the start of the following tick, so
    /// zero-interval groups spawn exactly one unit per tick.
    pub fn tick<F>(&mut self, dt: f32, mut spawn: F)
    where
        F: FnMut(&SpawnGroup) -> Option<UnitId>,
    {
        if !self.running {
            return;
        }

        let mut budget = non_negative(dt);
        loop {
            if self.wait >= budget {
                self.wait -= budget;
                return;
            }
            budget -= self.wait;
            self.wait = 0.0;

            match self.step(&mut spawn) {
                Step::Wait(wait) => self.wait = wait,
                Step::Yield => return,
                Step::Done => return,
            }
        }
    }

    /// Records a unit that entered the simulation outside the schedule.
    pub fn notify_spawned(&mut self, unit: UnitId) {
        let _ = self.tracked.insert(unit);
    }

    /// Records that a unit left the simulation.
    ///
    /// Units that were never tracked are ignored.
    pub fn notify_despawned(&mut self, unit: UnitId) {
        if self.tracked.remove(&unit) {
            self.check_completion();
        }
    }

    /// Whether waves are being processed.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Whether at least one wave is configured.
    #[must_use]
    pub fn is_configured(&self) -> bool {
        !self.waves.is_empty()
    }

    /// Whether the level completion signal has fired.
    #[must_use]
    pub fn level_completed(&self) -> bool {
        self.level_completed
    }

    /// Snapshot of scheduler progress.
    #[must_use]
    pub fn progress(&self) -> WaveProgress {
        WaveProgress {
            running: self.running,
            current_wave: self.current.as_ref().map(|active| active.index),
            total_waves: self.waves.len(),
            queued_waves: self.queue.len(),
            all_spawns_issued: self.all_spawns_issued,
            tracked_units: self.tracked.len(),
            level_completed: self.level_completed,
        }
    }

    /// Moves buffered notifications into `out`.
    pub fn drain_events(&mut self, out: &mut Vec<WaveEvent>) {
        out.append(&mut self.events);
    }

    fn step<F>(&mut self, spawn: &mut F) -> Step
    where
        F: FnMut(&SpawnGroup) -> Option<UnitId>,
    {
        let Some(active) = self.current.as_mut() else {
            return self.dequeue();
        };

        if !active.started {
            active.started = true;
            tracing::info!(wave = active.index, id = %active.wave.id, "wave started");
            self.events.push(WaveEvent::Started { wave: active.index });
            return Step::Wait(0.0);
        }

        while active
            .wave
            .groups
            .get(active.group)
            .map_or(false, |group| active.spawned_in_group >= group.count)
        {
            active.group += 1;
            active.spawned_in_group = 0;
        }

        let Some(group) = active.wave.groups.get(active.group) else {
            let index = active.index;
            self.current = None;
            tracing::info!(wave = index, "wave completed");
            self.events.push(WaveEvent::Completed { wave: index });
            return Step::Wait(0.0);
        };

        active.spawned_in_group += 1;
        match spawn(group) {
            Some(unit) => {
                let _ = self.tracked.insert(unit);
            }
            None => {
                tracing::warn!(archetype = %group.archetype, wave = active.index, "wave spawn skipped");
            }
        }

        if group.interval > 0.0 {
            Step::Wait(group.interval)
        } else {
            Step::Yield
        }
    }

    fn dequeue(&mut self) -> Step {
        match self.queue.pop_front() {
            Some((index, wave)) => {
                let delay = wave.start_delay;
                self.current = Some(ActiveWave {
                    index,
                    wave,
                    started: false,
                    group: 0,
                    spawned_in_group: 0,
                });
                Step::Wait(delay)
            }
            None => {
                self.running = false;
                self.all_spawns_issued = true;
                tracing::info!(tracked = self.tracked.len(), "all spawns issued");
                self.events.push(WaveEvent::AllSpawnsIssued);
                self.check_completion();
                Step::Done
            }
        }
    }

    fn check_completion(&mut self) {
        if self.all_spawns_issued && self.tracked.is_empty() && !self.level_completed {
            self.level_completed = true;
            tracing::info!("level completed");
            self.events.push(WaveEvent::LevelCompleted);
        }
    }
}

fn non_negative(value: f32) -> f32 {
    if value.is_finite() {
        value.max(0.0)
    } else {
        0.0
    }
}
