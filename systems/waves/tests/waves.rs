use tower_defense_core::{ArchetypeId, ArchetypeIndex, PoolKey, UnitId, WaveEvent};
use tower_defense_waves::{SpawnGroup, Wave, WaveScheduler};

#[derive(Debug, Default)]
struct Harness {
    next_slot: u32,
    spawns: Vec<(u32, ArchetypeId)>,
    events: Vec<(u32, WaveEvent)>,
    frame: u32,
}

impl Harness {
    fn frame(&mut self, scheduler: &mut WaveScheduler, dt: f32) {
        self.frame += 1;
        let frame = self.frame;
        let next_slot = &mut self.next_slot;
        let spawns = &mut self.spawns;
        scheduler.tick(dt, |group| {
            spawns.push((frame, group.archetype.clone()));
            let unit = unit(*next_slot);
            *next_slot += 1;
            Some(unit)
        });

        let mut drained = Vec::new();
        scheduler.drain_events(&mut drained);
        self.events
            .extend(drained.into_iter().map(|event| (frame, event)));
    }

    fn spawn_frames(&self) -> Vec<u32> {
        self.spawns.iter().map(|(frame, _)| *frame).collect()
    }
}

fn unit(slot: u32) -> UnitId {
    UnitId::new(ArchetypeIndex::new(0), PoolKey::new(slot, 0))
}

fn single_group(count: u32, interval: f32, start_delay: f32) -> WaveScheduler {
    WaveScheduler::new(vec![Wave::new(
        "opening",
        start_delay,
        vec![SpawnGroup::new(ArchetypeId::from("X"), count, interval, None)],
    )])
}

#[test]
fn three_spawns_one_second_apart_then_completion() {
    let mut scheduler = single_group(3, 1.0, 0.0);
    scheduler.start_waves().expect("waves start");
    let mut harness = Harness::default();

    for _ in 0..4 {
        harness.frame(&mut scheduler, 1.0);
    }

    assert_eq!(harness.spawn_frames(), vec![1, 2, 3]);
    assert_eq!(
        harness.events,
        vec![
            (1, WaveEvent::Started { wave: 0 }),
            (4, WaveEvent::Completed { wave: 0 }),
            (4, WaveEvent::AllSpawnsIssued),
        ]
    );
    assert!(!scheduler.level_completed());
}

#[test]
fn level_completes_once_after_last_tracked_unit_leaves() {
    let mut scheduler = single_group(1, 0.5, 0.0);
    scheduler.start_waves().expect("waves start");
    let mut harness = Harness::default();

    for _ in 0..3 {
        harness.frame(&mut scheduler, 1.0);
    }
    assert!(scheduler.progress().all_spawns_issued);
    assert!(!scheduler.level_completed(), "spawned unit is still alive");

    scheduler.notify_despawned(unit(42));
    assert!(!scheduler.level_completed(), "untracked units are ignored");

    scheduler.notify_despawned(unit(0));
    scheduler.notify_despawned(unit(0));
    harness.frame(&mut scheduler, 1.0);

    let completions = harness
        .events
        .iter()
        .filter(|(_, event)| *event == WaveEvent::LevelCompleted)
        .count();
    assert_eq!(completions, 1);
    assert!(scheduler.level_completed());
}

#[test]
fn start_delay_postpones_first_spawn() {
    let mut scheduler = single_group(1, 1.0, 2.5);
    scheduler.start_waves().expect("waves start");
    let mut harness = Harness::default();

    for _ in 0..3 {
        harness.frame(&mut scheduler, 1.0);
    }

    assert_eq!(harness.spawn_frames(), vec![3]);
    assert_eq!(harness.events[0], (3, WaveEvent::Started { wave: 0 }));
}

#[test]
fn zero_interval_spawns_once_per_tick() {
    let mut scheduler = single_group(3, 0.0, 0.0);
    scheduler.start_waves().expect("waves start");
    let mut harness = Harness::default();

    for _ in 0..4 {
        harness.frame(&mut scheduler, 0.5);
    }

    assert_eq!(harness.spawn_frames(), vec![1, 2, 3]);
    assert!(harness
        .events
        .contains(&(4, WaveEvent::Completed { wave: 0 })));
}

#[test]
fn time_after_zero_interval_spawn_starts_at_next_tick() {
    let mut scheduler = WaveScheduler::new(vec![Wave::new(
        "burst",
        0.0,
        vec![
            SpawnGroup::new(ArchetypeId::from("A"), 1, 0.0, None),
            SpawnGroup::new(ArchetypeId::from("B"), 2, 1.0, None),
        ],
    )]);
    scheduler.start_waves().expect("waves start");
    let mut harness = Harness::default();

    for _ in 0..4 {
        harness.frame(&mut scheduler, 0.75);
    }

    assert_eq!(harness.spawn_frames(), vec![1, 2, 3]);
    assert!(harness
        .events
        .contains(&(4, WaveEvent::AllSpawnsIssued)));
}

#[test]
fn externally_spawned_units_gate_completion() {
    let mut scheduler = single_group(1, 0.5, 0.0);
    scheduler.start_waves().expect("waves start");
    let mut harness = Harness::default();

    harness.frame(&mut scheduler, 1.0);
    scheduler.notify_spawned(unit(99));
    harness.frame(&mut scheduler, 1.0);
    assert!(scheduler.progress().all_spawns_issued);
    assert_eq!(scheduler.progress().tracked_units, 2);

    scheduler.notify_despawned(unit(0));
    assert!(!scheduler.level_completed(), "external unit is still active");

    scheduler.notify_despawned(unit(99));
    assert!(scheduler.level_completed());
}

#[test]
fn interval_is_measured_across_short_ticks() {
    let mut scheduler = single_group(2, 1.0, 0.0);
    scheduler.start_waves().expect("waves start");
    let mut harness = Harness::default();

    for _ in 0..5 {
        harness.frame(&mut scheduler, 0.25);
    }

    assert_eq!(harness.spawn_frames(), vec![1, 5]);
}

#[test]
fn waves_run_in_order_and_skip_empty_groups() {
    let mut scheduler = WaveScheduler::new(vec![
        Wave::new(
            "first",
            0.0,
            vec![
                SpawnGroup::new(ArchetypeId::from("A"), 0, 1.0, None),
                SpawnGroup::new(ArchetypeId::from("B"), 1, 1.0, None),
            ],
        ),
        Wave::new(
            "second",
            1.0,
            vec![SpawnGroup::new(ArchetypeId::from("C"), 1, 1.0, None)],
        ),
    ]);
    scheduler.start_waves().expect("waves start");
    let mut harness = Harness::default();

    for _ in 0..5 {
        harness.frame(&mut scheduler, 1.0);
    }

    let archetypes: Vec<_> = harness
        .spawns
        .iter()
        .map(|(_, archetype)| archetype.as_str().to_owned())
        .collect();
    assert_eq!(archetypes, vec!["B", "C"]);

    let lifecycle: Vec<_> = harness.events.iter().map(|(_, event)| event.clone()).collect();
    assert_eq!(
        lifecycle,
        vec![
            WaveEvent::Started { wave: 0 },
            WaveEvent::Completed { wave: 0 },
            WaveEvent::Started { wave: 1 },
            WaveEvent::Completed { wave: 1 },
            WaveEvent::AllSpawnsIssued,
        ]
    );
}

#[test]
fn rejected_spawns_do_not_block_completion() {
    let mut scheduler = single_group(2, 1.0, 0.0);
    scheduler.start_waves().expect("waves start");

    let mut events = Vec::new();
    for _ in 0..3 {
        scheduler.tick(1.0, |_| None);
        scheduler.drain_events(&mut events);
    }

    assert_eq!(events.last(), Some(&WaveEvent::LevelCompleted));
    assert!(!scheduler.is_running());
}
