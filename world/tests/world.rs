use std::{cell::RefCell, rc::Rc, time::Duration};

use tower_defense_core::{
    ArchetypeId, Command, EmplacementEvent, EmplacementId, Event, GridCoord, PlacementError,
    RemovalError, UnitEvent, UpgradeError, WaveEvent,
};
use tower_defense_emplacements::EmplacementConfigError;
use tower_defense_units::UnitConfigError;
use tower_defense_world::{apply, query, ConfigIssue, LevelLoadError, World};

const MEADOW: &str = r#"
id = "meadow"

[grid]
width = 10
height = 4

[[paths]]
id = "main"
waypoints = [[0.5, 0.5], [9.5, 0.5]]

[[units]]
id = "grunt"
max_health = 3
move_speed = 1.0

[[emplacements]]
id = "arrow"
range = 3.0
damage = 5

[emplacements.projectile]
speed = 20.0

[[emplacements.upgrades]]
id = "longbow"
range_modifier = 2.0

[[waves]]
id = "first"

[[waves.groups]]
archetype = "grunt"
count = 1
"#;

const BREACH: &str = r#"
id = "breach"
starting_lives = 3

[grid]
width = 10
height = 4

[[paths]]
id = "main"
waypoints = [[0.5, 0.5], [9.5, 0.5]]

[[units]]
id = "grunt"
max_health = 3
move_speed = 1.0
damage_to_player = 2

[[waves]]
id = "rush"

[[waves.groups]]
archetype = "grunt"
count = 2
"#;

fn meadow() -> World {
    World::from_level_str(MEADOW).expect("meadow parses")
}

fn run(world: &mut World, commands: impl IntoIterator<Item = Command>) -> Vec<Event> {
    let mut events = Vec::new();
    for command in commands {
        apply(world, command, &mut events);
    }
    events
}

fn frames(count: usize) -> impl Iterator<Item = Command> {
    std::iter::repeat(Command::Tick {
        dt: Duration::from_millis(100),
    })
    .take(count)
}

fn place(archetype: &str, x: i32, y: i32) -> Command {
    Command::PlaceEmplacement {
        archetype: ArchetypeId::from(archetype),
        coord: GridCoord::new(x, y),
    }
}

#[test]
fn emplacement_kills_wave_unit_and_level_completes_once() {
    let mut world = meadow();
    assert!(query::config_issues(&world).is_empty());

    let mut events = run(&mut world, [place("arrow", 2, 1), Command::StartWaves]);
    events.extend(run(&mut world, frames(200)));

    let died = events
        .iter()
        .position(|event| matches!(event, Event::Unit(UnitEvent::Died { .. })))
        .expect("unit dies");
    let completed: Vec<_> = events
        .iter()
        .enumerate()
        .filter(|(_, event)| **event == Event::Wave(WaveEvent::LevelCompleted))
        .map(|(index, _)| index)
        .collect();
    assert_eq!(completed.len(), 1, "completion fires exactly once");
    assert!(died < completed[0]);
    assert!(events
        .iter()
        .any(|event| matches!(event, Event::Emplacement(EmplacementEvent::ShotFired { .. }))));

    assert!(query::level_completed(&world));
    assert_eq!(query::unit_count(&world), 0);
    assert_eq!(query::projectile_count(&world), 0);
    assert_eq!(query::tickable_count(&world), 1, "only the emplacement remains");
    assert!(query::unit_pools(&world).iter().all(|pool| pool.active == 0));
    assert!(query::projectile_pools(&world)
        .iter()
        .all(|pool| pool.active == 0));
}

#[test]
fn live_unit_spawned_by_command_holds_back_completion() {
    let mut world = meadow();
    let mut events = run(&mut world, [Command::StartWaves]);
    events.extend(run(&mut world, frames(20)));
    assert!(query::wave_progress(&world).all_spawns_issued);
    let wave_unit = query::units(&world)[0].id;

    let _ = run(
        &mut world,
        [Command::SpawnUnit {
            archetype: ArchetypeId::from("grunt"),
            path: None,
            position: None,
        }],
    );
    assert_eq!(query::unit_count(&world), 2);

    assert!(world.kill_unit(wave_unit));
    world.drain_events(&mut events);
    assert_eq!(query::unit_count(&world), 1);
    assert!(!query::level_completed(&world), "the spawned unit is still walking");
    assert!(!events.contains(&Event::Wave(WaveEvent::LevelCompleted)));

    let mut completions = 0;
    for _ in 0..200 {
        let frame = run(&mut world, frames(1));
        if frame.contains(&Event::Wave(WaveEvent::LevelCompleted)) {
            completions += 1;
            assert_eq!(query::unit_count(&world), 0);
            assert!(frame
                .iter()
                .any(|event| matches!(event, Event::Unit(UnitEvent::ReachedGoal { .. }))));
        }
    }
    assert_eq!(completions, 1);
    assert!(query::level_completed(&world));
}

#[test]
fn escaping_units_cost_lives_until_defeat() {
    let mut world = World::from_level_str(BREACH).expect("breach parses");
    assert_eq!(query::lives(&world), 3);

    let mut events = run(&mut world, [Command::StartWaves]);
    events.extend(run(&mut world, frames(400)));

    let lives: Vec<_> = events
        .iter()
        .filter_map(|event| match event {
            Event::LivesChanged { lives, lost } => Some((*lives, *lost)),
            _ => None,
        })
        .collect();
    assert_eq!(lives, vec![(1, 2), (0, 1)]);
    assert_eq!(events.last(), Some(&Event::Defeated));
    assert!(!events.contains(&Event::Wave(WaveEvent::LevelCompleted)));

    assert!(query::is_defeated(&world));
    assert_eq!(query::lives(&world), 0);
    assert!(!query::level_completed(&world));
    let ticks = query::tick_index(&world);
    assert!(run(&mut world, frames(5)).is_empty());
    assert_eq!(query::tick_index(&world), ticks);
}

#[test]
fn killed_units_leave_lives_untouched() {
    let mut world = meadow();
    let events = run(&mut world, [place("arrow", 2, 1), Command::StartWaves]);
    assert_eq!(query::lives(&world), 20);

    let events: Vec<_> = events
        .into_iter()
        .chain(run(&mut world, frames(200)))
        .collect();
    assert!(events
        .iter()
        .all(|event| !matches!(event, Event::LivesChanged { .. } | Event::Defeated)));
    assert_eq!(query::lives(&world), 20);
    assert!(!query::is_defeated(&world));
}

#[test]
fn path_tiles_cannot_be_built_on() {
    let mut world = meadow();
    let events = run(
        &mut world,
        [place("arrow", 4, 0), place("arrow", 4, 1), place("arrow", 4, 1)],
    );

    assert_eq!(
        events[0],
        Event::PlacementRejected {
            archetype: ArchetypeId::from("arrow"),
            coord: GridCoord::new(4, 0),
            reason: PlacementError::NotBuildable,
        }
    );
    assert!(matches!(
        events[1],
        Event::Emplacement(EmplacementEvent::Placed { .. })
    ));
    assert_eq!(
        events[2],
        Event::PlacementRejected {
            archetype: ArchetypeId::from("arrow"),
            coord: GridCoord::new(4, 1),
            reason: PlacementError::Occupied,
        }
    );
    assert_eq!(query::emplacements(&world).len(), 1);
}

#[test]
fn removal_frees_tile_and_unregisters_emplacement() {
    let mut world = meadow();
    let _ = run(&mut world, [place("arrow", 3, 2)]);
    let emplacement = EmplacementId::new(0);
    assert_eq!(query::tickable_count(&world), 1);

    let events = run(
        &mut world,
        [
            Command::RemoveEmplacement { emplacement },
            Command::RemoveEmplacement { emplacement },
        ],
    );

    assert_eq!(
        events,
        vec![
            Event::Emplacement(EmplacementEvent::Removed {
                emplacement,
                coord: GridCoord::new(3, 2),
            }),
            Event::RemovalRejected {
                emplacement,
                reason: RemovalError::MissingEmplacement,
            },
        ]
    );
    assert_eq!(query::tickable_count(&world), 0);
    assert!(query::grid(&world).can_place(GridCoord::new(3, 2)));
}

#[test]
fn upgrades_apply_in_order_until_exhausted() {
    let mut world = meadow();
    let _ = run(&mut world, [place("arrow", 3, 2)]);
    let emplacement = EmplacementId::new(0);

    let events = run(
        &mut world,
        [
            Command::UpgradeEmplacement { emplacement },
            Command::UpgradeEmplacement { emplacement },
        ],
    );

    assert_eq!(
        events,
        vec![
            Event::Emplacement(EmplacementEvent::Upgraded {
                emplacement,
                level: 1,
            }),
            Event::UpgradeRejected {
                emplacement,
                reason: UpgradeError::FullyUpgraded,
            },
        ]
    );
    let snapshot = query::emplacement(&world, emplacement).expect("emplacement exists");
    assert_eq!(snapshot.level, 1);
    assert!((snapshot.range - 6.0).abs() < f32::EPSILON);
}

#[test]
fn signals_deliver_until_unsubscribed() {
    let mut world = meadow();
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&seen);
    let subscription = world
        .signals_mut()
        .units
        .subscribe(move |event: &UnitEvent| sink.borrow_mut().push(event.clone()));

    let spawn = Command::SpawnUnit {
        archetype: ArchetypeId::from("grunt"),
        path: None,
        position: None,
    };
    let _ = run(&mut world, [spawn.clone()]);
    assert_eq!(seen.borrow().len(), 1);
    assert!(matches!(seen.borrow()[0], UnitEvent::Spawned { .. }));

    assert!(world.signals_mut().units.unsubscribe(subscription));
    let _ = run(&mut world, [spawn]);
    assert_eq!(seen.borrow().len(), 1);

    drop(world);
    assert_eq!(Rc::strong_count(&seen), 1);
}

#[test]
fn killed_unit_is_unregistered_once() {
    let mut world = meadow();
    let unit = world
        .spawn_unit(&ArchetypeId::from("grunt"), None, None)
        .expect("spawn");
    let mut events = Vec::new();
    world.drain_events(&mut events);

    assert!(world.kill_unit(unit));
    assert!(!world.kill_unit(unit));
    world.drain_events(&mut events);

    let deaths = events
        .iter()
        .filter(|event| **event == Event::Unit(UnitEvent::Died { unit }))
        .count();
    assert_eq!(deaths, 1);
    assert_eq!(query::tickable_count(&world), 0);
    assert!(query::unit(&world, unit).is_none());
}

#[test]
fn invalid_level_entries_are_skipped_and_reported() {
    let world = World::from_level_str(
        r#"
        id = "broken"

        [[paths]]
        id = "main"
        waypoints = [[0.5, 0.5], [5.5, 0.5]]

        [[paths]]
        id = "main"
        waypoints = [[0.5, 1.5]]

        [[paths]]
        id = "nowhere"

        [[units]]
        id = "grunt"

        [[units]]
        id = "grunt"

        [[emplacements]]
        id = "dud"

        [[waves]]
        id = "first"

        [[waves.groups]]
        archetype = "ghost"

        [[waves.groups]]
        archetype = "grunt"
        path = "missing"

        [[waves.groups]]
        archetype = "grunt"
        "#,
    )
    .expect("document parses");

    assert_eq!(
        query::config_issues(&world),
        &[
            ConfigIssue::DuplicatePath("main".to_owned()),
            ConfigIssue::EmptyPath("nowhere".to_owned()),
            ConfigIssue::Unit(UnitConfigError::DuplicateArchetype(ArchetypeId::from(
                "grunt"
            ))),
            ConfigIssue::Emplacement(EmplacementConfigError::MissingProjectile(
                ArchetypeId::from("dud")
            )),
            ConfigIssue::UnknownSpawnArchetype {
                wave: "first".to_owned(),
                archetype: ArchetypeId::from("ghost"),
            },
            ConfigIssue::UnknownSpawnPath {
                wave: "first".to_owned(),
                path: "missing".to_owned(),
            },
        ]
    );
    assert!(query::path_id(&world, "main").is_some());
    assert!(query::path_id(&world, "nowhere").is_none());
    assert_eq!(query::level_id(&world), "broken");
    assert_eq!(query::wave_progress(&world).total_waves, 1);
}

#[test]
fn level_loading_reports_io_and_parse_failures() {
    let missing = World::load_level_file("/nonexistent/level.toml");
    assert!(matches!(missing, Err(LevelLoadError::Io { .. })));

    let malformed = World::from_level_str("id = [");
    assert!(matches!(malformed, Err(LevelLoadError::Parse(_))));
}
