//! Headless stand-in for a game simulation.
//!
//! Wanders a player and a few monsters around a generated level and writes
//! the builtin schema's streams and coffers for every connection. Streams or
//! indicators missing from an override schema are simply not written.

use bevy::prelude::*;
use feed_proto::{Cell, Grid, ServerMessage};
use feed_schema::{COFFER_EMPTY, TERM_WHITE};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::{
    components::{Coffers, Outbox, StreamGrids},
    config::DemoConfig,
    resources::{FeedSchema, FeedTick},
    FeedSet,
};

const LEVEL_WIDTH: u16 = 66;
const LEVEL_HEIGHT: u16 = 22;

const WALL: Cell = Cell::new(b'#', 1);
const FLOOR: Cell = Cell::new(b'.', 9);
const PLAYER: Cell = Cell::new(b'@', 1);
const TARGET: Cell = Cell::new(b'*', 4);

const TARGET_INDICATOR: u8 = 7;

const MONSTER_NAMES: [&str; 6] = [
    "a cave spider",
    "a kobold",
    "a jackal",
    "a floating eye",
    "a rock lizard",
    "a soldier ant",
];

#[derive(Debug, Clone)]
struct Walker {
    x: u16,
    y: u16,
    kind: usize,
}

#[derive(Resource, Debug)]
pub struct DemoWorld {
    rng: ChaCha8Rng,
    level: Grid,
    player: Walker,
    monsters: Vec<Walker>,
    hitpoints: i32,
    max_hitpoints: i32,
    depth: i32,
    food: i32,
    experience: i32,
    feeling: i32,
}

impl DemoWorld {
    pub fn new(config: &DemoConfig) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
        let level = generate_level(&mut rng);
        let player = random_floor(&mut rng, &level, 0);
        let monsters = (0..config.monsters)
            .map(|index| random_floor(&mut rng, &level, index as usize % MONSTER_NAMES.len()))
            .collect();
        Self {
            rng,
            level,
            player,
            monsters,
            hitpoints: 120,
            max_hitpoints: 120,
            depth: 1,
            food: 3,
            experience: 0,
            feeling: 2,
        }
    }

    fn step(&mut self) {
        let DemoWorld {
            rng,
            level,
            player,
            monsters,
            ..
        } = self;
        wander(rng, level, player);
        for monster in monsters.iter_mut() {
            wander(rng, level, monster);
        }

        let adjacent = self
            .monsters
            .iter()
            .filter(|m| m.x.abs_diff(self.player.x) <= 1 && m.y.abs_diff(self.player.y) <= 1)
            .count() as i32;
        self.hitpoints = (self.hitpoints - adjacent * 3 + 1).clamp(0, self.max_hitpoints);
        if self.hitpoints == 0 {
            self.hitpoints = self.max_hitpoints;
            self.depth += 1;
            self.feeling = self.rng.gen_range(1..5);
        }
        self.experience += adjacent * 17;
        if self.rng.gen_bool(0.02) {
            self.food = (self.food - 1).max(0);
        }
    }

    fn nearest_monster(&self) -> Option<&Walker> {
        self.monsters.iter().min_by_key(|m| {
            m.x.abs_diff(self.player.x) as u32 + m.y.abs_diff(self.player.y) as u32
        })
    }
}

pub fn install_demo(app: &mut App, config: &DemoConfig) {
    app.insert_resource(DemoWorld::new(config))
        .add_systems(Update, simulate_demo.in_set(FeedSet::Simulate));
    tracing::info!(
        target: "tile_feed::demo",
        seed = config.seed,
        monsters = config.monsters,
        "demo.installed"
    );
}

pub fn simulate_demo(
    schema: Res<FeedSchema>,
    tick: Res<FeedTick>,
    mut world: ResMut<DemoWorld>,
    mut connections: Query<(&mut Coffers, &mut StreamGrids, &mut Outbox)>,
) {
    world.step();
    let world = &*world;
    let streams = &schema.schema().streams;
    let dungeon = streams.find("dungeon").map(|def| def.id);
    let overlay = streams.find("dungeon-overlay").map(|def| def.id);
    let level_map = streams.find("level-map").map(|def| def.id);
    let monster_list = streams.find("monster-list").map(|def| def.id);
    let special = streams.find("special-info").map(|def| def.id);
    let target = world.nearest_monster();
    let announce_target =
        tick.0 % 10 == 0 && schema.schema().indicators.get(TARGET_INDICATOR).is_some();

    for (mut coffers, mut grids, mut outbox) in connections.iter_mut() {
        if let Some(grid) = stream_grid(&mut grids, dungeon) {
            paint_dungeon(world, grid);
        }
        if let Some(grid) = stream_grid(&mut grids, overlay) {
            grid.fill(Cell::UNSET);
            if let Some(target) = target {
                grid.set(target.x, target.y, TARGET);
            }
        }
        if let Some(grid) = stream_grid(&mut grids, level_map) {
            paint_level_map(world, grid);
        }
        if let Some(grid) = stream_grid(&mut grids, monster_list) {
            grid.fill(Cell::BLANK);
            write_text(grid, 0, 0, "You can see:", TERM_WHITE);
            for (row, monster) in world.monsters.iter().enumerate() {
                write_text(grid, 2, row as u16 + 1, MONSTER_NAMES[monster.kind], 12);
            }
        }
        if let Some(grid) = stream_grid(&mut grids, special) {
            // Grows one line per tick until the reserved rows are full.
            let rows = (tick.0 % 48 + 1) as u16;
            let width = grid.width();
            grid.resize(width, rows);
            grid.fill(Cell::BLANK);
            for row in 0..rows {
                let turn = tick.0.saturating_sub(row as u64);
                write_text(grid, 0, row, &format!("Turn {turn}"), 1);
            }
        }

        let bank = &mut coffers.bank;
        bank.set(0, world.hitpoints);
        bank.set(1, world.max_hitpoints);
        bank.set(2, world.depth);
        bank.set(3, world.food);
        bank.set(4, 18 + (world.depth * 7) % 40);
        let speed = (world.depth % 5) - 2;
        bank.set(5, if speed < 0 { -speed } else { 0 });
        bank.set(6, if speed > 0 { speed } else { 0 });
        bank.set(7, 20 + world.depth * 3);
        bank.set(8, world.depth % 2);
        bank.set_empty(9);
        bank.set(10, world.experience >> 16);
        bank.set(11, (world.experience & 0xffff) as i16 as i32);
        if tick.0 % 25 == 0 {
            bank.set(12, world.feeling);
        }
        if bank.get(12) == COFFER_EMPTY {
            bank.set(12, 0);
        }

        if announce_target {
            if let Some(target) = target {
                outbox.push(ServerMessage::IndicatorText {
                    indicator: TARGET_INDICATOR,
                    text: MONSTER_NAMES[target.kind].to_string(),
                });
            }
        }
    }
}

fn stream_grid(grids: &mut StreamGrids, stream: Option<u8>) -> Option<&mut Grid> {
    grids.get_mut(stream?)
}

fn paint_dungeon(world: &DemoWorld, grid: &mut Grid) {
    grid.copy_from(&world.level);
    for monster in &world.monsters {
        let symbol = MONSTER_NAMES[monster.kind].as_bytes()[2];
        grid.set(monster.x, monster.y, Cell::new(symbol, 4));
    }
    grid.set(world.player.x, world.player.y, PLAYER);
}

fn paint_level_map(world: &DemoWorld, grid: &mut Grid) {
    grid.fill(Cell::BLANK);
    for y in 0..world.level.height() {
        for x in 0..world.level.width() {
            if let Some(cell) = world.level.get(x, y) {
                grid.set(x, y, cell);
            }
        }
    }
    grid.set(world.player.x, world.player.y, PLAYER);
}

fn write_text(grid: &mut Grid, x: u16, y: u16, text: &str, attr: u8) {
    for (offset, byte) in text.bytes().enumerate() {
        grid.set(x + offset as u16, y, Cell::new(byte, attr));
    }
}

fn generate_level(rng: &mut ChaCha8Rng) -> Grid {
    let mut level = Grid::filled(LEVEL_WIDTH, LEVEL_HEIGHT, FLOOR);
    for x in 0..LEVEL_WIDTH {
        level.set(x, 0, WALL);
        level.set(x, LEVEL_HEIGHT - 1, WALL);
    }
    for y in 0..LEVEL_HEIGHT {
        level.set(0, y, WALL);
        level.set(LEVEL_WIDTH - 1, y, WALL);
    }
    for _ in 0..40 {
        let x = rng.gen_range(2..LEVEL_WIDTH - 2);
        let y = rng.gen_range(2..LEVEL_HEIGHT - 2);
        level.set(x, y, WALL);
    }
    level
}

fn random_floor(rng: &mut ChaCha8Rng, level: &Grid, kind: usize) -> Walker {
    loop {
        let x = rng.gen_range(1..LEVEL_WIDTH - 1);
        let y = rng.gen_range(1..LEVEL_HEIGHT - 1);
        if level.get(x, y) == Some(FLOOR) {
            return Walker { x, y, kind };
        }
    }
}

fn wander(rng: &mut ChaCha8Rng, level: &Grid, walker: &mut Walker) {
    let dx = rng.gen_range(-1i32..=1);
    let dy = rng.gen_range(-1i32..=1);
    let x = (walker.x as i32 + dx).clamp(0, LEVEL_WIDTH as i32 - 1) as u16;
    let y = (walker.y as i32 + dy).clamp(0, LEVEL_HEIGHT as i32 - 1) as u16;
    if level.get(x, y) == Some(FLOOR) {
        walker.x = x;
        walker.y = y;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_seed_same_world() {
        let config = DemoConfig::default();
        let mut a = DemoWorld::new(&config);
        let mut b = DemoWorld::new(&config);
        for _ in 0..20 {
            a.step();
            b.step();
        }
        assert_eq!(a.level, b.level);
        assert_eq!((a.player.x, a.player.y), (b.player.x, b.player.y));
        assert_eq!(a.hitpoints, b.hitpoints);
    }

    #[test]
    fn walkers_stay_on_the_floor() {
        let mut world = DemoWorld::new(&DemoConfig::default());
        for _ in 0..200 {
            world.step();
            assert_eq!(world.level.get(world.player.x, world.player.y), Some(FLOOR));
            for monster in &world.monsters {
                assert_eq!(world.level.get(monster.x, monster.y), Some(FLOOR));
            }
        }
    }
}
