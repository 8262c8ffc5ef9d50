use crate::pathogen::Pathogen;
use crate::spatial::ProximityIndex;
use serde::{Deserialize, Serialize};

pub const CELL_MAX_HEALTH: u32 = 100;
pub const CELL_ATTACK_DAMAGE: u32 = 15;
pub const CELL_ATTACK_RANGE: f64 = 250.0;
pub const CELL_ATTACK_COOLDOWN: u32 = 45;
pub const CELL_RADIUS: f64 = 15.0;
pub const PROJECTILE_SPEED: f64 = 3.0;
pub const PROJECTILE_RADIUS: f64 = 5.0;
pub const MAX_MANA: u32 = 100;
pub const MANA_PER_SHOT: u32 = 20;
pub const BURST_RADIUS: f64 = 150.0;
pub const BURST_DAMAGE: u32 = 30;

/// When a full mana pool discharges its burst.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ManaRelease {
    /// Fires on the first tick the pool is full.
    Automatic,
    /// Waits for [`ImmuneCell::request_special`].
    #[default]
    OnRequest,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CellKind {
    /// Built-in behaviour only.
    TCell,
    /// Externally steered, carries a mana pool gating the area burst.
    Agent { release: ManaRelease },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ManaPool {
    pub mana: u32,
    pub max_mana: u32,
    pub gain_per_shot: u32,
    pub release: ManaRelease,
    burst_requested: bool,
}

impl ManaPool {
    pub fn new(release: ManaRelease) -> Self {
        Self {
            mana: 0,
            max_mana: MAX_MANA,
            gain_per_shot: MANA_PER_SHOT,
            release,
            burst_requested: false,
        }
    }

    pub fn is_full(&self) -> bool {
        self.mana >= self.max_mana
    }

    fn accrue(&mut self) {
        self.mana = self.mana.saturating_add(self.gain_per_shot).min(self.max_mana);
    }

    /// Consumes any pending request; true when the burst should go off now.
    fn take_release(&mut self) -> bool {
        let requested = std::mem::take(&mut self.burst_requested);
        self.is_full()
            && match self.release {
                ManaRelease::Automatic => true,
                ManaRelease::OnRequest => requested,
            }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Projectile {
    pub position: [f64; 2],
    pub velocity: [f64; 2],
    pub damage: u32,
    pub radius: f64,
}

/// Read-only view of the world an immune cell needs for one tick.
pub struct CellContext<'a> {
    pub width: f64,
    pub height: f64,
    /// Positions of the pathogen collection as it stood at the start of the phase.
    pub pathogen_index: &'a ProximityIndex,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CellTickOutcome {
    pub shots_fired: u32,
    pub projectile_hits: u32,
    pub burst_hits: u32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ImmuneCell {
    pub id: u32,
    pub kind: CellKind,
    pub position: [f64; 2],
    pub health: u32,
    pub max_health: u32,
    pub attack_damage: u32,
    pub attack_range: f64,
    pub attack_cooldown: u32,
    pub cooldown_remaining: u32,
    pub radius: f64,
    pub mana: Option<ManaPool>,
    pub projectiles: Vec<Projectile>,
}

impl ImmuneCell {
    pub fn new(id: u32, x: f64, y: f64, kind: CellKind) -> Self {
        let mana = match kind {
            CellKind::TCell => None,
            CellKind::Agent { release } => Some(ManaPool::new(release)),
        };
        Self {
            id,
            kind,
            position: [x, y],
            health: CELL_MAX_HEALTH,
            max_health: CELL_MAX_HEALTH,
            attack_damage: CELL_ATTACK_DAMAGE,
            attack_range: CELL_ATTACK_RANGE,
            attack_cooldown: CELL_ATTACK_COOLDOWN,
            cooldown_remaining: 0,
            radius: CELL_RADIUS,
            mana,
            projectiles: Vec::new(),
        }
    }

    pub fn x(&self) -> f64 {
        self.position[0]
    }

    pub fn y(&self) -> f64 {
        self.position[1]
    }

    pub fn take_damage(&mut self, damage: u32) {
        self.health = self.health.saturating_sub(damage);
    }

    pub fn is_dead(&self) -> bool {
        self.health == 0
    }

    pub fn health_ratio(&self) -> f64 {
        if self.max_health == 0 {
            return 0.0;
        }
        self.health as f64 / self.max_health as f64
    }

    pub fn special_ready(&self) -> bool {
        self.mana.as_ref().is_some_and(ManaPool::is_full)
    }

    /// Ask for the area burst on the next tick. Ignored without a mana pool,
    /// and the request lapses if the pool is not full by then.
    pub fn request_special(&mut self) {
        if let Some(pool) = self.mana.as_mut() {
            pool.burst_requested = true;
        }
    }

    /// One tick of built-in behaviour: cooldown, firing at the nearest pathogen in
    /// range, projectile flight and collisions, then the mana burst.
    pub fn update(&mut self, ctx: &CellContext<'_>, pathogens: &mut [Pathogen]) -> CellTickOutcome {
        let mut outcome = CellTickOutcome::default();

        self.cooldown_remaining = self.cooldown_remaining.saturating_sub(1);

        if self.cooldown_remaining == 0 {
            if let Some(target) = self.nearest_target(ctx, pathogens) {
                self.shoot_at(target);
                self.cooldown_remaining = self.attack_cooldown;
                outcome.shots_fired += 1;
                if let Some(pool) = self.mana.as_mut() {
                    pool.accrue();
                }
            }
        }

        outcome.projectile_hits = self.advance_projectiles(ctx.width, ctx.height, pathogens);

        if self.mana.as_mut().is_some_and(ManaPool::take_release) {
            outcome.burst_hits = self.release_burst(ctx, pathogens);
        }

        outcome
    }

    /// Strictly smallest distance wins; on ties the lowest slot is kept.
    fn nearest_target(&self, ctx: &CellContext<'_>, pathogens: &[Pathogen]) -> Option<[f64; 2]> {
        let mut best: Option<([f64; 2], f64)> = None;
        for slot in ctx.pathogen_index.within(self.position, self.attack_range) {
            let Some(pathogen) = pathogens.get(slot) else {
                continue;
            };
            if pathogen.is_dead() {
                continue;
            }
            let d = distance(self.position, pathogen.position);
            match best {
                Some((_, best_d)) if d >= best_d => {}
                _ => best = Some((pathogen.position, d)),
            }
        }
        best.map(|(position, _)| position)
    }

    fn shoot_at(&mut self, target: [f64; 2]) {
        let dx = target[0] - self.position[0];
        let dy = target[1] - self.position[1];
        let d = (dx * dx + dy * dy).sqrt();
        let velocity = if d > 0.0 {
            [dx / d * PROJECTILE_SPEED, dy / d * PROJECTILE_SPEED]
        } else {
            [0.0, 0.0]
        };
        self.projectiles.push(Projectile {
            position: self.position,
            velocity,
            damage: self.attack_damage,
            radius: PROJECTILE_RADIUS,
        });
    }

    fn advance_projectiles(&mut self, width: f64, height: f64, pathogens: &mut [Pathogen]) -> u32 {
        let mut hits = 0;
        self.projectiles.retain_mut(|projectile| {
            projectile.position[0] += projectile.velocity[0];
            projectile.position[1] += projectile.velocity[1];
            let [px, py] = projectile.position;
            if px < 0.0 || px > width || py < 0.0 || py > height {
                return false;
            }
            let struck = pathogens.iter_mut().find(|p| {
                !p.is_dead() && distance(p.position, projectile.position) < p.radius + projectile.radius
            });
            match struck {
                Some(pathogen) => {
                    pathogen.take_damage(projectile.damage);
                    hits += 1;
                    false
                }
                None => true,
            }
        });
        hits
    }

    fn release_burst(&mut self, ctx: &CellContext<'_>, pathogens: &mut [Pathogen]) -> u32 {
        let mut hits = 0;
        for slot in ctx.pathogen_index.within(self.position, BURST_RADIUS) {
            if let Some(pathogen) = pathogens.get_mut(slot) {
                if !pathogen.is_dead() {
                    pathogen.take_damage(BURST_DAMAGE);
                    hits += 1;
                }
            }
        }
        if let Some(pool) = self.mana.as_mut() {
            pool.mana = 0;
        }
        hits
    }
}

pub(crate) fn distance(a: [f64; 2], b: [f64; 2]) -> f64 {
    let dx = a[0] - b[0];
    let dy = a[1] - b[1];
    (dx * dx + dy * dy).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pathogen::PathogenKind;
    use crate::rng::create_rng;
    use proptest::prelude::*;

    fn index_of(pathogens: &[Pathogen]) -> ProximityIndex {
        ProximityIndex::build(pathogens.iter().map(|p| p.position).collect(), 10)
    }

    fn pathogen_at(id: u32, x: f64, y: f64) -> Pathogen {
        let mut rng = create_rng(id as u64);
        Pathogen::new(id, x, y, PathogenKind::Virus, &mut rng)
    }

    #[test]
    fn new_cell_has_full_health_and_no_mana_for_tcell() {
        let cell = ImmuneCell::new(0, 10.0, 20.0, CellKind::TCell);
        assert_eq!(cell.health, CELL_MAX_HEALTH);
        assert!(cell.mana.is_none());
        assert!(!cell.special_ready());
    }

    #[test]
    fn take_damage_floors_at_zero() {
        let mut cell = ImmuneCell::new(0, 0.0, 0.0, CellKind::TCell);
        cell.take_damage(40);
        assert_eq!(cell.health, 60);
        assert!(!cell.is_dead());
        cell.take_damage(1_000);
        assert_eq!(cell.health, 0);
        assert!(cell.is_dead());
    }

    #[test]
    fn fires_at_nearest_pathogen_and_resets_cooldown() {
        let mut cell = ImmuneCell::new(0, 100.0, 100.0, CellKind::TCell);
        let mut pathogens = vec![pathogen_at(1, 300.0, 100.0), pathogen_at(2, 150.0, 100.0)];
        let index = index_of(&pathogens);
        let ctx = CellContext {
            width: 800.0,
            height: 600.0,
            pathogen_index: &index,
        };
        let outcome = cell.update(&ctx, &mut pathogens);
        assert_eq!(outcome.shots_fired, 1);
        assert_eq!(cell.cooldown_remaining, CELL_ATTACK_COOLDOWN);
        assert_eq!(cell.projectiles.len(), 1);
        let v = cell.projectiles[0].velocity;
        assert!((v[0] - PROJECTILE_SPEED).abs() < 1e-9);
        assert!(v[1].abs() < 1e-9);
    }

    #[test]
    fn ties_go_to_first_pathogen_in_collection() {
        let mut cell = ImmuneCell::new(0, 100.0, 100.0, CellKind::TCell);
        let mut pathogens = vec![pathogen_at(1, 100.0, 150.0), pathogen_at(2, 150.0, 100.0)];
        let index = index_of(&pathogens);
        let ctx = CellContext {
            width: 800.0,
            height: 600.0,
            pathogen_index: &index,
        };
        cell.update(&ctx, &mut pathogens);
        let v = cell.projectiles[0].velocity;
        assert!(v[0].abs() < 1e-9, "expected shot toward +y, got {v:?}");
        assert!(v[1] > 0.0);
    }

    #[test]
    fn does_not_fire_without_target_in_range() {
        let mut cell = ImmuneCell::new(0, 10.0, 10.0, CellKind::TCell);
        let mut pathogens = vec![pathogen_at(1, 700.0, 500.0)];
        let index = index_of(&pathogens);
        let ctx = CellContext {
            width: 800.0,
            height: 600.0,
            pathogen_index: &index,
        };
        let outcome = cell.update(&ctx, &mut pathogens);
        assert_eq!(outcome.shots_fired, 0);
        assert!(cell.projectiles.is_empty());
    }

    #[test]
    fn projectile_collision_applies_damage_and_is_removed() {
        let mut cell = ImmuneCell::new(0, 100.0, 100.0, CellKind::TCell);
        let mut pathogens = vec![pathogen_at(1, 120.0, 100.0)];
        let index = index_of(&pathogens);
        let ctx = CellContext {
            width: 800.0,
            height: 600.0,
            pathogen_index: &index,
        };
        let mut hits = 0;
        for _ in 0..5 {
            hits += cell.update(&ctx, &mut pathogens).projectile_hits;
        }
        assert_eq!(hits, 1);
        assert_eq!(pathogens[0].health, pathogens[0].max_health - CELL_ATTACK_DAMAGE);
        assert!(cell.projectiles.is_empty());
    }

    #[test]
    fn projectile_leaving_arena_is_dropped() {
        let mut cell = ImmuneCell::new(0, 1.0, 1.0, CellKind::TCell);
        cell.projectiles.push(Projectile {
            position: [1.0, 1.0],
            velocity: [-3.0, 0.0],
            damage: 15,
            radius: PROJECTILE_RADIUS,
        });
        cell.cooldown_remaining = 10;
        let index = index_of(&[]);
        let ctx = CellContext {
            width: 800.0,
            height: 600.0,
            pathogen_index: &index,
        };
        cell.update(&ctx, &mut []);
        assert!(cell.projectiles.is_empty());
    }

    #[test]
    fn on_request_burst_waits_for_request() {
        let mut cell = ImmuneCell::new(
            0,
            100.0,
            100.0,
            CellKind::Agent {
                release: ManaRelease::OnRequest,
            },
        );
        if let Some(pool) = cell.mana.as_mut() {
            pool.mana = MAX_MANA;
        }
        cell.cooldown_remaining = 10;
        let mut pathogens = vec![pathogen_at(1, 150.0, 100.0)];
        let index = index_of(&pathogens);
        let ctx = CellContext {
            width: 800.0,
            height: 600.0,
            pathogen_index: &index,
        };

        assert!(cell.special_ready());
        assert_eq!(cell.update(&ctx, &mut pathogens).burst_hits, 0);

        cell.request_special();
        assert_eq!(cell.update(&ctx, &mut pathogens).burst_hits, 1);
        assert_eq!(pathogens[0].health, pathogens[0].max_health - BURST_DAMAGE);
        assert!(!cell.special_ready());
    }

    #[test]
    fn automatic_burst_fires_once_pool_fills() {
        let mut cell = ImmuneCell::new(
            0,
            100.0,
            100.0,
            CellKind::Agent {
                release: ManaRelease::Automatic,
            },
        );
        let mut pathogens = vec![pathogen_at(1, 200.0, 100.0)];
        pathogens[0].health = 10_000;
        pathogens[0].max_health = 10_000;
        let index = index_of(&pathogens);
        let ctx = CellContext {
            width: 800.0,
            height: 600.0,
            pathogen_index: &index,
        };
        let shots_to_fill = MAX_MANA / MANA_PER_SHOT;
        let mut bursts = 0;
        for _ in 0..(shots_to_fill * CELL_ATTACK_COOLDOWN) {
            bursts += cell.update(&ctx, &mut pathogens).burst_hits;
        }
        assert_eq!(bursts, 1);
        assert_eq!(cell.mana.as_ref().map(|p| p.mana), Some(0));
    }

    proptest! {
        #[test]
        fn health_never_increases_under_damage(damages in prop::collection::vec(0u32..200, 0..30)) {
            let mut cell = ImmuneCell::new(0, 0.0, 0.0, CellKind::TCell);
            let mut previous = cell.health;
            for d in damages {
                cell.take_damage(d);
                prop_assert!(cell.health <= previous);
                prop_assert_eq!(cell.is_dead(), cell.health == 0);
                previous = cell.health;
            }
        }
    }
}
