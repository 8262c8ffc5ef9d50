use crate::cell::distance;
use rand::Rng;
use serde::{Deserialize, Serialize};

pub const PATHOGEN_MAX_HEALTH: u32 = 50;
pub const PATHOGEN_ATTACK_DAMAGE: u32 = 5;
pub const PATHOGEN_ATTACK_RANGE: f64 = 1.5;
pub const PATHOGEN_ATTACK_COOLDOWN: u32 = 45;
pub const PATHOGEN_SPEED: f64 = 0.7;
pub const PATHOGEN_RADIUS: f64 = 10.0;
pub const DIVISION_TIMER_MIN: u32 = 500;
pub const DIVISION_TIMER_MAX: u32 = 1000;
/// Division requires health strictly above this percentage of max.
pub const DIVISION_HEALTH_THRESHOLD_PCT: u32 = 60;
/// Health paid by the parent, as a percentage of max.
pub const DIVISION_COST_PCT: u32 = 30;
pub const DIVISION_OFFSET: f64 = 20.0;
/// Wander displacement per axis is uniform in `±WANDER_FACTOR * speed`.
pub const WANDER_FACTOR: f64 = 0.5;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PathogenKind {
    /// Divides on a timer.
    Bacteria,
    Virus,
}

/// Read-only view of the world a pathogen needs for one tick.
#[derive(Clone, Copy, Debug)]
pub struct PathogenContext {
    pub width: f64,
    pub height: f64,
    /// Position of the immune cell being hunted, if any.
    pub target: Option<[f64; 2]>,
}

/// What the pathogen wants the world to apply after its step.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PathogenIntent {
    /// Damage dealt to the target this tick.
    pub attack: Option<u32>,
    /// Timer has elapsed and health allows a division; the world checks capacity.
    pub wants_division: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Pathogen {
    pub id: u32,
    pub kind: PathogenKind,
    pub position: [f64; 2],
    pub health: u32,
    pub max_health: u32,
    pub attack_damage: u32,
    pub attack_range: f64,
    pub attack_cooldown: u32,
    pub cooldown_remaining: u32,
    pub speed: f64,
    pub radius: f64,
    /// Ticks until the next division attempt; `None` for kinds that never divide.
    pub division_timer: Option<u32>,
}

impl Pathogen {
    pub fn new<R: Rng + ?Sized>(id: u32, x: f64, y: f64, kind: PathogenKind, rng: &mut R) -> Self {
        let division_timer = match kind {
            PathogenKind::Bacteria => Some(roll_division_timer(rng)),
            PathogenKind::Virus => None,
        };
        Self {
            id,
            kind,
            position: [x, y],
            health: PATHOGEN_MAX_HEALTH,
            max_health: PATHOGEN_MAX_HEALTH,
            attack_damage: PATHOGEN_ATTACK_DAMAGE,
            attack_range: PATHOGEN_ATTACK_RANGE,
            attack_cooldown: PATHOGEN_ATTACK_COOLDOWN,
            cooldown_remaining: 0,
            speed: PATHOGEN_SPEED,
            radius: PATHOGEN_RADIUS,
            division_timer,
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

    pub fn can_divide(&self) -> bool {
        self.division_timer == Some(0)
            && u64::from(self.health) * 100
                > u64::from(self.max_health) * u64::from(DIVISION_HEALTH_THRESHOLD_PCT)
    }

    /// One tick of built-in behaviour. Attacks and divisions are returned as intents.
    pub fn update<R: Rng + ?Sized>(&mut self, ctx: &PathogenContext, rng: &mut R) -> PathogenIntent {
        let mut intent = PathogenIntent::default();

        self.cooldown_remaining = self.cooldown_remaining.saturating_sub(1);

        match ctx.target {
            Some(target) => {
                let d = distance(self.position, target);
                if d <= self.attack_range {
                    if self.cooldown_remaining == 0 {
                        intent.attack = Some(self.attack_damage);
                        self.cooldown_remaining = self.attack_cooldown;
                    }
                } else {
                    self.position[0] += (target[0] - self.position[0]) / d * self.speed;
                    self.position[1] += (target[1] - self.position[1]) / d * self.speed;
                }
            }
            None => self.wander(ctx, rng),
        }

        if let Some(timer) = self.division_timer.as_mut() {
            *timer = timer.saturating_sub(1);
        }
        intent.wants_division = self.can_divide();

        intent
    }

    fn wander<R: Rng + ?Sized>(&mut self, ctx: &PathogenContext, rng: &mut R) {
        let spread = WANDER_FACTOR * self.speed;
        let x = self.position[0] + rng.random_range(-spread..=spread);
        let y = self.position[1] + rng.random_range(-spread..=spread);
        if (0.0..ctx.width).contains(&x) && (0.0..ctx.height).contains(&y) {
            self.position = [x, y];
        }
    }

    /// Pays the division cost, re-arms the timer and returns the child, placed at
    /// a random offset clamped into the arena.
    pub fn divide<R: Rng + ?Sized>(
        &mut self,
        child_id: u32,
        width: f64,
        height: f64,
        rng: &mut R,
    ) -> Pathogen {
        let x = self.position[0] + rng.random_range(-DIVISION_OFFSET..=DIVISION_OFFSET);
        let y = self.position[1] + rng.random_range(-DIVISION_OFFSET..=DIVISION_OFFSET);
        self.take_damage(self.max_health * DIVISION_COST_PCT / 100);
        self.division_timer = Some(roll_division_timer(rng));
        Pathogen::new(
            child_id,
            clamp_into(x, width),
            clamp_into(y, height),
            self.kind,
            rng,
        )
    }
}

fn roll_division_timer<R: Rng + ?Sized>(rng: &mut R) -> u32 {
    rng.random_range(DIVISION_TIMER_MIN..=DIVISION_TIMER_MAX)
}

/// Clamp into the half-open interval `[0, upper)`.
pub(crate) fn clamp_into(value: f64, upper: f64) -> f64 {
    if value < 0.0 || upper <= 0.0 {
        0.0
    } else if value >= upper {
        f64::from_bits(upper.to_bits() - 1)
    } else {
        value
    }
}
