use crate::cell::{CellKind, ImmuneCell};
use crate::config::{ArenaConfig, ConfigError};
use crate::metrics::{ArenaSnapshot, EntitySnapshot, ProjectileSnapshot};
use crate::pathogen::{Pathogen, PathogenKind};
use crate::rng::derive_rng;
use crate::spatial::ProximityIndex;
use rand_chacha::ChaCha12Rng;
use serde::{Deserialize, Serialize};
use std::cell::OnceCell;

/// What happened during one [`Tissue::update`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickReport {
    pub tick: u64,
    pub shots_fired: u32,
    pub pathogens_killed: usize,
    pub pathogens_divided: usize,
    pub pathogens_spawned: usize,
    pub damage_to_cells: u32,
    pub cells_killed: usize,
}

/// Bounded 2D arena holding the immune cells, the pathogens and the spawn schedule.
///
/// Entities live in insertion-ordered collections and carry stable ids. Dead
/// entities are compacted away by the phase that owns them, so a cell killed
/// during the pathogen phase is still observable (with zero health) until the
/// next update.
#[derive(Clone, Debug)]
pub struct Tissue {
    config: ArenaConfig,
    immune_cells: Vec<ImmuneCell>,
    pathogens: Vec<Pathogen>,
    rng: ChaCha12Rng,
    tick: u64,
    spawn_period: u32,
    spawn_cooldown: u32,
    next_cell_id: u32,
    next_pathogen_id: u32,
    // Lazily rebuilt position indexes; emptied whenever the collection changes.
    pathogen_index: OnceCell<ProximityIndex>,
    cell_index: OnceCell<ProximityIndex>,
}

impl Tissue {
    pub fn new(config: ArenaConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let rng = derive_rng(config.seed, crate::constants::WORLD_RNG_STREAM);
        Ok(Self {
            spawn_period: config.spawn_initial_cooldown,
            spawn_cooldown: config.spawn_initial_cooldown,
            config,
            immune_cells: Vec::new(),
            pathogens: Vec::new(),
            rng,
            tick: 0,
            next_cell_id: 0,
            next_pathogen_id: 0,
            pathogen_index: OnceCell::new(),
            cell_index: OnceCell::new(),
        })
    }

    /// Empty both collections and rewind the spawn schedule. The random stream
    /// keeps advancing so consecutive episodes differ.
    pub fn reset(&mut self) {
        self.immune_cells.clear();
        self.pathogens.clear();
        self.tick = 0;
        self.spawn_period = self.config.spawn_initial_cooldown;
        self.spawn_cooldown = self.config.spawn_initial_cooldown;
        self.next_cell_id = 0;
        self.next_pathogen_id = 0;
        self.invalidate_pathogen_index();
        self.invalidate_cell_index();
    }

    pub fn width(&self) -> f64 {
        self.config.width
    }

    pub fn height(&self) -> f64 {
        self.config.height
    }

    pub fn config(&self) -> &ArenaConfig {
        &self.config
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn spawn_period(&self) -> u32 {
        self.spawn_period
    }

    pub fn spawn_cooldown(&self) -> u32 {
        self.spawn_cooldown
    }

    pub fn immune_cells(&self) -> &[ImmuneCell] {
        &self.immune_cells
    }

    pub fn pathogens(&self) -> &[Pathogen] {
        &self.pathogens
    }

    pub fn immune_cell(&self, id: u32) -> Option<&ImmuneCell> {
        self.immune_cells.iter().find(|c| c.id == id)
    }

    pub fn pathogen(&self, id: u32) -> Option<&Pathogen> {
        self.pathogens.iter().find(|p| p.id == id)
    }

    /// Register an immune cell. The position is not validated.
    pub fn add_immune_cell(&mut self, x: f64, y: f64, kind: CellKind) -> u32 {
        let id = self.next_cell_id;
        self.next_cell_id = self.next_cell_id.wrapping_add(1);
        self.immune_cells.push(ImmuneCell::new(id, x, y, kind));
        self.invalidate_cell_index();
        id
    }

    /// Register a pathogen, or return `None` when the population is at its cap.
    /// The position is not validated.
    pub fn add_pathogen(&mut self, x: f64, y: f64, kind: PathogenKind) -> Option<u32> {
        if !self.can_add_pathogen() {
            return None;
        }
        let id = self.allocate_pathogen_id();
        let pathogen = Pathogen::new(id, x, y, kind, &mut self.rng);
        self.pathogens.push(pathogen);
        self.invalidate_pathogen_index();
        Some(id)
    }

    pub fn can_add_pathogen(&self) -> bool {
        self.pathogens.len() < self.config.max_pathogens
    }

    pub fn is_valid_position(&self, x: f64, y: f64) -> bool {
        (0.0..self.config.width).contains(&x) && (0.0..self.config.height).contains(&y)
    }

    /// Move a cell to `(x, y)` if that position is inside the arena. Returns
    /// whether the cell moved.
    pub fn move_immune_cell(&mut self, id: u32, x: f64, y: f64) -> bool {
        if !self.is_valid_position(x, y) {
            return false;
        }
        let Some(cell) = self.immune_cells.iter_mut().find(|c| c.id == id) else {
            return false;
        };
        cell.position = [x, y];
        self.invalidate_cell_index();
        true
    }

    /// Queue the area burst for the given cell. False when the cell is unknown.
    pub fn request_special(&mut self, id: u32) -> bool {
        match self.immune_cells.iter_mut().find(|c| c.id == id) {
            Some(cell) => {
                cell.request_special();
                true
            }
            None => false,
        }
    }

    /// Every pathogen whose centre is within `radius` of `(x, y)`, in collection order.
    pub fn get_nearby_pathogens(&self, x: f64, y: f64, radius: f64) -> Vec<&Pathogen> {
        self.pathogen_index()
            .within([x, y], radius)
            .into_iter()
            .filter_map(|slot| self.pathogens.get(slot))
            .collect()
    }

    /// Every immune cell whose centre is within `radius` of `(x, y)`, in collection order.
    pub fn get_nearby_immune_cells(&self, x: f64, y: f64, radius: f64) -> Vec<&ImmuneCell> {
        self.cell_index()
            .within([x, y], radius)
            .into_iter()
            .filter_map(|slot| self.immune_cells.get(slot))
            .collect()
    }

    /// Advance one tick: immune cells, then pathogens, then the spawn schedule.
    pub fn update(&mut self) -> TickReport {
        self.tick = self.tick.saturating_add(1);
        let mut report = TickReport {
            tick: self.tick,
            ..TickReport::default()
        };

        self.step_immune_phase(&mut report);
        self.step_pathogen_phase(&mut report);
        self.step_spawn_phase(&mut report);

        report
    }

    pub fn snapshot(&self) -> ArenaSnapshot {
        ArenaSnapshot {
            tick: self.tick,
            width: self.config.width,
            height: self.config.height,
            immune_cells: self
                .immune_cells
                .iter()
                .map(|c| EntitySnapshot {
                    id: c.id,
                    x: c.x(),
                    y: c.y(),
                    health: c.health,
                    max_health: c.max_health,
                    radius: c.radius,
                })
                .collect(),
            pathogens: self
                .pathogens
                .iter()
                .map(|p| EntitySnapshot {
                    id: p.id,
                    x: p.x(),
                    y: p.y(),
                    health: p.health,
                    max_health: p.max_health,
                    radius: p.radius,
                })
                .collect(),
            projectiles: self
                .immune_cells
                .iter()
                .flat_map(|c| {
                    c.projectiles.iter().map(move |pr| ProjectileSnapshot {
                        owner: c.id,
                        x: pr.position[0],
                        y: pr.position[1],
                        radius: pr.radius,
                    })
                })
                .collect(),
        }
    }

    fn pathogen_index(&self) -> &ProximityIndex {
        self.pathogen_index.get_or_init(|| {
            ProximityIndex::build(
                self.pathogens.iter().map(|p| p.position).collect(),
                self.config.spatial_index_min_entities,
            )
        })
    }

    fn cell_index(&self) -> &ProximityIndex {
        self.cell_index.get_or_init(|| {
            ProximityIndex::build(
                self.immune_cells.iter().map(|c| c.position).collect(),
                self.config.spatial_index_min_entities,
            )
        })
    }

    fn invalidate_pathogen_index(&mut self) {
        self.pathogen_index.take();
    }

    fn invalidate_cell_index(&mut self) {
        self.cell_index.take();
    }

    fn allocate_pathogen_id(&mut self) -> u32 {
        let id = self.next_pathogen_id;
        self.next_pathogen_id = self.next_pathogen_id.wrapping_add(1);
        id
    }

    #[cfg(test)]
    pub(crate) fn pathogens_mut(&mut self) -> &mut Vec<Pathogen> {
        self.invalidate_pathogen_index();
        &mut self.pathogens
    }

    #[cfg(test)]
    pub(crate) fn immune_cells_mut(&mut self) -> &mut Vec<ImmuneCell> {
        self.invalidate_cell_index();
        &mut self.immune_cells
    }

    #[cfg(test)]
    pub(crate) fn pathogen_index_is_tree(&self) -> bool {
        self.pathogen_index().is_indexed()
    }

    #[cfg(test)]
    pub(crate) fn cell_index_is_tree(&self) -> bool {
        self.cell_index().is_indexed()
    }
}

mod phases;
