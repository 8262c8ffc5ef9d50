use super::super::{Tissue, TickReport};
use crate::pathogen::{Pathogen, PathogenKind};
use rand::Rng;

impl Tissue {
    /// Count the spawn cooldown down. At zero, and only while below the cap, drop
    /// a bacterium at a random position inside the spawn margin and shorten the
    /// period by the decay factor. At the cap the cooldown stays at zero and the
    /// spawn is retried every tick.
    pub(in crate::world) fn step_spawn_phase(&mut self, report: &mut TickReport) {
        self.spawn_cooldown = self.spawn_cooldown.saturating_sub(1);
        if self.spawn_cooldown > 0 || !self.can_add_pathogen() {
            return;
        }

        let margin = self.config.spawn_margin;
        let x = self.rng.random_range(margin..self.config.width - margin);
        let y = self.rng.random_range(margin..self.config.height - margin);
        let id = self.allocate_pathogen_id();
        let pathogen = Pathogen::new(id, x, y, PathogenKind::Bacteria, &mut self.rng);
        self.pathogens.push(pathogen);
        self.invalidate_pathogen_index();
        report.pathogens_spawned += 1;

        let decayed = (self.spawn_period as f64 * self.config.spawn_decay) as u32;
        self.spawn_period = decayed.max(self.config.spawn_min_cooldown);
        self.spawn_cooldown = self.spawn_period;
    }
}
