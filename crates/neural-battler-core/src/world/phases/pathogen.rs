use super::super::{Tissue, TickReport};
use crate::pathogen::PathogenContext;

impl Tissue {
    /// Remove pathogens killed by the immune phase, then step the survivors.
    /// Children from division join the collection after every parent has acted.
    pub(in crate::world) fn step_pathogen_phase(&mut self, report: &mut TickReport) {
        let before = self.pathogens.len();
        self.pathogens.retain(|p| !p.is_dead());
        report.pathogens_killed = before - self.pathogens.len();

        let target_slot = self.immune_cells.iter().position(|c| !c.is_dead());
        let ctx = PathogenContext {
            width: self.config.width,
            height: self.config.height,
            target: target_slot.map(|slot| self.immune_cells[slot].position),
        };

        let population = self.pathogens.len();
        let mut children = Vec::new();
        for pathogen in self.pathogens.iter_mut() {
            let intent = pathogen.update(&ctx, &mut self.rng);

            if let (Some(damage), Some(slot)) = (intent.attack, target_slot) {
                let target = &mut self.immune_cells[slot];
                let was_alive = !target.is_dead();
                target.take_damage(damage);
                report.damage_to_cells += damage;
                if was_alive && target.is_dead() {
                    report.cells_killed += 1;
                }
            }

            if intent.wants_division && population + children.len() < self.config.max_pathogens {
                let id = self.next_pathogen_id;
                self.next_pathogen_id = self.next_pathogen_id.wrapping_add(1);
                children.push(pathogen.divide(id, ctx.width, ctx.height, &mut self.rng));
            }
        }

        report.pathogens_divided = children.len();
        self.pathogens.extend(children);
        self.invalidate_pathogen_index();
    }
}
