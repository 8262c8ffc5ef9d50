use super::super::{Tissue, TickReport};
use crate::cell::CellContext;
use crate::spatial::ProximityIndex;

impl Tissue {
    /// Step every living immune cell against the current pathogen positions,
    /// then drop cells with zero health.
    pub(in crate::world) fn step_immune_phase(&mut self, report: &mut TickReport) {
        let min_indexed = self.config.spatial_index_min_entities;
        let pathogens = &self.pathogens;
        let index = self.pathogen_index.get_or_init(|| {
            ProximityIndex::build(pathogens.iter().map(|p| p.position).collect(), min_indexed)
        });
        let ctx = CellContext {
            width: self.config.width,
            height: self.config.height,
            pathogen_index: index,
        };

        for cell in self.immune_cells.iter_mut() {
            if cell.is_dead() {
                continue;
            }
            report.shots_fired += cell.update(&ctx, &mut self.pathogens).shots_fired;
        }

        let before = self.immune_cells.len();
        self.immune_cells.retain(|c| !c.is_dead());
        if self.immune_cells.len() != before {
            self.invalidate_cell_index();
        }
    }
}
