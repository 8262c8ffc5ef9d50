use crate::action::Action;
use crate::agent::{AgentError, DqnAgent};
use crate::cell::ImmuneCell;
use crate::config::AgentConfig;
use crate::encoding::{StateEncoder, SurvivalEncoder};
use crate::pathogen::Pathogen;
use crate::world::Tissue;
use std::path::Path;

/// Greedy inference wrapper: steers one immune cell with a trained network.
pub struct CellController {
    agent: DqnAgent,
    encoder: Box<dyn StateEncoder>,
    speed: f64,
}

impl CellController {
    /// Wrap an agent using the default encoder. Fails when the encoder and the
    /// network disagree on the state width.
    pub fn new(agent: DqnAgent) -> Result<Self, AgentError> {
        Self::with_encoder(agent, Box::new(SurvivalEncoder))
    }

    pub fn with_encoder(agent: DqnAgent, encoder: Box<dyn StateEncoder>) -> Result<Self, AgentError> {
        let (expected, actual) = (agent.config().state_size, encoder.state_size());
        if expected != actual {
            return Err(AgentError::DimensionMismatch {
                what: "state_size",
                expected,
                actual,
            });
        }
        Ok(Self {
            agent,
            encoder,
            speed: 1.0,
        })
    }

    pub fn load(path: &Path, config: AgentConfig) -> Result<Self, AgentError> {
        Self::new(DqnAgent::from_checkpoint(config, path)?)
    }

    pub fn with_speed(mut self, speed: f64) -> Self {
        self.speed = speed;
        self
    }

    pub fn agent(&self) -> &DqnAgent {
        &self.agent
    }

    pub fn action(&self, cell: &ImmuneCell, pathogens: &[Pathogen], width: f64, height: f64) -> usize {
        let state = self.encoder.encode(cell, pathogens, width, height);
        self.agent.greedy_action(&state)
    }

    /// Pick an action for `cell_id` and apply it to the tissue. The cell only
    /// moves when the target position is valid. `None` when the cell is gone.
    pub fn steer(&self, tissue: &mut Tissue, cell_id: u32) -> Option<Action> {
        let cell = tissue.immune_cell(cell_id)?;
        let action = Action::from_index(self.action(
            cell,
            tissue.pathogens(),
            tissue.width(),
            tissue.height(),
        ));
        let (dx, dy) = action.direction();
        let target = [cell.x() + dx * self.speed, cell.y() + dy * self.speed];
        tissue.move_immune_cell(cell_id, target[0], target[1]);
        if action.is_special() {
            tissue.request_special(cell_id);
        }
        Some(action)
    }
}
