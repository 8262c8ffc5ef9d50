use crate::cell::{distance, ImmuneCell};
use crate::constants::{ENCODED_PATHOGENS, PATHOGEN_FEATURES, STATE_SIZE};
use crate::pathogen::Pathogen;

/// Turns arena state into the fixed-length vector fed to the network.
/// Implementations must be pure.
pub trait StateEncoder: Send + Sync {
    fn state_size(&self) -> usize;

    fn encode(&self, cell: &ImmuneCell, pathogens: &[Pathogen], width: f64, height: f64)
        -> Vec<f32>;
}

/// Default 28-feature encoding:
///
/// | slots  | feature |
/// |--------|---------|
/// | 0..2   | cell position / arena size |
/// | 2..6   | distance to left, right, top, bottom wall / arena size |
/// | 6..26  | nearest 5 pathogens: distance / diagonal, dx / width, dy / height, health ratio (zero padded) |
/// | 26     | cell health ratio |
/// | 27     | 1.0 when the special burst is ready |
#[derive(Clone, Copy, Debug, Default)]
pub struct SurvivalEncoder;

impl StateEncoder for SurvivalEncoder {
    fn state_size(&self) -> usize {
        STATE_SIZE
    }

    fn encode(
        &self,
        cell: &ImmuneCell,
        pathogens: &[Pathogen],
        width: f64,
        height: f64,
    ) -> Vec<f32> {
        let [x, y] = cell.position;
        let diagonal = (width * width + height * height).sqrt();
        let mut state = Vec::with_capacity(STATE_SIZE);

        state.push((x / width) as f32);
        state.push((y / height) as f32);

        state.push((x / width) as f32);
        state.push(((width - x) / width) as f32);
        state.push((y / height) as f32);
        state.push(((height - y) / height) as f32);

        // Stable sort keeps collection order among equidistant pathogens.
        let mut nearest: Vec<(f64, &Pathogen)> = pathogens
            .iter()
            .map(|p| (distance(cell.position, p.position), p))
            .collect();
        nearest.sort_by(|a, b| a.0.total_cmp(&b.0));
        for (d, p) in nearest.iter().take(ENCODED_PATHOGENS) {
            state.push((d / diagonal) as f32);
            state.push(((p.x() - x) / width) as f32);
            state.push(((p.y() - y) / height) as f32);
            state.push(p.health_ratio() as f32);
        }
        let encoded = nearest.len().min(ENCODED_PATHOGENS);
        state.extend(std::iter::repeat_n(
            0.0,
            (ENCODED_PATHOGENS - encoded) * PATHOGEN_FEATURES,
        ));

        state.push(cell.health_ratio() as f32);
        state.push(if cell.special_ready() { 1.0 } else { 0.0 });

        state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::{CellKind, ManaRelease, MAX_MANA};
    use crate::pathogen::PathogenKind;
    use crate::rng::create_rng;
    use proptest::prelude::*;

    fn pathogen(id: u32, x: f64, y: f64) -> Pathogen {
        let mut rng = create_rng(id as u64);
        Pathogen::new(id, x, y, PathogenKind::Bacteria, &mut rng)
    }

    #[test]
    fn empty_arena_is_zero_padded() {
        let cell = ImmuneCell::new(0, 400.0, 300.0, CellKind::TCell);
        let state = SurvivalEncoder.encode(&cell, &[], 800.0, 600.0);
        assert_eq!(state.len(), STATE_SIZE);
        assert_eq!(&state[0..6], &[0.5, 0.5, 0.5, 0.5, 0.5, 0.5]);
        assert!(state[6..26].iter().all(|v| *v == 0.0));
        assert_eq!(state[26], 1.0);
        assert_eq!(state[27], 0.0);
    }

    #[test]
    fn pathogens_are_sorted_by_distance() {
        let cell = ImmuneCell::new(0, 400.0, 300.0, CellKind::TCell);
        let pathogens = vec![
            pathogen(1, 700.0, 300.0),
            pathogen(2, 410.0, 300.0),
            pathogen(3, 400.0, 200.0),
        ];
        let state = SurvivalEncoder.encode(&cell, &pathogens, 800.0, 600.0);
        assert!((state[7] - 10.0 / 800.0).abs() < 1e-6);
        assert!((state[11 + 1] - (-100.0 / 600.0)).abs() < 1e-6);
        assert!((state[15] - 300.0 / 800.0).abs() < 1e-6);
        assert!(state[6] < state[10] && state[10] < state[14]);
        assert!(state[18..26].iter().all(|v| *v == 0.0));
    }

    #[test]
    fn only_five_nearest_are_encoded() {
        let cell = ImmuneCell::new(0, 0.0, 0.0, CellKind::TCell);
        let pathogens: Vec<Pathogen> = (0..8).rev().map(|i| pathogen(i, 10.0 * (i + 1) as f64, 0.0)).collect();
        let state = SurvivalEncoder.encode(&cell, &pathogens, 800.0, 600.0);
        assert_eq!(state.len(), STATE_SIZE);
        let dxs: Vec<f32> = (0..5).map(|k| state[7 + 4 * k] * 800.0).collect();
        for (k, dx) in dxs.iter().enumerate() {
            assert!((dx - 10.0 * (k + 1) as f32).abs() < 1e-3);
        }
    }

    #[test]
    fn special_flag_reflects_mana_pool() {
        let mut cell = ImmuneCell::new(
            0,
            100.0,
            100.0,
            CellKind::Agent {
                release: ManaRelease::OnRequest,
            },
        );
        assert_eq!(SurvivalEncoder.encode(&cell, &[], 800.0, 600.0)[27], 0.0);
        if let Some(pool) = cell.mana.as_mut() {
            pool.mana = MAX_MANA;
        }
        assert_eq!(SurvivalEncoder.encode(&cell, &[], 800.0, 600.0)[27], 1.0);
    }

    #[test]
    fn encoding_does_not_depend_on_collection_order_of_distinct_distances() {
        let cell = ImmuneCell::new(0, 200.0, 200.0, CellKind::TCell);
        let a = vec![pathogen(1, 250.0, 200.0), pathogen(2, 200.0, 320.0)];
        let b = vec![a[1].clone(), a[0].clone()];
        assert_eq!(
            SurvivalEncoder.encode(&cell, &a, 800.0, 600.0),
            SurvivalEncoder.encode(&cell, &b, 800.0, 600.0)
        );
    }

    proptest! {
        #[test]
        fn in_bounds_states_have_fixed_length_and_finite_bounded_values(
            cx in 0.0f64..800.0,
            cy in 0.0f64..600.0,
            positions in prop::collection::vec((0.0f64..800.0, 0.0f64..600.0), 0..25),
            damage in 0u32..100,
        ) {
            let mut cell = ImmuneCell::new(0, cx, cy, CellKind::TCell);
            cell.take_damage(damage);
            let pathogens: Vec<Pathogen> = positions
                .iter()
                .enumerate()
                .map(|(i, (x, y))| pathogen(i as u32, *x, *y))
                .collect();
            let state = SurvivalEncoder.encode(&cell, &pathogens, 800.0, 600.0);
            prop_assert_eq!(state.len(), STATE_SIZE);
            for v in &state {
                prop_assert!(v.is_finite());
                prop_assert!((-1.0..=1.0).contains(v));
            }
        }
    }
}
