//! Board generation
//!
//! A board is `rows * cols` face-down cards holding `rows * cols / 2`
//! distinct values, each exactly twice, in uniformly shuffled order.

use crate::error::GameError;
use log::debug;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use shared::{BoardSize, Card, VALUE_UNIVERSE};

/// Builds shuffled boards from a seedable PRNG
#[derive(Debug)]
pub struct BoardGenerator {
    rng: StdRng,
    universe: u8,
}

impl BoardGenerator {
    /// Generator seeded from OS entropy
    pub fn new(universe: u8) -> Self {
        Self {
            rng: StdRng::from_entropy(),
            universe,
        }
    }

    /// Generator producing the same sequence of boards for the same seed
    pub fn seeded(seed: u64, universe: u8) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            universe,
        }
    }

    /// Resolves a wire board id, then builds the board
    pub fn create_board_by_id(&mut self, board_id: u8) -> Result<Vec<Card>, GameError> {
        let size = BoardSize::from_id(board_id)
            .ok_or_else(|| GameError::Configuration(format!("unknown board id {}", board_id)))?;
        self.create_board(size)
    }

    pub fn create_board(&mut self, size: BoardSize) -> Result<Vec<Card>, GameError> {
        let pairs = size.pair_count();
        if (self.universe as usize) < pairs {
            return Err(GameError::Configuration(format!(
                "{} pairs needed but only {} candidate values exist",
                pairs, self.universe
            )));
        }

        let candidates: Vec<u8> = (1..=self.universe).collect();
        let mut values: Vec<u8> = candidates
            .choose_multiple(&mut self.rng, pairs)
            .flat_map(|&value| [value, value])
            .collect();

        // Fisher-Yates
        values.shuffle(&mut self.rng);

        let (rows, cols) = size.geometry();
        debug!("Generated {}x{} board with {} pairs", rows, cols, pairs);

        Ok(values
            .into_iter()
            .enumerate()
            .map(|(id, value)| Card::new(id, value))
            .collect())
    }
}

impl Default for BoardGenerator {
    fn default() -> Self {
        Self::new(VALUE_UNIVERSE)
    }
}
