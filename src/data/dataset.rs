use burn::data::dataset::Dataset;
use rand::{rngs::StdRng, seq::SliceRandom};

use crate::data::collator::Collator;
use crate::domain::batch::Batch;
use crate::domain::translation_pair::TokenizedExample;

pub struct TranslationDataset {
    examples: Vec<TokenizedExample>,
}

impl TranslationDataset {
    pub fn new(examples: Vec<TokenizedExample>) -> Self { Self { examples } }

    pub fn example_count(&self) -> usize { self.examples.len() }

    /// Batches per pass, counting a final partial batch.
    pub fn steps_per_epoch(&self, batch_size: usize) -> usize {
        self.examples.len().div_ceil(batch_size.max(1))
    }

    /// Example indices for one epoch; shuffled when an rng is given.
    pub fn epoch_order(&self, rng: Option<&mut StdRng>) -> Vec<usize> {
        let mut order: Vec<usize> = (0..self.examples.len()).collect();
        if let Some(rng) = rng {
            order.shuffle(rng);
        }
        order
    }

    /// Collate the examples at `indices` into one batch.
    pub fn collate(&self, indices: &[usize], collator: &Collator) -> Batch {
        let items: Vec<TokenizedExample> = indices
            .iter()
            .filter_map(|&i| self.examples.get(i).cloned())
            .collect();
        collator.collate(&items)
    }

    /// Sequential batches in dataset order, built lazily.
    pub fn batches<'a>(
        &'a self,
        batch_size: usize,
        collator: &'a Collator,
    ) -> impl Iterator<Item = Batch> + 'a {
        self.examples
            .chunks(batch_size.max(1))
            .map(move |chunk| collator.collate(chunk))
    }
}

impl Dataset<TokenizedExample> for TranslationDataset {
    fn get(&self, index: usize) -> Option<TokenizedExample> {
        self.examples.get(index).cloned()
    }

    fn len(&self) -> usize {
        self.examples.len()
    }
}
