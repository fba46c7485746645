use std::any::Any;
use std::collections::HashMap;

use anyhow::{Result, bail};
use ndarray::{Array3, Axis, concatenate};

/// Per-module state kept across incremental decoding steps.
pub trait IncrementalState: Send + Sync {
    /// Reorders the batch dimension so that row `i` becomes old row `new_order[i]`.
    fn reorder(&mut self, new_order: &[usize]) -> Result<()>;

    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Holds the incremental states of all modules taking part in a decoding run,
/// together with the current step.
///
/// The bag is owned by the caller and lent to modules for one forward call
/// at a time.
#[derive(Default)]
pub struct IncrementalStateBag {
    step: usize,
    states: HashMap<String, Box<dyn IncrementalState>>,
}

impl IncrementalStateBag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of positions already processed.
    pub fn step(&self) -> usize {
        self.step
    }

    pub fn increment_step(&mut self, delta: usize) {
        self.step += delta;
    }

    pub fn get_state<T: IncrementalState + 'static>(&self, key: &str) -> Option<&T> {
        self.states.get(key).and_then(|s| s.as_any().downcast_ref::<T>())
    }

    pub fn get_state_mut<T: IncrementalState + 'static>(&mut self, key: &str) -> Option<&mut T> {
        self.states.get_mut(key).and_then(|s| s.as_any_mut().downcast_mut::<T>())
    }

    pub fn set_state(&mut self, key: impl Into<String>, state: Box<dyn IncrementalState>) {
        self.states.insert(key.into(), state);
    }

    pub fn remove_state(&mut self, key: &str) -> Option<Box<dyn IncrementalState>> {
        self.states.remove(key)
    }

    /// Reorders every state in the bag.
    pub fn reorder(&mut self, new_order: &[usize]) -> Result<()> {
        for state in self.states.values_mut() {
            state.reorder(new_order)?;
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}

impl std::fmt::Debug for IncrementalStateBag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut keys: Vec<_> = self.states.keys().collect();
        keys.sort();
        f.debug_struct("IncrementalStateBag")
            .field("step", &self.step)
            .field("states", &keys)
            .finish()
    }
}

/// Keys and values accumulated by an attention layer, `[batch, steps, dim]` each.
#[derive(Debug, Clone)]
pub struct AttentionState {
    keys: Array3<f32>,
    values: Array3<f32>,
}

impl AttentionState {
    pub fn new(keys: Array3<f32>, values: Array3<f32>) -> Result<Self> {
        if keys.dim() != values.dim() {
            bail!("keys {:?} and values {:?} must have the same shape", keys.dim(), values.dim());
        }
        Ok(Self { keys, values })
    }

    /// Appends the keys and values of the current step along the sequence axis.
    pub fn append(&mut self, keys: &Array3<f32>, values: &Array3<f32>) -> Result<()> {
        self.keys = concatenate(Axis(1), &[self.keys.view(), keys.view()])?;
        self.values = concatenate(Axis(1), &[self.values.view(), values.view()])?;
        Ok(())
    }

    pub fn keys(&self) -> &Array3<f32> {
        &self.keys
    }

    pub fn values(&self) -> &Array3<f32> {
        &self.values
    }

    pub fn seq_len(&self) -> usize {
        self.keys.shape()[1]
    }
}

impl IncrementalState for AttentionState {
    fn reorder(&mut self, new_order: &[usize]) -> Result<()> {
        let batch_size = self.keys.shape()[0];
        if let Some(&idx) = new_order.iter().find(|&&idx| idx >= batch_size) {
            bail!("reorder index {} is out of range for a batch of {}", idx, batch_size);
        }

        self.keys = self.keys.select(Axis(0), new_order);
        self.values = self.values.select(Axis(0), new_order);
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
