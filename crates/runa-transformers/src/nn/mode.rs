use rand::RngCore;

/// Execution mode threaded through every forward pass that may be stochastic.
///
/// Training-only behavior (dropout) reads its randomness from the generator
/// carried by `Train`, never from a global source, so two runs seeded the
/// same way produce the same output.
pub enum ForwardMode<'r> {
    /// Inference. Stochastic layers are the identity.
    Eval,
    /// Training, with the random generator used for dropout masks.
    Train(&'r mut dyn RngCore),
}

impl<'r> ForwardMode<'r> {
    pub fn train(rng: &'r mut dyn RngCore) -> Self {
        ForwardMode::Train(rng)
    }

    pub fn is_training(&self) -> bool {
        matches!(self, ForwardMode::Train(_))
    }

    /// The random generator, if in training mode.
    pub fn rng(&mut self) -> Option<&mut (dyn RngCore + 'r)> {
        match self {
            ForwardMode::Train(rng) => Some(&mut **rng),
            ForwardMode::Eval => None,
        }
    }
}

impl std::fmt::Debug for ForwardMode<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ForwardMode::Eval => write!(f, "Eval"),
            ForwardMode::Train(_) => write!(f, "Train"),
        }
    }
}
