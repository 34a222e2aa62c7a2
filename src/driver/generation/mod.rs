use std::cmp::Ordering;
use std::sync::Arc;
use std::time::Instant;

use candle_core::{Tensor, D};
use eyre::{Error as E, Result};
use sqlcoder_driver::Oracle;

use crate::driver::model::{Model, COMPUTE_DTYPE};

pub const NUM_BEAMS: usize = 4;
pub const MAX_NEW_TOKENS: usize = 200;
pub const LENGTH_PENALTY: f32 = 1.0;

/// Deterministic beam search over a loaded model.
///
/// Each call starts from a fresh copy of the weights handle, so calls do not
/// share KV cache state. Sequences are decoded one beam at a time, which means
/// no padding is ever needed; the pad token is the EOS token.
pub struct TextGenerator {
    model: Arc<Model>,
    search: BeamSearch,
}

impl TextGenerator {
    pub fn new(model: Arc<Model>) -> Self {
        let search = BeamSearch {
            num_beams: NUM_BEAMS,
            max_new_tokens: MAX_NEW_TOKENS,
            length_penalty: LENGTH_PENALTY,
            eos_token: model.eos_token,
        };

        Self { model, search }
    }
}

impl Oracle for TextGenerator {
    #[tracing::instrument(skip_all, fields(prompt_len = prompt.len()))]
    fn complete(&self, prompt: &str) -> Result<String> {
        let model = &self.model;

        let prompt_tokens = model
            .tokenizer
            .encode(prompt, true)
            .map_err(E::msg)?
            .get_ids()
            .to_vec();

        let prompt_len = prompt_tokens.len();
        let start = Instant::now();

        let mut weights = model.weights.clone();
        let input = Tensor::new(prompt_tokens.as_slice(), &model.device)?.unsqueeze(0)?;
        let first = log_probs(&weights.forward(&input, 0)?)?;

        tracing::debug!(tokens = prompt_len, elapsed = ?start.elapsed(), "prompt processed");

        let generated = self.search.run(weights, first, |weights, token, index| {
            let input = Tensor::new(&[token], &model.device)?.unsqueeze(0)?;
            log_probs(&weights.forward(&input, prompt_len + index)?)
        })?;

        tracing::info!(
            new_tokens = generated.len(),
            elapsed = ?start.elapsed(),
            "generation finished"
        );

        let mut sequence = prompt_tokens;
        sequence.extend_from_slice(&generated);

        model.tokenizer.decode(&sequence, true).map_err(E::msg)
    }
}

fn log_probs(logits: &Tensor) -> Result<Vec<f32>> {
    let logits = logits.squeeze(0)?.to_dtype(COMPUTE_DTYPE)?;
    let log_probs = candle_nn::ops::log_softmax(&logits, D::Minus1)?;

    Ok(log_probs.to_vec1::<f32>()?)
}

/// Beam search parameters. Decoding is greedy within the beams, no sampling.
#[derive(Debug, Clone)]
pub struct BeamSearch {
    pub num_beams: usize,
    pub max_new_tokens: usize,
    /// Finished sequences are scored `sum_log_prob / len^length_penalty`.
    pub length_penalty: f32,
    pub eos_token: u32,
}

struct Beam<S> {
    state: S,
    tokens: Vec<u32>,
    log_prob: f32,
    /// Log-probabilities of the next token, once `state` has consumed the
    /// last entry of `tokens`.
    next: Option<Vec<f32>>,
}

impl BeamSearch {
    /// Run the search and return the best continuation, without EOS.
    ///
    /// `first` holds the next-token log-probabilities after the prompt.
    /// `step` feeds one token into a state and returns the log-probabilities
    /// that follow; its last argument is the number of tokens generated
    /// before `token`. States are cloned whenever a beam forks.
    pub fn run<S, F>(&self, state: S, first: Vec<f32>, mut step: F) -> Result<Vec<u32>>
    where
        S: Clone,
        F: FnMut(&mut S, u32, usize) -> Result<Vec<f32>>,
    {
        let num_beams = self.num_beams.max(1);

        let mut finished = Hypotheses::new(num_beams, self.length_penalty);
        let mut beams = vec![Beam {
            state,
            tokens: vec![],
            log_prob: 0.0,
            next: Some(first),
        }];

        for cur_len in 0..self.max_new_tokens {
            for beam in beams.iter_mut() {
                if beam.next.is_none() {
                    let (&token, before) = beam
                        .tokens
                        .split_last()
                        .ok_or_else(|| eyre::eyre!("beam without tokens has no scores"))?;
                    beam.next = Some(step(&mut beam.state, token, before.len())?);
                }
            }

            let mut candidates = vec![];

            for (index, beam) in beams.iter().enumerate() {
                let Some(next) = &beam.next else { continue };

                for (token, log_prob) in top_k(next, 2 * num_beams) {
                    candidates.push((beam.log_prob + log_prob, index, token));
                }
            }

            candidates.sort_by(|a, b| {
                b.0.total_cmp(&a.0)
                    .then(a.1.cmp(&b.1))
                    .then(a.2.cmp(&b.2))
            });
            candidates.truncate(2 * num_beams);

            let mut next_beams = Vec::with_capacity(num_beams);

            for (rank, (log_prob, index, token)) in candidates.into_iter().enumerate() {
                let parent = &beams[index];

                if token == self.eos_token {
                    if rank < num_beams {
                        finished.add(parent.tokens.clone(), log_prob);
                    }
                    continue;
                }

                let mut tokens = parent.tokens.clone();
                tokens.push(token);

                next_beams.push(Beam {
                    state: parent.state.clone(),
                    tokens,
                    log_prob,
                    next: None,
                });

                if next_beams.len() == num_beams {
                    break;
                }
            }

            beams = next_beams;

            let Some(best) = beams.first() else { break };

            if finished.is_done(best.log_prob, cur_len + 1) {
                break;
            }
        }

        for beam in beams {
            finished.add(beam.tokens, beam.log_prob);
        }

        Ok(finished.best().unwrap_or_default())
    }
}

/// The `k` best `(token, log_prob)` pairs, best first. Ties go to the lower
/// token id.
fn top_k(log_probs: &[f32], k: usize) -> Vec<(u32, f32)> {
    let mut ranked = log_probs
        .iter()
        .enumerate()
        .map(|(token, &log_prob)| (token as u32, log_prob))
        .collect::<Vec<_>>();

    ranked.sort_unstable_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
    ranked.truncate(k);
    ranked
}

/// The `capacity` best finished sequences seen so far.
struct Hypotheses {
    capacity: usize,
    length_penalty: f32,
    entries: Vec<(f32, Vec<u32>)>,
}

impl Hypotheses {
    fn new(capacity: usize, length_penalty: f32) -> Self {
        Self {
            capacity,
            length_penalty,
            entries: Vec::with_capacity(capacity + 1),
        }
    }

    fn score(&self, log_prob: f32, len: usize) -> f32 {
        log_prob / (len.max(1) as f32).powf(self.length_penalty)
    }

    fn worst(&self) -> Option<f32> {
        self.entries
            .iter()
            .map(|(score, _)| *score)
            .min_by(f32::total_cmp)
    }

    fn add(&mut self, tokens: Vec<u32>, log_prob: f32) {
        let score = self.score(log_prob, tokens.len());

        if self.entries.len() >= self.capacity
            && self.worst().is_some_and(|worst| score <= worst)
        {
            return;
        }

        self.entries.push((score, tokens));

        if self.entries.len() > self.capacity {
            if let Some(worst) = self
                .entries
                .iter()
                .enumerate()
                .min_by(|a, b| a.1 .0.total_cmp(&b.1 .0))
                .map(|(index, _)| index)
            {
                self.entries.remove(worst);
            }
        }
    }

    /// No live beam can still beat the worst kept hypothesis.
    fn is_done(&self, best_live_log_prob: f32, cur_len: usize) -> bool {
        if self.entries.len() < self.capacity {
            return false;
        }

        self.worst()
            .is_some_and(|worst| worst >= self.score(best_live_log_prob, cur_len))
    }

    /// Highest score wins; on a tie the earlier hypothesis is kept.
    fn best(self) -> Option<Vec<u32>> {
        self.entries
            .into_iter()
            .fold(None, |best: Option<(f32, Vec<u32>)>, (score, tokens)| match best {
                Some((best_score, _)) if best_score.total_cmp(&score) != Ordering::Less => best,
                _ => Some((score, tokens)),
            })
            .map(|(_, tokens)| tokens)
    }
}
