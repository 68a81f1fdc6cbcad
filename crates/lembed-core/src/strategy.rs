//! Long-text strategies and their resolution into concrete decode plans.
//!
//! A [`Strategy`] is what callers ask for; a [`Plan`] is what gets executed.
//! `Plan` has no `Auto` variant, so an unresolved strategy can never reach
//! the executor.

use std::fmt;
use std::num::NonZeroUsize;
use std::ops::Range;
use std::str::FromStr;

use serde::Deserialize;

use crate::error::{EmbedError, EmbedResult};

/// Lines above which text counts as structured.
const STRUCTURED_LINES: usize = 10;
/// Sentence terminators above which text counts as structured.
const STRUCTURED_SENTENCES: usize = 20;

const SENTENCE_TERMINATORS: &[char] = &['.', '!', '?', '。', '！', '？'];
const STRATEGY_FORMS: &str = "auto, truncate, chunk:<max>:<overlap> or window:<size>";

/// How to embed a token sequence longer than the context window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(try_from = "String")]
pub enum Strategy {
    /// Keep only the first `context_size` tokens.
    Truncate,
    /// Overlapping fixed-size chunks, averaged.
    Chunk { max_chunk_size: usize, overlap: usize },
    /// Head and tail windows of `window_size / 2` tokens each, averaged.
    SlidingWindow { window_size: usize },
    /// Pick one of the above from the overflow ratio and text structure.
    #[default]
    Auto,
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Truncate => write!(f, "truncate"),
            Self::Chunk {
                max_chunk_size,
                overlap,
            } => write!(f, "chunk:{max_chunk_size}:{overlap}"),
            Self::SlidingWindow { window_size } => write!(f, "window:{window_size}"),
            Self::Auto => write!(f, "auto"),
        }
    }
}

impl FromStr for Strategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_lowercase();
        let mut parts = lower.split(':');
        let kind = parts.next().unwrap_or_default();
        let args: Vec<&str> = parts.collect();

        let num = |raw: &str| -> Result<usize, String> {
            raw.parse::<usize>()
                .map_err(|_| format!("invalid number in strategy '{s}': {raw}"))
        };

        match (kind, args.as_slice()) {
            ("auto", []) => Ok(Self::Auto),
            ("truncate", []) => Ok(Self::Truncate),
            ("chunk", [max, overlap]) => Ok(Self::Chunk {
                max_chunk_size: num(*max)?,
                overlap: num(*overlap)?,
            }),
            ("window" | "sliding-window", [size]) => Ok(Self::SlidingWindow {
                window_size: num(*size)?,
            }),
            _ => Err(format!("invalid strategy: {s} (expected {STRATEGY_FORMS})")),
        }
    }
}

impl TryFrom<String> for Strategy {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl Strategy {
    /// Check explicit sizes against `context_size` without any input.
    ///
    /// Rejects a zero context, a zero-sized chunk or window, and a chunk
    /// whose overlap leaves no positive stride once clamped to the context.
    pub fn validate(&self, context_size: usize) -> EmbedResult<()> {
        if context_size == 0 {
            return Err(EmbedError::Config("context size must be at least 1".into()));
        }
        match *self {
            Self::Chunk {
                max_chunk_size,
                overlap,
            } => ChunkPlan::new(max_chunk_size.min(context_size), overlap, overlap).map(|_| ()),
            Self::SlidingWindow { window_size: 0 } => {
                Err(EmbedError::Config("window size must be at least 1".into()))
            }
            _ => Ok(()),
        }
    }
}

/// Cheap structural features of the source text, used by `Auto`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StructuralSignal {
    pub line_count: usize,
    pub sentence_terminators: usize,
}

impl StructuralSignal {
    pub fn from_text(text: &str) -> Self {
        Self {
            line_count: text.lines().count(),
            sentence_terminators: text.chars().filter(|c| SENTENCE_TERMINATORS.contains(c)).count(),
        }
    }

    pub fn is_high(&self) -> bool {
        self.line_count > STRUCTURED_LINES || self.sentence_terminators > STRUCTURED_SENTENCES
    }
}

/// Overlapping fixed-size chunks with a positive stride.
///
/// Only constructible through [`ChunkPlan::new`] or strategy resolution, so
/// `overlap < chunk_size` always holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkPlan {
    chunk_size: usize,
    stride: NonZeroUsize,
    /// A trailing remainder is decoded only if longer than this.
    min_tail: usize,
}

impl ChunkPlan {
    pub fn new(chunk_size: usize, overlap: usize, min_tail: usize) -> EmbedResult<Self> {
        if chunk_size == 0 {
            return Err(EmbedError::Config("chunk size must be at least 1".into()));
        }
        let stride = chunk_size
            .checked_sub(overlap)
            .and_then(NonZeroUsize::new)
            .ok_or_else(|| {
                EmbedError::Config(format!(
                    "chunk overlap {overlap} leaves no stride for chunk size {chunk_size}"
                ))
            })?;
        Ok(Self {
            chunk_size,
            stride,
            min_tail,
        })
    }

    /// Sizes picked by `Auto`; the stride floors at 1.
    fn clamped(chunk_size: usize, overlap: usize) -> Self {
        let chunk_size = chunk_size.max(1);
        Self {
            chunk_size,
            stride: NonZeroUsize::new(chunk_size.saturating_sub(overlap))
                .unwrap_or(NonZeroUsize::MIN),
            min_tail: overlap,
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn overlap(&self) -> usize {
        self.chunk_size - self.stride.get()
    }

    pub fn stride(&self) -> usize {
        self.stride.get()
    }

    pub fn min_tail(&self) -> usize {
        self.min_tail
    }

    fn windows(&self, len: usize) -> Vec<Range<usize>> {
        let mut out = Vec::new();
        let mut offset = 0;
        while offset + self.chunk_size <= len {
            out.push(offset..offset + self.chunk_size);
            offset += self.stride.get();
        }
        if offset < len && (len - offset > self.min_tail || out.is_empty()) {
            out.push(offset..len);
        }
        out
    }
}

/// A concrete, executable decode plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Plan {
    Truncate { limit: usize },
    Chunk(ChunkPlan),
    SlidingWindow { window_size: usize },
}

impl Plan {
    /// Token ranges to decode, in order, for a sequence of `len` tokens.
    pub fn windows(&self, len: usize) -> Vec<Range<usize>> {
        match self {
            Self::Truncate { limit } => vec![0..(*limit).min(len)],
            Self::Chunk(chunk) => chunk.windows(len),
            Self::SlidingWindow { window_size } => {
                let half = (window_size / 2).max(1).min(len);
                vec![0..half, len - half..len]
            }
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Truncate { .. } => "truncate",
            Self::Chunk(_) => "chunk",
            Self::SlidingWindow { .. } => "sliding-window",
        }
    }
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Truncate { limit } => write!(f, "truncate(limit={limit})"),
            Self::Chunk(chunk) => write!(
                f,
                "chunk(size={}, overlap={}, stride={}, min_tail={})",
                chunk.chunk_size(),
                chunk.overlap(),
                chunk.stride(),
                chunk.min_tail()
            ),
            Self::SlidingWindow { window_size } => write!(f, "sliding-window(size={window_size})"),
        }
    }
}

/// Overflow ratio `token_count / context_size`.
pub fn overflow_ratio(token_count: usize, context_size: usize) -> f64 {
    token_count as f64 / context_size.max(1) as f64
}

/// Choose a concrete plan for `Auto`. Pure in its three inputs.
///
/// Sizes are clamped to `1..=context_size`; the chunk tail threshold is the
/// overlap.
pub fn resolve_auto(token_count: usize, context_size: usize, signal: StructuralSignal) -> Plan {
    let ctx = context_size.max(1);
    let clamp = |n: usize| n.clamp(1, ctx);
    let chunk = |chunk_size: usize, overlap: usize| {
        Plan::Chunk(ChunkPlan::clamped(clamp(chunk_size), overlap))
    };
    let window = Plan::SlidingWindow {
        window_size: clamp(ctx * 4 / 5),
    };

    let ratio = overflow_ratio(token_count, ctx);
    if ratio < 1.5 {
        window
    } else if ratio < 3.0 {
        if signal.is_high() {
            chunk(ctx * 3 / 4, ctx / 8)
        } else {
            window
        }
    } else {
        chunk(ctx * 2 / 3, ctx / 6)
    }
}

/// Turn a strategy into a plan for `token_count` tokens.
///
/// `min_tail` overrides the chunk tail threshold, which otherwise equals
/// the overlap. Fails with `Config` on a zero context size, a zero-sized
/// window or chunk, or a chunk whose stride would not be positive.
pub fn resolve(
    strategy: Strategy,
    token_count: usize,
    context_size: usize,
    signal: StructuralSignal,
    min_tail: Option<usize>,
) -> EmbedResult<Plan> {
    strategy.validate(context_size)?;

    let plan = match strategy {
        Strategy::Auto => resolve_auto(token_count, context_size, signal),
        Strategy::Truncate => Plan::Truncate {
            limit: context_size,
        },
        Strategy::Chunk {
            max_chunk_size,
            overlap,
        } => Plan::Chunk(ChunkPlan::new(
            max_chunk_size.min(context_size),
            overlap,
            overlap,
        )?),
        Strategy::SlidingWindow { window_size } => Plan::SlidingWindow {
            window_size: window_size.min(context_size),
        },
    };

    Ok(match (plan, min_tail) {
        (Plan::Chunk(chunk), Some(min_tail)) => Plan::Chunk(ChunkPlan { min_tail, ..chunk }),
        (plan, _) => plan,
    })
}
