//! Venue quoting and best-price selection

pub mod random;
mod router;

pub use random::{RandomSource, SequenceRandom, StdRandom};
pub use router::{
    min_amount_out, select_best, Quote, QuoteResult, QuoteRouter, QuoteSource, Venue,
    DEFAULT_SLIPPAGE_PCT,
};

#[cfg(test)]
pub use router::MockQuoteSource;
