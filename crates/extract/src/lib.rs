//! # forgeloop Extract
//!
//! Incremental extraction of structure from a responder's text stream.
//!
//! Text arrives in fragments split at arbitrary points. The extractors here
//! buffer only what they must: a partial delimiter at the end of the input,
//! or an object whose closing brace hasn't arrived. Each `feed` returns the
//! events that fragment fully determines, in input order.
//!
//! - [`PairedTagExtractor`]: the reserved `<boltArtifact …>` wrapper.
//! - [`BalancedExtractor`]: `{"type": …}` objects, quote and escape aware.
//! - [`ActionNormalizer`]: decoded objects to typed, de-duplicated actions.
//! - [`StreamExtractor`]: the three combined for one run.

pub mod balanced;
pub mod normalizer;
pub mod paired_tag;
pub mod pipeline;

pub use balanced::{BalancedExtractor, DecodedObject};
pub use normalizer::ActionNormalizer;
pub use paired_tag::{DEFAULT_WRAPPER_TAG, Mode, PairedTagExtractor, parse_header};
pub use pipeline::StreamExtractor;
