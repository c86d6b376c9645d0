//! Encoding, pooling and the session that ties them together.

pub mod engine;
pub mod pool;
pub mod pooling;
pub mod session;

pub use engine::{Encoder, HiddenStates};
pub use pool::WorkerPool;
pub use pooling::{l2_normalize, nearest, pool, Embedding};
pub use session::{BatchMode, Session};
