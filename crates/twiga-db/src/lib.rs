pub mod chunks;
pub mod migrations;
pub mod models;
pub mod store;

pub use chunks::{ChunkField, ChunkFilter, FilterValue, ScoredChunk};
pub use models::{
    Chunk, Class, Message, NewChunk, NewMessage, NewResource, Resource, User,
};
pub use store::TwigaStore;
