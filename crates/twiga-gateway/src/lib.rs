pub mod bootstrap;
pub mod pipeline;
pub mod router;
pub mod server;
pub mod state;

pub use pipeline::MessagePipeline;
pub use server::GatewayServer;
