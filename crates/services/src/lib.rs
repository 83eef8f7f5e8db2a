#![forbid(unsafe_code)]

pub mod capture;
pub mod config;
pub mod connection;
pub mod error;
pub mod health;
pub mod progress_store;
pub mod protocol;
pub mod sampler;
pub mod session_loop;
pub mod transport;

pub use sign_core::Clock;

pub use capture::{BlankFrameSource, FrameEncoder, FrameSource, JpegFrameEncoder, StillFrameSource};
pub use config::{TrainerConfig, TrainerSettings};
pub use connection::{ConnectionEvent, ConnectionManager, ConnectionState, ConnectionStats};
pub use error::{
    CaptureError, ConfigError, EncodeError, EndpointError, HealthError, ProtocolError,
    SessionLoopError, TransportError,
};
pub use health::HealthProbe;
pub use progress_store::ProgressStore;
pub use protocol::{Endpoint, Prediction, ServiceMessage};
pub use sampler::{FrameSampler, FrameSink, SamplerSettings, SamplerStats, TickOutcome};
pub use session_loop::{Command, SessionHandle, SessionLoop, SessionReport, UiEvent};
pub use transport::{Connector, InboundMessage, Link, LinkEvent, LinkPeer, WebSocketConnector};
