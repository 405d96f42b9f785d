pub mod connection;
pub mod controller;
pub mod error;

pub use connection::{
    parse_stream_url, ConnectionLost, ConnectionManager, ConnectionSignal, ConnectionState,
    DeltaSink,
};
pub use controller::{LinkStatus, RunBoard, ViewController};
pub use error::LiveError;
