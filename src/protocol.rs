//! TCP frame protocol between a sensor bridge and the server.
//!
//! Length-prefixed bincode values. The bridge only ever sends; the server only
//! ever receives.

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tokio::net::TcpStream;
use tokio_util::codec::{Framed, LengthDelimitedCodec};

use crate::error::FrameError;
use crate::skeleton::SkeletalFrame;

/// Upper bound on one encoded message
pub const MAX_FRAME_LENGTH: usize = 1024 * 1024;

/// Bridge → server
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub enum SensorMessage {
    Frame(SkeletalFrame),
    SetDancerSwap(bool),
}

pub type MessageStream = Framed<TcpStream, LengthDelimitedCodec>;

pub fn message_stream(stream: TcpStream) -> MessageStream {
    let codec = LengthDelimitedCodec::builder()
        .max_frame_length(MAX_FRAME_LENGTH)
        .new_codec();
    Framed::new(stream, codec)
}

pub async fn send_message<T: Serialize>(stream: &mut MessageStream, msg: &T) -> Result<(), FrameError> {
    let data = bincode::serialize(msg)?;
    stream.send(Bytes::from(data)).await?;
    Ok(())
}

/// Next message, or `None` once the peer has closed the connection
pub async fn recv_message<T: DeserializeOwned>(stream: &mut MessageStream) -> Result<Option<T>, FrameError> {
    match stream.next().await {
        Some(Ok(bytes)) => Ok(Some(bincode::deserialize(&bytes)?)),
        Some(Err(e)) => Err(e.into()),
        None => Ok(None),
    }
}
