
use std::collections::VecDeque;
use std::io::IoSlice;
use std::time::Duration;

use bytes::{Buf, Bytes, BytesMut};
use log::{trace, warn};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::chunk::{ChunkDecoder, ChunkEncoder};
use crate::commands::{
    decode_packet, event, AcknowledgementPacket, Encode, Packet, RequestNames,
    SetChunkSizePacket, SetWindowAckSizePacket, UserControlPacket,
};
use crate::error::{Error, Result};
use crate::message::{msg_type, RtmpMessage, MAX_CHUNK_SIZE, MIN_CHUNK_SIZE};

/// Acknowledgement bookkeeping for one direction.
#[derive(Debug, Default)]
struct AckWindow {
    window: u32,
    sequence_number: u32,
    nb_recv_bytes: u64,
}

/// The RTMP message layer over a tokio byte stream.
///
/// Owns the chunk codec for both directions, the inbound acknowledgement
/// window, and the automatic responses (acks and ping replies). Every
/// fully reassembled message is handed back to the caller after its
/// protocol-control side effects are applied.
#[derive(Debug)]
pub struct Protocol<S> {
    io: S,
    in_buf: BytesMut,
    decoder: ChunkDecoder,
    encoder: ChunkEncoder,
    requests: RequestNames,

    in_ack: AckWindow,
    out_ack: AckWindow,
    in_buffer_length: u32,

    /// When false, automatic responses queue until the next send.
    auto_response: bool,
    manual_queue: VecDeque<RtmpMessage>,

    nb_recv_bytes: u64,
    nb_send_bytes: u64,
    recv_timeout: Option<Duration>,
}

impl<S> Protocol<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(io: S) -> Self {
        Self {
            io,
            in_buf: BytesMut::with_capacity(16 * 1024),
            decoder: ChunkDecoder::new(),
            encoder: ChunkEncoder::new(),
            requests: RequestNames::default(),
            in_ack: AckWindow::default(),
            out_ack: AckWindow::default(),
            in_buffer_length: 0,
            auto_response: true,
            manual_queue: VecDeque::new(),
            nb_recv_bytes: 0,
            nb_send_bytes: 0,
            recv_timeout: None,
        }
    }

    pub fn io_mut(&mut self) -> &mut S {
        &mut self.io
    }

    pub fn into_inner(self) -> S {
        self.io
    }

    pub fn set_auto_response(&mut self, v: bool) {
        self.auto_response = v;
    }

    pub fn set_recv_timeout(&mut self, timeout: Option<Duration>) {
        self.recv_timeout = timeout;
    }

    pub fn recv_bytes(&self) -> u64 {
        self.nb_recv_bytes
    }

    pub fn send_bytes(&self) -> u64 {
        self.nb_send_bytes
    }

    pub fn in_chunk_size(&self) -> u32 {
        self.decoder.in_chunk_size()
    }

    pub fn out_chunk_size(&self) -> u32 {
        self.encoder.out_chunk_size()
    }

    /// Advertise the window we expect the peer to honor for our acks.
    pub fn set_in_window_ack_size(&mut self, ack_size: u32) {
        self.in_ack.window = ack_size;
    }

    /// Receive the next complete message, after applying its protocol
    /// side effects (chunk size, window size, ping response, ack
    /// emission).
    pub async fn recv_message(&mut self) -> Result<RtmpMessage> {
        loop {
            if let Some(msg) = self.decoder.poll_message(&mut self.in_buf)? {
                self.on_recv_message(&msg).await?;
                return Ok(msg);
            }
            self.grow().await?;
        }
    }

    async fn grow(&mut self) -> Result<()> {
        let timeout = self.recv_timeout;
        let n = match timeout {
            Some(t) => tokio::time::timeout(t, self.io.read_buf(&mut self.in_buf))
                .await
                .map_err(|_| Error::Timeout)??,
            None => self.io.read_buf(&mut self.in_buf).await?,
        };
        if n == 0 {
            return Err(Error::ConnectionClosed);
        }
        self.nb_recv_bytes += n as u64;
        Ok(())
    }

    /// Decode a received message into a typed packet, resolving
    /// `_result`/`_error` against the outstanding transaction ids.
    pub fn decode_packet(&mut self, msg: &RtmpMessage) -> Result<Packet> {
        decode_packet(&msg.header, &msg.payload, &mut self.requests)
    }

    async fn on_recv_message(&mut self, msg: &RtmpMessage) -> Result<()> {
        self.response_acknowledgement().await?;

        match msg.header.message_type {
            msg_type::SET_CHUNK_SIZE
            | msg_type::USER_CONTROL
            | msg_type::WINDOW_ACK_SIZE => {}
            _ => return Ok(()),
        }

        match self.decode_packet(msg)? {
            Packet::WindowAckSize(pkt) => {
                if pkt.window_size > 0 {
                    self.out_ack.window = pkt.window_size;
                }
            }
            Packet::SetChunkSize(pkt) => {
                // Oversize chunk sizes are accepted in the wild; sizes
                // below the minimum break framing and must be rejected.
                if pkt.chunk_size < MIN_CHUNK_SIZE || pkt.chunk_size > MAX_CHUNK_SIZE {
                    warn!(
                        "accept chunk size {}, expect [{MIN_CHUNK_SIZE}, {MAX_CHUNK_SIZE}]",
                        pkt.chunk_size
                    );
                }
                if pkt.chunk_size < MIN_CHUNK_SIZE {
                    return Err(Error::ChunkSizeTooSmall(pkt.chunk_size));
                }
                self.decoder.set_in_chunk_size(pkt.chunk_size);
            }
            Packet::UserControl(pkt) => {
                if pkt.event_type == event::SET_BUFFER_LENGTH {
                    self.in_buffer_length = pkt.extra_data;
                }
                if pkt.event_type == event::PING_REQUEST {
                    self.response_ping(pkt.event_data).await?;
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// Emit an Acknowledgement once the inbound byte counter advances by
    /// half the window; the sequence rolls over past 0xF0000000.
    async fn response_acknowledgement(&mut self) -> Result<()> {
        if self.in_ack.window == 0 {
            return Ok(());
        }
        let delta = (self.nb_recv_bytes - self.in_ack.nb_recv_bytes) as u32;
        if delta < self.in_ack.window / 2 {
            return Ok(());
        }
        self.in_ack.nb_recv_bytes = self.nb_recv_bytes;

        let mut sequence_number = self.in_ack.sequence_number.wrapping_add(delta);
        if sequence_number > 0xF000_0000 {
            sequence_number = delta;
        }
        self.in_ack.sequence_number = sequence_number;

        let msg = AcknowledgementPacket::new(sequence_number).to_message(0);
        if !self.auto_response {
            self.manual_queue.push_back(msg);
            return Ok(());
        }
        self.do_send_messages(&[msg]).await
    }

    async fn response_ping(&mut self, timestamp: u32) -> Result<()> {
        trace!("ping request, respond with timestamp {timestamp}");
        let msg = UserControlPacket::new(event::PING_RESPONSE, timestamp).to_message(0);
        if !self.auto_response {
            self.manual_queue.push_back(msg);
            return Ok(());
        }
        self.do_send_messages(&[msg]).await
    }

    /// Flush responses queued while `auto_response` was off.
    pub async fn manual_response_flush(&mut self) -> Result<()> {
        while let Some(msg) = self.manual_queue.pop_front() {
            self.do_send_messages(&[msg]).await?;
        }
        Ok(())
    }

    pub async fn send_message(&mut self, msg: RtmpMessage) -> Result<()> {
        self.send_messages(&[msg]).await
    }

    pub async fn send_messages(&mut self, msgs: &[RtmpMessage]) -> Result<()> {
        self.do_send_messages(msgs).await?;
        self.manual_response_flush().await
    }

    async fn do_send_messages(&mut self, msgs: &[RtmpMessage]) -> Result<()> {
        for batch in self.encoder.encode(msgs) {
            let mut batch: VecDeque<Bytes> = batch.into();
            while !batch.is_empty() {
                let slices: Vec<IoSlice<'_>> =
                    batch.iter().map(|b| IoSlice::new(b)).collect();
                let mut n = self.io.write_vectored(&slices).await?;
                self.nb_send_bytes += n as u64;
                while n > 0 {
                    let front = batch.front_mut().expect("bytes written beyond batch");
                    if front.len() <= n {
                        n -= front.len();
                        batch.pop_front();
                    } else {
                        front.advance(n);
                        n = 0;
                    }
                }
            }
        }
        self.io.flush().await?;
        Ok(())
    }

    /// Send a typed packet, then apply its send-side effects: transaction
    /// bookkeeping for request commands, chunk-size and window updates for
    /// protocol controls.
    pub async fn send_packet<P: Encode>(&mut self, packet: &P, stream_id: u32) -> Result<()> {
        let msg = packet.to_message(stream_id);
        let message_type = msg.header.message_type;
        let payload = msg.payload.clone();
        self.send_messages(&[msg]).await?;
        self.on_send_packet(packet, message_type, &payload);
        Ok(())
    }

    fn on_send_packet<P: Encode>(&mut self, packet: &P, message_type: u8, payload: &Bytes) {
        if let Some((transaction_id, name)) = packet.request_name() {
            self.requests.record(transaction_id, name);
        }
        match message_type {
            msg_type::SET_CHUNK_SIZE => {
                if payload.len() >= 4 {
                    let size =
                        u32::from_be_bytes([payload[0], payload[1], payload[2], payload[3]]);
                    self.encoder.set_out_chunk_size(size);
                }
            }
            msg_type::WINDOW_ACK_SIZE => {
                if payload.len() >= 4 {
                    self.out_ack.window =
                        u32::from_be_bytes([payload[0], payload[1], payload[2], payload[3]]);
                }
            }
            _ => {}
        }
    }

    /// Convenience senders for the protocol controls.
    pub async fn send_set_chunk_size(&mut self, chunk_size: u32) -> Result<()> {
        self.send_packet(&SetChunkSizePacket::new(chunk_size), 0).await
    }

    pub async fn send_window_ack_size(&mut self, window: u32) -> Result<()> {
        self.send_packet(&SetWindowAckSizePacket::new(window), 0).await
    }
}
