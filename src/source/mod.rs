mod consumer;
mod registry;


pub use consumer::{Consumer, ConsumerShared};
pub use registry::SourceRegistry;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Instant;

use bytes::Bytes;
use log::{debug, info, warn};

use flv::packet::MediaPacket;

use crate::bridge::CompositeBridge;
use crate::error::{Error, Result};

static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Allocate a context id, used for publishers and source ids.
pub fn next_context_id() -> u64 {
    NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed)
}

/// The protocol a source ingests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceKind {
    Rtmp,
    Rtc,
    Srt,
    Rtsp,
}

/// One queued item; the payload kind matches the source protocol.
#[derive(Debug, Clone)]
pub enum MediaItem {
    Packet(MediaPacket),
    Rtp(Box<rtp::Packet>),
    Srt(Bytes),
}

/// Cached codec configuration replayed to consumers that join
/// mid-stream.
#[derive(Debug, Default, Clone)]
pub struct SequenceHeaderCache {
    pub audio: Option<MediaPacket>,
    pub video: Option<MediaPacket>,
    pub metadata: Option<MediaPacket>,
}

#[derive(Debug)]
struct SourceInner {
    can_publish: bool,
    publisher_id: Option<u64>,
    source_id: u64,
    pre_source_id: u64,
    consumers: Vec<Weak<ConsumerShared>>,
    sequence_headers: SequenceHeaderCache,
    die_at: Option<Instant>,
}

/// The server-side representation of one logical stream.
///
/// Owned by the registry through `Arc`; consumers keep their own `Arc`
/// while registering a weak back-reference for fan-out. A source owns at
/// most one composite bridge feeding other sources.
pub struct Source {
    url: String,
    kind: SourceKind,
    inner: Mutex<SourceInner>,
    bridge: Mutex<Option<CompositeBridge>>,
}

impl std::fmt::Debug for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Source")
            .field("url", &self.url)
            .field("kind", &self.kind)
            .finish()
    }
}

impl Source {
    pub fn new(kind: SourceKind, url: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            url: url.into(),
            kind,
            inner: Mutex::new(SourceInner {
                can_publish: true,
                publisher_id: None,
                source_id: 0,
                pre_source_id: 0,
                consumers: Vec::new(),
                sequence_headers: SequenceHeaderCache::default(),
                die_at: None,
            }),
            bridge: Mutex::new(None),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn kind(&self) -> SourceKind {
        self.kind
    }

    /// Whether a publisher slot is free.
    pub fn can_publish(&self) -> bool {
        self.inner.lock().unwrap().can_publish
    }

    pub fn source_id(&self) -> u64 {
        self.inner.lock().unwrap().source_id
    }

    pub fn pre_source_id(&self) -> u64 {
        self.inner.lock().unwrap().pre_source_id
    }

    /// Claim the publisher slot. Fails when another publisher is active;
    /// idempotent for the same publisher.
    pub fn on_publish(&self, publisher_id: u64) -> Result<()> {
        {
            let mut inner = self.inner.lock().unwrap();
            if !inner.can_publish {
                if inner.publisher_id == Some(publisher_id) {
                    return Ok(());
                }
                return Err(Error::SourceBusy(self.url.clone()));
            }
            inner.can_publish = false;
            inner.publisher_id = Some(publisher_id);
            inner.die_at = None;
        }
        self.on_source_id_changed(publisher_id);
        info!("source {} published by {publisher_id}", self.url);

        if let Some(bridge) = self.bridge.lock().unwrap().as_mut() {
            bridge.on_publish(publisher_id);
        }
        Ok(())
    }

    /// Release the publisher slot; idempotent. With no consumers left the
    /// source becomes eligible for reaping.
    pub fn on_unpublish(&self) {
        {
            let mut inner = self.inner.lock().unwrap();
            if inner.can_publish {
                return;
            }
            inner.can_publish = true;
            inner.publisher_id = None;
            inner.sequence_headers = SequenceHeaderCache::default();
            if inner.consumers.is_empty() {
                inner.die_at = Some(Instant::now());
            }
        }
        info!("source {} unpublished", self.url);

        let mut bridge = self.bridge.lock().unwrap();
        if let Some(bridge) = bridge.as_mut() {
            bridge.on_unpublish();
        }
        *bridge = None;
    }

    /// Install the composite bridge; replaces any previous one.
    pub fn set_bridge(&self, bridge: CompositeBridge) {
        *self.bridge.lock().unwrap() = Some(bridge);
    }

    pub fn has_bridge(&self) -> bool {
        self.bridge.lock().unwrap().is_some()
    }

    /// Publish one media frame: refresh the caches, fan out to every
    /// consumer in insertion order, then drive the bridge.
    pub fn on_frame(&self, packet: MediaPacket) {
        let consumers = {
            let mut inner = self.inner.lock().unwrap();
            if packet.is_sequence_header() {
                if packet.is_video() {
                    inner.sequence_headers.video = Some(packet.clone());
                } else {
                    inner.sequence_headers.audio = Some(packet.clone());
                }
            } else if packet.is_script() {
                inner.sequence_headers.metadata = Some(packet.clone());
            }
            collect_consumers(&mut inner.consumers)
        };
        for consumer in &consumers {
            consumer.enqueue(MediaItem::Packet(packet.clone()));
        }

        if let Some(bridge) = self.bridge.lock().unwrap().as_mut() {
            bridge.on_frame(&packet);
        }
    }

    /// Publish one RTP packet (RTC/RTSP sources).
    pub fn on_rtp(&self, packet: rtp::Packet) {
        let consumers = {
            let mut inner = self.inner.lock().unwrap();
            collect_consumers(&mut inner.consumers)
        };
        for consumer in &consumers {
            consumer.enqueue(MediaItem::Rtp(Box::new(packet.clone())));
        }

        if let Some(bridge) = self.bridge.lock().unwrap().as_mut() {
            bridge.on_rtp(&packet);
        }
    }

    /// Publish one SRT datagram of TS packets.
    pub fn on_packet(&self, data: Bytes) {
        let consumers = {
            let mut inner = self.inner.lock().unwrap();
            collect_consumers(&mut inner.consumers)
        };
        for consumer in &consumers {
            consumer.enqueue(MediaItem::Srt(data.clone()));
        }

        if let Some(bridge) = self.bridge.lock().unwrap().as_mut() {
            bridge.on_packet(&data);
        }
    }

    /// Create a consumer, replaying cached metadata and sequence headers
    /// so a joiner can decode from the next keyframe.
    pub fn create_consumer(self: &Arc<Self>) -> Consumer {
        let consumer = Consumer::new(self.clone());
        let replay = {
            let mut inner = self.inner.lock().unwrap();
            inner.consumers.push(Arc::downgrade(consumer.shared()));
            inner.die_at = None;
            inner.sequence_headers.clone()
        };
        if self.kind == SourceKind::Rtmp {
            for cached in [replay.metadata, replay.video, replay.audio]
                .into_iter()
                .flatten()
            {
                consumer.shared().enqueue(MediaItem::Packet(cached));
            }
        }
        debug!("consumer joined source {}", self.url);
        consumer
    }

    /// Called by a consumer on destroy; the last consumer of an
    /// unpublished source starts the death clock.
    pub(crate) fn on_consumer_destroy(&self, shared: &Arc<ConsumerShared>) {
        let mut inner = self.inner.lock().unwrap();
        inner
            .consumers
            .retain(|w| w.upgrade().map(|c| !Arc::ptr_eq(&c, shared)).unwrap_or(false));
        if inner.consumers.is_empty() && inner.can_publish {
            inner.die_at = Some(Instant::now());
        }
    }

    /// Adopt a new source id, marking every consumer so its context
    /// follows on the next dequeue. No-op when unchanged.
    pub fn on_source_id_changed(&self, id: u64) {
        let mut inner = self.inner.lock().unwrap();
        if inner.source_id == id {
            return;
        }
        if inner.pre_source_id == 0 {
            inner.pre_source_id = id;
        }
        inner.source_id = id;
        let consumers = collect_consumers(&mut inner.consumers);
        drop(inner);
        for consumer in consumers {
            consumer.mark_source_id_changed();
        }
    }

    pub fn sequence_headers(&self) -> SequenceHeaderCache {
        self.inner.lock().unwrap().sequence_headers.clone()
    }

    pub fn consumer_count(&self) -> usize {
        let mut inner = self.inner.lock().unwrap();
        collect_consumers(&mut inner.consumers).len()
    }

    /// A source is dead when nobody publishes, nobody consumes, and the
    /// death clock has outrun the cleanup delay.
    pub fn stream_is_dead(&self, cleanup_delay: std::time::Duration, now: Instant) -> bool {
        let mut inner = self.inner.lock().unwrap();
        if !inner.can_publish {
            return false;
        }
        if !collect_consumers(&mut inner.consumers).is_empty() {
            return false;
        }
        match inner.die_at {
            Some(die_at) => now.duration_since(die_at) > cleanup_delay,
            None => {
                // Never published nor consumed since creation; arm the
                // clock now so an idle source still expires.
                inner.die_at = Some(now);
                false
            }
        }
    }

    /// Close every consumer, e.g. when the server shuts the stream.
    pub fn close_consumers(&self) {
        let consumers = {
            let mut inner = self.inner.lock().unwrap();
            collect_consumers(&mut inner.consumers)
        };
        if !consumers.is_empty() {
            warn!("closing {} consumers of {}", consumers.len(), self.url);
        }
        for consumer in consumers {
            consumer.close();
        }
    }
}

/// Upgrade live consumers, dropping dead weak entries in place.
fn collect_consumers(consumers: &mut Vec<Weak<ConsumerShared>>) -> Vec<Arc<ConsumerShared>> {
    consumers.retain(|w| w.strong_count() > 0);
    consumers.iter().filter_map(|w| w.upgrade()).collect()
}
