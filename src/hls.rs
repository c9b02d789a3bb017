//! HLS output: TS segments cut on keyframes, a sliding playlist window,
//! and atomic publication of every file.

use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use log::{debug, warn};
use m3u8_rs::{Key, KeyMethod, MediaPlaylist, MediaSegment};

use flv::packet::MediaPacket;
use mpegts::TsMuxer;

use crate::config::HlsConfig;
use crate::error::Result;
use crate::fragment::{Fragment, FragmentWindow};

/// A finished segment, reported upward for the on_hls hook.
#[derive(Debug, Clone)]
pub struct SegmentInfo {
    pub path: PathBuf,
    pub ts_url: String,
    pub sequence_no: u64,
    pub duration: Duration,
}

/// One stream's HLS muxer.
pub struct HlsMuxer {
    config: HlsConfig,
    muxer: TsMuxer,
    window: FragmentWindow,
    current: Option<Fragment>,
    sequence_no: u64,

    dir: PathBuf,
    stream: String,
}

impl std::fmt::Debug for HlsMuxer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HlsMuxer")
            .field("dir", &self.dir)
            .field("stream", &self.stream)
            .field("sequence_no", &self.sequence_no)
            .finish()
    }
}

impl HlsMuxer {
    pub fn new(config: HlsConfig, app: &str, stream: &str) -> Self {
        let dir = PathBuf::from(&config.path).join(app);
        Self {
            config,
            muxer: TsMuxer::new(),
            window: FragmentWindow::new(),
            current: None,
            sequence_no: 0,
            dir,
            stream: stream.to_owned(),
        }
    }

    pub fn playlist_path(&self) -> PathBuf {
        self.dir.join(format!("{}.m3u8", self.stream))
    }

    fn segment_path(&self, number: u64) -> PathBuf {
        self.dir.join(format!("{}-{}.ts", self.stream, number))
    }

    /// Feed one FLV frame. Segments cut on video keyframes once the
    /// target duration is reached; a completed segment is returned for
    /// hook dispatch.
    pub fn write_frame(&mut self, packet: &MediaPacket) -> Result<Option<SegmentInfo>> {
        let mut finished = None;

        let should_cut = self.current.is_some()
            && packet.is_keyframe()
            && self
                .current
                .as_ref()
                .map(|f| f.duration() >= Duration::from_secs_f64(self.config.fragment))
                .unwrap_or(false);
        if should_cut {
            finished = self.close_segment()?;
        }

        if self.current.is_none() {
            self.open_segment()?;
        }
        if let Some(fragment) = &mut self.current {
            if packet.is_sequence_header() {
                fragment.set_sequence_header(true);
            }
            fragment.append(packet.timestamp);
        }
        self.muxer.write_frame(packet)?;
        Ok(finished)
    }

    fn open_segment(&mut self) -> Result<()> {
        let mut fragment = Fragment::new();
        fragment.set_number(self.sequence_no);
        fragment.set_path(self.segment_path(self.sequence_no));
        fragment.create_dir()?;
        self.sequence_no += 1;
        self.current = Some(fragment);
        Ok(())
    }

    /// Write the pending TS bytes to the tmp path, publish with a
    /// rename, then refresh the playlist. A write failure skips the
    /// segment and the stream continues.
    fn close_segment(&mut self) -> Result<Option<SegmentInfo>> {
        let Some(fragment) = self.current.take() else {
            return Ok(None);
        };

        let bytes = match self.config.aes_key {
            Some(key) => {
                let mut iv = [0u8; 16];
                iv[8..].copy_from_slice(&fragment.number().to_be_bytes());
                self.muxer.take_segment_encrypted(&key, &iv)
            }
            None => self.muxer.take_segment(),
        };
        if bytes.is_empty() {
            return Ok(None);
        }

        if let Err(e) = fs::write(fragment.tmp_path(), &bytes).and_then(|_| {
            fs::rename(fragment.tmp_path(), fragment.full_path())
        }) {
            warn!(
                "skip segment {}: {e}",
                fragment.full_path().display()
            );
            fragment.unlink_tmpfile();
            return Ok(None);
        }

        let info = SegmentInfo {
            path: fragment.full_path().to_owned(),
            ts_url: format!("{}-{}.ts", self.stream, fragment.number()),
            sequence_no: fragment.number(),
            duration: fragment.duration(),
        };
        debug!(
            "hls segment {} closed, {:.3}s",
            info.sequence_no,
            info.duration.as_secs_f64()
        );

        self.window.append(fragment);
        self.window
            .shrink(Duration::from_secs_f64(self.config.window));
        self.window.clear_expired(true);
        self.write_playlist()?;
        Ok(Some(info))
    }

    fn write_playlist(&self) -> Result<()> {
        let mut playlist = MediaPlaylist::default();
        playlist.target_duration = self.window.max_duration().as_secs_f64().ceil() as u64;
        playlist.media_sequence = self.window.first().map(|f| f.number()).unwrap_or(0);

        for fragment in self.window.iter() {
            let key = self.config.aes_key.and_then(|_| {
                self.config.key_url.as_ref().map(|uri| Key {
                    method: KeyMethod::AES128,
                    uri: Some(uri.clone()),
                    iv: Some(format!("0x{:032x}", fragment.number())),
                    keyformat: None,
                    keyformatversions: None,
                })
            });
            playlist.segments.push(MediaSegment {
                uri: format!("{}-{}.ts", self.stream, fragment.number()),
                duration: fragment.duration().as_secs_f64() as f32,
                key,
                ..Default::default()
            });
        }

        // tmp write + rename, like the segments themselves.
        let path = self.playlist_path();
        let tmp = path.with_extension("m3u8.tmp");
        let mut out = Vec::new();
        playlist
            .write_to(&mut out)
            .map_err(std::io::Error::other)?;
        let mut file = fs::File::create(&tmp)?;
        file.write_all(&out)?;
        drop(file);
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    /// Flush the pending segment, e.g. on unpublish.
    pub fn close(&mut self) -> Result<Option<SegmentInfo>> {
        self.close_segment()
    }

    /// Remove every file this muxer produced.
    pub fn dispose(&mut self) {
        if let Some(fragment) = self.current.take() {
            fragment.unlink_tmpfile();
        }
        self.window.dispose();
        let path = self.playlist_path();
        if path.exists() {
            if let Err(e) = fs::remove_file(&path) {
                warn!("unlink {}: {e}", path.display());
            }
        }
    }
}
