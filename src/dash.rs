//! DASH output: the MPD document and the fragment windows behind it.
//!
//! The fMP4 packager writes the init and media segments through the
//! fragment contract (tmp write, atomic rename); this module owns the
//! on-disk naming, the sliding windows, and the MPD refresh.

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use log::warn;

use crate::config::DashConfig;
use crate::error::Result;
use crate::fragment::{Fragment, FragmentWindow};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackKind {
    Video,
    Audio,
}

impl TrackKind {
    fn name(&self) -> &'static str {
        match self {
            TrackKind::Video => "video",
            TrackKind::Audio => "audio",
        }
    }
}

/// MPD writer for one stream.
pub struct MpdWriter {
    config: DashConfig,
    video_window: FragmentWindow,
    audio_window: FragmentWindow,
    /// `<path>/<vhost>/<app>/<stream>` per the on-disk layout.
    home: PathBuf,
    stream: String,
    availability_start: DateTime<Utc>,
}

impl std::fmt::Debug for MpdWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MpdWriter")
            .field("home", &self.home)
            .field("stream", &self.stream)
            .finish()
    }
}

impl MpdWriter {
    pub fn new(config: DashConfig, vhost: &str, app: &str, stream: &str) -> Self {
        let home = PathBuf::from(&config.path)
            .join(vhost)
            .join(app)
            .join(stream);
        Self {
            config,
            video_window: FragmentWindow::new(),
            audio_window: FragmentWindow::new(),
            home,
            stream: stream.to_owned(),
            availability_start: Utc::now(),
        }
    }

    pub fn mpd_path(&self) -> PathBuf {
        self.home.join(format!("{}.mpd", self.stream))
    }

    /// Path of the init segment for a track.
    pub fn init_path(&self, kind: TrackKind) -> PathBuf {
        self.home
            .join(&self.stream)
            .join(format!("{}-init.mp4", kind.name()))
    }

    /// Path of media segment `number` for a track.
    pub fn segment_path(&self, kind: TrackKind, number: u64) -> PathBuf {
        self.home
            .join(&self.stream)
            .join(format!("{}-{}.m4s", kind.name(), number))
    }

    /// Register a published media segment, evicting past the timeshift
    /// window and refreshing the MPD.
    pub fn on_segment(
        &mut self,
        kind: TrackKind,
        number: u64,
        start_dts_ms: i64,
        duration: Duration,
    ) -> Result<()> {
        let mut fragment = Fragment::new();
        fragment.set_number(number);
        fragment.set_path(self.segment_path(kind, number));
        fragment.append(start_dts_ms);
        fragment.append(start_dts_ms + duration.as_millis() as i64);

        let timeshift = Duration::from_secs_f64(self.config.timeshift);
        let window = match kind {
            TrackKind::Video => &mut self.video_window,
            TrackKind::Audio => &mut self.audio_window,
        };
        window.append(fragment);
        window.shrink(timeshift);
        window.clear_expired(true);

        self.write_mpd()
    }

    /// Render and atomically publish the MPD.
    pub fn write_mpd(&self) -> Result<()> {
        fs::create_dir_all(&self.home)?;
        let mpd = self.render();
        let path = self.mpd_path();
        let tmp = path.with_extension("mpd.tmp");
        fs::write(&tmp, mpd)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn render(&self) -> String {
        let availability = self
            .availability_start
            .to_rfc3339_opts(SecondsFormat::Secs, true);
        let fragment_seconds = self.config.fragment;
        let update_period = self.config.update_period;
        let timeshift = self.config.timeshift;

        let mut adaptation_sets = String::new();
        for (kind, window, mime, codecs) in [
            (
                TrackKind::Video,
                &self.video_window,
                "video/mp4",
                "avc1.64001e",
            ),
            (TrackKind::Audio, &self.audio_window, "audio/mp4", "mp4a.40.2"),
        ] {
            if window.is_empty() {
                continue;
            }
            let start_number = window.first().map(|f| f.number()).unwrap_or(0);
            adaptation_sets.push_str(&format!(
                r#"    <AdaptationSet mimeType="{mime}" segmentAlignment="true">
      <Representation id="{id}" codecs="{codecs}" bandwidth="0">
        <SegmentTemplate initialization="{stream}/{id}-init.mp4" media="{stream}/{id}-$Number$.m4s" startNumber="{start_number}" duration="{duration}" timescale="1000"/>
      </Representation>
    </AdaptationSet>
"#,
                id = kind.name(),
                stream = self.stream,
                duration = (fragment_seconds * 1000.0) as u64,
            ));
        }

        format!(
            r#"<?xml version="1.0" encoding="utf-8"?>
<MPD xmlns="urn:mpeg:dash:schema:mpd:2011" profiles="urn:mpeg:dash:profile:isoff-live:2011" type="dynamic" availabilityStartTime="{availability}" minimumUpdatePeriod="PT{update_period}S" timeShiftBufferDepth="PT{timeshift}S" minBufferTime="PT{fragment_seconds}S">
  <Period start="PT0S">
{adaptation_sets}  </Period>
</MPD>
"#
        )
    }

    /// Delete every segment and the MPD.
    pub fn dispose(&mut self) {
        self.video_window.dispose();
        self.audio_window.dispose();
        let path = self.mpd_path();
        if path.exists() {
            if let Err(e) = fs::remove_file(&path) {
                warn!("unlink {}: {e}", path.display());
            }
        }
    }
}
