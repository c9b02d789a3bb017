//! The typed configuration surface the core consumes.
//!
//! Parsing configuration files is the caller's concern; the core reads
//! these structures only. Defaults mirror the values production servers
//! ship with.

use std::time::Duration;

use serde::Deserialize;

use rtmp::commands::BandwidthLimit;

fn default_chunk_size() -> u32 {
    60000
}

fn default_in_ack_size() -> u32 {
    2_500_000
}

fn default_peer_bandwidth() -> u32 {
    2_500_000
}

#[derive(Debug, Clone, Deserialize)]
pub struct RtmpConfig {
    /// Initial outbound chunk size announced after connect.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: u32,
    /// Advertised input window for acknowledgements.
    #[serde(default = "default_in_ack_size")]
    pub in_ack_size: u32,
    #[serde(default = "default_peer_bandwidth")]
    pub peer_bandwidth: u32,
}

impl Default for RtmpConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            in_ack_size: default_in_ack_size(),
            peer_bandwidth: default_peer_bandwidth(),
        }
    }
}

impl RtmpConfig {
    pub fn peer_bandwidth_limit(&self) -> BandwidthLimit {
        BandwidthLimit::Dynamic
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DtlsRole {
    #[default]
    Passive,
    Active,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
pub enum DtlsVersion {
    #[default]
    #[serde(rename = "auto")]
    Auto,
    #[serde(rename = "dtls1.0")]
    Dtls10,
    #[serde(rename = "dtls1.2")]
    Dtls12,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct RtcConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Bridge published RTMP streams into RTC sources.
    #[serde(default)]
    pub rtc_from_rtmp: bool,
    #[serde(default)]
    pub dtls_role: DtlsRole,
    #[serde(default)]
    pub dtls_version: DtlsVersion,
}

/// HTTP callback endpoints, each a list of URLs tried in order.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct HooksConfig {
    #[serde(default)]
    pub on_connect: Vec<String>,
    #[serde(default)]
    pub on_publish: Vec<String>,
    #[serde(default)]
    pub on_unpublish: Vec<String>,
    #[serde(default)]
    pub on_play: Vec<String>,
    #[serde(default)]
    pub on_stop: Vec<String>,
    #[serde(default)]
    pub on_close: Vec<String>,
    #[serde(default)]
    pub on_dvr: Vec<String>,
    #[serde(default)]
    pub on_hls: Vec<String>,
    /// GET with URL-template variables, unlike the POST hooks.
    #[serde(default)]
    pub on_hls_notify: Vec<String>,
}

fn default_dash_fragment() -> f64 {
    30.0
}

fn default_dash_update_period() -> f64 {
    150.0
}

fn default_dash_timeshift() -> f64 {
    300.0
}

fn default_dash_path() -> String {
    "./objs/nginx/html".to_owned()
}

fn default_dash_mpd_file() -> String {
    "[app]/[stream].mpd".to_owned()
}

fn default_dash_window_size() -> usize {
    5
}

fn default_dash_dispose() -> f64 {
    120.0
}

#[derive(Debug, Clone, Deserialize)]
pub struct DashConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Target fragment duration, seconds.
    #[serde(default = "default_dash_fragment")]
    pub fragment: f64,
    #[serde(default = "default_dash_update_period")]
    pub update_period: f64,
    #[serde(default = "default_dash_timeshift")]
    pub timeshift: f64,
    #[serde(default = "default_dash_path")]
    pub path: String,
    #[serde(default = "default_dash_mpd_file")]
    pub mpd_file: String,
    #[serde(default = "default_dash_window_size")]
    pub window_size: usize,
    /// Idle seconds before the stream's files are disposed.
    #[serde(default = "default_dash_dispose")]
    pub dispose: f64,
}

impl Default for DashConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            fragment: default_dash_fragment(),
            update_period: default_dash_update_period(),
            timeshift: default_dash_timeshift(),
            path: default_dash_path(),
            mpd_file: default_dash_mpd_file(),
            window_size: default_dash_window_size(),
            dispose: default_dash_dispose(),
        }
    }
}

impl DashConfig {
    /// Sources feeding DASH are reaped a bit later than the dispose
    /// delay so a final MPD refresh still finds them.
    pub fn cleanup_delay(&self) -> Duration {
        Duration::from_secs_f64(self.dispose * 1.1)
    }
}

fn default_hls_fragment() -> f64 {
    10.0
}

fn default_hls_window() -> f64 {
    60.0
}

fn default_hls_path() -> String {
    "./objs/nginx/html".to_owned()
}

#[derive(Debug, Clone, Deserialize)]
pub struct HlsConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Target segment duration, seconds.
    #[serde(default = "default_hls_fragment")]
    pub fragment: f64,
    /// Sliding playlist window, seconds.
    #[serde(default = "default_hls_window")]
    pub window: f64,
    #[serde(default = "default_hls_path")]
    pub path: String,
    /// AES-128 key, hex, empty for cleartext segments.
    #[serde(default)]
    pub aes_key: Option<[u8; 16]>,
    #[serde(default)]
    pub key_url: Option<String>,
}

impl Default for HlsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            fragment: default_hls_fragment(),
            window: default_hls_window(),
            path: default_hls_path(),
            aes_key: None,
            key_url: None,
        }
    }
}

fn default_srt_cleanup() -> f64 {
    3.0
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    /// Seconds an unpublished, consumer-less SRT source lingers.
    #[serde(default = "default_srt_cleanup")]
    pub srt_cleanup: f64,
    /// Same for RTSP sources.
    #[serde(default = "default_srt_cleanup")]
    pub rtsp_cleanup: f64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            srt_cleanup: default_srt_cleanup(),
            rtsp_cleanup: default_srt_cleanup(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub rtmp: RtmpConfig,
    #[serde(default)]
    pub rtc: RtcConfig,
    #[serde(default)]
    pub hooks: HooksConfig,
    #[serde(default)]
    pub hls: HlsConfig,
    #[serde(default)]
    pub dash: DashConfig,
    #[serde(default)]
    pub source: SourceConfig,
}
