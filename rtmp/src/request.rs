use amf::Amf0Object;
use url::Url;

use crate::error::{Error, Result};

pub const DEFAULT_VHOST: &str = "__defaultVhost__";
pub const DEFAULT_PORT: u16 = 1935;

/// How the peer identified itself after connect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RtmpConnType {
    Unknown,
    Play,
    FmlePublish,
    FlashPublish,
    HaivisionPublish,
}

impl RtmpConnType {
    pub fn is_publish(&self) -> bool {
        matches!(
            self,
            RtmpConnType::FmlePublish | RtmpConnType::FlashPublish | RtmpConnType::HaivisionPublish
        )
    }
}

/// The parsed connect request: tcUrl fields plus the stream identified
/// later by play/publish.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Request {
    pub tc_url: String,
    pub page_url: String,
    pub swf_url: String,
    pub object_encoding: f64,

    pub schema: String,
    pub host: String,
    pub vhost: String,
    pub app: String,
    pub stream: String,
    pub port: u16,
    /// Raw query string carried by the tcUrl or the stream name.
    pub param: String,

    pub args: Option<Amf0Object>,
    /// Play duration in milliseconds, negative for unbounded.
    pub duration_ms: f64,
}

impl Request {
    /// Parse a tcUrl like `rtmp://host:port/app?vhost=x` into the request
    /// fields. The vhost defaults to the host and may be overridden by a
    /// `vhost` or `domain` query parameter.
    pub fn parse_tc_url(tc_url: &str) -> Result<Self> {
        let url =
            Url::parse(tc_url).map_err(|_| Error::InvalidTcUrl(tc_url.to_owned()))?;

        let schema = url.scheme().to_owned();
        let host = url
            .host_str()
            .ok_or_else(|| Error::InvalidTcUrl(tc_url.to_owned()))?
            .to_owned();
        let port = url.port().unwrap_or(DEFAULT_PORT);
        let app = url.path().trim_matches('/').to_owned();
        let param = url.query().unwrap_or("").to_owned();

        let mut vhost = host.clone();
        for (k, v) in url.query_pairs() {
            if k == "vhost" || k == "domain" {
                if !v.is_empty() {
                    vhost = v.into_owned();
                }
            }
        }

        let mut req = Request {
            tc_url: tc_url.to_owned(),
            schema,
            host,
            vhost,
            app,
            port,
            param,
            duration_ms: -1.0,
            ..Default::default()
        };
        req.strip();
        Ok(req)
    }

    /// Adopt the stream name from play/publish. A `?` suffix carries
    /// extra parameters which merge into `param`.
    pub fn set_stream(&mut self, stream_name: &str) {
        match stream_name.split_once('?') {
            Some((stream, query)) => {
                self.stream = stream.to_owned();
                if self.param.is_empty() {
                    self.param = query.to_owned();
                } else {
                    self.param = format!("{}&{}", self.param, query);
                }
            }
            None => self.stream = stream_name.to_owned(),
        }
        self.strip();
    }

    /// Remove characters that must not appear in names and the wrapping
    /// slashes of app and stream.
    pub fn strip(&mut self) {
        fn remove(s: &str, bad: &str) -> String {
            s.chars().filter(|c| !bad.contains(*c)).collect()
        }
        self.host = remove(&self.host, "/ \n\r\t");
        self.vhost = remove(&self.vhost, "/ \n\r\t");
        self.app = remove(&self.app, " \n\r\t");
        self.stream = remove(&self.stream, " \n\r\t");

        self.app = self.app.trim_matches('/').to_owned();
        self.stream = self.stream.trim_matches('/').to_owned();
    }

    /// The normalized stream key `[vhost][/app]/stream` used by the source
    /// registry.
    pub fn stream_url(&self) -> String {
        let mut url = String::new();
        if !self.vhost.is_empty() && self.vhost != DEFAULT_VHOST {
            url.push_str(&self.vhost);
        }
        if !self.app.is_empty() {
            url.push('/');
            url.push_str(&self.app);
        }
        url.push('/');
        url.push_str(&self.stream);
        url
    }
}
