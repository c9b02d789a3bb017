//! HTTP callbacks fired on stream lifecycle events.
//!
//! Each configured URL receives a JSON POST; the response body must be
//! JSON with `{"code": 0}` to allow the action. `on_hls_notify` differs:
//! it is a GET with URL-template variables substituted.

use log::{debug, warn};
use serde::Serialize;
use serde_json::{json, Value};

use crate::error::{Error, Result};

/// Identity of one client attached to a stream, shared by every hook
/// body.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StreamContext {
    pub client_id: u64,
    pub ip: String,
    pub vhost: String,
    pub app: String,
    pub stream: String,
    pub param: String,
}

/// Fires the configured callbacks and enforces their verdicts.
#[derive(Debug, Clone)]
pub struct HookClient {
    http: reqwest::Client,
    server_id: String,
    service_id: String,
    pid: u32,
}

impl HookClient {
    pub fn new(server_id: impl Into<String>, service_id: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            server_id: server_id.into(),
            service_id: service_id.into(),
            pid: std::process::id(),
        }
    }

    fn body(&self, action: &str, ctx: &StreamContext, extra: Value) -> Value {
        let mut body = json!({
            "action": action,
            "client_id": ctx.client_id,
            "ip": ctx.ip,
            "vhost": ctx.vhost,
            "app": ctx.app,
            "stream": ctx.stream,
            "param": ctx.param,
            "server_id": self.server_id,
            "service_id": self.service_id,
            "pid": self.pid,
        });
        if let (Some(body), Some(extra)) = (body.as_object_mut(), extra.as_object()) {
            for (k, v) in extra {
                body.insert(k.clone(), v.clone());
            }
        }
        body
    }

    /// POST `body` to every URL; the first rejection fails the action.
    async fn post_all(&self, urls: &[String], body: &Value) -> Result<()> {
        for url in urls {
            let response = self.http.post(url).json(body).send().await?;
            let value: Value = response
                .json()
                .await
                .map_err(|_| Error::HookMalformed { url: url.clone() })?;
            let code = value
                .get("code")
                .and_then(|c| c.as_i64())
                .ok_or_else(|| Error::HookMalformed { url: url.clone() })?;
            if code != 0 {
                return Err(Error::HookRejected {
                    url: url.clone(),
                    code,
                });
            }
            debug!("hook {url} accepted");
        }
        Ok(())
    }

    pub async fn on_connect(
        &self,
        urls: &[String],
        ctx: &StreamContext,
        tc_url: &str,
        page_url: &str,
    ) -> Result<()> {
        let body = self.body(
            "on_connect",
            ctx,
            json!({"tcUrl": tc_url, "pageUrl": page_url}),
        );
        self.post_all(urls, &body).await
    }

    pub async fn on_publish(&self, urls: &[String], ctx: &StreamContext) -> Result<()> {
        let body = self.body("on_publish", ctx, json!({}));
        self.post_all(urls, &body).await
    }

    pub async fn on_unpublish(&self, urls: &[String], ctx: &StreamContext) -> Result<()> {
        let body = self.body("on_unpublish", ctx, json!({}));
        self.post_all(urls, &body).await
    }

    pub async fn on_play(&self, urls: &[String], ctx: &StreamContext) -> Result<()> {
        let body = self.body("on_play", ctx, json!({}));
        self.post_all(urls, &body).await
    }

    pub async fn on_stop(&self, urls: &[String], ctx: &StreamContext) -> Result<()> {
        let body = self.body("on_stop", ctx, json!({}));
        self.post_all(urls, &body).await
    }

    pub async fn on_close(
        &self,
        urls: &[String],
        ctx: &StreamContext,
        send_bytes: u64,
        recv_bytes: u64,
    ) -> Result<()> {
        let body = self.body(
            "on_close",
            ctx,
            json!({"send_bytes": send_bytes, "recv_bytes": recv_bytes}),
        );
        self.post_all(urls, &body).await
    }

    pub async fn on_dvr(&self, urls: &[String], ctx: &StreamContext, file: &str) -> Result<()> {
        let body = self.body("on_dvr", ctx, json!({"cwd": ".", "file": file}));
        self.post_all(urls, &body).await
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn on_hls(
        &self,
        urls: &[String],
        ctx: &StreamContext,
        file: &str,
        ts_url: &str,
        m3u8: &str,
        seq_no: u64,
        duration_seconds: f64,
    ) -> Result<()> {
        let body = self.body(
            "on_hls",
            ctx,
            json!({
                "file": file,
                "ts_url": ts_url,
                "m3u8": m3u8,
                "seq_no": seq_no,
                "duration": duration_seconds,
            }),
        );
        self.post_all(urls, &body).await
    }

    /// GET with template variables substituted; failures only warn, the
    /// stream is never rejected by a notify.
    pub async fn on_hls_notify(&self, urls: &[String], ctx: &StreamContext, ts_url: &str) {
        for template in urls {
            let url = self.substitute(template, ctx, ts_url);
            match self.http.get(&url).send().await {
                Ok(_) => debug!("hls notify {url}"),
                Err(e) => warn!("hls notify {url}: {e}"),
            }
        }
    }

    fn substitute(&self, template: &str, ctx: &StreamContext, ts_url: &str) -> String {
        template
            .replace("[server_id]", &self.server_id)
            .replace("[service_id]", &self.service_id)
            .replace("[app]", &ctx.app)
            .replace("[stream]", &ctx.stream)
            .replace("[ts_url]", ts_url)
            .replace("[param]", &ctx.param)
    }
}
