//! Channel transport (spec §4.8: "invoke adapter"). Grounded on
//! `AlertManager::send_alert`'s webhook/Slack arms: a bare
//! `reqwest::Client` posting whichever body `channel_body` produced to
//! the channel's configured URL. Vendor-correct clients (OAuth email
//! relays, Twilio's signed REST API, …) are out of scope; every channel
//! kind here is reached through one generic POST.

use async_trait::async_trait;
use reqwest::Client;

use crate::channel_body::ChannelBody;
use crate::error::NotifyError;

/// One resolved channel endpoint: a URL to POST to, decrypted from the
/// channel's `encrypted_config` by the dispatcher before the send.
#[derive(Debug, Clone)]
pub struct ChannelEndpoint {
    pub channel_name: String,
    pub url: String,
}

#[async_trait]
pub trait NotifySink: Send + Sync {
    async fn send(&self, endpoint: &ChannelEndpoint, body: &ChannelBody) -> Result<(), NotifyError>;
}

/// The one concrete sink: posts `body` as JSON, form, or raw text
/// depending on its shape. A non-2xx response or transport error is
/// reported up to the dispatcher, which logs it and never lets it
/// propagate to the run (spec §4.8 failure policy).
pub struct HttpNotifySink {
    client: Client,
}

impl HttpNotifySink {
    pub fn new() -> Self {
        Self { client: Client::new() }
    }
}

impl Default for HttpNotifySink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NotifySink for HttpNotifySink {
    async fn send(&self, endpoint: &ChannelEndpoint, body: &ChannelBody) -> Result<(), NotifyError> {
        let request = match body {
            ChannelBody::Embed(value) | ChannelBody::Json(value) => {
                self.client.post(&endpoint.url).json(value)
            }
            ChannelBody::Html(html) => self
                .client
                .post(&endpoint.url)
                .header("Content-Type", "text/html; charset=utf-8")
                .body(html.clone()),
            ChannelBody::PlainText(text) => self
                .client
                .post(&endpoint.url)
                .header("Content-Type", "text/plain; charset=utf-8")
                .body(text.clone()),
            ChannelBody::FormEncoded(fields) => self.client.post(&endpoint.url).form(fields),
        };

        let response = request
            .send()
            .await
            .map_err(|err| NotifyError::Transport(endpoint.channel_name.clone(), err.to_string()))?;

        if !response.status().is_success() {
            return Err(NotifyError::BadResponse(
                endpoint.channel_name.clone(),
                response.status().as_u16(),
            ));
        }
        Ok(())
    }
}
